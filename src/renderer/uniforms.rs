// GPU-side records. Every struct here is uploaded verbatim, so field order
// and padding follow std140/std430 rules.
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

/// Upper bound on one-sided blur taps (centre included).
pub const MAX_BLUR_TAPS: usize = 64;
pub const MAX_SSAO_SAMPLES: usize = 64;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct SceneUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inverse_view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 3],
    pub _padding: f32,
    pub jitter: [f32; 2],
    pub target_size: [f32; 2],
}

impl SceneUniform {
    pub fn new(view_proj: Mat4, camera_pos: Vec3, jitter: Vec2, target_size: Vec2) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            inverse_view_proj: view_proj.inverse().to_cols_array_2d(),
            camera_pos: camera_pos.to_array(),
            _padding: 0.0,
            jitter: jitter.to_array(),
            target_size: target_size.to_array(),
        }
    }
}

impl Default for SceneUniform {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Vec3::ZERO, Vec2::ZERO, Vec2::ONE)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct ShadowViewUniform {
    pub view_proj: [[f32; 4]; 4],
}

impl ShadowViewUniform {
    pub fn new(view_proj: Mat4) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
        }
    }
}

/// Per-draw block: model matrix plus the material slot the shader indexes.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct ObjectUniform {
    pub model: [[f32; 4]; 4],
    pub material_slot: u32,
    pub _padding: [u32; 3],
}

impl ObjectUniform {
    pub fn new(model: Mat4, material_slot: u32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            material_slot,
            _padding: [0; 3],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct BlurUniform {
    pub coefficients: [[f32; 4]; MAX_BLUR_TAPS / 4],
    pub texel_size: [f32; 2],
    pub coefficient_count: u32,
    pub _padding: u32,
}

impl BlurUniform {
    pub fn new(kernel: &[f32], source_size: Vec2) -> Self {
        let mut coefficients = [[0.0; 4]; MAX_BLUR_TAPS / 4];
        let count = kernel.len().min(MAX_BLUR_TAPS);
        for (index, weight) in kernel.iter().take(count).enumerate() {
            coefficients[index / 4][index % 4] = *weight;
        }
        Self {
            coefficients,
            texel_size: (Vec2::ONE / source_size.max(Vec2::ONE)).to_array(),
            coefficient_count: count as u32,
            _padding: 0,
        }
    }

    pub fn kernel(&self) -> Vec<f32> {
        (0..self.coefficient_count as usize)
            .map(|index| self.coefficients[index / 4][index % 4])
            .collect()
    }
}

/// Ambient occlusion tuning plus the hemisphere sample kernel.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct SsaoUniform {
    pub samples: [[f32; 4]; MAX_SSAO_SAMPLES],
    pub radius: f32,
    pub bias: f32,
    pub intensity: f32,
    pub sample_count: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct BloomUniform {
    pub threshold: f32,
    pub _padding: [f32; 3],
}

/// Tone-mapping inputs; the flags say which optional images are real.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct CompositeUniform {
    pub exposure: f32,
    pub bloom_intensity: f32,
    pub occlusion_enabled: u32,
    pub bloom_enabled: u32,
}
