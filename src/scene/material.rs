use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};

use crate::renderer::handle::Handle;

pub type MaterialId = Handle<Material>;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFlags: u32 {
        const ALPHA_BLEND = 1 << 0;
        const DOUBLE_SIDED = 1 << 1;
        const UNLIT = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    pub metallic: f32,
    pub roughness: f32,
    pub alpha_cutoff: f32,
    pub flags: MaterialFlags,
}

impl Material {
    pub fn new(base_color: [f32; 4]) -> Self {
        Self {
            base_color,
            emissive: [0.0; 3],
            metallic: 0.0,
            roughness: 1.0,
            alpha_cutoff: 0.5,
            flags: MaterialFlags::empty(),
        }
    }

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new([r, g, b, 1.0])
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic.clamp(0.0, 1.0);
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness.clamp(0.0, 1.0);
        self
    }

    pub fn with_emissive(mut self, emissive: [f32; 3]) -> Self {
        self.emissive = emissive;
        self
    }

    pub fn with_alpha(mut self) -> Self {
        self.flags |= MaterialFlags::ALPHA_BLEND;
        self
    }

    pub fn is_transparent(&self) -> bool {
        self.flags.contains(MaterialFlags::ALPHA_BLEND)
    }

    /// GPU record stored at the material's slot.
    pub fn data(&self) -> MaterialData {
        MaterialData {
            base_color: self.base_color,
            emissive_metallic: [
                self.emissive[0],
                self.emissive[1],
                self.emissive[2],
                self.metallic,
            ],
            roughness: self.roughness,
            alpha_cutoff: self.alpha_cutoff,
            flags: self.flags.bits(),
            _padding: 0,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::rgb(1.0, 1.0, 1.0)
    }
}

/// Fixed-size record of one material in the material buffer.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct MaterialData {
    pub base_color: [f32; 4],
    pub emissive_metallic: [f32; 4],
    pub roughness: f32,
    pub alpha_cutoff: f32,
    pub flags: u32,
    pub _padding: u32,
}

impl MaterialData {
    pub const SIZE: u64 = std::mem::size_of::<MaterialData>() as u64;
}
