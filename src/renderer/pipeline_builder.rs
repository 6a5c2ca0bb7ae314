use crate::renderer::device::RasterPipeline;
use crate::renderer::vertex::Vertex;

const SHADOW_BIAS: wgpu::DepthBiasState = wgpu::DepthBiasState {
    constant: 2,
    slope_scale: 2.0,
    clamp: 0.0,
};

/// Fixed-function state of one raster pipeline kind.
#[derive(Clone, Copy, Debug)]
struct RasterState {
    label: &'static str,
    vertex_entry: &'static str,
    fragment_entry: &'static str,
    blend: Option<wgpu::BlendState>,
    depth_write: bool,
    depth_compare: wgpu::CompareFunction,
    bias: wgpu::DepthBiasState,
    cull_mode: Option<wgpu::Face>,
}

fn raster_state(pipeline: RasterPipeline) -> Option<RasterState> {
    let geometry = RasterState {
        label: "Opaque Pipeline",
        vertex_entry: "vs_main",
        fragment_entry: "fs_main",
        blend: None,
        depth_write: true,
        depth_compare: wgpu::CompareFunction::LessEqual,
        bias: wgpu::DepthBiasState::default(),
        cull_mode: Some(wgpu::Face::Back),
    };
    match pipeline {
        RasterPipeline::Background => None,
        RasterPipeline::ShadowDepth => Some(RasterState {
            label: "Shadow Depth Pipeline",
            vertex_entry: "vs_depth",
            fragment_entry: "fs_moments",
            depth_compare: wgpu::CompareFunction::Less,
            bias: SHADOW_BIAS,
            ..geometry
        }),
        RasterPipeline::Opaque => Some(geometry),
        // Sorted back to front upstream; both faces visible through the surface.
        RasterPipeline::Transparent => Some(RasterState {
            label: "Transparent Pipeline",
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            depth_write: false,
            cull_mode: None,
            ..geometry
        }),
    }
}

/// Zero or one colour target; depth-only passes get none.
fn color_targets(
    color: Option<wgpu::TextureFormat>,
    blend: Option<wgpu::BlendState>,
) -> Vec<Option<wgpu::ColorTargetState>> {
    color
        .map(|format| wgpu::ColorTargetState {
            format,
            blend,
            write_mask: wgpu::ColorWrites::ALL,
        })
        .into_iter()
        .map(Some)
        .collect()
}

struct Stages<'s> {
    vertex_entry: &'s str,
    fragment_entry: Option<&'s str>,
    buffers: &'s [wgpu::VertexBufferLayout<'s>],
    targets: &'s [Option<wgpu::ColorTargetState>],
    depth_stencil: Option<wgpu::DepthStencilState>,
    cull_mode: Option<wgpu::Face>,
}

/// Builds pipelines against one layout and shader module.
pub struct PipelineBuilder<'a> {
    device: &'a wgpu::Device,
    layout: &'a wgpu::PipelineLayout,
    shader: &'a wgpu::ShaderModule,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(
        device: &'a wgpu::Device,
        layout: &'a wgpu::PipelineLayout,
        shader: &'a wgpu::ShaderModule,
    ) -> Self {
        Self {
            device,
            layout,
            shader,
        }
    }

    /// Pipeline for a raster pass kind and its attachment formats.
    ///
    /// A shadow pass without a colour target renders depth only; geometry
    /// passes need one. Background passes only clear and have no pipeline.
    pub fn raster(
        &self,
        pipeline: RasterPipeline,
        color: Option<wgpu::TextureFormat>,
        depth: Option<wgpu::TextureFormat>,
    ) -> Option<wgpu::RenderPipeline> {
        let state = raster_state(pipeline)?;
        match pipeline {
            RasterPipeline::ShadowDepth if depth.is_none() => return None,
            RasterPipeline::Opaque | RasterPipeline::Transparent if color.is_none() => return None,
            _ => {}
        }

        let targets = color_targets(color, state.blend);
        let buffers = [Vertex::layout()];
        let depth_stencil = depth.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: state.depth_write,
            depth_compare: state.depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: state.bias,
        });

        Some(self.build(
            state.label,
            Stages {
                vertex_entry: state.vertex_entry,
                fragment_entry: (!targets.is_empty()).then_some(state.fragment_entry),
                buffers: &buffers,
                targets: &targets,
                depth_stencil,
                cull_mode: state.cull_mode,
            },
        ))
    }

    /// Fullscreen triangle writing one unblended colour target.
    pub fn fullscreen(&self, label: &str, output: wgpu::TextureFormat) -> wgpu::RenderPipeline {
        let targets = [Some(wgpu::ColorTargetState {
            format: output,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        })];
        self.build(
            label,
            Stages {
                vertex_entry: "vs_fullscreen",
                fragment_entry: Some("fs_main"),
                buffers: &[],
                targets: &targets,
                depth_stencil: None,
                cull_mode: None,
            },
        )
    }

    fn build(&self, label: &str, stages: Stages<'_>) -> wgpu::RenderPipeline {
        self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(self.layout),
            vertex: wgpu::VertexState {
                module: self.shader,
                entry_point: Some(stages.vertex_entry),
                buffers: stages.buffers,
                compilation_options: Default::default(),
            },
            fragment: stages.fragment_entry.map(|entry| wgpu::FragmentState {
                module: self.shader,
                entry_point: Some(entry),
                targets: stages.targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: stages.cull_mode,
                ..Default::default()
            },
            depth_stencil: stages.depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }
}
