use crate::error::DeviceError;
use crate::renderer::config_buffer::ConfigBuffer;
use crate::renderer::device::{
    Attachment, Extent, FullscreenEffect, FullscreenPass, ImageDesc, ImageFormat, ImageId,
    ImageView, PassOp, RecordedPass, RenderDevice,
};
use crate::renderer::sync::{FrameGraph, PassCategory, Signal};
use crate::renderer::uniforms::CompositeUniform;
use crate::settings::ToneMappingConfig;

/// What the composite reads. Missing effects are bound to the scene colour
/// and switched off in the config block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompositeInputs {
    pub color: ImageId,
    pub occlusion: Option<ImageView>,
    pub bloom: Option<ImageView>,
}

impl CompositeInputs {
    fn views(&self) -> Vec<ImageView> {
        let color = ImageView::base(self.color);
        vec![
            color,
            self.occlusion.unwrap_or(color),
            self.bloom.unwrap_or(color),
        ]
    }
}

/// Resolves HDR scene colour, darkened by occlusion and lifted by bloom,
/// into the 8-bit image handed to presentation.
#[derive(Debug)]
pub struct CompositePass {
    output: ImageId,
    uniform: ConfigBuffer<CompositeUniform>,
}

impl CompositePass {
    pub fn new(device: &mut dyn RenderDevice, config: &ToneMappingConfig, extent: Extent) -> Result<Self, DeviceError> {
        let output = device.create_image(&ImageDesc::render_target(
            "Technique Output",
            extent,
            ImageFormat::Rgba8Unorm,
        ))?;
        let uniform = CompositeUniform {
            exposure: config.exposure,
            bloom_intensity: config.bloom_intensity,
            occlusion_enabled: 0,
            bloom_enabled: 0,
        };
        match ConfigBuffer::new(device, "Composite Config", uniform) {
            Ok(uniform) => Ok(Self { output, uniform }),
            Err(err) => {
                device.destroy_image(output);
                Err(err)
            }
        }
    }

    pub fn record(
        &mut self,
        device: &mut dyn RenderDevice,
        graph: &mut FrameGraph,
        inputs: &CompositeInputs,
        waits: &[Signal],
    ) -> Signal {
        self.uniform.set(CompositeUniform {
            occlusion_enabled: u32::from(inputs.occlusion.is_some()),
            bloom_enabled: u32::from(inputs.bloom.is_some()),
            ..*self.uniform.get()
        });
        self.uniform.upload(device);

        let pass = RecordedPass::new(
            "Composite",
            PassOp::Fullscreen(FullscreenPass {
                effect: FullscreenEffect::Composite,
                inputs: inputs.views(),
                config: self.uniform.buffer(),
                output: Attachment::clear_color(ImageView::base(self.output), [0.0, 0.0, 0.0, 1.0]),
            }),
        );
        graph.submit(device, PassCategory::Composite, &pass, waits)
    }

    pub fn output(&self) -> ImageId {
        self.output
    }

    pub fn destroy(self, device: &mut dyn RenderDevice) {
        self.uniform.destroy(device);
        device.destroy_image(self.output);
    }
}
