use crate::error::DeviceError;
use crate::renderer::blur::BlurChain;
use crate::renderer::config_buffer::ConfigBuffer;
use crate::renderer::device::{
    Attachment, Extent, FullscreenEffect, FullscreenPass, ImageDesc, ImageFormat, ImageId,
    ImageView, PassOp, RecordedPass, RenderDevice,
};
use crate::renderer::sync::{FrameGraph, PassCategory, Signal};
use crate::renderer::uniforms::BloomUniform;
use crate::settings::BloomConfig;

/// Bright-pass extraction of the scene colour followed by a blur chain.
#[derive(Debug)]
pub struct BloomEffect {
    bright: ImageId,
    uniform: ConfigBuffer<BloomUniform>,
    blur: Option<BlurChain>,
}

impl BloomEffect {
    pub fn new(device: &mut dyn RenderDevice, config: &BloomConfig, extent: Extent) -> Result<Self, DeviceError> {
        let bright = device.create_image(&ImageDesc::render_target(
            "Bloom Bright",
            extent,
            ImageFormat::Rgba16Float,
        ))?;
        let uniform = BloomUniform {
            threshold: config.threshold,
            _padding: [0.0; 3],
        };
        let uniform = match ConfigBuffer::new(device, "Bloom Config", uniform) {
            Ok(uniform) => uniform,
            Err(err) => {
                device.destroy_image(bright);
                return Err(err);
            }
        };

        let mut effect = Self {
            bright,
            uniform,
            blur: None,
        };
        match BlurChain::build(
            device,
            "Bloom Blur",
            ImageView::base(bright),
            config.blur_passes_count,
            config.blur_kernel_size,
        ) {
            Ok(chain) => effect.blur = Some(chain),
            Err(err) => {
                effect.destroy(device);
                return Err(err);
            }
        }

        log::info!(
            "Bloom initialised: threshold {}, {} blur passes",
            config.threshold,
            config.blur_passes_count
        );
        Ok(effect)
    }

    pub fn record(
        &mut self,
        device: &mut dyn RenderDevice,
        graph: &mut FrameGraph,
        color: ImageId,
        waits: &[Signal],
    ) -> Signal {
        self.uniform.upload(device);
        let pass = RecordedPass::new(
            "Bloom Bright Pass",
            PassOp::Fullscreen(FullscreenPass {
                effect: FullscreenEffect::BrightPass,
                inputs: vec![ImageView::base(color)],
                config: self.uniform.buffer(),
                output: Attachment::clear_color(ImageView::base(self.bright), [0.0; 4]),
            }),
        );
        let bright = graph.submit(device, PassCategory::PostEffect, &pass, waits);

        match &mut self.blur {
            Some(blur) => blur.record(device, graph, &[bright]),
            None => bright,
        }
    }

    pub fn output(&self) -> ImageView {
        self.blur
            .as_ref()
            .map_or(ImageView::base(self.bright), BlurChain::output)
    }

    pub fn destroy(self, device: &mut dyn RenderDevice) {
        if let Some(blur) = self.blur {
            blur.destroy(device);
        }
        self.uniform.destroy(device);
        device.destroy_image(self.bright);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::headless::HeadlessDevice;

    #[test]
    fn bright_pass_keeps_only_energy_above_threshold() {
        let mut device = HeadlessDevice::new();
        let extent = Extent::new(16, 16);
        let color = device
            .create_image(&ImageDesc::render_target("Color", extent, ImageFormat::Rgba16Float))
            .unwrap();
        device
            .write_image(ImageView::base(color), vec![[1.5, 0.5, 1.0, 1.0]; extent.texel_count()])
            .unwrap();

        let config = BloomConfig {
            threshold: 1.0,
            blur_passes_count: 2,
            ..BloomConfig::default()
        };
        let mut bloom = BloomEffect::new(&mut device, &config, extent).unwrap();
        let root = device.create_signal();
        let mut graph = FrameGraph::new(&[root]);
        bloom.record(&mut device, &mut graph, color, &[root]);

        let texels = device.read_image(bloom.output()).unwrap();
        assert_eq!(texels.len(), Extent::new(4, 4).texel_count());
        for texel in texels {
            assert!((texel[0] - 0.5).abs() < 1e-5);
            assert!(texel[1].abs() < 1e-6);
        }
        assert!(graph.unordered_hazards().is_empty());
    }
}
