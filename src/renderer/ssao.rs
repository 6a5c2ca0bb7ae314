use glam::Vec3;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::error::DeviceError;
use crate::renderer::blur::BlurChain;
use crate::renderer::config_buffer::ConfigBuffer;
use crate::renderer::device::{
    Attachment, Extent, FullscreenEffect, FullscreenPass, ImageDesc, ImageFormat, ImageId,
    ImageView, PassOp, RecordedPass, RenderDevice,
};
use crate::renderer::sync::{FrameGraph, PassCategory, Signal};
use crate::renderer::uniforms::{SsaoUniform, MAX_SSAO_SAMPLES};
use crate::settings::SsaoConfig;

const KERNEL_SEED: u64 = 0x55A0_C0DE;

/// Hemisphere sample offsets (+Z up), denser towards the origin.
pub fn hemisphere_kernel(count: usize) -> Vec<Vec3> {
    let count = count.min(MAX_SSAO_SAMPLES);
    let mut rng = SmallRng::seed_from_u64(KERNEL_SEED);
    (0..count)
        .map(|index| {
            let direction = loop {
                let candidate = Vec3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(0.0..1.0),
                );
                let length = candidate.length();
                if length > 1e-3 && length <= 1.0 {
                    break candidate / length;
                }
            };
            let t = index as f32 / count as f32;
            let scale = 0.1 + 0.9 * t * t;
            direction * rng.gen_range(0.0f32..1.0) * scale
        })
        .collect()
}

fn ssao_uniform(config: &SsaoConfig) -> SsaoUniform {
    let mut samples = [[0.0; 4]; MAX_SSAO_SAMPLES];
    for (slot, sample) in samples
        .iter_mut()
        .zip(hemisphere_kernel(config.num_samples as usize))
    {
        *slot = sample.extend(0.0).to_array();
    }
    SsaoUniform {
        samples,
        radius: config.radius,
        bias: config.bias,
        intensity: config.intensity,
        sample_count: config.num_samples.min(MAX_SSAO_SAMPLES as u32),
    }
}

/// Raw ambient occlusion from depth followed by a blur chain.
#[derive(Debug)]
pub struct SsaoEffect {
    raw: ImageId,
    uniform: ConfigBuffer<SsaoUniform>,
    blur: Option<BlurChain>,
}

impl SsaoEffect {
    pub fn new(device: &mut dyn RenderDevice, config: &SsaoConfig, extent: Extent) -> Result<Self, DeviceError> {
        let raw = device.create_image(&ImageDesc::render_target("SSAO Raw", extent, ImageFormat::R16Float))?;
        let uniform = match ConfigBuffer::new(device, "SSAO Config", ssao_uniform(config)) {
            Ok(uniform) => uniform,
            Err(err) => {
                device.destroy_image(raw);
                return Err(err);
            }
        };
        let mut effect = Self {
            raw,
            uniform,
            blur: None,
        };

        match BlurChain::build(
            device,
            "SSAO Blur",
            ImageView::base(raw),
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
            "SSAO initialised: {} samples, radius {}, {} blur passes",
            config.num_samples,
            config.radius,
            config.blur_passes_count
        );
        Ok(effect)
    }

    pub fn record(
        &mut self,
        device: &mut dyn RenderDevice,
        graph: &mut FrameGraph,
        depth: ImageId,
        waits: &[Signal],
    ) -> Signal {
        self.uniform.upload(device);
        let pass = RecordedPass::new(
            "SSAO",
            PassOp::Fullscreen(FullscreenPass {
                effect: FullscreenEffect::AmbientOcclusion,
                inputs: vec![ImageView::base(depth)],
                config: self.uniform.buffer(),
                output: Attachment::clear_color(ImageView::base(self.raw), [1.0; 4]),
            }),
        );
        let occlusion = graph.submit(device, PassCategory::PostEffect, &pass, waits);

        match &mut self.blur {
            Some(blur) => blur.record(device, graph, &[occlusion]),
            None => occlusion,
        }
    }

    pub fn output(&self) -> ImageView {
        self.blur
            .as_ref()
            .map_or(ImageView::base(self.raw), BlurChain::output)
    }

    pub fn config(&self) -> &SsaoUniform {
        self.uniform.get()
    }

    pub fn destroy(self, device: &mut dyn RenderDevice) {
        if let Some(blur) = self.blur {
            blur.destroy(device);
        }
        self.uniform.destroy(device);
        device.destroy_image(self.raw);
    }
}
