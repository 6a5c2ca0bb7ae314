use glam::Vec2;

use crate::error::DeviceError;
use crate::renderer::config_buffer::ConfigBuffer;
use crate::renderer::device::{
    Attachment, Extent, FullscreenEffect, FullscreenPass, ImageDesc, ImageId, ImageView, PassOp,
    RecordedPass, RenderDevice,
};
use crate::renderer::sync::{FrameGraph, PassCategory, Signal};
use crate::renderer::uniforms::{BlurUniform, MAX_BLUR_TAPS};

/// One-sided Gaussian weights for `radius`, centre tap first.
///
/// Taps come from the middle of Pascal's triangle row `2 * (radius + 2)`
/// and are normalised so that the centre plus both mirrored sides sum to 1.
pub fn gaussian_kernel(radius: u32) -> Vec<f32> {
    let taps = (radius as usize + 1).min(MAX_BLUR_TAPS);
    let row = 2 * (taps + 1);
    let middle = taps + 1;

    let mut weights = vec![0.0f64; taps];
    let mut binomial = 1.0f64;
    for i in 0..=middle {
        let index = middle - i;
        if index < taps {
            weights[index] = binomial;
        }
        binomial = binomial * (row - i) as f64 / (i + 1) as f64;
    }

    let sum = weights[0] + 2.0 * weights[1..].iter().sum::<f64>();
    weights.into_iter().map(|w| (w / sum) as f32).collect()
}

/// Sum of all taps including the mirrored negative offsets.
pub fn mirrored_sum(kernel: &[f32]) -> f32 {
    match kernel.split_first() {
        Some((centre, sides)) => centre + 2.0 * sides.iter().sum::<f32>(),
        None => 0.0,
    }
}

#[derive(Debug)]
struct BlurSubpass {
    input: ImageView,
    output: ImageId,
    /// `None` for the identity copy of a zero-radius chain.
    config: Option<ConfigBuffer<BlurUniform>>,
}

/// Linear chain of blur passes, each reading its predecessor's output and
/// writing a half-resolution target.
#[derive(Debug)]
pub struct BlurChain {
    label: String,
    source: ImageView,
    kernel: Vec<f32>,
    subpasses: Vec<BlurSubpass>,
}

impl BlurChain {
    pub fn build(
        device: &mut dyn RenderDevice,
        label: &str,
        source: ImageView,
        pass_count: u32,
        kernel_radius: u32,
    ) -> Result<Self, DeviceError> {
        let source_desc = device
            .image_desc(source.image)
            .cloned()
            .ok_or(DeviceError::UnknownImage(source.image))?;

        let mut chain = Self {
            label: label.to_string(),
            source,
            kernel: gaussian_kernel(kernel_radius),
            subpasses: Vec::new(),
        };

        let result = if kernel_radius == 0 {
            chain.push_copy(device, &source_desc)
        } else {
            chain.push_blurs(device, &source_desc, pass_count.max(1))
        };
        if let Err(err) = result {
            chain.destroy(device);
            return Err(err);
        }

        log::debug!(
            "Blur chain '{}' built: {} passes, {} taps",
            chain.label,
            chain.subpasses.len(),
            chain.kernel.len()
        );
        Ok(chain)
    }

    fn push_copy(&mut self, device: &mut dyn RenderDevice, source: &ImageDesc) -> Result<(), DeviceError> {
        let extent = source.mip_extent(self.source.mip);
        let output = device.create_image(&ImageDesc::render_target(
            format!("{} Copy", self.label),
            extent,
            source.format,
        ))?;
        self.subpasses.push(BlurSubpass {
            input: self.source,
            output,
            config: None,
        });
        Ok(())
    }

    fn push_blurs(
        &mut self,
        device: &mut dyn RenderDevice,
        source: &ImageDesc,
        pass_count: u32,
    ) -> Result<(), DeviceError> {
        let mut input = self.source;
        let mut input_extent = source.mip_extent(self.source.mip);

        for index in 0..pass_count {
            let extent = input_extent.half();
            let output = device.create_image(&ImageDesc::render_target(
                format!("{} Blur {index}", self.label),
                extent,
                source.format,
            ))?;
            // Push before the config so a failure below still frees the image.
            self.subpasses.push(BlurSubpass {
                input,
                output,
                config: None,
            });

            let mut config = ConfigBuffer::new(
                device,
                &format!("{} Blur {index} Config", self.label),
                BlurUniform::new(
                    &self.kernel,
                    Vec2::new(input_extent.width as f32, input_extent.height as f32),
                ),
            )?;
            config.upload(device);
            if let Some(subpass) = self.subpasses.last_mut() {
                subpass.config = Some(config);
            }

            input = ImageView::base(output);
            input_extent = extent;
        }
        Ok(())
    }

    /// Submits every subpass in order; pass `i + 1` waits on pass `i`.
    pub fn record(
        &mut self,
        device: &mut dyn RenderDevice,
        graph: &mut FrameGraph,
        waits: &[Signal],
    ) -> Signal {
        let mut previous: Option<Signal> = None;

        for (index, subpass) in self.subpasses.iter_mut().enumerate() {
            let output = ImageView::base(subpass.output);
            let op = match &mut subpass.config {
                Some(config) => {
                    config.upload(device);
                    PassOp::Fullscreen(FullscreenPass {
                        effect: FullscreenEffect::Blur,
                        inputs: vec![subpass.input],
                        config: config.buffer(),
                        output: Attachment::clear_color(output, [0.0; 4]),
                    })
                }
                None => PassOp::Copy {
                    source: subpass.input,
                    destination: output,
                },
            };
            let pass = RecordedPass::new(format!("{} {index}", self.label), op);

            let signal = match previous {
                Some(signal) => graph.submit(device, PassCategory::PostEffect, &pass, &[signal]),
                None => graph.submit(device, PassCategory::PostEffect, &pass, waits),
            };
            previous = Some(signal);
        }

        // A chain always holds at least one subpass once built.
        previous.unwrap_or_else(|| device.create_signal())
    }

    pub fn source(&self) -> ImageView {
        self.source
    }

    pub fn output(&self) -> ImageView {
        self.subpasses
            .last()
            .map_or(self.source, |subpass| ImageView::base(subpass.output))
    }

    pub fn output_extent(&self, device: &dyn RenderDevice) -> Option<Extent> {
        device.image_desc(self.output().image).map(|desc| desc.extent)
    }

    pub fn pass_count(&self) -> usize {
        self.subpasses.len()
    }

    pub fn kernel(&self) -> &[f32] {
        &self.kernel
    }

    pub fn destroy(self, device: &mut dyn RenderDevice) {
        for subpass in self.subpasses {
            device.destroy_image(subpass.output);
            if let Some(config) = subpass.config {
                config.destroy(device);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::device::ImageFormat;
    use crate::renderer::headless::HeadlessDevice;

    #[test]
    fn kernels_are_normalised() {
        for radius in 0..=40 {
            let kernel = gaussian_kernel(radius);
            assert_eq!(kernel.len(), radius as usize + 1);
            assert!(
                (mirrored_sum(&kernel) - 1.0).abs() < 1e-5,
                "radius {radius} sums to {}",
                mirrored_sum(&kernel)
            );
        }
    }

    #[test]
    fn kernel_falls_off_from_centre() {
        let kernel = gaussian_kernel(4);
        assert!(kernel.windows(2).all(|w| w[0] > w[1]));
        // Row 12 of Pascal's triangle: 924, 792, 495, 220, 66.
        let expected = [924.0, 792.0, 495.0, 220.0, 66.0];
        let sum = 924.0 + 2.0 * (792.0 + 495.0 + 220.0 + 66.0);
        for (weight, raw) in kernel.iter().zip(expected) {
            assert!((weight - raw / sum).abs() < 1e-6);
        }
    }

    #[test]
    fn zero_radius_is_a_single_tap() {
        assert_eq!(gaussian_kernel(0), vec![1.0]);
    }

    #[test]
    fn chain_halves_each_pass() {
        let mut device = HeadlessDevice::new();
        let source = device
            .create_image(&ImageDesc::render_target("Source", Extent::new(64, 32), ImageFormat::Rgba16Float))
            .unwrap();
        let chain = BlurChain::build(&mut device, "Test", ImageView::base(source), 3, 2).unwrap();

        assert_eq!(chain.pass_count(), 3);
        assert_eq!(chain.output_extent(&device), Some(Extent::new(8, 4)));
        assert_eq!(chain.kernel().len(), 3);
    }

    #[test]
    fn failed_build_frees_partial_chain() {
        let mut device = HeadlessDevice::with_image_budget(3);
        let source = device
            .create_image(&ImageDesc::render_target("Source", Extent::new(64, 64), ImageFormat::Rgba16Float))
            .unwrap();
        let result = BlurChain::build(&mut device, "Test", ImageView::base(source), 4, 1);
        assert!(result.is_err());
        assert_eq!(device.live_image_count(), 1);
        assert_eq!(device.live_buffer_count(), 0);
    }
}
