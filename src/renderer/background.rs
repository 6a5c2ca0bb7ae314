use crate::error::DeviceError;
use crate::renderer::device::{
    Attachment, BufferId, Extent, ImageDesc, ImageFormat, ImageId, ImageView, PassOp, RasterPass,
    RasterPipeline, RecordedPass, RenderDevice,
};
use crate::renderer::sync::{FrameGraph, PassCategory, Signal};

pub const ENVIRONMENT_FACES: u32 = 6;

fn clear_pass(label: String, target: ImageView, color: [f32; 4], view: BufferId) -> RecordedPass {
    RecordedPass::new(
        label,
        PassOp::Raster(RasterPass {
            pipeline: RasterPipeline::Background,
            color: Some(Attachment::clear_color(target, color)),
            depth: None,
            view,
            materials: None,
            sampled: Vec::new(),
            draws: Vec::new(),
        }),
    )
}

/// Fills the colour target with the background before any geometry lands.
#[derive(Debug, Default)]
pub struct BackgroundPass;

impl BackgroundPass {
    pub fn record(
        &self,
        device: &mut dyn RenderDevice,
        graph: &mut FrameGraph,
        color: ImageId,
        clear_color: [f32; 4],
        scene: BufferId,
        waits: &[Signal],
    ) -> Signal {
        let pass = clear_pass("Background".to_string(), ImageView::base(color), clear_color, scene);
        graph.submit(device, PassCategory::Background, &pass, waits)
    }
}

/// Six-face cube image refreshed once per frame from the background.
#[derive(Debug)]
pub struct EnvironmentMap {
    image: ImageId,
    size: u32,
}

impl EnvironmentMap {
    pub fn new(device: &mut dyn RenderDevice, size: u32) -> Result<Self, DeviceError> {
        let image = device.create_image(
            &ImageDesc::render_target("Environment Map", Extent::square(size), ImageFormat::Rgba16Float)
                .with_layers(ENVIRONMENT_FACES),
        )?;
        log::info!("Environment map allocated: {size}px");
        Ok(Self { image, size })
    }

    pub fn image(&self) -> ImageId {
        self.image
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// One submission per face, all waiting on `waits` only.
    pub fn record(
        &self,
        device: &mut dyn RenderDevice,
        graph: &mut FrameGraph,
        clear_color: [f32; 4],
        scene: BufferId,
        waits: &[Signal],
    ) -> Vec<Signal> {
        (0..ENVIRONMENT_FACES)
            .map(|face| {
                let pass = clear_pass(
                    format!("Environment Face {face}"),
                    ImageView::layer(self.image, face),
                    clear_color,
                    scene,
                );
                graph.submit(device, PassCategory::Environment, &pass, waits)
            })
            .collect()
    }

    pub fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_image(self.image);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::headless::HeadlessDevice;
    use crate::renderer::handle::Handle;

    #[test]
    fn background_clears_colour_target() {
        let mut device = HeadlessDevice::new();
        let color = device
            .create_image(&ImageDesc::render_target("Color", Extent::new(4, 2), ImageFormat::Rgba16Float))
            .unwrap();
        let root = device.create_signal();
        let mut graph = FrameGraph::new(&[root]);

        BackgroundPass.record(&mut device, &mut graph, color, [0.1, 0.2, 0.3, 1.0], Handle::new(1), &[root]);

        let texels = device.read_image(ImageView::base(color)).unwrap();
        assert!(texels.iter().all(|t| *t == [0.1, 0.2, 0.3, 1.0]));
        assert_eq!(graph.by_category(PassCategory::Background).count(), 1);
    }

    #[test]
    fn environment_faces_are_independent() {
        let mut device = HeadlessDevice::new();
        let environment = EnvironmentMap::new(&mut device, 16).unwrap();
        let root = device.create_signal();
        let mut graph = FrameGraph::new(&[root]);

        let faces = environment.record(&mut device, &mut graph, [0.0; 4], Handle::new(1), &[root]);

        assert_eq!(faces.len(), ENVIRONMENT_FACES as usize);
        assert!(!graph.is_ordered_before(faces[0], faces[5]));
        assert!(graph.unordered_hazards().is_empty());
    }
}
