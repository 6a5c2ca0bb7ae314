use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::DeviceError;
use crate::renderer::handle::Handle;
use crate::renderer::sync::Signal;
use crate::renderer::vertex::Vertex;

#[derive(Debug)]
pub enum Image {}
#[derive(Debug)]
pub enum Buffer {}
#[derive(Debug)]
pub enum Binding {}
#[derive(Debug)]
pub enum Mesh {}

pub type ImageId = Handle<Image>;
pub type BufferId = Handle<Buffer>;
pub type BindingId = Handle<Binding>;
pub type MeshId = Handle<Mesh>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(size: u32) -> Self {
        Self::new(size, size)
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Next level of a mip chain; never collapses below one texel.
    pub fn half(&self) -> Self {
        Self::new((self.width / 2).max(1), (self.height / 2).max(1))
    }

    pub const fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// HDR scene colour.
    Rgba16Float,
    Rgba8Unorm,
    /// Ambient occlusion term.
    R16Float,
    /// Variance shadow moments.
    Rg32Float,
    Depth32Float,
    Depth24PlusStencil8,
}

impl ImageFormat {
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::Depth32Float | Self::Depth24PlusStencil8)
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const RENDER_TARGET = 1 << 0;
        const SAMPLED = 1 << 1;
        const COPY_SRC = 1 << 2;
        const COPY_DST = 1 << 3;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const UNIFORM = 1 << 0;
        const STORAGE = 1 << 1;
        const COPY_DST = 1 << 2;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageDesc {
    pub label: String,
    pub extent: Extent,
    pub format: ImageFormat,
    pub mip_levels: u32,
    pub layers: u32,
    pub usage: ImageUsage,
}

impl ImageDesc {
    pub fn render_target(label: impl Into<String>, extent: Extent, format: ImageFormat) -> Self {
        Self {
            label: label.into(),
            extent,
            format,
            mip_levels: 1,
            layers: 1,
            usage: ImageUsage::RENDER_TARGET
                | ImageUsage::SAMPLED
                | ImageUsage::COPY_SRC
                | ImageUsage::COPY_DST,
        }
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers.max(1);
        self
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels.max(1);
        self
    }

    /// Size of one mip level of this image.
    pub fn mip_extent(&self, mip: u32) -> Extent {
        (0..mip).fold(self.extent, |extent, _| extent.half())
    }
}

/// One mip level of one array layer of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageView {
    pub image: ImageId,
    pub mip: u32,
    pub layer: u32,
}

impl ImageView {
    pub const fn base(image: ImageId) -> Self {
        Self {
            image,
            mip: 0,
            layer: 0,
        }
    }

    pub const fn layer(image: ImageId, layer: u32) -> Self {
        Self {
            image,
            mip: 0,
            layer,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsage,
}

/// Per-drawable binding set: the object uniform block a draw reads.
#[derive(Clone, Debug, PartialEq)]
pub struct BindingDesc {
    pub label: String,
    pub object: BufferId,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadOp {
    ClearColor([f32; 4]),
    ClearDepth(f32),
    Load,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attachment {
    pub view: ImageView,
    pub load: LoadOp,
}

impl Attachment {
    pub const fn clear_color(view: ImageView, color: [f32; 4]) -> Self {
        Self {
            view,
            load: LoadOp::ClearColor(color),
        }
    }

    pub const fn clear_depth(view: ImageView, depth: f32) -> Self {
        Self {
            view,
            load: LoadOp::ClearDepth(depth),
        }
    }

    pub const fn load(view: ImageView) -> Self {
        Self {
            view,
            load: LoadOp::Load,
        }
    }
}

/// Fixed-function state a raster pass is recorded with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RasterPipeline {
    /// Attachment clears only; never carries draws.
    Background,
    ShadowDepth,
    Opaque,
    Transparent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawCommand {
    pub mesh: MeshId,
    pub binding: BindingId,
    pub index_count: u32,
    pub material_slot: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RasterPass {
    pub pipeline: RasterPipeline,
    pub color: Option<Attachment>,
    pub depth: Option<Attachment>,
    /// Per-pass uniform block (scene camera or shadow view).
    pub view: BufferId,
    pub materials: Option<BufferId>,
    /// Images sampled while shading, e.g. populated shadow maps.
    pub sampled: Vec<ImageView>,
    pub draws: Vec<DrawCommand>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FullscreenEffect {
    /// Separable Gaussian, kernel read from the config block.
    Blur,
    AmbientOcclusion,
    BrightPass,
    /// Scene colour, occlusion and bloom resolved to the presented image.
    Composite,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FullscreenPass {
    pub effect: FullscreenEffect,
    pub inputs: Vec<ImageView>,
    pub config: BufferId,
    pub output: Attachment,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PassOp {
    Raster(RasterPass),
    Fullscreen(FullscreenPass),
    Copy {
        source: ImageView,
        destination: ImageView,
    },
}

/// The complete command content of one pass submission.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedPass {
    pub label: String,
    pub op: PassOp,
}

impl RecordedPass {
    pub fn new(label: impl Into<String>, op: PassOp) -> Self {
        Self {
            label: label.into(),
            op,
        }
    }

    /// Images this pass samples or copies from.
    pub fn reads(&self) -> Vec<ImageId> {
        match &self.op {
            PassOp::Raster(raster) => {
                let mut reads: Vec<ImageId> = raster.sampled.iter().map(|v| v.image).collect();
                if let Some(Attachment {
                    view,
                    load: LoadOp::Load,
                }) = raster.color
                {
                    reads.push(view.image);
                }
                if let Some(Attachment {
                    view,
                    load: LoadOp::Load,
                }) = raster.depth
                {
                    reads.push(view.image);
                }
                dedup(reads)
            }
            PassOp::Fullscreen(fullscreen) => {
                dedup(fullscreen.inputs.iter().map(|v| v.image).collect())
            }
            PassOp::Copy { source, .. } => vec![source.image],
        }
    }

    /// Images this pass renders or copies into.
    pub fn writes(&self) -> Vec<ImageId> {
        match &self.op {
            PassOp::Raster(raster) => dedup(
                raster
                    .color
                    .iter()
                    .chain(raster.depth.iter())
                    .map(|a| a.view.image)
                    .collect(),
            ),
            PassOp::Fullscreen(fullscreen) => vec![fullscreen.output.view.image],
            PassOp::Copy { destination, .. } => vec![destination.image],
        }
    }

    pub fn draw_count(&self) -> usize {
        match &self.op {
            PassOp::Raster(raster) => raster.draws.len(),
            _ => 0,
        }
    }
}

fn dedup(mut ids: Vec<ImageId>) -> Vec<ImageId> {
    ids.sort();
    ids.dedup();
    ids
}

/// Graphics-API binding used by the frame layer.
///
/// Object creation may fail; submission never does. A submission returns the
/// signal the device raises once the pass has executed; `waits` lists the
/// signals that must be raised before the pass may start.
pub trait RenderDevice {
    fn create_image(&mut self, desc: &ImageDesc) -> Result<ImageId, DeviceError>;
    fn destroy_image(&mut self, image: ImageId);
    fn image_desc(&self, image: ImageId) -> Option<&ImageDesc>;

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, DeviceError>;
    fn destroy_buffer(&mut self, buffer: BufferId);
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);

    fn create_binding(&mut self, desc: &BindingDesc) -> Result<BindingId, DeviceError>;
    fn destroy_binding(&mut self, binding: BindingId);

    fn create_mesh(
        &mut self,
        label: &str,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<MeshId, DeviceError>;
    fn destroy_mesh(&mut self, mesh: MeshId);

    /// Signal raised by something outside the frame (e.g. swapchain acquire).
    fn create_signal(&mut self) -> Signal;

    fn submit(&mut self, pass: &RecordedPass, waits: &[Signal]) -> Signal;
}
