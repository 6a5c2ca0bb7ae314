// renderer/mod.rs

pub mod background;
pub mod bloom;
pub mod blur;
pub mod composite;
pub mod config_buffer;
pub mod device;
pub mod geometry_pass;
pub mod handle;
pub mod headless;
pub mod material_buffer;
pub mod pipeline_builder;
pub mod shadows;
pub mod ssao;
pub mod sync;
pub mod technique;
pub mod uniforms;
pub mod vertex;
pub mod wgpu_device;

pub use background::{BackgroundPass, EnvironmentMap};
pub use bloom::BloomEffect;
pub use blur::{gaussian_kernel, BlurChain};
pub use composite::{CompositeInputs, CompositePass};
pub use config_buffer::ConfigBuffer;
pub use device::{
    Attachment, BindingId, BufferId, DrawCommand, Extent, ImageDesc, ImageFormat, ImageId,
    ImageView, MeshId, PassOp, RecordedPass, RenderDevice,
};
pub use geometry_pass::{BindingCache, BindingStats, GeometryPass, PassKind};
pub use handle::Handle;
pub use headless::HeadlessDevice;
pub use material_buffer::MaterialDataBuffer;
pub use shadows::{ShadowMap, ShadowMapPool, ShadowSlot};
pub use ssao::SsaoEffect;
pub use sync::{FrameGraph, PassCategory, Signal};
pub use technique::{FrameStats, Technique};
pub use vertex::{cube_mesh, Vertex};
pub use wgpu_device::WgpuDevice;
