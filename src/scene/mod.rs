// scene/mod.rs

pub mod camera;
pub mod drawable;
pub mod light;
pub mod material;
pub mod scene;
pub mod transform;

pub use camera::{Bounds, Camera, Frustum};
pub use drawable::{Drawable, DrawableId, RenderQueues};
pub use light::{Light, LightId, LightKind};
pub use material::{Material, MaterialData, MaterialFlags, MaterialId};
pub use scene::Scene;
pub use transform::Transform;
