use glam::Mat4;

use crate::renderer::device::MeshId;
use crate::renderer::handle::Handle;
use crate::scene::material::MaterialId;

pub type DrawableId = Handle<Drawable>;

/// One culled draw item as handed over by the visibility stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Drawable {
    pub id: DrawableId,
    pub mesh: MeshId,
    pub index_count: u32,
    pub material: MaterialId,
    pub transform: Mat4,
    pub skinned: bool,
    /// Bumped by the owner whenever the vertex/index layout changes.
    pub topology_revision: u32,
    pub casts_shadows: bool,
}

impl Drawable {
    pub fn new(id: DrawableId, mesh: MeshId, index_count: u32, material: MaterialId) -> Self {
        Self {
            id,
            mesh,
            index_count,
            material,
            transform: Mat4::IDENTITY,
            skinned: false,
            topology_revision: 0,
            casts_shadows: true,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_shadows(mut self, casts_shadows: bool) -> Self {
        self.casts_shadows = casts_shadows;
        self
    }
}

/// Per-pass draw lists for one frame, already filtered and sorted.
///
/// The frame layer consumes these in order and never re-sorts them.
#[derive(Clone, Debug, Default)]
pub struct RenderQueues {
    pub opaque: Vec<Drawable>,
    pub transparent: Vec<Drawable>,
    pub shadow_casters: Vec<Drawable>,
}

impl RenderQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.transparent.is_empty() && self.shadow_casters.is_empty()
    }

    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
        self.shadow_casters.clear();
    }
}
