use std::collections::HashMap;

use glam::{Mat4, Vec3};

use crate::renderer::device::MeshId;
use crate::renderer::handle::HandleAllocator;
use crate::scene::camera::{Camera, Frustum};
use crate::scene::drawable::{Drawable, DrawableId, RenderQueues};
use crate::scene::light::{Light, LightId};
use crate::scene::material::{Material, MaterialId};

/// Scene model the frame layer renders from.
///
/// Owns identities and creation order. Culling here is a plain frustum test
/// with distance sorting, enough to feed the render queues.
#[derive(Debug)]
pub struct Scene {
    pub camera: Camera,
    pub background: [f32; 4],
    lights: Vec<Light>,
    materials: HashMap<MaterialId, Material>,
    drawables: Vec<Drawable>,
    light_ids: HandleAllocator<Light>,
    material_ids: HandleAllocator<Material>,
    drawable_ids: HandleAllocator<Drawable>,
    next_creation_order: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(Camera::default())
    }
}

impl Scene {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            background: [0.05, 0.05, 0.08, 1.0],
            lights: Vec::new(),
            materials: HashMap::new(),
            drawables: Vec::new(),
            light_ids: HandleAllocator::default(),
            material_ids: HandleAllocator::default(),
            drawable_ids: HandleAllocator::default(),
            next_creation_order: 0,
        }
    }

    pub fn add_light(&mut self, mut light: Light) -> LightId {
        light.id = self.light_ids.allocate();
        light.creation_order = self.next_creation_order;
        self.next_creation_order += 1;
        self.lights.push(light);
        light.id
    }

    pub fn remove_light(&mut self, id: LightId) -> Option<Light> {
        let index = self.lights.iter().position(|light| light.id == id)?;
        Some(self.lights.remove(index))
    }

    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.iter().find(|light| light.id == id)
    }

    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.iter_mut().find(|light| light.id == id)
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        let id = self.material_ids.allocate();
        self.materials.insert(id, material);
        id
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(&id)
    }

    /// Replaces a material's parameters. Returns false for unknown ids.
    pub fn set_material(&mut self, id: MaterialId, material: Material) -> bool {
        match self.materials.get_mut(&id) {
            Some(slot) => {
                *slot = material;
                true
            }
            None => false,
        }
    }

    pub fn remove_material(&mut self, id: MaterialId) -> Option<Material> {
        self.materials.remove(&id)
    }

    pub fn materials(&self) -> impl Iterator<Item = (MaterialId, &Material)> {
        self.materials.iter().map(|(id, material)| (*id, material))
    }

    pub fn add_drawable(
        &mut self,
        mesh: MeshId,
        index_count: u32,
        material: MaterialId,
        transform: Mat4,
    ) -> DrawableId {
        let id = self.drawable_ids.allocate();
        self.drawables
            .push(Drawable::new(id, mesh, index_count, material).with_transform(transform));
        id
    }

    pub fn drawable_mut(&mut self, id: DrawableId) -> Option<&mut Drawable> {
        self.drawables.iter_mut().find(|drawable| drawable.id == id)
    }

    pub fn drawables(&self) -> &[Drawable] {
        &self.drawables
    }

    /// Frustum-culled queues: opaque front to back, transparent back to
    /// front. Shadow casters are not culled against the camera.
    pub fn build_queues(&self, aspect: f32) -> RenderQueues {
        let frustum = Frustum::from_view_proj(self.camera.view_proj(aspect));
        let eye = self.camera.position();
        let distance = |drawable: &Drawable| {
            drawable
                .transform
                .transform_point3(Vec3::ZERO)
                .distance_squared(eye)
        };

        let mut queues = RenderQueues::new();
        for drawable in &self.drawables {
            if drawable.casts_shadows {
                queues.shadow_casters.push(*drawable);
            }
            let center = drawable.transform.transform_point3(Vec3::ZERO);
            let radius = drawable.transform.x_axis.truncate().length().max(
                drawable
                    .transform
                    .y_axis
                    .truncate()
                    .length()
                    .max(drawable.transform.z_axis.truncate().length()),
            );
            if !frustum.intersects_sphere(center, radius) {
                continue;
            }
            let transparent = self
                .materials
                .get(&drawable.material)
                .is_some_and(Material::is_transparent);
            if transparent {
                queues.transparent.push(*drawable);
            } else {
                queues.opaque.push(*drawable);
            }
        }

        queues
            .opaque
            .sort_by(|a, b| distance(a).total_cmp(&distance(b)));
        queues
            .transparent
            .sort_by(|a, b| distance(b).total_cmp(&distance(a)));
        queues
    }
}
