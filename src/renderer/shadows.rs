use std::cmp::Ordering;

use glam::{Mat4, Vec3};

use crate::error::DeviceError;
use crate::renderer::config_buffer::ConfigBuffer;
use crate::renderer::device::{
    Attachment, DrawCommand, Extent, ImageDesc, ImageFormat, ImageId, ImageView, PassOp,
    RasterPass, RasterPipeline, RecordedPass, RenderDevice,
};
use crate::renderer::sync::{FrameGraph, PassCategory, Signal};
use crate::renderer::uniforms::ShadowViewUniform;
use crate::scene::camera::Camera;
use crate::scene::light::{Light, LightId, LightKind};
use crate::settings::RenderSettings;

pub const POINT_FACES: u32 = 6;
pub const MAX_CASCADES: u32 = 4;
/// Blend between logarithmic (1.0) and uniform (0.0) cascade splits.
pub const CASCADE_SPLIT_LAMBDA: f32 = 0.8;
const SHADOW_NEAR: f32 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShadowSlot {
    pub kind: LightKind,
    pub index: u32,
}

/// Far distance of each cascade for a view range of `near..far`.
pub fn cascade_splits(near: f32, far: f32, count: u32, lambda: f32) -> Vec<f32> {
    let count = count.clamp(1, MAX_CASCADES);
    (1..=count)
        .map(|i| {
            let t = i as f32 / count as f32;
            let log = near * (far / near).powf(t);
            let uniform = near + (far - near) * t;
            lambda * log + (1.0 - lambda) * uniform
        })
        .collect()
}

fn up_for(direction: Vec3) -> Vec3 {
    if direction.abs().dot(Vec3::Y) > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

/// View direction and up vector of each cube face, +X -X +Y -Y +Z -Z.
const CUBE_FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

#[derive(Debug)]
struct ShadowLayer {
    view_proj: Mat4,
    config: ConfigBuffer<ShadowViewUniform>,
}

/// Depth (and optionally variance) images for one slot, one layer per
/// cascade or cube face.
#[derive(Debug)]
pub struct ShadowMap {
    slot: ShadowSlot,
    depth: ImageId,
    variance: Option<ImageId>,
    layers: Vec<ShadowLayer>,
    cascade_splits: Vec<f32>,
}

impl ShadowMap {
    pub fn new(
        device: &mut dyn RenderDevice,
        slot: ShadowSlot,
        layer_count: u32,
        size: u32,
        variance: bool,
    ) -> Result<Self, DeviceError> {
        let label = format!("Shadow {} {}", slot.kind.label(), slot.index);
        let extent = Extent::square(size);
        let depth = device.create_image(
            &ImageDesc::render_target(format!("{label} Depth"), extent, ImageFormat::Depth32Float)
                .with_layers(layer_count),
        )?;

        let mut map = Self {
            slot,
            depth,
            variance: None,
            layers: Vec::with_capacity(layer_count as usize),
            cascade_splits: Vec::new(),
        };

        if let Err(err) = map.allocate_rest(device, &label, extent, layer_count, variance) {
            map.destroy(device);
            return Err(err);
        }
        Ok(map)
    }

    fn allocate_rest(
        &mut self,
        device: &mut dyn RenderDevice,
        label: &str,
        extent: Extent,
        layer_count: u32,
        variance: bool,
    ) -> Result<(), DeviceError> {
        if variance {
            self.variance = Some(device.create_image(
                &ImageDesc::render_target(format!("{label} Variance"), extent, ImageFormat::Rg32Float)
                    .with_layers(layer_count),
            )?);
        }
        for layer in 0..layer_count {
            let config = ConfigBuffer::new(
                device,
                &format!("{label} View {layer}"),
                ShadowViewUniform::new(Mat4::IDENTITY),
            )?;
            self.layers.push(ShadowLayer {
                view_proj: Mat4::IDENTITY,
                config,
            });
        }
        Ok(())
    }

    pub fn slot(&self) -> ShadowSlot {
        self.slot
    }

    pub fn depth_image(&self) -> ImageId {
        self.depth
    }

    pub fn variance_image(&self) -> Option<ImageId> {
        self.variance
    }

    pub fn layer_count(&self) -> u32 {
        self.layers.len() as u32
    }

    pub fn layer_matrix(&self, layer: u32) -> Option<Mat4> {
        self.layers.get(layer as usize).map(|l| l.view_proj)
    }

    /// Far distance of each directional cascade from the last update.
    pub fn cascade_splits(&self) -> &[f32] {
        &self.cascade_splits
    }

    /// Recomputes every layer's light-space matrix for `light` as seen from
    /// `camera`.
    pub fn update_matrices(&mut self, light: &Light, camera: &Camera, aspect: f32) {
        let matrices: Vec<Mat4> = match light.kind {
            LightKind::Spot => {
                let proj = Mat4::perspective_rh(
                    (2.0 * light.outer_angle).clamp(0.01, std::f32::consts::PI - 0.01),
                    1.0,
                    SHADOW_NEAR,
                    light.range.max(SHADOW_NEAR * 2.0),
                );
                let view = Mat4::look_at_rh(
                    light.position,
                    light.position + light.direction,
                    up_for(light.direction),
                );
                vec![proj * view]
            }
            LightKind::Point => {
                let proj = Mat4::perspective_rh(
                    std::f32::consts::FRAC_PI_2,
                    1.0,
                    SHADOW_NEAR,
                    light.range.max(SHADOW_NEAR * 2.0),
                );
                CUBE_FACES
                    .iter()
                    .map(|(dir, up)| {
                        proj * Mat4::look_at_rh(light.position, light.position + *dir, *up)
                    })
                    .collect()
            }
            LightKind::Directional => {
                let splits = cascade_splits(
                    camera.near,
                    camera.far,
                    self.layer_count(),
                    CASCADE_SPLIT_LAMBDA,
                );
                let mut near = camera.near;
                let mut matrices = Vec::with_capacity(splits.len());
                for far in &splits {
                    matrices.push(directional_cascade(light.direction, camera, aspect, near, *far));
                    near = *far;
                }
                self.cascade_splits = splits;
                matrices
            }
        };

        for (layer, matrix) in self.layers.iter_mut().zip(matrices) {
            layer.view_proj = matrix;
            layer.config.set(ShadowViewUniform::new(matrix));
        }
    }

    /// One depth pass per layer. All of them wait on `waits` only, so they
    /// are unordered relative to each other.
    pub fn record(
        &mut self,
        device: &mut dyn RenderDevice,
        graph: &mut FrameGraph,
        casters: &[DrawCommand],
        waits: &[Signal],
    ) -> Vec<Signal> {
        let label = format!("Shadow {} {}", self.slot.kind.label(), self.slot.index);
        let mut signals = Vec::with_capacity(self.layers.len());

        for (index, layer) in self.layers.iter_mut().enumerate() {
            layer.config.upload(device);
            let layer_index = index as u32;
            let pass = RecordedPass::new(
                format!("{label} Layer {layer_index}"),
                PassOp::Raster(RasterPass {
                    pipeline: RasterPipeline::ShadowDepth,
                    color: self.variance.map(|image| {
                        Attachment::clear_color(ImageView::layer(image, layer_index), [1.0, 1.0, 0.0, 0.0])
                    }),
                    depth: Some(Attachment::clear_depth(
                        ImageView::layer(self.depth, layer_index),
                        1.0,
                    )),
                    view: layer.config.buffer(),
                    materials: None,
                    sampled: Vec::new(),
                    draws: casters.to_vec(),
                }),
            );
            signals.push(graph.submit(device, PassCategory::Shadow, &pass, waits));
        }

        signals
    }

    pub fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_image(self.depth);
        if let Some(variance) = self.variance {
            device.destroy_image(variance);
        }
        for layer in self.layers {
            layer.config.destroy(device);
        }
    }
}

fn directional_cascade(direction: Vec3, camera: &Camera, aspect: f32, near: f32, far: f32) -> Mat4 {
    let corners = camera.slice_corners(aspect, near, far);
    let center = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;
    let radius = corners
        .iter()
        .map(|corner| corner.distance(center))
        .fold(0.0f32, f32::max)
        .max(SHADOW_NEAR);

    let direction = if direction.length_squared() > 0.0 {
        direction.normalize()
    } else {
        Vec3::NEG_Y
    };
    // Pull the eye back so casters between the light and the slice still land in range.
    let eye = center - direction * radius * 2.0;
    let view = Mat4::look_at_rh(eye, center, up_for(direction));
    let proj = Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.0, radius * 3.0);
    proj * view
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Holder {
    light: LightId,
    priority: f32,
    creation_order: u64,
}

impl Holder {
    fn of(light: &Light, view_position: Vec3) -> Self {
        Self {
            light: light.id,
            priority: light.shadow_priority(view_position),
            creation_order: light.creation_order,
        }
    }

    /// Higher priority first, then older first.
    fn rank(&self, other: &Holder) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.creation_order.cmp(&self.creation_order))
    }
}

#[derive(Debug)]
struct KindPool {
    maps: Vec<ShadowMap>,
    holders: Vec<Option<Holder>>,
}

impl KindPool {
    fn free_index(&self) -> Option<usize> {
        self.holders.iter().position(Option::is_none)
    }

    fn weakest(&self) -> Option<(usize, Holder)> {
        self.holders
            .iter()
            .enumerate()
            .filter_map(|(index, holder)| holder.map(|h| (index, h)))
            .min_by(|(_, a), (_, b)| a.rank(b))
    }
}

/// Shadow maps for every light kind, with priority-based slot assignment.
/// Slot images are allocated up front and never cleared on release.
#[derive(Debug)]
pub struct ShadowMapPool {
    pools: [KindPool; 3],
    view_position: Vec3,
    evictions: u64,
}

fn kind_index(kind: LightKind) -> usize {
    match kind {
        LightKind::Directional => 0,
        LightKind::Point => 1,
        LightKind::Spot => 2,
    }
}

impl ShadowMapPool {
    /// Allocates every slot's images. On failure nothing stays allocated.
    pub fn new(device: &mut dyn RenderDevice, settings: &RenderSettings) -> Result<Self, DeviceError> {
        let mut pool = Self {
            pools: [Self::empty(), Self::empty(), Self::empty()],
            view_position: Vec3::ZERO,
            evictions: 0,
        };

        for kind in LightKind::ALL {
            let (slots, layers) = match kind {
                LightKind::Directional => (
                    settings.shadow_pools.directional,
                    settings.directional_cascades.clamp(1, MAX_CASCADES),
                ),
                LightKind::Point => (settings.shadow_pools.point, POINT_FACES),
                LightKind::Spot => (settings.shadow_pools.spot, 1),
            };
            for index in 0..slots {
                let slot = ShadowSlot { kind, index };
                match ShadowMap::new(
                    device,
                    slot,
                    layers,
                    settings.shadow_map_size,
                    settings.variance_shadows,
                ) {
                    Ok(map) => {
                        let target = &mut pool.pools[kind_index(kind)];
                        target.maps.push(map);
                        target.holders.push(None);
                    }
                    Err(err) => {
                        pool.destroy(device);
                        return Err(err);
                    }
                }
            }
        }

        log::info!(
            "Shadow pools allocated: {} directional, {} point, {} spot ({}px)",
            pool.capacity(LightKind::Directional),
            pool.capacity(LightKind::Point),
            pool.capacity(LightKind::Spot),
            settings.shadow_map_size
        );
        Ok(pool)
    }

    fn empty() -> KindPool {
        KindPool {
            maps: Vec::new(),
            holders: Vec::new(),
        }
    }

    fn pool(&self, kind: LightKind) -> &KindPool {
        &self.pools[kind_index(kind)]
    }

    fn pool_mut(&mut self, kind: LightKind) -> &mut KindPool {
        &mut self.pools[kind_index(kind)]
    }

    pub fn capacity(&self, kind: LightKind) -> usize {
        self.pool(kind).maps.len()
    }

    pub fn assigned_count(&self, kind: LightKind) -> usize {
        self.pool(kind).holders.iter().filter(|h| h.is_some()).count()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn holder_of(&self, slot: ShadowSlot) -> Option<LightId> {
        self.pool(slot.kind)
            .holders
            .get(slot.index as usize)
            .copied()
            .flatten()
            .map(|holder| holder.light)
    }

    pub fn slot_of(&self, light: LightId) -> Option<ShadowSlot> {
        LightKind::ALL.into_iter().find_map(|kind| {
            self.pool(kind)
                .holders
                .iter()
                .position(|h| h.is_some_and(|h| h.light == light))
                .map(|index| ShadowSlot {
                    kind,
                    index: index as u32,
                })
        })
    }

    pub fn map(&self, slot: ShadowSlot) -> Option<&ShadowMap> {
        self.pool(slot.kind).maps.get(slot.index as usize)
    }

    /// Drops holders whose light is gone or no longer casts shadows and
    /// refreshes the priority of the rest against `view_position`.
    pub fn sync_lights(&mut self, lights: &[Light], view_position: Vec3) {
        self.view_position = view_position;
        for kind in LightKind::ALL {
            for index in 0..self.capacity(kind) {
                let Some(holder) = self.pool(kind).holders[index] else {
                    continue;
                };
                let current = lights
                    .iter()
                    .find(|light| light.id == holder.light && light.kind == kind);
                let refreshed = match current {
                    Some(light) if light.casts_shadows => Some(Holder::of(light, view_position)),
                    _ => {
                        log::debug!("Releasing shadow slot {:?} {} of {:?}", kind, index, holder.light);
                        None
                    }
                };
                self.pool_mut(kind).holders[index] = refreshed;
            }
        }
    }

    /// Assigns a slot to `light`, evicting a strictly lower-ranked holder if
    /// the pool is full. `None` means the light goes without shadows.
    pub fn acquire(&mut self, light: &Light) -> Option<ShadowSlot> {
        let candidate = Holder::of(light, self.view_position);

        if let Some(slot) = self.slot_of(light.id) {
            self.pool_mut(slot.kind).holders[slot.index as usize] = Some(candidate);
            return Some(slot);
        }

        for attempt in 0..2 {
            let pool = self.pool_mut(light.kind);
            if let Some(index) = pool.free_index() {
                pool.holders[index] = Some(candidate);
                return Some(ShadowSlot {
                    kind: light.kind,
                    index: index as u32,
                });
            }
            if attempt > 0 {
                break;
            }
            match pool.weakest() {
                Some((index, weakest)) if candidate.rank(&weakest) == Ordering::Greater => {
                    log::debug!(
                        "Shadow slot {:?} {} evicted {:?} for {:?}",
                        light.kind,
                        index,
                        weakest.light,
                        light.id
                    );
                    pool.holders[index] = None;
                    self.evictions += 1;
                }
                _ => break,
            }
        }

        log::warn!(
            "No {} shadow slot for light {:?}; rendering without shadows",
            light.kind.label(),
            light.id
        );
        None
    }

    /// Returns the light that held `slot`.
    pub fn release(&mut self, slot: ShadowSlot) -> Option<LightId> {
        self.pool_mut(slot.kind)
            .holders
            .get_mut(slot.index as usize)
            .and_then(Option::take)
            .map(|holder| holder.light)
    }

    pub fn release_all(&mut self) {
        for pool in &mut self.pools {
            pool.holders.iter_mut().for_each(|holder| *holder = None);
        }
    }

    /// Records the depth passes for `light` into its slot.
    pub fn render(
        &mut self,
        device: &mut dyn RenderDevice,
        graph: &mut FrameGraph,
        light: &Light,
        slot: ShadowSlot,
        frame: &ShadowFrame<'_>,
    ) -> Vec<Signal> {
        if self.holder_of(slot) != Some(light.id) {
            log::warn!("Light {:?} does not hold shadow slot {:?}", light.id, slot);
            return Vec::new();
        }
        let Some(map) = self.pool_mut(slot.kind).maps.get_mut(slot.index as usize) else {
            return Vec::new();
        };
        map.update_matrices(light, frame.camera, frame.aspect);
        map.record(device, graph, frame.casters, frame.waits)
    }

    pub fn destroy(&mut self, device: &mut dyn RenderDevice) {
        for pool in &mut self.pools {
            for map in pool.maps.drain(..) {
                map.destroy(device);
            }
            pool.holders.clear();
        }
    }
}

/// Per-frame inputs shared by every shadow render of a frame.
pub struct ShadowFrame<'a> {
    pub camera: &'a Camera,
    pub aspect: f32,
    pub casters: &'a [DrawCommand],
    pub waits: &'a [Signal],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::headless::HeadlessDevice;
    use crate::scene::Scene;

    fn settings(point_slots: u32) -> RenderSettings {
        let mut settings = RenderSettings::default();
        settings.shadow_map_size = 64;
        settings.shadow_pools.point = point_slots;
        settings
    }

    fn point(scene: &mut Scene, x: f32, intensity: f32) -> Light {
        let id = scene.add_light(Light::point(Vec3::new(x, 0.0, 0.0), intensity, 5.0).with_shadows(true));
        *scene.light(id).unwrap()
    }

    #[test]
    fn splits_are_increasing_and_end_at_far() {
        let splits = cascade_splits(0.1, 100.0, 4, CASCADE_SPLIT_LAMBDA);
        assert_eq!(splits.len(), 4);
        assert!(splits.windows(2).all(|w| w[0] < w[1]));
        assert!((splits[3] - 100.0).abs() < 1e-3);
    }

    #[test]
    fn pool_keeps_highest_priority_lights() {
        let mut device = HeadlessDevice::new();
        let mut pool = ShadowMapPool::new(&mut device, &settings(2)).unwrap();
        let mut scene = Scene::default();

        let lights: Vec<Light> = [8.0, 1.0, 4.0, 2.0, 6.0]
            .iter()
            .map(|x| point(&mut scene, *x, 1.0))
            .collect();
        pool.sync_lights(scene.lights(), Vec3::ZERO);
        for light in &lights {
            pool.acquire(light);
        }

        assert_eq!(pool.assigned_count(LightKind::Point), 2);
        let mut held: Vec<LightId> = (0..2)
            .filter_map(|index| pool.holder_of(ShadowSlot { kind: LightKind::Point, index }))
            .collect();
        held.sort();
        let mut expected = vec![lights[1].id, lights[3].id];
        expected.sort();
        assert_eq!(held, expected);
    }

    #[test]
    fn random_contention_keeps_the_top_ranked_lights() {
        use rand::{rngs::SmallRng, seq::SliceRandom, Rng, SeedableRng};

        let mut rng = SmallRng::seed_from_u64(0x5AD0_0001);
        for round in 0..40 {
            let capacity = rng.gen_range(1..=4u32);
            let count = rng.gen_range(capacity + 1..=capacity + 8);
            let mut device = HeadlessDevice::new();
            let mut pool = ShadowMapPool::new(&mut device, &settings(capacity)).unwrap();
            let mut scene = Scene::default();

            // Few distinct positions and intensities, so priorities tie often.
            let mut lights: Vec<Light> = (0..count)
                .map(|_| {
                    let x = rng.gen_range(0..3) as f32;
                    let intensity = [1.0, 2.0, 4.0][rng.gen_range(0..3)];
                    point(&mut scene, x, intensity)
                })
                .collect();
            pool.sync_lights(scene.lights(), Vec3::ZERO);

            let mut expected = lights.clone();
            expected.sort_by(|a, b| {
                b.shadow_priority(Vec3::ZERO)
                    .total_cmp(&a.shadow_priority(Vec3::ZERO))
                    .then(a.creation_order.cmp(&b.creation_order))
            });
            let mut expected: Vec<LightId> = expected
                .iter()
                .take(capacity as usize)
                .map(|light| light.id)
                .collect();
            expected.sort();

            lights.shuffle(&mut rng);
            for light in &lights {
                pool.acquire(light);
            }

            assert_eq!(pool.assigned_count(LightKind::Point), capacity as usize);
            let mut held: Vec<LightId> = (0..capacity)
                .filter_map(|index| pool.holder_of(ShadowSlot { kind: LightKind::Point, index }))
                .collect();
            held.sort();
            assert_eq!(held, expected, "round {round}");
        }
    }

    #[test]
    fn ties_favour_the_older_light() {
        let mut device = HeadlessDevice::new();
        let mut pool = ShadowMapPool::new(&mut device, &settings(1)).unwrap();
        let mut scene = Scene::default();
        let older = point(&mut scene, 3.0, 1.0);
        let younger = point(&mut scene, -3.0, 1.0);

        assert!(pool.acquire(&younger).is_some());
        assert!(pool.acquire(&older).is_some());
        assert_eq!(pool.slot_of(younger.id), None);

        // The younger light cannot take the slot back at equal priority.
        assert_eq!(pool.acquire(&younger), None);
        assert!(pool.slot_of(older.id).is_some());
        assert_eq!(pool.evictions(), 1);
    }

    #[test]
    fn sync_releases_lights_that_stopped_casting() {
        let mut device = HeadlessDevice::new();
        let mut pool = ShadowMapPool::new(&mut device, &settings(2)).unwrap();
        let mut scene = Scene::default();
        let a = point(&mut scene, 1.0, 1.0);
        let b = point(&mut scene, 2.0, 1.0);
        pool.acquire(&a);
        pool.acquire(&b);

        scene.light_mut(a.id).unwrap().casts_shadows = false;
        scene.remove_light(b.id);
        pool.sync_lights(scene.lights(), Vec3::ZERO);

        assert_eq!(pool.assigned_count(LightKind::Point), 0);
    }

    #[test]
    fn point_light_renders_six_unordered_faces() {
        let mut device = HeadlessDevice::new();
        let mut pool = ShadowMapPool::new(&mut device, &settings(1)).unwrap();
        let mut scene = Scene::default();
        let light = point(&mut scene, 0.0, 1.0);
        let slot = pool.acquire(&light).unwrap();

        let root = device.create_signal();
        let mut graph = FrameGraph::new(&[root]);
        let camera = Camera::default();
        let frame = ShadowFrame {
            camera: &camera,
            aspect: 1.0,
            casters: &[],
            waits: &[root],
        };
        let signals = pool.render(&mut device, &mut graph, &light, slot, &frame);

        assert_eq!(signals.len(), POINT_FACES as usize);
        for record in graph.by_category(PassCategory::Shadow) {
            assert_eq!(record.sync.waits.as_slice(), &[root]);
        }
        assert!(!graph.is_ordered_before(signals[0], signals[1]));
    }

    #[test]
    fn directional_cascades_cover_the_view() {
        let mut device = HeadlessDevice::new();
        let mut pool = ShadowMapPool::new(&mut device, &settings(1)).unwrap();
        let mut scene = Scene::default();
        let id = scene.add_light(Light::directional(Vec3::new(-0.3, -1.0, -0.2), 2.0).with_shadows(true));
        let light = *scene.light(id).unwrap();
        let slot = pool.acquire(&light).unwrap();

        let root = device.create_signal();
        let mut graph = FrameGraph::new(&[root]);
        let camera = Camera::default();
        let frame = ShadowFrame {
            camera: &camera,
            aspect: 1.0,
            casters: &[],
            waits: &[root],
        };
        pool.render(&mut device, &mut graph, &light, slot, &frame);

        let map = pool.map(slot).unwrap();
        assert_eq!(map.layer_count(), 4);
        assert_eq!(map.cascade_splits().len(), 4);
        // The point the camera looks at lands inside the first cascades' clip volume.
        let clip = map.layer_matrix(0).unwrap().project_point3(Vec3::new(0.0, 0.0, 2.5));
        assert!(clip.x.abs() <= 1.0 && clip.y.abs() <= 1.0);
        assert!((0.0..=1.0).contains(&clip.z));
    }

    #[test]
    fn failed_allocation_leaves_nothing_behind() {
        let mut device = HeadlessDevice::with_image_budget(3);
        let result = ShadowMapPool::new(&mut device, &settings(4));
        assert!(result.is_err());
        assert_eq!(device.live_image_count(), 0);
        assert_eq!(device.live_buffer_count(), 0);
    }
}
