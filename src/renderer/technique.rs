// renderer/technique.rs
use glam::{Vec2, Vec3};

use crate::error::{DeviceError, TechniqueError};
use crate::renderer::background::{BackgroundPass, EnvironmentMap};
use crate::renderer::bloom::BloomEffect;
use crate::renderer::composite::{CompositeInputs, CompositePass};
use crate::renderer::config_buffer::ConfigBuffer;
use crate::renderer::device::{Extent, ImageDesc, ImageFormat, ImageId, ImageView, RenderDevice};
use crate::renderer::geometry_pass::{BindingCache, BindingStats, GeometryPass, GeometryTargets, PassKind};
use crate::renderer::material_buffer::MaterialDataBuffer;
use crate::renderer::shadows::{ShadowFrame, ShadowMapPool, ShadowSlot};
use crate::renderer::ssao::SsaoEffect;
use crate::renderer::sync::{FrameGraph, Signal};
use crate::renderer::uniforms::SceneUniform;
use crate::scene::camera::{Camera, Frustum};
use crate::scene::drawable::RenderQueues;
use crate::scene::light::Light;
use crate::scene::material::{Material, MaterialId};
use crate::scene::Scene;
use crate::settings::RenderSettings;

/// Counters describing the last rendered frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub submissions: usize,
    pub material_writes: usize,
    pub shadow_lights: usize,
    pub shadow_passes: usize,
    pub culled_lights: usize,
    pub denied_shadow_slots: usize,
    pub opaque_draws: usize,
    pub transparent_draws: usize,
    /// Drawables dropped because their material has no slot.
    pub skipped_drawables: usize,
    pub opaque_bindings: BindingStats,
    pub transparent_bindings: BindingStats,
}

/// GPU objects that only exist between `initialise` and `cleanup`.
#[derive(Debug)]
struct FrameTargets {
    color: ImageId,
    depth: ImageId,
    scene: ConfigBuffer<SceneUniform>,
    shadows: ShadowMapPool,
    environment: Option<EnvironmentMap>,
    ssao: Option<SsaoEffect>,
    bloom: Option<BloomEffect>,
    composite: Option<CompositePass>,
}

impl FrameTargets {
    fn allocate(
        device: &mut dyn RenderDevice,
        settings: &RenderSettings,
        extent: Extent,
    ) -> Result<Self, DeviceError> {
        let color = device.create_image(&ImageDesc::render_target(
            "Technique Color",
            extent,
            ImageFormat::Rgba16Float,
        ))?;
        let depth = match device.create_image(&ImageDesc::render_target(
            "Technique Depth",
            extent,
            ImageFormat::Depth24PlusStencil8,
        )) {
            Ok(depth) => depth,
            Err(err) => {
                device.destroy_image(color);
                return Err(err);
            }
        };
        let scene = match ConfigBuffer::new(device, "Scene Uniform", SceneUniform::default()) {
            Ok(scene) => scene,
            Err(err) => {
                device.destroy_image(color);
                device.destroy_image(depth);
                return Err(err);
            }
        };
        let shadows = match ShadowMapPool::new(device, settings) {
            Ok(shadows) => shadows,
            Err(err) => {
                device.destroy_image(color);
                device.destroy_image(depth);
                scene.destroy(device);
                return Err(err);
            }
        };

        let mut targets = Self {
            color,
            depth,
            scene,
            shadows,
            environment: None,
            ssao: None,
            bloom: None,
            composite: None,
        };
        if let Err(err) = targets.allocate_effects(device, settings, extent) {
            targets.destroy(device);
            return Err(err);
        }
        Ok(targets)
    }

    fn allocate_effects(
        &mut self,
        device: &mut dyn RenderDevice,
        settings: &RenderSettings,
        extent: Extent,
    ) -> Result<(), DeviceError> {
        if settings.environment_map.enabled {
            self.environment = Some(EnvironmentMap::new(device, settings.environment_map.size)?);
        }
        if settings.ssao.enabled {
            self.ssao = Some(SsaoEffect::new(device, &settings.ssao, extent)?);
        }
        if settings.bloom.enabled {
            self.bloom = Some(BloomEffect::new(device, &settings.bloom, extent)?);
        }
        self.composite = Some(CompositePass::new(device, &settings.tone_mapping, extent)?);
        Ok(())
    }

    fn destroy(mut self, device: &mut dyn RenderDevice) {
        if let Some(composite) = self.composite {
            composite.destroy(device);
        }
        if let Some(bloom) = self.bloom {
            bloom.destroy(device);
        }
        if let Some(ssao) = self.ssao {
            ssao.destroy(device);
        }
        if let Some(environment) = self.environment {
            environment.destroy(device);
        }
        self.shadows.destroy(device);
        self.scene.destroy(device);
        device.destroy_image(self.depth);
        device.destroy_image(self.color);
    }
}

/// Produces one fully synchronised frame per [`Technique::render`].
#[derive(Debug)]
pub struct Technique {
    settings: RenderSettings,
    extent: Extent,
    targets: Option<FrameTargets>,
    materials: MaterialDataBuffer,
    opaque: GeometryPass,
    transparent: GeometryPass,
    casters: BindingCache,
    background: BackgroundPass,
    camera: Camera,
    lights: Vec<Light>,
    background_color: [f32; 4],
    in_flight: Option<Signal>,
    last_frame: FrameGraph,
    stats: FrameStats,
}

impl Technique {
    pub fn new(settings: RenderSettings, extent: Extent) -> Self {
        let settings = settings.validate();
        Self {
            materials: MaterialDataBuffer::new(settings.material_capacity),
            background_color: settings.clear_color,
            settings,
            extent,
            targets: None,
            opaque: GeometryPass::new(PassKind::Opaque),
            transparent: GeometryPass::new(PassKind::Transparent),
            casters: BindingCache::new("Shadow Casters"),
            background: BackgroundPass,
            camera: Camera::default(),
            lights: Vec::new(),
            in_flight: None,
            last_frame: FrameGraph::default(),
            stats: FrameStats::default(),
        }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn is_initialised(&self) -> bool {
        self.targets.is_some()
    }

    pub fn color_image(&self) -> Option<ImageId> {
        self.targets.as_ref().map(|t| t.color)
    }

    pub fn depth_image(&self) -> Option<ImageId> {
        self.targets.as_ref().map(|t| t.depth)
    }

    /// Tone-mapped image the presentation layer reads once the frame's
    /// signal is raised.
    pub fn output_image(&self) -> Option<ImageId> {
        self.targets.as_ref()?.composite.as_ref().map(CompositePass::output)
    }

    pub fn ssao_output(&self) -> Option<ImageView> {
        self.targets.as_ref()?.ssao.as_ref().map(SsaoEffect::output)
    }

    pub fn bloom_output(&self) -> Option<ImageView> {
        self.targets.as_ref()?.bloom.as_ref().map(BloomEffect::output)
    }

    pub fn shadow_pool(&self) -> Option<&ShadowMapPool> {
        self.targets.as_ref().map(|t| &t.shadows)
    }

    pub fn materials(&self) -> &MaterialDataBuffer {
        &self.materials
    }

    /// Submission graph of the last rendered frame.
    pub fn last_frame(&self) -> &FrameGraph {
        &self.last_frame
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn in_flight(&self) -> Option<Signal> {
        self.in_flight
    }

    /// Allocates the frame targets, shadow pools and configured effects.
    /// On failure nothing stays allocated and the technique must not render.
    pub fn initialise(&mut self, device: &mut dyn RenderDevice) -> Result<(), TechniqueError> {
        if self.targets.is_some() {
            return Ok(());
        }

        let mut targets = FrameTargets::allocate(device, &self.settings, self.extent)
            .map_err(TechniqueError::Initialisation)?;
        if let Err(err) = self.materials.allocate(device) {
            targets.destroy(device);
            return Err(TechniqueError::Initialisation(err));
        }
        targets.scene.set(self.scene_uniform(Vec2::ZERO));

        self.opaque.initialise();
        self.transparent.initialise();
        self.targets = Some(targets);
        log::info!(
            "Technique initialised at {}x{}",
            self.extent.width,
            self.extent.height
        );
        Ok(())
    }

    /// Releases every GPU object. Safe to call more than once.
    pub fn cleanup(&mut self, device: &mut dyn RenderDevice) {
        if let Some(targets) = self.targets.take() {
            targets.destroy(device);
            log::info!("Technique targets released");
        }
        self.opaque.cleanup(device);
        self.transparent.cleanup(device);
        self.casters.clear(device);
        self.materials.release(device);
        self.in_flight = None;
    }

    /// Rebuilds everything at `extent`; there is no partial resize.
    pub fn resize(&mut self, device: &mut dyn RenderDevice, extent: Extent) -> Result<(), TechniqueError> {
        if extent == self.extent && self.is_initialised() {
            return Ok(());
        }
        self.cleanup(device);
        self.extent = extent;
        self.initialise(device)
    }

    pub fn register_material(&mut self, id: MaterialId, material: &Material) -> Result<u32, TechniqueError> {
        Ok(self.materials.add(id, material.data())?)
    }

    pub fn unregister_material(&mut self, id: MaterialId) -> Result<(), TechniqueError> {
        Ok(self.materials.remove(id)?)
    }

    pub fn notify_material_changed(&mut self, id: MaterialId, material: &Material) -> Result<(), TechniqueError> {
        Ok(self.materials.set(id, material.data())?)
    }

    /// Registers every material of `scene`. Fails on the first one that
    /// does not fit.
    pub fn register_scene_materials(&mut self, scene: &Scene) -> Result<(), TechniqueError> {
        let mut materials: Vec<(MaterialId, &Material)> = scene.materials().collect();
        materials.sort_by_key(|(id, _)| *id);
        for (id, material) in materials {
            self.register_material(id, material)?;
        }
        Ok(())
    }

    /// Takes the frame's culled lists and scene state. CPU only.
    pub fn update(&mut self, scene: &Scene, queues: &RenderQueues) -> Result<(), TechniqueError> {
        if self.targets.is_none() {
            return Err(TechniqueError::NotInitialised);
        }
        self.camera = scene.camera;
        self.background_color = scene.background;
        self.lights.clear();
        self.lights.extend_from_slice(scene.lights());

        self.stats.opaque_bindings = self.opaque.update(queues, &self.materials)?;
        self.stats.transparent_bindings = self.transparent.update(queues, &self.materials)?;
        self.casters.plan(&queues.shadow_casters, None);
        Ok(())
    }

    fn aspect(&self) -> f32 {
        self.extent.width.max(1) as f32 / self.extent.height.max(1) as f32
    }

    fn scene_uniform(&self, jitter: Vec2) -> SceneUniform {
        let size = Vec2::new(self.extent.width as f32, self.extent.height as f32);
        let proj = self.camera.jittered_proj(self.aspect(), jitter, size);
        SceneUniform::new(proj * self.camera.view(), self.camera.position(), jitter, size)
    }

    /// Shadow-casting lights that touch the view, highest priority first.
    fn visible_shadow_lights(&self, frustum: &Frustum, stats: &mut FrameStats) -> Vec<Light> {
        let eye = self.camera.position();
        let mut visible: Vec<Light> = self
            .lights
            .iter()
            .filter(|light| light.casts_shadows)
            .filter(|light| {
                let inside = frustum.intersects(&light.bounds());
                if !inside {
                    stats.culled_lights += 1;
                }
                inside
            })
            .copied()
            .collect();
        visible.sort_by(|a, b| {
            b.shadow_priority(eye)
                .total_cmp(&a.shadow_priority(eye))
                .then(a.creation_order.cmp(&b.creation_order))
        });
        visible
    }

    /// Records and submits one frame after `waits`: material flush, shadow
    /// maps, environment map, background, opaque, transparent, SSAO, bloom,
    /// composite. Returns the composite's signal, which the presentation
    /// layer must wait on before reading the output image.
    pub fn render(
        &mut self,
        device: &mut dyn RenderDevice,
        jitter: Vec2,
        waits: &[Signal],
    ) -> Result<Signal, TechniqueError> {
        if let Some(signal) = self.in_flight {
            return Err(TechniqueError::FrameInFlight(signal));
        }
        if self.targets.is_none() {
            return Err(TechniqueError::NotInitialised);
        }

        let mut stats = FrameStats::default();
        let mut graph = FrameGraph::new(waits);
        let aspect = self.aspect();
        let scene_uniform = self.scene_uniform(jitter);
        let frustum = Frustum::from_view_proj(self.camera.view_proj(aspect));
        let shadow_lights = self.visible_shadow_lights(&frustum, &mut stats);

        stats.material_writes = self.materials.update(device)?;
        let caster_draws = self.casters.realise(device, None);

        let Some(targets) = self.targets.as_mut() else {
            return Err(TechniqueError::NotInitialised);
        };
        targets.scene.set(scene_uniform);
        targets.scene.upload(device);

        // Shadow maps: each waits on the frame's roots only.
        targets.shadows.sync_lights(&self.lights, self.camera.position());
        let acquired: Vec<(Light, ShadowSlot)> = shadow_lights
            .iter()
            .filter_map(|light| match targets.shadows.acquire(light) {
                Some(slot) => Some((*light, slot)),
                None => {
                    stats.denied_shadow_slots += 1;
                    None
                }
            })
            .collect();

        let shadow_frame = ShadowFrame {
            camera: &self.camera,
            aspect,
            casters: &caster_draws,
            waits,
        };
        let mut shadow_signals = Vec::new();
        let mut shadow_maps = Vec::new();
        for (light, slot) in &acquired {
            let signals = targets
                .shadows
                .render(device, &mut graph, light, *slot, &shadow_frame);
            if signals.is_empty() {
                continue;
            }
            if let Some(map) = targets.shadows.map(*slot) {
                shadow_maps.push(ImageView::base(map.depth_image()));
                if let Some(variance) = map.variance_image() {
                    shadow_maps.push(ImageView::base(variance));
                }
            }
            stats.shadow_passes += signals.len();
            stats.shadow_lights += 1;
            shadow_signals.extend(signals);
        }

        let background_waits = match &targets.environment {
            Some(environment) => {
                let environment_waits: Vec<Signal> =
                    waits.iter().chain(&shadow_signals).copied().collect();
                shadow_maps.push(ImageView::base(environment.image()));
                environment.record(
                    device,
                    &mut graph,
                    self.background_color,
                    targets.scene.buffer(),
                    &environment_waits,
                )
            }
            None => waits.to_vec(),
        };

        let background = self.background.record(
            device,
            &mut graph,
            targets.color,
            self.background_color,
            targets.scene.buffer(),
            &background_waits,
        );

        let geometry_targets = GeometryTargets {
            color: targets.color,
            depth: targets.depth,
            scene: targets.scene.buffer(),
            materials: self.materials.buffer(),
            shadow_maps,
        };
        let opaque_waits: Vec<Signal> = std::iter::once(background)
            .chain(shadow_signals.iter().copied())
            .collect();
        let opaque = self
            .opaque
            .record(device, &mut graph, &geometry_targets, &self.materials, &opaque_waits)?;
        let transparent = self.transparent.record(
            device,
            &mut graph,
            &geometry_targets,
            &self.materials,
            &[opaque],
        )?;
        stats.opaque_bindings = self.opaque.stats();
        stats.transparent_bindings = self.transparent.stats();

        // Post effects run one after another; the composite waits on the end
        // of every chain it samples.
        let mut last = transparent;
        let mut effect_ends = Vec::with_capacity(2);
        let mut inputs = CompositeInputs {
            color: targets.color,
            occlusion: None,
            bloom: None,
        };
        if let Some(ssao) = targets.ssao.as_mut() {
            last = ssao.record(device, &mut graph, targets.depth, &[last]);
            effect_ends.push(last);
            inputs.occlusion = Some(ssao.output());
        }
        if let Some(bloom) = targets.bloom.as_mut() {
            last = bloom.record(device, &mut graph, targets.color, &[last]);
            effect_ends.push(last);
            inputs.bloom = Some(bloom.output());
        }
        if effect_ends.is_empty() {
            effect_ends.push(transparent);
        }
        if let Some(composite) = targets.composite.as_mut() {
            last = composite.record(device, &mut graph, &inputs, &effect_ends);
        }

        stats.submissions = graph.len();
        stats.opaque_draws = graph.find("Opaque").map_or(0, |r| r.draws);
        stats.transparent_draws = graph.find("Transparent").map_or(0, |r| r.draws);
        stats.skipped_drawables = stats.opaque_bindings.skipped + stats.transparent_bindings.skipped;
        log::debug!(
            "Frame submitted: {} passes, {} shadow passes, {} opaque / {} transparent draws",
            stats.submissions,
            stats.shadow_passes,
            stats.opaque_draws,
            stats.transparent_draws
        );
        log::trace!("{}", graph.describe());

        self.stats = stats;
        self.last_frame = graph;
        self.in_flight = Some(last);
        Ok(last)
    }

    /// Hands the frame's completion signal to the presentation layer; the
    /// next frame may only be recorded afterwards.
    pub fn present(&mut self, signal: Signal) -> Result<(), TechniqueError> {
        match self.in_flight {
            Some(in_flight) if in_flight == signal => {
                self.in_flight = None;
                Ok(())
            }
            _ => Err(TechniqueError::UnknownSignal(signal)),
        }
    }

    /// World-space position the shadow priorities were ranked from.
    pub fn view_position(&self) -> Vec3 {
        self.camera.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::headless::HeadlessDevice;

    fn small_settings() -> RenderSettings {
        let mut settings = RenderSettings::default();
        settings.shadow_map_size = 64;
        settings
    }

    #[test]
    fn render_requires_initialise() {
        let mut device = HeadlessDevice::new();
        let mut technique = Technique::new(small_settings(), Extent::new(32, 32));
        assert_eq!(
            technique.render(&mut device, Vec2::ZERO, &[]),
            Err(TechniqueError::NotInitialised)
        );
        assert_eq!(
            technique.update(&Scene::default(), &RenderQueues::new()),
            Err(TechniqueError::NotInitialised)
        );
    }

    #[test]
    fn second_render_needs_present() {
        let mut device = HeadlessDevice::new();
        let mut technique = Technique::new(small_settings(), Extent::new(32, 32));
        technique.initialise(&mut device).unwrap();

        let first = technique.render(&mut device, Vec2::ZERO, &[]).unwrap();
        assert_eq!(
            technique.render(&mut device, Vec2::ZERO, &[]),
            Err(TechniqueError::FrameInFlight(first))
        );
        assert_eq!(
            technique.present(Signal::from_raw(9999)),
            Err(TechniqueError::UnknownSignal(Signal::from_raw(9999)))
        );
        technique.present(first).unwrap();
        assert!(technique.render(&mut device, Vec2::ZERO, &[]).is_ok());
    }

    #[test]
    fn jitter_reaches_scene_uniform() {
        let mut device = HeadlessDevice::new();
        let mut technique = Technique::new(small_settings(), Extent::new(64, 32));
        technique.initialise(&mut device).unwrap();
        technique.render(&mut device, Vec2::new(0.25, -0.5), &[]).unwrap();

        let scene = technique.targets.as_ref().unwrap().scene.get();
        assert_eq!(scene.jitter, [0.25, -0.5]);
        assert_eq!(scene.target_size, [64.0, 32.0]);
    }
}
