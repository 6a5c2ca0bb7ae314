//! Submission order and wait edges of whole frames on the headless device.

use glam::{Mat4, Vec2, Vec3};

use wgpu_frame::renderer::{
    cube_mesh, Extent, FrameGraph, HeadlessDevice, ImageView, PassCategory, RenderDevice,
    ShadowSlot, Signal, Technique,
};
use wgpu_frame::scene::{Light, LightKind, Material, Scene};
use wgpu_frame::{RenderSettings, TechniqueError};

const EXTENT: Extent = Extent::new(64, 32);

fn small_settings() -> RenderSettings {
    let mut settings = RenderSettings::default();
    settings.shadow_map_size = 32;
    settings
}

/// One opaque cube, one transparent cube, nothing lit yet.
fn base_scene(device: &mut HeadlessDevice) -> Scene {
    let (vertices, indices) = cube_mesh();
    let cube = device.create_mesh("Cube", &vertices, &indices).unwrap();
    let mut scene = Scene::default();
    let opaque = scene.add_material(Material::rgb(0.8, 0.2, 0.2));
    let glass = scene.add_material(Material::new([0.2, 0.4, 0.9, 0.5]).with_alpha());
    scene.add_drawable(cube, indices.len() as u32, opaque, Mat4::IDENTITY);
    scene.add_drawable(
        cube,
        indices.len() as u32,
        glass,
        Mat4::from_translation(Vec3::new(0.5, 0.0, 1.0)),
    );
    scene
}

fn prepared(settings: RenderSettings, scene: &Scene, device: &mut HeadlessDevice) -> Technique {
    let mut technique = Technique::new(settings, EXTENT);
    technique.initialise(device).unwrap();
    technique.register_scene_materials(scene).unwrap();
    let queues = scene.build_queues(EXTENT.width as f32 / EXTENT.height as f32);
    technique.update(scene, &queues).unwrap();
    technique
}

fn signal_of(graph: &FrameGraph, label: &str) -> Signal {
    graph
        .find(label)
        .unwrap_or_else(|| panic!("no '{label}' pass in\n{}", graph.describe()))
        .sync
        .signal
}

#[test]
fn opaque_pass_waits_on_the_shadow_signal() {
    let mut device = HeadlessDevice::new();
    let mut scene = base_scene(&mut device);
    scene.add_light(
        Light::spot(Vec3::new(0.0, 3.0, 0.0), Vec3::NEG_Y, 10.0, 10.0)
            .with_cone(0.3, 0.6)
            .with_shadows(true),
    );
    let mut technique = prepared(small_settings(), &scene, &mut device);

    let acquired = device.create_signal();
    let done = technique.render(&mut device, Vec2::ZERO, &[acquired]).unwrap();
    let graph = technique.last_frame();

    let shadow = signal_of(graph, "Shadow Spot 0 Layer 0");
    let opaque = graph.find("Opaque").unwrap();
    assert!(opaque.sync.waits.contains(&shadow));
    assert_eq!(graph.producer_of(shadow).unwrap().sync.waits.as_slice(), &[acquired]);
    assert!(graph.is_ordered_before(shadow, done));
    assert!(graph.unordered_hazards().is_empty(), "{:?}", graph.unordered_hazards());
}

#[test]
fn passes_follow_the_frame_order() {
    let mut device = HeadlessDevice::new();
    let mut scene = base_scene(&mut device);
    scene.add_light(Light::directional(Vec3::new(-0.3, -1.0, -0.2), 2.0).with_shadows(true));
    let mut technique = prepared(small_settings(), &scene, &mut device);

    let acquired = device.create_signal();
    let done = technique.render(&mut device, Vec2::ZERO, &[acquired]).unwrap();
    let graph = technique.last_frame();

    let background = signal_of(graph, "Background");
    let opaque = signal_of(graph, "Opaque");
    let transparent = signal_of(graph, "Transparent");
    let ssao = signal_of(graph, "SSAO");
    let bloom = signal_of(graph, "Bloom Bright Pass");

    assert!(graph.is_ordered_before(background, opaque));
    assert!(graph.is_ordered_before(opaque, transparent));
    assert!(graph.is_ordered_before(transparent, ssao));
    assert!(graph.is_ordered_before(ssao, bloom));
    assert!(graph.is_ordered_before(bloom, done));
    assert_eq!(graph.records().last().unwrap().sync.signal, done);
    assert_eq!(signal_of(graph, "Composite"), done);

    // Every cascade is drawn and sampled by the opaque pass.
    let cascades: Vec<Signal> = graph
        .by_category(PassCategory::Shadow)
        .map(|record| record.sync.signal)
        .collect();
    assert_eq!(cascades.len(), 4);
    for cascade in &cascades {
        assert!(graph.is_ordered_before(*cascade, opaque));
    }

    let stats = technique.stats();
    assert_eq!(stats.shadow_lights, 1);
    assert_eq!(stats.shadow_passes, 4);
    assert_eq!(stats.opaque_draws, 1);
    assert_eq!(stats.transparent_draws, 1);
    assert_eq!(stats.submissions, graph.len());
    assert!(graph.unordered_hazards().is_empty());
}

#[test]
fn composite_reads_every_post_effect_and_ends_the_frame() {
    let mut device = HeadlessDevice::new();
    let scene = base_scene(&mut device);
    let mut technique = prepared(small_settings(), &scene, &mut device);

    let done = technique.render(&mut device, Vec2::ZERO, &[]).unwrap();
    let graph = technique.last_frame();
    let composite = graph.find("Composite").unwrap();
    assert_eq!(composite.category, PassCategory::Composite);
    assert_eq!(composite.sync.signal, done);
    assert_eq!(graph.records().last().unwrap().label, "Composite");

    let ssao = technique.ssao_output().unwrap().image;
    let bloom = technique.bloom_output().unwrap().image;
    let color = technique.color_image().unwrap();
    for image in [ssao, bloom, color] {
        assert!(composite.reads.contains(&image), "{image:?}");
    }
    assert_eq!(composite.writes, vec![technique.output_image().unwrap()]);

    // Waits on the end of both chains.
    let ssao_end = graph.records().iter().rev().find(|r| r.label.starts_with("SSAO")).unwrap();
    let bloom_end = graph.records().iter().rev().find(|r| r.label.starts_with("Bloom")).unwrap();
    assert!(composite.sync.waits.contains(&ssao_end.sync.signal));
    assert!(composite.sync.waits.contains(&bloom_end.sync.signal));
    assert!(graph.unordered_hazards().is_empty());

    // Headless frames draw nothing, so the output is the tone-mapped clear colour.
    let output = technique.output_image().unwrap();
    let texels = device.read_image(ImageView::base(output)).unwrap();
    assert_eq!(texels.len(), EXTENT.texel_count());
    assert!(texels.iter().all(|texel| texel[3] == 1.0));
}

#[test]
fn composite_follows_transparent_without_post_effects() {
    let mut device = HeadlessDevice::new();
    let scene = base_scene(&mut device);
    let mut settings = small_settings();
    settings.ssao.enabled = false;
    settings.bloom.enabled = false;
    let mut technique = prepared(settings, &scene, &mut device);

    let done = technique.render(&mut device, Vec2::ZERO, &[]).unwrap();
    let graph = technique.last_frame();
    let transparent = signal_of(graph, "Transparent");
    let composite = graph.find("Composite").unwrap();
    assert_eq!(composite.sync.waits.as_slice(), &[transparent]);
    assert_eq!(composite.sync.signal, done);
    assert_eq!(graph.by_category(PassCategory::PostEffect).count(), 0);
    assert_eq!(composite.reads, vec![technique.color_image().unwrap()]);
}

#[test]
fn shadow_passes_are_unordered_between_each_other() {
    let mut device = HeadlessDevice::new();
    let mut scene = base_scene(&mut device);
    scene.add_light(Light::point(Vec3::new(0.0, 1.5, 0.0), 5.0, 6.0).with_shadows(true));
    scene.add_light(
        Light::spot(Vec3::new(1.0, 3.0, 0.0), Vec3::NEG_Y, 8.0, 10.0).with_shadows(true),
    );
    let mut technique = prepared(small_settings(), &scene, &mut device);

    let acquired = device.create_signal();
    technique.render(&mut device, Vec2::ZERO, &[acquired]).unwrap();
    let graph = technique.last_frame();

    let shadows: Vec<Signal> = graph
        .by_category(PassCategory::Shadow)
        .map(|record| record.sync.signal)
        .collect();
    assert_eq!(shadows.len(), 7);
    for a in &shadows {
        for b in &shadows {
            assert!(!graph.is_ordered_before(*a, *b));
        }
    }
    for record in graph.by_category(PassCategory::Shadow) {
        assert_eq!(record.sync.waits.as_slice(), &[acquired]);
    }
}

#[test]
fn environment_map_sits_between_shadows_and_background() {
    let mut device = HeadlessDevice::new();
    let mut scene = base_scene(&mut device);
    scene.add_light(
        Light::spot(Vec3::new(0.0, 3.0, 0.0), Vec3::NEG_Y, 10.0, 10.0).with_shadows(true),
    );
    let mut settings = small_settings();
    settings.environment_map.enabled = true;
    settings.environment_map.size = 8;
    let mut technique = prepared(settings, &scene, &mut device);

    let acquired = device.create_signal();
    technique.render(&mut device, Vec2::ZERO, &[acquired]).unwrap();
    let graph = technique.last_frame();

    let shadow = signal_of(graph, "Shadow Spot 0 Layer 0");
    let background = signal_of(graph, "Background");
    let faces: Vec<_> = graph.by_category(PassCategory::Environment).collect();
    assert_eq!(faces.len(), 6);
    for face in faces {
        assert!(face.sync.waits.contains(&shadow));
        assert!(graph.is_ordered_before(face.sync.signal, background));
    }
    assert!(graph.unordered_hazards().is_empty());
}

#[test]
fn shadow_slots_are_bounded_per_kind() {
    let mut device = HeadlessDevice::new();
    let mut scene = base_scene(&mut device);
    let mut ids = Vec::new();
    for (i, intensity) in [4.0, 9.0, 6.0].into_iter().enumerate() {
        ids.push(scene.add_light(
            Light::spot(Vec3::new(i as f32 - 1.0, 3.0, 0.0), Vec3::NEG_Y, intensity, 10.0)
                .with_shadows(true),
        ));
    }
    let mut settings = small_settings();
    settings.shadow_pools.spot = 1;
    let mut technique = prepared(settings, &scene, &mut device);

    let done = technique.render(&mut device, Vec2::ZERO, &[]).unwrap();
    let stats = technique.stats();
    assert_eq!(stats.shadow_lights, 1);
    assert_eq!(stats.denied_shadow_slots, 2);

    let pool = technique.shadow_pool().unwrap();
    assert_eq!(pool.capacity(LightKind::Spot), 1);
    assert_eq!(pool.assigned_count(LightKind::Spot), 1);
    let slot = ShadowSlot {
        kind: LightKind::Spot,
        index: 0,
    };
    assert_eq!(pool.holder_of(slot), Some(ids[1]));

    // The next frame keeps the same holder.
    technique.present(done).unwrap();
    technique.render(&mut device, Vec2::ZERO, &[]).unwrap();
    assert_eq!(technique.shadow_pool().unwrap().holder_of(slot), Some(ids[1]));
}

#[test]
fn lights_outside_the_view_are_not_shadowed() {
    let mut device = HeadlessDevice::new();
    let mut scene = base_scene(&mut device);
    scene.add_light(
        Light::point(Vec3::new(0.0, 0.0, 60.0), 50.0, 2.0).with_shadows(true),
    );
    let mut technique = prepared(small_settings(), &scene, &mut device);

    technique.render(&mut device, Vec2::ZERO, &[]).unwrap();
    let stats = technique.stats();
    assert_eq!(stats.culled_lights, 1);
    assert_eq!(stats.shadow_passes, 0);
    assert_eq!(technique.last_frame().by_category(PassCategory::Shadow).count(), 0);
}

#[test]
fn frames_are_gated_on_presentation() {
    let mut device = HeadlessDevice::new();
    let scene = base_scene(&mut device);
    let mut technique = prepared(small_settings(), &scene, &mut device);

    let first = technique.render(&mut device, Vec2::ZERO, &[]).unwrap();
    assert_eq!(technique.in_flight(), Some(first));
    assert_eq!(
        technique.render(&mut device, Vec2::ZERO, &[]),
        Err(TechniqueError::FrameInFlight(first))
    );

    technique.present(first).unwrap();
    assert_eq!(
        technique.present(first),
        Err(TechniqueError::UnknownSignal(first))
    );
    let second = technique.render(&mut device, Vec2::ZERO, &[]).unwrap();
    assert_ne!(first, second);
    assert!(device.is_raised(second));
}
