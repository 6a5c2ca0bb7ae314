//! Allocation lifecycle: initialise, resize, cleanup, failure and the
//! material buffer driven through the technique.

use glam::{Mat4, Vec2, Vec3};

use wgpu_frame::renderer::{cube_mesh, Extent, HeadlessDevice, PassOp, RenderDevice, Technique};
use wgpu_frame::scene::{Material, Scene};
use wgpu_frame::settings::RenderSettings;
use wgpu_frame::{DeviceError, TechniqueError};

fn small_settings() -> RenderSettings {
    let mut settings = RenderSettings::default();
    settings.shadow_map_size = 32;
    settings.shadow_pools.point = 2;
    settings.shadow_pools.spot = 2;
    settings
}

#[test]
fn resize_reallocates_the_same_object_set() {
    let mut device = HeadlessDevice::new();
    let mut technique = Technique::new(small_settings(), Extent::new(64, 32));
    technique.initialise(&mut device).unwrap();
    let images = device.live_image_count();
    let buffers = device.live_buffer_count();

    technique.resize(&mut device, Extent::new(128, 96)).unwrap();
    assert_eq!(device.live_image_count(), images);
    assert_eq!(device.live_buffer_count(), buffers);
    let color = technique.color_image().unwrap();
    assert_eq!(device.image_desc(color).unwrap().extent, Extent::new(128, 96));

    technique.resize(&mut device, Extent::new(64, 32)).unwrap();
    assert_eq!(device.live_image_count(), images);
    assert_eq!(device.live_buffer_count(), buffers);
    assert!(technique.render(&mut device, Vec2::ZERO, &[]).is_ok());
}

#[test]
fn repeated_rebuilds_match_a_single_one() {
    let mut device = HeadlessDevice::new();
    let mut technique = Technique::new(small_settings(), Extent::new(64, 32));
    technique.initialise(&mut device).unwrap();
    technique.resize(&mut device, Extent::new(80, 40)).unwrap();
    let images = device.live_image_count();
    let buffers = device.live_buffer_count();

    for _ in 0..2 {
        technique.cleanup(&mut device);
        technique.resize(&mut device, Extent::new(80, 40)).unwrap();
    }
    assert!(technique.is_initialised());
    assert_eq!(technique.extent(), Extent::new(80, 40));
    assert_eq!(device.live_image_count(), images);
    assert_eq!(device.live_buffer_count(), buffers);
    assert!(technique.render(&mut device, Vec2::ZERO, &[]).is_ok());
}

#[test]
fn resize_to_the_same_extent_is_a_no_op() {
    let mut device = HeadlessDevice::new();
    let mut technique = Technique::new(small_settings(), Extent::new(64, 32));
    technique.initialise(&mut device).unwrap();
    let color = technique.color_image();

    technique.resize(&mut device, Extent::new(64, 32)).unwrap();
    assert_eq!(technique.color_image(), color);
}

#[test]
fn cleanup_releases_everything_and_is_idempotent() {
    let mut device = HeadlessDevice::new();
    let mut technique = Technique::new(small_settings(), Extent::new(64, 32));
    technique.initialise(&mut device).unwrap();
    assert!(device.live_image_count() > 0);

    technique.cleanup(&mut device);
    assert_eq!(device.live_image_count(), 0);
    assert_eq!(device.live_buffer_count(), 0);
    assert!(!technique.is_initialised());

    technique.cleanup(&mut device);
    assert_eq!(device.live_image_count(), 0);
    assert_eq!(
        technique.render(&mut device, Vec2::ZERO, &[]),
        Err(TechniqueError::NotInitialised)
    );
}

#[test]
fn failed_initialise_leaves_nothing_behind() {
    let mut succeeded = false;
    for budget in 0..96 {
        let mut device = HeadlessDevice::with_image_budget(budget);
        let mut technique = Technique::new(small_settings(), Extent::new(64, 32));

        match technique.initialise(&mut device) {
            Ok(()) => {
                succeeded = true;
                technique.cleanup(&mut device);
            }
            Err(err) => {
                assert!(
                    matches!(
                        err,
                        TechniqueError::Initialisation(DeviceError::ImageAllocation { .. })
                    ),
                    "budget {budget}: {err}"
                );
                assert!(!technique.is_initialised());
            }
        }
        assert_eq!(device.live_image_count(), 0, "budget {budget}");
        assert_eq!(device.live_buffer_count(), 0, "budget {budget}");
    }
    assert!(succeeded);
}

#[test]
fn material_slots_stay_contiguous() {
    let mut device = HeadlessDevice::new();
    let mut technique = Technique::new(small_settings(), Extent::new(64, 32));
    technique.initialise(&mut device).unwrap();

    let mut scene = Scene::default();
    let a = scene.add_material(Material::rgb(1.0, 0.0, 0.0));
    let b = scene.add_material(Material::rgb(0.0, 1.0, 0.0));
    let c = scene.add_material(Material::rgb(0.0, 0.0, 1.0));
    for id in [a, b, c] {
        technique
            .register_material(id, scene.material(id).unwrap())
            .unwrap();
    }
    assert_eq!(technique.materials().id_of(c), 3);

    technique.unregister_material(b).unwrap();
    assert_eq!(technique.materials().id_of(a), 1);
    assert_eq!(technique.materials().id_of(b), 0);
    assert_eq!(technique.materials().id_of(c), 2);

    let d = scene.add_material(Material::rgb(1.0, 1.0, 1.0));
    let slot = technique
        .register_material(d, scene.material(d).unwrap())
        .unwrap();
    assert_eq!(slot, 3);
}

#[test]
fn material_changes_coalesce_into_one_write_per_frame() {
    let mut device = HeadlessDevice::new();
    let mut technique = Technique::new(small_settings(), Extent::new(64, 32));
    technique.initialise(&mut device).unwrap();

    let mut scene = Scene::default();
    let a = scene.add_material(Material::rgb(1.0, 0.0, 0.0));
    scene.add_material(Material::rgb(0.0, 1.0, 0.0));
    technique.register_scene_materials(&scene).unwrap();

    let done = technique.render(&mut device, Vec2::ZERO, &[]).unwrap();
    assert_eq!(technique.stats().material_writes, 2);
    technique.present(done).unwrap();

    for roughness in [0.1, 0.5, 0.9] {
        let material = Material::rgb(1.0, 0.0, 0.0).with_roughness(roughness);
        technique.notify_material_changed(a, &material).unwrap();
    }
    let buffer = technique.materials().buffer().unwrap();
    let before = device.writes_to(buffer).count();
    let done = technique.render(&mut device, Vec2::ZERO, &[]).unwrap();
    assert_eq!(technique.stats().material_writes, 1);
    assert_eq!(device.writes_to(buffer).count(), before + 1);

    let contents = device.buffer_contents(buffer).unwrap();
    let record = &contents[..48];
    let roughness = f32::from_le_bytes([record[32], record[33], record[34], record[35]]);
    assert_eq!(roughness, 0.9);

    // Nothing changed since: no writes at all.
    technique.present(done).unwrap();
    technique.render(&mut device, Vec2::ZERO, &[]).unwrap();
    assert_eq!(technique.stats().material_writes, 0);
}

#[test]
fn unregistered_materials_are_skipped_not_drawn() {
    let mut device = HeadlessDevice::new();
    let (vertices, indices) = cube_mesh();
    let cube = device.create_mesh("Cube", &vertices, &indices).unwrap();

    let mut scene = Scene::default();
    let known = scene.add_material(Material::rgb(0.5, 0.5, 0.5));
    let unknown = scene.add_material(Material::rgb(0.1, 0.1, 0.1));
    scene.add_drawable(cube, indices.len() as u32, known, Mat4::IDENTITY);
    scene.add_drawable(cube, indices.len() as u32, unknown, Mat4::from_translation(Vec3::X));

    let mut technique = Technique::new(small_settings(), Extent::new(64, 32));
    technique.initialise(&mut device).unwrap();
    technique
        .register_material(known, scene.material(known).unwrap())
        .unwrap();
    technique
        .update(&scene, &scene.build_queues(2.0))
        .unwrap();
    technique.render(&mut device, Vec2::ZERO, &[]).unwrap();

    let stats = technique.stats();
    assert_eq!(stats.opaque_draws, 1);
    assert_eq!(stats.skipped_drawables, 1);
}

#[test]
fn material_capacity_is_enforced() {
    let mut settings = small_settings();
    settings.material_capacity = 2;
    let mut technique = Technique::new(settings, Extent::new(16, 16));

    let mut scene = Scene::default();
    let ids: Vec<_> = (0..3)
        .map(|i| scene.add_material(Material::rgb(i as f32, 0.0, 0.0)))
        .collect();
    technique
        .register_material(ids[0], scene.material(ids[0]).unwrap())
        .unwrap();
    technique
        .register_material(ids[1], scene.material(ids[1]).unwrap())
        .unwrap();
    let overflow = technique.register_material(ids[2], scene.material(ids[2]).unwrap());
    assert!(matches!(overflow, Err(TechniqueError::Material(_))));
}

fn opaque_slots(device: &HeadlessDevice) -> Vec<u32> {
    let submitted = device
        .submissions()
        .iter()
        .rev()
        .find(|submission| submission.label == "Opaque")
        .unwrap();
    let PassOp::Raster(raster) = &submitted.pass.op else {
        panic!("opaque pass is a raster pass");
    };
    let mut slots: Vec<u32> = raster.draws.iter().map(|draw| draw.material_slot).collect();
    slots.sort();
    slots
}

#[test]
fn slots_follow_unregistration_between_update_and_render() {
    let mut device = HeadlessDevice::new();
    let (vertices, indices) = cube_mesh();
    let cube = device.create_mesh("Cube", &vertices, &indices).unwrap();

    let mut scene = Scene::default();
    let a = scene.add_material(Material::rgb(1.0, 0.0, 0.0));
    let b = scene.add_material(Material::rgb(0.0, 1.0, 0.0));
    scene.add_drawable(cube, indices.len() as u32, a, Mat4::IDENTITY);
    scene.add_drawable(cube, indices.len() as u32, b, Mat4::from_translation(Vec3::X));

    let mut technique = Technique::new(small_settings(), Extent::new(64, 32));
    technique.initialise(&mut device).unwrap();
    technique.register_scene_materials(&scene).unwrap();
    technique.update(&scene, &scene.build_queues(2.0)).unwrap();

    technique.unregister_material(a).unwrap();
    let done = technique.render(&mut device, Vec2::ZERO, &[]).unwrap();
    assert_eq!(technique.materials().id_of(b), 1);
    assert_eq!(opaque_slots(&device), vec![1]);
    assert_eq!(technique.stats().skipped_drawables, 1);

    // Re-registered without another update: both draw again at live slots.
    technique.present(done).unwrap();
    technique
        .register_material(a, scene.material(a).unwrap())
        .unwrap();
    technique.render(&mut device, Vec2::ZERO, &[]).unwrap();
    assert_eq!(opaque_slots(&device), vec![1, 2]);
    assert_eq!(technique.stats().skipped_drawables, 0);
}
