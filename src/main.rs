use glam::{Quat, Vec2, Vec3};

use wgpu_frame::renderer::{cube_mesh, ImageView};
use wgpu_frame::scene::{Camera, Light, Material, Scene, Transform};
use wgpu_frame::{
    init_logging, DeviceError, HeadlessDevice, RenderDevice, RenderSettings, Technique,
    TechniqueError, WgpuDevice,
};

const FRAME_COUNT: usize = 4;
const PREVIEW_PATH: &str = "frame.png";

/// Sub-pixel offsets cycled across frames.
const JITTER: [Vec2; 4] = [
    Vec2::new(0.25, -0.25),
    Vec2::new(-0.25, 0.25),
    Vec2::new(0.125, 0.375),
    Vec2::new(-0.375, -0.125),
];

fn build_scene(device: &mut dyn RenderDevice) -> Result<Scene, DeviceError> {
    let (vertices, indices) = cube_mesh();
    let cube = device.create_mesh("Cube", &vertices, &indices)?;
    let index_count = indices.len() as u32;

    let mut scene = Scene::new(Camera {
        eye: Vec3::new(0.0, 4.0, 9.0),
        target: Vec3::new(0.0, 0.5, 0.0),
        ..Camera::default()
    });

    let floor = scene.add_material(Material::rgb(0.6, 0.6, 0.6).with_roughness(0.9));
    let red = scene.add_material(Material::rgb(0.8, 0.1, 0.1).with_metallic(0.2));
    let glass = scene.add_material(Material::new([0.4, 0.7, 1.0, 0.35]).with_alpha());

    scene.add_drawable(
        cube,
        index_count,
        floor,
        Transform::from_translation(Vec3::new(0.0, -0.1, 0.0))
            .with_scale(Vec3::new(12.0, 0.2, 12.0))
            .matrix(),
    );
    for i in 0..5 {
        let x = i as f32 * 1.8 - 3.6;
        let placement = Transform::from_translation(Vec3::new(x, 0.5, 0.0))
            .with_rotation(Quat::from_rotation_y(i as f32 * 0.3));
        scene.add_drawable(cube, index_count, red, placement.matrix());
    }
    scene.add_drawable(
        cube,
        index_count,
        glass,
        Transform::from_translation(Vec3::new(0.0, 0.6, 2.0)).matrix(),
    );

    scene.add_light(Light::directional(Vec3::new(-0.4, -1.0, -0.3), 3.0).with_shadows(true));
    for (i, color) in [Vec3::X, Vec3::Y, Vec3::Z].into_iter().enumerate() {
        let x = i as f32 * 3.0 - 3.0;
        scene.add_light(
            Light::point(Vec3::new(x, 2.0, 1.5), 8.0, 6.0)
                .with_color(color)
                .with_shadows(true),
        );
    }
    scene.add_light(
        Light::spot(Vec3::new(0.0, 5.0, 4.0), Vec3::new(0.0, -1.0, -0.8), 12.0, 15.0)
            .with_cone(0.3, 0.5)
            .with_shadows(true),
    );

    Ok(scene)
}

fn render_frames(
    device: &mut dyn RenderDevice,
    technique: &mut Technique,
    scene: &Scene,
) -> Result<(), TechniqueError> {
    let extent = technique.extent();
    let aspect = extent.width as f32 / extent.height.max(1) as f32;

    for (frame, jitter) in JITTER.iter().cycle().take(FRAME_COUNT).enumerate() {
        let queues = scene.build_queues(aspect);
        technique.update(scene, &queues)?;

        let acquired = device.create_signal();
        let done = technique.render(device, *jitter, &[acquired])?;
        let stats = technique.stats();
        log::info!(
            "Frame {}: {} submissions, {} shadow passes, {} opaque / {} transparent draws, {} material writes",
            frame,
            stats.submissions,
            stats.shadow_passes,
            stats.opaque_draws,
            stats.transparent_draws,
            stats.material_writes
        );
        technique.present(done)?;
    }

    log::info!("Last frame:\n{}", technique.last_frame().describe());
    Ok(())
}

fn run(device: &mut dyn RenderDevice, settings: RenderSettings) -> Result<Technique, TechniqueError> {
    let extent = settings.resolution.extent();
    let mut technique = Technique::new(settings, extent);
    let scene = build_scene(device)?;

    technique.initialise(device)?;
    technique.register_scene_materials(&scene)?;
    if let Err(err) = render_frames(device, &mut technique, &scene) {
        technique.cleanup(device);
        return Err(err);
    }
    Ok(technique)
}

/// Writes the headless presented image as a PNG.
fn write_preview(device: &HeadlessDevice, technique: &Technique) -> Result<(), image::ImageError> {
    let Some(output) = technique.output_image() else {
        return Ok(());
    };
    let Some(texels) = device.read_image(ImageView::base(output)) else {
        return Ok(());
    };
    let extent = technique.extent();
    let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    let preview = image::RgbaImage::from_fn(extent.width, extent.height, |x, y| {
        let texel = texels[(y * extent.width + x) as usize];
        image::Rgba([to_byte(texel[0]), to_byte(texel[1]), to_byte(texel[2]), to_byte(texel[3])])
    });
    preview.save(PREVIEW_PATH)?;
    log::info!("Preview written to {}", PREVIEW_PATH);
    Ok(())
}

fn main() {
    init_logging();
    let settings = RenderSettings::load();
    let use_gpu = std::env::args().any(|arg| arg == "--wgpu");
    let write_png = std::env::args().any(|arg| arg == "--png");

    let result = if use_gpu {
        WgpuDevice::headless()
            .map_err(TechniqueError::from)
            .and_then(|mut device| {
                let mut technique = run(&mut device, settings)?;
                technique.cleanup(&mut device);
                Ok(())
            })
    } else {
        let mut device = HeadlessDevice::new();
        run(&mut device, settings).map(|mut technique| {
            if write_png {
                if let Err(err) = write_preview(&device, &technique) {
                    log::warn!("Could not write preview: {}", err);
                }
            }
            technique.cleanup(&mut device);
            log::info!(
                "Released everything: {} images, {} buffers still live",
                device.live_image_count(),
                device.live_buffer_count()
            );
        })
    };

    if let Err(err) = result {
        log::error!("Demo failed: {}", err);
        std::process::exit(1);
    }
}
