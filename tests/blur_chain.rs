//! Blur chains executed on the headless device.

use glam::Vec2;

use wgpu_frame::renderer::{
    BlurChain, Extent, FrameGraph, HeadlessDevice, ImageDesc, ImageFormat, ImageView, PassCategory,
    RenderDevice, Technique,
};
use wgpu_frame::RenderSettings;

fn source_image(device: &mut HeadlessDevice, extent: Extent) -> ImageView {
    let image = device
        .create_image(&ImageDesc::render_target("Source", extent, ImageFormat::Rgba16Float))
        .unwrap();
    ImageView::base(image)
}

fn checkerboard(extent: Extent) -> Vec<[f32; 4]> {
    (0..extent.height)
        .flat_map(|y| (0..extent.width).map(move |x| (x, y)))
        .map(|(x, y)| {
            let on = (x + y) % 2 == 0;
            [if on { 1.0 } else { 0.0 }, x as f32, y as f32, 1.0]
        })
        .collect()
}

#[test]
fn zero_radius_copies_the_source_unchanged() {
    let mut device = HeadlessDevice::new();
    let extent = Extent::new(16, 8);
    let source = source_image(&mut device, extent);
    let pattern = checkerboard(extent);
    device.write_image(source, pattern.clone()).unwrap();

    let mut chain = BlurChain::build(&mut device, "Identity", source, 5, 0).unwrap();
    assert_eq!(chain.pass_count(), 1);
    assert_eq!(chain.output_extent(&device), Some(extent));

    let mut graph = FrameGraph::default();
    let start = device.create_signal();
    let done = chain.record(&mut device, &mut graph, &[start]);

    assert!(device.is_raised(done));
    assert_eq!(graph.by_category(PassCategory::PostEffect).count(), 1);
    assert_eq!(device.read_image(chain.output()).unwrap(), pattern);
}

#[test]
fn blur_preserves_a_constant_image() {
    let mut device = HeadlessDevice::new();
    let extent = Extent::new(32, 32);
    let source = source_image(&mut device, extent);
    device
        .write_image(source, vec![[0.25, 0.5, 0.75, 1.0]; extent.texel_count()])
        .unwrap();

    let mut chain = BlurChain::build(&mut device, "Constant", source, 3, 3).unwrap();
    let mut graph = FrameGraph::default();
    chain.record(&mut device, &mut graph, &[]);

    let output = device.read_image(chain.output()).unwrap();
    assert_eq!(output.len(), Extent::new(4, 4).texel_count());
    for texel in output {
        for (channel, expected) in texel.iter().zip([0.25, 0.5, 0.75, 1.0]) {
            assert!((channel - expected).abs() < 1e-4, "{texel:?}");
        }
    }
}

#[test]
fn chain_subpasses_are_strictly_sequential() {
    let mut device = HeadlessDevice::new();
    let source = source_image(&mut device, Extent::new(64, 64));
    let mut chain = BlurChain::build(&mut device, "Chain", source, 4, 2).unwrap();

    let mut graph = FrameGraph::default();
    let start = device.create_signal();
    let done = chain.record(&mut device, &mut graph, &[start]);

    let records = graph.records();
    assert_eq!(records.len(), 4);
    assert_eq!(records[0].sync.waits.as_slice(), &[start]);
    for pair in records.windows(2) {
        assert_eq!(pair[1].sync.waits.as_slice(), &[pair[0].sync.signal]);
    }
    assert_eq!(records[3].sync.signal, done);
    assert!(graph.unordered_hazards().is_empty());
}

#[test]
fn blur_spreads_a_single_bright_texel() {
    let mut device = HeadlessDevice::new();
    let extent = Extent::new(16, 16);
    let source = source_image(&mut device, extent);
    let mut texels = vec![[0.0; 4]; extent.texel_count()];
    // Odd coordinates survive the nearest-texel halving.
    texels[9 * 16 + 9] = [1.0; 4];
    device.write_image(source, texels).unwrap();

    let mut chain = BlurChain::build(&mut device, "Spread", source, 1, 2).unwrap();
    let mut graph = FrameGraph::default();
    chain.record(&mut device, &mut graph, &[]);

    let output = device.read_image(chain.output()).unwrap();
    let lit = output.iter().filter(|texel| texel[0] > 0.0).count();
    assert!(lit > 1, "blur left {lit} lit texels");
    assert!(output.iter().all(|texel| texel[0] < 1.0));
}

#[test]
fn ssao_with_zero_kernel_keeps_full_resolution() {
    let mut settings = RenderSettings::default();
    settings.shadow_map_size = 32;
    settings.ssao.blur_kernel_size = 0;
    settings.ssao.blur_passes_count = 3;
    let extent = Extent::new(40, 24);

    let mut device = HeadlessDevice::new();
    let mut technique = Technique::new(settings, extent);
    technique.initialise(&mut device).unwrap();
    technique.render(&mut device, Vec2::ZERO, &[]).unwrap();

    let output = technique.ssao_output().unwrap();
    assert_eq!(device.image_desc(output.image).unwrap().extent, extent);
    assert!(technique.last_frame().find("SSAO Blur 0").is_some());
    assert!(technique.last_frame().find("SSAO Blur 1").is_none());
    // Nothing occludes in an empty frame.
    assert!(device
        .read_image(output)
        .unwrap()
        .iter()
        .all(|texel| texel[0] == 1.0));
}
