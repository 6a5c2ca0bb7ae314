//! Light-space matrices produced for each shadow map kind.
//!
//! Conventions: right-handed view space, NDC depth in [0, 1].

use glam::{Mat4, Vec2, Vec3, Vec4};

use wgpu_frame::renderer::{HeadlessDevice, ShadowMap, ShadowSlot};
use wgpu_frame::scene::{Camera, Light, LightKind};

const EPSILON: f32 = 1e-3;
const ASPECT: f32 = 16.0 / 9.0;

fn compute_ndc(matrix: Mat4, world_pos: Vec3) -> Vec3 {
    let clip = matrix * world_pos.extend(1.0);
    clip.truncate() / clip.w
}

fn shadow_map(kind: LightKind, layers: u32) -> ShadowMap {
    let mut device = HeadlessDevice::new();
    ShadowMap::new(&mut device, ShadowSlot { kind, index: 0 }, layers, 16, false).unwrap()
}

fn assert_inside(ndc: Vec3) {
    assert!(ndc.x.abs() <= 1.0 + EPSILON, "{ndc:?}");
    assert!(ndc.y.abs() <= 1.0 + EPSILON, "{ndc:?}");
    assert!(ndc.z >= -EPSILON && ndc.z <= 1.0 + EPSILON, "{ndc:?}");
}

#[test]
fn spot_light_centres_its_axis() {
    let light = Light::spot(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y, 10.0, 12.0);
    let mut map = shadow_map(LightKind::Spot, 1);
    map.update_matrices(&light, &Camera::default(), ASPECT);
    let matrix = map.layer_matrix(0).unwrap();

    let ndc = compute_ndc(matrix, Vec3::ZERO);
    assert!(ndc.truncate().abs_diff_eq(Vec2::ZERO, EPSILON), "{ndc:?}");
    assert!(ndc.z > 0.0 && ndc.z < 1.0);

    // Closer points get smaller depth.
    let nearer = compute_ndc(matrix, Vec3::new(0.0, 3.0, 0.0));
    assert!(nearer.z < ndc.z);

    // Anything inside the cone lands on the map.
    assert_inside(compute_ndc(matrix, Vec3::new(1.0, 0.0, -1.0)));
}

#[test]
fn spot_light_rejects_points_behind_it() {
    let light = Light::spot(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y, 10.0, 12.0);
    let mut map = shadow_map(LightKind::Spot, 1);
    map.update_matrices(&light, &Camera::default(), ASPECT);

    let clip = map.layer_matrix(0).unwrap() * Vec4::new(0.0, 8.0, 0.0, 1.0);
    assert!(clip.w <= 0.0);
}

#[test]
fn point_light_faces_look_along_each_axis() {
    let position = Vec3::new(1.0, 2.0, -3.0);
    let light = Light::point(position, 5.0, 8.0);
    let mut map = shadow_map(LightKind::Point, 6);
    map.update_matrices(&light, &Camera::default(), ASPECT);

    let axes = [
        Vec3::X,
        Vec3::NEG_X,
        Vec3::Y,
        Vec3::NEG_Y,
        Vec3::Z,
        Vec3::NEG_Z,
    ];
    for (face, axis) in axes.into_iter().enumerate() {
        let matrix = map.layer_matrix(face as u32).unwrap();
        let ndc = compute_ndc(matrix, position + axis * 2.0);
        assert!(
            ndc.truncate().abs_diff_eq(Vec2::ZERO, EPSILON),
            "face {face}: {ndc:?}"
        );
        assert!(ndc.z > 0.0 && ndc.z < 1.0, "face {face}: {ndc:?}");
    }
    assert!(map.layer_matrix(6).is_none());
}

#[test]
fn directional_cascades_contain_their_view_slices() {
    let camera = Camera::default();
    let light = Light::directional(Vec3::new(0.4, -1.0, 0.2), 3.0);
    let mut map = shadow_map(LightKind::Directional, 4);
    map.update_matrices(&light, &camera, ASPECT);

    let splits = map.cascade_splits().to_vec();
    assert_eq!(splits.len(), 4);
    assert!((splits[3] - camera.far).abs() < EPSILON);

    let mut near = camera.near;
    for (layer, far) in splits.into_iter().enumerate() {
        let matrix = map.layer_matrix(layer as u32).unwrap();
        for corner in camera.slice_corners(ASPECT, near, far) {
            assert_inside(compute_ndc(matrix, corner));
        }
        near = far;
    }
}

#[test]
fn view_positions_reconstruct_from_depth() {
    let camera = Camera::default();
    let proj = camera.proj(ASPECT);
    let proj_inv = proj.inverse();

    for view_pos in [
        Vec3::new(0.0, 0.0, -1.0),
        Vec3::new(0.5, -0.25, -4.0),
        Vec3::new(-2.0, 1.0, -20.0),
    ] {
        let ndc = compute_ndc(proj, view_pos);
        assert!(ndc.z >= 0.0 && ndc.z <= 1.0);
        let back = proj_inv * ndc.extend(1.0);
        let reconstructed = back.truncate() / back.w;
        assert!(
            (reconstructed - view_pos).abs().max_element() <= EPSILON * view_pos.z.abs(),
            "{reconstructed:?} != {view_pos:?}"
        );
    }
}
