use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};

#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn proj(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, aspect, self.near, self.far)
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        self.proj(aspect) * self.view()
    }

    /// Projection shifted by a sub-pixel `jitter` (in pixels) for a target of
    /// `target_size` pixels.
    pub fn jittered_proj(&self, aspect: f32, jitter: Vec2, target_size: Vec2) -> Mat4 {
        let offset = 2.0 * jitter / target_size.max(Vec2::ONE);
        Mat4::from_translation(offset.extend(0.0)) * self.proj(aspect)
    }

    pub fn position(&self) -> Vec3 {
        self.eye
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.eye).normalize_or_zero()
    }

    /// World-space corners of the view volume between `near` and `far`,
    /// near plane first.
    pub fn slice_corners(&self, aspect: f32, near: f32, far: f32) -> [Vec3; 8] {
        let inverse = (Mat4::perspective_rh(self.fov_y_radians, aspect, near, far) * self.view())
            .inverse();
        let mut corners = [Vec3::ZERO; 8];
        let ndc = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        for (depth_index, depth) in [0.0, 1.0].into_iter().enumerate() {
            for (corner_index, (x, y)) in ndc.iter().enumerate() {
                let clip = inverse * Vec4::new(*x, *y, depth, 1.0);
                corners[depth_index * 4 + corner_index] = clip.xyz() / clip.w;
            }
        }
        corners
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 3.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_radians: 60f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

/// Bounding volume used for visibility tests.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Bounds {
    /// Affects the whole scene (directional lights).
    Infinite,
    Sphere { center: Vec3, radius: f32 },
    Aabb { min: Vec3, max: Vec3 },
}

/// Six clip planes, normals pointing inwards, extracted from a
/// view-projection matrix with a `[0, 1]` depth range.
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    pub fn from_view_proj(view_proj: Mat4) -> Self {
        let r0 = view_proj.row(0);
        let r1 = view_proj.row(1);
        let r2 = view_proj.row(2);
        let r3 = view_proj.row(3);
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(|plane| {
            let length = plane.xyz().length();
            if length > 0.0 {
                plane / length
            } else {
                plane
            }
        });
        Self { planes }
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.xyz().dot(center) + plane.w >= -radius)
    }

    pub fn intersects_aabb(&self, min: Vec3, max: Vec3) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.xyz();
            let positive = Vec3::select(normal.cmpge(Vec3::ZERO), max, min);
            normal.dot(positive) + plane.w >= 0.0
        })
    }

    pub fn intersects(&self, bounds: &Bounds) -> bool {
        match *bounds {
            Bounds::Infinite => true,
            Bounds::Sphere { center, radius } => self.intersects_sphere(center, radius),
            Bounds::Aabb { min, max } => self.intersects_aabb(min, max),
        }
    }
}
