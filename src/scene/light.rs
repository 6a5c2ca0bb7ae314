use glam::Vec3;

use crate::renderer::handle::Handle;
use crate::scene::camera::Bounds;

pub type LightId = Handle<Light>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

impl LightKind {
    pub const ALL: [LightKind; 3] = [LightKind::Directional, LightKind::Point, LightKind::Spot];

    pub const fn label(self) -> &'static str {
        match self {
            LightKind::Directional => "Directional",
            LightKind::Point => "Point",
            LightKind::Spot => "Spot",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub id: LightId,
    pub kind: LightKind,
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub casts_shadows: bool,
    /// Monotonic creation counter; lower is older.
    pub creation_order: u64,
}

impl Light {
    fn base(kind: LightKind, intensity: f32) -> Self {
        Self {
            id: Handle::new(0),
            kind,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
            intensity,
            range: 10.0,
            inner_angle: 20f32.to_radians(),
            outer_angle: 30f32.to_radians(),
            casts_shadows: false,
            creation_order: 0,
        }
    }

    pub fn directional(direction: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            ..Self::base(LightKind::Directional, intensity)
        }
    }

    pub fn point(position: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            position,
            range,
            ..Self::base(LightKind::Point, intensity)
        }
    }

    pub fn spot(position: Vec3, direction: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            position,
            direction: direction.normalize_or_zero(),
            range,
            ..Self::base(LightKind::Spot, intensity)
        }
    }

    pub fn with_shadows(mut self, casts_shadows: bool) -> Self {
        self.casts_shadows = casts_shadows;
        self
    }

    pub fn with_cone(mut self, inner_angle: f32, outer_angle: f32) -> Self {
        self.inner_angle = inner_angle.min(outer_angle);
        self.outer_angle = outer_angle.max(inner_angle);
        self
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    /// Region of space the light can affect.
    pub fn bounds(&self) -> Bounds {
        match self.kind {
            LightKind::Directional => Bounds::Infinite,
            LightKind::Point => Bounds::Sphere {
                center: self.position,
                radius: self.range,
            },
            LightKind::Spot => {
                // Smallest sphere around the cone of height `range`.
                let angle = self.outer_angle;
                let (sin, cos) = angle.sin_cos();
                if angle > std::f32::consts::FRAC_PI_4 {
                    Bounds::Sphere {
                        center: self.position + self.direction * self.range * cos,
                        radius: self.range * sin,
                    }
                } else {
                    let radius = self.range / (2.0 * cos * cos);
                    Bounds::Sphere {
                        center: self.position + self.direction * radius,
                        radius,
                    }
                }
            }
        }
    }

    /// Distance-weighted intensity used to rank shadow slot contention.
    pub fn shadow_priority(&self, view_position: Vec3) -> f32 {
        let distance_squared = match self.kind {
            LightKind::Directional => 0.0,
            _ => self.position.distance_squared(view_position),
        };
        self.intensity / (1.0 + distance_squared)
    }
}
