use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::renderer::device::Extent;
use crate::renderer::uniforms::{MAX_BLUR_TAPS, MAX_SSAO_SAMPLES};

const MAX_SHADOW_MAP_SIZE: u32 = 16384;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default = "RenderSettings::default_shadow_map_size")]
    pub shadow_map_size: u32,
    #[serde(default)]
    pub shadow_pools: ShadowPoolSettings,
    #[serde(default = "RenderSettings::default_directional_cascades")]
    pub directional_cascades: u32,
    #[serde(default)]
    pub variance_shadows: bool,
    #[serde(default = "RenderSettings::default_material_capacity")]
    pub material_capacity: u32,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub ssao: SsaoConfig,
    #[serde(default)]
    pub bloom: BloomConfig,
    #[serde(default)]
    pub tone_mapping: ToneMappingConfig,
    #[serde(default)]
    pub environment_map: EnvironmentSettings,
    #[serde(default = "RenderSettings::default_clear_color")]
    pub clear_color: [f32; 4],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            shadow_map_size: Self::default_shadow_map_size(),
            shadow_pools: ShadowPoolSettings::default(),
            directional_cascades: Self::default_directional_cascades(),
            variance_shadows: false,
            material_capacity: Self::default_material_capacity(),
            resolution: Resolution::default(),
            ssao: SsaoConfig::default(),
            bloom: BloomConfig::default(),
            tone_mapping: ToneMappingConfig::default(),
            environment_map: EnvironmentSettings::default(),
            clear_color: Self::default_clear_color(),
        }
    }
}

impl RenderSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|err| {
                warn!(
                    "Failed to parse {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RenderSettings>(contents).map(RenderSettings::validate)
    }

    /// Replaces every out-of-range value with its default.
    pub fn validate(mut self) -> Self {
        let defaults = RenderSettings::default();

        if self.shadow_map_size == 0 || self.shadow_map_size > MAX_SHADOW_MAP_SIZE {
            warn!(
                "Shadow map size {} is out of range. Using default value.",
                self.shadow_map_size
            );
            self.shadow_map_size = defaults.shadow_map_size;
        }

        if !(1..=4).contains(&self.directional_cascades) {
            warn!(
                "Directional cascade count must be between 1 and 4. Using {}.",
                defaults.directional_cascades
            );
            self.directional_cascades = defaults.directional_cascades;
        }

        if self.material_capacity == 0 {
            warn!("Material capacity must be greater than zero. Using default value.");
            self.material_capacity = defaults.material_capacity;
        }

        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        self.ssao = self.ssao.validate();
        self.bloom = self.bloom.validate();
        self.tone_mapping = self.tone_mapping.validate();

        if self.environment_map.size == 0 {
            warn!("Environment map size must be greater than zero. Using default value.");
            self.environment_map.size = EnvironmentSettings::default().size;
        }

        self
    }

    const fn default_shadow_map_size() -> u32 {
        2048
    }

    const fn default_directional_cascades() -> u32 {
        4
    }

    const fn default_material_capacity() -> u32 {
        1024
    }

    const fn default_clear_color() -> [f32; 4] {
        [0.0, 0.0, 0.0, 1.0]
    }
}

/// Number of shadow map slots per light kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowPoolSettings {
    pub directional: u32,
    pub point: u32,
    pub spot: u32,
}

impl Default for ShadowPoolSettings {
    fn default() -> Self {
        Self {
            directional: 1,
            point: 4,
            spot: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn extent(&self) -> Extent {
        Extent::new(self.width, self.height)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

fn validate_kernel_size(effect: &str, size: u32, default: u32) -> u32 {
    if size as usize >= MAX_BLUR_TAPS {
        warn!(
            "{} blur kernel size must be below {}. Using {}.",
            effect, MAX_BLUR_TAPS, default
        );
        default
    } else {
        size
    }
}

fn validate_pass_count(effect: &str, count: u32, default: u32) -> u32 {
    if count == 0 {
        warn!("{} blur pass count must be at least 1. Using {}.", effect, default);
        default
    } else {
        count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SsaoConfig {
    pub enabled: bool,
    pub radius: f32,
    pub bias: f32,
    pub intensity: f32,
    pub num_samples: u32,
    pub blur_passes_count: u32,
    pub blur_kernel_size: u32,
}

impl Default for SsaoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: 0.5,
            bias: 0.025,
            intensity: 1.0,
            num_samples: 16,
            blur_passes_count: 1,
            blur_kernel_size: 4,
        }
    }
}

impl SsaoConfig {
    fn validate(mut self) -> Self {
        let defaults = Self::default();
        if self.radius.is_nan() || self.radius <= 0.0 {
            warn!("SSAO radius must be positive. Using {}.", defaults.radius);
            self.radius = defaults.radius;
        }
        if self.num_samples == 0 || self.num_samples as usize > MAX_SSAO_SAMPLES {
            warn!(
                "SSAO sample count must be between 1 and {}. Using {}.",
                MAX_SSAO_SAMPLES, defaults.num_samples
            );
            self.num_samples = defaults.num_samples;
        }
        self.blur_passes_count =
            validate_pass_count("SSAO", self.blur_passes_count, defaults.blur_passes_count);
        self.blur_kernel_size =
            validate_kernel_size("SSAO", self.blur_kernel_size, defaults.blur_kernel_size);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BloomConfig {
    pub enabled: bool,
    pub threshold: f32,
    pub blur_passes_count: u32,
    pub blur_kernel_size: u32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 1.0,
            blur_passes_count: 4,
            blur_kernel_size: 4,
        }
    }
}

impl BloomConfig {
    fn validate(mut self) -> Self {
        let defaults = Self::default();
        if self.threshold.is_nan() || self.threshold < 0.0 {
            warn!("Bloom threshold must not be negative. Using {}.", defaults.threshold);
            self.threshold = defaults.threshold;
        }
        self.blur_passes_count =
            validate_pass_count("Bloom", self.blur_passes_count, defaults.blur_passes_count);
        self.blur_kernel_size =
            validate_kernel_size("Bloom", self.blur_kernel_size, defaults.blur_kernel_size);
        self
    }
}

/// Final resolve of HDR colour into the presented image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToneMappingConfig {
    pub exposure: f32,
    pub bloom_intensity: f32,
}

impl Default for ToneMappingConfig {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            bloom_intensity: 0.6,
        }
    }
}

impl ToneMappingConfig {
    fn validate(mut self) -> Self {
        let defaults = Self::default();
        if !self.exposure.is_finite() || self.exposure <= 0.0 {
            warn!("Exposure must be positive. Using {}.", defaults.exposure);
            self.exposure = defaults.exposure;
        }
        if !self.bloom_intensity.is_finite() || self.bloom_intensity < 0.0 {
            warn!("Bloom intensity must not be negative. Using {}.", defaults.bloom_intensity);
            self.bloom_intensity = defaults.bloom_intensity;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    pub enabled: bool,
    pub size: u32,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            size: 128,
        }
    }
}
