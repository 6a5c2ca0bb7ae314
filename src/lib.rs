pub mod error;
pub mod renderer;
pub mod scene;
pub mod settings;

pub use error::{DeviceError, TechniqueError};
pub use renderer::{HeadlessDevice, RenderDevice, Signal, Technique, WgpuDevice};
pub use settings::RenderSettings;

/// Info-level `env_logger`; `RUST_LOG` module directives still apply.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
