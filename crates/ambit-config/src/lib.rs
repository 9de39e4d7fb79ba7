//! TOML configuration for ambit render graphs.
//!
//! An [`EngineConfig`] describes the render clock, the initial listener and
//! the defaults for new spatializers. Files are validated on load and every
//! problem is reported at once.
//!
//! # Example
//!
//! ```rust,no_run
//! use ambit_config::EngineConfig;
//!
//! let config = EngineConfig::load("ambit.toml").unwrap();
//! let context = config.build_context().unwrap();
//! let panner = config.build_spatializer(&context).unwrap();
//! panner.connect(context.destination(), 0, 0).unwrap();
//! ```

mod engine;
mod error;

/// Range and consistency checks.
pub mod validation;

pub use engine::{EngineConfig, ListenerConfig, RenderConfig, SpatializerConfig};
pub use error::ConfigError;
pub use validation::{ValidationError, ValidationResult, validate_engine, validate_spatializer};
