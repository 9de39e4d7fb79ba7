//! Range and consistency checks for engine configuration.
//!
//! Every check runs and every failure is reported, so a user fixing a config
//! file sees all of its problems at once.

use std::str::FromStr;

use ambit_spatial::{DistanceModel, PanningModel};
use thiserror::Error;

use crate::engine::{EngineConfig, ListenerConfig, RenderConfig, SpatializerConfig};

/// Lowest accepted sample rate, Hz.
pub const MIN_SAMPLE_RATE: f32 = 3000.0;
/// Highest accepted sample rate, Hz.
pub const MAX_SAMPLE_RATE: f32 = 768_000.0;
/// Smallest render quantum, frames.
pub const MIN_QUANTUM_FRAMES: usize = 16;
/// Largest render quantum, frames.
pub const MAX_QUANTUM_FRAMES: usize = 4096;
/// Most destination channels.
pub const MAX_CHANNELS: usize = 32;

/// Errors that can occur during validation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    /// Value outside its accepted range.
    #[error("'{field}' value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Dotted field path, e.g. `render.sample_rate`.
        field: String,
        /// The rejected value.
        value: f64,
        /// Minimum allowed value.
        min: f64,
        /// Maximum allowed value.
        max: f64,
    },

    /// Name that matches no known variant.
    #[error("unknown value '{value}' for '{field}'")]
    UnknownValue {
        /// Dotted field path.
        field: String,
        /// The rejected name.
        value: String,
    },

    /// NaN or infinite component.
    #[error("'{field}' must be finite")]
    NotFinite {
        /// Dotted field path.
        field: String,
    },

    /// Zero-length direction vector.
    #[error("'{field}' must not be a zero vector")]
    Degenerate {
        /// Dotted field path.
        field: String,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn finish(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

fn check_range(errors: &mut Vec<ValidationError>, field: &str, value: f64, min: f64, max: f64) {
    if value.is_nan() {
        errors.push(ValidationError::NotFinite { field: field.into() });
    } else if !(min..=max).contains(&value) {
        errors.push(ValidationError::OutOfRange {
            field: field.into(),
            value,
            min,
            max,
        });
    }
}

fn check_vector(errors: &mut Vec<ValidationError>, field: &str, v: [f64; 3], direction: bool) {
    if v.iter().any(|c| !c.is_finite()) {
        errors.push(ValidationError::NotFinite { field: field.into() });
    } else if direction && v.iter().all(|&c| c == 0.0) {
        errors.push(ValidationError::Degenerate { field: field.into() });
    }
}

/// Parse a panning model name.
pub fn parse_panning_model(name: &str) -> ValidationResult<PanningModel> {
    PanningModel::from_str(name).map_err(|_| ValidationError::UnknownValue {
        field: "spatializer.panning_model".into(),
        value: name.into(),
    })
}

/// Parse a distance model name.
pub fn parse_distance_model(name: &str) -> ValidationResult<DistanceModel> {
    DistanceModel::from_str(name).map_err(|_| ValidationError::UnknownValue {
        field: "spatializer.distance_model".into(),
        value: name.into(),
    })
}

fn render_errors(render: &RenderConfig, errors: &mut Vec<ValidationError>) {
    check_range(
        errors,
        "render.sample_rate",
        f64::from(render.sample_rate),
        f64::from(MIN_SAMPLE_RATE),
        f64::from(MAX_SAMPLE_RATE),
    );
    check_range(
        errors,
        "render.quantum_frames",
        render.quantum_frames as f64,
        MIN_QUANTUM_FRAMES as f64,
        MAX_QUANTUM_FRAMES as f64,
    );
    check_range(
        errors,
        "render.destination_channels",
        render.destination_channels as f64,
        1.0,
        MAX_CHANNELS as f64,
    );
}

fn listener_errors(listener: &ListenerConfig, errors: &mut Vec<ValidationError>) {
    check_vector(errors, "listener.position", listener.position, false);
    check_vector(errors, "listener.forward", listener.forward, true);
    check_vector(errors, "listener.up", listener.up, true);
    check_vector(errors, "listener.velocity", listener.velocity, false);
    check_range(errors, "listener.doppler_factor", listener.doppler_factor, 0.0, f64::MAX);
    if !(listener.speed_of_sound.is_finite() && listener.speed_of_sound > 0.0) {
        errors.push(ValidationError::OutOfRange {
            field: "listener.speed_of_sound".into(),
            value: listener.speed_of_sound,
            min: f64::MIN_POSITIVE,
            max: f64::MAX,
        });
    }
}

fn spatializer_errors(spatializer: &SpatializerConfig, errors: &mut Vec<ValidationError>) {
    if let Err(e) = parse_panning_model(&spatializer.panning_model) {
        errors.push(e);
    }
    if let Err(e) = parse_distance_model(&spatializer.distance_model) {
        errors.push(e);
    }
    check_range(
        errors,
        "spatializer.ref_distance",
        spatializer.ref_distance,
        f64::MIN_POSITIVE,
        f64::MAX,
    );
    check_range(
        errors,
        "spatializer.max_distance",
        spatializer.max_distance,
        f64::MIN_POSITIVE,
        f64::MAX,
    );
    check_range(errors, "spatializer.rolloff_factor", spatializer.rolloff_factor, 0.0, f64::MAX);
    check_range(errors, "spatializer.cone_inner_angle", spatializer.cone_inner_angle, 0.0, 360.0);
    check_range(errors, "spatializer.cone_outer_angle", spatializer.cone_outer_angle, 0.0, 360.0);
    check_range(errors, "spatializer.cone_outer_gain", spatializer.cone_outer_gain, 0.0, 1.0);
}

/// Validate the spatializer section on its own.
pub fn validate_spatializer(spatializer: &SpatializerConfig) -> ValidationResult<()> {
    let mut errors = Vec::new();
    spatializer_errors(spatializer, &mut errors);
    finish(errors)
}

/// Validate a whole engine configuration.
pub fn validate_engine(config: &EngineConfig) -> ValidationResult<()> {
    let mut errors = Vec::new();
    render_errors(&config.render, &mut errors);
    listener_errors(&config.listener, &mut errors);
    spatializer_errors(&config.spatializer, &mut errors);
    finish(errors)
}
