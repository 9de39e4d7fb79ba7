//! Source/listener geometry.
//!
//! Pure functions of a source's position and velocity and a
//! [`ListenerState`] snapshot. Both run on the render thread every quantum
//! and never fail: degenerate input produces a neutral result.
//!
//! # Azimuth convention
//!
//! Degrees, clockwise seen from above, relative to the listener's forward
//! vector: 0 ahead, +90 right, −90 left, ±180 behind. Elevation is +90
//! straight up along the listener's up vector and −90 straight down.

use ambit_core::{ListenerState, Vec3};

/// Lower bound of the Doppler pitch ratio (three octaves down).
pub const MIN_DOPPLER_RATE: f64 = 0.125;
/// Upper bound of the Doppler pitch ratio (four octaves up).
pub const MAX_DOPPLER_RATE: f64 = 16.0;

#[inline]
fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}

/// Azimuth and elevation of `source` as heard by `listener`, in degrees.
///
/// A source at the listener's position yields `(0, 0)`.
pub fn azimuth_elevation(source: Vec3, listener: &ListenerState) -> (f64, f64) {
    let to_source = source - listener.position;
    if to_source.is_zero() {
        return (0.0, 0.0);
    }
    let to_source = to_source.normalize();

    let front = listener.forward.normalize();
    let right = listener.forward.cross(listener.up).normalize();
    let up = right.cross(front);

    let up_projection = to_source.dot(up);
    let projected = (to_source - up * up_projection).normalize();

    let mut azimuth = finite_or_zero(libm::acos(projected.dot(right).clamp(-1.0, 1.0)).to_degrees());
    if projected.dot(front) < 0.0 {
        azimuth = 360.0 - azimuth;
    }
    azimuth = if (0.0..=270.0).contains(&azimuth) {
        90.0 - azimuth
    } else {
        450.0 - azimuth
    };

    let mut elevation =
        finite_or_zero(90.0 - libm::acos(to_source.dot(up).clamp(-1.0, 1.0)).to_degrees());
    if elevation > 90.0 {
        elevation = 180.0 - elevation;
    } else if elevation < -90.0 {
        elevation = -180.0 - elevation;
    }

    (finite_or_zero(azimuth), elevation)
}

/// Doppler pitch ratio for a source moving at `velocity` from `position`.
///
/// Returns exactly 1.0 when the Doppler factor is not positive or neither
/// the source nor the listener moves. Otherwise the velocities are projected
/// onto the source→listener axis, each capped at `speed_of_sound /
/// doppler_factor`, and the classic ratio is clamped to
/// [[`MIN_DOPPLER_RATE`], [`MAX_DOPPLER_RATE`]]. NaN yields 1.0.
pub fn doppler_rate(position: Vec3, velocity: Vec3, listener: &ListenerState) -> f64 {
    let factor = listener.doppler_factor;
    if factor.is_nan() || factor <= 0.0 {
        return 1.0;
    }
    if velocity.is_zero() && listener.velocity.is_zero() {
        return 1.0;
    }

    let speed = listener.speed_of_sound;
    let axis = position - listener.position;
    let magnitude = axis.length();

    let scaled_speed = speed / factor;
    let listener_projection = (-axis.dot(listener.velocity) / magnitude).min(scaled_speed);
    let source_projection = (-axis.dot(velocity) / magnitude).min(scaled_speed);

    let shift = (speed - factor * listener_projection) / (speed - factor * source_projection);
    if shift.is_nan() {
        return 1.0;
    }
    if shift.is_infinite() && shift > 0.0 {
        return MAX_DOPPLER_RATE;
    }
    shift.clamp(MIN_DOPPLER_RATE, MAX_DOPPLER_RATE)
}
