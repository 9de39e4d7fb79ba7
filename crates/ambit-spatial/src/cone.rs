//! Directional cone attenuation.

use ambit_core::Vec3;

/// Sound cone of a directional source.
///
/// Inside half the inner angle the gain is 1; beyond half the outer angle it
/// is `outer_gain`; in between it is interpolated linearly in angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConeEffect {
    /// Full inner cone angle, degrees.
    pub inner_angle: f64,
    /// Full outer cone angle, degrees.
    pub outer_angle: f64,
    /// Gain outside the outer cone, `[0, 1]`.
    pub outer_gain: f64,
}

impl Default for ConeEffect {
    fn default() -> Self {
        Self {
            inner_angle: 360.0,
            outer_angle: 360.0,
            outer_gain: 0.0,
        }
    }
}

impl ConeEffect {
    /// Gain for a source at `position` facing `orientation`, heard at
    /// `listener`.
    pub fn gain(&self, position: Vec3, orientation: Vec3, listener: Vec3) -> f64 {
        if orientation.is_zero() || (self.inner_angle == 360.0 && self.outer_angle == 360.0) {
            return 1.0;
        }

        let angle = orientation.angle_between(listener - position);
        let inner = self.inner_angle.abs() / 2.0;
        let outer = self.outer_angle.abs() / 2.0;
        let outer_gain = self.outer_gain.clamp(0.0, 1.0);

        if angle <= inner {
            1.0
        } else if angle >= outer {
            outer_gain
        } else {
            let x = (angle - inner) / (outer - inner);
            (1.0 - x) + outer_gain * x
        }
    }
}
