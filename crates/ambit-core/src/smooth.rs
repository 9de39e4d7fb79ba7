//! One-pole parameter smoothing.
//!
//! Panning positions and gains must not jump between samples, or they click.
//! [`Smoother`] follows its target with an RC-style exponential response:
//!
//! ```text
//! y[n] = target + coeff * (y[n-1] - target)
//! coeff = exp(-1 / (time_constant * sample_rate))
//! ```
//!
//! # Usage
//!
//! ```rust
//! use ambit_core::Smoother;
//!
//! let mut pan = Smoother::new(0.0, 48000.0, 50.0);
//! pan.set_target(1.0);
//! let first = pan.advance();
//! assert!(first > 0.0 && first < 1.0);
//! ```

use libm::expf;

const SETTLE_EPSILON: f32 = 1e-6;

/// Exponentially smoothed scalar.
#[derive(Debug, Clone)]
pub struct Smoother {
    current: f32,
    target: f32,
    coeff: f32,
    sample_rate: f32,
    time_ms: f32,
}

impl Smoother {
    /// Creates a smoother resting at `initial`.
    ///
    /// `time_ms` is the time constant (63% of a step reached after it).
    pub fn new(initial: f32, sample_rate: f32, time_ms: f32) -> Self {
        let mut smoother = Self {
            current: initial,
            target: initial,
            coeff: 0.0,
            sample_rate,
            time_ms,
        };
        smoother.recalculate_coeff();
        smoother
    }

    /// Sets the value to move towards.
    #[inline]
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Jumps straight to `value` with no smoothing.
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    /// Advances one sample and returns the smoothed value.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        self.current = self.target + self.coeff * (self.current - self.target);
        if (self.current - self.target).abs() < SETTLE_EPSILON {
            self.current = self.target;
        }
        self.current
    }

    /// Current smoothed value.
    #[inline]
    pub fn value(&self) -> f32 {
        self.current
    }

    /// Value being approached.
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Whether the value has reached its target.
    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }

    /// Snap the current value to the target.
    pub fn snap_to_target(&mut self) {
        self.current = self.target;
    }

    /// Update the sample rate, keeping the time constant in milliseconds.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.recalculate_coeff();
    }

    fn recalculate_coeff(&mut self) {
        let samples = self.time_ms * 0.001 * self.sample_rate;
        self.coeff = if samples > 0.0 {
            expf(-1.0 / samples)
        } else {
            0.0
        };
    }
}
