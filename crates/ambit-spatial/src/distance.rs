//! Distance attenuation.

use core::fmt;
use core::str::FromStr;

use ambit_core::GraphError;

/// Distance attenuation curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceModel {
    /// `1 − rolloff·(d − ref)/(max − ref)`
    Linear,
    /// `ref / (ref + rolloff·(d − ref))`
    #[default]
    Inverse,
    /// `(d / ref)^(−rolloff)`
    Exponential,
}

impl DistanceModel {
    /// Lower-case name, as used in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceModel::Linear => "linear",
            DistanceModel::Inverse => "inverse",
            DistanceModel::Exponential => "exponential",
        }
    }
}

impl fmt::Display for DistanceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceModel {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(DistanceModel::Linear),
            "inverse" => Ok(DistanceModel::Inverse),
            "exponential" => Ok(DistanceModel::Exponential),
            other => Err(GraphError::invalid(format!("unknown distance model '{other}'"))),
        }
    }
}

/// Distance curve plus its parameters.
///
/// The listener distance is clamped to `[ref_distance, max_distance]`
/// before the curve is evaluated, and the gain is clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceEffect {
    model: DistanceModel,
    ref_distance: f64,
    max_distance: f64,
    rolloff_factor: f64,
}

impl Default for DistanceEffect {
    fn default() -> Self {
        Self {
            model: DistanceModel::Inverse,
            ref_distance: 1.0,
            max_distance: 10000.0,
            rolloff_factor: 1.0,
        }
    }
}

impl DistanceEffect {
    /// Curve in use.
    pub fn model(&self) -> DistanceModel {
        self.model
    }

    /// Selects the curve.
    pub fn set_model(&mut self, model: DistanceModel) {
        self.model = model;
    }

    /// Distance at which attenuation starts.
    pub fn ref_distance(&self) -> f64 {
        self.ref_distance
    }

    /// Sets the reference distance. Must be positive and finite.
    pub fn set_ref_distance(&mut self, distance: f64) -> Result<(), GraphError> {
        if !(distance.is_finite() && distance > 0.0) {
            return Err(GraphError::invalid(format!(
                "ref distance must be positive, got {distance}"
            )));
        }
        self.ref_distance = distance;
        Ok(())
    }

    /// Distance beyond which attenuation stops changing.
    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    /// Sets the maximum distance. Must be positive.
    pub fn set_max_distance(&mut self, distance: f64) -> Result<(), GraphError> {
        if distance.is_nan() || distance <= 0.0 {
            return Err(GraphError::invalid(format!(
                "max distance must be positive, got {distance}"
            )));
        }
        self.max_distance = distance;
        Ok(())
    }

    /// Steepness of the curve.
    pub fn rolloff_factor(&self) -> f64 {
        self.rolloff_factor
    }

    /// Sets the rolloff factor. Must be non-negative and finite.
    pub fn set_rolloff_factor(&mut self, rolloff: f64) -> Result<(), GraphError> {
        if !(rolloff.is_finite() && rolloff >= 0.0) {
            return Err(GraphError::invalid(format!(
                "rolloff factor must be non-negative, got {rolloff}"
            )));
        }
        self.rolloff_factor = rolloff;
        Ok(())
    }

    /// Gain for a listener `distance` away.
    pub fn gain(&self, distance: f64) -> f64 {
        let reference = self.ref_distance;
        let max = self.max_distance.max(reference);
        let distance = if distance.is_nan() {
            reference
        } else {
            distance.clamp(reference, max)
        };
        let rolloff = self.rolloff_factor;

        let gain = match self.model {
            DistanceModel::Linear => {
                let span = max - reference;
                if span <= 0.0 {
                    1.0
                } else {
                    1.0 - rolloff * (distance - reference) / span
                }
            }
            DistanceModel::Inverse => reference / (reference + rolloff * (distance - reference)),
            DistanceModel::Exponential => libm::pow(distance / reference, -rolloff),
        };
        if gain.is_nan() { 0.0 } else { gain.clamp(0.0, 1.0) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect(model: DistanceModel) -> DistanceEffect {
        let mut effect = DistanceEffect::default();
        effect.set_model(model);
        effect
    }

    #[test]
    fn defaults_match_web_style_panner() {
        let effect = DistanceEffect::default();
        assert_eq!(effect.model(), DistanceModel::Inverse);
        assert_eq!(effect.ref_distance(), 1.0);
        assert_eq!(effect.max_distance(), 10000.0);
        assert_eq!(effect.rolloff_factor(), 1.0);
    }

    #[test]
    fn inside_reference_distance_is_unity() {
        for model in [DistanceModel::Linear, DistanceModel::Inverse, DistanceModel::Exponential] {
            assert_eq!(effect(model).gain(0.25), 1.0, "{model}");
        }
    }

    #[test]
    fn inverse_halves_at_double_reference() {
        assert!((effect(DistanceModel::Inverse).gain(2.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn exponential_follows_power_law() {
        let mut effect = effect(DistanceModel::Exponential);
        effect.set_rolloff_factor(2.0).unwrap();
        assert!((effect.gain(4.0) - 1.0 / 16.0).abs() < 1e-12);
    }

    #[test]
    fn linear_reaches_zero_at_max() {
        let mut effect = effect(DistanceModel::Linear);
        effect.set_max_distance(11.0).unwrap();
        assert!((effect.gain(6.0) - 0.5).abs() < 1e-12);
        assert_eq!(effect.gain(11.0), 0.0);
        assert_eq!(effect.gain(500.0), 0.0);
    }

    #[test]
    fn linear_with_collapsed_range_is_unity() {
        let mut effect = effect(DistanceModel::Linear);
        effect.set_max_distance(1.0).unwrap();
        assert_eq!(effect.gain(5.0), 1.0);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut effect = DistanceEffect::default();
        assert!(effect.set_ref_distance(0.0).is_err());
        assert!(effect.set_max_distance(-1.0).is_err());
        assert!(effect.set_rolloff_factor(f64::NAN).is_err());
        assert_eq!(effect, DistanceEffect::default());
    }

    #[test]
    fn parses_model_names() {
        assert_eq!("Linear".parse::<DistanceModel>(), Ok(DistanceModel::Linear));
        assert_eq!(" exponential ".parse::<DistanceModel>(), Ok(DistanceModel::Exponential));
        assert!(matches!(
            "cubic".parse::<DistanceModel>(),
            Err(GraphError::InvalidArgument(_))
        ));
    }
}
