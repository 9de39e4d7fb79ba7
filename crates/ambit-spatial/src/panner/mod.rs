//! Panning strategies.
//!
//! A [`Panner`] turns a mono or stereo input into a stereo output for a
//! given azimuth and elevation. The spatializer owns exactly one, selected by
//! [`PanningModel`], and may swap it at runtime.
//!
//! | Model | Technique | State |
//! |-------|-----------|-------|
//! | [`PanningModel::EqualPower`] | cos/sin gain law with smoothed position | gain smoothers |
//! | [`PanningModel::Hrtf`] | spherical-head ITD delay, ILD and head-shadow low-pass | delay line, filter state |

mod equal_power;
mod hrtf;

use core::fmt;
use core::str::FromStr;

use ambit_core::{AudioBus, GraphError};

pub use equal_power::EqualPowerPanner;
pub use hrtf::HrtfPanner;

/// Stereo panning strategy.
///
/// Implementations run on the render thread and must not allocate in
/// [`pan`](Self::pan).
pub trait Panner: Send {
    /// Pans `frames` frames of `input` into the first two channels of
    /// `output`.
    ///
    /// `azimuth` and `elevation` are in degrees (see
    /// [`azimuth_elevation`](crate::azimuth_elevation)). Outputs with fewer
    /// than two channels are zeroed.
    fn pan(
        &mut self,
        azimuth: f64,
        elevation: f64,
        input: &AudioBus,
        output: &mut AudioBus,
        frames: usize,
    );

    /// Clears internal history so the next block starts fresh.
    fn reset(&mut self);

    /// Which model this strategy implements.
    fn model(&self) -> PanningModel;
}

/// The closed set of panning strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanningModel {
    /// Equal-power amplitude panning.
    EqualPower,
    /// Spherical-head binaural approximation.
    #[default]
    Hrtf,
}

/// Numeric model codes accepted by [`PanningModel::from_code`].
pub mod codes {
    /// Equal-power panning.
    pub const EQUAL_POWER: u16 = 0;
    /// HRTF panning.
    pub const HRTF: u16 = 1;
    /// Ambisonic sound field. Recognised but not implemented.
    pub const SOUNDFIELD: u16 = 2;
}

impl PanningModel {
    /// Builds a fresh strategy for `sample_rate`.
    pub fn create(self, sample_rate: f32) -> Box<dyn Panner> {
        match self {
            PanningModel::EqualPower => Box::new(EqualPowerPanner::new(sample_rate)),
            PanningModel::Hrtf => Box::new(HrtfPanner::new(sample_rate)),
        }
    }

    /// Maps a numeric model code.
    ///
    /// # Errors
    ///
    /// [`GraphError::NotSupported`] for the sound-field code and any unknown
    /// code.
    pub fn from_code(code: u16) -> Result<Self, GraphError> {
        match code {
            codes::EQUAL_POWER => Ok(PanningModel::EqualPower),
            codes::HRTF => Ok(PanningModel::Hrtf),
            codes::SOUNDFIELD => Err(GraphError::NotSupported(
                "sound-field panning is not implemented".into(),
            )),
            other => Err(GraphError::NotSupported(format!("panning model code {other}"))),
        }
    }

    /// Lower-case name, as used in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            PanningModel::EqualPower => "equalpower",
            PanningModel::Hrtf => "hrtf",
        }
    }
}

impl fmt::Display for PanningModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PanningModel {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match name.as_str() {
            "equalpower" => Ok(PanningModel::EqualPower),
            "hrtf" => Ok(PanningModel::Hrtf),
            _ => Err(GraphError::NotSupported(format!("panning model '{}'", s.trim()))),
        }
    }
}

/// Folds an azimuth into `[-90, 90]`, mirroring rear positions to the front.
/// NaN maps to 0.
#[inline]
pub(crate) fn fold_to_front(azimuth: f64) -> f64 {
    if azimuth.is_nan() {
        return 0.0;
    }
    let azimuth = azimuth.clamp(-180.0, 180.0);
    if azimuth < -90.0 {
        -180.0 - azimuth
    } else if azimuth > 90.0 {
        180.0 - azimuth
    } else {
        azimuth
    }
}
