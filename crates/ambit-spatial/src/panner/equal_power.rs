//! Equal-power amplitude panning.

use core::f32::consts::FRAC_PI_2;

use ambit_core::{AudioBus, Smoother};

use super::{Panner, PanningModel, fold_to_front};

/// Gain smoothing time constant.
const SMOOTHING_MS: f32 = 5.0;

/// Constant-power panner.
///
/// Mono input is spread with `cos`/`sin` gains over the pan position.
/// Stereo input keeps the near channel and folds the far channel into it,
/// so a hard-panned stereo source collapses to one side without losing
/// energy. Gains are smoothed per sample; the first block after
/// construction or [`reset`](Panner::reset) starts on target.
#[derive(Debug, Clone)]
pub struct EqualPowerPanner {
    gain_l: Smoother,
    gain_r: Smoother,
    primed: bool,
}

impl EqualPowerPanner {
    /// Creates a panner for `sample_rate`.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            gain_l: Smoother::new(0.0, sample_rate, SMOOTHING_MS),
            gain_r: Smoother::new(0.0, sample_rate, SMOOTHING_MS),
            primed: false,
        }
    }

    /// Target `(left, right)` gains for an azimuth and input width.
    pub fn gains(azimuth: f64, stereo_input: bool) -> (f32, f32) {
        let azimuth = fold_to_front(azimuth) as f32;
        let position = if !stereo_input {
            (azimuth + 90.0) / 180.0
        } else if azimuth <= 0.0 {
            (azimuth + 90.0) / 90.0
        } else {
            azimuth / 90.0
        };
        let angle = FRAC_PI_2 * position;
        (libm::cosf(angle), libm::sinf(angle))
    }
}

impl Panner for EqualPowerPanner {
    fn pan(
        &mut self,
        azimuth: f64,
        _elevation: f64,
        input: &AudioBus,
        output: &mut AudioBus,
        frames: usize,
    ) {
        if output.num_channels() < 2 || input.num_channels() == 0 {
            output.zero();
            return;
        }
        let frames = frames.min(input.len()).min(output.len());
        let stereo = input.num_channels() >= 2;
        let (target_l, target_r) = Self::gains(azimuth, stereo);
        if self.primed {
            self.gain_l.set_target(target_l);
            self.gain_r.set_target(target_r);
        } else {
            self.gain_l.set_immediate(target_l);
            self.gain_r.set_immediate(target_r);
            self.primed = true;
        }

        let folds_left = fold_to_front(azimuth) <= 0.0;
        let (out_l, out_r) = output.stereo_mut();
        if stereo {
            let (in_l, in_r) = (input.channel(0), input.channel(1));
            for i in 0..frames {
                let gl = self.gain_l.advance();
                let gr = self.gain_r.advance();
                if folds_left {
                    out_l[i] = in_l[i] + in_r[i] * gl;
                    out_r[i] = in_r[i] * gr;
                } else {
                    out_l[i] = in_l[i] * gl;
                    out_r[i] = in_r[i] + in_l[i] * gr;
                }
            }
        } else {
            let mono = input.channel(0);
            for i in 0..frames {
                let gl = self.gain_l.advance();
                let gr = self.gain_r.advance();
                out_l[i] = mono[i] * gl;
                out_r[i] = mono[i] * gr;
            }
        }
        output.clear_silent_flag();
    }

    fn reset(&mut self) {
        self.primed = false;
    }

    fn model(&self) -> PanningModel {
        PanningModel::EqualPower
    }
}
