//! Spherical-head binaural panning.
//!
//! A lightweight stand-in for measured HRTF convolution. It models the three
//! cues a rigid sphere produces:
//!
//! - **ITD**: the far ear hears the source later, by the Woodworth delay
//!   `r/c · (θ + sin θ)` for lateral angle θ. Implemented as a fractional
//!   read from one shared delay line.
//! - **ILD**: the far ear is attenuated, up to [`MAX_ILD_DB`] at ±90°.
//! - **Head shadow**: the far ear is low-passed with a one-pole filter whose
//!   cutoff falls as the source moves to the side.
//!
//! Elevation and rear positions get a small broadband attenuation standing
//! in for pinna cues.
//!
//! All cue parameters are derived per sample from smoothed targets, so a
//! moving source never clicks.

use ambit_core::{AudioBus, Smoother};

use super::{Panner, PanningModel};

/// Head radius, metres.
const HEAD_RADIUS: f32 = 0.0875;
/// Speed of sound used for the ITD model, m/s.
const SPEED_OF_SOUND: f32 = 343.3;
/// Far-ear attenuation at ±90° azimuth, dB.
pub const MAX_ILD_DB: f32 = 10.0;
/// Maximum reduction of the far-ear low-pass coefficient.
const SHADOW_DEPTH: f32 = 0.8;
/// Attenuation at ±90° elevation.
const ELEVATION_DEPTH: f32 = 0.2;
/// Attenuation directly behind.
const REAR_DEPTH: f32 = 0.15;
/// Cue smoothing time constant.
const SMOOTHING_MS: f32 = 10.0;

/// Spherical-head binaural panner.
#[derive(Debug, Clone)]
pub struct HrtfPanner {
    sample_rate: f32,
    line: Vec<f32>,
    write: usize,
    mask: usize,
    shadow_l: f32,
    shadow_r: f32,
    lateral: Smoother,
    colour: Smoother,
    primed: bool,
}

impl HrtfPanner {
    /// Creates a panner for `sample_rate`.
    pub fn new(sample_rate: f32) -> Self {
        let capacity = (Self::max_itd_seconds() * sample_rate).ceil() as usize + 4;
        let capacity = capacity.next_power_of_two();
        Self {
            sample_rate,
            line: vec![0.0; capacity],
            write: 0,
            mask: capacity - 1,
            shadow_l: 0.0,
            shadow_r: 0.0,
            lateral: Smoother::new(0.0, sample_rate, SMOOTHING_MS),
            colour: Smoother::new(1.0, sample_rate, SMOOTHING_MS),
            primed: false,
        }
    }

    /// Interaural delay at ±90°, seconds.
    pub fn max_itd_seconds() -> f32 {
        Self::itd_seconds(1.0)
    }

    /// Woodworth interaural delay for a lateral position `sin θ`, seconds.
    pub fn itd_seconds(lateral: f32) -> f32 {
        let lateral = lateral.abs().min(1.0);
        HEAD_RADIUS / SPEED_OF_SOUND * (libm::asinf(lateral) + lateral)
    }

    /// Linear far-ear gain for a lateral position.
    fn far_gain(lateral: f32) -> f32 {
        let min_gain = libm::powf(10.0, -MAX_ILD_DB / 20.0);
        1.0 - (1.0 - min_gain) * lateral
    }

    /// Broadband elevation and rear attenuation.
    fn colouration(azimuth: f64, elevation: f64) -> f32 {
        let elevation = if elevation.is_finite() { elevation.abs().min(90.0) } else { 0.0 };
        let azimuth = if azimuth.is_finite() { azimuth.abs().min(180.0) } else { 0.0 };
        let rear = ((azimuth - 90.0) / 90.0).max(0.0);
        (1.0 - ELEVATION_DEPTH * (elevation / 90.0) as f32) * (1.0 - REAR_DEPTH * rear as f32)
    }

    #[inline]
    fn read_delayed(&self, delay: f32) -> f32 {
        let whole = delay as usize;
        let frac = delay - whole as f32;
        let a = self.line[self.write.wrapping_sub(whole) & self.mask];
        let b = self.line[self.write.wrapping_sub(whole + 1) & self.mask];
        a + (b - a) * frac
    }
}

impl Panner for HrtfPanner {
    fn pan(
        &mut self,
        azimuth: f64,
        elevation: f64,
        input: &AudioBus,
        output: &mut AudioBus,
        frames: usize,
    ) {
        if output.num_channels() < 2 || input.num_channels() == 0 {
            output.zero();
            return;
        }
        let frames = frames.min(input.len()).min(output.len());
        let lateral = if azimuth.is_finite() {
            libm::sin(azimuth.to_radians()) as f32
        } else {
            0.0
        };
        let colour = Self::colouration(azimuth, elevation);
        if self.primed {
            self.lateral.set_target(lateral);
            self.colour.set_target(colour);
        } else {
            self.lateral.set_immediate(lateral);
            self.colour.set_immediate(colour);
            self.primed = true;
        }

        let stereo = input.num_channels() >= 2;
        let (out_l, out_r) = output.stereo_mut();
        for i in 0..frames {
            let sample = if stereo {
                0.5 * (input.channel(0)[i] + input.channel(1)[i])
            } else {
                input.channel(0)[i]
            };
            self.line[self.write] = sample;

            let lateral = self.lateral.advance();
            let colour = self.colour.advance();
            let delay = Self::itd_seconds(lateral) * self.sample_rate;
            let far = self.read_delayed(delay);
            let (left, right) = if lateral > 0.0 { (far, sample) } else { (sample, far) };

            let right_side = lateral.max(0.0);
            let left_side = (-lateral).max(0.0);
            let alpha_l = 1.0 - SHADOW_DEPTH * right_side;
            let alpha_r = 1.0 - SHADOW_DEPTH * left_side;
            self.shadow_l += alpha_l * (left - self.shadow_l);
            self.shadow_r += alpha_r * (right - self.shadow_r);

            out_l[i] = self.shadow_l * Self::far_gain(right_side) * colour;
            out_r[i] = self.shadow_r * Self::far_gain(left_side) * colour;

            self.write = (self.write + 1) & self.mask;
        }
        output.clear_silent_flag();
    }

    fn reset(&mut self) {
        self.line.fill(0.0);
        self.write = 0;
        self.shadow_l = 0.0;
        self.shadow_r = 0.0;
        self.primed = false;
    }

    fn model(&self) -> PanningModel {
        PanningModel::Hrtf
    }
}
