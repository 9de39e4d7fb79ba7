//! Multi-channel sample buffers for endpoints.
//!
//! Every input and output endpoint owns one [`AudioBus`]. A bus carries a
//! *silent* flag next to its samples: zeroing sets it, writing real audio
//! clears it, and summing a silent bus into another is a no-op. The render
//! scheduler uses the flag to skip processing for nodes whose inputs carry
//! nothing.
//!
//! # Channel Mixing
//!
//! [`AudioBus::sum_from`] mixes between channel layouts using speaker rules
//! for the mono/stereo cases and discrete (channel-by-channel) mixing
//! otherwise:
//!
//! | source → dest | rule |
//! |---------------|------|
//! | N → N | per-channel add |
//! | 1 → 2 | mono added to both channels |
//! | 2 → 1 | `0.5 * (L + R)` |
//! | other | first `min(src, dst)` channels added, rest dropped |

/// A fixed channel-count block of samples with silence tracking.
#[derive(Debug, Clone)]
pub struct AudioBus {
    channels: Vec<Vec<f32>>,
    silent: bool,
}

impl AudioBus {
    /// Creates a zeroed, silent bus.
    ///
    /// `frames` is also the capacity: later [`set_len`](Self::set_len) calls
    /// up to this size do not allocate.
    pub fn new(num_channels: usize, frames: usize) -> Self {
        Self {
            channels: (0..num_channels).map(|_| vec![0.0; frames]).collect(),
            silent: true,
        }
    }

    /// Returns the number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Returns the number of frames per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Returns true if the bus holds no frames.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Changes the frame count, zero-filling any new frames.
    pub fn set_len(&mut self, frames: usize) {
        for channel in &mut self.channels {
            channel.resize(frames, 0.0);
        }
    }

    /// Borrows one channel.
    ///
    /// # Panics
    ///
    /// Panics if `index >= num_channels()`.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Mutably borrows one channel.
    ///
    /// Does not touch the silent flag; callers that write audio through this
    /// should call [`clear_silent_flag`](Self::clear_silent_flag).
    ///
    /// # Panics
    ///
    /// Panics if `index >= num_channels()`.
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// Mutably borrows the first two channels at once.
    ///
    /// # Panics
    ///
    /// Panics if the bus has fewer than two channels.
    pub fn stereo_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        let (left, rest) = self.channels.split_at_mut(1);
        (&mut left[0], &mut rest[0])
    }

    /// Zeros every sample and marks the bus silent.
    pub fn zero(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
        self.silent = true;
    }

    /// Whether the bus is known to hold only silence.
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Marks the bus as carrying audio.
    pub fn clear_silent_flag(&mut self) {
        self.silent = false;
    }

    /// Replaces this bus's contents with `other`, mixed to this layout.
    pub fn copy_from(&mut self, other: &AudioBus) {
        self.zero();
        self.sum_from(other);
    }

    /// Adds `other` into this bus, mixed to this layout.
    ///
    /// Frames beyond the shorter of the two buses are left untouched.
    pub fn sum_from(&mut self, other: &AudioBus) {
        if other.silent || other.channels.is_empty() || self.channels.is_empty() {
            return;
        }
        let frames = self.len().min(other.len());
        let (src, dst) = (other.channels.len(), self.channels.len());

        match (src, dst) {
            (1, 2) => {
                let mono = &other.channels[0][..frames];
                for channel in &mut self.channels {
                    accumulate(&mut channel[..frames], mono);
                }
            }
            (2, 1) => {
                let (left, right) = (&other.channels[0], &other.channels[1]);
                let out = &mut self.channels[0];
                for i in 0..frames {
                    out[i] += 0.5 * (left[i] + right[i]);
                }
            }
            _ => {
                for (dst, src) in self.channels.iter_mut().zip(other.channels.iter()) {
                    accumulate(&mut dst[..frames], &src[..frames]);
                }
            }
        }
        self.silent = false;
    }

    /// Multiplies every sample by `gain`.
    pub fn scale(&mut self, gain: f32) {
        for channel in &mut self.channels {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// Applies a gain that moves linearly from `from` to `to` across the block.
    ///
    /// Frame `n` of an `N`-frame block is scaled by
    /// `from + (to - from) * (n + 1) / N`, so the last frame lands exactly on
    /// `to` and the next block can start from there without a step.
    pub fn apply_gain_ramp(&mut self, from: f32, to: f32) {
        let frames = self.len();
        if frames == 0 {
            return;
        }
        if from == to {
            self.scale(to);
            return;
        }
        let step = (to - from) / frames as f32;
        for channel in &mut self.channels {
            for (n, sample) in channel.iter_mut().enumerate() {
                *sample *= from + step * (n + 1) as f32;
            }
        }
    }

    /// Returns the largest absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|channel| channel.iter())
            .fold(0.0f32, |peak, sample| peak.max(sample.abs()))
    }
}

#[inline]
fn accumulate(dst: &mut [f32], src: &[f32]) {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d += *s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(num_channels: usize, frames: usize, value: f32) -> AudioBus {
        let mut bus = AudioBus::new(num_channels, frames);
        for c in 0..num_channels {
            bus.channel_mut(c).fill(value);
        }
        bus.clear_silent_flag();
        bus
    }

    #[test]
    fn new_bus_is_silent() {
        let bus = AudioBus::new(2, 64);
        assert!(bus.is_silent());
        assert_eq!(bus.len(), 64);
        assert_eq!(bus.num_channels(), 2);
        assert_eq!(bus.peak(), 0.0);
    }

    #[test]
    fn summing_silent_bus_keeps_silence() {
        let mut dst = AudioBus::new(2, 16);
        let src = AudioBus::new(2, 16);
        dst.sum_from(&src);
        assert!(dst.is_silent());
    }

    #[test]
    fn mono_upmixes_to_both_channels() {
        let mut dst = AudioBus::new(2, 8);
        dst.sum_from(&filled(1, 8, 0.25));
        assert!(!dst.is_silent());
        assert!(dst.channel(0).iter().all(|&s| s == 0.25));
        assert!(dst.channel(1).iter().all(|&s| s == 0.25));
    }

    #[test]
    fn stereo_downmixes_to_average() {
        let mut src = AudioBus::new(2, 4);
        src.channel_mut(0).fill(1.0);
        src.channel_mut(1).fill(0.5);
        src.clear_silent_flag();

        let mut dst = AudioBus::new(1, 4);
        dst.sum_from(&src);
        assert!(dst.channel(0).iter().all(|&s| (s - 0.75).abs() < 1e-6));
    }

    #[test]
    fn sum_accumulates_fan_in() {
        let mut dst = AudioBus::new(1, 4);
        dst.sum_from(&filled(1, 4, 0.25));
        dst.sum_from(&filled(1, 4, 0.5));
        assert!(dst.channel(0).iter().all(|&s| (s - 0.75).abs() < 1e-6));
    }

    #[test]
    fn copy_from_replaces_previous_contents() {
        let mut dst = filled(2, 4, 9.0);
        dst.copy_from(&AudioBus::new(2, 4));
        assert!(dst.is_silent());
        assert_eq!(dst.peak(), 0.0);
    }

    #[test]
    fn gain_ramp_ends_on_target() {
        let mut bus = filled(1, 4, 1.0);
        bus.apply_gain_ramp(0.0, 1.0);
        assert_eq!(bus.channel(0), &[0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn gain_ramp_with_equal_endpoints_is_flat() {
        let mut bus = filled(2, 8, 1.0);
        bus.apply_gain_ramp(0.5, 0.5);
        assert!(bus.channel(1).iter().all(|&s| s == 0.5));
    }

    #[test]
    fn set_len_within_capacity_zero_fills() {
        let mut bus = filled(1, 8, 1.0);
        bus.set_len(4);
        bus.set_len(8);
        assert_eq!(&bus.channel(0)[4..], &[0.0; 4]);
    }
}
