//! In-memory buffer playback.
//!
//! [`SampleSourceNode`] plays a [`SampleBuffer`] once (or looped) from a
//! scheduled start time. While scheduled or playing, the context holds a
//! connection reference on the node so it keeps rendering after every handle
//! is dropped; when playback ends the render thread reports it finished and
//! the context releases that hold after the quantum.
//!
//! The node carries a [`DopplerSlot`]. A spatializer downstream registers on
//! it, and the source multiplies its playback rate by the reported ratio each
//! quantum.

use core::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::atomic::{AtomicF32, AtomicF64};
use crate::context::RenderContext;
use crate::doppler::DopplerSlot;
use crate::error::GraphError;
use crate::handle::NodeHandle;
use crate::node::{GraphNode, NodeKind, NodeOptions, RefKind};
use crate::processor::{AudioProcessor, ProcessContext};

/// Upper bound on the effective playback rate.
const MAX_RATE: f64 = 32.0;

/// Immutable multi-channel sample data.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: f32,
}

impl SampleBuffer {
    /// Creates a buffer from per-channel samples.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidArgument`] for zero channels, channels of
    /// unequal length, or a non-positive sample rate.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: f32) -> Result<Self, GraphError> {
        if channels.is_empty() {
            return Err(GraphError::invalid("sample buffer needs at least one channel"));
        }
        if channels.iter().any(|ch| ch.len() != channels[0].len()) {
            return Err(GraphError::invalid("sample buffer channels differ in length"));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(GraphError::invalid(format!(
                "sample buffer rate must be positive, got {sample_rate}"
            )));
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Creates a single-channel buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: f32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    /// Number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Whether the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample rate of the data.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Borrows one channel.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Playback length at unity rate, in seconds.
    pub fn duration(&self) -> f64 {
        self.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Where a source is in its one-shot life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackState {
    /// Created, `start` not yet called.
    Unscheduled = 0,
    /// Started with a future start time.
    Scheduled = 1,
    /// Producing audio.
    Playing = 2,
    /// Reached the end of the buffer or its stop time.
    Finished = 3,
}

impl PlaybackState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unscheduled,
            1 => Self::Scheduled,
            2 => Self::Playing,
            _ => Self::Finished,
        }
    }
}

/// State shared between the control handle and the render processor.
struct Transport {
    state: AtomicU8,
    start_time: AtomicF64,
    stop_time: AtomicF64,
    playback_rate: AtomicF32,
    looping: AtomicBool,
    applied_doppler: AtomicF64,
}

impl Transport {
    fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn advance(&self, from: PlaybackState, to: PlaybackState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// A one-shot (or looping) buffer player.
///
/// Dereferences to its [`NodeHandle`], so it connects like any other node.
pub struct SampleSourceNode {
    handle: NodeHandle,
    transport: Arc<Transport>,
}

impl SampleSourceNode {
    /// Creates a source playing `buffer` in `context`.
    pub fn new(context: &Arc<RenderContext>, buffer: Arc<SampleBuffer>) -> Self {
        let transport = Arc::new(Transport {
            state: AtomicU8::new(PlaybackState::Unscheduled as u8),
            start_time: AtomicF64::new(0.0),
            stop_time: AtomicF64::new(f64::INFINITY),
            playback_rate: AtomicF32::new(1.0),
            looping: AtomicBool::new(false),
            applied_doppler: AtomicF64::new(1.0),
        });
        let doppler = Arc::new(DopplerSlot::new());
        let options = NodeOptions::new(NodeKind::SampleSource)
            .with_output(buffer.num_channels().max(1))
            .with_doppler_slot(Arc::clone(&doppler));
        let processor = SourceProcessor {
            buffer,
            transport: Arc::clone(&transport),
            doppler,
            position: 0.0,
        };
        Self {
            handle: GraphNode::create(context, options, processor),
            transport,
        }
    }

    /// Schedules playback at render time `when` (seconds).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidArgument`] if `when` is negative or not
    /// finite, if the source was already started, or if the context is gone.
    pub fn start(&self, when: f64) -> Result<(), GraphError> {
        if !(when.is_finite() && when >= 0.0) {
            return Err(GraphError::invalid(format!(
                "start time must be a non-negative number, got {when}"
            )));
        }
        let context = self
            .handle
            .context()
            .ok_or_else(|| GraphError::invalid("render context has shut down"))?;
        let _graph = context.lock_graph();

        // Only `start` leaves Unscheduled, and it holds the graph lock. The
        // start time is stored before the render thread can see Scheduled.
        if self.transport.state() != PlaybackState::Unscheduled {
            return Err(GraphError::invalid("source can only be started once"));
        }
        self.transport.start_time.store(when);
        self.transport
            .advance(PlaybackState::Unscheduled, PlaybackState::Scheduled);
        self.handle.node().add_reference(RefKind::Connection);

        #[cfg(feature = "tracing")]
        tracing::debug!("source_started: {} at {when:.4}s", self.handle.id());
        Ok(())
    }

    /// Ends playback at render time `when` (seconds).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidArgument`] if the source was never
    /// started or `when` is not a number.
    pub fn stop(&self, when: f64) -> Result<(), GraphError> {
        if when.is_nan() {
            return Err(GraphError::invalid("stop time must be a number"));
        }
        if self.transport.state() == PlaybackState::Unscheduled {
            return Err(GraphError::invalid("cannot stop a source that was never started"));
        }
        self.transport.stop_time.store(when.max(0.0));
        Ok(())
    }

    /// Scheduled start, seconds of render time.
    pub fn start_time(&self) -> f64 {
        self.transport.start_time.load()
    }

    /// Current playback state.
    pub fn playback_state(&self) -> PlaybackState {
        self.transport.state()
    }

    /// Base playback rate before Doppler shift.
    pub fn playback_rate(&self) -> f32 {
        self.transport.playback_rate.load()
    }

    /// Sets the base playback rate; clamped to `[0, 32]`.
    pub fn set_playback_rate(&self, rate: f32) {
        if rate.is_finite() {
            self.transport.playback_rate.store(rate.clamp(0.0, MAX_RATE as f32));
        }
    }

    /// Whether playback wraps at the end of the buffer.
    pub fn is_looping(&self) -> bool {
        self.transport.looping.load(Ordering::Acquire)
    }

    /// Enables or disables looping.
    pub fn set_loop(&self, looping: bool) {
        self.transport.looping.store(looping, Ordering::Release);
    }

    /// Doppler ratio applied during the most recent rendered quantum.
    pub fn doppler_rate(&self) -> f64 {
        self.transport.applied_doppler.load()
    }

    /// Whether a live spatializer is registered for Doppler shifting.
    pub fn has_doppler_provider(&self) -> bool {
        self.handle
            .doppler_slot()
            .is_some_and(|slot| slot.is_registered())
    }

    /// The underlying handle.
    pub fn handle(&self) -> &NodeHandle {
        &self.handle
    }
}

impl Deref for SampleSourceNode {
    type Target = NodeHandle;

    fn deref(&self) -> &NodeHandle {
        &self.handle
    }
}

struct SourceProcessor {
    buffer: Arc<SampleBuffer>,
    transport: Arc<Transport>,
    doppler: Arc<DopplerSlot>,
    /// Read position in buffer frames.
    position: f64,
}

impl SourceProcessor {
    fn finish(&self, ctx: &ProcessContext<'_>) {
        if self
            .transport
            .advance(PlaybackState::Playing, PlaybackState::Finished)
            || self
                .transport
                .advance(PlaybackState::Scheduled, PlaybackState::Finished)
        {
            #[cfg(feature = "tracing")]
            tracing::debug!("source_finished: {}", ctx.node().id());
            ctx.finish_playback();
        }
    }

    /// Linearly interpolated sample at the current position.
    #[inline]
    fn sample_at(&self, channel: &[f32], looping: bool) -> f32 {
        let index = self.position as usize;
        let frac = (self.position - index as f64) as f32;
        let a = channel.get(index).copied().unwrap_or(0.0);
        let b = match channel.get(index + 1) {
            Some(&next) => next,
            None if looping => channel.first().copied().unwrap_or(0.0),
            None => 0.0,
        };
        a + (b - a) * frac
    }
}

impl AudioProcessor for SourceProcessor {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        let mut out = ctx.output(0);
        out.zero();

        let state = self.transport.state();
        if !matches!(state, PlaybackState::Scheduled | PlaybackState::Playing) {
            return;
        }

        let frames = ctx.frames();
        let sample_rate = f64::from(ctx.sample_rate());
        let block_start = ctx.current_time();
        let start = self.transport.start_time.load();
        let stop = self.transport.stop_time.load();

        let first = ((start - block_start) * sample_rate).ceil().max(0.0) as usize;
        if first >= frames {
            return;
        }
        if state == PlaybackState::Scheduled {
            self.transport
                .advance(PlaybackState::Scheduled, PlaybackState::Playing);
        }

        let doppler = self.doppler.rate();
        self.transport.applied_doppler.store(doppler);
        let resample = if self.buffer.sample_rate() > 0.0 {
            f64::from(self.buffer.sample_rate()) / sample_rate
        } else {
            1.0
        };
        let rate = (f64::from(self.transport.playback_rate.load()) * doppler * resample)
            .clamp(0.0, MAX_RATE);
        let looping = self.transport.looping.load(Ordering::Acquire);
        let length = self.buffer.len() as f64;
        let channels = out.num_channels().min(self.buffer.num_channels());

        for frame in first..frames {
            if block_start + frame as f64 / sample_rate >= stop {
                self.finish(ctx);
                return;
            }
            if self.position >= length {
                if looping && length > 0.0 {
                    self.position %= length;
                } else {
                    self.finish(ctx);
                    return;
                }
            }
            for ch in 0..channels {
                let Some(data) = self.buffer.channel(ch) else {
                    continue;
                };
                let sample = self.sample_at(data, looping);
                out.channel_mut(ch)[frame] = sample;
            }
            self.position += rate;
        }
    }

    fn reset(&mut self) {}

    fn is_active_source(&self) -> bool {
        matches!(
            self.transport.state(),
            PlaybackState::Scheduled | PlaybackState::Playing
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::AudioBus;
    use crate::context::ContextOptions;

    fn render(context: &RenderContext) -> AudioBus {
        let mut out = AudioBus::new(2, context.quantum_frames());
        context.render_quantum(&mut out);
        out
    }

    #[test]
    fn buffer_rejects_ragged_channels() {
        assert!(SampleBuffer::new(vec![vec![0.0; 4], vec![0.0; 3]], 48000.0).is_err());
        assert!(SampleBuffer::new(Vec::new(), 48000.0).is_err());
        assert!(SampleBuffer::new(vec![vec![0.0; 4]], 0.0).is_err());
        let buffer = SampleBuffer::new(vec![vec![0.0; 480]; 2], 48000.0).unwrap();
        assert_eq!(buffer.num_channels(), 2);
        assert!((buffer.duration() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn unstarted_source_is_silent() {
        let context = RenderContext::new(ContextOptions::default());
        let source = SampleSourceNode::new(&context, Arc::new(SampleBuffer::mono(vec![1.0; 512], 48000.0)));
        source.connect(context.destination(), 0, 0).unwrap();
        assert!(render(&context).is_silent());
        assert_eq!(source.playback_state(), PlaybackState::Unscheduled);
    }

    #[test]
    fn playing_source_reaches_destination() {
        let context = RenderContext::new(ContextOptions::default());
        let source = SampleSourceNode::new(&context, Arc::new(SampleBuffer::mono(vec![0.5; 512], 48000.0)));
        source.connect(context.destination(), 0, 0).unwrap();
        source.start(0.0).unwrap();

        let out = render(&context);
        assert_eq!(source.playback_state(), PlaybackState::Playing);
        assert!((out.channel(0)[10] - 0.5).abs() < 1e-6);
        assert!((out.channel(1)[10] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn second_start_is_rejected() {
        let context = RenderContext::new(ContextOptions::default());
        let source = SampleSourceNode::new(&context, Arc::new(SampleBuffer::mono(vec![0.5; 16], 48000.0)));
        source.start(5.0).unwrap();
        assert!(matches!(source.start(0.0), Err(GraphError::InvalidArgument(_))));
        assert_eq!(source.start_time(), 5.0);
        assert_eq!(source.playback_state(), PlaybackState::Scheduled);
        assert_eq!(source.connection_ref_count(), 1);
    }

    #[test]
    fn stop_before_start_is_rejected() {
        let context = RenderContext::new(ContextOptions::default());
        let source = SampleSourceNode::new(&context, Arc::new(SampleBuffer::mono(vec![0.5; 16], 48000.0)));
        assert!(source.stop(0.0).is_err());
    }

    #[test]
    fn finished_source_releases_context_hold() {
        let context = RenderContext::new(ContextOptions::default());
        let source = SampleSourceNode::new(&context, Arc::new(SampleBuffer::mono(vec![0.5; 64], 48000.0)));
        source.connect(context.destination(), 0, 0).unwrap();
        source.start(0.0).unwrap();
        assert_eq!(source.connection_ref_count(), 1);

        let out = render(&context);
        assert_eq!(source.playback_state(), PlaybackState::Finished);
        assert!((out.channel(0)[63] - 0.5).abs() < 1e-6);
        assert_eq!(out.channel(0)[64], 0.0);
        assert_eq!(source.connection_ref_count(), 0);
    }

    #[test]
    fn delayed_start_begins_mid_quantum() {
        let context = RenderContext::new(ContextOptions::default());
        let source = SampleSourceNode::new(&context, Arc::new(SampleBuffer::mono(vec![1.0; 1024], 48000.0)));
        source.connect(context.destination(), 0, 0).unwrap();
        source.start(64.0 / 48000.0).unwrap();

        let out = render(&context);
        assert_eq!(out.channel(0)[63], 0.0);
        assert!((out.channel(0)[64] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn looping_wraps_around() {
        let context = RenderContext::new(ContextOptions::default());
        let source = SampleSourceNode::new(&context, Arc::new(SampleBuffer::mono(vec![0.25; 32], 48000.0)));
        source.connect(context.destination(), 0, 0).unwrap();
        source.set_loop(true);
        source.start(0.0).unwrap();

        for _ in 0..4 {
            let out = render(&context);
            assert!(!out.is_silent());
        }
        assert_eq!(source.playback_state(), PlaybackState::Playing);
    }

    #[test]
    fn playback_rate_is_clamped() {
        let context = RenderContext::new(ContextOptions::default());
        let source = SampleSourceNode::new(&context, Arc::new(SampleBuffer::mono(vec![0.0; 8], 48000.0)));
        source.set_playback_rate(100.0);
        assert_eq!(source.playback_rate(), 32.0);
        source.set_playback_rate(f32::NAN);
        assert_eq!(source.playback_rate(), 32.0);
        assert!(!source.has_doppler_provider());
        assert_eq!(source.doppler_rate(), 1.0);
    }
}
