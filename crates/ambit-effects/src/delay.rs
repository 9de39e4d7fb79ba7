//! Delay line node.
//!
//! The node's tail time is its maximum delay: after the input falls silent
//! the scheduler keeps processing it for that long, so the last echoes of
//! the line reach the output before silence propagation takes over.

use core::ops::Deref;
use std::sync::Arc;

use ambit_core::{
    AtomicF64, AudioParam, AudioProcessor, GraphError, GraphNode, NodeHandle, NodeKind,
    NodeOptions, ParamDescriptor, ProcessContext, RenderContext,
};
use parking_lot::Mutex;

/// Longest delay a node can be built with, seconds.
pub const MAX_DELAY_LIMIT: f64 = 180.0;

/// Delay in seconds. Values beyond the node's maximum delay are clamped to
/// it while rendering.
pub const DELAY_TIME: ParamDescriptor =
    ParamDescriptor::new("delayTime", 0.0, 0.0, MAX_DELAY_LIMIT as f32);

const CHANNELS: usize = 2;

/// Circular buffer with linear-interpolated fractional reads.
///
/// Writes happen before reads, so a delay of 0 passes the input through.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write: usize,
}

impl DelayLine {
    /// A line able to delay by up to `max_delay_samples`.
    pub fn new(max_delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_delay_samples + 2],
            write: 0,
        }
    }

    /// Longest delay this line supports, in samples.
    pub fn max_delay(&self) -> usize {
        self.buffer.len() - 2
    }

    /// Writes `input` and returns the sample `delay` samples back.
    #[inline]
    pub fn process(&mut self, input: f32, delay: f32) -> f32 {
        let len = self.buffer.len();
        self.buffer[self.write] = input;

        let delay = if delay.is_nan() { 0.0 } else { delay.clamp(0.0, self.max_delay() as f32) };
        let whole = delay as usize;
        let frac = delay - whole as f32;
        let a = self.buffer[(self.write + len - whole) % len];
        let b = self.buffer[(self.write + len - whole - 1) % len];

        self.write = (self.write + 1) % len;
        a + (b - a) * frac
    }

    /// Zeroes the line.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write = 0;
    }
}

fn validate_max_delay(seconds: f64) -> Result<(), GraphError> {
    if seconds.is_finite() && seconds > 0.0 && seconds <= MAX_DELAY_LIMIT {
        Ok(())
    } else {
        Err(GraphError::invalid(format!(
            "max delay must be in (0, {MAX_DELAY_LIMIT}] seconds, got {seconds}"
        )))
    }
}

fn lines_for(sample_rate: f32, max_delay: f64) -> Vec<DelayLine> {
    let samples = (max_delay * f64::from(sample_rate)).ceil() as usize;
    (0..CHANNELS).map(|_| DelayLine::new(samples)).collect()
}

struct Shared {
    max_delay: AtomicF64,
    pending_lines: Mutex<Option<Vec<DelayLine>>>,
}

/// Delays its input by a modulatable time.
pub struct DelayNode {
    handle: NodeHandle,
    delay_time: Arc<AudioParam>,
    shared: Arc<Shared>,
}

impl DelayNode {
    /// Creates a delay able to reach `max_delay` seconds.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidArgument`] unless `0 < max_delay <= 180`.
    pub fn new(context: &Arc<RenderContext>, max_delay: f64) -> Result<Self, GraphError> {
        validate_max_delay(max_delay)?;
        let delay_time = AudioParam::new(context, DELAY_TIME);
        let shared = Arc::new(Shared {
            max_delay: AtomicF64::new(max_delay),
            pending_lines: Mutex::new(None),
        });
        let processor = DelayProcessor {
            delay_time: Arc::clone(&delay_time),
            shared: Arc::clone(&shared),
            lines: lines_for(context.sample_rate(), max_delay),
            values: vec![0.0; context.quantum_frames()],
        };
        let options = NodeOptions::new(NodeKind::Delay)
            .with_input(CHANNELS)
            .with_output(CHANNELS)
            .with_tail_time(max_delay)
            .with_param(Arc::clone(&delay_time));
        Ok(Self {
            handle: GraphNode::create(context, options, processor),
            delay_time,
            shared,
        })
    }

    /// The delay-time parameter, seconds.
    pub fn delay_time(&self) -> &Arc<AudioParam> {
        &self.delay_time
    }

    /// Longest reachable delay, seconds.
    pub fn max_delay(&self) -> f64 {
        self.shared.max_delay.load()
    }

    /// Changes the longest reachable delay. The node's tail time follows.
    ///
    /// New lines are allocated here and swapped in by the render thread at
    /// its next quantum; their history starts empty.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidArgument`] unless `0 < seconds <= 180`.
    pub fn set_max_delay(&self, seconds: f64) -> Result<(), GraphError> {
        validate_max_delay(seconds)?;
        *self.shared.pending_lines.lock() = Some(lines_for(self.handle.sample_rate(), seconds));
        self.shared.max_delay.store(seconds);
        self.handle.set_tail_time(seconds);

        #[cfg(feature = "tracing")]
        tracing::debug!("delay_max_changed: {} → {seconds}s", self.handle.id());
        Ok(())
    }

    /// The underlying handle.
    pub fn handle(&self) -> &NodeHandle {
        &self.handle
    }
}

impl Deref for DelayNode {
    type Target = NodeHandle;

    fn deref(&self) -> &NodeHandle {
        &self.handle
    }
}

struct DelayProcessor {
    delay_time: Arc<AudioParam>,
    shared: Arc<Shared>,
    lines: Vec<DelayLine>,
    values: Vec<f32>,
}

impl AudioProcessor for DelayProcessor {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        if let Some(mut pending) = self.shared.pending_lines.try_lock()
            && let Some(lines) = pending.take()
        {
            self.lines = lines;
        }

        let frames = ctx.frames().min(self.values.len());
        let sample_rate = ctx.sample_rate();
        let mut output = ctx.output(0);
        output.copy_from(&ctx.input(0));

        self.delay_time.sample_values(&mut self.values[..frames]);
        for value in &mut self.values[..frames] {
            *value *= sample_rate;
        }

        for (ch, line) in self.lines.iter_mut().enumerate().take(output.num_channels()) {
            for (x, &delay) in output.channel_mut(ch)[..frames].iter_mut().zip(&self.values) {
                *x = line.process(*x, delay);
            }
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambit_core::ContextOptions;

    #[test]
    fn zero_delay_passes_through() {
        let mut line = DelayLine::new(16);
        assert_eq!(line.process(0.7, 0.0), 0.7);
        assert_eq!(line.process(-0.2, 0.0), -0.2);
    }

    #[test]
    fn integer_delay_shifts_by_whole_samples() {
        let mut line = DelayLine::new(8);
        let out: Vec<f32> = [1.0, 0.0, 0.0, 0.0, 0.0]
            .iter()
            .map(|&x| line.process(x, 3.0))
            .collect();
        assert_eq!(out, vec![0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn fractional_delay_interpolates() {
        let mut line = DelayLine::new(8);
        line.process(1.0, 0.5);
        let out = line.process(0.0, 0.5);
        assert!((out - 0.5).abs() < 1e-6);
    }

    #[test]
    fn delay_is_clamped_to_capacity() {
        let mut line = DelayLine::new(4);
        assert_eq!(line.max_delay(), 4);
        line.process(1.0, 100.0);
        for _ in 0..3 {
            line.process(0.0, 100.0);
        }
        assert_eq!(line.process(0.0, 100.0), 1.0);
    }

    #[test]
    fn max_delay_is_validated() {
        let context = RenderContext::new(ContextOptions::default());
        assert!(DelayNode::new(&context, 0.0).is_err());
        assert!(DelayNode::new(&context, f64::NAN).is_err());
        assert!(DelayNode::new(&context, 181.0).is_err());
        let delay = DelayNode::new(&context, 0.5).unwrap();
        assert_eq!(delay.tail_time(), 0.5);
        assert!(delay.set_max_delay(-1.0).is_err());
        assert_eq!(delay.max_delay(), 0.5);
    }

    #[test]
    fn tail_time_follows_max_delay() {
        let context = RenderContext::new(ContextOptions::default());
        let delay = DelayNode::new(&context, 1.0).unwrap();
        delay.set_max_delay(2.5).unwrap();
        assert_eq!(delay.max_delay(), 2.5);
        assert_eq!(delay.tail_time(), 2.5);
    }
}
