//! Hard clipper and tanh soft saturator.

use core::fmt;
use core::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use ambit_core::{
    AudioParam, AudioProcessor, GraphNode, NodeHandle, NodeKind, NodeOptions, ParamDescriptor,
    ProcessContext, RenderContext,
};

/// Parameter `a`: the lower bound in [`ClipMode::Clip`], the output gain in
/// [`ClipMode::Tanh`].
pub const CLIP_A: ParamDescriptor = ParamDescriptor::new("a", -1.0, -64.0, 64.0);
/// Parameter `b`: the upper bound in [`ClipMode::Clip`], the input gain in
/// [`ClipMode::Tanh`].
pub const CLIP_B: ParamDescriptor = ParamDescriptor::new("b", 1.0, -64.0, 64.0);

/// Transfer curve of a [`ClipNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ClipMode {
    /// Hard clip to `[a, b]`.
    #[default]
    Clip = 0,
    /// `a * tanh(b * x)`; larger `b` saturates harder.
    Tanh = 1,
}

impl ClipMode {
    fn from_u8(value: u8) -> Self {
        if value == ClipMode::Tanh as u8 {
            ClipMode::Tanh
        } else {
            ClipMode::Clip
        }
    }
}

impl fmt::Display for ClipMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClipMode::Clip => "clip",
            ClipMode::Tanh => "tanh",
        })
    }
}

/// Hard clip of one sample to `[low, high]`.
///
/// Never panics: with `low > high` the upper bound wins.
#[inline]
pub fn hard_clip(x: f32, low: f32, high: f32) -> f32 {
    x.max(low).min(high)
}

/// `gain * tanh(drive * x)`.
#[inline]
pub fn soft_clip(x: f32, gain: f32, drive: f32) -> f32 {
    gain * libm::tanhf(drive * x)
}

/// Clipping node with two modulatable parameters.
///
/// # Example
///
/// ```rust
/// use ambit_core::{ContextOptions, RenderContext};
/// use ambit_effects::{ClipMode, ClipNode};
///
/// let context = RenderContext::new(ContextOptions::default());
/// let clip = ClipNode::new(&context);
/// clip.set_mode(ClipMode::Tanh);
/// clip.a().set_value(0.8); // output gain
/// clip.b().set_value(4.0); // drive
/// ```
pub struct ClipNode {
    handle: NodeHandle,
    mode: Arc<AtomicU8>,
    a: Arc<AudioParam>,
    b: Arc<AudioParam>,
}

impl ClipNode {
    /// Creates a hard clipper with bounds `[-1, 1]`.
    pub fn new(context: &Arc<RenderContext>) -> Self {
        let mode = Arc::new(AtomicU8::new(ClipMode::Clip as u8));
        let a = AudioParam::new(context, CLIP_A);
        let b = AudioParam::new(context, CLIP_B);
        let frames = context.quantum_frames();
        let processor = ClipProcessor {
            mode: Arc::clone(&mode),
            a: Arc::clone(&a),
            b: Arc::clone(&b),
            a_values: vec![0.0; frames],
            b_values: vec![0.0; frames],
        };
        let options = NodeOptions::new(NodeKind::Clip)
            .with_input(2)
            .with_output(2)
            .with_param(Arc::clone(&a))
            .with_param(Arc::clone(&b));
        Self {
            handle: GraphNode::create(context, options, processor),
            mode,
            a,
            b,
        }
    }

    /// Current transfer curve.
    pub fn mode(&self) -> ClipMode {
        ClipMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Switches the transfer curve. Parameter values are kept.
    pub fn set_mode(&self, mode: ClipMode) {
        self.mode.store(mode as u8, Ordering::Release);

        #[cfg(feature = "tracing")]
        tracing::debug!("clip_mode: {} → {mode}", self.handle.id());
    }

    /// Parameter `a` (lower bound, or output gain).
    pub fn a(&self) -> &Arc<AudioParam> {
        &self.a
    }

    /// Parameter `b` (upper bound, or input gain).
    pub fn b(&self) -> &Arc<AudioParam> {
        &self.b
    }

    /// The underlying handle.
    pub fn handle(&self) -> &NodeHandle {
        &self.handle
    }
}

impl Deref for ClipNode {
    type Target = NodeHandle;

    fn deref(&self) -> &NodeHandle {
        &self.handle
    }
}

struct ClipProcessor {
    mode: Arc<AtomicU8>,
    a: Arc<AudioParam>,
    b: Arc<AudioParam>,
    a_values: Vec<f32>,
    b_values: Vec<f32>,
}

impl AudioProcessor for ClipProcessor {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        let frames = ctx.frames().min(self.a_values.len());
        let mut output = ctx.output(0);
        output.copy_from(&ctx.input(0));

        self.a.sample_values(&mut self.a_values[..frames]);
        self.b.sample_values(&mut self.b_values[..frames]);
        let (a, b) = (&self.a_values[..frames], &self.b_values[..frames]);

        let mode = ClipMode::from_u8(self.mode.load(Ordering::Acquire));
        for ch in 0..output.num_channels() {
            let samples = &mut output.channel_mut(ch)[..frames];
            match mode {
                ClipMode::Clip => {
                    for ((x, &low), &high) in samples.iter_mut().zip(a).zip(b) {
                        *x = hard_clip(*x, low, high);
                    }
                }
                ClipMode::Tanh => {
                    for ((x, &gain), &drive) in samples.iter_mut().zip(a).zip(b) {
                        *x = soft_clip(*x, gain, drive);
                    }
                }
            }
        }
    }

    fn reset(&mut self) {}
}
