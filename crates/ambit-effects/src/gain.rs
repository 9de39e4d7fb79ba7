//! Gain stage.
//!
//! The gain is an [`AudioParam`], so besides its intrinsic value it can be
//! modulated per sample by any connected output (tremolo, ducking, envelope
//! following). dB helpers work on the intrinsic value only.

use core::ops::Deref;
use std::sync::Arc;

use ambit_core::{
    AudioParam, AudioProcessor, GraphNode, NodeHandle, NodeKind, NodeOptions, ParamDescriptor,
    ProcessContext, RenderContext,
};

/// Linear gain, unity by default.
pub const GAIN: ParamDescriptor = ParamDescriptor::new("gain", 1.0, 0.0, 16.0);

/// Lowest level reported by [`linear_to_db`].
pub const MIN_DB: f32 = -200.0;

/// Convert decibels to linear gain.
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    const FACTOR: f32 = core::f32::consts::LN_10 / 20.0;
    libm::expf(db * FACTOR)
}

/// Convert linear gain to decibels, floored at [`MIN_DB`].
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    const FACTOR: f32 = 20.0 / core::f32::consts::LN_10;
    (libm::logf(linear.max(1e-10)) * FACTOR).max(MIN_DB)
}

/// Multiplies its input by a modulatable gain.
pub struct GainNode {
    handle: NodeHandle,
    gain: Arc<AudioParam>,
}

impl GainNode {
    /// Creates a unity-gain node.
    pub fn new(context: &Arc<RenderContext>) -> Self {
        let gain = AudioParam::new(context, GAIN);
        let processor = GainProcessor {
            gain: Arc::clone(&gain),
            values: vec![0.0; context.quantum_frames()],
        };
        let options = NodeOptions::new(NodeKind::Gain)
            .with_input(2)
            .with_output(2)
            .with_param(Arc::clone(&gain));
        Self {
            handle: GraphNode::create(context, options, processor),
            gain,
        }
    }

    /// The gain parameter.
    pub fn gain(&self) -> &Arc<AudioParam> {
        &self.gain
    }

    /// Intrinsic gain in dB.
    pub fn gain_db(&self) -> f32 {
        linear_to_db(self.gain.value())
    }

    /// Sets the intrinsic gain from dB; clamped to the parameter range.
    pub fn set_gain_db(&self, db: f32) {
        if !db.is_nan() {
            self.gain.set_value(db_to_linear(db));
        }
    }

    /// The underlying handle.
    pub fn handle(&self) -> &NodeHandle {
        &self.handle
    }
}

impl Deref for GainNode {
    type Target = NodeHandle;

    fn deref(&self) -> &NodeHandle {
        &self.handle
    }
}

struct GainProcessor {
    gain: Arc<AudioParam>,
    values: Vec<f32>,
}

impl AudioProcessor for GainProcessor {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        let frames = ctx.frames().min(self.values.len());
        let mut output = ctx.output(0);
        output.copy_from(&ctx.input(0));

        if !self.gain.has_connections() {
            output.scale(self.gain.value());
            return;
        }
        self.gain.sample_values(&mut self.values[..frames]);
        for ch in 0..output.num_channels() {
            for (x, &g) in output.channel_mut(ch)[..frames].iter_mut().zip(&self.values) {
                *x *= g;
            }
        }
    }

    fn reset(&mut self) {}
}
