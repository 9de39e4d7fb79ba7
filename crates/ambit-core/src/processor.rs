//! Node-type-specific processing.
//!
//! A [`GraphNode`] supplies scheduling, lifecycle and endpoints; what it
//! actually does with audio is delegated to an [`AudioProcessor`]. Processors
//! run only on the render thread, inside [`GraphNode::render_if_due`], after
//! the node's inputs have been pulled for the quantum.
//!
//! ## Design Decisions
//!
//! - **Object-safe**: nodes hold `Box<dyn AudioProcessor>`, so node types
//!   are open-ended without generic parameters leaking into the graph.
//! - **No allocations**: `process` is called every quantum on the real-time
//!   thread. Scratch space belongs in the processor, sized at construction or
//!   in `initialize`.
//! - **State sharing**: control-plane handles talk to their processor through
//!   shared atomics or `ArcSwap` snapshots, never through the processor's
//!   lock.

use std::sync::Arc;

use parking_lot::MutexGuard;

use crate::bus::AudioBus;
use crate::context::RenderContext;
use crate::listener::Listener;
use crate::node::GraphNode;

/// Processing strategy of a graph node.
///
/// # Example
///
/// ```rust
/// use ambit_core::{AudioProcessor, ProcessContext};
///
/// struct Invert;
///
/// impl AudioProcessor for Invert {
///     fn process(&mut self, ctx: &mut ProcessContext<'_>) {
///         let input = ctx.input(0);
///         let mut output = ctx.output(0);
///         output.copy_from(&input);
///         output.scale(-1.0);
///     }
///
///     fn reset(&mut self) {}
/// }
/// ```
pub trait AudioProcessor: Send {
    /// Prepare for rendering at `sample_rate`.
    ///
    /// Called once at node construction and again after re-initialization.
    fn initialize(&mut self, sample_rate: f32) {
        let _ = sample_rate;
    }

    /// Release rendering resources; the node stops processing.
    fn uninitialize(&mut self) {}

    /// Render one quantum into the node's output buses.
    fn process(&mut self, ctx: &mut ProcessContext<'_>);

    /// Clear internal history (delay lines, filter state, smoothing).
    fn reset(&mut self);

    /// Whether the node produces sound with silent (or no) inputs, such as a
    /// playing source. Active sources are never skipped by silence
    /// propagation.
    fn is_active_source(&self) -> bool {
        false
    }

    /// Hook run each quantum after the node is stamped and before its inputs
    /// are pulled.
    fn before_pull(&mut self, node: &Arc<GraphNode>, context: &RenderContext) {
        let _ = (node, context);
    }
}

/// What a processor sees while rendering one quantum.
pub struct ProcessContext<'a> {
    node: &'a Arc<GraphNode>,
    context: &'a RenderContext,
    frames: usize,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(node: &'a Arc<GraphNode>, context: &'a RenderContext, frames: usize) -> Self {
        Self {
            node,
            context,
            frames,
        }
    }

    /// Frames to render this quantum.
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Context sample rate.
    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.context.sample_rate()
    }

    /// Render time at the start of this quantum, in seconds.
    pub fn current_time(&self) -> f64 {
        self.context.current_render_time()
    }

    /// Frame index at the start of this quantum.
    pub fn current_frame(&self) -> u64 {
        self.context.current_frame_index()
    }

    /// The context's listener.
    pub fn listener(&self) -> &Listener {
        self.context.listener()
    }

    /// The node being processed.
    pub fn node(&self) -> &Arc<GraphNode> {
        self.node
    }

    /// The render context.
    pub fn context(&self) -> &RenderContext {
        self.context
    }

    /// Locks input `index`'s summing bus.
    ///
    /// # Panics
    ///
    /// Panics if the node has no input `index`.
    pub fn input(&self, index: usize) -> MutexGuard<'a, AudioBus> {
        self.node.inputs[index].bus.lock()
    }

    /// Locks output `index`'s bus for writing.
    ///
    /// # Panics
    ///
    /// Panics if the node has no output `index`.
    pub fn output(&self, index: usize) -> MutexGuard<'a, AudioBus> {
        self.node.outputs[index].bus.lock()
    }

    /// Whether input `index` has any link in its render snapshot.
    pub fn input_is_connected(&self, index: usize) -> bool {
        self.node
            .inputs
            .get(index)
            .is_some_and(|input| input.rendering_connection_count() > 0)
    }

    /// Reports that a source has finished playing; the context releases the
    /// hold it took at start after this quantum.
    pub fn finish_playback(&self) {
        self.context.notify_source_finished(Arc::clone(self.node));
    }
}
