//! Per-quantum render scheduling.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::GraphNode;
use crate::context::RenderContext;
use crate::processor::ProcessContext;

impl GraphNode {
    /// Renders this node's outputs for the current quantum, once.
    ///
    /// Called by downstream consumers during the pull phase. A second call
    /// within the same quantum returns immediately and leaves the already
    /// rendered output in place, so fan-out never duplicates work. The
    /// processing timestamp is stamped before any input is pulled, which is
    /// what terminates feedback cycles.
    pub fn render_if_due(self: &Arc<Self>, frames: usize) {
        let Some(context) = self.context.upgrade() else {
            return;
        };
        if !self.is_initialized() {
            return;
        }
        debug_assert!(
            context.is_render_thread(),
            "render_if_due called outside the render thread"
        );

        let now = context.current_render_time();
        if self.last_processing_time.load() == now {
            return;
        }
        self.last_processing_time.store(now);

        if let Some(mut processor) = self.processor.try_lock() {
            processor.before_pull(self, &context);
        }
        self.pull_inputs(&context, frames);

        let silent = self.inputs_are_silent();
        if !silent {
            let end_frame = context.current_frame_index() + frames as u64;
            self.last_non_silent_time
                .store(end_frame as f64 / f64::from(context.sample_rate()));
        }

        for output in &self.outputs {
            output.bus.lock().set_len(frames);
        }

        let Some(mut processor) = self.processor.try_lock() else {
            self.silence_outputs();
            return;
        };
        if self.reset_requested.swap(false, Ordering::AcqRel) {
            processor.reset();
        }

        if silent && self.propagates_silence(now) && !processor.is_active_source() {
            self.silence_outputs();
        } else {
            processor.process(&mut ProcessContext::new(self, &context, frames));
            self.unsilence_outputs();
        }
    }

    /// Whether enough time has passed since the last non-silent input for
    /// any tail or latency to have decayed.
    pub fn propagates_silence(&self, now: f64) -> bool {
        self.last_non_silent_time() + self.latency_time() + self.tail_time() < now
    }

    /// Whether every input's summing bus is silent. Nodes without inputs
    /// count as silent.
    pub fn inputs_are_silent(&self) -> bool {
        self.inputs.iter().all(|input| input.bus_is_silent())
    }

    fn pull_inputs(self: &Arc<Self>, context: &RenderContext, frames: usize) {
        for input in &self.inputs {
            input.pull(context, frames);
        }
        for param in &self.params {
            param.pull(context, frames);
        }
    }

    fn silence_outputs(&self) {
        for output in &self.outputs {
            output.bus.lock().zero();
        }
    }

    fn unsilence_outputs(&self) {
        for output in &self.outputs {
            output.bus.lock().clear_silent_flag();
        }
    }
}
