//! Dual reference-count lifecycle.
//!
//! Teardown, disable and enable all cascade through the graph. Each cascade
//! runs over an explicit work-list so stack depth stays bounded no matter how
//! long a chain of nodes it reaches.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::{GraphNode, RefKind};
use crate::context::RenderContext;
use crate::endpoint::Target;

impl GraphNode {
    /// Adds a reference of `kind`.
    ///
    /// A new connection reference re-enables a disabled node's outputs and
    /// cancels any scheduled tail-time disable.
    pub fn add_reference(self: &Arc<Self>, kind: RefKind) {
        match kind {
            RefKind::Normal => {
                self.normal_refs.fetch_add(1, Ordering::AcqRel);
            }
            RefKind::Connection => {
                self.connection_refs.fetch_add(1, Ordering::AcqRel);
                self.disable_generation.fetch_add(1, Ordering::AcqRel);
                self.pending_disable.store(false, Ordering::Release);
                if self.is_disabled() {
                    self.enable_outputs_if_necessary();
                }
            }
        }
    }

    /// Releases a reference of `kind`.
    ///
    /// - Context gone: decrement immediately.
    /// - Render thread: try-acquire the graph lock; if it is busy, queue the
    ///   release on the context's deferred list instead of blocking.
    /// - Any other thread: block for the graph lock.
    ///
    /// Once the render thread has permanently finished, marked nodes are
    /// reclaimed right here since no render pass will do it.
    pub fn release_reference(self: &Arc<Self>, kind: RefKind) {
        let Some(context) = self.context.upgrade() else {
            self.finish_release(kind, None);
            return;
        };

        let ownership = if context.is_render_thread() {
            context.try_acquire_graph_lock()
        } else {
            Some(context.acquire_graph_lock())
        };

        match ownership {
            Some(must_release) => {
                self.finish_release(kind, Some(&context));
                if must_release {
                    context.release_graph_lock();
                }
            }
            None => {
                debug_assert_eq!(
                    kind,
                    RefKind::Connection,
                    "only connection releases may be deferred"
                );
                #[cfg(feature = "tracing")]
                tracing::debug!("release_deferred: {} {}", self.kind, self.id);
                context.enqueue_deferred_release(Arc::clone(self));
            }
        }

        if context.render_thread_has_finished() {
            context.reclaim_marked_nodes();
        }
    }

    /// Decrement-and-teardown step. Caller owns the graph lock, or the
    /// context is gone.
    pub(crate) fn finish_release(self: &Arc<Self>, kind: RefKind, context: Option<&RenderContext>) {
        Self::run_release_cascade(vec![(Arc::clone(self), kind)], context);
    }

    /// Processes pending decrements until no further teardown is triggered.
    pub(crate) fn run_release_cascade(
        mut work: Vec<(Arc<GraphNode>, RefKind)>,
        context: Option<&RenderContext>,
    ) {
        if let Some(context) = context {
            debug_assert!(
                context.is_graph_owner() || context.render_thread_has_finished(),
                "reference teardown requires graph ownership"
            );
        }

        while let Some((node, kind)) = work.pop() {
            if !node.decrement(kind) {
                continue;
            }
            if node.connection_ref_count() != 0 {
                continue;
            }

            if node.normal_ref_count() == 0 {
                if node.is_marked_for_deletion() {
                    continue;
                }
                for index in 0..node.outputs.len() {
                    node.disconnect_output_links(index, &mut work);
                }
                node.marked_for_deletion.store(true, Ordering::Release);

                #[cfg(feature = "tracing")]
                tracing::debug!("node_teardown: {} {}", node.kind, node.id);

                if let Some(context) = context {
                    context.mark_for_deletion(Arc::clone(&node));
                }
            } else if kind == RefKind::Connection {
                node.disable_outputs_if_necessary(context);
            }
        }
    }

    /// Decrements one counter, refusing to go below zero.
    fn decrement(&self, kind: RefKind) -> bool {
        let counter = match kind {
            RefKind::Normal => &self.normal_refs,
            RefKind::Connection => &self.connection_refs,
        };
        let released = counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        debug_assert!(
            released,
            "released a {kind:?} reference on {} {} whose count is already zero",
            self.kind, self.id
        );
        released
    }

    /// Removes every link from output `index`, queueing a connection release
    /// for each downstream node.
    pub(crate) fn disconnect_output_links(
        self: &Arc<Self>,
        index: usize,
        releases: &mut Vec<(Arc<GraphNode>, RefKind)>,
    ) {
        let targets = std::mem::take(&mut *self.outputs[index].targets.lock());
        for target in targets {
            match target {
                Target::Input { node, input } => {
                    if node.inputs[input].junction.disconnect(self, index) {
                        releases.push((node, RefKind::Connection));
                    }
                }
                Target::Param(param) => {
                    param.junction.disconnect(self, index);
                }
            }
        }
    }

    // ── Dormancy ────────────────────────────────────────────────────────────

    /// Disables outputs once at most one connection reference remains.
    ///
    /// A node with tail or latency is not disabled on the spot: the context
    /// is asked to disable it once `tail + latency` seconds have passed, so
    /// trailing audio is not cut off.
    pub(crate) fn disable_outputs_if_necessary(self: &Arc<Self>, context: Option<&RenderContext>) {
        let mut work = vec![Arc::clone(self)];
        while let Some(node) = work.pop() {
            if node.connection_ref_count() > 1 || node.is_disabled() {
                continue;
            }
            let hold = node.tail_time() + node.latency_time();
            match context {
                Some(context) if hold > 0.0 => {
                    if !node.pending_disable.swap(true, Ordering::AcqRel) {
                        let deadline = context.current_render_time() + hold;
                        #[cfg(feature = "tracing")]
                        tracing::trace!(
                            "disable_scheduled: {} {} at {deadline:.4}s",
                            node.kind,
                            node.id
                        );
                        context.schedule_disable(&node, deadline);
                    }
                }
                _ => node.disable_outputs(&mut work),
            }
        }
    }

    /// Fires a scheduled disable if it is still wanted.
    pub(crate) fn complete_pending_disable(self: &Arc<Self>, context: &RenderContext) {
        if !self.pending_disable.swap(false, Ordering::AcqRel) {
            return;
        }
        if self.connection_ref_count() > 1 || self.is_disabled() {
            return;
        }
        let mut work = Vec::new();
        self.disable_outputs(&mut work);
        for node in work {
            node.disable_outputs_if_necessary(Some(context));
        }
    }

    /// Flags every output dormant and parks its links on downstream inputs;
    /// downstream nodes are queued for their own check.
    fn disable_outputs(self: &Arc<Self>, work: &mut Vec<Arc<GraphNode>>) {
        if self.disabled.swap(true, Ordering::AcqRel) {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("outputs_disabled: {} {}", self.kind, self.id);

        for (index, output) in self.outputs.iter().enumerate() {
            output.set_enabled(false);
            for target in output.targets.lock().iter() {
                if let Target::Input { node, input } = target
                    && node.inputs[*input].junction.disable(self, index)
                {
                    work.push(Arc::clone(node));
                }
            }
        }
    }

    /// Re-enables a disabled node that has regained connections, and every
    /// downstream node that was dormant only because of it.
    fn enable_outputs_if_necessary(self: &Arc<Self>) {
        let context = self.context.upgrade();
        let _graph = context.as_ref().map(|context| context.lock_graph());

        let mut work = vec![Arc::clone(self)];
        while let Some(node) = work.pop() {
            if !node.is_disabled() || node.connection_ref_count() == 0 {
                continue;
            }
            node.disabled.store(false, Ordering::Release);

            #[cfg(feature = "tracing")]
            tracing::debug!("outputs_enabled: {} {}", node.kind, node.id);

            for (index, output) in node.outputs.iter().enumerate() {
                output.set_enabled(true);
                for target in output.targets.lock().iter() {
                    if let Target::Input { node: downstream, input } = target
                        && downstream.inputs[*input].junction.enable(&node, index)
                    {
                        work.push(Arc::clone(downstream));
                    }
                }
            }
        }
    }
}
