//! Control-plane topology mutation.
//!
//! Every operation validates its arguments before touching anything, under
//! the graph lock, so a rejected call leaves the graph exactly as it was.

use std::sync::{Arc, Weak};

use super::{GraphNode, RefKind};
use crate::context::RenderContext;
use crate::endpoint::Target;
use crate::error::GraphError;
use crate::param::AudioParam;

impl GraphNode {
    /// Connects output `output` of this node to input `input` of
    /// `destination`.
    ///
    /// Connecting an existing link again is a no-op. The destination gains a
    /// connection reference per new link.
    pub fn connect(
        self: &Arc<Self>,
        destination: &Arc<GraphNode>,
        output: usize,
        input: usize,
    ) -> Result<(), GraphError> {
        let context = self.live_context()?;
        debug_assert!(
            !context.is_render_thread(),
            "connect called from the render thread"
        );
        let _graph = context.lock_graph();

        if destination.is_marked_for_deletion() {
            return reject(GraphError::invalid("destination node has been released"));
        }
        if output >= self.outputs.len() {
            return reject(GraphError::output_out_of_range(output, self.outputs.len()));
        }
        if input >= destination.inputs.len() {
            return reject(GraphError::input_out_of_range(
                input,
                destination.inputs.len(),
            ));
        }
        if !Weak::ptr_eq(self.context_weak(), destination.context_weak()) {
            return reject(GraphError::CrossContextMismatch);
        }

        let enabled = self.outputs[output].is_enabled();
        if destination.inputs[input]
            .junction
            .connect(self, output, enabled)
        {
            self.outputs[output].targets.lock().push(Target::Input {
                node: Arc::clone(destination),
                input,
            });
            destination.add_reference(RefKind::Connection);

            #[cfg(feature = "tracing")]
            tracing::debug!(
                "graph_connect: {} {}:{output} → {} {}:{input}",
                self.kind,
                self.id,
                destination.kind,
                destination.id
            );
        }
        context.increment_connection_count();
        Ok(())
    }

    /// Connects output `output` of this node to `param`, whose value is then
    /// modulated by the output's audio.
    pub fn connect_param(
        self: &Arc<Self>,
        param: &Arc<AudioParam>,
        output: usize,
    ) -> Result<(), GraphError> {
        let context = self.live_context()?;
        debug_assert!(
            !context.is_render_thread(),
            "connect_param called from the render thread"
        );
        let _graph = context.lock_graph();

        if output >= self.outputs.len() {
            return reject(GraphError::output_out_of_range(output, self.outputs.len()));
        }
        if !param.belongs_to(self.context_weak()) {
            return reject(GraphError::CrossContextMismatch);
        }

        let enabled = self.outputs[output].is_enabled();
        if param.junction.connect(self, output, enabled) {
            self.outputs[output]
                .targets
                .lock()
                .push(Target::Param(Arc::clone(param)));

            #[cfg(feature = "tracing")]
            tracing::debug!(
                "graph_connect_param: {} {}:{output} → {}",
                self.kind,
                self.id,
                param.name()
            );
        }
        Ok(())
    }

    /// Disconnects everything fed by output `output`.
    pub fn disconnect(self: &Arc<Self>, output: usize) -> Result<(), GraphError> {
        let context = self.live_context()?;
        debug_assert!(
            !context.is_render_thread(),
            "disconnect called from the render thread"
        );
        let _graph = context.lock_graph();

        if output >= self.outputs.len() {
            return reject(GraphError::output_out_of_range(output, self.outputs.len()));
        }

        let mut releases = Vec::new();
        self.disconnect_output_links(output, &mut releases);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "graph_disconnect: {} {}:{output} ({} links)",
            self.kind,
            self.id,
            releases.len()
        );

        GraphNode::run_release_cascade(releases, Some(&context));
        Ok(())
    }

    /// Disconnects every output.
    pub fn disconnect_all(self: &Arc<Self>) -> Result<(), GraphError> {
        let context = self.live_context()?;
        let _graph = context.lock_graph();
        let mut releases = Vec::new();
        for index in 0..self.outputs.len() {
            self.disconnect_output_links(index, &mut releases);
        }
        GraphNode::run_release_cascade(releases, Some(&context));
        Ok(())
    }

    fn live_context(&self) -> Result<Arc<RenderContext>, GraphError> {
        self.context()
            .ok_or_else(|| GraphError::invalid("render context has shut down"))
    }
}

fn reject(err: GraphError) -> Result<(), GraphError> {
    #[cfg(feature = "tracing")]
    tracing::warn!("graph_mutation_rejected: {err}");
    Err(err)
}
