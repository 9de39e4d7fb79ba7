//! Doppler-source discovery.
//!
//! A spatializer needs every playback source feeding it, directly or through
//! intermediate nodes, to ask it for a Doppler ratio. Discovery walks the
//! render snapshots upstream from the spatializer and registers it on each
//! Doppler-capable source it reaches. Sources stop the walk; any other node
//! is expanded into its own inputs.
//!
//! The walk uses an explicit stack and a visited set keyed by [`NodeId`], so
//! diamonds are expanded once and feedback cycles terminate. Both live in a
//! caller-owned [`DiscoveryScratch`] that keeps its capacity between passes.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use ambit_core::{DopplerRateProvider, GraphNode, NodeId, RenderContext};

/// Reusable work-list and visited set for [`notify_doppler_sources`].
#[derive(Default)]
pub struct DiscoveryScratch {
    visited: HashSet<NodeId>,
    stack: Vec<Arc<GraphNode>>,
}

impl DiscoveryScratch {
    /// Scratch sized for walks of up to `nodes` nodes without growing.
    pub fn with_capacity(nodes: usize) -> Self {
        Self {
            visited: HashSet::with_capacity(nodes),
            stack: Vec::with_capacity(nodes),
        }
    }

    /// Nodes reached by the most recent walk, including its start.
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Visited-set capacity currently reserved.
    pub fn capacity(&self) -> usize {
        self.visited.capacity()
    }
}

/// Registers `provider` on every Doppler-capable source upstream of `start`.
///
/// Input snapshots along the way are refreshed first when the caller owns
/// the graph lock. Returns the number of sources registered.
pub fn notify_doppler_sources(
    start: &Arc<GraphNode>,
    context: &RenderContext,
    provider: &Weak<dyn DopplerRateProvider>,
    scratch: &mut DiscoveryScratch,
) -> usize {
    let DiscoveryScratch { visited, stack } = scratch;
    visited.clear();
    stack.clear();
    visited.insert(start.id());
    stack.push(Arc::clone(start));
    let mut registered = 0;

    while let Some(node) = stack.pop() {
        for index in 0..node.number_of_inputs() {
            let Some(input) = node.input(index) else {
                continue;
            };
            input.refresh_rendering_state(context);
            for link in 0..input.rendering_connection_count() {
                let Some((upstream, _)) = input.rendering_output_at(link) else {
                    break;
                };
                if !visited.insert(upstream.id()) {
                    continue;
                }
                match upstream.doppler_slot() {
                    Some(slot) if upstream.kind().is_doppler_source() => {
                        slot.register(provider.clone());
                        registered += 1;
                    }
                    _ => stack.push(upstream),
                }
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
        "doppler_discovery: {} registered {registered} source(s), visited {}",
        start.id(),
        visited.len()
    );

    registered
}
