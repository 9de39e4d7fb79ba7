//! Control-plane node handles.

use core::fmt;
use core::ops::Deref;
use std::sync::Arc;

use crate::error::GraphError;
use crate::node::{GraphNode, RefKind};
use crate::param::AudioParam;

/// A control-plane hold on a [`GraphNode`].
///
/// Each handle owns one normal reference: cloning adds one, dropping
/// releases one. When the last handle is gone and no connection references
/// remain, the node tears itself down.
pub struct NodeHandle {
    node: Arc<GraphNode>,
}

impl NodeHandle {
    /// Wraps a freshly built node, taking over its initial normal reference.
    pub(crate) fn adopt(node: Arc<GraphNode>) -> Self {
        Self { node }
    }

    /// The underlying node.
    pub fn node(&self) -> &Arc<GraphNode> {
        &self.node
    }

    /// Connects output `output` to input `input` of `destination`.
    pub fn connect(
        &self,
        destination: &NodeHandle,
        output: usize,
        input: usize,
    ) -> Result<(), GraphError> {
        self.node.connect(&destination.node, output, input)
    }

    /// Connects output `output` to `param`.
    pub fn connect_param(&self, param: &Arc<AudioParam>, output: usize) -> Result<(), GraphError> {
        self.node.connect_param(param, output)
    }

    /// Disconnects everything fed by output `output`.
    pub fn disconnect(&self, output: usize) -> Result<(), GraphError> {
        self.node.disconnect(output)
    }
}

impl Clone for NodeHandle {
    fn clone(&self) -> Self {
        self.node.add_reference(RefKind::Normal);
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.node.release_reference(RefKind::Normal);
    }
}

impl Deref for NodeHandle {
    type Target = GraphNode;

    fn deref(&self) -> &GraphNode {
        &self.node
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeHandle").field(&self.node).finish()
    }
}
