//! The render context.
//!
//! [`RenderContext`] owns everything graph-wide: the render clock, the graph
//! lock, the queues the node lifecycle relies on, the listener, and the
//! destination node the render driver pulls from.
//!
//! # Architecture
//!
//! ```text
//!   control thread                     render thread
//!   ──────────────                     ─────────────
//!   connect / disconnect               render_quantum()
//!     └─ lock_graph() (blocks)           ├─ try_acquire graph lock
//!   drop(NodeHandle)                     ├─ pre-render: drain deferred releases
//!     └─ release_reference(Normal)       ├─ destination.render_if_due()
//!   drain_deferred_releases()            │    └─ pull … render_if_due … (recursive)
//!     └─ lock_graph() (blocks)           ├─ post-render: finished sources,
//!                                        │   tail-time disables, reclaim
//!                                        └─ release lock, advance clock
//! ```
//!
//! The render thread never blocks. If the control thread holds the graph
//! lock when a quantum starts, the quantum renders from the existing render
//! snapshots and any reference releases it needs are sent over the
//! deferred-release channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use crate::bus::AudioBus;
use crate::handle::NodeHandle;
use crate::listener::Listener;
use crate::lock::{GraphGuard, GraphLock, thread_token};
use crate::node::{GraphNode, NodeKind, NodeOptions, RefKind};
use crate::processor::{AudioProcessor, ProcessContext};

const NO_THREAD: u64 = 0;

/// Construction settings for a [`RenderContext`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextOptions {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Frames per render quantum.
    pub quantum_frames: usize,
    /// Channel count of the destination input.
    pub destination_channels: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            quantum_frames: 128,
            destination_channels: 2,
        }
    }
}

/// A tail-time disable waiting for its deadline. Superseded once the node
/// gains a connection after it was scheduled.
struct ScheduledDisable {
    node: Arc<GraphNode>,
    deadline: f64,
    generation: u64,
}

/// The sink processor: its input is read directly by the render driver.
struct DestinationProcessor;

impl AudioProcessor for DestinationProcessor {
    fn process(&mut self, _ctx: &mut ProcessContext<'_>) {}

    fn reset(&mut self) {}
}

/// Graph-wide render state shared by all nodes of one graph.
pub struct RenderContext {
    options: ContextOptions,
    frame: AtomicU64,

    graph_lock: GraphLock,
    render_thread: AtomicU64,
    render_finished: AtomicBool,
    connection_count: AtomicU64,

    deferred_tx: Sender<Arc<GraphNode>>,
    deferred_rx: Receiver<Arc<GraphNode>>,
    finished_tx: Sender<Arc<GraphNode>>,
    finished_rx: Receiver<Arc<GraphNode>>,
    marked: Mutex<Vec<Arc<GraphNode>>>,
    pending_disables: Mutex<Vec<ScheduledDisable>>,

    listener: Listener,
    destination: NodeHandle,
}

impl RenderContext {
    /// Creates a context with its destination node.
    pub fn new(options: ContextOptions) -> Arc<Self> {
        let options = ContextOptions {
            quantum_frames: options.quantum_frames.max(1),
            destination_channels: options.destination_channels.max(1),
            ..options
        };
        let (deferred_tx, deferred_rx) = unbounded();
        let (finished_tx, finished_rx) = unbounded();

        Arc::new_cyclic(|weak: &Weak<RenderContext>| {
            let destination = GraphNode::build(
                weak.clone(),
                options.sample_rate,
                options.quantum_frames,
                NodeOptions::new(NodeKind::Destination).with_input(options.destination_channels),
                Box::new(DestinationProcessor),
            );
            Self {
                options,
                frame: AtomicU64::new(0),
                graph_lock: GraphLock::new(),
                render_thread: AtomicU64::new(NO_THREAD),
                render_finished: AtomicBool::new(false),
                connection_count: AtomicU64::new(0),
                deferred_tx,
                deferred_rx,
                finished_tx,
                finished_rx,
                marked: Mutex::new(Vec::new()),
                pending_disables: Mutex::new(Vec::new()),
                listener: Listener::new(),
                destination: NodeHandle::adopt(destination),
            }
        })
    }

    // ── Configuration ───────────────────────────────────────────────────────

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.options.sample_rate
    }

    /// Frames per quantum.
    pub fn quantum_frames(&self) -> usize {
        self.options.quantum_frames
    }

    /// Construction settings.
    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// The listener used by spatializers.
    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// The sink node; connect into its input 0.
    pub fn destination(&self) -> &NodeHandle {
        &self.destination
    }

    // ── Clock ───────────────────────────────────────────────────────────────

    /// Render time at the start of the current quantum, in seconds.
    pub fn current_render_time(&self) -> f64 {
        self.current_frame_index() as f64 / f64::from(self.options.sample_rate)
    }

    /// Frame index at the start of the current quantum.
    pub fn current_frame_index(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    /// Number of node-to-node connections ever made. Spatializers compare it
    /// against a cached value to notice topology changes cheaply.
    pub fn global_connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Acquire)
    }

    pub(crate) fn increment_connection_count(&self) {
        self.connection_count.fetch_add(1, Ordering::AcqRel);
    }

    // ── Graph lock ──────────────────────────────────────────────────────────

    /// Tries to take the graph lock; `Some(true)` if the caller must release.
    pub fn try_acquire_graph_lock(&self) -> Option<bool> {
        self.graph_lock.try_acquire()
    }

    /// Blocks for the graph lock; `true` if the caller must release.
    pub fn acquire_graph_lock(&self) -> bool {
        self.graph_lock.acquire()
    }

    /// Releases the graph lock.
    pub fn release_graph_lock(&self) {
        self.graph_lock.release();
    }

    /// Blocks for the graph lock and returns a guard.
    pub fn lock_graph(&self) -> GraphGuard<'_> {
        GraphGuard::acquire(&self.graph_lock)
    }

    /// Takes the graph lock if available.
    pub fn try_lock_graph(&self) -> Option<GraphGuard<'_>> {
        GraphGuard::try_acquire(&self.graph_lock)
    }

    /// Whether the calling thread owns the graph lock.
    pub fn is_graph_owner(&self) -> bool {
        self.graph_lock.is_owner()
    }

    /// Whether the calling thread is currently rendering a quantum.
    pub fn is_render_thread(&self) -> bool {
        self.render_thread.load(Ordering::Acquire) == thread_token()
    }

    /// Whether rendering has permanently stopped.
    pub fn render_thread_has_finished(&self) -> bool {
        self.render_finished.load(Ordering::Acquire)
    }

    // ── Lifecycle queues ────────────────────────────────────────────────────

    /// Queues a release the render thread could not complete.
    pub fn enqueue_deferred_release(&self, node: Arc<GraphNode>) {
        // The receiver lives as long as `self`, so the send cannot fail.
        let _ = self.deferred_tx.send(node);
    }

    /// Number of releases waiting to be drained.
    pub fn deferred_release_count(&self) -> usize {
        self.deferred_rx.len()
    }

    /// Queues a torn-down node for reclamation. Caller owns the graph lock.
    pub fn mark_for_deletion(&self, node: Arc<GraphNode>) {
        debug_assert!(
            self.is_graph_owner() || self.render_thread_has_finished(),
            "mark_for_deletion requires graph ownership"
        );
        self.marked.lock().push(node);
    }

    /// Number of nodes waiting to be reclaimed.
    pub fn marked_node_count(&self) -> usize {
        self.marked.lock().len()
    }

    /// Drops the context's hold on every marked node.
    ///
    /// Only the graph owner may call this while rendering is live.
    pub fn reclaim_marked_nodes(&self) {
        debug_assert!(
            self.is_graph_owner() || self.render_thread_has_finished(),
            "reclaim_marked_nodes requires graph ownership"
        );
        let reclaimed = std::mem::take(&mut *self.marked.lock());
        if reclaimed.is_empty() {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("nodes_reclaimed: {}", reclaimed.len());
        drop(reclaimed);
    }

    pub(crate) fn schedule_disable(&self, node: &Arc<GraphNode>, deadline: f64) {
        self.pending_disables.lock().push(ScheduledDisable {
            node: Arc::clone(node),
            deadline,
            generation: node.disable_generation(),
        });
    }

    pub(crate) fn notify_source_finished(&self, node: Arc<GraphNode>) {
        let _ = self.finished_tx.send(node);
    }

    /// Completes every deferred release. Blocks for the graph lock.
    ///
    /// Call periodically from a control thread; the render driver also drains
    /// whenever it owns the lock.
    pub fn drain_deferred_releases(&self) {
        let _graph = self.lock_graph();
        self.handle_deferred_releases();
        self.reclaim_marked_nodes();
    }

    fn handle_deferred_releases(&self) {
        let deferred: Vec<_> = self
            .deferred_rx
            .try_iter()
            .map(|node| (node, RefKind::Connection))
            .collect();
        if deferred.is_empty() {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("deferred_releases_drained: {}", deferred.len());
        GraphNode::run_release_cascade(deferred, Some(self));
    }

    fn fire_expired_disables(&self) {
        let now = self.current_render_time();
        let due: Vec<Arc<GraphNode>> = {
            let mut pending = self.pending_disables.lock();
            let mut due = Vec::new();
            pending.retain(|entry| {
                if !entry.node.has_pending_disable()
                    || entry.node.disable_generation() != entry.generation
                {
                    return false;
                }
                if entry.deadline <= now {
                    due.push(Arc::clone(&entry.node));
                    return false;
                }
                true
            });
            due
        };
        for node in due {
            node.complete_pending_disable(self);
        }
    }

    // ── Render driver ───────────────────────────────────────────────────────

    /// Renders one quantum into `destination`.
    ///
    /// The calling thread is the render thread for the duration of the call.
    /// Renders `destination.len()` frames, which must not exceed
    /// [`quantum_frames`](Self::quantum_frames).
    pub fn render_quantum(&self, destination: &mut AudioBus) {
        let frames = destination.len().min(self.options.quantum_frames);
        let _render = RenderThreadScope::enter(&self.render_thread);
        let ownership = self.try_acquire_graph_lock();
        let owns_graph = ownership.is_some();

        if owns_graph {
            self.handle_deferred_releases();
        }

        let sink = self.destination.node();
        sink.render_if_due(frames);
        destination.copy_from(&sink.inputs[0].bus.lock());

        self.handle_post_render_tasks(owns_graph);

        if ownership == Some(true) {
            self.release_graph_lock();
        }
        self.frame.fetch_add(frames as u64, Ordering::AcqRel);
    }

    fn handle_post_render_tasks(&self, owns_graph: bool) {
        for node in self.finished_rx.try_iter() {
            node.release_reference(RefKind::Connection);
        }
        if owns_graph {
            self.fire_expired_disables();
            self.handle_deferred_releases();
            self.reclaim_marked_nodes();
        }
    }

    /// Marks rendering as permanently finished and reclaims marked nodes.
    ///
    /// Later releases tear down and reclaim immediately.
    pub fn uninitialize(&self) {
        self.render_finished.store(true, Ordering::Release);
        let _graph = self.lock_graph();
        self.handle_deferred_releases();
        self.reclaim_marked_nodes();
    }
}

/// Marks the calling thread as the render thread until dropped.
struct RenderThreadScope<'a> {
    slot: &'a AtomicU64,
}

impl<'a> RenderThreadScope<'a> {
    fn enter(slot: &'a AtomicU64) -> Self {
        slot.store(thread_token(), Ordering::Release);
        Self { slot }
    }
}

impl Drop for RenderThreadScope<'_> {
    fn drop(&mut self) {
        self.slot.store(NO_THREAD, Ordering::Release);
    }
}
