//! Graph nodes.
//!
//! A [`GraphNode`] is the unit of the render graph: a fixed set of input and
//! output endpoints, a type-specific [`AudioProcessor`], and the bookkeeping
//! that lets a control thread and the render thread share it safely.
//!
//! # Architecture
//!
//! - **Lifecycle** (`lifecycle.rs`): two atomic reference counts, *normal*
//!   (control-plane holders, starts at 1) and *connection* (incoming links,
//!   starts at 0). When both reach zero the node disconnects its outputs,
//!   which releases connection holds downstream, and is queued for
//!   reclamation. Releases from the render thread never block; they are
//!   deferred when the graph lock is busy.
//! - **Topology** (`connect.rs`): validated connect/disconnect under the
//!   graph lock.
//! - **Scheduling** (`schedule.rs`): [`GraphNode::render_if_due`] processes
//!   the node at most once per quantum and skips processing when silence
//!   can propagate.
//!
//! Memory follows the logical counts: an input link holds its upstream node,
//! an output target holds its downstream node, and the context's deletion
//! queue holds torn-down nodes until reclaimed. Teardown breaks those links,
//! so nothing survives reclamation except stale render snapshots, which are
//! released at the next refresh.

mod connect;
mod lifecycle;
mod schedule;

use core::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::atomic::AtomicF64;
use crate::context::RenderContext;
use crate::doppler::DopplerSlot;
use crate::endpoint::{AudioNodeInput, AudioNodeOutput};
use crate::handle::NodeHandle;
use crate::param::AudioParam;
use crate::processor::AudioProcessor;

/// Timestamp sentinel meaning "never processed".
pub(crate) const NEVER: f64 = -1.0;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node type tag, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// The context's sink.
    Destination,
    /// Buffer playback; can be Doppler shifted by a spatializer.
    SampleSource,
    /// 3D panner with distance, cone and Doppler effects.
    Spatializer,
    /// Gain stage.
    Gain,
    /// Clipper / soft saturator.
    Clip,
    /// Delay line.
    Delay,
    /// Any other processor.
    Custom(&'static str),
}

impl NodeKind {
    /// Whether nodes of this kind accept Doppler-shift registration.
    pub fn is_doppler_source(self) -> bool {
        matches!(self, NodeKind::SampleSource)
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Destination => "destination",
            NodeKind::SampleSource => "sample-source",
            NodeKind::Spatializer => "spatializer",
            NodeKind::Gain => "gain",
            NodeKind::Clip => "clip",
            NodeKind::Delay => "delay",
            NodeKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The two roles a reference can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// Held by a control-plane owner (a [`NodeHandle`]).
    Normal,
    /// Held by graph topology: an incoming link, or the context while a
    /// source is playing.
    Connection,
}

/// Construction parameters for a [`GraphNode`].
#[derive(Clone)]
pub struct NodeOptions {
    /// Type tag.
    pub kind: NodeKind,
    /// Maximum channel count of each input, in index order.
    pub inputs: Vec<usize>,
    /// Channel count of each output, in index order.
    pub outputs: Vec<usize>,
    /// Seconds the node may keep sounding after its input goes silent.
    pub tail_time: f64,
    /// Seconds of processing latency.
    pub latency_time: f64,
    /// Params pulled alongside the inputs each quantum.
    pub params: Vec<Arc<AudioParam>>,
    /// Present on nodes that accept Doppler registration.
    pub doppler_slot: Option<Arc<DopplerSlot>>,
}

impl NodeOptions {
    /// Options for a node with no ports.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            tail_time: 0.0,
            latency_time: 0.0,
            params: Vec::new(),
            doppler_slot: None,
        }
    }

    /// Appends an input accepting up to `max_channels`.
    pub fn with_input(mut self, max_channels: usize) -> Self {
        self.inputs.push(max_channels);
        self
    }

    /// Appends an output with `channels` channels.
    pub fn with_output(mut self, channels: usize) -> Self {
        self.outputs.push(channels);
        self
    }

    /// Sets the tail time in seconds.
    pub fn with_tail_time(mut self, seconds: f64) -> Self {
        self.tail_time = seconds;
        self
    }

    /// Sets the latency in seconds.
    pub fn with_latency_time(mut self, seconds: f64) -> Self {
        self.latency_time = seconds;
        self
    }

    /// Registers a param to be pulled with the node.
    pub fn with_param(mut self, param: Arc<AudioParam>) -> Self {
        self.params.push(param);
        self
    }

    /// Makes the node a Doppler registration target.
    pub fn with_doppler_slot(mut self, slot: Arc<DopplerSlot>) -> Self {
        self.doppler_slot = Some(slot);
        self
    }
}

/// A node in the render graph.
pub struct GraphNode {
    id: NodeId,
    kind: NodeKind,
    context: Weak<RenderContext>,
    sample_rate: f32,

    normal_refs: AtomicU32,
    connection_refs: AtomicU32,

    initialized: AtomicBool,
    disabled: AtomicBool,
    marked_for_deletion: AtomicBool,
    pending_disable: AtomicBool,
    disable_generation: AtomicU64,
    reset_requested: AtomicBool,

    last_processing_time: AtomicF64,
    last_non_silent_time: AtomicF64,
    tail_time: AtomicF64,
    latency_time: AtomicF64,

    pub(crate) inputs: Vec<AudioNodeInput>,
    pub(crate) outputs: Vec<AudioNodeOutput>,
    params: Vec<Arc<AudioParam>>,
    doppler: Option<Arc<DopplerSlot>>,
    processor: Mutex<Box<dyn AudioProcessor>>,
}

impl GraphNode {
    /// Creates an initialized node in `context` and returns the creator's
    /// handle, which carries the initial normal reference.
    pub fn create(
        context: &Arc<RenderContext>,
        options: NodeOptions,
        processor: impl AudioProcessor + 'static,
    ) -> NodeHandle {
        let node = Self::build(
            Arc::downgrade(context),
            context.sample_rate(),
            context.quantum_frames(),
            options,
            Box::new(processor),
        );
        NodeHandle::adopt(node)
    }

    /// Builds a node against a possibly not-yet-constructed context.
    pub(crate) fn build(
        context: Weak<RenderContext>,
        sample_rate: f32,
        quantum_frames: usize,
        options: NodeOptions,
        mut processor: Box<dyn AudioProcessor>,
    ) -> Arc<Self> {
        processor.initialize(sample_rate);
        let node = Arc::new(Self {
            id: NodeId::next(),
            kind: options.kind,
            context,
            sample_rate,
            normal_refs: AtomicU32::new(1),
            connection_refs: AtomicU32::new(0),
            initialized: AtomicBool::new(true),
            disabled: AtomicBool::new(false),
            marked_for_deletion: AtomicBool::new(false),
            pending_disable: AtomicBool::new(false),
            disable_generation: AtomicU64::new(0),
            reset_requested: AtomicBool::new(false),
            last_processing_time: AtomicF64::new(NEVER),
            last_non_silent_time: AtomicF64::new(NEVER),
            tail_time: AtomicF64::new(options.tail_time.max(0.0)),
            latency_time: AtomicF64::new(options.latency_time.max(0.0)),
            inputs: options
                .inputs
                .iter()
                .map(|&channels| AudioNodeInput::new(channels, quantum_frames))
                .collect(),
            outputs: options
                .outputs
                .iter()
                .map(|&channels| AudioNodeOutput::new(channels, quantum_frames))
                .collect(),
            params: options.params,
            doppler: options.doppler_slot,
            processor: Mutex::new(processor),
        });

        #[cfg(feature = "tracing")]
        tracing::trace!(
            "node_created: {} {} ({} in, {} out)",
            node.kind,
            node.id,
            node.inputs.len(),
            node.outputs.len()
        );

        node
    }

    // ── Identity ────────────────────────────────────────────────────────────

    /// Process-unique identifier.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Type tag.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Sample rate fixed at construction.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// The owning context, if it is still alive.
    pub fn context(&self) -> Option<Arc<RenderContext>> {
        self.context.upgrade()
    }

    pub(crate) fn context_weak(&self) -> &Weak<RenderContext> {
        &self.context
    }

    // ── State ───────────────────────────────────────────────────────────────

    /// Current normal reference count.
    pub fn normal_ref_count(&self) -> u32 {
        self.normal_refs.load(Ordering::Acquire)
    }

    /// Current connection reference count.
    pub fn connection_ref_count(&self) -> u32 {
        self.connection_refs.load(Ordering::Acquire)
    }

    /// Whether the node processes when pulled.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Whether the outputs are dormant.
    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    /// Whether the node has been torn down and queued for reclamation.
    pub fn is_marked_for_deletion(&self) -> bool {
        self.marked_for_deletion.load(Ordering::Acquire)
    }

    /// Whether a tail-time disable is scheduled.
    pub fn has_pending_disable(&self) -> bool {
        self.pending_disable.load(Ordering::Acquire)
    }

    /// Bumped by every new connection reference; a scheduled disable only
    /// fires if the generation it was scheduled under is still current.
    pub(crate) fn disable_generation(&self) -> u64 {
        self.disable_generation.load(Ordering::Acquire)
    }

    /// Render time of the most recent processed quantum, or −1 if never.
    pub fn last_processing_time(&self) -> f64 {
        self.last_processing_time.load()
    }

    /// End time of the most recent quantum with non-silent input, or −1.
    pub fn last_non_silent_time(&self) -> f64 {
        self.last_non_silent_time.load()
    }

    /// Seconds the node may sound after its input goes silent.
    pub fn tail_time(&self) -> f64 {
        self.tail_time.load()
    }

    /// Seconds of processing latency.
    pub fn latency_time(&self) -> f64 {
        self.latency_time.load()
    }

    /// Updates the tail time.
    pub fn set_tail_time(&self, seconds: f64) {
        self.tail_time.store(seconds.max(0.0));
    }

    /// Updates the latency.
    pub fn set_latency_time(&self, seconds: f64) {
        self.latency_time.store(seconds.max(0.0));
    }

    // ── Ports ───────────────────────────────────────────────────────────────

    /// Number of input endpoints.
    pub fn number_of_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Number of output endpoints.
    pub fn number_of_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Input endpoint by index.
    pub fn input(&self, index: usize) -> Option<&AudioNodeInput> {
        self.inputs.get(index)
    }

    /// Output endpoint by index.
    pub fn output(&self, index: usize) -> Option<&AudioNodeOutput> {
        self.outputs.get(index)
    }

    /// Params pulled with this node.
    pub fn params(&self) -> &[Arc<AudioParam>] {
        &self.params
    }

    /// Doppler registration slot, present on Doppler-capable sources.
    pub fn doppler_slot(&self) -> Option<&Arc<DopplerSlot>> {
        self.doppler.as_ref()
    }

    // ── Processor control ───────────────────────────────────────────────────

    /// Asks the render thread to reset the processor before its next block.
    pub fn request_reset(&self) {
        self.reset_requested.store(true, Ordering::Release);
    }

    /// Re-initializes the processor and resumes processing.
    pub fn initialize(&self) {
        if self.initialized.load(Ordering::Acquire) {
            return;
        }
        self.processor.lock().initialize(self.sample_rate);
        self.initialized.store(true, Ordering::Release);
    }

    /// Stops processing; the node renders nothing until re-initialized.
    pub fn uninitialize(&self) {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return;
        }
        self.processor.lock().uninitialize();
    }
}

impl fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("normal_refs", &self.normal_ref_count())
            .field("connection_refs", &self.connection_ref_count())
            .field("disabled", &self.is_disabled())
            .field("marked_for_deletion", &self.is_marked_for_deletion())
            .finish()
    }
}
