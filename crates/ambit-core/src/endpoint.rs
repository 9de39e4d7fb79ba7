//! Connection endpoints.
//!
//! An [`AudioNodeInput`] aggregates links from upstream outputs and mixes
//! them into its summing bus when pulled. An [`AudioNodeOutput`] owns the
//! bus its node renders into and fans out to downstream inputs and params.
//!
//! # Architecture
//!
//! Links into an input (or param) live in a [`Junction`] with two views:
//!
//! - the **control view** (`active` + `disabled` sets), mutated only by the
//!   graph owner;
//! - the **render snapshot**, the list of active links the render thread
//!   actually pulls. The snapshot is refreshed from the control view only
//!   while the render thread owns the graph lock, so a control thread
//!   mutating topology mid-quantum never races the pull.
//!
//! Disabling a link moves it to the disabled set: it is no longer pulled,
//! but the logical connection (and the connection reference it carries)
//! survives until it is disconnected.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::bus::AudioBus;
use crate::context::RenderContext;
use crate::node::GraphNode;
use crate::param::AudioParam;

/// One upstream output feeding a junction.
#[derive(Clone)]
pub(crate) struct OutputLink {
    pub(crate) node: Arc<GraphNode>,
    pub(crate) output: usize,
}

impl OutputLink {
    fn is(&self, node: &Arc<GraphNode>, output: usize) -> bool {
        self.output == output && Arc::ptr_eq(&self.node, node)
    }
}

#[derive(Default)]
struct LinkSet {
    active: Vec<OutputLink>,
    disabled: Vec<OutputLink>,
}

impl LinkSet {
    fn contains(&self, node: &Arc<GraphNode>, output: usize) -> bool {
        self.active
            .iter()
            .chain(self.disabled.iter())
            .any(|link| link.is(node, output))
    }
}

/// Summing point shared by inputs and params.
pub(crate) struct Junction {
    links: Mutex<LinkSet>,
    rendering: Mutex<Vec<OutputLink>>,
    dirty: AtomicBool,
}

impl Junction {
    pub(crate) fn new() -> Self {
        Self {
            links: Mutex::new(LinkSet::default()),
            rendering: Mutex::new(Vec::new()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Adds a link; returns false if it already exists (active or disabled).
    pub(crate) fn connect(&self, node: &Arc<GraphNode>, output: usize, enabled: bool) -> bool {
        let mut links = self.links.lock();
        if links.contains(node, output) {
            return false;
        }
        let link = OutputLink {
            node: Arc::clone(node),
            output,
        };
        if enabled {
            links.active.push(link);
            self.dirty.store(true, Ordering::Release);
        } else {
            links.disabled.push(link);
        }
        true
    }

    /// Removes a link from either set; returns false if it was not present.
    pub(crate) fn disconnect(&self, node: &Arc<GraphNode>, output: usize) -> bool {
        let mut links = self.links.lock();
        if let Some(pos) = links.active.iter().position(|l| l.is(node, output)) {
            links.active.remove(pos);
            self.dirty.store(true, Ordering::Release);
            return true;
        }
        if let Some(pos) = links.disabled.iter().position(|l| l.is(node, output)) {
            links.disabled.remove(pos);
            return true;
        }
        false
    }

    /// Moves an active link to the disabled set.
    pub(crate) fn disable(&self, node: &Arc<GraphNode>, output: usize) -> bool {
        let mut links = self.links.lock();
        let Some(pos) = links.active.iter().position(|l| l.is(node, output)) else {
            return false;
        };
        let link = links.active.remove(pos);
        links.disabled.push(link);
        self.dirty.store(true, Ordering::Release);
        true
    }

    /// Moves a disabled link back to the active set.
    pub(crate) fn enable(&self, node: &Arc<GraphNode>, output: usize) -> bool {
        let mut links = self.links.lock();
        let Some(pos) = links.disabled.iter().position(|l| l.is(node, output)) else {
            return false;
        };
        let link = links.disabled.remove(pos);
        links.active.push(link);
        self.dirty.store(true, Ordering::Release);
        true
    }

    pub(crate) fn active_count(&self) -> usize {
        self.links.lock().active.len()
    }

    pub(crate) fn disabled_count(&self) -> usize {
        self.links.lock().disabled.len()
    }

    /// Copies the active set into the render snapshot if it changed and the
    /// calling thread owns the graph. Returns whether a refresh happened.
    pub(crate) fn refresh_if_owner(&self, context: &RenderContext) -> bool {
        if !self.dirty.load(Ordering::Acquire) || !context.is_graph_owner() {
            return false;
        }
        let links = self.links.lock();
        self.rendering.lock().clone_from(&links.active);
        self.dirty.store(false, Ordering::Release);
        true
    }

    pub(crate) fn rendering_count(&self) -> usize {
        self.rendering.lock().len()
    }

    pub(crate) fn rendering_at(&self, index: usize) -> Option<OutputLink> {
        self.rendering.lock().get(index).cloned()
    }

    /// Pulls every link in the render snapshot and sums it into `bus`.
    ///
    /// No lock is held across an upstream pull, so feedback cycles and
    /// traversals that re-enter this node cannot deadlock.
    pub(crate) fn pull_into(&self, bus: &Mutex<AudioBus>, frames: usize) {
        {
            let mut bus = bus.lock();
            bus.set_len(frames);
            bus.zero();
        }
        let count = self.rendering_count();
        for index in 0..count {
            let Some(link) = self.rendering_at(index) else {
                break;
            };
            link.node.render_if_due(frames);
            let upstream = link.node.outputs[link.output].bus.lock();
            bus.lock().sum_from(&upstream);
        }
    }
}

/// An input port of a [`GraphNode`].
pub struct AudioNodeInput {
    pub(crate) junction: Junction,
    pub(crate) bus: Mutex<AudioBus>,
    max_channels: usize,
    capacity: usize,
}

impl AudioNodeInput {
    pub(crate) fn new(max_channels: usize, capacity: usize) -> Self {
        let max_channels = max_channels.max(1);
        Self {
            junction: Junction::new(),
            bus: Mutex::new(AudioBus::new(1, capacity)),
            max_channels,
            capacity,
        }
    }

    /// Maximum channel count the summing bus will adopt.
    pub fn max_channels(&self) -> usize {
        self.max_channels
    }

    /// Whether any upstream output is actively connected.
    pub fn is_connected(&self) -> bool {
        self.junction.active_count() > 0
    }

    /// Number of actively connected upstream outputs.
    pub fn connection_count(&self) -> usize {
        self.junction.active_count()
    }

    /// Number of links parked in the disabled set.
    pub fn disabled_connection_count(&self) -> usize {
        self.junction.disabled_count()
    }

    /// Whether the summing bus held only silence after the last pull.
    pub fn bus_is_silent(&self) -> bool {
        self.bus.lock().is_silent()
    }

    /// Channel count of the summing bus.
    pub fn channel_count(&self) -> usize {
        self.bus.lock().num_channels()
    }

    /// Number of links the render thread pulls.
    pub fn rendering_connection_count(&self) -> usize {
        self.junction.rendering_count()
    }

    /// The `index`-th link the render thread pulls, as `(node, output index)`.
    pub fn rendering_output_at(&self, index: usize) -> Option<(Arc<GraphNode>, usize)> {
        self.junction
            .rendering_at(index)
            .map(|link| (link.node, link.output))
    }

    /// Copies pending topology changes into the render snapshot.
    ///
    /// Only takes effect while the calling thread owns the graph lock;
    /// returns whether the snapshot changed. Pulling does this implicitly;
    /// graph traversals that run before the pull call it themselves.
    pub fn refresh_rendering_state(&self, context: &RenderContext) -> bool {
        if !self.junction.refresh_if_owner(context) {
            return false;
        }
        self.update_channel_count();
        true
    }

    /// Refreshes the render snapshot when allowed, then pulls and mixes.
    pub(crate) fn pull(&self, context: &RenderContext, frames: usize) {
        self.refresh_rendering_state(context);
        self.junction.pull_into(&self.bus, frames);
    }

    /// Sizes the summing bus to the widest connected output, capped at
    /// `max_channels`.
    fn update_channel_count(&self) {
        let widest = (0..self.junction.rendering_count())
            .filter_map(|i| self.junction.rendering_at(i))
            .map(|link| link.node.outputs[link.output].channels())
            .max()
            .unwrap_or(1);
        let channels = widest.clamp(1, self.max_channels);
        let mut bus = self.bus.lock();
        if bus.num_channels() != channels {
            *bus = AudioBus::new(channels, self.capacity);
        }
    }
}

/// Where an output delivers its audio.
#[derive(Clone)]
pub(crate) enum Target {
    Input { node: Arc<GraphNode>, input: usize },
    Param(Arc<AudioParam>),
}

/// An output port of a [`GraphNode`].
pub struct AudioNodeOutput {
    channels: usize,
    pub(crate) bus: Mutex<AudioBus>,
    pub(crate) targets: Mutex<Vec<Target>>,
    enabled: AtomicBool,
}

impl AudioNodeOutput {
    pub(crate) fn new(channels: usize, capacity: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            bus: Mutex::new(AudioBus::new(channels, capacity)),
            targets: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Channel count of the rendered bus.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Whether the output is feeding its downstream inputs.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Whether anything downstream is connected (enabled or not).
    pub fn is_connected(&self) -> bool {
        !self.targets.lock().is_empty()
    }

    /// Number of downstream inputs and params.
    pub fn fan_out(&self) -> usize {
        self.targets.lock().len()
    }

    /// Whether the last rendered block was silent.
    pub fn bus_is_silent(&self) -> bool {
        self.bus.lock().is_silent()
    }

    /// Copy of the last rendered block.
    pub fn rendered(&self) -> AudioBus {
        self.bus.lock().clone()
    }
}
