//! Audio parameters.
//!
//! An [`AudioParam`] has an intrinsic value set from the control plane and
//! may additionally be the destination of node outputs
//! (`connect_param`), in which case the connected audio is summed on top of
//! the intrinsic value sample by sample. Params are also used as read-only
//! observation points: a node can publish a computed value (for example a
//! distance gain) for the control plane to read.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::atomic::AtomicF32;
use crate::bus::AudioBus;
use crate::context::RenderContext;
use crate::endpoint::Junction;

/// Static description of a parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamDescriptor {
    /// Short identifier, e.g. `"distanceGain"`.
    pub name: &'static str,
    /// Value at construction.
    pub default: f32,
    /// Smallest accepted value.
    pub min: f32,
    /// Largest accepted value.
    pub max: f32,
}

impl ParamDescriptor {
    /// Describes a parameter.
    pub const fn new(name: &'static str, default: f32, min: f32, max: f32) -> Self {
        Self {
            name,
            default,
            min,
            max,
        }
    }

    /// Clamps `value` into `[min, max]`.
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }
}

/// A parameter owned by a node, optionally modulated by connected outputs.
pub struct AudioParam {
    descriptor: ParamDescriptor,
    value: AtomicF32,
    context: Weak<RenderContext>,
    pub(crate) junction: Junction,
    bus: Mutex<AudioBus>,
}

impl AudioParam {
    /// Creates a parameter bound to `context`, starting at its default.
    pub fn new(context: &Arc<RenderContext>, descriptor: ParamDescriptor) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            value: AtomicF32::new(descriptor.default),
            context: Arc::downgrade(context),
            junction: Junction::new(),
            bus: Mutex::new(AudioBus::new(1, context.quantum_frames())),
        })
    }

    /// The parameter's descriptor.
    pub fn descriptor(&self) -> &ParamDescriptor {
        &self.descriptor
    }

    /// Short identifier.
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Current intrinsic value.
    pub fn value(&self) -> f32 {
        self.value.load()
    }

    /// Sets the intrinsic value, clamped to the descriptor range.
    pub fn set_value(&self, value: f32) {
        self.value.store(self.descriptor.clamp(value));
    }

    /// Whether any output is connected to this param.
    pub fn has_connections(&self) -> bool {
        self.junction.active_count() > 0
    }

    /// Whether this param belongs to `context`.
    pub(crate) fn belongs_to(&self, context: &Weak<RenderContext>) -> bool {
        Weak::ptr_eq(&self.context, context)
    }

    /// Pulls connected outputs into the modulation bus.
    pub(crate) fn pull(&self, context: &RenderContext, frames: usize) {
        self.junction.refresh_if_owner(context);
        self.junction.pull_into(&self.bus, frames);
    }

    /// Fills `out` with the per-sample value: intrinsic value plus any
    /// connected audio, clamped to range.
    ///
    /// Call from a processor, after the owning node has pulled its inputs.
    pub fn sample_values(&self, out: &mut [f32]) {
        let base = self.value();
        out.fill(base);
        let bus = self.bus.lock();
        if bus.is_silent() || bus.num_channels() == 0 {
            return;
        }
        for (value, modulation) in out.iter_mut().zip(bus.channel(0).iter()) {
            *value = self.descriptor.clamp(*value + *modulation);
        }
    }
}
