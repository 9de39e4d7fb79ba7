//! Doppler capability seam between spatializers and playback sources.
//!
//! A spatializer discovers the playback sources feeding it and registers
//! itself on each source's [`DopplerSlot`]. The source then asks the slot for
//! a pitch ratio every quantum. Registration and lookup both happen on the
//! render thread; the slot holds only a weak reference, so a torn-down
//! spatializer simply stops contributing a shift.

use std::sync::Weak;

use parking_lot::Mutex;

/// Something that can report a Doppler pitch ratio for a source.
pub trait DopplerRateProvider: Send + Sync {
    /// Pitch ratio to apply to the source's playback rate (1.0 = no shift).
    fn doppler_rate(&self) -> f64;
}

/// Per-source registration point for a [`DopplerRateProvider`].
#[derive(Default)]
pub struct DopplerSlot {
    provider: Mutex<Option<Weak<dyn DopplerRateProvider>>>,
}

impl DopplerSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider`, replacing any previous registration.
    pub fn register(&self, provider: Weak<dyn DopplerRateProvider>) {
        *self.provider.lock() = Some(provider);
    }

    /// Drops the current registration.
    pub fn clear(&self) {
        *self.provider.lock() = None;
    }

    /// Whether a live provider is registered.
    pub fn is_registered(&self) -> bool {
        self.provider
            .lock()
            .as_ref()
            .is_some_and(|provider| provider.strong_count() > 0)
    }

    /// Current Doppler ratio, or 1.0 when nothing live is registered.
    ///
    /// Never blocks: a contended slot reports no shift for this call.
    pub fn rate(&self) -> f64 {
        let Some(slot) = self.provider.try_lock() else {
            return 1.0;
        };
        slot.as_ref()
            .and_then(Weak::upgrade)
            .map_or(1.0, |provider| provider.doppler_rate())
    }
}
