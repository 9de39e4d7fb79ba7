//! The context's listener.
//!
//! Listener state is read by every spatializer on the render thread and
//! written from control threads. Writes publish a whole new
//! [`ListenerState`] through `ArcSwap`, so the render thread always sees a
//! consistent snapshot and never takes a lock.

use arc_swap::ArcSwap;

use crate::vector::Vec3;

/// Default speed of sound in world units per second (metres, dry air at 20°C).
pub const DEFAULT_SPEED_OF_SOUND: f64 = 343.3;

/// A consistent snapshot of the listener.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerState {
    /// Listener position.
    pub position: Vec3,
    /// Direction the listener faces.
    pub forward: Vec3,
    /// Listener's up direction.
    pub up: Vec3,
    /// Listener velocity, world units per second.
    pub velocity: Vec3,
    /// Scales the Doppler effect; 0 disables it.
    pub doppler_factor: f64,
    /// Speed of sound used for Doppler shift.
    pub speed_of_sound: f64,
}

impl Default for ListenerState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::new(0.0, 1.0, 0.0),
            velocity: Vec3::ZERO,
            doppler_factor: 1.0,
            speed_of_sound: DEFAULT_SPEED_OF_SOUND,
        }
    }
}

/// Listener owned by a render context.
#[derive(Debug)]
pub struct Listener {
    state: ArcSwap<ListenerState>,
}

impl Listener {
    /// Creates a listener at the origin facing −Z with +Y up.
    pub fn new() -> Self {
        Self::with_state(ListenerState::default())
    }

    /// Creates a listener from an explicit state.
    pub fn with_state(state: ListenerState) -> Self {
        Self {
            state: ArcSwap::from_pointee(state),
        }
    }

    /// Returns a copy of the current state. Wait-free.
    pub fn snapshot(&self) -> ListenerState {
        **self.state.load()
    }

    /// Replaces the whole state at once.
    pub fn set_state(&self, state: ListenerState) {
        self.state.store(std::sync::Arc::new(state));
    }

    /// Listener position.
    pub fn position(&self) -> Vec3 {
        self.state.load().position
    }

    /// Forward orientation.
    pub fn forward(&self) -> Vec3 {
        self.state.load().forward
    }

    /// Up vector.
    pub fn up(&self) -> Vec3 {
        self.state.load().up
    }

    /// Velocity.
    pub fn velocity(&self) -> Vec3 {
        self.state.load().velocity
    }

    /// Doppler factor.
    pub fn doppler_factor(&self) -> f64 {
        self.state.load().doppler_factor
    }

    /// Speed of sound.
    pub fn speed_of_sound(&self) -> f64 {
        self.state.load().speed_of_sound
    }

    /// Moves the listener.
    pub fn set_position(&self, position: Vec3) {
        self.update(|s| s.position = position);
    }

    /// Sets forward and up vectors together.
    pub fn set_orientation(&self, forward: Vec3, up: Vec3) {
        self.update(|s| {
            s.forward = forward;
            s.up = up;
        });
    }

    /// Sets the listener velocity.
    pub fn set_velocity(&self, velocity: Vec3) {
        self.update(|s| s.velocity = velocity);
    }

    /// Sets the Doppler factor; negative values are treated as 0.
    pub fn set_doppler_factor(&self, factor: f64) {
        self.update(|s| s.doppler_factor = factor.max(0.0));
    }

    /// Sets the speed of sound; ignored unless positive and finite.
    pub fn set_speed_of_sound(&self, speed: f64) {
        if speed.is_finite() && speed > 0.0 {
            self.update(|s| s.speed_of_sound = speed);
        }
    }

    fn update(&self, mut apply: impl FnMut(&mut ListenerState)) {
        self.state.rcu(|current| {
            let mut next = **current;
            apply(&mut next);
            next
        });
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self::new()
    }
}
