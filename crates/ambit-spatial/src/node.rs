//! The spatializer node.
//!
//! [`SpatializerNode`] pans one mono or stereo input to a stereo output and
//! scales it by distance and cone attenuation. It also acts as the Doppler
//! rate provider for the playback sources upstream of it.
//!
//! # Threading
//!
//! Control-thread setters publish a fresh [`SpatialState`] through
//! `ArcSwap`; the render thread loads it once per quantum without locking.
//! A new panning strategy is built on the control thread and parked in a
//! slot that the render thread picks up with `try_lock`, so swapping models
//! never blocks rendering.

use core::ops::Deref;
use std::sync::{Arc, Weak};

use ambit_core::{
    AtomicF64, AudioParam, AudioProcessor, DopplerRateProvider, GraphError, GraphNode,
    ListenerState, NodeHandle, NodeKind, NodeOptions, ParamDescriptor, ProcessContext,
    RenderContext, Vec3,
};
use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::cone::ConeEffect;
use crate::discovery::{DiscoveryScratch, notify_doppler_sources};
use crate::distance::{DistanceEffect, DistanceModel};
use crate::geometry::{azimuth_elevation, doppler_rate};
use crate::panner::{Panner, PanningModel};

/// Gain sentinel: the next quantum snaps to its target gain.
const GAIN_SNAP: f32 = -1.0;

/// Nodes a discovery walk can visit before its scratch has to grow.
const DISCOVERY_CAPACITY: usize = 64;

/// Observable distance gain.
pub const DISTANCE_GAIN: ParamDescriptor = ParamDescriptor::new("distanceGain", 1.0, 0.0, 1.0);
/// Observable cone gain.
pub const CONE_GAIN: ParamDescriptor = ParamDescriptor::new("coneGain", 1.0, 0.0, 1.0);

/// Geometry and attenuation settings of a spatializer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialState {
    /// Source position.
    pub position: Vec3,
    /// Direction the source faces (for the cone).
    pub orientation: Vec3,
    /// Source velocity, world units per second.
    pub velocity: Vec3,
    /// Distance curve.
    pub distance: DistanceEffect,
    /// Directional cone.
    pub cone: ConeEffect,
}

impl Default for SpatialState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Vec3::new(1.0, 0.0, 0.0),
            velocity: Vec3::ZERO,
            distance: DistanceEffect::default(),
            cone: ConeEffect::default(),
        }
    }
}

impl SpatialState {
    /// `(distance gain, cone gain)` as heard by `listener`.
    pub fn gains(&self, listener: &ListenerState) -> (f64, f64) {
        let distance = self.distance.gain(self.position.distance_to(listener.position));
        let cone = self
            .cone
            .gain(self.position, self.orientation, listener.position);
        (distance, cone)
    }
}

/// State shared by the control handle, the processor and registered sources.
struct Spatial {
    state: ArcSwap<SpatialState>,
    context: Weak<RenderContext>,
    model: Mutex<PanningModel>,
    pending_panner: Mutex<Option<Box<dyn Panner>>>,
    distance_gain: Arc<AudioParam>,
    cone_gain: Arc<AudioParam>,
    last_doppler: AtomicF64,
}

impl Spatial {
    fn update(&self, f: impl Fn(&mut SpatialState)) {
        self.state.rcu(|current| {
            let mut next = **current;
            f(&mut next);
            next
        });
    }

    fn try_update(
        &self,
        f: impl Fn(&mut SpatialState) -> Result<(), GraphError>,
    ) -> Result<(), GraphError> {
        let mut next = **self.state.load();
        f(&mut next)?;
        self.state.store(Arc::new(next));
        Ok(())
    }

    /// Computes and publishes both attenuation factors; returns the product.
    fn publish_gains(&self, state: &SpatialState, listener: &ListenerState) -> f64 {
        let (distance, cone) = state.gains(listener);
        self.distance_gain.set_value(distance as f32);
        self.cone_gain.set_value(cone as f32);
        distance * cone
    }
}

impl DopplerRateProvider for Spatial {
    fn doppler_rate(&self) -> f64 {
        let Some(context) = self.context.upgrade() else {
            return self.last_doppler.load();
        };
        let state = self.state.load();
        let rate = doppler_rate(state.position, state.velocity, &context.listener().snapshot());
        self.last_doppler.store(rate);
        rate
    }
}

/// 3D panner node: one input (mono or stereo), one stereo output.
///
/// Dereferences to its [`NodeHandle`] for connecting.
///
/// # Example
///
/// ```rust
/// use ambit_core::{ContextOptions, RenderContext, Vec3};
/// use ambit_spatial::{PanningModel, SpatializerNode};
///
/// let context = RenderContext::new(ContextOptions::default());
/// let panner = SpatializerNode::new(&context);
/// panner.set_panning_model(PanningModel::EqualPower);
/// panner.set_position(Vec3::new(2.0, 0.0, -1.0));
/// panner.connect(context.destination(), 0, 0).unwrap();
/// ```
pub struct SpatializerNode {
    handle: NodeHandle,
    spatial: Arc<Spatial>,
}

impl SpatializerNode {
    /// Creates an HRTF spatializer.
    pub fn new(context: &Arc<RenderContext>) -> Self {
        Self::with_model(context, PanningModel::default())
    }

    /// Creates a spatializer with the given panning model.
    pub fn with_model(context: &Arc<RenderContext>, model: PanningModel) -> Self {
        let spatial = Arc::new(Spatial {
            state: ArcSwap::from_pointee(SpatialState::default()),
            context: Arc::downgrade(context),
            model: Mutex::new(model),
            pending_panner: Mutex::new(None),
            distance_gain: AudioParam::new(context, DISTANCE_GAIN),
            cone_gain: AudioParam::new(context, CONE_GAIN),
            last_doppler: AtomicF64::new(1.0),
        });
        let provider: Arc<dyn DopplerRateProvider> = spatial.clone();
        let processor = SpatializerProcessor {
            spatial: Arc::clone(&spatial),
            provider: Arc::downgrade(&provider),
            panner: None,
            last_gain: GAIN_SNAP,
            connection_watermark: None,
            discovery: DiscoveryScratch::with_capacity(DISCOVERY_CAPACITY),
        };
        let options = NodeOptions::new(NodeKind::Spatializer)
            .with_input(2)
            .with_output(2);
        Self {
            handle: GraphNode::create(context, options, processor),
            spatial,
        }
    }

    // ── Geometry ────────────────────────────────────────────────────────────

    /// Current settings snapshot.
    pub fn state(&self) -> SpatialState {
        **self.spatial.state.load()
    }

    /// Source position.
    pub fn position(&self) -> Vec3 {
        self.spatial.state.load().position
    }

    /// Moves the source.
    pub fn set_position(&self, position: Vec3) {
        self.spatial.update(|s| s.position = position);
    }

    /// Direction the source faces.
    pub fn orientation(&self) -> Vec3 {
        self.spatial.state.load().orientation
    }

    /// Points the source.
    pub fn set_orientation(&self, orientation: Vec3) {
        self.spatial.update(|s| s.orientation = orientation);
    }

    /// Source velocity.
    pub fn velocity(&self) -> Vec3 {
        self.spatial.state.load().velocity
    }

    /// Sets the source velocity used for Doppler shift.
    pub fn set_velocity(&self, velocity: Vec3) {
        self.spatial.update(|s| s.velocity = velocity);
    }

    // ── Panning ─────────────────────────────────────────────────────────────

    /// Selected panning model.
    pub fn panning_model(&self) -> PanningModel {
        *self.spatial.model.lock()
    }

    /// Switches the panning strategy.
    ///
    /// The strategy is built here and installed by the render thread at its
    /// next quantum. Selecting the current model is a no-op.
    pub fn set_panning_model(&self, model: PanningModel) {
        let mut current = self.spatial.model.lock();
        if *current == model {
            return;
        }
        *self.spatial.pending_panner.lock() = Some(model.create(self.handle.sample_rate()));
        *current = model;

        #[cfg(feature = "tracing")]
        tracing::debug!("panning_model_changed: {} → {model}", self.handle.id());
    }

    /// Switches the panning strategy by numeric code.
    ///
    /// # Errors
    ///
    /// [`GraphError::NotSupported`] for codes that name no implemented model.
    pub fn set_panning_model_code(&self, code: u16) -> Result<(), GraphError> {
        let model = PanningModel::from_code(code).inspect_err(|_err| {
            #[cfg(feature = "tracing")]
            tracing::warn!("panning_model_rejected: {_err}");
        })?;
        self.set_panning_model(model);
        Ok(())
    }

    // ── Distance ────────────────────────────────────────────────────────────

    /// Distance curve.
    pub fn distance_model(&self) -> DistanceModel {
        self.spatial.state.load().distance.model()
    }

    /// Selects the distance curve.
    pub fn set_distance_model(&self, model: DistanceModel) {
        self.spatial.update(|s| s.distance.set_model(model));
    }

    /// Selects the distance curve by name.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidArgument`] for unknown names.
    pub fn set_distance_model_name(&self, name: &str) -> Result<(), GraphError> {
        self.set_distance_model(name.parse()?);
        Ok(())
    }

    /// Reference distance.
    pub fn ref_distance(&self) -> f64 {
        self.spatial.state.load().distance.ref_distance()
    }

    /// Sets the reference distance.
    pub fn set_ref_distance(&self, distance: f64) -> Result<(), GraphError> {
        self.spatial
            .try_update(|s| s.distance.set_ref_distance(distance))
    }

    /// Maximum distance.
    pub fn max_distance(&self) -> f64 {
        self.spatial.state.load().distance.max_distance()
    }

    /// Sets the maximum distance.
    pub fn set_max_distance(&self, distance: f64) -> Result<(), GraphError> {
        self.spatial
            .try_update(|s| s.distance.set_max_distance(distance))
    }

    /// Rolloff factor.
    pub fn rolloff_factor(&self) -> f64 {
        self.spatial.state.load().distance.rolloff_factor()
    }

    /// Sets the rolloff factor.
    pub fn set_rolloff_factor(&self, rolloff: f64) -> Result<(), GraphError> {
        self.spatial
            .try_update(|s| s.distance.set_rolloff_factor(rolloff))
    }

    // ── Cone ────────────────────────────────────────────────────────────────

    /// Inner cone angle, degrees.
    pub fn cone_inner_angle(&self) -> f64 {
        self.spatial.state.load().cone.inner_angle
    }

    /// Sets the inner cone angle.
    pub fn set_cone_inner_angle(&self, degrees: f64) {
        if degrees.is_finite() {
            self.spatial.update(|s| s.cone.inner_angle = degrees);
        }
    }

    /// Outer cone angle, degrees.
    pub fn cone_outer_angle(&self) -> f64 {
        self.spatial.state.load().cone.outer_angle
    }

    /// Sets the outer cone angle.
    pub fn set_cone_outer_angle(&self, degrees: f64) {
        if degrees.is_finite() {
            self.spatial.update(|s| s.cone.outer_angle = degrees);
        }
    }

    /// Gain outside the outer cone.
    pub fn cone_outer_gain(&self) -> f64 {
        self.spatial.state.load().cone.outer_gain
    }

    /// Sets the outer cone gain; clamped to `[0, 1]`.
    pub fn set_cone_outer_gain(&self, gain: f64) {
        if !gain.is_nan() {
            self.spatial
                .update(|s| s.cone.outer_gain = gain.clamp(0.0, 1.0));
        }
    }

    // ── Derived values ──────────────────────────────────────────────────────

    /// Observable distance gain of the last computation.
    pub fn distance_gain(&self) -> &Arc<AudioParam> {
        &self.spatial.distance_gain
    }

    /// Observable cone gain of the last computation.
    pub fn cone_gain(&self) -> &Arc<AudioParam> {
        &self.spatial.cone_gain
    }

    /// Distance gain × cone gain for the current listener. Also publishes
    /// both factors.
    pub fn distance_cone_gain(&self) -> f64 {
        let listener = self.listener_state();
        self.spatial
            .publish_gains(&self.spatial.state.load(), &listener)
    }

    /// Azimuth and elevation of the source for the current listener.
    pub fn azimuth_elevation(&self) -> (f64, f64) {
        azimuth_elevation(self.position(), &self.listener_state())
    }

    /// Doppler ratio for the current source and listener motion.
    pub fn doppler_rate(&self) -> f64 {
        self.spatial.doppler_rate()
    }

    /// Forces the next quantum to snap to its gain and clears the panner's
    /// history.
    pub fn reset(&self) {
        self.handle.request_reset();
    }

    /// The underlying handle.
    pub fn handle(&self) -> &NodeHandle {
        &self.handle
    }

    fn listener_state(&self) -> ListenerState {
        self.handle
            .context()
            .map(|context| context.listener().snapshot())
            .unwrap_or_default()
    }
}

impl Deref for SpatializerNode {
    type Target = NodeHandle;

    fn deref(&self) -> &NodeHandle {
        &self.handle
    }
}

struct SpatializerProcessor {
    spatial: Arc<Spatial>,
    provider: Weak<dyn DopplerRateProvider>,
    panner: Option<Box<dyn Panner>>,
    last_gain: f32,
    connection_watermark: Option<u64>,
    discovery: DiscoveryScratch,
}

impl SpatializerProcessor {
    fn install_pending_panner(&mut self) {
        if let Some(mut slot) = self.spatial.pending_panner.try_lock()
            && let Some(panner) = slot.take()
        {
            self.panner = Some(panner);
            self.last_gain = GAIN_SNAP;
        }
    }
}

impl AudioProcessor for SpatializerProcessor {
    fn initialize(&mut self, sample_rate: f32) {
        if self.panner.is_none() {
            self.panner = Some(self.spatial.model.lock().create(sample_rate));
        }
    }

    fn uninitialize(&mut self) {
        self.panner = None;
    }

    fn before_pull(&mut self, node: &Arc<GraphNode>, context: &RenderContext) {
        let count = context.global_connection_count();
        if self.connection_watermark == Some(count) || !context.is_graph_owner() {
            return;
        }
        self.connection_watermark = Some(count);
        notify_doppler_sources(node, context, &self.provider, &mut self.discovery);
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        self.install_pending_panner();

        let mut output = ctx.output(0);
        let Some(panner) = self.panner.as_mut() else {
            output.zero();
            return;
        };
        if !ctx.input_is_connected(0) {
            output.zero();
            return;
        }
        let input = ctx.input(0);

        let state = self.spatial.state.load();
        let listener = ctx.listener().snapshot();
        let (azimuth, elevation) = azimuth_elevation(state.position, &listener);
        panner.pan(azimuth, elevation, &input, &mut output, ctx.frames());

        let total = self.spatial.publish_gains(&state, &listener) as f32;
        if self.last_gain == GAIN_SNAP {
            self.last_gain = total;
        }
        output.apply_gain_ramp(self.last_gain, total);
        self.last_gain = total;
    }

    fn reset(&mut self) {
        self.last_gain = GAIN_SNAP;
        if let Some(panner) = self.panner.as_mut() {
            panner.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambit_core::ContextOptions;

    fn context() -> Arc<RenderContext> {
        RenderContext::new(ContextOptions::default())
    }

    #[test]
    fn defaults() {
        let context = context();
        let node = SpatializerNode::new(&context);
        assert_eq!(node.panning_model(), PanningModel::Hrtf);
        assert_eq!(node.distance_model(), DistanceModel::Inverse);
        assert_eq!(node.orientation(), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(node.ref_distance(), 1.0);
        assert_eq!(node.max_distance(), 10000.0);
        assert_eq!(node.rolloff_factor(), 1.0);
        assert_eq!(node.cone_inner_angle(), 360.0);
        assert_eq!(node.cone_outer_angle(), 360.0);
        assert_eq!(node.cone_outer_gain(), 0.0);
        assert_eq!(node.number_of_inputs(), 1);
        assert_eq!(node.output(0).unwrap().channels(), 2);
        assert_eq!(node.kind(), NodeKind::Spatializer);
    }

    #[test]
    fn distance_cone_gain_publishes_factors() {
        let context = context();
        let node = SpatializerNode::new(&context);
        node.set_position(Vec3::new(0.0, 0.0, -4.0));
        node.set_orientation(Vec3::new(0.0, 0.0, -1.0));
        node.set_cone_inner_angle(90.0);
        node.set_cone_outer_angle(180.0);
        node.set_cone_outer_gain(0.5);

        // Facing away from the listener: cone gain is the outer gain.
        let total = node.distance_cone_gain();
        assert!((node.distance_gain().value() - 0.25).abs() < 1e-6);
        assert!((node.cone_gain().value() - 0.5).abs() < 1e-6);
        assert!((total - 0.125).abs() < 1e-9);
    }

    #[test]
    fn invalid_distance_settings_leave_state_unchanged() {
        let context = context();
        let node = SpatializerNode::new(&context);
        let before = node.state();
        assert!(node.set_ref_distance(-1.0).is_err());
        assert!(node.set_rolloff_factor(f64::INFINITY).is_err());
        assert!(matches!(
            node.set_distance_model_name("quadratic"),
            Err(GraphError::InvalidArgument(_))
        ));
        assert_eq!(node.state(), before);
        node.set_distance_model_name("linear").unwrap();
        assert_eq!(node.distance_model(), DistanceModel::Linear);
    }

    #[test]
    fn unsupported_panning_code_is_rejected() {
        let context = context();
        let node = SpatializerNode::new(&context);
        assert!(matches!(
            node.set_panning_model_code(crate::panner::codes::SOUNDFIELD),
            Err(GraphError::NotSupported(_))
        ));
        assert_eq!(node.panning_model(), PanningModel::Hrtf);
        node.set_panning_model_code(crate::panner::codes::EQUAL_POWER)
            .unwrap();
        assert_eq!(node.panning_model(), PanningModel::EqualPower);
    }

    #[test]
    fn doppler_follows_listener_snapshot() {
        let context = context();
        let node = SpatializerNode::new(&context);
        node.set_position(Vec3::new(0.0, 0.0, -10.0));
        assert_eq!(node.doppler_rate(), 1.0);
        node.set_velocity(Vec3::new(0.0, 0.0, 20.0));
        assert!(node.doppler_rate() > 1.0);
        context.listener().set_doppler_factor(0.0);
        assert_eq!(node.doppler_rate(), 1.0);
    }

    #[test]
    fn outer_gain_is_clamped() {
        let context = context();
        let node = SpatializerNode::new(&context);
        node.set_cone_outer_gain(3.0);
        assert_eq!(node.cone_outer_gain(), 1.0);
        node.set_cone_outer_gain(f64::NAN);
        assert_eq!(node.cone_outer_gain(), 1.0);
    }
}
