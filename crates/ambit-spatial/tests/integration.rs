//! Integration tests for the spatializer node.
//!
//! Drives full graphs (source → intermediate nodes → spatializer →
//! destination) through the render driver and checks panning, gain
//! de-zippering, Doppler discovery and dormancy on disconnect.

use std::sync::Arc;

use ambit_core::{
    AudioBus, AudioProcessor, ContextOptions, GraphError, GraphNode, NodeHandle, NodeKind,
    NodeOptions, ProcessContext, RenderContext, SampleBuffer, SampleSourceNode, Vec3,
};
use ambit_spatial::panner::codes;
use ambit_spatial::{MAX_DOPPLER_RATE, PanningModel, SpatializerNode};
use tracing_subscriber::EnvFilter;

const QUANTUM: usize = 128;
const LEVEL: f32 = 0.5;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

fn context() -> Arc<RenderContext> {
    init_tracing();
    RenderContext::new(ContextOptions::default())
}

fn render(context: &RenderContext) -> AudioBus {
    let mut out = AudioBus::new(2, QUANTUM);
    context.render_quantum(&mut out);
    out
}

/// A started, looping source holding a constant level.
fn constant_source(context: &Arc<RenderContext>) -> SampleSourceNode {
    let source = SampleSourceNode::new(
        context,
        Arc::new(SampleBuffer::mono(vec![LEVEL; 4800], 48000.0)),
    );
    source.set_loop(true);
    source.start(0.0).unwrap();
    source
}

struct Pass;

impl AudioProcessor for Pass {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        let input = ctx.input(0);
        ctx.output(0).copy_from(&input);
    }

    fn reset(&mut self) {}
}

fn pass(context: &Arc<RenderContext>) -> NodeHandle {
    GraphNode::create(
        context,
        NodeOptions::new(NodeKind::Custom("pass"))
            .with_input(2)
            .with_output(2),
        Pass,
    )
}

fn equal_power_chain(context: &Arc<RenderContext>) -> (SampleSourceNode, SpatializerNode) {
    let source = constant_source(context);
    let panner = SpatializerNode::with_model(context, PanningModel::EqualPower);
    source.connect(&panner, 0, 0).unwrap();
    panner.connect(context.destination(), 0, 0).unwrap();
    (source, panner)
}

// ============================================================================
// 1. Panning and attenuation
// ============================================================================

#[test]
fn source_on_the_right_is_louder_on_the_right() {
    for model in [PanningModel::EqualPower, PanningModel::Hrtf] {
        let context = context();
        let source = constant_source(&context);
        let panner = SpatializerNode::with_model(&context, model);
        panner.set_position(Vec3::new(1.0, 0.0, 0.0));
        source.connect(&panner, 0, 0).unwrap();
        panner.connect(context.destination(), 0, 0).unwrap();

        render(&context);
        let out = render(&context);
        let (left, right) = (out.channel(0)[QUANTUM - 1], out.channel(1)[QUANTUM - 1]);
        assert!(right > left, "{model}: left {left}, right {right}");
    }
}

#[test]
fn gain_change_ramps_across_one_quantum() {
    let context = context();
    let (_source, panner) = equal_power_chain(&context);
    panner.set_position(Vec3::new(0.0, 0.0, -1.0));

    let first = render(&context);
    let steady = first.channel(0)[QUANTUM - 1];
    assert!(steady > 0.0);
    assert!((first.channel(0)[0] - steady).abs() < 1e-6, "first quantum snaps");

    // Inverse model, ref 1: distance 2 halves the gain.
    panner.set_position(Vec3::new(0.0, 0.0, -2.0));
    let second = render(&context);
    let ch = second.channel(0);
    assert!((ch[0] - steady * (1.0 - 0.5 / QUANTUM as f32)).abs() < 1e-5);
    assert!((ch[QUANTUM - 1] - steady * 0.5).abs() < 1e-5);
    assert!(ch.windows(2).all(|w| w[1] <= w[0] + 1e-7));
    assert!((panner.distance_gain().value() - 0.5).abs() < 1e-6);
}

#[test]
fn reset_snaps_to_the_new_gain() {
    let context = context();
    let (_source, panner) = equal_power_chain(&context);
    panner.set_position(Vec3::new(0.0, 0.0, -1.0));
    let steady = render(&context).channel(0)[0];

    panner.set_position(Vec3::new(0.0, 0.0, -4.0));
    panner.reset();
    let out = render(&context);
    let ch = out.channel(0);
    assert!((ch[0] - steady * 0.25).abs() < 1e-5);
    assert!((ch[QUANTUM - 1] - steady * 0.25).abs() < 1e-5);
}

#[test]
fn cone_attenuates_a_source_facing_away() {
    let context = context();
    let (_source, panner) = equal_power_chain(&context);
    panner.set_position(Vec3::new(0.0, 0.0, -1.0));
    panner.set_orientation(Vec3::new(0.0, 0.0, -1.0));
    panner.set_cone_inner_angle(60.0);
    panner.set_cone_outer_angle(120.0);
    panner.set_cone_outer_gain(0.25);

    render(&context);
    assert!((panner.cone_gain().value() - 0.25).abs() < 1e-6);
    assert!((panner.distance_cone_gain() - 0.25).abs() < 1e-9);
}

#[test]
fn panning_model_swap_takes_effect_at_next_quantum() {
    let context = context();
    let source = constant_source(&context);
    let panner = SpatializerNode::new(&context);
    panner.set_position(Vec3::new(-1.0, 0.0, 0.0));
    source.connect(&panner, 0, 0).unwrap();
    panner.connect(context.destination(), 0, 0).unwrap();
    render(&context);

    panner.set_panning_model(PanningModel::EqualPower);
    assert_eq!(panner.panning_model(), PanningModel::EqualPower);
    let out = render(&context);
    // Hard left with equal power: the right channel is silent.
    assert!(out.channel(1)[QUANTUM - 1].abs() < 1e-6);
    assert!((out.channel(0)[QUANTUM - 1] - LEVEL).abs() < 1e-5);
}

#[test]
fn unsupported_panning_code_leaves_model_unchanged() {
    let context = context();
    let panner = SpatializerNode::new(&context);
    let err = panner.set_panning_model_code(codes::SOUNDFIELD).unwrap_err();
    assert!(matches!(err, GraphError::NotSupported(_)));
    assert!(panner.set_panning_model_code(99).is_err());
    assert_eq!(panner.panning_model(), PanningModel::Hrtf);
}

#[test]
fn unconnected_spatializer_outputs_silence() {
    let context = context();
    let panner = SpatializerNode::new(&context);
    panner.connect(context.destination(), 0, 0).unwrap();
    assert!(render(&context).is_silent());
}

// ============================================================================
// 2. Doppler
// ============================================================================

#[test]
fn direct_source_is_discovered_and_shifted() {
    let context = context();
    let (source, panner) = equal_power_chain(&context);
    panner.set_position(Vec3::new(0.0, 0.0, -10.0));
    panner.set_velocity(Vec3::new(0.0, 0.0, 30.0));

    render(&context);
    render(&context);
    assert!(source.has_doppler_provider());
    let rate = source.doppler_rate();
    assert!(rate > 1.0 && rate <= MAX_DOPPLER_RATE, "rate {rate}");
    assert!((rate - panner.doppler_rate()).abs() < 1e-12);
}

#[test]
fn discovery_crosses_diamonds_once() {
    let context = context();
    let source = constant_source(&context);
    let (left, right) = (pass(&context), pass(&context));
    let panner = SpatializerNode::new(&context);
    source.connect(&left, 0, 0).unwrap();
    source.connect(&right, 0, 0).unwrap();
    left.connect(&panner, 0, 0).unwrap();
    right.connect(&panner, 0, 0).unwrap();
    panner.connect(context.destination(), 0, 0).unwrap();

    render(&context);
    assert!(source.has_doppler_provider());
}

#[test]
fn discovery_terminates_on_feedback_cycles() {
    let context = context();
    let source = constant_source(&context);
    let (a, b) = (pass(&context), pass(&context));
    let panner = SpatializerNode::new(&context);
    source.connect(&a, 0, 0).unwrap();
    a.connect(&b, 0, 0).unwrap();
    b.connect(&a, 0, 0).unwrap();
    b.connect(&panner, 0, 0).unwrap();
    panner.connect(context.destination(), 0, 0).unwrap();

    for _ in 0..3 {
        render(&context);
    }
    assert!(source.has_doppler_provider());
}

#[test]
fn source_added_later_is_discovered_after_topology_change() {
    let context = context();
    let panner = SpatializerNode::new(&context);
    panner.connect(context.destination(), 0, 0).unwrap();
    render(&context);

    let source = constant_source(&context);
    source.connect(&panner, 0, 0).unwrap();
    render(&context);
    assert!(source.has_doppler_provider());
}

#[test]
fn dropped_spatializer_stops_shifting() {
    let context = context();
    let source = constant_source(&context);
    let panner = SpatializerNode::new(&context);
    panner.set_position(Vec3::new(0.0, 0.0, -10.0));
    panner.set_velocity(Vec3::new(0.0, 0.0, 30.0));
    source.connect(&panner, 0, 0).unwrap();
    panner.connect(context.destination(), 0, 0).unwrap();
    render(&context);
    assert!(source.has_doppler_provider());
    assert!(source.doppler_rate() > 1.0);

    drop(panner);
    source.disconnect(0).unwrap();
    source.connect(context.destination(), 0, 0).unwrap();
    render(&context);
    render(&context);
    assert!(!source.has_doppler_provider());
    assert_eq!(source.doppler_rate(), 1.0);
}

// ============================================================================
// 3. Lifecycle
// ============================================================================

#[test]
fn disconnecting_the_source_disables_but_keeps_the_spatializer() {
    let context = context();
    let (source, panner) = equal_power_chain(&context);
    render(&context);

    source.disconnect(0).unwrap();
    assert!(panner.is_disabled());
    assert!(!panner.is_marked_for_deletion());
    assert_eq!(panner.connection_ref_count(), 0);
    assert!(render(&context).is_silent());

    source.connect(&panner, 0, 0).unwrap();
    assert!(!panner.is_disabled());
    assert!(!render(&context).is_silent());
}

#[test]
fn released_spatializer_is_reclaimed() {
    let context = context();
    let (source, panner) = equal_power_chain(&context);
    render(&context);

    let node = Arc::clone(panner.node());
    drop(panner);
    assert!(!node.is_marked_for_deletion());
    source.disconnect(0).unwrap();
    assert!(node.is_marked_for_deletion());
    assert_eq!(context.marked_node_count(), 1);
    render(&context);
    assert_eq!(context.marked_node_count(), 0);
}
