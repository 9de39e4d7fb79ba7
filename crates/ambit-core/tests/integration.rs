//! Integration tests for the ambit-core render graph.
//!
//! Exercises the lifecycle protocol and the per-quantum scheduler end to end
//! through the public API: fan-out, teardown, dormancy, silence propagation,
//! feedback cycles, render-thread deferral, tail-time disabling and control
//! plane validation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use ambit_core::{
    AudioBus, AudioProcessor, ContextOptions, GraphError, GraphNode, NodeHandle, NodeKind,
    NodeOptions, PlaybackState, PortKind, ProcessContext, RenderContext, SampleBuffer,
    SampleSourceNode,
};
use tracing_subscriber::EnvFilter;

const QUANTUM: usize = 128;
const SAMPLE_RATE: f32 = 48000.0;

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

/// Copies input 0 to output 0 and counts how often it runs.
struct Pass {
    calls: Arc<AtomicUsize>,
}

impl AudioProcessor for Pass {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let input = ctx.input(0);
        ctx.output(0).copy_from(&input);
    }

    fn reset(&mut self) {}
}

/// Active source: input 0 (if any) plus a constant level.
struct Tone {
    calls: Arc<AtomicUsize>,
    level: f32,
}

impl AudioProcessor for Tone {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let frames = ctx.frames();
        let mut out = ctx.output(0);
        if ctx.node().number_of_inputs() > 0 {
            out.copy_from(&ctx.input(0));
        } else {
            out.zero();
        }
        for ch in 0..out.num_channels() {
            for sample in &mut out.channel_mut(ch)[..frames] {
                *sample += self.level;
            }
        }
    }

    fn reset(&mut self) {}

    fn is_active_source(&self) -> bool {
        true
    }
}

/// Produces a single non-silent quantum, then goes quiet.
struct Burst {
    done: bool,
}

impl AudioProcessor for Burst {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) {
        let mut out = ctx.output(0);
        out.zero();
        if !self.done {
            let frames = ctx.frames();
            out.channel_mut(0)[..frames].fill(1.0);
            self.done = true;
        }
    }

    fn reset(&mut self) {}

    fn is_active_source(&self) -> bool {
        !self.done
    }
}

fn pass(context: &Arc<RenderContext>, tail: f64) -> (NodeHandle, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let options = NodeOptions::new(NodeKind::Custom("pass"))
        .with_input(2)
        .with_output(2)
        .with_tail_time(tail);
    let handle = GraphNode::create(context, options, Pass { calls: Arc::clone(&calls) });
    (handle, calls)
}

fn tone(context: &Arc<RenderContext>, with_input: bool) -> (NodeHandle, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut options = NodeOptions::new(NodeKind::Custom("tone")).with_output(1);
    if with_input {
        options = options.with_input(1);
    }
    let handle = GraphNode::create(
        context,
        options,
        Tone {
            calls: Arc::clone(&calls),
            level: 0.25,
        },
    );
    (handle, calls)
}

// ============================================================================
// 1. Scheduling
// ============================================================================

#[test]
fn fan_out_renders_upstream_once_per_quantum() {
    let context = context();
    let (source, source_calls) = tone(&context, false);
    let (left, left_calls) = pass(&context, 0.0);
    let (right, right_calls) = pass(&context, 0.0);

    source.connect(&left, 0, 0).unwrap();
    source.connect(&right, 0, 0).unwrap();
    left.connect(context.destination(), 0, 0).unwrap();
    right.connect(context.destination(), 0, 0).unwrap();

    let out = render(&context);
    assert_eq!(source_calls.load(Ordering::Relaxed), 1);
    assert_eq!(left_calls.load(Ordering::Relaxed), 1);
    assert_eq!(right_calls.load(Ordering::Relaxed), 1);
    // Two paths of 0.25 each, mono upmixed to both destination channels.
    assert!((out.channel(0)[0] - 0.5).abs() < 1e-6);
    assert!((out.channel(1)[QUANTUM - 1] - 0.5).abs() < 1e-6);

    render(&context);
    assert_eq!(source_calls.load(Ordering::Relaxed), 2);
}

#[test]
fn processing_timestamp_follows_render_clock() {
    let context = context();
    let (node, _) = tone(&context, false);
    node.connect(context.destination(), 0, 0).unwrap();
    assert_eq!(node.last_processing_time(), -1.0);

    render(&context);
    assert_eq!(node.last_processing_time(), 0.0);
    render(&context);
    let expected = QUANTUM as f64 / f64::from(SAMPLE_RATE);
    assert!((node.last_processing_time() - expected).abs() < 1e-12);
}

#[test]
fn feedback_cycle_terminates_and_renders_each_node_once() {
    let context = context();
    let (a, a_calls) = tone(&context, true);
    let (b, b_calls) = pass(&context, 0.0);

    a.connect(&b, 0, 0).unwrap();
    b.connect(&a, 0, 0).unwrap();
    b.connect(context.destination(), 0, 0).unwrap();

    for _ in 0..3 {
        render(&context);
    }
    assert_eq!(a_calls.load(Ordering::Relaxed), 3);
    assert_eq!(b_calls.load(Ordering::Relaxed), 3);
}

#[test]
fn unconnected_node_propagates_silence() {
    let context = context();
    let (node, calls) = pass(&context, 0.0);
    node.connect(context.destination(), 0, 0).unwrap();

    let out = render(&context);
    assert!(out.is_silent());
    assert_eq!(calls.load(Ordering::Relaxed), 0);
    assert!(node.output(0).unwrap().bus_is_silent());
}

#[test]
fn silence_propagates_only_after_tail() {
    let context = context();
    let burst = GraphNode::create(
        &context,
        NodeOptions::new(NodeKind::Custom("burst")).with_output(1),
        Burst { done: false },
    );
    let tail = 2.0 * QUANTUM as f64 / f64::from(SAMPLE_RATE);
    let (effect, calls) = pass(&context, tail);
    burst.connect(&effect, 0, 0).unwrap();
    effect.connect(context.destination(), 0, 0).unwrap();

    // The burst quantum, then the tail: last non-silent time is the end of
    // quantum 0, so quanta 1..=3 still process and quantum 4 is skipped.
    for _ in 0..5 {
        render(&context);
    }
    assert_eq!(calls.load(Ordering::Relaxed), 4);
    assert!(effect.output(0).unwrap().bus_is_silent());
}

// ============================================================================
// 2. Lifecycle
// ============================================================================

#[test]
fn teardown_marks_once_and_disconnects_outputs() {
    let context = context();
    let (a, _) = tone(&context, false);
    let (b, _) = pass(&context, 0.0);
    a.connect(&b, 0, 0).unwrap();
    b.connect(context.destination(), 0, 0).unwrap();
    render(&context);

    let a_node = Arc::clone(a.node());
    assert_eq!(b.connection_ref_count(), 1);
    drop(a);

    assert!(a_node.is_marked_for_deletion());
    assert_eq!(a_node.output(0).unwrap().fan_out(), 0);
    assert_eq!(b.connection_ref_count(), 0);
    assert_eq!(b.input(0).unwrap().connection_count(), 0);
    assert_eq!(context.marked_node_count(), 1);

    render(&context);
    assert_eq!(context.marked_node_count(), 0);
    assert!(b.is_disabled());
}

#[test]
fn connected_node_survives_handle_drop() {
    let context = context();
    let (a, a_calls) = tone(&context, false);
    let (b, _) = pass(&context, 0.0);
    a.connect(&b, 0, 0).unwrap();
    b.connect(context.destination(), 0, 0).unwrap();

    let b_node = Arc::clone(b.node());
    drop(b);
    assert!(!b_node.is_marked_for_deletion());
    assert_eq!(b_node.normal_ref_count(), 0);
    assert_eq!(b_node.connection_ref_count(), 1);

    let out = render(&context);
    assert!(!out.is_silent());
    assert_eq!(a_calls.load(Ordering::Relaxed), 1);

    drop(a);
    assert!(b_node.is_marked_for_deletion());
    assert_eq!(context.destination().input(0).unwrap().connection_count(), 0);
}

#[test]
fn cloned_handles_hold_normal_references() {
    let context = context();
    let (a, _) = pass(&context, 0.0);
    let second = a.clone();
    assert_eq!(a.normal_ref_count(), 2);

    let node = Arc::clone(a.node());
    drop(a);
    assert!(!node.is_marked_for_deletion());
    drop(second);
    assert!(node.is_marked_for_deletion());
}

#[test]
fn disconnect_disables_and_reconnect_reenables() {
    let context = context();
    let (source, _) = tone(&context, false);
    let (effect, _) = pass(&context, 0.0);
    source.connect(&effect, 0, 0).unwrap();
    effect.connect(context.destination(), 0, 0).unwrap();
    render(&context);

    source.disconnect(0).unwrap();
    assert!(effect.is_disabled());
    assert!(!effect.output(0).unwrap().is_enabled());
    let sink_input = context.destination().input(0).unwrap();
    assert_eq!(sink_input.connection_count(), 0);
    assert_eq!(sink_input.disabled_connection_count(), 1);
    assert!(render(&context).is_silent());

    source.connect(&effect, 0, 0).unwrap();
    assert!(!effect.is_disabled());
    assert!(effect.output(0).unwrap().is_enabled());
    assert_eq!(sink_input.connection_count(), 1);
    assert_eq!(sink_input.disabled_connection_count(), 0);
    assert!(!render(&context).is_silent());
}

#[test]
fn duplicate_connect_is_idempotent() {
    let context = context();
    let (a, _) = tone(&context, false);
    let (b, _) = pass(&context, 0.0);
    a.connect(&b, 0, 0).unwrap();
    a.connect(&b, 0, 0).unwrap();
    assert_eq!(b.connection_ref_count(), 1);
    assert_eq!(a.output(0).unwrap().fan_out(), 1);
}

#[test]
fn disconnect_all_releases_every_output() {
    let context = context();
    let (a, _) = tone(&context, false);
    let (b, _) = pass(&context, 0.0);
    let (c, _) = pass(&context, 0.0);
    a.connect(&b, 0, 0).unwrap();
    a.connect(&c, 0, 0).unwrap();

    a.node().disconnect_all().unwrap();
    assert_eq!(b.connection_ref_count(), 0);
    assert_eq!(c.connection_ref_count(), 0);
    assert!(!a.output(0).unwrap().is_connected());
}

#[test]
fn release_after_uninitialize_reclaims_immediately() {
    let context = context();
    let (a, _) = pass(&context, 0.0);
    let node = Arc::clone(a.node());
    context.uninitialize();
    assert!(context.render_thread_has_finished());

    drop(a);
    assert!(node.is_marked_for_deletion());
    assert_eq!(context.marked_node_count(), 0);
    assert_eq!(Arc::strong_count(&node), 1);
}

#[test]
fn release_after_context_drop_is_immediate() {
    let context = context();
    let (a, _) = pass(&context, 0.0);
    drop(context);
    assert!(a.context().is_none());
    let node = Arc::clone(a.node());
    drop(a);
    assert!(node.is_marked_for_deletion());
    assert_eq!(node.normal_ref_count(), 0);
}

// ============================================================================
// 3. Render-thread deferral and tail-time disabling
// ============================================================================

#[test]
fn render_thread_defers_release_while_control_holds_lock() {
    let context = context();
    let buffer = Arc::new(SampleBuffer::mono(vec![0.5; 200], SAMPLE_RATE));
    let source = SampleSourceNode::new(&context, buffer);
    source.connect(context.destination(), 0, 0).unwrap();
    source.start(0.0).unwrap();

    render(&context);
    assert_eq!(source.playback_state(), PlaybackState::Playing);

    let barrier = Arc::new(Barrier::new(2));
    let holder = {
        let context = Arc::clone(&context);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let _graph = context.lock_graph();
            barrier.wait();
            barrier.wait();
        })
    };
    barrier.wait();

    // Renders from the existing snapshot; the finish release cannot take the
    // lock, so it is queued.
    let out = render(&context);
    assert!(!out.is_silent());
    assert_eq!(source.playback_state(), PlaybackState::Finished);
    assert_eq!(source.connection_ref_count(), 1);
    assert_eq!(context.deferred_release_count(), 1);

    barrier.wait();
    holder.join().unwrap();

    context.drain_deferred_releases();
    assert_eq!(context.deferred_release_count(), 0);
    assert_eq!(source.connection_ref_count(), 0);
}

#[test]
fn render_drains_deferred_releases_when_lock_is_free() {
    let context = context();
    let (a, _) = pass(&context, 0.0);
    let node = Arc::clone(a.node());
    node.add_reference(ambit_core::RefKind::Connection);
    context.enqueue_deferred_release(Arc::clone(&node));

    render(&context);
    assert_eq!(context.deferred_release_count(), 0);
    assert_eq!(node.connection_ref_count(), 0);
}

#[test]
fn tail_time_delays_disable_until_deadline() {
    let context = context();
    let (source, _) = tone(&context, false);
    let tail = 480.0 / f64::from(SAMPLE_RATE);
    let (delay, _) = pass(&context, tail);
    source.connect(&delay, 0, 0).unwrap();
    delay.connect(context.destination(), 0, 0).unwrap();
    render(&context);

    source.disconnect(0).unwrap();
    assert!(!delay.is_disabled());
    assert!(delay.has_pending_disable());

    // Deadline is 480 frames after the disconnect (render time 128).
    for _ in 0..4 {
        render(&context);
        assert!(!delay.is_disabled());
    }
    render(&context);
    assert!(delay.is_disabled());
    assert!(!delay.has_pending_disable());
}

#[test]
fn reconnect_cancels_pending_disable() {
    let context = context();
    let (source, _) = tone(&context, false);
    let (delay, _) = pass(&context, 0.01);
    source.connect(&delay, 0, 0).unwrap();
    delay.connect(context.destination(), 0, 0).unwrap();

    source.disconnect(0).unwrap();
    assert!(delay.has_pending_disable());
    source.connect(&delay, 0, 0).unwrap();
    assert!(!delay.has_pending_disable());

    for _ in 0..10 {
        render(&context);
    }
    assert!(!delay.is_disabled());
}

// ============================================================================
// 4. Control-plane validation
// ============================================================================

#[test]
fn connect_rejects_bad_indices_without_mutation() {
    let context = context();
    let (a, _) = tone(&context, false);
    let (b, _) = pass(&context, 0.0);

    let err = a.connect(&b, 1, 0).unwrap_err();
    assert_eq!(
        err,
        GraphError::IndexOutOfRange {
            port: PortKind::Output,
            index: 1,
            count: 1
        }
    );
    let err = a.connect(&b, 0, 3).unwrap_err();
    assert!(matches!(
        err,
        GraphError::IndexOutOfRange {
            port: PortKind::Input,
            index: 3,
            ..
        }
    ));
    assert_eq!(b.connection_ref_count(), 0);
    assert_eq!(a.output(0).unwrap().fan_out(), 0);
    assert!(a.disconnect(5).is_err());
}

#[test]
fn connect_rejects_other_context() {
    let first = context();
    let second = context();
    let (a, _) = tone(&first, false);
    let (b, _) = pass(&second, 0.0);
    assert_eq!(a.connect(&b, 0, 0), Err(GraphError::CrossContextMismatch));
    assert_eq!(b.connection_ref_count(), 0);
}

#[test]
fn connect_rejects_torn_down_destination() {
    let context = context();
    let (a, _) = tone(&context, false);
    let (b, _) = pass(&context, 0.0);
    let b_node = Arc::clone(b.node());
    drop(b);

    let err = a.node().connect(&b_node, 0, 0).unwrap_err();
    assert!(matches!(err, GraphError::InvalidArgument(_)));
    assert_eq!(a.output(0).unwrap().fan_out(), 0);
}

#[test]
fn connection_count_watermark_advances() {
    let context = context();
    let (a, _) = tone(&context, false);
    let (b, _) = pass(&context, 0.0);
    let before = context.global_connection_count();
    a.connect(&b, 0, 0).unwrap();
    assert!(context.global_connection_count() > before);
}
