//! Ambit Core - real-time audio render graph
//!
//! This crate is the rendering core of a pull-based audio graph: nodes are
//! pulled, mixed, and processed once per fixed-size quantum by a single
//! real-time render thread, while an arbitrary control thread connects,
//! disconnects, and releases nodes concurrently.
//!
//! # Core Abstractions
//!
//! ## Render Context
//!
//! - [`RenderContext`] - Render clock, graph lock, deferred-release and
//!   deletion queues, listener, and the destination node
//! - [`ContextOptions`] - Sample rate, quantum size, destination channels
//! - [`GraphGuard`] - RAII ownership of the graph lock
//!
//! ## Graph Nodes
//!
//! - [`GraphNode`] - Dual reference-counted node with input/output endpoints
//! - [`NodeHandle`] - Control-plane holder of a normal reference
//! - [`AudioProcessor`] - Node-type-specific processing strategy
//! - [`AudioNodeInput`] / [`AudioNodeOutput`] - Connection endpoints
//! - [`AudioParam`] - Parameter that can also be driven by an output
//!
//! ## Buffers and Smoothing
//!
//! - [`AudioBus`] - Multi-channel sample buffer with silence tracking and
//!   speaker up/down-mixing
//! - [`Smoother`] - One-pole parameter smoother
//!
//! ## Sources and Spatial Plumbing
//!
//! - [`SampleSourceNode`] - In-memory buffer playback, Doppler capable
//! - [`Listener`] - Listener position/orientation/velocity published to the
//!   render thread without locking
//! - [`Vec3`] - 3D vector used by listener and spatializer geometry
//! - [`DopplerRateProvider`] - Capability registered on Doppler sources
//!
//! # Threading Model
//!
//! One render thread calls [`RenderContext::render_quantum`]. While it runs,
//! that thread is the *render thread*: reference releases it issues never
//! block, and are deferred to [`RenderContext::drain_deferred_releases`] when
//! the graph lock is busy. All other threads are control threads and block on
//! the graph lock for topology changes.
//!
//! # Example
//!
//! ```rust
//! use ambit_core::{AudioBus, ContextOptions, RenderContext, SampleBuffer, SampleSourceNode};
//! use std::sync::Arc;
//!
//! let context = RenderContext::new(ContextOptions::default());
//! let buffer = Arc::new(SampleBuffer::mono(vec![0.5; 1024], 48000.0));
//! let source = SampleSourceNode::new(&context, buffer);
//! source.connect(context.destination(), 0, 0).unwrap();
//! source.start(0.0).unwrap();
//!
//! let mut out = AudioBus::new(2, context.quantum_frames());
//! context.render_quantum(&mut out);
//! assert!(!out.is_silent());
//! ```

mod atomic;
mod bus;
mod context;
mod doppler;
mod endpoint;
mod error;
mod handle;
mod listener;
mod lock;
mod node;
mod param;
mod processor;
mod smooth;
mod source;
mod vector;

pub use atomic::{AtomicF32, AtomicF64};
pub use bus::AudioBus;
pub use context::{ContextOptions, RenderContext};
pub use doppler::{DopplerRateProvider, DopplerSlot};
pub use endpoint::{AudioNodeInput, AudioNodeOutput};
pub use error::{GraphError, PortKind};
pub use handle::NodeHandle;
pub use listener::{Listener, ListenerState};
pub use lock::{GraphGuard, GraphLock};
pub use node::{GraphNode, NodeId, NodeKind, NodeOptions, RefKind};
pub use param::{AudioParam, ParamDescriptor};
pub use processor::{AudioProcessor, ProcessContext};
pub use smooth::Smoother;
pub use source::{PlaybackState, SampleBuffer, SampleSourceNode};
pub use vector::Vec3;
