//! Ambit Spatial - 3D spatialization for the ambit render graph
//!
//! This crate provides the spatializer node and the pieces it is built from:
//!
//! - [`SpatializerNode`] - Pans a mono or stereo input to stereo with
//!   distance and cone attenuation, and Doppler-shifts upstream sources
//! - [`Panner`] / [`PanningModel`] - Swappable panning strategies:
//!   [`EqualPowerPanner`] and the interaural-cue [`HrtfPanner`]
//! - [`DistanceEffect`] / [`DistanceModel`] - Linear, inverse and
//!   exponential distance curves
//! - [`ConeEffect`] - Directional sound cone
//! - [`azimuth_elevation`] / [`doppler_rate`] - Source/listener geometry
//! - [`notify_doppler_sources`] - Upstream Doppler-source discovery
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ambit_core::{AudioBus, ContextOptions, RenderContext, SampleBuffer, SampleSourceNode, Vec3};
//! use ambit_spatial::SpatializerNode;
//!
//! let context = RenderContext::new(ContextOptions::default());
//! let source = SampleSourceNode::new(
//!     &context,
//!     Arc::new(SampleBuffer::mono(vec![0.5; 4800], 48000.0)),
//! );
//! let panner = SpatializerNode::new(&context);
//! panner.set_position(Vec3::new(3.0, 0.0, 0.0));
//!
//! source.connect(&panner, 0, 0).unwrap();
//! panner.connect(context.destination(), 0, 0).unwrap();
//! source.start(0.0).unwrap();
//!
//! let mut out = AudioBus::new(2, context.quantum_frames());
//! context.render_quantum(&mut out);
//! ```

pub mod cone;
pub mod discovery;
pub mod distance;
pub mod geometry;
pub mod node;
pub mod panner;

pub use cone::ConeEffect;
pub use discovery::{DiscoveryScratch, notify_doppler_sources};
pub use distance::{DistanceEffect, DistanceModel};
pub use geometry::{MAX_DOPPLER_RATE, MIN_DOPPLER_RATE, azimuth_elevation, doppler_rate};
pub use node::{CONE_GAIN, DISTANCE_GAIN, SpatialState, SpatializerNode};
pub use panner::{EqualPowerPanner, HrtfPanner, Panner, PanningModel};
