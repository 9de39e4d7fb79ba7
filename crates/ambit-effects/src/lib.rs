//! Ambit Effects - Effect nodes for the ambit render graph
//!
//! Small processing nodes built on ambit-core. Each one is a [`NodeHandle`]
//! wrapper owning its [`AudioParam`]s, which connected outputs can modulate
//! per sample:
//!
//! - [`ClipNode`] - Hard clipper or tanh saturator ([`ClipMode`])
//! - [`GainNode`] - Modulatable gain with dB helpers
//! - [`DelayNode`] - Fractional delay line whose tail time tracks its
//!   maximum delay
//!
//! ## Example
//!
//! ```rust
//! use ambit_core::{ContextOptions, RenderContext};
//! use ambit_effects::{ClipNode, DelayNode, GainNode};
//!
//! let context = RenderContext::new(ContextOptions::default());
//! let drive = GainNode::new(&context);
//! let clip = ClipNode::new(&context);
//! let echo = DelayNode::new(&context, 1.0).unwrap();
//!
//! drive.set_gain_db(12.0);
//! echo.delay_time().set_value(0.25);
//!
//! drive.connect(&clip, 0, 0).unwrap();
//! clip.connect(&echo, 0, 0).unwrap();
//! echo.connect(context.destination(), 0, 0).unwrap();
//! ```
//!
//! [`NodeHandle`]: ambit_core::NodeHandle
//! [`AudioParam`]: ambit_core::AudioParam

pub mod clip;
pub mod delay;
pub mod gain;

pub use clip::{CLIP_A, CLIP_B, ClipMode, ClipNode, hard_clip, soft_clip};
pub use delay::{DELAY_TIME, DelayLine, DelayNode, MAX_DELAY_LIMIT};
pub use gain::{GAIN, GainNode, db_to_linear, linear_to_db};
