//! # vrb-core
//!
//! Real-time audio transport and vectorized signal primitives.
//!
//! ## Architecture
//!
//! ```text
//! Capture callback → RingProducer ─► SPSC AudioRingBuffer ─► BlockProcessor
//!                                                               │
//!                                          remove_dc + apply_window (simd)
//!                                                               │
//!                                       SpatialProcessor (MemoryArena scratch)
//!                                                               │
//! Render callback  ◄─ RingConsumer ◄─ SPSC AudioRingBuffer ◄────┘
//! ```
//!
//! Nothing on the callback side allocates or blocks. Short transfers are
//! reported as counts; callers decide whether that is an overrun or underrun.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]

pub mod arena;
pub mod buffering;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod profiling;
pub mod simd;

// Convenience re-exports for downstream crates
pub use arena::MemoryArena;
pub use buffering::audio::{AudioConsumer, AudioProducer, AudioRingBuffer};
pub use buffering::{RingBuffer, RingConsumer, RingProducer};
pub use config::TransportConfig;
pub use dsp::window::WindowType;
pub use engine::{
    BlockProcessor, CaptureInput, Passthrough, RenderOutput, SpatialProcessor, StreamSession,
};
pub use error::VrbError;
pub use profiling::Profiler;
pub use simd::SimdLevel;
