//! Backend abstraction layer
//!
//! Provides the traits and types the wgpu backend and the recording backend
//! implement, plus the barrier vocabulary and WGSL validation they share.

pub mod barrier;
pub mod recording;
pub mod shader;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use barrier::*;
pub use recording::{Command, RecordingBackend};
pub use traits::*;
pub use types::*;
pub use wgpu_backend::WgpuBackend;
