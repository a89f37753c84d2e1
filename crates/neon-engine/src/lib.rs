//! NeonVector engine crate.
//!
//! Batched 2D line rendering with an optional bloom post-process, over a
//! recorded command stream that runs on wgpu or on a deterministic CPU
//! backend.

pub mod device;
pub mod window;
pub mod input;
pub mod time;
pub mod core;

pub mod logging;
pub mod coords;
pub mod paint;
pub mod shaders;
pub mod render;
pub mod effects;
pub mod post;

/// Engine version, as reported by the demos' banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
