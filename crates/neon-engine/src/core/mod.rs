//! Frame loop and application contract.
//!
//! [`FrameContext`] owns the backend, the per-backbuffer command streams and
//! the fence bookkeeping. [`App`] is what the host loop drives through it,
//! either from a window ([`crate::window::Runtime`]) or headless via
//! [`drive_frame`].

mod app;
mod config;
mod frame;

pub use app::{drive_frame, App, AppControl, FrameInput};
pub use config::AppConfig;
pub use frame::{FrameContext, FrameStats, FrameStatus, FrameTarget, BACKBUFFER_COUNT};
