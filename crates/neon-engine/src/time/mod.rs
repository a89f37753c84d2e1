//! Frame timing for the host loop.
//!
//! One `FrameClock` per render loop; call `tick()` once per frame and hand
//! `FrameTime::dt` to `App::on_update`.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
