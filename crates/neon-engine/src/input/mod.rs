//! Keyboard input owned by the host loop.
//!
//! `InputState` holds what is down right now; `InputFrame` holds the edges
//! (pressed/released) seen since the previous frame. Apps read edges from
//! `InputFrame` instead of keeping their own latches.

mod frame;
pub(crate) mod platform;
mod state;
mod types;

pub use frame::InputFrame;
pub use state::InputState;
pub use types::{InputEvent, Key, KeyState};
