//! Coordinate and geometry types shared by the batcher, primitives and passes.
//!
//! Canonical CPU space:
//! - Physical pixels
//! - Origin top-left
//! - +X right, +Y down
//!
//! The line vertex stage converts to NDC using the screen-size constants.

mod vec2;
mod viewport;

pub use vec2::Vec2;
pub use viewport::{ScissorRect, Viewport};
