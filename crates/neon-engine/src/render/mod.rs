//! Line rendering and offscreen surfaces.
//!
//! Convention:
//! - CPU geometry is in pixels (top-left origin, +Y down).
//! - The line vertex stage converts to NDC using the screen-size constants.
//! - Fullscreen passes sample with uv (0,0) at the top-left.

mod fullscreen;
mod lines;
pub mod primitives;
mod surface;
mod vertex;

pub use fullscreen::FullscreenPass;
pub use lines::{
    BatchStats, LineBatcher, LineRecorder, LineSink, LineStyle, MAX_LINES, MAX_VERTICES,
};
pub use primitives::{draw_circle, draw_polygon, draw_rect, DEFAULT_CIRCLE_SEGMENTS};
pub use surface::RenderSurface;
pub use vertex::{FullscreenVertex, LineVertex, ScreenConstants, FULLSCREEN_QUAD};
