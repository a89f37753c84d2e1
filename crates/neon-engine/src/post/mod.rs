//! Scene → effect → backbuffer sequencing.
//!
//! The orchestrator exclusively owns the full-resolution surfaces in a
//! [`SurfaceArena`]; effects such as bloom borrow them per call.

mod arena;
mod orchestrator;

pub use arena::{SurfaceArena, SurfaceSlot};
pub use orchestrator::{PostProcessOrchestrator, ScenePhase};
