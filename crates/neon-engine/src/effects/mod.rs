//! Post-process effects over render surfaces.

mod bloom;

pub use bloom::{BloomParams, BloomPipeline, BloomSettings, BlurParams, DOWNSAMPLE};
