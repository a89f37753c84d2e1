//! Smallest possible app: a black window.

use neon_engine::core::{App, AppConfig, FrameContext};
use neon_engine::device::Backend;

pub fn config() -> AppConfig {
    AppConfig::new("NeonVector - Hello Window", 800, 600)
}

#[derive(Debug, Default)]
pub struct HelloWindow {
    frames: u64,
}

impl HelloWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl<B: Backend> App<B> for HelloWindow {
    fn on_render(&mut self, _frame: &mut FrameContext<B>) {
        // The host has already cleared the backbuffer to black.
        self.frames += 1;
    }

    fn on_shutdown(&mut self, _frame: &mut FrameContext<B>) {
        log::info!("hello window closed after {} frames", self.frames);
        println!("Goodbye!");
    }
}
