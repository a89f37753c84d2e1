//! Demo applications for the NeonVector engine.
//!
//! Every demo implements `App` for any backend: the binaries under `src/bin`
//! run them in a window, the tests run them on the headless backend.

pub mod basic_shapes;
pub mod bloom;
pub mod hello;
pub mod line_drawing;

use neon_engine::core::{App, AppConfig};
use neon_engine::device::{GpuInit, WgpuBackend};
use neon_engine::logging::{init_logging, LoggingConfig};
use neon_engine::window::Runtime;

/// Installs logging and runs `app` in a window until it exits.
pub fn run<A>(config: AppConfig, app: A) -> anyhow::Result<()>
where
    A: for<'w> App<WgpuBackend<'w>> + 'static,
{
    init_logging(LoggingConfig::default());

    println!("=== NeonVector {} ===", neon_engine::VERSION);
    println!("{}", config.title);
    println!("Press ESC to quit");

    Runtime::run(config, GpuInit::default(), app)
}

#[cfg(test)]
pub(crate) mod testing {
    use neon_engine::core::{drive_frame, App, AppControl, FrameContext, FrameInput};
    use neon_engine::device::headless::{HeadlessBackend, HeadlessConfig};
    use neon_engine::input::{InputEvent, InputFrame, InputState, Key, KeyState};
    use neon_engine::time::FrameTime;

    pub fn frame(config: HeadlessConfig) -> FrameContext<HeadlessBackend> {
        FrameContext::new(HeadlessBackend::new(config), false).unwrap()
    }

    pub fn tick(index: u64) -> FrameTime {
        FrameTime {
            dt: 1.0 / 60.0,
            elapsed: index as f64 / 60.0,
            frame_index: index,
        }
    }

    /// Runs one frame; `keys` are pressed just before it.
    pub fn step<A: App<HeadlessBackend>>(
        frame: &mut FrameContext<HeadlessBackend>,
        app: &mut A,
        index: u64,
        keys: &[Key],
    ) -> AppControl {
        let mut state = InputState::default();
        let mut edges = InputFrame::default();
        for &key in keys {
            let ev = InputEvent::Key { key, state: KeyState::Pressed, repeat: false };
            state.apply_event(&mut edges, ev);
        }

        let input = FrameInput { state: &state, edges: &edges };
        drive_frame(frame, app, tick(index), input, || {}).unwrap()
    }
}
