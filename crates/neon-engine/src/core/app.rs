use crate::device::{Backend, GpuError};
use crate::input::{InputFrame, InputState};
use crate::paint::Color;
use crate::time::FrameTime;

use super::frame::{FrameContext, FrameStatus};

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Input visible to `on_update`: held keys plus this frame's edges.
#[derive(Debug, Copy, Clone)]
pub struct FrameInput<'a> {
    pub state: &'a InputState,
    pub edges: &'a InputFrame,
}

/// Application driven by the host loop.
///
/// Generic over the backend so the same app runs in a window or headless.
pub trait App<B: Backend> {
    /// Called once after the frame context exists. An error aborts startup.
    fn on_init(&mut self, frame: &mut FrameContext<B>) -> anyhow::Result<()> {
        let _ = frame;
        Ok(())
    }

    fn on_update(&mut self, time: FrameTime, input: FrameInput<'_>) -> AppControl {
        let _ = (time, input);
        AppControl::Continue
    }

    /// Records the frame. The backbuffer is bound and already cleared.
    fn on_render(&mut self, frame: &mut FrameContext<B>);

    /// Called after the swap chain has been resized.
    fn on_resize(&mut self, frame: &mut FrameContext<B>, width: u32, height: u32) {
        let _ = (frame, width, height);
    }

    /// Called once with the GPU drained, before the frame context shuts down.
    fn on_shutdown(&mut self, frame: &mut FrameContext<B>) {
        let _ = frame;
    }
}

/// Runs one update/render/present cycle.
///
/// `before_present` runs after recording ends and before submission. Skipped
/// frames still update. Only fatal device errors are returned.
pub fn drive_frame<B, A>(
    frame: &mut FrameContext<B>,
    app: &mut A,
    time: FrameTime,
    input: FrameInput<'_>,
    before_present: impl FnOnce(),
) -> Result<AppControl, GpuError>
where
    B: Backend,
    A: App<B> + ?Sized,
{
    if app.on_update(time, input) == AppControl::Exit {
        return Ok(AppControl::Exit);
    }

    if frame.begin_frame()? == FrameStatus::Skipped {
        return Ok(AppControl::Continue);
    }

    frame.clear_render_target(Color::BLACK);
    app.on_render(frame);
    frame.end_frame();

    before_present();
    frame.present()?;
    Ok(AppControl::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Vec2;
    use crate::device::headless::HeadlessBackend;
    use crate::input::{InputEvent, Key, KeyState};
    use crate::render::LineSink;
    use crate::time::FrameClock;

    #[derive(Default)]
    struct Probe {
        updates: u32,
        renders: u32,
        exit_on_space: bool,
    }

    impl<B: Backend> App<B> for Probe {
        fn on_update(&mut self, _time: FrameTime, input: FrameInput<'_>) -> AppControl {
            self.updates += 1;
            if self.exit_on_space && input.edges.pressed(Key::Space) {
                AppControl::Exit
            } else {
                AppControl::Continue
            }
        }

        fn on_render(&mut self, frame: &mut FrameContext<B>) {
            self.renders += 1;
            let mut lines = frame.lines();
            lines.line(Vec2::new(0.0, 0.5), Vec2::new(8.0, 0.5), Color::WHITE);
            lines.flush();
        }
    }

    fn time() -> FrameTime {
        FrameClock::new().tick()
    }

    #[test]
    fn frame_runs_update_then_render() {
        let mut frame = FrameContext::new(HeadlessBackend::with_size(16, 16), false).unwrap();
        let mut app = Probe::default();
        let (state, edges) = (InputState::default(), InputFrame::default());
        let input = FrameInput { state: &state, edges: &edges };

        let mut presented = 0;
        for _ in 0..3 {
            let control = drive_frame(&mut frame, &mut app, time(), input, || presented += 1).unwrap();
            assert_eq!(control, AppControl::Continue);
        }

        assert_eq!((app.updates, app.renders, presented), (3, 3, 3));
        assert_eq!(frame.stats().frames, 3);
        assert_eq!(frame.backend().stats().validation_errors, 0);
    }

    #[test]
    fn exit_from_update_skips_rendering() {
        let mut frame = FrameContext::new(HeadlessBackend::with_size(16, 16), false).unwrap();
        let mut app = Probe {
            exit_on_space: true,
            ..Probe::default()
        };
        let mut state = InputState::default();
        let mut edges = InputFrame::default();
        state.apply_event(
            &mut edges,
            InputEvent::Key {
                key: Key::Space,
                state: KeyState::Pressed,
                repeat: false,
            },
        );

        let input = FrameInput { state: &state, edges: &edges };
        let control = drive_frame(&mut frame, &mut app, time(), input, || {}).unwrap();

        assert_eq!(control, AppControl::Exit);
        assert_eq!(app.renders, 0);
        assert_eq!(frame.stats().frames, 0);
    }
}
