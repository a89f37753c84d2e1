use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Fullscreen, Window, WindowId};

use crate::core::{drive_frame, App, AppConfig, AppControl, FrameContext, FrameInput};
use crate::device::{GpuInit, WgpuBackend};
use crate::input::platform::translate_window_event;
use crate::input::{InputEvent, InputFrame, InputState, Key, KeyState};
use crate::time::FrameClock;

/// Entry point for the windowed host loop.
pub struct Runtime;

impl Runtime {
    /// Opens one window and drives `app` until it exits, the window closes
    /// or ESC is pressed.
    ///
    /// Returns an error if the window or GPU could not be initialized, or if
    /// the device failed fatally while running.
    pub fn run<A>(config: AppConfig, gpu_init: GpuInit, app: A) -> Result<()>
    where
        A: for<'w> App<WgpuBackend<'w>> + 'static,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState {
            config,
            gpu_init,
            app,
            window: None,
            failure: None,
        };

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[self_referencing]
struct WindowEntry {
    input_state: InputState,
    input_frame: InputFrame,
    clock: FrameClock,

    window: Window,

    #[borrows(window)]
    #[covariant]
    frame: FrameContext<WgpuBackend<'this>>,
}

struct AppState<A> {
    config: AppConfig,
    gpu_init: GpuInit,
    app: A,

    window: Option<WindowEntry>,
    failure: Option<anyhow::Error>,
}

impl<A> AppState<A>
where
    A: for<'w> App<WgpuBackend<'w>> + 'static,
{
    fn create_window_entry(&mut self, event_loop: &ActiveEventLoop) -> Result<WindowEntry> {
        let mut attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(LogicalSize::new(
                f64::from(self.config.width),
                f64::from(self.config.height),
            ));
        if self.config.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let gpu_init = self.gpu_init.clone();
        let vsync = self.config.vsync;

        let mut entry = WindowEntryTryBuilder {
            input_state: InputState::default(),
            input_frame: InputFrame::default(),
            clock: FrameClock::default(),
            window,
            frame_builder: |w| {
                let backend = pollster::block_on(WgpuBackend::new(w, gpu_init))?;
                FrameContext::new(backend, vsync).context("failed to create frame context")
            },
        }
        .try_build()?;

        let app = &mut self.app;
        entry.with_frame_mut(|frame| app.on_init(frame))?;

        log::info!(
            "window `{}` ready ({}x{}, vsync {})",
            self.config.title,
            self.config.width,
            self.config.height,
            self.config.vsync
        );
        Ok(entry)
    }

    /// Drains the GPU, lets the app release its resources and closes.
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut entry) = self.window.take() {
            let app = &mut self.app;
            entry.with_frame_mut(|frame| {
                if let Err(err) = frame.wait_for_gpu() {
                    log::error!("failed to drain the GPU before shutdown: {err}");
                }
                app.on_shutdown(frame);
                frame.shutdown();
            });
            log::info!("shut down");
        }
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.failure = Some(err);
        self.shutdown(event_loop);
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: for<'w> App<WgpuBackend<'w>> + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        match self.create_window_entry(event_loop) {
            Ok(entry) => {
                entry.with_window(|w| w.request_redraw());
                self.window = Some(entry);
            }
            Err(err) => self.fail(event_loop, err.context("failed to initialize")),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw: every demo animates.
        if let Some(entry) = &self.window {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        // Split borrows to avoid `self` capture inside `ouroboros` closures.
        let (app, window) = (&mut self.app, &mut self.window);
        let Some(entry) = window.as_mut() else {
            return;
        };

        match &event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),

            WindowEvent::Resized(size) => {
                let (width, height) = (size.width, size.height);
                let resized = entry.with_frame_mut(|frame| {
                    frame.resize(width, height)?;
                    if width > 0 && height > 0 {
                        app.on_resize(frame, width, height);
                    }
                    Ok::<_, crate::device::GpuError>(())
                });
                match resized {
                    Ok(()) => entry.with_window(|w| w.request_redraw()),
                    Err(err) => self.fail(event_loop, anyhow::Error::new(err).context("resize failed")),
                }
            }

            WindowEvent::RedrawRequested => {
                let outcome = entry.with_mut(|fields| {
                    let time = fields.clock.tick();
                    let input = FrameInput {
                        state: &*fields.input_state,
                        edges: &*fields.input_frame,
                    };
                    let window = fields.window;
                    let result = drive_frame(fields.frame, app, time, input, || {
                        window.pre_present_notify()
                    });

                    // Edges are consumed by exactly one update.
                    fields.input_frame.clear();
                    result
                });

                match outcome {
                    Ok(AppControl::Continue) => {}
                    Ok(AppControl::Exit) => self.shutdown(event_loop),
                    Err(err) => self.fail(event_loop, anyhow::Error::new(err).context("fatal device error")),
                }
            }

            _ => {
                let Some(ev) = translate_window_event(&event) else {
                    return;
                };
                let escape = matches!(
                    ev,
                    InputEvent::Key {
                        key: Key::Escape,
                        state: KeyState::Pressed,
                        ..
                    }
                );

                entry.with_mut(|fields| fields.input_state.apply_event(fields.input_frame, ev));

                if escape {
                    log::info!("escape pressed; exiting");
                    self.shutdown(event_loop);
                }
            }
        }
    }
}
