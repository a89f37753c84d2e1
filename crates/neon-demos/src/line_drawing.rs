//! Static frame, diagonals and a spinning fan of radial lines.

use std::f32::consts::TAU;

use neon_engine::coords::Vec2;
use neon_engine::core::{App, AppConfig, AppControl, FrameContext, FrameInput};
use neon_engine::device::Backend;
use neon_engine::paint::Color;
use neon_engine::render::{LineSink, LineStyle};
use neon_engine::time::FrameTime;

const CENTER: Vec2 = Vec2::new(400.0, 300.0);
const RADIUS: f32 = 200.0;
const SPOKES: u32 = 12;

pub fn config() -> AppConfig {
    AppConfig::new("NeonVector - Line Drawing", 800, 600)
}

#[derive(Debug, Default)]
pub struct LineDrawing {
    time: f32,
}

impl LineDrawing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one frame of the scene into `sink`.
    pub fn draw<S: LineSink + ?Sized>(&self, sink: &mut S) {
        let frame = LineStyle::new(2.0, 1.0);
        let (tl, tr) = (Vec2::new(100.0, 100.0), Vec2::new(700.0, 100.0));
        let (bl, br) = (Vec2::new(100.0, 500.0), Vec2::new(700.0, 500.0));

        sink.add_line(tl, tr, Color::CYAN, frame);
        sink.add_line(tl, bl, Color::MAGENTA, frame);
        sink.add_line(tr, br, Color::YELLOW, frame);
        sink.add_line(bl, br, Color::GREEN, frame);

        let diagonal = LineStyle::new(3.0, 1.0);
        sink.add_line(tl, br, Color::RED, diagonal);
        sink.add_line(tr, bl, Color::BLUE, diagonal);

        for i in 0..SPOKES {
            let angle = i as f32 / SPOKES as f32 * TAU + self.time;
            let end = CENTER + Vec2::from_angle(angle) * RADIUS;
            sink.add_line(CENTER, end, spoke_color(angle), frame);
        }
    }
}

/// Color of a spoke, derived from its angle.
fn spoke_color(angle: f32) -> Color {
    Color::rgb(
        (angle.sin() + 1.0) * 0.5,
        (angle.cos() + 1.0) * 0.5,
        ((angle * 2.0).sin() + 1.0) * 0.5,
    )
}

impl<B: Backend> App<B> for LineDrawing {
    fn on_update(&mut self, time: FrameTime, _input: FrameInput<'_>) -> AppControl {
        self.time += time.dt;
        AppControl::Continue
    }

    fn on_render(&mut self, frame: &mut FrameContext<B>) {
        let mut lines = frame.lines();
        self.draw(&mut lines);
        lines.flush();
    }

    fn on_shutdown(&mut self, _frame: &mut FrameContext<B>) {
        println!("Line drawing finished");
    }
}
