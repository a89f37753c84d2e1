//! Circles, rotating squares and regular polygons built from line segments.
//!
//! SPACE cycles through the four scenes; the demo starts on the combined one.

use std::f32::consts::{FRAC_PI_2, TAU};

use neon_engine::coords::Vec2;
use neon_engine::core::{App, AppConfig, AppControl, FrameContext, FrameInput};
use neon_engine::device::Backend;
use neon_engine::input::Key;
use neon_engine::paint::Color;
use neon_engine::render::{draw_circle, draw_polygon, draw_rect, LineSink, LineStyle};
use neon_engine::time::FrameTime;

const CENTER: Vec2 = Vec2::new(400.0, 300.0);

pub fn config() -> AppConfig {
    AppConfig::new("NeonVector - Basic Shapes", 800, 600)
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ShapesScene {
    Circles,
    Squares,
    Polygons,
    All,
}

impl ShapesScene {
    pub fn next(self) -> Self {
        match self {
            ShapesScene::Circles => ShapesScene::Squares,
            ShapesScene::Squares => ShapesScene::Polygons,
            ShapesScene::Polygons => ShapesScene::All,
            ShapesScene::All => ShapesScene::Circles,
        }
    }
}

#[derive(Debug)]
pub struct BasicShapes {
    time: f32,
    scene: ShapesScene,
}

impl Default for BasicShapes {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicShapes {
    pub fn new() -> Self {
        Self {
            time: 0.0,
            scene: ShapesScene::All,
        }
    }

    #[inline]
    pub fn scene(&self) -> ShapesScene {
        self.scene
    }

    pub fn draw<S: LineSink + ?Sized>(&self, sink: &mut S) {
        match self.scene {
            ShapesScene::Circles => self.circles(sink),
            ShapesScene::Squares => self.squares(sink),
            ShapesScene::Polygons => self.polygons(sink),
            ShapesScene::All => self.all(sink),
        }
    }

    fn circles<S: LineSink + ?Sized>(&self, sink: &mut S) {
        let style = LineStyle::new(2.0, 1.0);
        for i in 1..=5u32 {
            let color = Color::rgb(
                if i % 3 == 0 { 1.0 } else { 0.0 },
                if i % 3 == 1 { 1.0 } else { 0.0 },
                if i % 3 == 2 { 1.0 } else { 0.0 },
            );
            draw_circle(sink, CENTER, i as f32 * 30.0, color, 64, style);
        }

        let orbit = CENTER + Vec2::from_angle(self.time) * 100.0;
        draw_circle(sink, orbit, 20.0, Color::YELLOW, 32, LineStyle::new(3.0, 1.0));
    }

    fn squares<S: LineSink + ?Sized>(&self, sink: &mut S) {
        for i in 0..5u32 {
            let angle = self.time + i as f32 * 0.3;
            let half = (50.0 + i as f32 * 30.0) / 2.0;
            let corners: Vec<Vec2> = (0..4)
                .map(|j| CENTER + Vec2::from_angle(angle + j as f32 * FRAC_PI_2) * half)
                .collect();

            let color = Color::rgb(
                if i % 2 == 0 { 1.0 } else { 0.0 },
                1.0,
                if i % 2 == 1 { 1.0 } else { 0.0 },
            );
            draw_polygon(sink, &corners, color, true, LineStyle::new(2.0, 1.0));
        }
    }

    fn polygons<S: LineSink + ?Sized>(&self, sink: &mut S) {
        let spin = self.time * 0.5;
        for sides in 3..=8u32 {
            let radius = 50.0 + (sides - 3) as f32 * 15.0;
            let t = (sides - 3) as f32 / 5.0;
            draw_polygon(
                sink,
                &regular_polygon(CENTER, radius, sides, spin),
                Color::rgb(t, 1.0 - t, 0.5),
                true,
                LineStyle::new(2.0, 1.0),
            );
        }
    }

    fn all<S: LineSink + ?Sized>(&self, sink: &mut S) {
        let style = LineStyle::new(2.0, 1.0);
        draw_circle(sink, CENTER, 100.0, Color::CYAN, 32, style);
        draw_circle(sink, CENTER, 150.0, Color::MAGENTA, 64, style);
        draw_rect(sink, Vec2::new(200.0, 200.0), Vec2::new(400.0, 200.0), Color::YELLOW, style);

        let pentagon = regular_polygon(CENTER, 50.0, 5, self.time - FRAC_PI_2);
        draw_polygon(sink, &pentagon, Color::GREEN, true, LineStyle::new(3.0, 1.0));
    }
}

fn regular_polygon(center: Vec2, radius: f32, sides: u32, rotation: f32) -> Vec<Vec2> {
    (0..sides)
        .map(|i| center + Vec2::from_angle(i as f32 / sides as f32 * TAU + rotation) * radius)
        .collect()
}

impl<B: Backend> App<B> for BasicShapes {
    fn on_update(&mut self, time: FrameTime, input: FrameInput<'_>) -> AppControl {
        if input.edges.pressed(Key::Space) {
            self.scene = self.scene.next();
            log::info!("scene: {:?}", self.scene);
        }
        self.time += time.dt;
        AppControl::Continue
    }

    fn on_render(&mut self, frame: &mut FrameContext<B>) {
        let mut lines = frame.lines();
        self.draw(&mut lines);
        lines.flush();
    }

    fn on_shutdown(&mut self, _frame: &mut FrameContext<B>) {
        println!("Basic shapes finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use neon_engine::device::headless::HeadlessConfig;

    #[derive(Default)]
    struct Count(usize);

    impl LineSink for Count {
        fn add_line(&mut self, _: Vec2, _: Vec2, _: Color, _: LineStyle) {
            self.0 += 1;
        }
    }

    fn lines_in(scene: ShapesScene) -> usize {
        let mut app = BasicShapes::new();
        app.scene = scene;
        let mut count = Count::default();
        app.draw(&mut count);
        count.0
    }

    #[test]
    fn scenes_cycle_back_to_start() {
        let mut scene = ShapesScene::All;
        for _ in 0..4 {
            scene = scene.next();
        }
        assert_eq!(scene, ShapesScene::All);
        assert_eq!(ShapesScene::All.next(), ShapesScene::Circles);
    }

    #[test]
    fn line_counts_per_scene() {
        assert_eq!(lines_in(ShapesScene::Circles), 5 * 64 + 32);
        assert_eq!(lines_in(ShapesScene::Squares), 5 * 4);
        assert_eq!(lines_in(ShapesScene::Polygons), (3..=8).sum::<usize>());
        assert_eq!(lines_in(ShapesScene::All), 32 + 64 + 4 + 5);
    }

    #[test]
    fn space_edges_advance_the_scene_once_each() {
        let mut frame = testing::frame(HeadlessConfig::default());
        let mut app = BasicShapes::new();
        assert_eq!(app.scene(), ShapesScene::All);

        testing::step(&mut frame, &mut app, 0, &[Key::Space]);
        assert_eq!(app.scene(), ShapesScene::Circles);

        testing::step(&mut frame, &mut app, 1, &[]);
        assert_eq!(app.scene(), ShapesScene::Circles);

        testing::step(&mut frame, &mut app, 2, &[Key::Space]);
        assert_eq!(app.scene(), ShapesScene::Squares);

        assert_eq!(frame.backend().stats().validation_errors, 0);
    }
}
