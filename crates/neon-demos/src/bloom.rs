//! Rainbow fan, pulsing circle and hexagon run through the bloom
//! post-process. SPACE toggles the effect.

use std::f32::consts::TAU;

use neon_engine::coords::Vec2;
use neon_engine::core::{App, AppConfig, AppControl, FrameContext, FrameInput};
use neon_engine::device::{Backend, GpuError};
use neon_engine::effects::{BloomPipeline, BloomSettings};
use neon_engine::input::Key;
use neon_engine::paint::Color;
use neon_engine::post::PostProcessOrchestrator;
use neon_engine::render::{draw_circle, draw_polygon, LineSink, LineStyle};
use neon_engine::time::FrameTime;

const RAYS: u32 = 24;
const INNER_RADIUS: f32 = 50.0;
const OUTER_RADIUS: f32 = 300.0;
const HEX_RADIUS: f32 = 150.0;
/// Degrees per second.
const SPIN: f32 = 30.0;

pub const SETTINGS: BloomSettings = BloomSettings {
    threshold: 0.8,
    intensity: 1.5,
    bloom_strength: 1.2,
    blur_radius: 2.5,
};

pub fn config() -> AppConfig {
    AppConfig::new("NeonVector - Bloom Demo", 1280, 720)
}

#[derive(Debug)]
pub struct BloomDemo {
    rotation_deg: f32,
    time: f32,
    post: PostProcessOrchestrator,
    bloom: BloomPipeline,
    bloom_enabled: bool,
}

impl Default for BloomDemo {
    fn default() -> Self {
        Self::new()
    }
}

impl BloomDemo {
    pub fn new() -> Self {
        Self {
            rotation_deg: 0.0,
            time: 0.0,
            post: PostProcessOrchestrator::new(),
            bloom: BloomPipeline::with_settings(SETTINGS),
            bloom_enabled: true,
        }
    }

    #[inline]
    pub fn bloom_enabled(&self) -> bool {
        self.bloom_enabled
    }

    /// Bloom is applied only when enabled and both stages came up.
    #[inline]
    pub fn bloom_active(&self) -> bool {
        self.bloom_enabled && self.post.is_initialized() && self.bloom.is_initialized()
    }

    #[inline]
    pub fn rotation(&self) -> f32 {
        self.rotation_deg
    }

    pub fn draw<S: LineSink + ?Sized>(&self, sink: &mut S, center: Vec2) {
        let rays = LineStyle::new(3.0, 1.0);
        for i in 0..RAYS {
            let angle = (self.rotation_deg + i as f32 * 360.0 / RAYS as f32).to_radians();
            let dir = Vec2::from_angle(angle);
            let color = Color::from_hsv(i as f32 / RAYS as f32, 1.0, 1.0);
            sink.add_line(center + dir * INNER_RADIUS, center + dir * OUTER_RADIUS, color, rays);
        }

        let pulse = (self.time * 3.0).sin() * 0.3 + 1.0;
        draw_circle(sink, center, 30.0 * pulse, Color::CYAN, 32, LineStyle::new(2.0, 1.0));

        let offset = (-self.rotation_deg * 0.5).to_radians();
        let hexagon: Vec<Vec2> = (0..6)
            .map(|i| center + Vec2::from_angle(offset + i as f32 * TAU / 6.0) * HEX_RADIUS)
            .collect();
        draw_polygon(sink, &hexagon, Color::MAGENTA, true, LineStyle::new(2.0, 1.0));
    }

    fn setup<B: Backend>(&mut self, frame: &mut FrameContext<B>) {
        let (width, height) = frame.size();
        let format = frame.format();

        if self.post.initialize(Some(frame.device()), width, height, format).is_err() {
            log::warn!("post-process unavailable; rendering without bloom");
            return;
        }
        if self.bloom.initialize(Some(frame.device()), width, height, format).is_err() {
            log::warn!("bloom unavailable; continuing without it");
        }
    }

    fn render_post<B: Backend>(&mut self, frame: &mut FrameContext<B>) -> Result<(), GpuError> {
        let (width, height) = frame.size();
        let center = Vec2::new(width as f32 / 2.0, height as f32 / 2.0);

        self.post.begin_scene(frame.stream())?;
        {
            let mut lines = frame.lines();
            self.draw(&mut lines, center);
            lines.flush();
        }

        if self.bloom_enabled && self.bloom.is_initialized() {
            self.post.apply_bloom(frame.stream(), &mut self.bloom)?;
        }

        let target = frame.target();
        self.post.present(frame.stream(), target)
    }
}

impl<B: Backend> App<B> for BloomDemo {
    fn on_init(&mut self, frame: &mut FrameContext<B>) -> anyhow::Result<()> {
        self.setup(frame);
        println!("SPACE toggles bloom");
        Ok(())
    }

    fn on_update(&mut self, time: FrameTime, input: FrameInput<'_>) -> AppControl {
        self.rotation_deg += SPIN * time.dt;
        if self.rotation_deg >= 360.0 {
            self.rotation_deg -= 360.0;
        }
        self.time += time.dt;

        if input.edges.pressed(Key::Space) {
            self.bloom_enabled = !self.bloom_enabled;
            log::info!("bloom {}", if self.bloom_enabled { "on" } else { "off" });
        }
        AppControl::Continue
    }

    fn on_render(&mut self, frame: &mut FrameContext<B>) {
        if self.post.is_initialized() {
            if let Err(err) = self.render_post(frame) {
                log::error!("post-processed frame failed: {err}");
            }
            return;
        }

        let (width, height) = frame.size();
        let center = Vec2::new(width as f32 / 2.0, height as f32 / 2.0);
        let mut lines = frame.lines();
        self.draw(&mut lines, center);
        lines.flush();
    }

    fn on_resize(&mut self, frame: &mut FrameContext<B>, width: u32, height: u32) {
        if self.post.is_initialized() {
            if let Err(err) = self.post.resize(frame.device(), width, height) {
                log::error!("post-process resize failed: {err}");
                return;
            }
        }

        let format = frame.format();
        if self.bloom.is_initialized() || self.post.is_initialized() {
            if let Err(err) = self.bloom.initialize(Some(frame.device()), width, height, format) {
                log::error!("bloom resize failed: {err}");
            }
        }
    }

    fn on_shutdown(&mut self, _frame: &mut FrameContext<B>) {
        self.bloom.shutdown();
        self.post.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use neon_engine::device::headless::HeadlessConfig;
    use neon_engine::shaders::{names, ShaderLibrary};

    fn small() -> HeadlessConfig {
        HeadlessConfig {
            width: 160,
            height: 120,
            ..HeadlessConfig::default()
        }
    }

    #[derive(Default)]
    struct Count(usize);

    impl LineSink for Count {
        fn add_line(&mut self, _: Vec2, _: Vec2, _: Color, _: LineStyle) {
            self.0 += 1;
        }
    }

    #[test]
    fn scene_is_rays_circle_and_hexagon() {
        let mut count = Count::default();
        BloomDemo::new().draw(&mut count, Vec2::new(640.0, 360.0));
        assert_eq!(count.0, 24 + 32 + 6);
    }

    #[test]
    fn rotation_wraps_below_a_full_turn() {
        let mut frame = testing::frame(small());
        let mut app = BloomDemo::new();
        app.on_init(&mut frame).unwrap();

        // 13 s at 30 deg/s is 390 degrees.
        let input_state = Default::default();
        let edges = Default::default();
        let input = FrameInput { state: &input_state, edges: &edges };
        let long = FrameTime { dt: 13.0, elapsed: 13.0, frame_index: 0 };
        <BloomDemo as App<neon_engine::device::headless::HeadlessBackend>>::on_update(
            &mut app, long, input,
        );
        approx::assert_relative_eq!(app.rotation(), 30.0, epsilon = 1e-3);
    }

    #[test]
    fn bloom_frames_light_the_backbuffer() {
        let mut frame = testing::frame(small());
        let mut app = BloomDemo::new();
        app.on_init(&mut frame).unwrap();
        assert!(app.bloom_active());

        for i in 0..3 {
            testing::step(&mut frame, &mut app, i, &[]);
        }

        let stats = frame.backend().stats();
        assert_eq!(stats.validation_errors, 0);
        assert_eq!(stats.presents, 3);
        let lit = frame.backend().backbuffer_image(0).unwrap().count_lit(0.1);
        assert!(lit > 0);

        app.on_shutdown(&mut frame);
        frame.shutdown();
    }

    #[test]
    fn space_toggles_bloom() {
        let mut frame = testing::frame(small());
        let mut app = BloomDemo::new();
        app.on_init(&mut frame).unwrap();

        testing::step(&mut frame, &mut app, 0, &[Key::Space]);
        assert!(!app.bloom_enabled());
        assert!(!app.bloom_active());

        testing::step(&mut frame, &mut app, 1, &[Key::Space]);
        assert!(app.bloom_enabled());
        assert_eq!(frame.backend().stats().validation_errors, 0);
    }

    #[test]
    fn broken_bright_pass_degrades_to_plain_post() {
        let mut shaders = ShaderLibrary::embedded_only();
        shaders.insert(names::BRIGHT_PASS, "// broken");
        let mut frame = testing::frame(HeadlessConfig { shaders, ..small() });

        let mut app = BloomDemo::new();
        app.on_init(&mut frame).unwrap();
        assert!(!app.bloom_active());

        testing::step(&mut frame, &mut app, 0, &[]);
        let stats = frame.backend().stats();
        assert_eq!(stats.presents, 1);
        assert_eq!(stats.validation_errors, 0);
        assert!(frame.backend().backbuffer_image(0).unwrap().count_lit(0.1) > 0);
    }
}
