//! CPU reference kernels for the headless device.
//!
//! Each kernel mirrors the WGSL stage of the same name. Images hold linear
//! `f32` RGBA; normalized formats clamp on write, as the GPU does on store.

use crate::coords::{ScissorRect, Viewport};
use crate::device::BlendMode;
use crate::effects::{BloomParams, BlurParams};
use crate::render::{LineVertex, ScreenConstants};

/// Gaussian weights of the 9-tap blur: center, then each symmetric pair.
pub const BLUR_WEIGHTS: [f32; 5] = [0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216];

/// Rec. 709 luma coefficients used by the bright pass.
pub const LUMINANCE: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// CPU-side image.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<[f32; 4]>,
}

impl Image {
    pub fn new(width: u32, height: u32, fill: [f32; 4]) -> Self {
        Self {
            width,
            height,
            pixels: vec![fill; width as usize * height as usize],
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[self.index(x, y)])
    }

    /// Number of pixels whose brightest color channel exceeds `threshold`.
    pub fn count_lit(&self, threshold: f32) -> usize {
        self.pixels
            .iter()
            .filter(|p| p[0].max(p[1]).max(p[2]) > threshold)
            .count()
    }

    /// Bilinear sample with clamp-to-edge addressing; `uv` in `0..1`, v down.
    pub fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        if self.pixels.is_empty() {
            return [0.0; 4];
        }

        let x = u * self.width as f32 - 0.5;
        let y = v * self.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let tl = self.clamped(x0 as i64, y0 as i64);
        let tr = self.clamped(x0 as i64 + 1, y0 as i64);
        let bl = self.clamped(x0 as i64, y0 as i64 + 1);
        let br = self.clamped(x0 as i64 + 1, y0 as i64 + 1);

        let mut out = [0.0; 4];
        for c in 0..4 {
            let top = tl[c] + (tr[c] - tl[c]) * fx;
            let bottom = bl[c] + (br[c] - bl[c]) * fx;
            out[c] = top + (bottom - top) * fy;
        }
        out
    }

    pub(crate) fn fill(&mut self, color: [f32; 4]) {
        self.pixels.fill(color);
    }

    fn clamped(&self, x: i64, y: i64) -> [f32; 4] {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.pixels[self.index(x, y)]
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn write(&mut self, x: u32, y: u32, src: [f32; 4], blend: BlendMode, clamp: bool) {
        let i = self.index(x, y);
        let dst = self.pixels[i];
        let mut out = match blend {
            BlendMode::Replace => src,
            BlendMode::Alpha => {
                let a = src[3];
                [
                    src[0] * a + dst[0] * (1.0 - a),
                    src[1] * a + dst[1] * (1.0 - a),
                    src[2] * a + dst[2] * (1.0 - a),
                    a + dst[3] * (1.0 - a),
                ]
            }
        };
        if clamp {
            for c in &mut out {
                *c = c.clamp(0.0, 1.0);
            }
        }
        self.pixels[i] = out;
    }
}

/// Pixel rectangle a draw may touch, `x1`/`y1` exclusive.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct Region {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Region {
    /// Viewport ∩ scissor ∩ image bounds.
    pub(crate) fn of(image: &Image, viewport: Viewport, scissor: Option<ScissorRect>) -> Self {
        let (w, h) = (image.width, image.height);

        let mut x0 = (viewport.x.max(0.0).floor() as u32).min(w);
        let mut y0 = (viewport.y.max(0.0).floor() as u32).min(h);
        let mut x1 = ((viewport.x + viewport.width).max(0.0).ceil() as u32).min(w);
        let mut y1 = ((viewport.y + viewport.height).max(0.0).ceil() as u32).min(h);

        if let Some(s) = scissor {
            x0 = x0.max(s.x);
            y0 = y0.max(s.y);
            x1 = x1.min(s.x.saturating_add(s.width));
            y1 = y1.min(s.y.saturating_add(s.height));
        }

        Self { x0, y0, x1: x1.max(x0), y1: y1.max(y0) }
    }

    #[inline]
    fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x0 as i64 && x < self.x1 as i64 && y >= self.y0 as i64 && y < self.y1 as i64
    }

    /// Liang-Barsky clip of `a → b` to the region's bounds, in f64 so huge
    /// coordinates keep pixel precision. `None` when nothing is inside or an
    /// endpoint is not finite.
    fn clip_segment(&self, a: (f32, f32), b: (f32, f32)) -> Option<((f32, f32), (f32, f32))> {
        if self.x0 >= self.x1 || self.y0 >= self.y1 {
            return None;
        }
        if ![a.0, a.1, b.0, b.1].iter().all(|v| v.is_finite()) {
            return None;
        }

        let (ax, ay) = (f64::from(a.0), f64::from(a.1));
        let (dx, dy) = (f64::from(b.0) - ax, f64::from(b.1) - ay);
        let edges = [
            (-dx, ax - f64::from(self.x0)),
            (dx, f64::from(self.x1) - ax),
            (-dy, ay - f64::from(self.y0)),
            (dy, f64::from(self.y1) - ay),
        ];

        let (mut t0, mut t1) = (0.0f64, 1.0f64);
        for (p, q) in edges {
            if p == 0.0 {
                if q < 0.0 {
                    return None;
                }
            } else if p < 0.0 {
                t0 = t0.max(q / p);
            } else {
                t1 = t1.min(q / p);
            }
            if t0 > t1 {
                return None;
            }
        }

        let at = |t: f64| ((ax + dx * t) as f32, (ay + dy * t) as f32);
        Some((at(t0), at(t1)))
    }
}

// ── line pass ─────────────────────────────────────────────────────────────

/// Rasterizes a line list as one-pixel DDA segments.
///
/// Positions are pixel-space relative to `screen`, mapped onto `viewport`.
/// Output color is `rgb * glow`, as the line fragment stage writes it.
pub(crate) fn raster_lines(
    target: &mut Image,
    vertices: &[LineVertex],
    screen: ScreenConstants,
    viewport: Viewport,
    region: Region,
    blend: BlendMode,
    clamp: bool,
) {
    let sx = viewport.width / screen.size[0].max(1.0);
    let sy = viewport.height / screen.size[1].max(1.0);
    let to_pixels = |p: [f32; 2]| (viewport.x + p[0] * sx, viewport.y + p[1] * sy);

    for pair in vertices.chunks_exact(2) {
        let (a, b) = (pair[0], pair[1]);
        let color = [
            a.color[0] * a.glow,
            a.color[1] * a.glow,
            a.color[2] * a.glow,
            a.color[3],
        ];

        let Some(((x0, y0), (x1, y1))) =
            region.clip_segment(to_pixels(a.position), to_pixels(b.position))
        else {
            continue;
        };
        let (dx, dy) = (x1 - x0, y1 - y0);
        let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as u32;

        let mut last = None;
        for i in 0..=steps {
            let px = (x0 + dx * i as f32 / steps as f32).floor() as i64;
            let py = (y0 + dy * i as f32 / steps as f32).floor() as i64;
            if last == Some((px, py)) || !region.contains(px, py) {
                continue;
            }
            last = Some((px, py));
            target.write(px as u32, py as u32, color, blend, clamp);
        }
    }
}

// ── fullscreen passes ─────────────────────────────────────────────────────

/// Pixel stage of a fullscreen pass together with its inputs.
pub(crate) enum FullscreenKernel<'a> {
    BrightPass { source: &'a Image, params: BloomParams },
    Blur { source: &'a Image, params: BlurParams },
    Composite { scene: &'a Image, bloom: &'a Image, params: BloomParams },
    Blit { source: &'a Image },
}

impl FullscreenKernel<'_> {
    fn shade(&self, u: f32, v: f32) -> [f32; 4] {
        match *self {
            FullscreenKernel::BrightPass { source, params } => bright_pass(source, params, u, v),
            FullscreenKernel::Blur { source, params } => blur(source, params, u, v),
            FullscreenKernel::Composite { scene, bloom, params } => {
                let s = scene.sample(u, v);
                let b = bloom.sample(u, v);
                let k = params.bloom_strength;
                [s[0] + b[0] * k, s[1] + b[1] * k, s[2] + b[2] * k, s[3]]
            }
            FullscreenKernel::Blit { source } => source.sample(u, v),
        }
    }
}

/// Shades every pixel center of `region`, with uv spanning `viewport`.
pub(crate) fn run_fullscreen(
    target: &mut Image,
    kernel: &FullscreenKernel<'_>,
    viewport: Viewport,
    region: Region,
    blend: BlendMode,
    clamp: bool,
) {
    let vw = viewport.width.max(f32::MIN_POSITIVE);
    let vh = viewport.height.max(f32::MIN_POSITIVE);

    for y in region.y0..region.y1 {
        let v = (y as f32 + 0.5 - viewport.y) / vh;
        for x in region.x0..region.x1 {
            let u = (x as f32 + 0.5 - viewport.x) / vw;
            let color = kernel.shade(u, v);
            target.write(x, y, color, blend, clamp);
        }
    }
}

fn bright_pass(source: &Image, params: BloomParams, u: f32, v: f32) -> [f32; 4] {
    let c = source.sample(u, v);
    let luminance = c[0] * LUMINANCE[0] + c[1] * LUMINANCE[1] + c[2] * LUMINANCE[2];

    if luminance > params.threshold {
        let k = params.intensity;
        [c[0] * k, c[1] * k, c[2] * k, 1.0]
    } else {
        [0.0, 0.0, 0.0, 1.0]
    }
}

fn blur(source: &Image, params: BlurParams, u: f32, v: f32) -> [f32; 4] {
    let step_u = params.direction[0] * params.texel_size[0] * params.blur_radius;
    let step_v = params.direction[1] * params.texel_size[1] * params.blur_radius;

    let center = source.sample(u, v);
    let mut sum = [
        center[0] * BLUR_WEIGHTS[0],
        center[1] * BLUR_WEIGHTS[0],
        center[2] * BLUR_WEIGHTS[0],
    ];

    for (i, w) in BLUR_WEIGHTS.iter().enumerate().skip(1) {
        let (ou, ov) = (step_u * i as f32, step_v * i as f32);
        let plus = source.sample(u + ou, v + ov);
        let minus = source.sample(u - ou, v - ov);
        for c in 0..3 {
            sum[c] += (plus[c] + minus[c]) * w;
        }
    }

    [sum[0], sum[1], sum[2], 1.0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Vec2;
    use crate::paint::Color;
    use approx::assert_relative_eq;

    const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

    fn full(image: &Image) -> (Viewport, Region) {
        let vp = Viewport::full(image.width(), image.height());
        (vp, Region::of(image, vp, None))
    }

    // ── sampling ──────────────────────────────────────────────────────────

    #[test]
    fn sample_at_texel_center_is_exact() {
        let mut img = Image::new(2, 1, BLACK);
        img.write(1, 0, [1.0, 0.5, 0.25, 1.0], BlendMode::Replace, true);

        assert_eq!(img.sample(0.75, 0.5), [1.0, 0.5, 0.25, 1.0]);
        assert_eq!(img.sample(0.25, 0.5), BLACK);
    }

    #[test]
    fn sample_between_texels_interpolates() {
        let mut img = Image::new(2, 1, BLACK);
        img.write(1, 0, [1.0, 1.0, 1.0, 1.0], BlendMode::Replace, true);
        assert_relative_eq!(img.sample(0.5, 0.5)[0], 0.5);
    }

    #[test]
    fn sample_clamps_outside() {
        let img = Image::new(4, 4, [0.2, 0.2, 0.2, 1.0]);
        assert_eq!(img.sample(-3.0, 7.0), [0.2, 0.2, 0.2, 1.0]);
    }

    // ── lines ─────────────────────────────────────────────────────────────

    #[test]
    fn horizontal_line_covers_its_span() {
        let mut img = Image::new(16, 4, BLACK);
        let (vp, region) = full(&img);
        let verts = [
            LineVertex::new(Vec2::new(0.0, 1.0), Color::RED, 1.0, 1.0),
            LineVertex::new(Vec2::new(10.0, 1.0), Color::RED, 1.0, 1.0),
        ];

        raster_lines(&mut img, &verts, ScreenConstants::new(16, 4), vp, region, BlendMode::Alpha, true);

        for x in 0..=10 {
            assert_eq!(img.pixel(x, 1), Some([1.0, 0.0, 0.0, 1.0]), "x={x}");
        }
        assert_eq!(img.pixel(11, 1), Some(BLACK));
        assert_eq!(img.count_lit(0.5), 11);
    }

    #[test]
    fn glow_scales_color_and_clamps_on_normalized_targets() {
        let mut hdr = Image::new(4, 1, BLACK);
        let mut ldr = hdr.clone();
        let (vp, region) = full(&hdr);
        let verts = [
            LineVertex::new(Vec2::new(0.0, 0.0), Color::rgb(0.5, 0.5, 0.5), 1.0, 3.0),
            LineVertex::new(Vec2::new(0.0, 0.0), Color::rgb(0.5, 0.5, 0.5), 1.0, 3.0),
        ];
        let screen = ScreenConstants::new(4, 1);

        raster_lines(&mut hdr, &verts, screen, vp, region, BlendMode::Alpha, false);
        raster_lines(&mut ldr, &verts, screen, vp, region, BlendMode::Alpha, true);

        assert_relative_eq!(hdr.pixel(0, 0).unwrap()[0], 1.5);
        assert_relative_eq!(ldr.pixel(0, 0).unwrap()[0], 1.0);
    }

    #[test]
    fn scissor_limits_lines() {
        let mut img = Image::new(8, 1, BLACK);
        let vp = Viewport::full(8, 1);
        let region = Region::of(&img, vp, Some(ScissorRect::new(2, 0, 3, 1)));
        let verts = [
            LineVertex::new(Vec2::new(0.0, 0.0), Color::WHITE, 1.0, 1.0),
            LineVertex::new(Vec2::new(7.0, 0.0), Color::WHITE, 1.0, 1.0),
        ];

        raster_lines(&mut img, &verts, ScreenConstants::new(8, 1), vp, region, BlendMode::Replace, true);
        assert_eq!(img.count_lit(0.5), 3);
    }

    #[test]
    fn far_offscreen_endpoints_are_clipped_before_stepping() {
        let mut img = Image::new(16, 4, BLACK);
        let (vp, region) = full(&img);
        let screen = ScreenConstants::new(16, 4);
        let verts = [
            LineVertex::new(Vec2::new(-1.0e9, 1.0), Color::WHITE, 1.0, 1.0),
            LineVertex::new(Vec2::new(1.0e9, 1.0), Color::WHITE, 1.0, 1.0),
            LineVertex::new(Vec2::new(0.0, 2.0), Color::WHITE, 1.0, 1.0),
            LineVertex::new(Vec2::new(f32::INFINITY, 2.0), Color::WHITE, 1.0, 1.0),
            LineVertex::new(Vec2::new(-50.0, -50.0), Color::WHITE, 1.0, 1.0),
            LineVertex::new(Vec2::new(-10.0, 80.0), Color::WHITE, 1.0, 1.0),
        ];

        raster_lines(&mut img, &verts, screen, vp, region, BlendMode::Replace, true);

        for x in 0..16 {
            assert_eq!(img.pixel(x, 1), Some([1.0, 1.0, 1.0, 1.0]), "x={x}");
        }
        assert_eq!(img.count_lit(0.5), 16);
    }

    // ── fullscreen kernels ────────────────────────────────────────────────

    #[test]
    fn bright_pass_thresholds_on_luminance() {
        let mut src = Image::new(2, 1, BLACK);
        src.write(0, 0, [1.0, 1.0, 1.0, 1.0], BlendMode::Replace, true);
        src.write(1, 0, [0.0, 0.0, 1.0, 1.0], BlendMode::Replace, true); // luma 0.0722

        let params = BloomParams { threshold: 0.5, intensity: 2.0, bloom_strength: 1.0, _pad: 0.0 };
        let mut out = Image::new(2, 1, BLACK);
        let (vp, region) = full(&out);
        run_fullscreen(
            &mut out,
            &FullscreenKernel::BrightPass { source: &src, params },
            vp,
            region,
            BlendMode::Replace,
            false,
        );

        assert_eq!(out.pixel(0, 0), Some([2.0, 2.0, 2.0, 1.0]));
        assert_eq!(out.pixel(1, 0), Some(BLACK));
    }

    #[test]
    fn blur_weights_sum_to_one() {
        let total = BLUR_WEIGHTS[0] + 2.0 * BLUR_WEIGHTS[1..].iter().sum::<f32>();
        assert_relative_eq!(total, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn blur_spreads_along_direction_only() {
        let mut src = Image::new(9, 9, BLACK);
        src.write(4, 4, [1.0, 1.0, 1.0, 1.0], BlendMode::Replace, true);

        let params = BlurParams {
            texel_size: [1.0 / 9.0, 1.0 / 9.0],
            direction: [1.0, 0.0],
            blur_radius: 1.0,
            _pad: [0.0; 3],
        };
        let mut out = Image::new(9, 9, BLACK);
        let (vp, region) = full(&out);
        run_fullscreen(&mut out, &FullscreenKernel::Blur { source: &src, params }, vp, region, BlendMode::Replace, false);

        assert_relative_eq!(out.pixel(4, 4).unwrap()[0], BLUR_WEIGHTS[0], epsilon = 1e-5);
        assert_relative_eq!(out.pixel(5, 4).unwrap()[0], BLUR_WEIGHTS[1], epsilon = 1e-5);
        assert_relative_eq!(out.pixel(8, 4).unwrap()[0], BLUR_WEIGHTS[4], epsilon = 1e-5);
        assert!(out.pixel(4, 5).unwrap()[0] < 1e-4);
    }

    #[test]
    fn composite_adds_scaled_bloom_and_keeps_scene_alpha() {
        let scene = Image::new(1, 1, [0.2, 0.0, 0.0, 0.5]);
        let bloom = Image::new(1, 1, [0.5, 0.5, 0.0, 1.0]);
        let params = BloomParams { threshold: 1.0, intensity: 1.0, bloom_strength: 2.0, _pad: 0.0 };

        let mut out = Image::new(1, 1, BLACK);
        let (vp, region) = full(&out);
        run_fullscreen(
            &mut out,
            &FullscreenKernel::Composite { scene: &scene, bloom: &bloom, params },
            vp,
            region,
            BlendMode::Replace,
            false,
        );

        let p = out.pixel(0, 0).unwrap();
        assert_relative_eq!(p[0], 1.2, epsilon = 1e-6);
        assert_relative_eq!(p[1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(p[3], 0.5);
    }

    #[test]
    fn blit_scales_between_sizes() {
        let src = Image::new(2, 2, [0.3, 0.6, 0.9, 1.0]);
        let mut out = Image::new(8, 8, BLACK);
        let (vp, region) = full(&out);
        run_fullscreen(&mut out, &FullscreenKernel::Blit { source: &src }, vp, region, BlendMode::Replace, true);
        assert!(out.pixels().iter().all(|p| *p == [0.3, 0.6, 0.9, 1.0]));
    }
}
