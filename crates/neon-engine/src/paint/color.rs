/// Straight-alpha RGBA color.
///
/// Channels are nominally in `[0, 1]` but are never clamped here: values above
/// one are how callers push lines past the bloom threshold.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
    pub const BLUE: Color = Color::rgb(0.3, 0.7, 1.0); // neon blue, not pure
    pub const CYAN: Color = Color::rgb(0.0, 1.0, 1.0);
    pub const MAGENTA: Color = Color::rgb(1.0, 0.0, 1.0);
    pub const YELLOW: Color = Color::rgb(1.0, 1.0, 0.0);

    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color.
    #[inline]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// Opaque color from hue/saturation/value, all in `[0, 1]`.
    ///
    /// Hue wraps, so `1.25` is the same as `0.25`.
    pub fn from_hsv(h: f32, s: f32, v: f32) -> Self {
        let h = h.rem_euclid(1.0);
        let c = v * s;
        let x = c * (1.0 - ((h * 6.0).rem_euclid(2.0) - 1.0).abs());
        let m = v - c;

        let (r, g, b) = match (h * 6.0) as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        Self::rgb(r + m, g + m, b + m)
    }

    #[inline]
    pub const fn with_alpha(self, a: f32) -> Self {
        Self::new(self.r, self.g, self.b, a)
    }

    /// Multiplies RGB by `k`, keeping alpha.
    #[inline]
    pub fn scaled(self, k: f32) -> Self {
        Self::new(self.r * k, self.g * k, self.b * k, self.a)
    }

    #[inline]
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite() && self.a.is_finite()
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

impl From<[f32; 4]> for Color {
    #[inline]
    fn from([r, g, b, a]: [f32; 4]) -> Self {
        Color::new(r, g, b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_rgb(c: Color, r: f32, g: f32, b: f32) {
        assert_relative_eq!(c.r, r, epsilon = 1e-5);
        assert_relative_eq!(c.g, g, epsilon = 1e-5);
        assert_relative_eq!(c.b, b, epsilon = 1e-5);
        assert_eq!(c.a, 1.0);
    }

    #[test]
    fn default_is_white() {
        assert_eq!(Color::default(), Color::WHITE);
    }

    #[test]
    fn hsv_primary_hues() {
        assert_rgb(Color::from_hsv(0.0, 1.0, 1.0), 1.0, 0.0, 0.0);
        assert_rgb(Color::from_hsv(1.0 / 3.0, 1.0, 1.0), 0.0, 1.0, 0.0);
        assert_rgb(Color::from_hsv(2.0 / 3.0, 1.0, 1.0), 0.0, 0.0, 1.0);
    }

    #[test]
    fn hsv_wraps_hue() {
        assert_eq!(Color::from_hsv(1.25, 1.0, 1.0), Color::from_hsv(0.25, 1.0, 1.0));
    }

    #[test]
    fn hsv_zero_saturation_is_grey() {
        assert_rgb(Color::from_hsv(0.4, 0.0, 0.5), 0.5, 0.5, 0.5);
    }

    #[test]
    fn scaled_keeps_alpha_and_does_not_clamp() {
        let c = Color::new(0.5, 0.25, 1.0, 0.5).scaled(4.0);
        assert_eq!(c, Color::new(2.0, 1.0, 4.0, 0.5));
    }
}
