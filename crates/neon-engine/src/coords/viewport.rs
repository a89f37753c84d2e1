/// Pixel-space viewport of the bound render target.
///
/// Mirrors the rasterizer viewport: NDC `[-1, 1]` maps onto
/// `[x, x + width] × [y, y + height]`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Viewport covering a whole `width × height` target.
    #[inline]
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite()
    }
}

/// Integer scissor rectangle in pixels.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Clamps the rectangle to a `width × height` target.
    ///
    /// Returns `None` when nothing of the rectangle remains.
    pub fn clamped_to(self, width: u32, height: u32) -> Option<ScissorRect> {
        let x0 = self.x.min(width);
        let y0 = self.y.min(height);
        let x1 = self.x.saturating_add(self.width).min(width);
        let y1 = self.y.saturating_add(self.height).min(height);

        let w = x1.saturating_sub(x0);
        let h = y1.saturating_sub(y0);
        if w == 0 || h == 0 { None } else { Some(ScissorRect::new(x0, y0, w, h)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_viewport_covers_target() {
        let vp = Viewport::full(800, 600);
        assert_eq!(vp, Viewport::new(0.0, 0.0, 800.0, 600.0));
        assert!(vp.is_valid());
        assert!(!Viewport::full(0, 600).is_valid());
    }

    #[test]
    fn scissor_inside_target_is_unchanged() {
        let s = ScissorRect::new(10, 20, 30, 40);
        assert_eq!(s.clamped_to(100, 100), Some(s));
    }

    #[test]
    fn scissor_overhang_is_trimmed() {
        let s = ScissorRect::new(90, 0, 50, 200);
        assert_eq!(s.clamped_to(100, 100), Some(ScissorRect::new(90, 0, 10, 100)));
    }

    #[test]
    fn scissor_outside_target_is_none() {
        assert_eq!(ScissorRect::new(120, 0, 10, 10).clamped_to(100, 100), None);
        assert_eq!(ScissorRect::full(0, 10).clamped_to(100, 100), None);
    }
}
