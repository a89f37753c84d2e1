//! Shapes built from plain line segments.
//!
//! These are ordinary `add_line` callers: each edge is its own segment, with
//! no joins or miters.

use std::f32::consts::TAU;

use crate::coords::Vec2;
use crate::paint::Color;

use super::lines::{LineSink, LineStyle};

pub const DEFAULT_CIRCLE_SEGMENTS: u32 = 32;

/// Regular `segments`-gon inscribed in the circle. Fewer than 3 draws nothing.
pub fn draw_circle<S: LineSink + ?Sized>(
    sink: &mut S,
    center: Vec2,
    radius: f32,
    color: Color,
    segments: u32,
    style: LineStyle,
) {
    if segments < 3 {
        return;
    }

    let step = TAU / segments as f32;
    let point = |i: u32| center + Vec2::from_angle(i as f32 * step) * radius;

    for i in 0..segments {
        sink.add_line(point(i), point(i + 1), color, style);
    }
}

/// Axis-aligned rectangle outline.
pub fn draw_rect<S: LineSink + ?Sized>(
    sink: &mut S,
    top_left: Vec2,
    size: Vec2,
    color: Color,
    style: LineStyle,
) {
    let tl = top_left;
    let tr = top_left + Vec2::new(size.x, 0.0);
    let br = top_left + size;
    let bl = top_left + Vec2::new(0.0, size.y);

    sink.add_line(tl, tr, color, style);
    sink.add_line(tr, br, color, style);
    sink.add_line(br, bl, color, style);
    sink.add_line(bl, tl, color, style);
}

/// Polyline through `points`; `closed` adds the last→first edge when there
/// are more than two points.
pub fn draw_polygon<S: LineSink + ?Sized>(
    sink: &mut S,
    points: &[Vec2],
    color: Color,
    closed: bool,
    style: LineStyle,
) {
    if points.len() < 2 {
        return;
    }

    for pair in points.windows(2) {
        sink.add_line(pair[0], pair[1], color, style);
    }

    if closed && points.len() > 2 {
        if let (Some(&last), Some(&first)) = (points.last(), points.first()) {
            sink.add_line(last, first, color, style);
        }
    }
}
