//! GPU vertex and constant layouts shared by the line and fullscreen passes.

use bytemuck::{Pod, Zeroable};

use crate::coords::Vec2;
use crate::paint::Color;

// ── line vertex ───────────────────────────────────────────────────────────

/// One end of a line segment, in pixel space (top-left origin, +Y down).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
    pub thickness: f32,
    pub glow: f32,
}

const _: () = assert!(std::mem::size_of::<LineVertex>() == 32);

impl LineVertex {
    const ATTRS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        0 => Float32x2, // position
        1 => Float32x4, // color
        2 => Float32,   // thickness
        3 => Float32    // glow
    ];

    #[inline]
    pub fn new(position: Vec2, color: Color, thickness: f32, glow: f32) -> Self {
        Self {
            position: position.to_array(),
            color: color.to_array(),
            thickness,
            glow,
        }
    }

    pub(crate) fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LineVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

// ── fullscreen vertex ─────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct FullscreenVertex {
    pub position: [f32; 2], // NDC
    pub uv: [f32; 2],       // 0..1, v down
}

const _: () = assert!(std::mem::size_of::<FullscreenVertex>() == 16);

impl FullscreenVertex {
    const ATTRS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x2, // position
        1 => Float32x2  // uv
    ];

    pub(crate) fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<FullscreenVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

/// Screen-covering quad, drawn as a 4-vertex triangle strip.
pub const FULLSCREEN_QUAD: [FullscreenVertex; 4] = [
    FullscreenVertex { position: [-1.0, 1.0], uv: [0.0, 0.0] },
    FullscreenVertex { position: [1.0, 1.0], uv: [1.0, 0.0] },
    FullscreenVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    FullscreenVertex { position: [1.0, -1.0], uv: [1.0, 1.0] },
];

// ── screen constants ──────────────────────────────────────────────────────

/// Per-draw constants of the line pass.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ScreenConstants {
    pub size: [f32; 2],
    pub _pad: [f32; 2], // 16-byte alignment
}

impl ScreenConstants {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: [width.max(1) as f32, height.max(1) as f32],
            _pad: [0.0; 2],
        }
    }
}
