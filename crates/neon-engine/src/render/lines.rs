//! Line batching.
//!
//! `LineBatcher` accumulates line-list vertices on the CPU and turns them into
//! at most one draw per flush. The vertex buffer on the device is sized for a
//! full batch, so a flush can never overflow it: reaching capacity flushes
//! before the next line is accepted.

use crate::coords::Vec2;
use crate::device::{
    BlendMode, BufferDesc, BufferId, CommandStream, GpuError, Owned, PipelineDesc, PipelineId,
    RenderDevice, ResourceRef, ResourceState, ShaderStage, TextureFormat, Topology, TrackedState,
    VertexLayout,
};
use crate::paint::Color;
use crate::shaders::names;

use super::vertex::{LineVertex, ScreenConstants};

/// Lines per batch.
pub const MAX_LINES: usize = 10_000;

/// Vertices per batch; two per line.
pub const MAX_VERTICES: usize = MAX_LINES * 2;

/// Optional per-line attributes.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LineStyle {
    pub thickness: f32,
    /// Multiplier on the line color; above one pushes it past the bloom threshold.
    pub glow: f32,
}

impl LineStyle {
    pub const DEFAULT: LineStyle = LineStyle { thickness: 1.0, glow: 1.0 };

    #[inline]
    pub const fn new(thickness: f32, glow: f32) -> Self {
        Self { thickness, glow }
    }

    #[inline]
    pub const fn with_glow(glow: f32) -> Self {
        Self { thickness: 1.0, glow }
    }
}

impl Default for LineStyle {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Batching counters since initialization.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct BatchStats {
    pub flushes: u64,
    /// Flushes forced by a full batch.
    pub implicit_flushes: u64,
    pub vertices_drawn: u64,
}

#[derive(Debug)]
struct LineGpu {
    pipeline: Owned<PipelineId>,
    buffer: Owned<BufferId>,
    buffer_state: TrackedState,
}

#[derive(Debug)]
pub struct LineBatcher {
    vertices: Vec<LineVertex>,
    gpu: Option<LineGpu>,
    screen: ScreenConstants,
    stats: BatchStats,
}

impl Default for LineBatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBatcher {
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            gpu: None,
            screen: ScreenConstants::new(1, 1),
            stats: BatchStats::default(),
        }
    }

    /// Creates the line pipeline and the batch-sized vertex buffer.
    ///
    /// On failure nothing is kept and the batcher ignores `add_line`.
    pub fn initialize(
        &mut self,
        device: Option<&mut dyn RenderDevice>,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<(), GpuError> {
        self.shutdown();
        let device = device.ok_or(GpuError::DeviceUnavailable)?;
        self.initialize_with(device, format, width, height)
    }

    pub fn initialize_with(
        &mut self,
        device: &mut dyn RenderDevice,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<(), GpuError> {
        self.shutdown();

        let pipeline = device.create_pipeline(&Self::pipeline_desc(format))?;
        let buffer = device.create_buffer(
            &BufferDesc {
                label: "line vertices",
                size: (MAX_VERTICES * std::mem::size_of::<LineVertex>()) as u64,
                initial_state: ResourceState::VertexBuffer,
            },
            None,
        )?;

        self.gpu = Some(LineGpu {
            pipeline,
            buffer,
            buffer_state: TrackedState::new(ResourceState::VertexBuffer),
        });
        self.vertices.reserve(MAX_VERTICES);
        self.screen = ScreenConstants::new(width, height);

        log::info!("line batcher ready ({MAX_LINES} lines per batch, {format:?})");
        Ok(())
    }

    pub fn pipeline_desc(format: TextureFormat) -> PipelineDesc<'static> {
        PipelineDesc {
            label: "lines",
            vertex: ShaderStage::new(names::LINE, "vs_main"),
            fragment: ShaderStage::new(names::LINE, "fs_main"),
            vertex_layout: VertexLayout::Line,
            topology: Topology::LineList,
            blend: BlendMode::Alpha,
            texture_slots: 0,
            target_format: format,
        }
    }

    /// Drops pending lines and releases the device objects.
    pub fn shutdown(&mut self) {
        self.vertices.clear();
        self.gpu = None;
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.gpu.is_some()
    }

    /// Queues one segment; flushes first when the batch is full.
    pub fn add_line(
        &mut self,
        stream: &mut CommandStream,
        start: Vec2,
        end: Vec2,
        color: Color,
        style: LineStyle,
    ) {
        if self.gpu.is_none() {
            log::trace!("line batcher not initialized; line dropped");
            return;
        }

        if self.is_full() {
            self.stats.implicit_flushes += 1;
            self.flush(stream);
        }

        self.vertices.push(LineVertex::new(start, color, style.thickness, style.glow));
        self.vertices.push(LineVertex::new(end, color, style.thickness, style.glow));
    }

    /// Uploads pending vertices and records one draw. No-op when empty.
    pub fn flush(&mut self, stream: &mut CommandStream) {
        let Some(gpu) = self.gpu.as_mut() else { return };
        if self.vertices.is_empty() {
            return;
        }

        let buffer = gpu.buffer.id();
        let resource = ResourceRef::Buffer(buffer);
        let count = self.vertices.len() as u32;

        gpu.buffer_state.transition(
            stream,
            resource,
            ResourceState::VertexBuffer,
            ResourceState::CopyDestination,
        );
        stream.upload(buffer, 0, bytemuck::cast_slice(&self.vertices));
        gpu.buffer_state.transition(
            stream,
            resource,
            ResourceState::CopyDestination,
            ResourceState::VertexBuffer,
        );

        stream.set_pipeline(gpu.pipeline.id());
        stream.set_constants(&self.screen);
        stream.set_vertex_buffer(buffer);
        stream.draw(count);

        self.stats.flushes += 1;
        self.stats.vertices_drawn += u64::from(count);
        self.vertices.clear();
    }

    /// Drops pending lines without drawing them.
    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.vertices.len() >= MAX_VERTICES
    }

    /// Pending (unflushed) lines.
    #[inline]
    pub fn line_count(&self) -> usize {
        self.vertices.len() / 2
    }

    #[inline]
    pub fn pending_vertices(&self) -> &[LineVertex] {
        &self.vertices
    }

    /// Screen size used by the next flush to map pixels to clip space.
    pub fn update_screen_size(&mut self, width: u32, height: u32) {
        self.screen = ScreenConstants::new(width, height);
    }

    #[inline]
    pub fn screen_size(&self) -> [f32; 2] {
        self.screen.size
    }

    #[inline]
    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Mismatched transitions on the vertex buffer.
    pub fn mismatch_count(&self) -> u32 {
        self.gpu.as_ref().map_or(0, |g| g.buffer_state.mismatches())
    }
}

// ── recording front-end ───────────────────────────────────────────────────

/// Anything that accepts line segments.
pub trait LineSink {
    fn add_line(&mut self, start: Vec2, end: Vec2, color: Color, style: LineStyle);

    /// `add_line` with the default style.
    fn line(&mut self, start: Vec2, end: Vec2, color: Color) {
        self.add_line(start, end, color, LineStyle::DEFAULT);
    }
}

/// A batcher bound to the stream of the frame being recorded.
pub struct LineRecorder<'a> {
    batcher: &'a mut LineBatcher,
    stream: &'a mut CommandStream,
}

impl<'a> LineRecorder<'a> {
    pub fn new(batcher: &'a mut LineBatcher, stream: &'a mut CommandStream) -> Self {
        Self { batcher, stream }
    }

    pub fn flush(&mut self) {
        self.batcher.flush(self.stream);
    }

    pub fn clear(&mut self) {
        self.batcher.clear();
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.batcher.is_full()
    }

    #[inline]
    pub fn line_count(&self) -> usize {
        self.batcher.line_count()
    }
}

impl LineSink for LineRecorder<'_> {
    fn add_line(&mut self, start: Vec2, end: Vec2, color: Color, style: LineStyle) {
        self.batcher.add_line(self.stream, start, end, color, style);
    }
}
