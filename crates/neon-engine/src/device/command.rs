//! Recorded GPU command stream.
//!
//! A `CommandStream` is the CPU-side command list: components record into it,
//! and a backend's `GpuQueue::execute` replays it. Nothing touches the GPU
//! while recording.

use std::ops::Range;

use bytemuck::Pod;

use crate::coords::{ScissorRect, Viewport};

use super::handle::{BindingId, BufferId, PipelineId, ViewId};
use super::state::{ResourceRef, ResourceState};

/// Largest constant block a single `SetConstants` may carry.
pub const MAX_CONSTANT_BYTES: usize = 64;

/// Constant data captured by value at record time.
///
/// Each block gets its own GPU region at execution, so re-setting constants
/// for a later pass never changes what an earlier pass reads.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ConstantBlock {
    bytes: [u8; MAX_CONSTANT_BYTES],
    len: u8,
}

impl ConstantBlock {
    /// Captures `value`; `None` if it is larger than [`MAX_CONSTANT_BYTES`].
    pub fn from_pod<T: Pod>(value: &T) -> Option<Self> {
        let src = bytemuck::bytes_of(value);
        if src.len() > MAX_CONSTANT_BYTES {
            return None;
        }
        let mut bytes = [0u8; MAX_CONSTANT_BYTES];
        bytes[..src.len()].copy_from_slice(src);
        Some(Self { bytes, len: src.len() as u8 })
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Reinterprets the block as `T` if the sizes match.
    pub fn read<T: Pod>(&self) -> Option<T> {
        bytemuck::try_pod_read_unaligned(self.as_bytes()).ok()
    }
}

impl std::fmt::Debug for ConstantBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConstantBlock({} bytes)", self.len)
    }
}

/// Render target named by a command.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TargetRef {
    View(ViewId),
    Backbuffer(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Barrier {
        resource: ResourceRef,
        before: ResourceState,
        after: ResourceState,
    },
    ClearTarget {
        target: TargetRef,
        color: [f32; 4],
    },
    SetRenderTarget(TargetRef),
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    SetPipeline(PipelineId),
    SetConstants(ConstantBlock),
    BindTexture {
        slot: u32,
        binding: BindingId,
    },
    SetVertexBuffer(BufferId),
    /// Copy `bytes` of the stream's upload arena into `dst` at `offset`,
    /// through a staging region private to this command.
    Upload {
        dst: BufferId,
        offset: u64,
        bytes: Range<usize>,
    },
    Draw {
        vertex_count: u32,
    },
}

/// Linear command list plus the upload arena its `Upload` commands point into.
#[derive(Debug)]
pub struct CommandStream {
    label: &'static str,
    commands: Vec<Command>,
    arena: Vec<u8>,
    closed: bool,
}

impl CommandStream {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            commands: Vec::new(),
            arena: Vec::new(),
            closed: false,
        }
    }

    #[inline]
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Drops all recorded commands and reopens the stream for recording.
    ///
    /// Callers must know the GPU is done with the previous contents.
    pub fn reset(&mut self) {
        self.commands.clear();
        self.arena.clear();
        self.closed = false;
    }

    /// Ends recording; further records are ignored until `reset`.
    pub fn close(&mut self) {
        self.closed = true;
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[inline]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Bytes referenced by an `Upload` command of this stream.
    pub fn upload_bytes(&self, range: Range<usize>) -> Option<&[u8]> {
        self.arena.get(range)
    }

    /// Number of `Draw` commands recorded.
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Draw { .. }))
            .count()
    }

    /// Total vertices over all recorded draws.
    pub fn drawn_vertices(&self) -> u64 {
        self.commands
            .iter()
            .map(|c| match c {
                Command::Draw { vertex_count } => u64::from(*vertex_count),
                _ => 0,
            })
            .sum()
    }

    pub fn barrier_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Barrier { .. }))
            .count()
    }

    // ── recording ─────────────────────────────────────────────────────────

    pub fn barrier(&mut self, resource: ResourceRef, before: ResourceState, after: ResourceState) {
        self.push(Command::Barrier { resource, before, after });
    }

    pub fn clear_target(&mut self, target: TargetRef, color: [f32; 4]) {
        self.push(Command::ClearTarget { target, color });
    }

    pub fn set_render_target(&mut self, target: TargetRef) {
        self.push(Command::SetRenderTarget(target));
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.push(Command::SetViewport(viewport));
    }

    pub fn set_scissor(&mut self, scissor: ScissorRect) {
        self.push(Command::SetScissor(scissor));
    }

    /// Binds `target` with a viewport and scissor covering `width × height`.
    pub fn bind_full_target(&mut self, target: TargetRef, width: u32, height: u32) {
        self.set_render_target(target);
        self.set_viewport(Viewport::full(width, height));
        self.set_scissor(ScissorRect::full(width, height));
    }

    pub fn set_pipeline(&mut self, pipeline: PipelineId) {
        self.push(Command::SetPipeline(pipeline));
    }

    pub fn set_constants<T: Pod>(&mut self, value: &T) {
        match ConstantBlock::from_pod(value) {
            Some(block) => self.push(Command::SetConstants(block)),
            None => log::error!(
                "{}: constant block of {} bytes exceeds {MAX_CONSTANT_BYTES}",
                self.label,
                std::mem::size_of::<T>()
            ),
        }
    }

    pub fn bind_texture(&mut self, slot: u32, binding: BindingId) {
        self.push(Command::BindTexture { slot, binding });
    }

    pub fn set_vertex_buffer(&mut self, buffer: BufferId) {
        self.push(Command::SetVertexBuffer(buffer));
    }

    /// Stages `data` in the arena and records its copy into `dst`.
    pub fn upload(&mut self, dst: BufferId, offset: u64, data: &[u8]) {
        if self.closed {
            log::warn!("{}: upload into closed stream ignored", self.label);
            return;
        }
        let start = self.arena.len();
        self.arena.extend_from_slice(data);
        self.push(Command::Upload {
            dst,
            offset,
            bytes: start..self.arena.len(),
        });
    }

    pub fn draw(&mut self, vertex_count: u32) {
        self.push(Command::Draw { vertex_count });
    }

    fn push(&mut self, command: Command) {
        if self.closed {
            log::warn!("{}: {command:?} recorded into closed stream ignored", self.label);
            return;
        }
        log::trace!("{}: {command:?}", self.label);
        self.commands.push(command);
    }
}
