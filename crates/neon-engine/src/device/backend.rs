//! Traits every rendering backend implements.

use super::command::CommandStream;
use super::desc::{BufferDesc, PipelineDesc, TextureDesc, TextureFormat, ViewUsage};
use super::error::GpuError;
use super::handle::{BindingId, BufferId, Owned, PipelineId, TextureId, ViewId};

/// Resource factory.
///
/// Passed as `&mut dyn RenderDevice` to component `initialize` calls; an
/// absent device is `None` at those call sites.
pub trait RenderDevice {
    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<Owned<TextureId>, GpuError>;

    fn create_view(
        &mut self,
        texture: TextureId,
        usage: ViewUsage,
    ) -> Result<Owned<ViewId>, GpuError>;

    /// Shader-visible binding (texture + linear clamp sampler) for a sampled view.
    fn create_sampled_binding(&mut self, view: ViewId) -> Result<Owned<BindingId>, GpuError>;

    /// Creates a vertex buffer, optionally filled with `contents`.
    fn create_buffer(
        &mut self,
        desc: &BufferDesc<'_>,
        contents: Option<&[u8]>,
    ) -> Result<Owned<BufferId>, GpuError>;

    /// Builds a pipeline; shader modules are resolved by logical name.
    fn create_pipeline(&mut self, desc: &PipelineDesc<'_>) -> Result<Owned<PipelineId>, GpuError>;

    /// Destroys released resources whose last possible use is covered by
    /// `completed_fence`. Resources released since the previous call are
    /// tagged with `pending_fence`.
    fn collect_garbage(&mut self, pending_fence: u64, completed_fence: u64);
}

/// Command submission and the monotonic fence.
pub trait GpuQueue {
    /// Submits a closed stream.
    fn execute(&mut self, stream: &CommandStream) -> Result<(), GpuError>;

    /// Signals `value` once all previously executed work completes.
    fn signal(&mut self, value: u64);

    /// Highest fence value the GPU has reached.
    fn completed_fence(&mut self) -> u64;

    /// Blocks until the fence reaches `value`.
    fn wait_for_fence(&mut self, value: u64) -> Result<(), GpuError>;
}

/// Presentation surface with a fixed ring of backbuffers.
pub trait SwapChain {
    fn backbuffer_count(&self) -> usize;

    fn format(&self) -> TextureFormat;

    /// Size in physical pixels.
    fn size(&self) -> (u32, u32);

    /// Makes backbuffer `index` the target of `TargetRef::Backbuffer(index)`.
    fn acquire(&mut self, index: u32) -> Result<(), GpuError>;

    fn present(&mut self, vsync: bool) -> Result<(), GpuError>;

    /// Reconfigures for a new size. The caller drains the GPU first.
    fn resize(&mut self, width: u32, height: u32);
}

/// Everything `FrameContext` needs from a backend.
pub trait Backend: RenderDevice + GpuQueue + SwapChain {}

impl<T: RenderDevice + GpuQueue + SwapChain> Backend for T {}
