//! Render device abstraction.
//!
//! This module is responsible for:
//! - the recorded command stream and its resource-state barriers
//! - resource handles and deferred release
//! - the device/queue/swap-chain traits and their two backends
//!   (`gpu` for wgpu, `headless` for CPU execution)

mod backend;
mod command;
mod desc;
mod error;
mod handle;
mod state;

pub mod gpu;
pub mod headless;

pub use backend::{Backend, GpuQueue, RenderDevice, SwapChain};
pub use gpu::{GpuInit, WgpuBackend};
pub use command::{Command, CommandStream, ConstantBlock, TargetRef, MAX_CONSTANT_BYTES};
pub use desc::{
    BlendMode, BufferDesc, PipelineDesc, ShaderStage, TextureDesc, TextureFormat, Topology,
    VertexLayout, ViewUsage,
};
pub use error::{GpuError, SurfaceErrorAction, SurfaceFailure};
pub use handle::{
    BindingId, BufferId, Owned, PipelineId, ReleaseQueue, ResourceId, TextureId, ViewId,
};
pub use state::{ResourceRef, ResourceState, TrackedState};

pub(crate) use handle::{GarbageList, IdAllocator};
