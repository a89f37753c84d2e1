//! wgpu backend: a window surface plus device, queue and resource tables.

mod context;
mod init;
mod surface;

pub use context::WgpuBackend;
pub use init::GpuInit;
