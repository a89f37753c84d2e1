/// Errors reported by devices and the components built on them.
///
/// Components fail closed: a failed `initialize` leaves the component unusable
/// and returns one of these to its owner, which decides whether the feature
/// is optional.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no render device available")]
    DeviceUnavailable,

    #[error("invalid surface size {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("shader `{name}` not found (searched: {searched})")]
    MissingShader { name: String, searched: String },

    #[error("failed to create {label}: {reason}")]
    ResourceCreation { label: String, reason: String },

    #[error("failed to create pipeline {label}: {reason}")]
    PipelineCreation { label: String, reason: String },

    #[error("{component} is not initialized")]
    NotInitialized { component: &'static str },

    #[error("unknown {kind} handle in command stream")]
    UnknownResource { kind: &'static str },

    #[error("fence value {value} was never signaled")]
    FenceNeverSignaled { value: u64 },

    #[error("GPU wait failed: {0}")]
    Wait(String),

    #[error(transparent)]
    Surface(#[from] SurfaceFailure),

    #[error("GPU device lost")]
    DeviceLost,
}

/// Swap-chain acquisition/presentation failure.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SurfaceFailure {
    #[error("surface lost")]
    Lost,
    #[error("surface outdated")]
    Outdated,
    #[error("surface acquisition timed out")]
    Timeout,
    #[error("out of memory while acquiring surface")]
    OutOfMemory,
    #[error("surface acquisition failed")]
    Other,
}

/// What the frame loop should do after a surface failure.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// The backend reconfigured the surface; rendering resumes next frame.
    Reconfigured,
    /// Transient; skip this frame.
    SkipFrame,
    /// Terminate gracefully.
    Fatal,
}

impl SurfaceFailure {
    pub fn action(self) -> SurfaceErrorAction {
        match self {
            SurfaceFailure::Lost | SurfaceFailure::Outdated => SurfaceErrorAction::Reconfigured,
            SurfaceFailure::Timeout | SurfaceFailure::Other => SurfaceErrorAction::SkipFrame,
            SurfaceFailure::OutOfMemory => SurfaceErrorAction::Fatal,
        }
    }
}
