//! Resource and pipeline descriptors.

use super::state::ResourceState;

/// Pixel formats the engine renders to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
}

impl TextureFormat {
    #[inline]
    pub fn is_srgb(self) -> bool {
        matches!(self, TextureFormat::Rgba8UnormSrgb | TextureFormat::Bgra8UnormSrgb)
    }

    /// True if stored values are clamped to `[0, 1]`.
    #[inline]
    pub fn is_normalized(self) -> bool {
        !matches!(self, TextureFormat::Rgba16Float)
    }

    #[inline]
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::Rgba16Float => 8,
            _ => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Kind of view to create over a texture.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ViewUsage {
    /// Drawable (render-target) view.
    RenderTarget,
    /// Sampleable (shader-resource) view.
    Sampled,
}

/// Vertex buffer descriptor.
#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    /// State the buffer is created in.
    pub initial_state: ResourceState,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Topology {
    LineList,
    TriangleStrip,
}

/// Vertex formats understood by the device.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VertexLayout {
    /// `LineVertex`: position f32x2, color f32x4, thickness f32, glow f32.
    Line,
    /// `FullscreenVertex`: position f32x2, uv f32x2.
    Fullscreen,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendMode {
    /// Overwrite the target.
    Replace,
    /// Straight-alpha "over".
    Alpha,
}

/// One shader stage, by logical module name and entry point.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ShaderStage<'a> {
    pub module: &'a str,
    pub entry: &'a str,
}

impl<'a> ShaderStage<'a> {
    #[inline]
    pub const fn new(module: &'a str, entry: &'a str) -> Self {
        Self { module, entry }
    }
}

/// Pipeline state.
///
/// Binding model shared by every pipeline:
/// - group 0: constant block (uniform, dynamic offset)
/// - groups 1..=`texture_slots`: one sampled texture + sampler each
#[derive(Debug, Clone)]
pub struct PipelineDesc<'a> {
    pub label: &'a str,
    pub vertex: ShaderStage<'a>,
    pub fragment: ShaderStage<'a>,
    pub vertex_layout: VertexLayout,
    pub topology: Topology,
    pub blend: BlendMode,
    pub texture_slots: u32,
    pub target_format: TextureFormat,
}
