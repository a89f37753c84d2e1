use crate::device::{
    BlendMode, BufferDesc, BufferId, CommandStream, GpuError, Owned, PipelineDesc, RenderDevice,
    ResourceState, ShaderStage, TextureFormat, Topology, VertexLayout,
};
use crate::shaders::names;

use super::vertex::FULLSCREEN_QUAD;

/// Screen-covering quad shared by every fullscreen pass.
///
/// Owns only the vertex buffer; the caller binds pipeline, constants,
/// textures and target before [`draw`](Self::draw).
#[derive(Debug, Default)]
pub struct FullscreenPass {
    quad: Option<Owned<BufferId>>,
}

impl FullscreenPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(&mut self, device: Option<&mut dyn RenderDevice>) -> Result<(), GpuError> {
        self.shutdown();
        let device = device.ok_or(GpuError::DeviceUnavailable)?;
        self.initialize_with(device)
    }

    pub fn initialize_with(&mut self, device: &mut dyn RenderDevice) -> Result<(), GpuError> {
        let quad = device.create_buffer(
            &BufferDesc {
                label: "fullscreen quad",
                size: std::mem::size_of_val(&FULLSCREEN_QUAD) as u64,
                initial_state: ResourceState::VertexBuffer,
            },
            Some(bytemuck::cast_slice(&FULLSCREEN_QUAD)),
        )?;
        self.quad = Some(quad);
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.quad = None;
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.quad.is_some()
    }

    /// Records the quad draw (4-vertex triangle strip).
    pub fn draw(&self, stream: &mut CommandStream) -> Result<(), GpuError> {
        let quad = self.quad.as_ref().ok_or(GpuError::NotInitialized {
            component: "FullscreenPass",
        })?;
        stream.set_vertex_buffer(quad.id());
        stream.draw(FULLSCREEN_QUAD.len() as u32);
        Ok(())
    }

    /// Pipeline for a fullscreen pixel stage sampling `texture_slots` textures.
    pub fn pipeline_desc<'a>(
        label: &'a str,
        fragment: ShaderStage<'a>,
        texture_slots: u32,
        target_format: TextureFormat,
    ) -> PipelineDesc<'a> {
        PipelineDesc {
            label,
            vertex: ShaderStage::new(names::FULLSCREEN, "vs_main"),
            fragment,
            vertex_layout: VertexLayout::Fullscreen,
            topology: Topology::TriangleStrip,
            blend: BlendMode::Replace,
            texture_slots,
            target_format,
        }
    }
}
