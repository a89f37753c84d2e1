use crate::core::FrameTarget;
use crate::device::{
    CommandStream, GpuError, Owned, PipelineId, RenderDevice, ResourceState, ShaderStage,
    TextureFormat,
};
use crate::effects::BloomPipeline;
use crate::paint::Color;
use crate::render::{FullscreenPass, RenderSurface};
use crate::shaders::names;

use super::arena::{SurfaceArena, SurfaceSlot};

/// Where the scene surface is within the current frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ScenePhase {
    /// No scene recorded since the last present.
    Idle,
    /// Scene is the bound render target.
    Drawing,
    /// Scene has been resolved to a shader resource.
    Resolved,
}

/// Sequences scene rendering, optional effects and the final blit.
///
/// Per frame: [`begin_scene`](Self::begin_scene), draw, optionally
/// [`apply_bloom`](Self::apply_bloom), then [`present`](Self::present) into the
/// frame's backbuffer. `end_scene` is implied by the later steps.
#[derive(Debug)]
pub struct PostProcessOrchestrator {
    surfaces: SurfaceArena,
    quad: FullscreenPass,
    blit: Option<Owned<PipelineId>>,
    format: TextureFormat,
    phase: ScenePhase,
    presented: SurfaceSlot,
    // Freshly created surfaces are render targets, not shader resources.
    scene_fresh: bool,
    output_fresh: bool,
}

impl Default for PostProcessOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl PostProcessOrchestrator {
    pub fn new() -> Self {
        Self {
            surfaces: SurfaceArena::new(),
            quad: FullscreenPass::new(),
            blit: None,
            format: TextureFormat::Rgba8Unorm,
            phase: ScenePhase::Idle,
            presented: SurfaceSlot::Scene,
            scene_fresh: false,
            output_fresh: false,
        }
    }

    /// Creates the full-size scene and output surfaces and the blit pipeline.
    ///
    /// `format` is used for both surfaces and the blit target, so it must be
    /// the backbuffer format.
    pub fn initialize(
        &mut self,
        device: Option<&mut dyn RenderDevice>,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<(), GpuError> {
        self.shutdown();

        let result = match device {
            Some(device) => self.create(device, width, height, format),
            None => Err(GpuError::DeviceUnavailable),
        };

        match &result {
            Ok(()) => log::info!("post-process ready: {width}x{height} {format:?}"),
            Err(err) => {
                log::error!("post-process initialization failed: {err}");
                self.shutdown();
            }
        }
        result
    }

    fn create(
        &mut self,
        device: &mut dyn RenderDevice,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<(), GpuError> {
        let clear = self.surfaces.get(SurfaceSlot::Scene).clear_color();
        for surface in self.surfaces.iter_mut() {
            surface.initialize_with(device, width, height, format, clear)?;
        }
        self.quad.initialize_with(device)?;
        self.blit = Some(device.create_pipeline(&FullscreenPass::pipeline_desc(
            "present blit",
            ShaderStage::new(names::BLIT, "fs_main"),
            1,
            format,
        ))?);

        self.format = format;
        self.scene_fresh = true;
        self.output_fresh = true;
        Ok(())
    }

    /// Recreates every surface at the new size.
    pub fn resize(
        &mut self,
        device: &mut dyn RenderDevice,
        width: u32,
        height: u32,
    ) -> Result<(), GpuError> {
        let format = self.format;
        self.initialize(Some(device), width, height, format)
    }

    /// Releases all surfaces and pipelines. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.blit = None;
        self.quad.shutdown();
        for surface in self.surfaces.iter_mut() {
            surface.shutdown();
        }
        self.phase = ScenePhase::Idle;
        self.presented = SurfaceSlot::Scene;
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.blit.is_some()
    }

    /// Makes the scene the render target and clears it.
    pub fn begin_scene(&mut self, stream: &mut CommandStream) -> Result<(), GpuError> {
        if !self.is_initialized() {
            return Err(GpuError::NotInitialized {
                component: "PostProcessOrchestrator",
            });
        }
        if self.phase == ScenePhase::Drawing {
            log::warn!("begin_scene while the scene is already being drawn");
        }

        let expected = if std::mem::take(&mut self.scene_fresh) {
            ResourceState::RenderTarget
        } else {
            ResourceState::ShaderResource
        };

        let scene = self.surfaces.get_mut(SurfaceSlot::Scene);
        scene.transition_to(stream, expected, ResourceState::RenderTarget);
        scene.clear(stream);
        scene.bind_as_target(stream);

        self.phase = ScenePhase::Drawing;
        self.presented = SurfaceSlot::Scene;
        Ok(())
    }

    /// Resolves the scene to a shader resource. No-op unless drawing.
    pub fn end_scene(&mut self, stream: &mut CommandStream) {
        if self.phase != ScenePhase::Drawing {
            log::debug!("end_scene in {:?}; nothing to resolve", self.phase);
            return;
        }
        self.surfaces.get_mut(SurfaceSlot::Scene).transition_to(
            stream,
            ResourceState::RenderTarget,
            ResourceState::ShaderResource,
        );
        self.phase = ScenePhase::Resolved;
    }

    /// Runs `bloom` from the scene into the output surface, which becomes the
    /// surface presented this frame.
    pub fn apply_bloom(
        &mut self,
        stream: &mut CommandStream,
        bloom: &mut BloomPipeline,
    ) -> Result<(), GpuError> {
        if !self.is_initialized() {
            return Err(GpuError::NotInitialized {
                component: "PostProcessOrchestrator",
            });
        }
        // Checked before any transition so a failure records nothing.
        if !bloom.is_initialized() {
            return Err(GpuError::NotInitialized { component: "BloomPipeline" });
        }

        let (scene, output) = self
            .surfaces
            .pair_mut(SurfaceSlot::Scene, SurfaceSlot::Output)
            .ok_or(GpuError::NotInitialized { component: "post surfaces" })?;

        match self.phase {
            ScenePhase::Idle => {
                log::warn!("apply_bloom without a scene; skipped");
                return Ok(());
            }
            ScenePhase::Resolved => {
                scene.transition_to(stream, ResourceState::ShaderResource, ResourceState::RenderTarget);
            }
            ScenePhase::Drawing => {}
        }

        if std::mem::take(&mut self.output_fresh) {
            output.transition_to(stream, ResourceState::RenderTarget, ResourceState::ShaderResource);
        }

        if let Err(err) = bloom.apply(stream, scene, output) {
            // Leave the scene resolved so `present` can still blit it.
            if scene.state() == ResourceState::RenderTarget {
                scene.transition_to(stream, ResourceState::RenderTarget, ResourceState::ShaderResource);
            }
            self.phase = ScenePhase::Resolved;
            return Err(err);
        }

        self.phase = ScenePhase::Resolved;
        self.presented = SurfaceSlot::Output;
        Ok(())
    }

    /// Blits the surface of this frame into `target`.
    ///
    /// The target must already be a render target. Resolves the scene if it
    /// is still being drawn.
    pub fn present(&mut self, stream: &mut CommandStream, target: FrameTarget) -> Result<(), GpuError> {
        let Some(blit) = self.blit.as_ref().map(|p| p.id()) else {
            return Err(GpuError::NotInitialized {
                component: "PostProcessOrchestrator",
            });
        };

        match self.phase {
            ScenePhase::Idle => {
                log::warn!("present without a scene; nothing blitted");
                return Ok(());
            }
            ScenePhase::Drawing => self.end_scene(stream),
            ScenePhase::Resolved => {}
        }

        let source = self
            .surfaces
            .get(self.presented)
            .binding()
            .ok_or(GpuError::NotInitialized { component: "presented surface" })?;

        stream.bind_full_target(target.target, target.width, target.height);
        stream.set_pipeline(blit);
        stream.bind_texture(0, source);
        self.quad.draw(stream)?;

        self.phase = ScenePhase::Idle;
        Ok(())
    }

    // ── accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn phase(&self) -> ScenePhase {
        self.phase
    }

    /// Surface the next `present` blits.
    #[inline]
    pub fn presented(&self) -> SurfaceSlot {
        self.presented
    }

    pub fn surface(&self, slot: SurfaceSlot) -> &RenderSurface {
        self.surfaces.get(slot)
    }

    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn size(&self) -> (u32, u32) {
        self.surfaces.get(SurfaceSlot::Scene).size()
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.surfaces.get_mut(SurfaceSlot::Scene).set_clear_color(color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::headless::HeadlessBackend;
    use crate::device::{GpuQueue, ResourceRef, SwapChain, TargetRef};
    use crate::effects::BloomSettings;

    const SIZE: u32 = 16;

    fn setup() -> (HeadlessBackend, PostProcessOrchestrator) {
        let mut dev = HeadlessBackend::with_size(SIZE, SIZE);
        let mut post = PostProcessOrchestrator::new();
        post.initialize(Some(&mut dev), SIZE, SIZE, TextureFormat::Rgba8Unorm)
            .unwrap();
        post.set_clear_color(Color::rgb(0.5, 0.5, 0.5));
        (dev, post)
    }

    fn backbuffer(dev: &mut HeadlessBackend, stream: &mut CommandStream) -> FrameTarget {
        dev.acquire(0).unwrap();
        stream.barrier(
            ResourceRef::Backbuffer(0),
            ResourceState::Presentable,
            ResourceState::RenderTarget,
        );
        FrameTarget {
            target: TargetRef::Backbuffer(0),
            width: SIZE,
            height: SIZE,
        }
    }

    fn finish(dev: &mut HeadlessBackend, mut stream: CommandStream) {
        stream.barrier(
            ResourceRef::Backbuffer(0),
            ResourceState::RenderTarget,
            ResourceState::Presentable,
        );
        stream.close();
        dev.execute(&stream).unwrap();
        dev.present(true).unwrap();
    }

    // ── lifecycle ─────────────────────────────────────────────────────────

    #[test]
    fn null_device_fails_and_shutdown_is_idempotent() {
        let mut post = PostProcessOrchestrator::new();
        assert!(matches!(
            post.initialize(None, 8, 8, TextureFormat::Rgba8Unorm),
            Err(GpuError::DeviceUnavailable)
        ));
        post.shutdown();
        post.shutdown();
        assert!(!post.is_initialized());
    }

    #[test]
    fn begin_scene_requires_initialize() {
        let mut post = PostProcessOrchestrator::new();
        let mut stream = CommandStream::new("test");
        assert!(post.begin_scene(&mut stream).is_err());
        assert!(stream.is_empty());
    }

    #[test]
    fn resize_recreates_surfaces() {
        let (mut dev, mut post) = setup();
        post.resize(&mut dev, 32, 8).unwrap();
        assert_eq!(post.size(), (32, 8));
        assert_eq!(post.surface(SurfaceSlot::Output).size(), (32, 8));
        assert_eq!(post.format(), TextureFormat::Rgba8Unorm);
    }

    // ── present ───────────────────────────────────────────────────────────

    #[test]
    fn present_blits_scene_into_backbuffer() {
        let (mut dev, mut post) = setup();
        let mut stream = CommandStream::new("test");
        let target = backbuffer(&mut dev, &mut stream);

        post.begin_scene(&mut stream).unwrap();
        assert_eq!(post.phase(), ScenePhase::Drawing);
        post.end_scene(&mut stream);
        post.present(&mut stream, target).unwrap();
        assert_eq!(post.phase(), ScenePhase::Idle);
        finish(&mut dev, stream);

        assert_eq!(dev.stats().validation_errors, 0);
        let image = dev.backbuffer_image(0).unwrap();
        assert!(image.pixels().iter().all(|p| *p == [0.5, 0.5, 0.5, 1.0]));
    }

    #[test]
    fn present_resolves_an_open_scene() {
        let (mut dev, mut post) = setup();
        let mut stream = CommandStream::new("test");
        let target = backbuffer(&mut dev, &mut stream);

        post.begin_scene(&mut stream).unwrap();
        post.present(&mut stream, target).unwrap();
        finish(&mut dev, stream);

        assert_eq!(post.surface(SurfaceSlot::Scene).state(), ResourceState::ShaderResource);
        assert_eq!(dev.stats().validation_errors, 0);
    }

    #[test]
    fn present_without_scene_records_nothing() {
        let (_dev, mut post) = setup();
        let mut stream = CommandStream::new("test");
        let target = FrameTarget {
            target: TargetRef::Backbuffer(0),
            width: SIZE,
            height: SIZE,
        };
        post.present(&mut stream, target).unwrap();
        assert!(stream.is_empty());
    }

    // ── bloom ─────────────────────────────────────────────────────────────

    #[test]
    fn bloom_output_is_presented() {
        let (mut dev, mut post) = setup();
        let mut bloom = BloomPipeline::with_settings(BloomSettings {
            threshold: 0.25,
            ..BloomSettings::default()
        });
        bloom
            .initialize(Some(&mut dev), SIZE, SIZE, TextureFormat::Rgba8Unorm)
            .unwrap();

        let mut stream = CommandStream::new("test");
        let target = backbuffer(&mut dev, &mut stream);
        post.begin_scene(&mut stream).unwrap();
        post.apply_bloom(&mut stream, &mut bloom).unwrap();
        assert_eq!(post.presented(), SurfaceSlot::Output);
        post.present(&mut stream, target).unwrap();
        finish(&mut dev, stream);

        assert_eq!(dev.stats().validation_errors, 0);
        // 0.5 scene + 0.75 glow, clamped by the unorm target.
        let p = dev.backbuffer_image(0).unwrap().pixel(8, 8).unwrap();
        assert_eq!(p[0], 1.0);
    }

    #[test]
    fn consecutive_frames_track_state_without_mismatches() {
        let (mut dev, mut post) = setup();
        let mut bloom = BloomPipeline::new();
        bloom
            .initialize(Some(&mut dev), SIZE, SIZE, TextureFormat::Rgba8Unorm)
            .unwrap();

        for frame in 0..3 {
            let mut stream = CommandStream::new("test");
            let target = backbuffer(&mut dev, &mut stream);
            post.begin_scene(&mut stream).unwrap();
            if frame != 1 {
                post.apply_bloom(&mut stream, &mut bloom).unwrap();
            }
            post.present(&mut stream, target).unwrap();
            finish(&mut dev, stream);
        }

        assert_eq!(dev.stats().validation_errors, 0);
        for slot in SurfaceSlot::ALL {
            assert_eq!(post.surface(slot).mismatch_count(), 0, "{slot:?}");
        }
    }

    #[test]
    fn failed_bloom_leaves_the_scene_presentable() {
        let (mut dev, mut post) = setup();
        let mut bloom = BloomPipeline::new();

        for _ in 0..2 {
            let mut stream = CommandStream::new("test");
            let target = backbuffer(&mut dev, &mut stream);
            post.begin_scene(&mut stream).unwrap();
            post.end_scene(&mut stream);

            let before = stream.len();
            assert!(matches!(
                post.apply_bloom(&mut stream, &mut bloom),
                Err(GpuError::NotInitialized { .. })
            ));
            assert_eq!(stream.len(), before);
            assert_eq!(post.surface(SurfaceSlot::Scene).state(), ResourceState::ShaderResource);
            assert_eq!(post.presented(), SurfaceSlot::Scene);

            post.present(&mut stream, target).unwrap();
            finish(&mut dev, stream);
        }

        assert_eq!(dev.stats().validation_errors, 0);
        assert_eq!(post.surface(SurfaceSlot::Scene).mismatch_count(), 0);
        let image = dev.backbuffer_image(0).unwrap();
        assert!(image.pixels().iter().all(|p| *p == [0.5, 0.5, 0.5, 1.0]));
    }
}
