//! Threshold/blur/composite bloom.
//!
//! Pass order is fixed: bright pass (scene → `bright`), horizontal blur
//! (`bright` → `blur_temp`), vertical blur (`blur_temp` → `bright`), composite
//! (scene + `bright` → output). The intermediate surfaces run at
//! 1/[`DOWNSAMPLE`] resolution.

use bytemuck::{Pod, Zeroable};

use crate::device::{
    BindingId, CommandStream, GpuError, Owned, PipelineId, RenderDevice, ResourceState,
    ShaderStage, TextureFormat,
};
use crate::paint::Color;
use crate::render::{FullscreenPass, RenderSurface};
use crate::shaders::names;

/// Resolution divisor of the bright and blur surfaces.
pub const DOWNSAMPLE: u32 = 4;

/// Tunable bloom parameters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BloomSettings {
    /// Luminance above which a pixel contributes.
    pub threshold: f32,
    /// Scale applied to contributing pixels.
    pub intensity: f32,
    /// Weight of the blurred glow in the composite.
    pub bloom_strength: f32,
    /// Tap spacing of the blur, in texels.
    pub blur_radius: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            intensity: 1.5,
            bloom_strength: 1.0,
            blur_radius: 2.0,
        }
    }
}

/// Constants of the bright and composite passes.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct BloomParams {
    pub threshold: f32,
    pub intensity: f32,
    pub bloom_strength: f32,
    pub _pad: f32,
}

const _: () = assert!(std::mem::size_of::<BloomParams>() == 16);

/// Constants of one blur direction.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct BlurParams {
    pub texel_size: [f32; 2],
    pub direction: [f32; 2],
    pub blur_radius: f32,
    pub _pad: [f32; 3],
}

const _: () = assert!(std::mem::size_of::<BlurParams>() == 32);

impl From<BloomSettings> for BloomParams {
    fn from(s: BloomSettings) -> Self {
        Self {
            threshold: s.threshold,
            intensity: s.intensity,
            bloom_strength: s.bloom_strength,
            _pad: 0.0,
        }
    }
}

#[derive(Debug)]
struct BloomGpu {
    bright_pass: Owned<PipelineId>,
    blur: Owned<PipelineId>,
    composite: Owned<PipelineId>,
}

/// Bloom post-process over [`RenderSurface`]s.
///
/// Owns its intermediate surfaces; the scene and output surfaces are lent to
/// [`apply`](Self::apply) by their owner.
#[derive(Debug)]
pub struct BloomPipeline {
    settings: BloomSettings,
    bright: RenderSurface,
    blur_temp: RenderSurface,
    quad: FullscreenPass,
    gpu: Option<BloomGpu>,
    // Intermediates are created as render targets but enter each apply as
    // shader resources.
    primed: bool,
}

impl Default for BloomPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl BloomPipeline {
    pub fn new() -> Self {
        Self::with_settings(BloomSettings::default())
    }

    pub fn with_settings(settings: BloomSettings) -> Self {
        Self {
            settings,
            bright: RenderSurface::new("bloom bright"),
            blur_temp: RenderSurface::new("bloom blur temp"),
            quad: FullscreenPass::new(),
            gpu: None,
            primed: false,
        }
    }

    /// Creates intermediates and pipelines for a `width × height` scene.
    ///
    /// Any failure releases everything created so far; the effect then stays
    /// unusable until a later successful `initialize`.
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
            Ok(()) => log::info!(
                "bloom ready: {}x{} intermediates",
                self.bright.width(),
                self.bright.height()
            ),
            Err(err) => {
                log::error!("bloom initialization failed: {err}");
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
        if width == 0 || height == 0 {
            return Err(GpuError::InvalidDimensions { width, height });
        }

        let (w, h) = ((width / DOWNSAMPLE).max(1), (height / DOWNSAMPLE).max(1));
        self.bright.initialize_with(device, w, h, format, Color::BLACK)?;
        self.blur_temp.initialize_with(device, w, h, format, Color::BLACK)?;
        self.quad.initialize_with(device)?;

        let bright_pass = device.create_pipeline(&FullscreenPass::pipeline_desc(
            "bloom bright pass",
            ShaderStage::new(names::BRIGHT_PASS, "fs_main"),
            1,
            format,
        ))?;
        let blur = device.create_pipeline(&FullscreenPass::pipeline_desc(
            "bloom blur",
            ShaderStage::new(names::GAUSSIAN_BLUR, "fs_main"),
            1,
            format,
        ))?;
        let composite = device.create_pipeline(&FullscreenPass::pipeline_desc(
            "bloom composite",
            ShaderStage::new(names::BLOOM_COMPOSITE, "fs_main"),
            2,
            format,
        ))?;

        self.gpu = Some(BloomGpu {
            bright_pass,
            blur,
            composite,
        });
        self.primed = false;
        Ok(())
    }

    /// Releases everything. Safe on a never-initialized or failed effect.
    pub fn shutdown(&mut self) {
        self.gpu = None;
        self.quad.shutdown();
        self.bright.shutdown();
        self.blur_temp.shutdown();
        self.primed = false;
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.gpu.is_some()
    }

    /// Records all bloom passes from `source` into `output`.
    ///
    /// `source` must be in `RenderTarget` and `output` in `ShaderResource`;
    /// both end in `ShaderResource`.
    pub fn apply(
        &mut self,
        stream: &mut CommandStream,
        source: &mut RenderSurface,
        output: &mut RenderSurface,
    ) -> Result<(), GpuError> {
        let gpu = self.gpu.as_ref().ok_or(GpuError::NotInitialized {
            component: "BloomPipeline",
        })?;
        let (Some(scene), Some(bright), Some(temp)) =
            (source.binding(), self.bright.binding(), self.blur_temp.binding())
        else {
            return Err(GpuError::NotInitialized { component: "bloom source surface" });
        };
        if !output.is_initialized() {
            return Err(GpuError::NotInitialized { component: "bloom output surface" });
        }

        use ResourceState::{RenderTarget as Rt, ShaderResource as Sr};

        if !self.primed {
            self.bright.transition_to(stream, Rt, Sr);
            self.blur_temp.transition_to(stream, Rt, Sr);
            self.primed = true;
        }

        let params = BloomParams::from(self.settings);

        // Bright pass.
        source.transition_to(stream, Rt, Sr);
        self.bright.transition_to(stream, Sr, Rt);
        self.bright.bind_as_target(stream);
        self.bright.clear(stream);
        stream.set_pipeline(gpu.bright_pass.id());
        stream.set_constants(&params);
        stream.bind_texture(0, scene);
        self.quad.draw(stream)?;
        self.bright.transition_to(stream, Rt, Sr);

        // Separable blur, ending back in `bright`.
        let blur = gpu.blur.id();
        let radius = self.settings.blur_radius;
        blur_pass(stream, &self.quad, blur, bright, &mut self.blur_temp, [1.0, 0.0], radius)?;
        blur_pass(stream, &self.quad, blur, temp, &mut self.bright, [0.0, 1.0], radius)?;

        // Composite.
        output.transition_to(stream, Sr, Rt);
        output.bind_as_target(stream);
        stream.set_pipeline(gpu.composite.id());
        stream.set_constants(&params);
        stream.bind_texture(0, scene);
        stream.bind_texture(1, bright);
        self.quad.draw(stream)?;
        output.transition_to(stream, Rt, Sr);

        Ok(())
    }

    // ── parameters ────────────────────────────────────────────────────────

    #[inline]
    pub fn settings(&self) -> BloomSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: BloomSettings) {
        self.settings = settings;
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.settings.threshold = threshold;
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.settings.intensity = intensity;
    }

    pub fn set_bloom_strength(&mut self, strength: f32) {
        self.settings.bloom_strength = strength;
    }

    pub fn set_blur_radius(&mut self, radius: f32) {
        self.settings.blur_radius = radius;
    }

    /// Holds the thresholded and blurred glow after `apply`.
    pub fn bright_surface(&self) -> &RenderSurface {
        &self.bright
    }

    pub fn blur_surface(&self) -> &RenderSurface {
        &self.blur_temp
    }
}

/// One blur direction: samples `source` (already a shader resource) into `dst`.
fn blur_pass(
    stream: &mut CommandStream,
    quad: &FullscreenPass,
    pipeline: PipelineId,
    source: BindingId,
    dst: &mut RenderSurface,
    direction: [f32; 2],
    blur_radius: f32,
) -> Result<(), GpuError> {
    let (w, h) = dst.size();
    let params = BlurParams {
        texel_size: [1.0 / w.max(1) as f32, 1.0 / h.max(1) as f32],
        direction,
        blur_radius,
        _pad: [0.0; 3],
    };

    dst.transition_to(stream, ResourceState::ShaderResource, ResourceState::RenderTarget);
    dst.bind_as_target(stream);
    stream.set_pipeline(pipeline);
    stream.set_constants(&params);
    stream.bind_texture(0, source);
    quad.draw(stream)?;
    dst.transition_to(stream, ResourceState::RenderTarget, ResourceState::ShaderResource);
    Ok(())
}
