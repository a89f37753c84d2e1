//! Deterministic CPU device.
//!
//! `HeadlessBackend` implements the full backend surface without a GPU or a
//! window: it executes command streams with the reference kernels in
//! [`raster`], tracks the true state of every resource, and counts every
//! barrier or usage that disagrees with it as a validation error. Fence
//! completion is simulated with a configurable latency so CPU/GPU
//! synchronization can be exercised in tests.

pub mod raster;

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::coords::{ScissorRect, Viewport};
use crate::effects::{BloomParams, BlurParams};
use crate::render::{LineVertex, ScreenConstants};
use crate::shaders::{names, ShaderLibrary};

use super::{
    BindingId, BlendMode, BufferDesc, BufferId, Command, CommandStream, ConstantBlock,
    GarbageList, GpuError, GpuQueue, IdAllocator, Owned, PipelineDesc, PipelineId, ReleaseQueue,
    RenderDevice, ResourceId, ResourceRef, ResourceState, SurfaceFailure, SwapChain, TargetRef,
    TextureDesc, TextureFormat, TextureId, VertexLayout, ViewId, ViewUsage,
};

use raster::{FullscreenKernel, Image, Region};

const BACKBUFFER_COUNT: usize = 2;

/// Construction parameters for [`HeadlessBackend`].
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub shaders: ShaderLibrary,

    /// Signaled fence values allowed in flight before the oldest completes.
    ///
    /// `0` completes work at signal time; `2` makes the CPU wait on the
    /// second frame of a double-buffered loop.
    pub gpu_latency: usize,

    /// Number of resource creations that succeed before allocation fails.
    pub allocation_budget: Option<usize>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            format: TextureFormat::Rgba8Unorm,
            shaders: ShaderLibrary::embedded_only(),
            gpu_latency: 1,
            allocation_budget: None,
        }
    }
}

/// Execution counters.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct HeadlessStats {
    pub executions: u64,
    pub draws: u64,
    pub vertices: u64,
    pub barriers: u64,
    pub uploads: u64,
    pub clears: u64,
    pub presents: u64,
    pub fence_waits: u64,
    pub validation_errors: u64,
}

/// Pixel stage selected from the fragment module of a pipeline.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Kernel {
    Lines,
    BrightPass,
    Blur,
    Composite,
    Blit,
}

impl Kernel {
    fn for_module(module: &str) -> Option<Self> {
        match module {
            names::LINE => Some(Kernel::Lines),
            names::BRIGHT_PASS => Some(Kernel::BrightPass),
            names::GAUSSIAN_BLUR => Some(Kernel::Blur),
            names::BLOOM_COMPOSITE => Some(Kernel::Composite),
            names::BLIT => Some(Kernel::Blit),
            _ => None,
        }
    }

    fn texture_slots(self) -> u32 {
        match self {
            Kernel::Lines => 0,
            Kernel::Composite => 2,
            _ => 1,
        }
    }

    fn vertex_layout(self) -> VertexLayout {
        match self {
            Kernel::Lines => VertexLayout::Line,
            _ => VertexLayout::Fullscreen,
        }
    }
}

struct TextureEntry {
    format: TextureFormat,
    image: Image,
    state: ResourceState,
}

struct ViewEntry {
    texture: TextureId,
    usage: ViewUsage,
}

struct BufferEntry {
    bytes: Vec<u8>,
    state: ResourceState,
}

struct PipelineEntry {
    label: String,
    kernel: Kernel,
    blend: BlendMode,
    format: TextureFormat,
}

struct Backbuffer {
    image: Image,
    state: ResourceState,
}

/// Simulated monotonic fence.
#[derive(Debug, Default)]
struct FenceSim {
    in_flight: VecDeque<u64>,
    completed: u64,
    latency: usize,
}

impl FenceSim {
    fn signal(&mut self, value: u64) {
        self.in_flight.push_back(value);
        while self.in_flight.len() > self.latency {
            self.retire_one();
        }
    }

    fn retire_one(&mut self) {
        if let Some(v) = self.in_flight.pop_front() {
            self.completed = self.completed.max(v);
        }
    }

    fn highest_signaled(&self) -> u64 {
        self.in_flight.back().copied().unwrap_or(self.completed)
    }
}

/// Pipeline bindings accumulated while replaying one stream.
#[derive(Default)]
struct Bindings {
    target: Option<TargetRef>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    pipeline: Option<PipelineId>,
    constants: Option<ConstantBlock>,
    textures: [Option<BindingId>; 2],
    vertex_buffer: Option<BufferId>,
}

pub struct HeadlessBackend {
    format: TextureFormat,
    width: u32,
    height: u32,
    shaders: ShaderLibrary,

    ids: IdAllocator,
    release: Rc<ReleaseQueue>,
    garbage: GarbageList,
    allocation_budget: Option<usize>,

    textures: HashMap<TextureId, TextureEntry>,
    views: HashMap<ViewId, ViewEntry>,
    bindings: HashMap<BindingId, ViewId>,
    buffers: HashMap<BufferId, BufferEntry>,
    pipelines: HashMap<PipelineId, PipelineEntry>,

    backbuffers: Vec<Backbuffer>,
    acquired: Option<u32>,
    injected_failure: Option<SurfaceFailure>,

    fence: FenceSim,
    stats: HeadlessStats,
}

impl HeadlessBackend {
    pub fn new(config: HeadlessConfig) -> Self {
        let HeadlessConfig {
            width,
            height,
            format,
            shaders,
            gpu_latency,
            allocation_budget,
        } = config;

        let (width, height) = (width.max(1), height.max(1));

        Self {
            format,
            width,
            height,
            shaders,
            ids: IdAllocator::default(),
            release: ReleaseQueue::new(),
            garbage: GarbageList::default(),
            allocation_budget,
            textures: HashMap::new(),
            views: HashMap::new(),
            bindings: HashMap::new(),
            buffers: HashMap::new(),
            pipelines: HashMap::new(),
            backbuffers: make_backbuffers(width, height),
            acquired: None,
            injected_failure: None,
            fence: FenceSim {
                latency: gpu_latency,
                ..FenceSim::default()
            },
            stats: HeadlessStats::default(),
        }
    }

    /// Backend with default configuration at `width × height`.
    pub fn with_size(width: u32, height: u32) -> Self {
        Self::new(HeadlessConfig {
            width,
            height,
            ..HeadlessConfig::default()
        })
    }

    // ── inspection ────────────────────────────────────────────────────────

    #[inline]
    pub fn stats(&self) -> HeadlessStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = HeadlessStats::default();
    }

    pub fn texture_image(&self, texture: TextureId) -> Option<&Image> {
        self.textures.get(&texture).map(|t| &t.image)
    }

    pub fn backbuffer_image(&self, index: u32) -> Option<&Image> {
        self.backbuffers.get(index as usize).map(|b| &b.image)
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.bytes.as_slice())
    }

    /// True device-side state of a resource.
    pub fn resource_state(&self, resource: ResourceRef) -> Option<ResourceState> {
        match resource {
            ResourceRef::Texture(id) => self.textures.get(&id).map(|t| t.state),
            ResourceRef::Buffer(id) => self.buffers.get(&id).map(|b| b.state),
            ResourceRef::Backbuffer(i) => self.backbuffers.get(i as usize).map(|b| b.state),
        }
    }

    /// Resources that have not been destroyed yet.
    pub fn live_resources(&self) -> usize {
        self.textures.len()
            + self.views.len()
            + self.bindings.len()
            + self.buffers.len()
            + self.pipelines.len()
    }

    /// Released resources still waiting on a fence.
    pub fn pending_release(&self) -> usize {
        self.garbage.len() + self.release.len()
    }

    /// Makes the next `acquire` fail with `failure`.
    pub fn inject_surface_failure(&mut self, failure: SurfaceFailure) {
        self.injected_failure = Some(failure);
    }

    // ── allocation ────────────────────────────────────────────────────────

    fn allocate(&mut self, label: &str) -> Result<u32, GpuError> {
        if let Some(budget) = self.allocation_budget.as_mut() {
            if *budget == 0 {
                return Err(GpuError::ResourceCreation {
                    label: label.to_string(),
                    reason: "allocation budget exhausted".into(),
                });
            }
            *budget -= 1;
        }
        Ok(self.ids.next())
    }

    fn destroy(&mut self, id: ResourceId) {
        let found = match id {
            ResourceId::Texture(id) => self.textures.remove(&id).is_some(),
            ResourceId::View(id) => self.views.remove(&id).is_some(),
            ResourceId::Binding(id) => self.bindings.remove(&id).is_some(),
            ResourceId::Buffer(id) => self.buffers.remove(&id).is_some(),
            ResourceId::Pipeline(id) => self.pipelines.remove(&id).is_some(),
        };
        if !found {
            log::warn!("headless: release of unknown resource {id:?}");
        }
    }

    // ── validation ────────────────────────────────────────────────────────

    fn invalid(&mut self, what: std::fmt::Arguments<'_>) {
        self.stats.validation_errors += 1;
        log::warn!("headless validation: {what}");
    }

    fn texture_of_view(&self, view: ViewId) -> Option<(TextureId, ViewUsage)> {
        self.views.get(&view).map(|v| (v.texture, v.usage))
    }

    fn target_info(&self, target: TargetRef) -> Option<(ResourceState, TextureFormat)> {
        match target {
            TargetRef::View(view) => {
                let (texture, _) = self.texture_of_view(view)?;
                self.textures.get(&texture).map(|t| (t.state, t.format))
            }
            TargetRef::Backbuffer(i) => self.backbuffers.get(i as usize).map(|b| (b.state, self.format)),
        }
    }

    fn check_target(&mut self, target: TargetRef) -> Option<TextureFormat> {
        if let TargetRef::Backbuffer(i) = target {
            if self.acquired != Some(i) {
                self.invalid(format_args!("backbuffer {i} used without being acquired"));
            }
        }
        match self.target_info(target) {
            None => {
                self.invalid(format_args!("unknown render target {target:?}"));
                None
            }
            Some((state, format)) => {
                if state != ResourceState::RenderTarget {
                    self.invalid(format_args!("{target:?} written while in {state:?}"));
                }
                Some(format)
            }
        }
    }

    fn sampled_texture(&mut self, binding: BindingId) -> Option<TextureId> {
        let texture = self
            .bindings
            .get(&binding)
            .and_then(|view| self.texture_of_view(*view))
            .map(|(texture, _)| texture);

        match texture.and_then(|t| self.textures.get(&t).map(|e| (t, e.state))) {
            None => {
                self.invalid(format_args!("unknown texture binding {binding:?}"));
                None
            }
            Some((texture, state)) => {
                if state != ResourceState::ShaderResource {
                    self.invalid(format_args!("{texture:?} sampled while in {state:?}"));
                }
                Some(texture)
            }
        }
    }

    // ── execution ─────────────────────────────────────────────────────────

    fn apply_barrier(&mut self, resource: ResourceRef, before: ResourceState, after: ResourceState) {
        self.stats.barriers += 1;

        let slot = match resource {
            ResourceRef::Texture(id) => self.textures.get_mut(&id).map(|t| &mut t.state),
            ResourceRef::Buffer(id) => self.buffers.get_mut(&id).map(|b| &mut b.state),
            ResourceRef::Backbuffer(i) => self.backbuffers.get_mut(i as usize).map(|b| &mut b.state),
        };

        let Some(state) = slot else {
            self.invalid(format_args!("barrier on unknown resource {resource:?}"));
            return;
        };

        let actual = *state;
        *state = after;
        if actual != before {
            self.invalid(format_args!(
                "{resource:?}: barrier {before:?} -> {after:?} but resource is {actual:?}"
            ));
        }
    }

    fn clear(&mut self, target: TargetRef, color: [f32; 4]) {
        self.stats.clears += 1;
        self.check_target(target);

        let clamp = self.target_normalized(target);
        let color = if clamp { color.map(|c| c.clamp(0.0, 1.0)) } else { color };

        if let Some(image) = self.target_image_mut(target) {
            image.fill(color);
        }
    }

    fn upload(&mut self, stream: &CommandStream, dst: BufferId, offset: u64, bytes: std::ops::Range<usize>) {
        self.stats.uploads += 1;

        let Some(data) = stream.upload_bytes(bytes) else {
            self.invalid(format_args!("upload range outside the stream arena"));
            return;
        };

        let Some(buffer) = self.buffers.get_mut(&dst) else {
            self.invalid(format_args!("upload into unknown buffer {dst:?}"));
            return;
        };

        let state = buffer.state;
        let start = offset as usize;
        let end = start + data.len();
        let in_bounds = end <= buffer.bytes.len();
        if in_bounds {
            buffer.bytes[start..end].copy_from_slice(data);
        }

        if state != ResourceState::CopyDestination {
            self.invalid(format_args!("upload into {dst:?} while in {state:?}"));
        }
        if !in_bounds {
            self.invalid(format_args!("upload of {end} bytes overflows {dst:?}"));
        }
    }

    fn draw(&mut self, bind: &Bindings, vertex_count: u32) {
        self.stats.draws += 1;
        self.stats.vertices += u64::from(vertex_count);

        let Some(pipeline) = bind.pipeline.and_then(|p| self.pipelines.get(&p)) else {
            self.invalid(format_args!("draw without a pipeline"));
            return;
        };
        let (label, kernel, blend, pipeline_format) = (
            pipeline.label.clone(),
            pipeline.kernel,
            pipeline.blend,
            pipeline.format,
        );

        let Some(target) = bind.target else {
            self.invalid(format_args!("{label}: draw without a render target"));
            return;
        };
        let Some(target_format) = self.check_target(target) else { return };
        if target_format != pipeline_format {
            self.invalid(format_args!(
                "{label}: pipeline targets {pipeline_format:?} but target is {target_format:?}"
            ));
        }

        let vertices = match bind.vertex_buffer {
            None => {
                self.invalid(format_args!("{label}: draw without a vertex buffer"));
                return;
            }
            Some(vb) => match self.buffers.get(&vb) {
                None => {
                    self.invalid(format_args!("{label}: unknown vertex buffer {vb:?}"));
                    return;
                }
                Some(buffer) => {
                    let state = buffer.state;
                    let bytes = buffer.bytes.clone();
                    if state != ResourceState::VertexBuffer {
                        self.invalid(format_args!("{label}: {vb:?} drawn while in {state:?}"));
                    }
                    bytes
                }
            },
        };

        let mut sources = Vec::with_capacity(2);
        for slot in 0..kernel.texture_slots() as usize {
            match bind.textures[slot] {
                Some(binding) => match self.sampled_texture(binding) {
                    Some(texture) => sources.push(texture),
                    None => return,
                },
                None => {
                    self.invalid(format_args!("{label}: texture slot {slot} unbound"));
                    return;
                }
            }
        }

        let Some(mut image) = self.take_target_image(target) else { return };
        let viewport = bind
            .viewport
            .unwrap_or_else(|| Viewport::full(image.width(), image.height()));
        let region = Region::of(&image, viewport, bind.scissor);
        let clamp = self.target_normalized(target);

        match kernel {
            Kernel::Lines => {
                let screen = bind
                    .constants
                    .and_then(|c| c.read::<ScreenConstants>())
                    .unwrap_or_else(|| ScreenConstants::new(image.width(), image.height()));
                let needed = vertex_count as usize * std::mem::size_of::<LineVertex>();
                match vertices.get(..needed) {
                    Some(bytes) => {
                        let verts: Vec<LineVertex> = bytes
                            .chunks_exact(std::mem::size_of::<LineVertex>())
                            .map(bytemuck::pod_read_unaligned)
                            .collect();
                        raster::raster_lines(&mut image, &verts, screen, viewport, region, blend, clamp);
                    }
                    None => self.invalid(format_args!(
                        "{label}: draw of {vertex_count} vertices overruns the vertex buffer"
                    )),
                }
            }
            _ => self.run_fullscreen_kernel(
                kernel,
                &label,
                bind.constants,
                &sources,
                &mut image,
                viewport,
                region,
                blend,
                clamp,
            ),
        }

        self.restore_target_image(target, image);
    }

    #[allow(clippy::too_many_arguments)]
    fn run_fullscreen_kernel(
        &mut self,
        kernel: Kernel,
        label: &str,
        constants: Option<ConstantBlock>,
        sources: &[TextureId],
        image: &mut Image,
        viewport: Viewport,
        region: Region,
        blend: BlendMode,
        clamp: bool,
    ) {
        let images: Vec<&Image> = sources
            .iter()
            .filter_map(|t| self.textures.get(t).map(|e| &e.image))
            .collect();

        let pass = match (kernel, images.as_slice()) {
            (Kernel::BrightPass, &[source]) => constants
                .and_then(|c| c.read::<BloomParams>())
                .map(|params| FullscreenKernel::BrightPass { source, params }),
            (Kernel::Blur, &[source]) => constants
                .and_then(|c| c.read::<BlurParams>())
                .map(|params| FullscreenKernel::Blur { source, params }),
            (Kernel::Composite, &[scene, bloom]) => constants
                .and_then(|c| c.read::<BloomParams>())
                .map(|params| FullscreenKernel::Composite { scene, bloom, params }),
            (Kernel::Blit, &[source]) => Some(FullscreenKernel::Blit { source }),
            _ => None,
        };

        let ran = match pass {
            Some(pass) => {
                raster::run_fullscreen(image, &pass, viewport, region, blend, clamp);
                true
            }
            None => false,
        };
        if !ran {
            self.invalid(format_args!("{label}: missing constants or textures"));
        }
    }

    fn target_normalized(&self, target: TargetRef) -> bool {
        self.target_info(target)
            .map(|(_, format)| format.is_normalized())
            .unwrap_or(true)
    }

    fn target_image_mut(&mut self, target: TargetRef) -> Option<&mut Image> {
        match target {
            TargetRef::View(view) => {
                let (texture, _) = self.texture_of_view(view)?;
                self.textures.get_mut(&texture).map(|t| &mut t.image)
            }
            TargetRef::Backbuffer(i) => self.backbuffers.get_mut(i as usize).map(|b| &mut b.image),
        }
    }

    /// Moves the target image out so sources can be borrowed while writing.
    fn take_target_image(&mut self, target: TargetRef) -> Option<Image> {
        self.target_image_mut(target)
            .map(|image| std::mem::replace(image, Image::new(0, 0, [0.0; 4])))
    }

    fn restore_target_image(&mut self, target: TargetRef, image: Image) {
        if let Some(slot) = self.target_image_mut(target) {
            *slot = image;
        }
    }
}

fn make_backbuffers(width: u32, height: u32) -> Vec<Backbuffer> {
    (0..BACKBUFFER_COUNT)
        .map(|_| Backbuffer {
            image: Image::new(width, height, [0.0, 0.0, 0.0, 1.0]),
            state: ResourceState::Presentable,
        })
        .collect()
}

impl RenderDevice for HeadlessBackend {
    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<Owned<TextureId>, GpuError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GpuError::InvalidDimensions {
                width: desc.width,
                height: desc.height,
            });
        }

        let id = TextureId::from_raw(self.allocate(desc.label)?);
        self.textures.insert(
            id,
            TextureEntry {
                format: desc.format,
                image: Image::new(desc.width, desc.height, [0.0; 4]),
                state: ResourceState::RenderTarget,
            },
        );
        log::trace!("headless: texture {id:?} `{}` {}x{}", desc.label, desc.width, desc.height);
        Ok(Owned::new(id, &self.release))
    }

    fn create_view(&mut self, texture: TextureId, usage: ViewUsage) -> Result<Owned<ViewId>, GpuError> {
        if !self.textures.contains_key(&texture) {
            return Err(GpuError::UnknownResource { kind: "texture" });
        }
        let id = ViewId::from_raw(self.allocate("view")?);
        self.views.insert(id, ViewEntry { texture, usage });
        Ok(Owned::new(id, &self.release))
    }

    fn create_sampled_binding(&mut self, view: ViewId) -> Result<Owned<BindingId>, GpuError> {
        match self.views.get(&view) {
            None => return Err(GpuError::UnknownResource { kind: "view" }),
            Some(v) if v.usage != ViewUsage::Sampled => {
                return Err(GpuError::ResourceCreation {
                    label: "sampled binding".into(),
                    reason: "view is not sampleable".into(),
                });
            }
            Some(_) => {}
        }
        let id = BindingId::from_raw(self.allocate("sampled binding")?);
        self.bindings.insert(id, view);
        Ok(Owned::new(id, &self.release))
    }

    fn create_buffer(
        &mut self,
        desc: &BufferDesc<'_>,
        contents: Option<&[u8]>,
    ) -> Result<Owned<BufferId>, GpuError> {
        let mut bytes = vec![0u8; desc.size as usize];
        if let Some(data) = contents {
            if data.len() > bytes.len() {
                return Err(GpuError::ResourceCreation {
                    label: desc.label.to_string(),
                    reason: format!("{} initial bytes exceed size {}", data.len(), desc.size),
                });
            }
            bytes[..data.len()].copy_from_slice(data);
        }

        let id = BufferId::from_raw(self.allocate(desc.label)?);
        self.buffers.insert(
            id,
            BufferEntry {
                bytes,
                state: desc.initial_state,
            },
        );
        Ok(Owned::new(id, &self.release))
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc<'_>) -> Result<Owned<PipelineId>, GpuError> {
        let fail = |reason: String| GpuError::PipelineCreation {
            label: desc.label.to_string(),
            reason,
        };

        for stage in [desc.vertex, desc.fragment] {
            let source = self.shaders.load(stage.module)?;
            if !source.contains(&format!("fn {}", stage.entry)) {
                return Err(fail(format!(
                    "entry point `{}` not found in `{}`",
                    stage.entry, stage.module
                )));
            }
        }

        let kernel = Kernel::for_module(desc.fragment.module)
            .ok_or_else(|| fail(format!("no pixel kernel for `{}`", desc.fragment.module)))?;

        if kernel.texture_slots() != desc.texture_slots {
            return Err(fail(format!(
                "`{}` samples {} textures, layout declares {}",
                desc.fragment.module,
                kernel.texture_slots(),
                desc.texture_slots
            )));
        }
        if kernel.vertex_layout() != desc.vertex_layout {
            return Err(fail(format!("vertex layout {:?} does not match", desc.vertex_layout)));
        }

        let id = PipelineId::from_raw(self.allocate(desc.label)?);
        self.pipelines.insert(
            id,
            PipelineEntry {
                label: desc.label.to_string(),
                kernel,
                blend: desc.blend,
                format: desc.target_format,
            },
        );
        log::debug!("headless: pipeline {id:?} `{}`", desc.label);
        Ok(Owned::new(id, &self.release))
    }

    fn collect_garbage(&mut self, pending_fence: u64, completed_fence: u64) {
        for id in self.garbage.collect(&self.release, pending_fence, completed_fence) {
            self.destroy(id);
        }
    }
}

impl GpuQueue for HeadlessBackend {
    fn execute(&mut self, stream: &CommandStream) -> Result<(), GpuError> {
        self.stats.executions += 1;
        if !stream.is_closed() {
            self.invalid(format_args!("{}: executed while still recording", stream.label()));
        }

        let mut bind = Bindings::default();
        for command in stream.commands() {
            match command {
                Command::Barrier { resource, before, after } => {
                    self.apply_barrier(*resource, *before, *after)
                }
                Command::ClearTarget { target, color } => self.clear(*target, *color),
                Command::SetRenderTarget(target) => bind.target = Some(*target),
                Command::SetViewport(vp) => bind.viewport = Some(*vp),
                Command::SetScissor(rect) => bind.scissor = Some(*rect),
                Command::SetPipeline(p) => bind.pipeline = Some(*p),
                Command::SetConstants(block) => bind.constants = Some(*block),
                Command::BindTexture { slot, binding } => match bind.textures.get_mut(*slot as usize) {
                    Some(entry) => *entry = Some(*binding),
                    None => self.invalid(format_args!("texture slot {slot} out of range")),
                },
                Command::SetVertexBuffer(vb) => bind.vertex_buffer = Some(*vb),
                Command::Upload { dst, offset, bytes } => {
                    self.upload(stream, *dst, *offset, bytes.clone())
                }
                Command::Draw { vertex_count } => self.draw(&bind, *vertex_count),
            }
        }
        Ok(())
    }

    fn signal(&mut self, value: u64) {
        self.fence.signal(value);
    }

    fn completed_fence(&mut self) -> u64 {
        self.fence.completed
    }

    fn wait_for_fence(&mut self, value: u64) -> Result<(), GpuError> {
        if self.fence.completed >= value {
            return Ok(());
        }
        if self.fence.highest_signaled() < value {
            return Err(GpuError::FenceNeverSignaled { value });
        }

        self.stats.fence_waits += 1;
        while self.fence.completed < value {
            self.fence.retire_one();
        }
        Ok(())
    }
}

impl SwapChain for HeadlessBackend {
    fn backbuffer_count(&self) -> usize {
        BACKBUFFER_COUNT
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn acquire(&mut self, index: u32) -> Result<(), GpuError> {
        if let Some(failure) = self.injected_failure.take() {
            return Err(failure.into());
        }
        if index as usize >= self.backbuffers.len() {
            return Err(GpuError::UnknownResource { kind: "backbuffer" });
        }
        self.acquired = Some(index);
        Ok(())
    }

    fn present(&mut self, _vsync: bool) -> Result<(), GpuError> {
        self.stats.presents += 1;
        match self.acquired.take() {
            None => self.invalid(format_args!("present without an acquired backbuffer")),
            Some(i) => {
                let state = self.backbuffers[i as usize].state;
                if state != ResourceState::Presentable {
                    self.invalid(format_args!("backbuffer {i} presented while in {state:?}"));
                }
            }
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.width = width;
        self.height = height;
        self.backbuffers = make_backbuffers(width, height);
        self.acquired = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ShaderStage;

    fn backend() -> HeadlessBackend {
        HeadlessBackend::with_size(8, 8)
    }

    fn texture_desc(width: u32, height: u32) -> TextureDesc<'static> {
        TextureDesc {
            label: "test texture",
            width,
            height,
            format: TextureFormat::Rgba8Unorm,
        }
    }

    fn blit_desc() -> PipelineDesc<'static> {
        PipelineDesc {
            label: "test blit",
            vertex: ShaderStage::new(names::FULLSCREEN, "vs_main"),
            fragment: ShaderStage::new(names::BLIT, "fs_main"),
            vertex_layout: VertexLayout::Fullscreen,
            topology: crate::device::Topology::TriangleStrip,
            blend: BlendMode::Replace,
            texture_slots: 1,
            target_format: TextureFormat::Rgba8Unorm,
        }
    }

    // ── resources ─────────────────────────────────────────────────────────

    #[test]
    fn zero_sized_texture_is_rejected() {
        let mut dev = backend();
        let err = dev.create_texture(&texture_desc(0, 4)).unwrap_err();
        assert!(matches!(err, GpuError::InvalidDimensions { width: 0, height: 4 }));
        assert_eq!(dev.live_resources(), 0);
    }

    #[test]
    fn released_resources_wait_for_their_fence() {
        let mut dev = backend();
        let tex = dev.create_texture(&texture_desc(4, 4)).unwrap();
        assert_eq!(dev.live_resources(), 1);

        drop(tex);
        dev.collect_garbage(3, 2);
        assert_eq!(dev.live_resources(), 1);
        assert_eq!(dev.pending_release(), 1);

        dev.collect_garbage(4, 3);
        assert_eq!(dev.live_resources(), 0);
        assert_eq!(dev.pending_release(), 0);
    }

    #[test]
    fn allocation_budget_fails_creation() {
        let mut dev = HeadlessBackend::new(HeadlessConfig {
            allocation_budget: Some(1),
            ..HeadlessConfig::default()
        });
        let _tex = dev.create_texture(&texture_desc(4, 4)).unwrap();
        let err = dev.create_texture(&texture_desc(4, 4)).unwrap_err();
        assert!(matches!(err, GpuError::ResourceCreation { .. }));
    }

    #[test]
    fn binding_requires_sampled_view() {
        let mut dev = backend();
        let tex = dev.create_texture(&texture_desc(4, 4)).unwrap();
        let rtv = dev.create_view(tex.id(), ViewUsage::RenderTarget).unwrap();
        let srv = dev.create_view(tex.id(), ViewUsage::Sampled).unwrap();

        assert!(dev.create_sampled_binding(rtv.id()).is_err());
        assert!(dev.create_sampled_binding(srv.id()).is_ok());
    }

    // ── pipelines ─────────────────────────────────────────────────────────

    #[test]
    fn pipeline_needs_shaders() {
        let mut dev = HeadlessBackend::new(HeadlessConfig {
            shaders: ShaderLibrary::empty(),
            ..HeadlessConfig::default()
        });
        let err = dev.create_pipeline(&blit_desc()).unwrap_err();
        assert!(matches!(err, GpuError::MissingShader { .. }));
    }

    #[test]
    fn pipeline_checks_entry_points_and_slots() {
        let mut dev = backend();

        let mut desc = blit_desc();
        desc.fragment = ShaderStage::new(names::BLIT, "missing_entry");
        assert!(matches!(dev.create_pipeline(&desc), Err(GpuError::PipelineCreation { .. })));

        let mut desc = blit_desc();
        desc.texture_slots = 2;
        assert!(matches!(dev.create_pipeline(&desc), Err(GpuError::PipelineCreation { .. })));

        assert!(dev.create_pipeline(&blit_desc()).is_ok());
    }

    // ── execution ─────────────────────────────────────────────────────────

    #[test]
    fn clear_needs_render_target_state() {
        let mut dev = backend();
        let tex = dev.create_texture(&texture_desc(2, 2)).unwrap();
        let rtv = dev.create_view(tex.id(), ViewUsage::RenderTarget).unwrap();

        let mut stream = CommandStream::new("test");
        stream.clear_target(TargetRef::View(rtv.id()), [1.0, 0.0, 0.0, 1.0]);
        stream.barrier(
            ResourceRef::Texture(tex.id()),
            ResourceState::RenderTarget,
            ResourceState::ShaderResource,
        );
        stream.clear_target(TargetRef::View(rtv.id()), [0.0, 1.0, 0.0, 1.0]);
        stream.close();
        dev.execute(&stream).unwrap();

        assert_eq!(dev.stats().clears, 2);
        assert_eq!(dev.stats().validation_errors, 1);
        assert_eq!(
            dev.resource_state(ResourceRef::Texture(tex.id())),
            Some(ResourceState::ShaderResource)
        );
    }

    #[test]
    fn wrong_barrier_source_is_a_validation_error() {
        let mut dev = backend();
        let tex = dev.create_texture(&texture_desc(2, 2)).unwrap();

        let mut stream = CommandStream::new("test");
        stream.barrier(
            ResourceRef::Texture(tex.id()),
            ResourceState::ShaderResource,
            ResourceState::RenderTarget,
        );
        stream.close();
        dev.execute(&stream).unwrap();

        assert_eq!(dev.stats().validation_errors, 1);
    }

    #[test]
    fn upload_requires_copy_destination() {
        let mut dev = backend();
        let buf = dev
            .create_buffer(
                &BufferDesc {
                    label: "vb",
                    size: 8,
                    initial_state: ResourceState::VertexBuffer,
                },
                None,
            )
            .unwrap();
        let buf_ref = ResourceRef::Buffer(buf.id());

        let mut stream = CommandStream::new("test");
        stream.upload(buf.id(), 0, &[1, 2, 3, 4]);
        stream.barrier(buf_ref, ResourceState::VertexBuffer, ResourceState::CopyDestination);
        stream.upload(buf.id(), 4, &[5, 6, 7, 8]);
        stream.barrier(buf_ref, ResourceState::CopyDestination, ResourceState::VertexBuffer);
        stream.close();
        dev.execute(&stream).unwrap();

        assert_eq!(dev.stats().validation_errors, 1);
        assert_eq!(dev.buffer_contents(buf.id()), Some(&[1, 2, 3, 4, 5, 6, 7, 8][..]));
    }

    #[test]
    fn blit_copies_sampled_texture_to_backbuffer() {
        use crate::render::FULLSCREEN_QUAD;

        let mut dev = backend();
        let tex = dev.create_texture(&texture_desc(4, 4)).unwrap();
        let rtv = dev.create_view(tex.id(), ViewUsage::RenderTarget).unwrap();
        let srv = dev.create_view(tex.id(), ViewUsage::Sampled).unwrap();
        let binding = dev.create_sampled_binding(srv.id()).unwrap();
        let quad = dev
            .create_buffer(
                &BufferDesc {
                    label: "quad",
                    size: std::mem::size_of_val(&FULLSCREEN_QUAD) as u64,
                    initial_state: ResourceState::VertexBuffer,
                },
                Some(bytemuck::cast_slice(&FULLSCREEN_QUAD)),
            )
            .unwrap();
        let pipeline = dev.create_pipeline(&blit_desc()).unwrap();

        dev.acquire(0).unwrap();
        let mut stream = CommandStream::new("test");
        stream.clear_target(TargetRef::View(rtv.id()), [0.0, 0.5, 1.0, 1.0]);
        stream.barrier(
            ResourceRef::Texture(tex.id()),
            ResourceState::RenderTarget,
            ResourceState::ShaderResource,
        );
        stream.barrier(ResourceRef::Backbuffer(0), ResourceState::Presentable, ResourceState::RenderTarget);
        stream.bind_full_target(TargetRef::Backbuffer(0), 8, 8);
        stream.set_pipeline(pipeline.id());
        stream.bind_texture(0, binding.id());
        stream.set_vertex_buffer(quad.id());
        stream.draw(4);
        stream.barrier(ResourceRef::Backbuffer(0), ResourceState::RenderTarget, ResourceState::Presentable);
        stream.close();

        dev.execute(&stream).unwrap();
        dev.present(true).unwrap();

        assert_eq!(dev.stats().validation_errors, 0);
        let image = dev.backbuffer_image(0).unwrap();
        assert!(image.pixels().iter().all(|p| *p == [0.0, 0.5, 1.0, 1.0]));
    }

    // ── fence ─────────────────────────────────────────────────────────────

    #[test]
    fn fence_completes_after_latency() {
        let mut dev = HeadlessBackend::new(HeadlessConfig {
            gpu_latency: 2,
            ..HeadlessConfig::default()
        });

        dev.signal(1);
        dev.signal(2);
        assert_eq!(dev.completed_fence(), 0);
        dev.signal(3);
        assert_eq!(dev.completed_fence(), 1);

        dev.wait_for_fence(3).unwrap();
        assert_eq!(dev.completed_fence(), 3);
        assert_eq!(dev.stats().fence_waits, 1);

        dev.wait_for_fence(2).unwrap();
        assert_eq!(dev.stats().fence_waits, 1);
    }

    #[test]
    fn waiting_on_unsignaled_value_fails() {
        let mut dev = backend();
        dev.signal(1);
        assert!(matches!(
            dev.wait_for_fence(5),
            Err(GpuError::FenceNeverSignaled { value: 5 })
        ));
    }

    #[test]
    fn injected_surface_failure_hits_next_acquire_only() {
        let mut dev = backend();
        dev.inject_surface_failure(SurfaceFailure::Timeout);
        assert!(matches!(
            dev.acquire(0),
            Err(GpuError::Surface(SurfaceFailure::Timeout))
        ));
        assert!(dev.acquire(0).is_ok());
    }
}
