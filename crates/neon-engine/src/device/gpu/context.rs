use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::coords::{ScissorRect, Viewport};
use crate::device::{
    BindingId, BlendMode, BufferDesc, BufferId, Command, CommandStream, GarbageList, GpuError,
    GpuQueue, IdAllocator, Owned, PipelineDesc, PipelineId, ReleaseQueue, RenderDevice,
    ResourceId, ResourceRef, ResourceState, SwapChain, TargetRef, TextureDesc, TextureFormat,
    TextureId, Topology, VertexLayout, ViewId, ViewUsage, MAX_CONSTANT_BYTES,
};
use crate::render::{FullscreenVertex, LineVertex};
use crate::shaders::ShaderLibrary;

use super::init::GpuInit;
use super::surface::{
    choose_alpha_mode, choose_surface_format, map_surface_error, present_mode, to_wgpu_format,
};

const BACKBUFFER_COUNT: usize = 2;

/// Longest a fence wait may block before it is reported as failed.
const FENCE_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_TEXTURE_SLOTS: usize = 2;

struct TextureEntry {
    texture: wgpu::Texture,
    format: TextureFormat,
    state: ResourceState,
}

struct ViewEntry {
    view: wgpu::TextureView,
    texture: TextureId,
    usage: ViewUsage,
}

struct BufferEntry {
    buffer: wgpu::Buffer,
    size: u64,
    state: ResourceState,
}

struct BindingEntry {
    group: wgpu::BindGroup,
    texture: TextureId,
}

struct PipelineEntry {
    pipeline: wgpu::RenderPipeline,
    label: String,
    texture_slots: u32,
    format: TextureFormat,
}

/// Per-command constant blocks, one aligned slot each.
///
/// Slot 0 is kept zeroed for draws that never set constants.
struct ConstantRing {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: usize,
    stride: usize,
}

struct AcquiredFrame {
    index: u32,
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

/// Everything one draw needs, resolved before encoding.
struct DrawOp {
    target: wgpu::TextureView,
    target_size: (u32, u32),
    pipeline: wgpu::RenderPipeline,
    constants_offset: u32,
    textures: Vec<wgpu::BindGroup>,
    vertex_buffer: wgpu::Buffer,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    vertex_count: u32,
}

enum Op {
    Clear {
        target: wgpu::TextureView,
        color: wgpu::Color,
    },
    Copy {
        staging: wgpu::Buffer,
        dst: wgpu::Buffer,
        offset: u64,
        size: u64,
    },
    Draw(DrawOp),
}

#[derive(Default)]
struct Bindings {
    target: Option<TargetRef>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    pipeline: Option<PipelineId>,
    constants_slot: usize,
    textures: [Option<BindingId>; MAX_TEXTURE_SLOTS],
    vertex_buffer: Option<BufferId>,
}

/// wgpu device bound to a window surface.
///
/// Owns the device, queue and surface; resources live in id-keyed tables and
/// are destroyed through the same fence-tagged release path as the headless
/// backend. Command streams are replayed into one encoder per `execute`.
pub struct WgpuBackend<'w> {
    surface: wgpu::Surface<'w>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    format: TextureFormat,
    vsync: bool,

    shaders: ShaderLibrary,
    modules: HashMap<String, (wgpu::ShaderModule, Cow<'static, str>)>,

    ids: IdAllocator,
    release: Rc<ReleaseQueue>,
    garbage: GarbageList,

    textures: HashMap<TextureId, TextureEntry>,
    views: HashMap<ViewId, ViewEntry>,
    bindings: HashMap<BindingId, BindingEntry>,
    buffers: HashMap<BufferId, BufferEntry>,
    pipelines: HashMap<PipelineId, PipelineEntry>,

    constants_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    ring: ConstantRing,

    frame: Option<AcquiredFrame>,
    backbuffer_states: [ResourceState; BACKBUFFER_COUNT],

    completed: Arc<AtomicU64>,
    pending: VecDeque<(u64, wgpu::SubmissionIndex)>,
    highest_signaled: u64,

    validation_errors: u64,
}

impl<'w> WgpuBackend<'w> {
    /// Creates a device and configures a surface for `window`.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(window: &'w Window, init: GpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        log::info!("using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("neon device"),
                required_features: init.required_features,
                required_limits: init.required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let caps = surface.get_capabilities(&adapter);
        let format = choose_surface_format(&caps.formats, init.prefer_srgb)
            .context("no supported surface formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: to_wgpu_format(format),
            width: size.width,
            height: size.height,
            present_mode: present_mode(true),
            alpha_mode: choose_alpha_mode(&caps.alpha_modes, init.alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        surface.configure(&device, &config);

        let constants_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("neon constants layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("neon texture layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("neon linear clamp sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let stride = (device.limits().min_uniform_buffer_offset_alignment as usize)
            .max(MAX_CONSTANT_BYTES);
        let ring = create_ring(&device, &constants_layout, 64, stride);

        log::info!(
            "surface configured: {}x{} {:?}",
            config.width,
            config.height,
            config.format
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            format,
            vsync: true,
            shaders: init.shaders,
            modules: HashMap::new(),
            ids: IdAllocator::default(),
            release: ReleaseQueue::new(),
            garbage: GarbageList::default(),
            textures: HashMap::new(),
            views: HashMap::new(),
            bindings: HashMap::new(),
            buffers: HashMap::new(),
            pipelines: HashMap::new(),
            constants_layout,
            texture_layout,
            sampler,
            ring,
            frame: None,
            backbuffer_states: [ResourceState::Presentable; BACKBUFFER_COUNT],
            completed: Arc::new(AtomicU64::new(0)),
            pending: VecDeque::new(),
            highest_signaled: 0,
            validation_errors: 0,
        })
    }

    /// Commands skipped or corrected because they disagreed with tracked state.
    #[inline]
    pub fn validation_errors(&self) -> u64 {
        self.validation_errors
    }

    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Resources that have not been destroyed yet.
    pub fn live_resources(&self) -> usize {
        self.textures.len()
            + self.views.len()
            + self.bindings.len()
            + self.buffers.len()
            + self.pipelines.len()
    }

    fn invalid(&mut self, what: std::fmt::Arguments<'_>) {
        self.validation_errors += 1;
        log::warn!("gpu validation: {what}");
    }

    fn module(&mut self, name: &str) -> Result<(wgpu::ShaderModule, Cow<'static, str>), GpuError> {
        if let Some(entry) = self.modules.get(name) {
            return Ok(entry.clone());
        }

        let source = self.shaders.load(name)?;
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(source.clone()),
        });
        log::debug!("compiled shader module `{name}`");

        self.modules
            .insert(name.to_string(), (module.clone(), source.clone()));
        Ok((module, source))
    }

    fn destroy(&mut self, id: ResourceId) {
        let found = match id {
            ResourceId::Texture(id) => self.textures.remove(&id).map(|t| t.texture.destroy()).is_some(),
            ResourceId::View(id) => self.views.remove(&id).is_some(),
            ResourceId::Binding(id) => self.bindings.remove(&id).is_some(),
            ResourceId::Buffer(id) => self.buffers.remove(&id).map(|b| b.buffer.destroy()).is_some(),
            ResourceId::Pipeline(id) => self.pipelines.remove(&id).is_some(),
        };
        if !found {
            log::warn!("gpu: release of unknown resource {id:?}");
        }
    }

    fn ensure_ring(&mut self, slots: usize) {
        if slots <= self.ring.capacity {
            return;
        }
        let capacity = slots.next_power_of_two();
        log::debug!("growing constant ring to {capacity} slots");
        self.ring = create_ring(&self.device, &self.constants_layout, capacity, self.ring.stride);
    }

    fn retire_signals(&mut self) {
        let done = self.completed.load(Ordering::Acquire);
        while self.pending.front().is_some_and(|(v, _)| *v <= done) {
            self.pending.pop_front();
        }
    }

    // ── command resolution ────────────────────────────────────────────────

    fn apply_barrier(&mut self, resource: ResourceRef, before: ResourceState, after: ResourceState) {
        let slot = match resource {
            ResourceRef::Texture(id) => self.textures.get_mut(&id).map(|t| &mut t.state),
            ResourceRef::Buffer(id) => self.buffers.get_mut(&id).map(|b| &mut b.state),
            ResourceRef::Backbuffer(i) => self.backbuffer_states.get_mut(i as usize),
        };

        let Some(state) = slot else {
            self.invalid(format_args!("barrier on unknown resource {resource:?}"));
            return;
        };

        let actual = std::mem::replace(state, after);
        if actual != before {
            self.invalid(format_args!(
                "{resource:?}: barrier {before:?} -> {after:?} but resource is {actual:?}"
            ));
        }
    }

    /// View, size and format of a render target, after state checks.
    fn resolve_target(
        &mut self,
        target: TargetRef,
    ) -> Option<(wgpu::TextureView, (u32, u32), TextureFormat)> {
        let resolved = match target {
            TargetRef::View(view) => self.views.get(&view).and_then(|v| {
                self.textures.get(&v.texture).map(|t| {
                    (
                        v.view.clone(),
                        (t.texture.width(), t.texture.height()),
                        t.format,
                        t.state,
                    )
                })
            }),
            TargetRef::Backbuffer(i) => match &self.frame {
                Some(frame) if frame.index == i => Some((
                    frame.view.clone(),
                    (self.config.width, self.config.height),
                    self.format,
                    self.backbuffer_states[i as usize],
                )),
                _ => None,
            },
        };

        let Some((view, size, format, state)) = resolved else {
            self.invalid(format_args!("render target {target:?} is unknown or not acquired"));
            return None;
        };
        if state != ResourceState::RenderTarget {
            self.invalid(format_args!("{target:?} written while in {state:?}"));
        }
        Some((view, size, format))
    }

    fn resolve_sampled(&mut self, binding: BindingId) -> Option<wgpu::BindGroup> {
        let Some(entry) = self.bindings.get(&binding) else {
            self.invalid(format_args!("unknown texture binding {binding:?}"));
            return None;
        };
        let (group, texture) = (entry.group.clone(), entry.texture);

        match self.textures.get(&texture).map(|t| t.state) {
            None => {
                self.invalid(format_args!("{binding:?} samples destroyed {texture:?}"));
                return None;
            }
            Some(ResourceState::ShaderResource) => {}
            Some(state) => self.invalid(format_args!("{texture:?} sampled while in {state:?}")),
        }
        Some(group)
    }

    fn resolve_copy(
        &mut self,
        stream: &CommandStream,
        dst: BufferId,
        offset: u64,
        bytes: std::ops::Range<usize>,
    ) -> Option<Op> {
        let Some(data) = stream.upload_bytes(bytes) else {
            self.invalid(format_args!("upload range outside the stream arena"));
            return None;
        };
        let Some(entry) = self.buffers.get(&dst) else {
            self.invalid(format_args!("upload into unknown buffer {dst:?}"));
            return None;
        };

        let (buffer, capacity, state) = (entry.buffer.clone(), entry.size, entry.state);
        let size = data.len() as u64;

        if state != ResourceState::CopyDestination {
            self.invalid(format_args!("upload into {dst:?} while in {state:?}"));
        }
        if offset + size > capacity {
            self.invalid(format_args!("upload of {} bytes overflows {dst:?}", offset + size));
            return None;
        }
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 || size % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            self.invalid(format_args!("unaligned upload of {size} bytes at {offset}"));
            return None;
        }
        if size == 0 {
            return None;
        }

        let staging = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("neon upload staging"),
            contents: data,
            usage: wgpu::BufferUsages::COPY_SRC,
        });

        Some(Op::Copy { staging, dst: buffer, offset, size })
    }

    fn resolve_draw(&mut self, bind: &Bindings, vertex_count: u32) -> Option<Op> {
        let Some((pipeline, label, slots, pipeline_format)) = bind
            .pipeline
            .and_then(|p| self.pipelines.get(&p))
            .map(|p| (p.pipeline.clone(), p.label.clone(), p.texture_slots, p.format))
        else {
            self.invalid(format_args!("draw without a pipeline"));
            return None;
        };

        let Some(target) = bind.target else {
            self.invalid(format_args!("{label}: draw without a render target"));
            return None;
        };
        let (view, target_size, target_format) = self.resolve_target(target)?;
        if target_format != pipeline_format {
            self.invalid(format_args!(
                "{label}: pipeline targets {pipeline_format:?} but target is {target_format:?}"
            ));
            return None;
        }

        let vertex_buffer = match bind.vertex_buffer.and_then(|vb| self.buffers.get(&vb).map(|b| (vb, b))) {
            None => {
                self.invalid(format_args!("{label}: draw without a known vertex buffer"));
                return None;
            }
            Some((vb, entry)) => {
                let (buffer, state) = (entry.buffer.clone(), entry.state);
                if state != ResourceState::VertexBuffer {
                    self.invalid(format_args!("{label}: {vb:?} drawn while in {state:?}"));
                }
                buffer
            }
        };

        let mut textures = Vec::with_capacity(slots as usize);
        for slot in 0..slots as usize {
            let Some(binding) = bind.textures[slot] else {
                self.invalid(format_args!("{label}: texture slot {slot} unbound"));
                return None;
            };
            textures.push(self.resolve_sampled(binding)?);
        }

        Some(Op::Draw(DrawOp {
            target: view,
            target_size,
            pipeline,
            constants_offset: (bind.constants_slot * self.ring.stride) as u32,
            textures,
            vertex_buffer,
            viewport: bind.viewport,
            scissor: bind.scissor,
            vertex_count,
        }))
    }
}

impl RenderDevice for WgpuBackend<'_> {
    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<Owned<TextureId>, GpuError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(GpuError::InvalidDimensions {
                width: desc.width,
                height: desc.height,
            });
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: to_wgpu_format(desc.format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let id = TextureId::from_raw(self.ids.next());
        self.textures.insert(
            id,
            TextureEntry {
                texture,
                format: desc.format,
                state: ResourceState::RenderTarget,
            },
        );
        log::debug!("gpu: texture {id:?} `{}` {}x{}", desc.label, desc.width, desc.height);
        Ok(Owned::new(id, &self.release))
    }

    fn create_view(&mut self, texture: TextureId, usage: ViewUsage) -> Result<Owned<ViewId>, GpuError> {
        let entry = self
            .textures
            .get(&texture)
            .ok_or(GpuError::UnknownResource { kind: "texture" })?;

        let label = match usage {
            ViewUsage::RenderTarget => "neon render target view",
            ViewUsage::Sampled => "neon sampled view",
        };
        let view = entry.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            ..Default::default()
        });

        let id = ViewId::from_raw(self.ids.next());
        self.views.insert(id, ViewEntry { view, texture, usage });
        Ok(Owned::new(id, &self.release))
    }

    fn create_sampled_binding(&mut self, view: ViewId) -> Result<Owned<BindingId>, GpuError> {
        let entry = self
            .views
            .get(&view)
            .ok_or(GpuError::UnknownResource { kind: "view" })?;
        if entry.usage != ViewUsage::Sampled {
            return Err(GpuError::ResourceCreation {
                label: "sampled binding".into(),
                reason: "view is not sampleable".into(),
            });
        }

        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("neon sampled binding"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&entry.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let binding = BindingEntry { group, texture: entry.texture };
        let id = BindingId::from_raw(self.ids.next());
        self.bindings.insert(id, binding);
        Ok(Owned::new(id, &self.release))
    }

    fn create_buffer(
        &mut self,
        desc: &BufferDesc<'_>,
        contents: Option<&[u8]>,
    ) -> Result<Owned<BufferId>, GpuError> {
        let padded = desc.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let usage = wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST;

        let buffer = match contents {
            Some(data) => {
                if data.len() as u64 > desc.size {
                    return Err(GpuError::ResourceCreation {
                        label: desc.label.to_string(),
                        reason: format!("{} initial bytes exceed size {}", data.len(), desc.size),
                    });
                }
                let mut bytes = vec![0u8; padded as usize];
                bytes[..data.len()].copy_from_slice(data);
                self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(desc.label),
                    contents: &bytes,
                    usage,
                })
            }
            None => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(desc.label),
                size: padded,
                usage,
                mapped_at_creation: false,
            }),
        };

        let id = BufferId::from_raw(self.ids.next());
        self.buffers.insert(
            id,
            BufferEntry {
                buffer,
                size: desc.size,
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

        if desc.texture_slots as usize > MAX_TEXTURE_SLOTS {
            return Err(fail(format!("{} texture slots requested", desc.texture_slots)));
        }

        let (vs_module, vs_source) = self.module(desc.vertex.module)?;
        let (fs_module, fs_source) = self.module(desc.fragment.module)?;
        for (stage, source) in [(desc.vertex, &vs_source), (desc.fragment, &fs_source)] {
            if !source.contains(&format!("fn {}", stage.entry)) {
                return Err(fail(format!(
                    "entry point `{}` not found in `{}`",
                    stage.entry, stage.module
                )));
            }
        }

        let mut group_layouts = vec![&self.constants_layout];
        group_layouts.extend(std::iter::repeat_n(&self.texture_layout, desc.texture_slots as usize));

        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &group_layouts,
            immediate_size: 0,
        });

        let vertex_buffers = [match desc.vertex_layout {
            VertexLayout::Line => LineVertex::layout(),
            VertexLayout::Fullscreen => FullscreenVertex::layout(),
        }];

        let topology = match desc.topology {
            Topology::LineList => wgpu::PrimitiveTopology::LineList,
            Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        };

        let blend = match desc.blend {
            BlendMode::Replace => wgpu::BlendState::REPLACE,
            BlendMode::Alpha => wgpu::BlendState::ALPHA_BLENDING,
        };

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &vs_module,
                entry_point: Some(desc.vertex.entry),
                compilation_options: Default::default(),
                buffers: &vertex_buffers,
            },
            fragment: Some(wgpu::FragmentState {
                module: &fs_module,
                entry_point: Some(desc.fragment.entry),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: to_wgpu_format(desc.target_format),
                    blend: Some(blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let id = PipelineId::from_raw(self.ids.next());
        self.pipelines.insert(
            id,
            PipelineEntry {
                pipeline,
                label: desc.label.to_string(),
                texture_slots: desc.texture_slots,
                format: desc.target_format,
            },
        );
        log::debug!("gpu: pipeline {id:?} `{}`", desc.label);
        Ok(Owned::new(id, &self.release))
    }

    fn collect_garbage(&mut self, pending_fence: u64, completed_fence: u64) {
        for id in self.garbage.collect(&self.release, pending_fence, completed_fence) {
            self.destroy(id);
        }
    }
}

impl GpuQueue for WgpuBackend<'_> {
    fn execute(&mut self, stream: &CommandStream) -> Result<(), GpuError> {
        if !stream.is_closed() {
            self.invalid(format_args!("{}: executed while still recording", stream.label()));
        }

        let blocks = stream
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::SetConstants(_)))
            .count();
        self.ensure_ring(blocks + 1);
        let stride = self.ring.stride;
        let mut constants = vec![0u8; (blocks + 1) * stride];
        let mut next_slot = 1;

        let mut bind = Bindings::default();
        let mut ops = Vec::new();

        for command in stream.commands() {
            match command {
                Command::Barrier { resource, before, after } => {
                    self.apply_barrier(*resource, *before, *after)
                }
                Command::ClearTarget { target, color } => {
                    if let Some((view, _, _)) = self.resolve_target(*target) {
                        let [r, g, b, a] = color.map(f64::from);
                        ops.push(Op::Clear {
                            target: view,
                            color: wgpu::Color { r, g, b, a },
                        });
                    }
                }
                Command::SetRenderTarget(target) => bind.target = Some(*target),
                Command::SetViewport(vp) => bind.viewport = Some(*vp),
                Command::SetScissor(rect) => bind.scissor = Some(*rect),
                Command::SetPipeline(p) => bind.pipeline = Some(*p),
                Command::SetConstants(block) => {
                    let bytes = block.as_bytes();
                    let start = next_slot * stride;
                    constants[start..start + bytes.len()].copy_from_slice(bytes);
                    bind.constants_slot = next_slot;
                    next_slot += 1;
                }
                Command::BindTexture { slot, binding } => match bind.textures.get_mut(*slot as usize) {
                    Some(entry) => *entry = Some(*binding),
                    None => self.invalid(format_args!("texture slot {slot} out of range")),
                },
                Command::SetVertexBuffer(vb) => bind.vertex_buffer = Some(*vb),
                Command::Upload { dst, offset, bytes } => {
                    if let Some(op) = self.resolve_copy(stream, *dst, *offset, bytes.clone()) {
                        ops.push(op);
                    }
                }
                Command::Draw { vertex_count } => {
                    if let Some(op) = self.resolve_draw(&bind, *vertex_count) {
                        ops.push(op);
                    }
                }
            }
        }

        if ops.is_empty() {
            return Ok(());
        }

        self.queue.write_buffer(&self.ring.buffer, 0, &constants);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(stream.label()),
            });

        for op in &ops {
            match op {
                Op::Clear { target, color } => encode_clear(&mut encoder, target, *color),
                Op::Copy { staging, dst, offset, size } => {
                    encoder.copy_buffer_to_buffer(staging, 0, dst, *offset, *size)
                }
                Op::Draw(draw) => encode_draw(&mut encoder, &self.ring.bind_group, draw),
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn signal(&mut self, value: u64) {
        let index = self.queue.submit(std::iter::empty());
        let completed = Arc::clone(&self.completed);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(value, Ordering::AcqRel);
        });
        self.pending.push_back((value, index));
        self.highest_signaled = self.highest_signaled.max(value);
    }

    fn completed_fence(&mut self) -> u64 {
        if let Err(err) = self.device.poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {err}");
        }
        self.retire_signals();
        self.completed.load(Ordering::Acquire)
    }

    fn wait_for_fence(&mut self, value: u64) -> Result<(), GpuError> {
        if self.completed.load(Ordering::Acquire) >= value {
            return Ok(());
        }
        if value > self.highest_signaled {
            return Err(GpuError::FenceNeverSignaled { value });
        }

        let Some((signaled, index)) = self
            .pending
            .iter()
            .find(|(v, _)| *v >= value)
            .map(|(v, index)| (*v, index.clone()))
        else {
            return Err(GpuError::FenceNeverSignaled { value });
        };

        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(index),
                timeout: Some(FENCE_TIMEOUT),
            })
            .map_err(|err| GpuError::Wait(err.to_string()))?;

        self.completed.fetch_max(signaled, Ordering::AcqRel);
        self.retire_signals();
        Ok(())
    }
}

impl SwapChain for WgpuBackend<'_> {
    fn backbuffer_count(&self) -> usize {
        BACKBUFFER_COUNT
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn acquire(&mut self, index: u32) -> Result<(), GpuError> {
        if index as usize >= BACKBUFFER_COUNT {
            return Err(GpuError::UnknownResource { kind: "backbuffer" });
        }
        if self.frame.take().is_some() {
            log::debug!("discarding a frame that was never presented");
        }

        let texture = self
            .surface
            .get_current_texture()
            .map_err(map_surface_error)?;
        if texture.suboptimal {
            log::debug!("surface texture is suboptimal");
        }

        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some(AcquiredFrame { index, texture, view });
        Ok(())
    }

    fn present(&mut self, vsync: bool) -> Result<(), GpuError> {
        let Some(frame) = self.frame.take() else {
            self.invalid(format_args!("present without an acquired backbuffer"));
            return Ok(());
        };

        let state = self.backbuffer_states[frame.index as usize];
        if state != ResourceState::Presentable {
            self.invalid(format_args!("backbuffer {} presented while in {state:?}", frame.index));
        }

        drop(frame.view);
        frame.texture.present();

        if vsync != self.vsync {
            self.vsync = vsync;
            self.config.present_mode = present_mode(vsync);
            self.surface.configure(&self.device, &self.config);
            log::info!("present mode set to {:?}", self.config.present_mode);
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        self.frame = None;
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.backbuffer_states = [ResourceState::Presentable; BACKBUFFER_COUNT];
    }
}

fn create_ring(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    capacity: usize,
    stride: usize,
) -> ConstantRing {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("neon constant ring"),
        size: (capacity * stride) as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("neon constant ring bind group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: wgpu::BufferSize::new(MAX_CONSTANT_BYTES as u64),
            }),
        }],
    });

    ConstantRing { buffer, bind_group, capacity, stride }
}

fn encode_draw(encoder: &mut wgpu::CommandEncoder, ring: &wgpu::BindGroup, op: &DrawOp) {
    let (width, height) = op.target_size;
    let viewport = op
        .viewport
        .filter(|vp| vp.is_valid())
        .unwrap_or_else(|| Viewport::full(width, height));
    let scissor = match op.scissor {
        Some(rect) => rect.clamped_to(width, height),
        None => ScissorRect::full(width, height).clamped_to(width, height),
    };
    let Some(scissor) = scissor else {
        log::trace!("draw skipped: empty scissor");
        return;
    };

    let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("neon draw pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &op.target,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });

    rpass.set_pipeline(&op.pipeline);
    rpass.set_bind_group(0, ring, &[op.constants_offset]);
    for (i, group) in op.textures.iter().enumerate() {
        rpass.set_bind_group(i as u32 + 1, group, &[]);
    }
    rpass.set_vertex_buffer(0, op.vertex_buffer.slice(..));
    rpass.set_viewport(viewport.x, viewport.y, viewport.width, viewport.height, 0.0, 1.0);
    rpass.set_scissor_rect(scissor.x, scissor.y, scissor.width, scissor.height);
    rpass.draw(0..op.vertex_count, 0..1);
}

fn encode_clear(encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView, color: wgpu::Color) {
    let _ = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("neon clear pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(color),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
}
