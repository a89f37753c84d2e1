use crate::device::{
    BindingId, CommandStream, GpuError, Owned, RenderDevice, ResourceRef, ResourceState, TargetRef,
    TextureDesc, TextureFormat, TextureId, TrackedState, ViewId, ViewUsage,
};
use crate::paint::Color;

/// GPU objects behind an initialized surface.
#[derive(Debug)]
struct SurfaceImage {
    texture: Owned<TextureId>,
    target_view: Owned<ViewId>,
    // Kept alive for `binding`.
    _sampled_view: Owned<ViewId>,
    binding: Owned<BindingId>,
}

/// Offscreen image with a drawable view, a sampleable binding and a tracked
/// usage state.
///
/// Size and format are fixed per initialization; a new size means a new
/// `initialize`. All transitions go through [`transition_to`](Self::transition_to)
/// so the tracked state always matches the device.
#[derive(Debug)]
pub struct RenderSurface {
    label: &'static str,
    image: Option<SurfaceImage>,
    width: u32,
    height: u32,
    format: TextureFormat,
    clear_color: Color,
    state: TrackedState,
}

impl RenderSurface {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            image: None,
            width: 0,
            height: 0,
            format: TextureFormat::Rgba8Unorm,
            clear_color: Color::BLACK,
            state: TrackedState::new(ResourceState::Uninitialized),
        }
    }

    /// Allocates a `width × height` image; the surface starts in `RenderTarget`.
    ///
    /// Fails without allocating when `device` is `None` or a dimension is zero.
    /// Any previous image is released first, so a failed call always leaves the
    /// surface uninitialized.
    pub fn initialize(
        &mut self,
        device: Option<&mut dyn RenderDevice>,
        width: u32,
        height: u32,
        format: TextureFormat,
        clear_color: Color,
    ) -> Result<(), GpuError> {
        self.shutdown();
        let device = device.ok_or(GpuError::DeviceUnavailable)?;
        self.initialize_with(device, width, height, format, clear_color)
    }

    /// [`initialize`](Self::initialize) with a device known to be present.
    pub fn initialize_with(
        &mut self,
        device: &mut dyn RenderDevice,
        width: u32,
        height: u32,
        format: TextureFormat,
        clear_color: Color,
    ) -> Result<(), GpuError> {
        self.shutdown();

        if width == 0 || height == 0 {
            log::error!("{}: invalid size {width}x{height}", self.label);
            return Err(GpuError::InvalidDimensions { width, height });
        }

        let texture = device.create_texture(&TextureDesc {
            label: self.label,
            width,
            height,
            format,
        })?;
        let target_view = device.create_view(texture.id(), ViewUsage::RenderTarget)?;
        let sampled_view = device.create_view(texture.id(), ViewUsage::Sampled)?;
        let binding = device.create_sampled_binding(sampled_view.id())?;

        self.image = Some(SurfaceImage {
            texture,
            target_view,
            _sampled_view: sampled_view,
            binding,
        });
        self.width = width;
        self.height = height;
        self.format = format;
        self.clear_color = clear_color;
        self.state.reset(ResourceState::RenderTarget);

        log::debug!("{}: {width}x{height} {format:?}", self.label);
        Ok(())
    }

    /// Releases the image. Safe to call any number of times.
    pub fn shutdown(&mut self) {
        if self.image.take().is_some() {
            log::debug!("{}: released", self.label);
        }
        self.width = 0;
        self.height = 0;
        self.state.reset(ResourceState::Uninitialized);
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.image.is_some()
    }

    /// Records `expected → after`. A no-op on an uninitialized surface.
    ///
    /// Returns `true` when a barrier was recorded.
    pub fn transition_to(
        &mut self,
        stream: &mut CommandStream,
        expected: ResourceState,
        after: ResourceState,
    ) -> bool {
        let Some(image) = &self.image else { return false };
        self.state.transition(
            stream,
            ResourceRef::Texture(image.texture.id()),
            expected,
            after,
        )
    }

    /// Clears the whole image to the clear color. Requires `RenderTarget`.
    pub fn clear(&self, stream: &mut CommandStream) {
        if let Some(image) = &self.image {
            stream.clear_target(
                TargetRef::View(image.target_view.id()),
                self.clear_color.to_array(),
            );
        }
    }

    /// Binds the drawable view with a full-surface viewport and scissor.
    pub fn bind_as_target(&self, stream: &mut CommandStream) {
        if let Some(image) = &self.image {
            stream.bind_full_target(TargetRef::View(image.target_view.id()), self.width, self.height);
        }
    }

    pub fn render_target(&self) -> Option<TargetRef> {
        self.image.as_ref().map(|i| TargetRef::View(i.target_view.id()))
    }

    /// Shader-visible binding of the sampleable view.
    pub fn binding(&self) -> Option<BindingId> {
        self.image.as_ref().map(|i| i.binding.id())
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.image.as_ref().map(|i| i.texture.id())
    }

    #[inline]
    pub fn state(&self) -> ResourceState {
        self.state.current()
    }

    /// Transitions whose assumed prior state was corrected.
    #[inline]
    pub fn mismatch_count(&self) -> u32 {
        self.state.mismatches()
    }

    #[inline]
    pub fn label(&self) -> &'static str {
        self.label
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    #[inline]
    pub fn clear_color(&self) -> Color {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::headless::{HeadlessBackend, HeadlessConfig};
    use crate::device::{Command, GpuQueue};

    fn surface(dev: &mut HeadlessBackend, w: u32, h: u32) -> RenderSurface {
        let mut s = RenderSurface::new("test surface");
        s.initialize(Some(dev), w, h, TextureFormat::Rgba8Unorm, Color::BLACK)
            .unwrap();
        s
    }

    // ── initialize / shutdown ─────────────────────────────────────────────

    #[test]
    fn zero_width_fails_without_allocating() {
        let mut dev = HeadlessBackend::with_size(8, 8);
        let mut s = RenderSurface::new("test surface");

        let err = s
            .initialize(Some(&mut dev), 0, 16, TextureFormat::Rgba8Unorm, Color::BLACK)
            .unwrap_err();

        assert!(matches!(err, GpuError::InvalidDimensions { width: 0, height: 16 }));
        assert_eq!(s.state(), ResourceState::Uninitialized);
        assert!(!s.is_initialized());
        assert_eq!(dev.live_resources(), 0);
    }

    #[test]
    fn missing_device_fails() {
        let mut s = RenderSurface::new("test surface");
        let err = s
            .initialize(None, 16, 16, TextureFormat::Rgba8Unorm, Color::BLACK)
            .unwrap_err();
        assert!(matches!(err, GpuError::DeviceUnavailable));
        assert_eq!(s.state(), ResourceState::Uninitialized);
    }

    #[test]
    fn initialized_surface_starts_as_render_target() {
        let mut dev = HeadlessBackend::with_size(8, 8);
        let s = surface(&mut dev, 16, 8);

        assert_eq!(s.state(), ResourceState::RenderTarget);
        assert_eq!(s.size(), (16, 8));
        assert!(s.render_target().is_some());
        assert!(s.binding().is_some());
        assert_eq!(dev.live_resources(), 4);
    }

    #[test]
    fn failed_allocation_leaves_no_partial_state() {
        let mut dev = HeadlessBackend::new(HeadlessConfig {
            allocation_budget: Some(2),
            ..HeadlessConfig::default()
        });
        let mut s = RenderSurface::new("test surface");

        let err = s
            .initialize(Some(&mut dev), 4, 4, TextureFormat::Rgba8Unorm, Color::BLACK)
            .unwrap_err();

        assert!(matches!(err, GpuError::ResourceCreation { .. }));
        assert!(!s.is_initialized());
        assert_eq!(s.state(), ResourceState::Uninitialized);
        dev.collect_garbage(1, 1);
        assert_eq!(dev.live_resources(), 0);
    }

    #[test]
    fn shutdown_is_idempotent_and_releases() {
        let mut dev = HeadlessBackend::with_size(8, 8);
        let mut s = surface(&mut dev, 4, 4);

        s.shutdown();
        s.shutdown();
        assert_eq!(s.state(), ResourceState::Uninitialized);
        assert_eq!(dev.pending_release(), 4);

        dev.collect_garbage(1, 1);
        assert_eq!(dev.live_resources(), 0);
    }

    // ── transitions ───────────────────────────────────────────────────────

    #[test]
    fn transition_on_uninitialized_surface_is_noop() {
        let mut s = RenderSurface::new("test surface");
        let mut stream = CommandStream::new("test");
        assert!(!s.transition_to(
            &mut stream,
            ResourceState::RenderTarget,
            ResourceState::ShaderResource
        ));
        assert!(stream.is_empty());
    }

    #[test]
    fn wrong_assumption_is_corrected_and_counted() {
        let mut dev = HeadlessBackend::with_size(8, 8);
        let mut s = surface(&mut dev, 4, 4);
        let mut stream = CommandStream::new("test");

        // Fresh surface is a render target, not a shader resource.
        s.transition_to(&mut stream, ResourceState::ShaderResource, ResourceState::RenderTarget);
        assert_eq!(s.mismatch_count(), 1);
        assert!(stream.is_empty());

        s.transition_to(&mut stream, ResourceState::ShaderResource, ResourceState::CopyDestination);
        assert_eq!(s.mismatch_count(), 2);
        assert_eq!(
            stream.commands(),
            &[Command::Barrier {
                resource: ResourceRef::Texture(s.texture().unwrap()),
                before: ResourceState::RenderTarget,
                after: ResourceState::CopyDestination,
            }]
        );

        stream.close();
        dev.execute(&stream).unwrap();
        assert_eq!(dev.stats().validation_errors, 0);
    }

    // ── clear ─────────────────────────────────────────────────────────────

    #[test]
    fn clear_fills_with_clear_color() {
        let mut dev = HeadlessBackend::with_size(8, 8);
        let mut s = surface(&mut dev, 4, 4);
        s.set_clear_color(Color::new(0.25, 0.5, 0.75, 1.0));

        let mut stream = CommandStream::new("test");
        s.clear(&mut stream);
        stream.close();
        dev.execute(&stream).unwrap();

        let image = dev.texture_image(s.texture().unwrap()).unwrap();
        assert!(image.pixels().iter().all(|p| *p == [0.25, 0.5, 0.75, 1.0]));
    }

    #[test]
    fn clear_without_image_records_nothing() {
        let s = RenderSurface::new("test surface");
        let mut stream = CommandStream::new("test");
        s.clear(&mut stream);
        s.bind_as_target(&mut stream);
        assert!(stream.is_empty());
    }
}
