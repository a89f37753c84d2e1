use crate::device::{
    Backend, CommandStream, GpuError, RenderDevice, ResourceRef, ResourceState, SurfaceErrorAction,
    TargetRef, TextureFormat, TrackedState,
};
use crate::paint::Color;
use crate::render::{LineBatcher, LineRecorder};

/// Backbuffers in the swap chain, and frames the CPU may run ahead.
pub const BACKBUFFER_COUNT: usize = 2;

/// Backbuffer of the frame being recorded.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameTarget {
    pub target: TargetRef,
    pub width: u32,
    pub height: u32,
}

/// Outcome of a frame step that may be skipped.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameStatus {
    Ready,
    /// The swap chain was not usable; nothing was recorded or presented.
    Skipped,
}

/// Per-context counters.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct FrameStats {
    /// Frames submitted.
    pub frames: u64,
    /// Times the CPU blocked on a backbuffer's fence before reuse.
    pub fence_waits: u64,
    /// Draw commands submitted.
    pub draws: u64,
    pub skipped: u64,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Phase {
    Idle,
    Recording,
    Ended,
}

/// Double-buffered frame loop over a [`Backend`].
///
/// Each backbuffer has its own command stream and the fence value of the last
/// submission that used it. [`begin_frame`](Self::begin_frame) blocks until
/// that value has completed before resetting the stream, so the CPU never
/// re-records work the GPU may still be reading.
pub struct FrameContext<B: Backend> {
    backend: B,
    streams: [CommandStream; BACKBUFFER_COUNT],
    fence_values: [u64; BACKBUFFER_COUNT],
    backbuffers: [TrackedState; BACKBUFFER_COUNT],
    last_signaled: u64,
    index: usize,
    phase: Phase,
    vsync: bool,
    lines: LineBatcher,
    stats: FrameStats,
    shut_down: bool,
}

impl<B: Backend> FrameContext<B> {
    /// Takes ownership of `backend` and creates the line batcher for its
    /// swap chain.
    pub fn new(mut backend: B, vsync: bool) -> Result<Self, GpuError> {
        let count = backend.backbuffer_count();
        if count != BACKBUFFER_COUNT {
            return Err(GpuError::ResourceCreation {
                label: "swap chain".into(),
                reason: format!("expected {BACKBUFFER_COUNT} backbuffers, got {count}"),
            });
        }

        let (width, height) = backend.size();
        let format = backend.format();

        let mut lines = LineBatcher::new();
        lines.initialize_with(&mut backend, format, width, height)?;

        log::info!("frame context ready: {width}x{height} {format:?}, vsync {vsync}");

        Ok(Self {
            backend,
            streams: [CommandStream::new("frame 0"), CommandStream::new("frame 1")],
            fence_values: [0; BACKBUFFER_COUNT],
            backbuffers: std::array::from_fn(|_| TrackedState::new(ResourceState::Presentable)),
            last_signaled: 0,
            index: 0,
            phase: Phase::Idle,
            vsync,
            lines,
            stats: FrameStats::default(),
            shut_down: false,
        })
    }

    // ── frame sequence ────────────────────────────────────────────────────

    /// Waits for the current backbuffer to be free, acquires it and opens its
    /// stream with the backbuffer bound as render target.
    ///
    /// Transient swap-chain failures return `Skipped`; only fatal ones are
    /// errors.
    pub fn begin_frame(&mut self) -> Result<FrameStatus, GpuError> {
        if self.phase != Phase::Idle {
            log::warn!("begin_frame called twice; discarding the open frame");
            self.discard_frame();
        }

        let i = self.index;
        let needed = self.fence_values[i];
        if self.backend.completed_fence() < needed {
            self.stats.fence_waits += 1;
            log::trace!("waiting for fence {needed} (backbuffer {i})");
            self.backend.wait_for_fence(needed)?;
        }
        self.collect_garbage();

        if let Err(err) = self.backend.acquire(i as u32) {
            return self.handle_surface_error(err);
        }

        let (width, height) = self.backend.size();
        let stream = &mut self.streams[i];
        stream.reset();
        self.backbuffers[i].transition(
            stream,
            ResourceRef::Backbuffer(i as u32),
            ResourceState::Presentable,
            ResourceState::RenderTarget,
        );
        stream.bind_full_target(TargetRef::Backbuffer(i as u32), width, height);

        self.phase = Phase::Recording;
        log::debug!("frame begun on backbuffer {i}");
        Ok(FrameStatus::Ready)
    }

    /// Clears the current backbuffer.
    pub fn clear_render_target(&mut self, color: Color) {
        if self.phase != Phase::Recording {
            log::warn!("clear_render_target outside of a frame");
            return;
        }
        let i = self.index;
        self.streams[i].clear_target(TargetRef::Backbuffer(i as u32), color.to_array());
    }

    /// Makes the backbuffer presentable and closes the stream.
    ///
    /// Pending lines are not flushed; callers flush while their target is
    /// bound.
    pub fn end_frame(&mut self) {
        if self.phase != Phase::Recording {
            log::warn!("end_frame without begin_frame");
            return;
        }
        if self.lines.line_count() > 0 {
            log::debug!("{} lines still pending at end_frame", self.lines.line_count());
        }

        let i = self.index;
        let stream = &mut self.streams[i];
        self.backbuffers[i].transition(
            stream,
            ResourceRef::Backbuffer(i as u32),
            ResourceState::RenderTarget,
            ResourceState::Presentable,
        );
        stream.close();
        self.phase = Phase::Ended;
    }

    /// Submits the closed stream, signals the fence for this backbuffer,
    /// presents and advances to the next backbuffer.
    pub fn present(&mut self) -> Result<FrameStatus, GpuError> {
        if self.phase != Phase::Ended {
            log::warn!("present without end_frame");
            return Ok(FrameStatus::Skipped);
        }

        let i = self.index;
        self.backend.execute(&self.streams[i])?;
        self.last_signaled += 1;
        self.backend.signal(self.last_signaled);
        self.fence_values[i] = self.last_signaled;

        self.stats.frames += 1;
        self.stats.draws += self.streams[i].draw_count() as u64;
        self.phase = Phase::Idle;
        self.index = (i + 1) % BACKBUFFER_COUNT;

        match self.backend.present(self.vsync) {
            Ok(()) => Ok(FrameStatus::Ready),
            Err(err) => self.handle_surface_error(err),
        }
    }

    fn handle_surface_error(&mut self, err: GpuError) -> Result<FrameStatus, GpuError> {
        let GpuError::Surface(failure) = err else {
            return Err(err);
        };

        match failure.action() {
            SurfaceErrorAction::Fatal => {
                log::error!("swap chain failure: {failure}");
                Err(err)
            }
            SurfaceErrorAction::Reconfigured => {
                log::warn!("{failure}; reconfiguring swap chain");
                let (width, height) = self.backend.size();
                self.resize(width, height)?;
                self.stats.skipped += 1;
                Ok(FrameStatus::Skipped)
            }
            SurfaceErrorAction::SkipFrame => {
                log::warn!("{failure}; frame skipped");
                self.stats.skipped += 1;
                Ok(FrameStatus::Skipped)
            }
        }
    }

    fn discard_frame(&mut self) {
        self.streams[self.index].reset();
        self.backbuffers[self.index].reset(ResourceState::Presentable);
        self.phase = Phase::Idle;
    }

    // ── synchronization ───────────────────────────────────────────────────

    /// Signals a new fence value and blocks until the GPU reaches it.
    pub fn wait_for_gpu(&mut self) -> Result<(), GpuError> {
        self.last_signaled += 1;
        self.backend.signal(self.last_signaled);
        self.backend.wait_for_fence(self.last_signaled)?;
        self.collect_garbage();
        Ok(())
    }

    /// Destroys released resources the GPU can no longer be reading.
    fn collect_garbage(&mut self) {
        // An open stream may still reference anything dropped while recording;
        // it will be submitted under the next fence value.
        let pending = match self.phase {
            Phase::Idle => self.last_signaled,
            Phase::Recording | Phase::Ended => self.last_signaled + 1,
        };
        let completed = self.backend.completed_fence();
        self.backend.collect_garbage(pending, completed);
    }

    /// Drains the GPU and reconfigures the swap chain for `width × height`.
    ///
    /// A zero dimension is ignored (minimized window).
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), GpuError> {
        if width == 0 || height == 0 {
            log::debug!("ignoring resize to {width}x{height}");
            return Ok(());
        }
        if self.phase != Phase::Idle {
            log::warn!("resize during a frame; discarding it");
            self.discard_frame();
        }

        self.wait_for_gpu()?;
        self.backend.resize(width, height);
        for state in &mut self.backbuffers {
            state.reset(ResourceState::Presentable);
        }
        self.lines.update_screen_size(width, height);

        log::info!("swap chain resized to {width}x{height}");
        Ok(())
    }

    /// Drains every backbuffer's work, then releases the batcher.
    ///
    /// Components created against [`device`](Self::device) must be shut down
    /// before this call for their resources to be collected. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        if self.phase != Phase::Idle {
            log::warn!("shutdown during a frame; discarding it");
            self.discard_frame();
        }

        for value in self.fence_values {
            if let Err(err) = self.backend.wait_for_fence(value) {
                log::error!("shutdown: waiting for fence {value} failed: {err}");
            }
        }

        self.lines.shutdown();
        if let Err(err) = self.wait_for_gpu() {
            log::error!("shutdown: GPU drain failed: {err}");
        }

        self.shut_down = true;
        log::info!("frame context shut down after {} frames", self.stats.frames);
    }

    // ── access ────────────────────────────────────────────────────────────

    /// The line batcher bound to the current frame's stream.
    pub fn lines(&mut self) -> LineRecorder<'_> {
        LineRecorder::new(&mut self.lines, &mut self.streams[self.index])
    }

    pub fn line_batcher(&self) -> &LineBatcher {
        &self.lines
    }

    /// Stream of the frame being recorded.
    pub fn stream(&mut self) -> &mut CommandStream {
        &mut self.streams[self.index]
    }

    /// Device for creating components that draw into this context.
    pub fn device(&mut self) -> &mut dyn RenderDevice {
        &mut self.backend
    }

    /// Device and current stream together, for components that need both.
    pub fn device_and_stream(&mut self) -> (&mut dyn RenderDevice, &mut CommandStream) {
        (&mut self.backend, &mut self.streams[self.index])
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn target(&self) -> FrameTarget {
        let (width, height) = self.backend.size();
        FrameTarget {
            target: TargetRef::Backbuffer(self.index as u32),
            width,
            height,
        }
    }

    #[inline]
    pub fn backbuffer_index(&self) -> usize {
        self.index
    }

    pub fn size(&self) -> (u32, u32) {
        self.backend.size()
    }

    pub fn format(&self) -> TextureFormat {
        self.backend.format()
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.phase == Phase::Recording
    }

    #[inline]
    pub fn vsync(&self) -> bool {
        self.vsync
    }

    pub fn set_vsync(&mut self, vsync: bool) {
        self.vsync = vsync;
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Fence value last signaled for each backbuffer.
    #[inline]
    pub fn fence_values(&self) -> [u64; BACKBUFFER_COUNT] {
        self.fence_values
    }
}

impl<B: Backend> Drop for FrameContext<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Vec2;
    use crate::device::headless::{HeadlessBackend, HeadlessConfig};
    use crate::device::{GpuQueue, SurfaceFailure};
    use crate::render::LineSink;

    fn context(latency: usize) -> FrameContext<HeadlessBackend> {
        let backend = HeadlessBackend::new(HeadlessConfig {
            width: 32,
            height: 32,
            gpu_latency: latency,
            ..HeadlessConfig::default()
        });
        FrameContext::new(backend, true).unwrap()
    }

    fn run_frame(ctx: &mut FrameContext<HeadlessBackend>) -> FrameStatus {
        if ctx.begin_frame().unwrap() == FrameStatus::Skipped {
            return FrameStatus::Skipped;
        }
        ctx.clear_render_target(Color::BLACK);
        ctx.end_frame();
        ctx.present().unwrap()
    }

    // ── sequencing ────────────────────────────────────────────────────────

    #[test]
    fn frames_alternate_backbuffers() {
        let mut ctx = context(1);
        assert_eq!(ctx.backbuffer_index(), 0);
        run_frame(&mut ctx);
        assert_eq!(ctx.backbuffer_index(), 1);
        run_frame(&mut ctx);
        assert_eq!(ctx.backbuffer_index(), 0);
        assert_eq!(ctx.fence_values(), [1, 2]);
        assert_eq!(ctx.stats().frames, 2);
        assert_eq!(ctx.backend().stats().presents, 2);
        assert_eq!(ctx.backend().stats().validation_errors, 0);
    }

    #[test]
    fn clear_reaches_the_backbuffer() {
        let mut ctx = context(1);
        ctx.begin_frame().unwrap();
        ctx.clear_render_target(Color::RED);
        ctx.end_frame();
        ctx.present().unwrap();

        let image = ctx.backend().backbuffer_image(0).unwrap();
        assert!(image.pixels().iter().all(|p| *p == [1.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn lines_draw_into_the_backbuffer() {
        let mut ctx = context(1);
        ctx.begin_frame().unwrap();
        ctx.clear_render_target(Color::BLACK);
        {
            let mut lines = ctx.lines();
            lines.line(Vec2::new(0.0, 4.5), Vec2::new(31.0, 4.5), Color::GREEN);
            lines.flush();
            assert_eq!(lines.line_count(), 0);
        }
        ctx.end_frame();
        ctx.present().unwrap();

        assert_eq!(ctx.stats().draws, 1);
        let image = ctx.backend().backbuffer_image(0).unwrap();
        assert_eq!(image.pixel(10, 4), Some([0.0, 1.0, 0.0, 1.0]));
        assert_eq!(ctx.backend().stats().validation_errors, 0);
    }

    #[test]
    fn out_of_order_calls_are_ignored() {
        let mut ctx = context(1);
        ctx.end_frame();
        assert_eq!(ctx.present().unwrap(), FrameStatus::Skipped);
        assert_eq!(ctx.stats().frames, 0);
        assert_eq!(ctx.backend().stats().executions, 0);
    }

    // ── fences ────────────────────────────────────────────────────────────

    #[test]
    fn cpu_waits_once_it_is_two_frames_ahead() {
        let mut ctx = context(2);
        for _ in 0..5 {
            run_frame(&mut ctx);
        }
        assert_eq!(ctx.stats().fence_waits, 3);
        assert_eq!(ctx.backend().stats().fence_waits, 3);
    }

    #[test]
    fn immediate_gpu_never_blocks() {
        let mut ctx = context(0);
        for _ in 0..4 {
            run_frame(&mut ctx);
        }
        assert_eq!(ctx.stats().fence_waits, 0);
    }

    // ── surface failures ──────────────────────────────────────────────────

    #[test]
    fn timeout_skips_the_frame() {
        let mut ctx = context(1);
        ctx.backend_mut().inject_surface_failure(SurfaceFailure::Timeout);
        assert_eq!(run_frame(&mut ctx), FrameStatus::Skipped);
        assert_eq!(ctx.stats().skipped, 1);
        assert_eq!(run_frame(&mut ctx), FrameStatus::Ready);
    }

    #[test]
    fn lost_surface_is_reconfigured() {
        let mut ctx = context(1);
        run_frame(&mut ctx);
        ctx.backend_mut().inject_surface_failure(SurfaceFailure::Lost);
        assert_eq!(run_frame(&mut ctx), FrameStatus::Skipped);
        assert_eq!(run_frame(&mut ctx), FrameStatus::Ready);
        assert_eq!(ctx.backend().stats().validation_errors, 0);
    }

    #[test]
    fn out_of_memory_is_fatal() {
        let mut ctx = context(1);
        ctx.backend_mut().inject_surface_failure(SurfaceFailure::OutOfMemory);
        assert!(matches!(
            ctx.begin_frame(),
            Err(GpuError::Surface(SurfaceFailure::OutOfMemory))
        ));
    }

    // ── resize / shutdown ─────────────────────────────────────────────────

    #[test]
    fn resize_updates_swap_chain_and_batcher() {
        let mut ctx = context(1);
        run_frame(&mut ctx);
        ctx.resize(64, 16).unwrap();
        assert_eq!(ctx.size(), (64, 16));
        assert_eq!(ctx.line_batcher().screen_size(), [64.0, 16.0]);
        assert_eq!(run_frame(&mut ctx), FrameStatus::Ready);

        ctx.resize(0, 10).unwrap();
        assert_eq!(ctx.size(), (64, 16));
    }

    #[test]
    fn shutdown_drains_and_releases_everything() {
        let mut ctx = context(2);
        for _ in 0..3 {
            run_frame(&mut ctx);
        }
        ctx.shutdown();
        ctx.shutdown();

        assert!(ctx.backend_mut().completed_fence() >= 3);
        assert_eq!(ctx.backend().live_resources(), 0);
        assert_eq!(ctx.backend().pending_release(), 0);
    }
}
