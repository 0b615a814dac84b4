//! Per-frame video renderer.
//!
//! [`FrameRenderer`] holds the CPU-side render state (layout, UV rect, texture
//! allocation size, liveness) and drives a [`GpuDevice`] once per frame. The
//! device is passed in on every call so the renderer can be exercised without a
//! GL context and so GL handles never outlive the context that created them.

use chrono::Local;
use thiserror::Error;

use super::geometry::{
    CameraLayout, UvRect, VideoMeta, canvas_pixel_size, compute_layout, compute_uv_rect,
};
use super::snapshot::{SnapshotCoordinator, TapPayload, TapSink, image_from_bottom_up};
use super::source::VideoFrame;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("GPU context is lost")]
    ContextLost,
    #[error("shader compilation failed: {0}")]
    Shader(String),
    #[error("GPU resource allocation failed: {0}")]
    Allocation(String),
    #[error("frame upload failed: {0}")]
    Upload(String),
    #[error("pixel readback failed: {0}")]
    Readback(String),
}

/// Minimal GPU surface the renderer needs.
pub trait GpuDevice {
    /// Compiles shaders and creates the vertex array. Called on first use and
    /// after a context restore.
    fn init(&mut self) -> Result<(), RenderError>;
    fn is_context_lost(&self) -> bool;
    fn set_viewport(&mut self, width: u32, height: u32);
    /// (Re)allocates the video texture at the given size.
    fn allocate_texture(&mut self, width: u32, height: u32) -> Result<(), RenderError>;
    fn upload_frame(&mut self, frame: &VideoFrame) -> Result<(), RenderError>;
    fn set_uv_rect(&mut self, uv: UvRect);
    /// Draws the full-screen triangle over the viewport.
    fn draw(&mut self);
    /// Reads the framebuffer after a flush; rows bottom-up, RGBA8.
    fn read_pixels(&mut self, width: u32, height: u32) -> Result<Vec<u8>, RenderError>;
    fn release_texture(&mut self);
    /// Frees every GPU handle.
    fn dispose(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderState {
    /// Resources not created yet (or disposed).
    Uninitialized,
    Ready,
    ContextLost,
}

/// Result of one render tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Nothing drawn: stopped, no context, or no frame yet.
    Skipped,
    Drawn,
    /// Drawn, and a snapshot was delivered to the sink.
    DrawnWithSnapshot,
}

pub struct FrameRenderer {
    state: RenderState,
    is_rendering: bool,
    meta: Option<VideoMeta>,
    layout: Option<CameraLayout>,
    uv: Option<UvRect>,
    /// (cw, ch, dpr) the layout was computed for.
    container: Option<(f64, f64, f64)>,
    canvas_size: (u32, u32),
    texture_size: Option<(u32, u32)>,
    overscan: f64,
}

impl FrameRenderer {
    pub fn new(overscan: f64) -> Self {
        Self {
            state: RenderState::Uninitialized,
            is_rendering: false,
            meta: None,
            layout: None,
            uv: None,
            container: None,
            canvas_size: (1, 1),
            texture_size: None,
            overscan,
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn is_rendering(&self) -> bool {
        self.is_rendering
    }

    pub fn layout(&self) -> Option<&CameraLayout> {
        self.layout.as_ref()
    }

    pub fn uv_rect(&self) -> Option<UvRect> {
        self.uv
    }

    /// Current backing-store size in device pixels.
    pub fn canvas_size(&self) -> (u32, u32) {
        self.canvas_size
    }

    pub fn texture_size(&self) -> Option<(u32, u32)> {
        self.texture_size
    }

    /// Creates GPU resources and starts rendering.
    pub fn init(&mut self, dev: &mut dyn GpuDevice) -> Result<(), RenderError> {
        if dev.is_context_lost() {
            self.state = RenderState::ContextLost;
            return Err(RenderError::ContextLost);
        }
        dev.init()?;
        self.state = RenderState::Ready;
        self.is_rendering = true;
        self.texture_size = None;
        log::info!("Renderer initialized");
        Ok(())
    }

    /// Records new stream dimensions; the layout is recomputed.
    pub fn set_video_meta(&mut self, meta: VideoMeta) {
        if self.meta == Some(meta) {
            return;
        }
        log::info!("Video size {}x{}", meta.vw, meta.vh);
        self.meta = Some(meta);
        self.recompute_layout();
    }

    /// Applies a container size in logical pixels. No-op when unchanged.
    pub fn resize(&mut self, cw: f64, ch: f64, dpr: f64) {
        let cw = cw.max(1.0);
        let ch = ch.max(1.0);
        if self.container == Some((cw, ch, dpr)) {
            return;
        }
        self.container = Some((cw, ch, dpr));
        self.canvas_size = canvas_pixel_size(cw, ch, dpr);
        self.recompute_layout();
    }

    fn recompute_layout(&mut self) {
        let (Some(meta), Some((cw, ch, dpr))) = (self.meta, self.container) else {
            return;
        };
        let layout = compute_layout(meta.vw as f64, meta.vh as f64, cw, ch, dpr, self.overscan);
        self.uv = Some(compute_uv_rect(&layout, meta.vw as f64, meta.vh as f64));
        self.layout = Some(layout);
    }

    /// Renders one frame and services a pending snapshot request.
    pub fn render(
        &mut self,
        dev: &mut dyn GpuDevice,
        frame: Option<&VideoFrame>,
        snapshots: &mut SnapshotCoordinator,
        sink: &dyn TapSink,
    ) -> RenderOutcome {
        if !self.is_rendering || self.state != RenderState::Ready {
            return RenderOutcome::Skipped;
        }
        if dev.is_context_lost() {
            self.on_context_lost(dev);
            return RenderOutcome::Skipped;
        }
        let Some(frame) = frame else {
            return RenderOutcome::Skipped;
        };

        self.set_video_meta(VideoMeta {
            vw: frame.width,
            vh: frame.height,
        });
        let Some(uv) = self.uv else {
            return RenderOutcome::Skipped;
        };

        dev.set_viewport(self.canvas_size.0, self.canvas_size.1);

        let frame_size = (frame.width, frame.height);
        if self.texture_size != Some(frame_size) {
            if let Err(e) = dev.allocate_texture(frame.width, frame.height) {
                log::warn!("Texture allocation failed: {}", e);
                dev.release_texture();
                self.texture_size = None;
                return RenderOutcome::Skipped;
            }
            self.texture_size = Some(frame_size);
        }

        if let Err(e) = dev.upload_frame(frame) {
            if matches!(e, RenderError::ContextLost) {
                self.on_context_lost(dev);
                return RenderOutcome::Skipped;
            }
            log::warn!("Frame upload failed: {}", e);
            dev.release_texture();
            self.texture_size = None;
            return RenderOutcome::Skipped;
        }

        dev.set_uv_rect(uv);
        dev.draw();

        let Some(point) = snapshots.take_request() else {
            return RenderOutcome::Drawn;
        };

        // Read back the draw that just happened, at the canvas size it used.
        let (w, h) = self.canvas_size;
        let point = point.clamp_to(w, h);
        let pixels = match dev.read_pixels(w, h) {
            Ok(p) => p,
            Err(RenderError::ContextLost) => {
                self.on_context_lost(dev);
                return RenderOutcome::Skipped;
            }
            Err(e) => {
                log::warn!("Snapshot skipped: {}", e);
                return RenderOutcome::Drawn;
            }
        };
        let Some(image) = image_from_bottom_up(w, h, &pixels) else {
            log::warn!("Snapshot skipped: readback returned {} bytes for {}x{}", pixels.len(), w, h);
            return RenderOutcome::Drawn;
        };

        let delivered = sink.deliver(TapPayload {
            x: point.x,
            y: point.y,
            image,
            captured_at: Local::now(),
        });
        if delivered {
            RenderOutcome::DrawnWithSnapshot
        } else {
            RenderOutcome::Drawn
        }
    }

    /// Frees GPU state after a context loss and halts rendering.
    pub fn on_context_lost(&mut self, dev: &mut dyn GpuDevice) {
        if self.state == RenderState::ContextLost {
            return;
        }
        log::warn!("GPU context lost; rendering halted");
        dev.release_texture();
        self.state = RenderState::ContextLost;
        self.texture_size = None;
        self.uv = None;
    }

    /// Rebuilds everything from scratch on a new context.
    pub fn on_context_restored(&mut self, dev: &mut dyn GpuDevice) -> Result<(), RenderError> {
        log::info!("GPU context restored; reinitializing");
        self.state = RenderState::Uninitialized;
        if let Err(e) = self.init(dev) {
            self.state = RenderState::ContextLost;
            return Err(e);
        }
        self.recompute_layout();
        Ok(())
    }

    /// Stops the render loop (stream ended or explicit stop).
    pub fn stop(&mut self) {
        self.is_rendering = false;
    }

    /// Drops the texture and stream metadata so a new stream starts clean.
    pub fn reload(&mut self, dev: &mut dyn GpuDevice) {
        dev.release_texture();
        self.texture_size = None;
        self.meta = None;
        self.layout = None;
        self.uv = None;
        if self.state == RenderState::Ready {
            self.is_rendering = true;
        }
    }

    pub fn dispose(&mut self, dev: &mut dyn GpuDevice) {
        self.is_rendering = false;
        dev.dispose();
        self.state = RenderState::Uninitialized;
        self.texture_size = None;
    }
}
