//! Glue between input, the video source and the renderer.
//!
//! The UI thread feeds pointer/wheel input and polls the source on every
//! update; the paint callback renders with whatever GL context it is handed.
//! Both sides lock the same [`CameraPipeline`].

use eframe::glow;

use super::geometry::effective_dpr;
use super::gesture::{ExclusionRect, GestureClassifier, GestureOutput, PointerEvent};
use super::gl::{GlowDevice, GlowResources, ScreenRect};
use super::renderer::{FrameRenderer, GpuDevice, RenderOutcome, RenderState};
use super::snapshot::{CanvasPoint, ContainerRect, SnapshotCoordinator, TapSink};
use super::source::{VideoFrame, VideoSource};
use super::zoom::{ZoomController, ZoomState};
use crate::config::AppConfig;

/// Pointer phase as reported by the windowing layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    Cancel,
    Leave,
}

/// What became of a tap once the renderer dealt with it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TapResult {
    /// The snapshot reached the scan worker; a report will follow.
    Delivered,
    /// No snapshot left the renderer (readback failed, reload, stream or
    /// context gone, worker not running).
    Dropped,
}

pub struct CameraPipeline {
    renderer: FrameRenderer,
    zoom: ZoomController,
    gestures: GestureClassifier,
    snapshots: SnapshotCoordinator,
    source: Option<Box<dyn VideoSource>>,
    current: Option<VideoFrame>,
    sink: Box<dyn TapSink + Send>,
    gl: GlowResources,
    container: ContainerRect,
    dpr: f64,
    max_dpr: f32,
    reload_requested: bool,
    tap_pending: bool,
    tap_result: Option<TapResult>,
}

impl CameraPipeline {
    pub fn new(config: &AppConfig, sink: Box<dyn TapSink + Send>) -> Self {
        Self {
            renderer: FrameRenderer::new(config.render.overscan as f64),
            zoom: ZoomController::from_config(&config.zoom),
            gestures: GestureClassifier::new(config.tap),
            snapshots: SnapshotCoordinator::new(),
            source: None,
            current: None,
            sink,
            gl: GlowResources::default(),
            container: ContainerRect {
                left: 0.0,
                top: 0.0,
                width: 1.0,
                height: 1.0,
            },
            dpr: 1.0,
            max_dpr: config.render.max_dpr,
            reload_requested: false,
            tap_pending: false,
            tap_result: None,
        }
    }

    /// Replaces the video source. The texture and stream metadata are
    /// rebuilt on the next paint.
    pub fn attach_source(&mut self, source: Box<dyn VideoSource>) {
        if let Some(mut old) = self.source.take() {
            old.stop();
        }
        self.zoom.reset();
        match source.zoom_capabilities() {
            Some((caps, value)) => self.zoom.report_capabilities(Some(caps), Some(value)),
            None => self.zoom.report_capabilities(None, None),
        }
        self.source = Some(source);
        self.current = None;
        self.drop_pending_tap();
        self.gestures.reset();
        self.reload_requested = true;
    }

    /// Stops the current stream; rendering halts until a new source is attached.
    pub fn detach_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
        self.current = None;
        self.drop_pending_tap();
        self.renderer.stop();
    }

    /// Drops the texture and re-reads stream metadata on the next paint,
    /// keeping the GL program alive.
    pub fn request_reload(&mut self) {
        self.reload_requested = true;
        self.drop_pending_tap();
        self.gestures.reset();
    }

    /// Outcome of the last tap, once known. Each result is returned once.
    pub fn take_tap_result(&mut self) -> Option<TapResult> {
        self.tap_result.take()
    }

    fn settle_tap(&mut self, result: TapResult) {
        if self.tap_pending {
            self.tap_pending = false;
            self.tap_result = Some(result);
        }
    }

    fn drop_pending_tap(&mut self) {
        self.snapshots.cancel();
        self.settle_tap(TapResult::Dropped);
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn has_frame(&self) -> bool {
        self.current.is_some()
    }

    pub fn zoom_state(&self) -> ZoomState {
        self.zoom.state()
    }

    pub fn render_state(&self) -> RenderState {
        self.renderer.state()
    }

    /// Pulls the newest frame and zoom results, then starts at most one zoom apply.
    /// Call once per UI frame.
    pub fn tick(&mut self) {
        let Some(source) = self.source.as_mut() else {
            return;
        };
        if let Some(frame) = source.poll_frame() {
            self.current = Some(frame);
        }
        if let Some((z, result)) = source.poll_zoom_result() {
            self.zoom.complete_apply(z, result);
        }
        if let Some(z) = self.zoom.begin_apply() {
            source.submit_zoom(z);
        }
        if source.has_ended() {
            log::info!("Video source ended; stopping renderer");
            self.source = None;
            self.drop_pending_tap();
            self.renderer.stop();
        }
    }

    /// Updates the on-screen placement of the camera view.
    pub fn set_container(&mut self, rect: ContainerRect, device_dpr: f32) {
        self.container = rect;
        self.dpr = effective_dpr(device_dpr, self.max_dpr);
        self.renderer
            .resize(rect.width as f64, rect.height as f64, self.dpr);
    }

    /// Region (client coordinates) where input is ignored, e.g. the reload button.
    pub fn set_exclusion(&mut self, rect: Option<ExclusionRect>) {
        self.gestures.set_exclusion(rect);
    }

    /// Routes a pointer event through tap/pinch classification.
    ///
    /// Returns the canvas position when the event completed a tap.
    pub fn handle_pointer(&mut self, phase: PointerPhase, event: PointerEvent) -> Option<CanvasPoint> {
        let output = match phase {
            PointerPhase::Down => self.gestures.pointer_down(event),
            PointerPhase::Move => self.gestures.pointer_move(event),
            PointerPhase::Up => self.gestures.pointer_up(event),
            PointerPhase::Cancel => self.gestures.pointer_cancel(event.id),
            PointerPhase::Leave => self.gestures.pointer_leave(event.id),
        };

        match output {
            GestureOutput::None => None,
            GestureOutput::Tap { x, y } => {
                if self.current.is_none() {
                    return None;
                }
                let point = self.snapshots.request_from_client(
                    x,
                    y,
                    &self.container,
                    self.dpr,
                    self.renderer.canvas_size(),
                );
                log::debug!("Tap at canvas ({}, {})", point.x, point.y);
                self.tap_pending = true;
                Some(point)
            }
            GestureOutput::PinchStarted => {
                self.zoom.begin_pinch();
                None
            }
            GestureOutput::PinchChanged { ratio } => {
                self.zoom.update_pinch(ratio);
                None
            }
            GestureOutput::PinchEnded => {
                self.zoom.end_pinch();
                None
            }
        }
    }

    /// Wheel zoom at a client position. Positive `delta_y` zooms out.
    pub fn handle_wheel(&mut self, x: f32, y: f32, delta_y: f32) {
        if self.gestures.wheel_allowed(x, y) {
            self.zoom.zoom_by_wheel(delta_y);
        }
    }

    /// Renders with an arbitrary device.
    pub fn paint_with(&mut self, dev: &mut dyn GpuDevice) -> RenderOutcome {
        match self.renderer.state() {
            RenderState::Uninitialized => {
                if let Err(e) = self.renderer.init(dev) {
                    log::warn!("Renderer init failed: {}", e);
                    return RenderOutcome::Skipped;
                }
            }
            RenderState::ContextLost => {
                self.drop_pending_tap();
                if let Err(e) = self.renderer.on_context_restored(dev) {
                    log::debug!("Context not restored yet: {}", e);
                    return RenderOutcome::Skipped;
                }
            }
            RenderState::Ready => {}
        }

        if self.reload_requested {
            self.reload_requested = false;
            self.renderer.reload(dev);
        }

        let outcome =
            self.renderer
                .render(dev, self.current.as_ref(), &mut self.snapshots, self.sink.as_ref());

        if self.renderer.state() == RenderState::ContextLost {
            self.drop_pending_tap();
        } else if self.tap_pending && !self.snapshots.is_requested() {
            // The request was consumed by this draw.
            let result = if outcome == RenderOutcome::DrawnWithSnapshot {
                TapResult::Delivered
            } else {
                TapResult::Dropped
            };
            self.settle_tap(result);
        }
        outcome
    }

    /// Renders into the egui GL context. The canvas is drawn offscreen at its
    /// backing size and stretched over `target`, the view's rect in
    /// framebuffer pixels.
    pub fn paint_gl(&mut self, gl: &glow::Context, target: ScreenRect) -> RenderOutcome {
        if self.renderer.state() == RenderState::ContextLost && !self.gl.poll_restored(gl) {
            return RenderOutcome::Skipped;
        }
        self.gl.set_target(target);
        let mut gl_resources = std::mem::take(&mut self.gl);
        let outcome = {
            let mut dev = GlowDevice::new(gl, &mut gl_resources);
            self.paint_with(&mut dev)
        };
        self.gl = gl_resources;
        outcome
    }

    /// Frees GL resources; call from the app's exit hook with the GL context.
    pub fn dispose_gl(&mut self, gl: &glow::Context) {
        let mut gl_resources = std::mem::take(&mut self.gl);
        self.renderer
            .dispose(&mut GlowDevice::new(gl, &mut gl_resources));
        self.detach_source();
    }
}
