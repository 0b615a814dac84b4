//! GUI module for the application.
//!
//! Shows the live camera view, forwards taps and zoom input to the camera
//! pipeline and presents scan results.

pub mod render;
pub mod state;

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eframe::egui::{self, Vec2};
use eframe::{egui_glow, glow};

use crate::camera::gesture::{ExclusionRect, PointerEvent, PointerKind};
use crate::camera::source::{open_camera, StillImageSource, VideoSource};
use crate::camera::{CameraPipeline, ContainerRect, PointerPhase, ScreenRect, TapPayload};
use crate::config::get_config;
use crate::scan::{RecognizerSlot, ScanReport};

use state::{CameraStatus, GuiState, ResultDialog};

/// Mouse events within this many seconds of a touch are the platform's
/// emulation of that touch.
const TOUCH_MOUSE_SUPPRESS_SECS: f64 = 0.5;
const MOUSE_POINTER_ID: u64 = 0;

/// Everything the window needs from the rest of the application.
pub struct GuiLaunch {
    /// Show a still image instead of opening a camera.
    pub still_image: Option<PathBuf>,
    pub taps: Sender<TapPayload>,
    pub reports: Receiver<ScanReport>,
    pub recognizer: RecognizerSlot,
}

/// Main GUI application struct.
pub struct GuiApp {
    state: GuiState,
    pipeline: Arc<Mutex<CameraPipeline>>,
    reports: Receiver<ScanReport>,
    recognizer: RecognizerSlot,
    /// egui time of the last touch event.
    last_touch_time: Option<f64>,
}

impl GuiApp {
    /// Create a new GUI application instance.
    pub fn new(cc: &eframe::CreationContext<'_>, launch: GuiLaunch) -> Self {
        Self::setup_fonts(&cc.egui_ctx);

        let config = get_config();
        let mut pipeline = CameraPipeline::new(config, Box::new(launch.taps));
        let mut state = GuiState::default();

        let source: Result<Box<dyn VideoSource>, _> = match &launch.still_image {
            Some(path) => StillImageSource::open(path).map(|s| Box::new(s) as Box<dyn VideoSource>),
            None => open_camera(&config.camera),
        };
        match source {
            Ok(source) => {
                log::info!("GUI: video source opened");
                pipeline.attach_source(source);
            }
            Err(e) => {
                log::warn!("GUI: failed to open video source: {}", e);
                state.camera = CameraStatus::Failed(e.to_string());
            }
        }

        Self {
            state,
            pipeline: Arc::new(Mutex::new(pipeline)),
            reports: launch.reports,
            recognizer: launch.recognizer,
            last_touch_time: None,
        }
    }

    /// Setup fonts with Japanese support.
    fn setup_fonts(ctx: &egui::Context) {
        let mut fonts = egui::FontDefinitions::default();

        let font_paths = [
            // Windows
            "C:\\Windows\\Fonts\\YuGothM.ttc",
            "C:\\Windows\\Fonts\\meiryo.ttc",
            "C:\\Windows\\Fonts\\msgothic.ttc",
            // macOS
            "/System/Library/Fonts/ヒラギノ角ゴシック W3.ttc",
            "/System/Library/Fonts/Hiragino Sans GB.ttc",
            // Linux
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
        ];

        let mut font_loaded = false;
        for font_path in &font_paths {
            if let Ok(font_data) = std::fs::read(font_path) {
                fonts.font_data.insert(
                    "japanese_font".to_owned(),
                    egui::FontData::from_owned(font_data).into(),
                );
                for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
                    fonts
                        .families
                        .entry(family)
                        .or_default()
                        .insert(0, "japanese_font".to_owned());
                }
                log::info!("Loaded Japanese font from: {}", font_path);
                font_loaded = true;
                break;
            }
        }

        if !font_loaded {
            log::warn!("Could not load Japanese font. Text may not display correctly.");
        }

        ctx.set_fonts(fonts);
    }

    /// Pull frames, zoom results and scan reports.
    fn poll(&mut self) {
        if let Ok(mut pipeline) = self.pipeline.lock() {
            pipeline.tick();
            let next = match self.state.camera {
                CameraStatus::Starting if pipeline.has_frame() => Some(CameraStatus::Live),
                CameraStatus::Live if !pipeline.has_source() => Some(CameraStatus::Ended),
                _ => None,
            };
            if let Some(next) = next {
                log::info!("GUI: camera {:?}", next);
                self.state.camera = next;
            }
            if let Some(result) = pipeline.take_tap_result() {
                self.state.on_tap_result(result);
            }
        }

        loop {
            match self.reports.try_recv() {
                Ok(report) => {
                    log::info!(
                        "GUI: scan at ({}, {}) captured {} finished: {:?}",
                        report.x,
                        report.y,
                        report.captured_at.format("%H:%M:%S%.3f"),
                        report.outcome
                    );
                    self.state.on_report(report.outcome);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.state.on_worker_stopped();
                    break;
                }
            }
        }

        if let CameraStatus::Failed(msg) = &self.state.camera {
            if !self.state.camera_failure_shown {
                self.state.dialog = Some(ResultDialog::CameraFailed(msg.clone()));
                self.state.camera_failure_shown = true;
            }
        }
    }

    /// Forwards this frame's pointer, touch and wheel input to the pipeline.
    fn handle_input(&mut self, ctx: &egui::Context, camera_rect: egui::Rect) {
        let (events, time, scroll_y, hover) = ctx.input(|i| {
            (
                i.events.clone(),
                i.time,
                i.raw_scroll_delta.y,
                i.pointer.hover_pos(),
            )
        });
        let accepts_taps = self.state.accepts_taps();
        let Ok(mut pipeline) = self.pipeline.lock() else {
            return;
        };

        let button = render::reload_button_rect(camera_rect);
        pipeline.set_exclusion(Some(ExclusionRect {
            left: button.left(),
            top: button.top(),
            right: button.right(),
            bottom: button.bottom(),
        }));

        let at = Duration::from_secs_f64(time.max(0.0));
        for event in events {
            let (phase, pointer) = match event {
                egui::Event::Touch { id, phase, pos, .. } => {
                    self.last_touch_time = Some(time);
                    let phase = match phase {
                        egui::TouchPhase::Start => PointerPhase::Down,
                        egui::TouchPhase::Move => PointerPhase::Move,
                        egui::TouchPhase::End => PointerPhase::Up,
                        egui::TouchPhase::Cancel => PointerPhase::Cancel,
                    };
                    let pointer = PointerEvent {
                        id: id.0.wrapping_add(1),
                        kind: PointerKind::Touch,
                        x: pos.x,
                        y: pos.y,
                        time: at,
                    };
                    (phase, pointer)
                }
                egui::Event::PointerButton {
                    pos,
                    button: egui::PointerButton::Primary,
                    pressed,
                    ..
                } => {
                    if self.is_emulated_mouse(time) {
                        continue;
                    }
                    let phase = if pressed { PointerPhase::Down } else { PointerPhase::Up };
                    (phase, mouse_event(pos, at))
                }
                egui::Event::PointerMoved(pos) => {
                    if self.is_emulated_mouse(time) {
                        continue;
                    }
                    (PointerPhase::Move, mouse_event(pos, at))
                }
                egui::Event::PointerGone => (
                    PointerPhase::Leave,
                    mouse_event(egui::Pos2::ZERO, at),
                ),
                _ => continue,
            };

            // New pointers only count when they land on the camera view.
            if phase == PointerPhase::Down
                && (!accepts_taps || !camera_rect.contains(egui::pos2(pointer.x, pointer.y)))
            {
                continue;
            }
            if pipeline.handle_pointer(phase, pointer).is_some() {
                self.state.scanning = true;
            }
        }

        if scroll_y != 0.0 && self.state.dialog.is_none() {
            if let Some(pos) = hover.filter(|p| camera_rect.contains(*p)) {
                // egui scrolls up with positive y; zooming in wants a negative delta.
                pipeline.handle_wheel(pos.x, pos.y, -scroll_y);
            }
        }
    }

    fn is_emulated_mouse(&self, now: f64) -> bool {
        self.last_touch_time
            .is_some_and(|t| now - t < TOUCH_MOUSE_SUPPRESS_SECS)
    }

    /// Lays out the camera view and registers the GL paint callback.
    fn show_camera(&mut self, ui: &mut egui::Ui) -> egui::Rect {
        let rect = ui.available_rect_before_wrap();
        ui.allocate_rect(rect, egui::Sense::hover());

        let has_frame = match self.pipeline.lock() {
            Ok(mut pipeline) => {
                pipeline.set_container(
                    ContainerRect {
                        left: rect.left(),
                        top: rect.top(),
                        width: rect.width(),
                        height: rect.height(),
                    },
                    ui.ctx().pixels_per_point(),
                );
                pipeline.has_frame()
            }
            Err(_) => false,
        };

        if has_frame {
            let pipeline = Arc::clone(&self.pipeline);
            let callback = egui_glow::CallbackFn::new(move |info, painter| {
                let viewport = info.viewport_in_pixels();
                let target = ScreenRect {
                    left: viewport.left_px,
                    bottom: viewport.from_bottom_px,
                    width: viewport.width_px,
                    height: viewport.height_px,
                };
                if let Ok(mut pipeline) = pipeline.lock() {
                    pipeline.paint_gl(painter.gl(), target);
                }
            });
            ui.painter().add(egui::PaintCallback {
                rect,
                callback: Arc::new(callback),
            });
        } else {
            render::render_camera_placeholder(ui, rect, &self.state.camera);
        }
        rect
    }

    /// Handle reload button click.
    fn handle_reload(&mut self) {
        log::info!("GUI: camera reload requested");
        if let Ok(mut pipeline) = self.pipeline.lock() {
            pipeline.request_reload();
        }
    }
}

fn mouse_event(pos: egui::Pos2, time: Duration) -> PointerEvent {
    PointerEvent {
        id: MOUSE_POINTER_ID,
        kind: PointerKind::Mouse,
        x: pos.x,
        y: pos.y,
        time,
    }
}

impl eframe::App for GuiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll();

        // Frames arrive continuously; keep painting while the camera is up.
        if !matches!(self.state.camera, CameraStatus::Failed(_) | CameraStatus::Ended) {
            ctx.request_repaint();
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                let camera_rect = self.show_camera(ui);
                self.handle_input(ctx, camera_rect);

                if render::render_reload_button(ui, camera_rect) {
                    self.handle_reload();
                }

                let zoom = self
                    .pipeline
                    .lock()
                    .map(|p| p.zoom_state())
                    .ok();
                if let Some(zoom) = zoom {
                    let ocr_ready = self.recognizer.get().is_some();
                    render::render_status_bar(ui, camera_rect, &self.state, &zoom, ocr_ready);
                }
            });

        if let Some(dialog) = &self.state.dialog {
            let (close_clicked, map_clicked) = render::render_result_dialog(ctx, dialog);
            if map_clicked {
                if let Some(facility) = dialog.facility() {
                    log::info!("GUI: opening map for {}", facility.id);
                }
            }
            if close_clicked {
                self.state.dialog = None;
            }
        }
    }

    fn on_exit(&mut self, gl: Option<&glow::Context>) {
        if let (Some(gl), Ok(mut pipeline)) = (gl, self.pipeline.lock()) {
            pipeline.dispose_gl(gl);
        }
        log::info!("GUI: exiting");
    }
}

/// Run the GUI application.
/// This function blocks until the window is closed.
pub fn run_gui(launch: GuiLaunch) -> eframe::Result<()> {
    log::info!("GUI: Creating native options...");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(Vec2::new(960.0, 720.0))
            .with_min_inner_size(Vec2::new(360.0, 480.0))
            .with_title("Campus Scan"),
        renderer: eframe::Renderer::Glow,
        ..Default::default()
    };

    eframe::run_native(
        "Campus Scan",
        options,
        Box::new(|cc| {
            log::info!("GUI: Creating GuiApp instance...");
            Ok(Box::new(GuiApp::new(cc, launch)))
        }),
    )
}
