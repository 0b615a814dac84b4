//! Native camera capture via `nokhwa`.
//!
//! The camera handle lives on a dedicated capture thread. Frames come back
//! over a small bounded channel (newest frames are dropped when the UI falls
//! behind) and zoom requests go out over a command channel.

use std::sync::mpsc::{Receiver, Sender, SyncSender, TryRecvError, TrySendError, channel, sync_channel};
use std::thread;

use nokhwa::Camera;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, ControlValueDescription, ControlValueSetter, FrameFormat,
    KnownCameraControl, RequestedFormat, RequestedFormatType, Resolution,
};

use super::source::{CameraConstraints, CameraError, VideoFrame, VideoSource};
use super::zoom::{ConstraintError, ConstraintMode, ZoomCapabilities, ZoomTrack, apply_with_fallback};

enum Command {
    SetZoom(f32),
    Stop,
}

enum Event {
    ZoomApplied(f32, Result<(), ConstraintError>),
    Ended(String),
}

struct Opened {
    zoom: Option<(ZoomCapabilities, f32)>,
}

pub struct WebcamSource {
    frames: Receiver<VideoFrame>,
    commands: Sender<Command>,
    events: Receiver<Event>,
    zoom: Option<(ZoomCapabilities, f32)>,
    pending_zoom: Option<(f32, Result<(), ConstraintError>)>,
    ended: bool,
}

impl WebcamSource {
    /// Opens the camera on a capture thread and waits until it is streaming.
    pub fn open(constraints: &CameraConstraints) -> Result<Self, CameraError> {
        let (frame_tx, frames) = sync_channel(2);
        let (commands, command_rx) = channel();
        let (event_tx, events) = channel();
        let (ready_tx, ready_rx) = channel();
        let constraints = constraints.clone();

        thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || capture_thread(constraints, frame_tx, command_rx, event_tx, ready_tx))
            .map_err(|e| CameraError::Stream(e.to_string()))?;

        let opened = ready_rx
            .recv()
            .map_err(|_| CameraError::Stream("capture thread exited during open".to_string()))??;

        Ok(Self {
            frames,
            commands,
            events,
            zoom: opened.zoom,
            pending_zoom: None,
            ended: false,
        })
    }

    fn drain_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(Event::ZoomApplied(z, result)) => self.pending_zoom = Some((z, result)),
                Ok(Event::Ended(reason)) => {
                    log::warn!("Camera stream ended: {}", reason);
                    self.ended = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.ended = true;
                    break;
                }
            }
        }
    }
}

impl VideoSource for WebcamSource {
    fn poll_frame(&mut self) -> Option<VideoFrame> {
        self.drain_events();
        let mut latest = None;
        while let Ok(frame) = self.frames.try_recv() {
            latest = Some(frame);
        }
        latest
    }

    fn zoom_capabilities(&self) -> Option<(ZoomCapabilities, f32)> {
        self.zoom
    }

    fn submit_zoom(&mut self, value: f32) {
        if self.commands.send(Command::SetZoom(value)).is_err() {
            self.pending_zoom = Some((value, Err(ConstraintError::TrackEnded)));
        }
    }

    fn poll_zoom_result(&mut self) -> Option<(f32, Result<(), ConstraintError>)> {
        self.drain_events();
        self.pending_zoom.take()
    }

    fn has_ended(&self) -> bool {
        self.ended
    }

    fn stop(&mut self) {
        let _ = self.commands.send(Command::Stop);
        self.ended = true;
    }
}

impl Drop for WebcamSource {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Stop);
    }
}

fn requested_format(constraints: &CameraConstraints) -> RequestedFormat<'static> {
    if constraints.ideal_width >= 4096 || constraints.ideal_height >= 4096 {
        RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution)
    } else {
        let format = CameraFormat::new(
            Resolution::new(constraints.ideal_width, constraints.ideal_height),
            FrameFormat::MJPEG,
            30,
        );
        RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(format))
    }
}

fn read_zoom_capabilities(camera: &mut Camera) -> Option<(ZoomCapabilities, f32)> {
    let control = camera.camera_control(KnownCameraControl::Zoom).ok()?;
    match control.description() {
        ControlValueDescription::IntegerRange {
            min,
            max,
            value,
            step,
            ..
        } => Some((
            ZoomCapabilities {
                min: *min as f32,
                max: *max as f32,
                step: *step as f32,
            },
            *value as f32,
        )),
        ControlValueDescription::FloatRange {
            min,
            max,
            value,
            step,
            ..
        } => Some((
            ZoomCapabilities {
                min: *min as f32,
                max: *max as f32,
                step: *step as f32,
            },
            *value as f32,
        )),
        _ => None,
    }
}

/// Zoom writes against the camera owned by the capture thread.
struct CameraZoom<'a> {
    camera: &'a mut Camera,
}

impl ZoomTrack for CameraZoom<'_> {
    fn apply_zoom(&mut self, value: f32, mode: ConstraintMode) -> Result<(), ConstraintError> {
        let setter = match mode {
            ConstraintMode::Advanced => ControlValueSetter::Integer(value.round() as i64),
            ConstraintMode::Basic => ControlValueSetter::Float(value as f64),
        };
        self.camera
            .set_camera_control(KnownCameraControl::Zoom, setter)
            .map_err(|e| ConstraintError::Rejected(e.to_string()))
    }
}

fn capture_thread(
    constraints: CameraConstraints,
    frames: SyncSender<VideoFrame>,
    commands: Receiver<Command>,
    events: Sender<Event>,
    ready: Sender<Result<Opened, CameraError>>,
) {
    let index = CameraIndex::Index(constraints.device_index);
    let mut camera = match Camera::new(index, requested_format(&constraints)) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(CameraError::classify(e.to_string())));
            return;
        }
    };
    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(CameraError::classify(e.to_string())));
        return;
    }

    let zoom = read_zoom_capabilities(&mut camera);
    let format = camera.camera_format();
    log::info!(
        "Camera streaming {}x{} @ {}fps",
        format.resolution().width(),
        format.resolution().height(),
        format.frame_rate()
    );
    if ready.send(Ok(Opened { zoom })).is_err() {
        return;
    }

    loop {
        match commands.try_recv() {
            Ok(Command::SetZoom(z)) => {
                let result = apply_with_fallback(&mut CameraZoom { camera: &mut camera }, z);
                let _ = events.send(Event::ZoomApplied(z, result));
            }
            Ok(Command::Stop) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        let decoded = match camera.frame().and_then(|buf| buf.decode_image::<RgbAFormat>()) {
            Ok(img) => img,
            Err(e) => {
                let _ = events.send(Event::Ended(e.to_string()));
                break;
            }
        };
        let (width, height) = (decoded.width(), decoded.height());
        let frame = VideoFrame::new(width, height, decoded.into_raw());

        match frames.try_send(frame) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => break,
        }
    }

    let _ = camera.stop_stream();
    log::info!("Camera capture thread finished");
}
