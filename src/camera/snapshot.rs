//! Tap → snapshot coordination.
//!
//! A tap stores its canvas-space position and raises a request flag. The
//! renderer consumes the flag on its next draw, reads back that exact frame
//! and hands the result to a [`TapSink`], which must not block the render
//! path.

use std::sync::mpsc::Sender;

use chrono::{DateTime, Local};
use image::{ImageBuffer, Rgba, RgbaImage};

/// Container position and size in logical (client) pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContainerRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// A position on the canvas backing store, in device pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanvasPoint {
    pub x: u32,
    pub y: u32,
}

impl CanvasPoint {
    /// Clamps into a `width×height` canvas.
    pub fn clamp_to(self, width: u32, height: u32) -> CanvasPoint {
        CanvasPoint {
            x: self.x.min(width.saturating_sub(1)),
            y: self.y.min(height.saturating_sub(1)),
        }
    }
}

/// The rendered frame at the moment of a tap, plus where the tap landed.
#[derive(Clone, Debug)]
pub struct TapPayload {
    pub x: u32,
    pub y: u32,
    /// Rows top-down.
    pub image: RgbaImage,
    pub captured_at: DateTime<Local>,
}

/// Converts a client position to canvas device pixels.
///
/// `round((client - origin) * dpr)`, clamped to `[0, size - 1]` on each axis.
pub fn client_to_canvas(
    client_x: f32,
    client_y: f32,
    rect: &ContainerRect,
    dpr: f64,
    canvas_width: u32,
    canvas_height: u32,
) -> CanvasPoint {
    let to_px = |client: f32, origin: f32, size: u32| -> u32 {
        let v = ((client - origin) as f64 * dpr).round();
        let max = size.saturating_sub(1) as f64;
        if v.is_nan() {
            0
        } else {
            v.clamp(0.0, max) as u32
        }
    };
    CanvasPoint {
        x: to_px(client_x, rect.left, canvas_width),
        y: to_px(client_y, rect.top, canvas_height),
    }
}

/// Builds a top-down image from a bottom-up GL readback.
///
/// Returns `None` if `pixels` is shorter than `width * height * 4`.
pub fn image_from_bottom_up(width: u32, height: u32, pixels: &[u8]) -> Option<RgbaImage> {
    let row_len = width as usize * 4;
    let expected = row_len * height as usize;
    if pixels.len() < expected || row_len == 0 {
        return None;
    }

    let mut flipped = Vec::with_capacity(expected);
    for row in pixels[..expected].chunks_exact(row_len).rev() {
        flipped.extend_from_slice(row);
    }
    ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width, height, flipped)
}

/// Receives tap payloads off the render path.
pub trait TapSink {
    /// Returns false when the payload could not be handed over.
    fn deliver(&self, payload: TapPayload) -> bool;
}

impl TapSink for Sender<TapPayload> {
    fn deliver(&self, payload: TapPayload) -> bool {
        if self.send(payload).is_err() {
            log::warn!("Tap dropped: scan worker is not running");
            return false;
        }
        true
    }
}

/// Pending snapshot request shared between input handling and the renderer.
#[derive(Debug, Default)]
pub struct SnapshotCoordinator {
    pending: Option<CanvasPoint>,
}

impl SnapshotCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a snapshot of the next draw. A later tap before that draw
    /// replaces the coordinates.
    pub fn request(&mut self, point: CanvasPoint) {
        self.pending = Some(point);
    }

    /// Converts a client-space tap and requests a snapshot for it.
    pub fn request_from_client(
        &mut self,
        client_x: f32,
        client_y: f32,
        rect: &ContainerRect,
        dpr: f64,
        canvas_size: (u32, u32),
    ) -> CanvasPoint {
        let point = client_to_canvas(client_x, client_y, rect, dpr, canvas_size.0, canvas_size.1);
        self.request(point);
        point
    }

    pub fn is_requested(&self) -> bool {
        self.pending.is_some()
    }

    /// Consumes the request flag.
    pub fn take_request(&mut self) -> Option<CanvasPoint> {
        self.pending.take()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}
