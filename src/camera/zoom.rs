//! Hardware zoom control.
//!
//! Wheel and pinch input produce *desired* zoom values at event rate; the
//! controller coalesces them so that at most one constraint is applied per
//! rendered frame, and the last request in a frame wins. A rejected
//! constraint downgrades the controller to [`ZoomPhase::Unsupported`] for the
//! rest of the stream's lifetime.

use thiserror::Error;

/// Zoom range advertised by the camera track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomCapabilities {
    pub min: f32,
    pub max: f32,
    /// Zero means the device did not report a step.
    pub step: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoomPhase {
    Unsupported,
    Idle,
    Applying,
}

/// Snapshot of the controller for display.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomState {
    pub supported: bool,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    /// Last value the hardware accepted.
    pub value: f32,
}

/// How a constraint is presented to the track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintMode {
    /// Preferred form (an "advanced" constraint set on browsers, a direct
    /// control write on native cameras).
    Advanced,
    /// Plain constraint, tried when the advanced form is rejected.
    Basic,
}

#[derive(Debug, Error)]
pub enum ConstraintError {
    #[error("zoom constraint rejected: {0}")]
    Rejected(String),
    #[error("camera track has ended")]
    TrackEnded,
}

/// A camera track that accepts zoom constraints.
pub trait ZoomTrack {
    fn apply_zoom(&mut self, value: f32, mode: ConstraintMode) -> Result<(), ConstraintError>;
}

pub struct ZoomController {
    phase: ZoomPhase,
    min: f32,
    max: f32,
    step: f32,
    value: f32,
    desired: Option<f32>,
    pinch_start_zoom: Option<f32>,
    wheel_sensitivity: f32,
    fallback_step: f32,
}

impl ZoomController {
    pub fn new(wheel_sensitivity: f32, fallback_step: f32) -> Self {
        Self {
            phase: ZoomPhase::Unsupported,
            min: 1.0,
            max: 1.0,
            step: 0.0,
            value: 1.0,
            desired: None,
            pinch_start_zoom: None,
            wheel_sensitivity,
            fallback_step: if fallback_step > 0.0 { fallback_step } else { 0.001 },
        }
    }

    pub fn from_config(config: &crate::config::ZoomConfig) -> Self {
        Self::new(config.wheel_sensitivity, config.fallback_step)
    }

    /// Forgets everything learned about the previous stream.
    pub fn reset(&mut self) {
        let (sensitivity, fallback) = (self.wheel_sensitivity, self.fallback_step);
        *self = Self::new(sensitivity, fallback);
    }

    /// Records the capabilities of a freshly opened track.
    ///
    /// `None` (no zoom capability) or an empty range keeps the controller
    /// unsupported.
    pub fn report_capabilities(&mut self, caps: Option<ZoomCapabilities>, initial: Option<f32>) {
        let Some(caps) = caps else {
            log::info!("Camera does not expose zoom");
            self.phase = ZoomPhase::Unsupported;
            return;
        };
        if !(caps.min.is_finite() && caps.max.is_finite()) || caps.max <= caps.min {
            log::info!("Camera zoom range is empty ({}..{})", caps.min, caps.max);
            self.phase = ZoomPhase::Unsupported;
            return;
        }

        self.min = caps.min;
        self.max = caps.max;
        self.step = caps.step.max(0.0);
        self.value = initial.unwrap_or(caps.min).clamp(caps.min, caps.max);
        self.desired = None;
        self.phase = ZoomPhase::Idle;
        log::info!(
            "Zoom supported: {}..{} step {} (current {})",
            self.min,
            self.max,
            self.step,
            self.value
        );
    }

    pub fn phase(&self) -> ZoomPhase {
        self.phase
    }

    pub fn is_supported(&self) -> bool {
        self.phase != ZoomPhase::Unsupported
    }

    pub fn state(&self) -> ZoomState {
        ZoomState {
            supported: self.is_supported(),
            min: self.min,
            max: self.max,
            step: self.effective_step(),
            value: self.value,
        }
    }

    /// Value waiting for the next frame, if any.
    pub fn pending(&self) -> Option<f32> {
        self.desired
    }

    fn effective_step(&self) -> f32 {
        if self.step > 0.0 { self.step } else { self.fallback_step }
    }

    /// Stores a clamped desired zoom for the next frame.
    ///
    /// A request within one step of the applied value cancels any pending
    /// request instead of scheduling a redundant hardware call.
    pub fn request_zoom(&mut self, value: f32) {
        if !self.is_supported() || !value.is_finite() {
            return;
        }
        let next = value.clamp(self.min, self.max);
        if (next - self.value).abs() < self.effective_step() {
            self.desired = None;
            return;
        }
        self.desired = Some(next);
    }

    /// Scales zoom by a wheel delta (positive delta zooms out).
    pub fn zoom_by_wheel(&mut self, delta_y: f32) {
        if !self.is_supported() {
            return;
        }
        let base = self.desired.unwrap_or(self.value);
        let scale = (-delta_y * self.wheel_sensitivity).exp();
        self.request_zoom(base * scale);
    }

    /// Captures the zoom value a pinch will scale from.
    pub fn begin_pinch(&mut self) {
        self.pinch_start_zoom = Some(self.desired.unwrap_or(self.value));
    }

    /// `ratio` is the current finger distance over the distance at pinch start.
    pub fn update_pinch(&mut self, ratio: f32) {
        if let Some(start) = self.pinch_start_zoom {
            self.request_zoom(start * ratio);
        }
    }

    pub fn end_pinch(&mut self) {
        self.pinch_start_zoom = None;
    }

    /// Takes the pending value and enters `Applying`.
    ///
    /// Returns `None` when there is nothing to apply or an apply is already in
    /// flight; a request made meanwhile stays pending for a later frame.
    pub fn begin_apply(&mut self) -> Option<f32> {
        if self.phase != ZoomPhase::Idle {
            return None;
        }
        let z = self.desired.take()?;
        self.phase = ZoomPhase::Applying;
        Some(z)
    }

    /// Finishes an apply started by [`begin_apply`](Self::begin_apply).
    pub fn complete_apply(&mut self, z: f32, result: Result<(), ConstraintError>) {
        if self.phase != ZoomPhase::Applying {
            return;
        }
        match result {
            Ok(()) => {
                self.value = z;
                self.phase = ZoomPhase::Idle;
            }
            Err(e) => {
                log::warn!("Disabling zoom for this stream: {}", e);
                self.phase = ZoomPhase::Unsupported;
                self.desired = None;
                self.pinch_start_zoom = None;
            }
        }
    }

    /// Applies at most one pending value to `track`. Call once per frame.
    ///
    /// Returns true if a constraint was sent.
    pub fn on_animation_frame(&mut self, track: &mut dyn ZoomTrack) -> bool {
        let Some(z) = self.begin_apply() else {
            return false;
        };
        let result = apply_with_fallback(track, z);
        self.complete_apply(z, result);
        true
    }
}

/// Tries the advanced constraint form, then the basic one.
pub fn apply_with_fallback(track: &mut dyn ZoomTrack, z: f32) -> Result<(), ConstraintError> {
    match track.apply_zoom(z, ConstraintMode::Advanced) {
        Ok(()) => Ok(()),
        Err(first) => {
            log::debug!("Advanced zoom constraint failed ({}), trying basic", first);
            track.apply_zoom(z, ConstraintMode::Basic)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockTrack {
        calls: Vec<(f32, ConstraintMode)>,
        reject_advanced: bool,
        reject_basic: bool,
    }

    impl ZoomTrack for MockTrack {
        fn apply_zoom(&mut self, value: f32, mode: ConstraintMode) -> Result<(), ConstraintError> {
            self.calls.push((value, mode));
            let reject = match mode {
                ConstraintMode::Advanced => self.reject_advanced,
                ConstraintMode::Basic => self.reject_basic,
            };
            if reject {
                Err(ConstraintError::Rejected("mock".into()))
            } else {
                Ok(())
            }
        }
    }

    fn supported(min: f32, max: f32, step: f32) -> ZoomController {
        let mut z = ZoomController::new(0.002, 0.001);
        z.report_capabilities(Some(ZoomCapabilities { min, max, step }), Some(min));
        z
    }

    #[test]
    fn test_without_capability_stays_unsupported() {
        let mut z = ZoomController::new(0.002, 0.001);
        z.report_capabilities(None, None);
        z.request_zoom(2.0);

        let mut track = MockTrack::default();
        assert!(!z.on_animation_frame(&mut track));
        assert!(track.calls.is_empty());
        assert_eq!(z.phase(), ZoomPhase::Unsupported);
    }

    #[test]
    fn test_request_is_clamped() {
        let mut z = supported(1.0, 4.0, 0.1);
        let mut track = MockTrack::default();

        z.request_zoom(10.0);
        z.on_animation_frame(&mut track);
        assert_eq!(z.state().value, 4.0);

        z.request_zoom(-3.0);
        z.on_animation_frame(&mut track);
        assert_eq!(z.state().value, 1.0);

        for (v, _) in &track.calls {
            assert!((1.0..=4.0).contains(v));
        }
    }

    #[test]
    fn test_sub_step_request_makes_no_call() {
        let mut z = supported(1.0, 4.0, 0.1);
        let mut track = MockTrack::default();

        z.request_zoom(1.05);
        assert!(!z.on_animation_frame(&mut track));
        assert_eq!(track.calls.len(), 0);

        z.request_zoom(1.5);
        assert!(z.on_animation_frame(&mut track));
        assert_eq!(track.calls.len(), 1);
    }

    #[test]
    fn test_zero_step_uses_fallback() {
        let mut z = supported(1.0, 4.0, 0.0);
        let mut track = MockTrack::default();

        z.request_zoom(1.0005);
        assert!(!z.on_animation_frame(&mut track));
        z.request_zoom(1.01);
        assert!(z.on_animation_frame(&mut track));
    }

    #[test]
    fn test_requests_coalesce_to_last_per_frame() {
        let mut z = supported(1.0, 8.0, 0.01);
        let mut track = MockTrack::default();

        z.request_zoom(2.0);
        z.request_zoom(3.0);
        z.request_zoom(2.5);
        assert!(z.on_animation_frame(&mut track));
        assert!(!z.on_animation_frame(&mut track));

        assert_eq!(track.calls, vec![(2.5, ConstraintMode::Advanced)]);
        assert_eq!(z.state().value, 2.5);
    }

    #[test]
    fn test_basic_form_is_tried_after_advanced() {
        let mut z = supported(1.0, 4.0, 0.1);
        let mut track = MockTrack {
            reject_advanced: true,
            ..Default::default()
        };

        z.request_zoom(2.0);
        z.on_animation_frame(&mut track);

        assert_eq!(
            track.calls,
            vec![(2.0, ConstraintMode::Advanced), (2.0, ConstraintMode::Basic)]
        );
        assert!(z.is_supported());
        assert_eq!(z.state().value, 2.0);
    }

    #[test]
    fn test_failure_is_permanent() {
        let mut z = supported(1.0, 4.0, 0.1);
        let mut track = MockTrack {
            reject_advanced: true,
            reject_basic: true,
            ..Default::default()
        };

        z.request_zoom(2.0);
        z.on_animation_frame(&mut track);
        assert_eq!(z.phase(), ZoomPhase::Unsupported);
        assert_eq!(z.state().value, 1.0);

        let calls = track.calls.len();
        z.request_zoom(3.0);
        z.zoom_by_wheel(-500.0);
        z.on_animation_frame(&mut track);
        assert_eq!(track.calls.len(), calls);
    }

    #[test]
    fn test_reset_allows_new_stream() {
        let mut z = supported(1.0, 4.0, 0.1);
        z.complete_apply(2.0, Err(ConstraintError::TrackEnded));
        // complete_apply outside Applying is ignored.
        assert!(z.is_supported());

        z.request_zoom(2.0);
        let v = z.begin_apply().unwrap();
        z.complete_apply(v, Err(ConstraintError::TrackEnded));
        assert!(!z.is_supported());

        z.reset();
        z.report_capabilities(Some(ZoomCapabilities { min: 1.0, max: 2.0, step: 0.1 }), None);
        assert!(z.is_supported());
    }

    #[test]
    fn test_wheel_maps_exponentially() {
        let mut z = supported(1.0, 10.0, 0.01);
        let mut track = MockTrack::default();

        // Negative delta zooms in.
        z.zoom_by_wheel(-100.0);
        z.on_animation_frame(&mut track);
        let expected = (100.0f32 * 0.002).exp();
        assert!((z.state().value - expected).abs() < 1e-5);

        z.zoom_by_wheel(100.0);
        z.on_animation_frame(&mut track);
        assert!((z.state().value - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_pinch_scales_from_start_value() {
        let mut z = supported(1.0, 10.0, 0.01);
        let mut track = MockTrack::default();

        z.request_zoom(2.0);
        z.on_animation_frame(&mut track);

        z.begin_pinch();
        z.update_pinch(1.5);
        z.update_pinch(2.0);
        z.on_animation_frame(&mut track);
        assert_eq!(z.state().value, 4.0);
        z.end_pinch();

        z.update_pinch(3.0);
        assert_eq!(z.pending(), None);
    }

    #[test]
    fn test_request_during_apply_waits_for_next_frame() {
        let mut z = supported(1.0, 4.0, 0.1);

        z.request_zoom(2.0);
        let first = z.begin_apply().unwrap();
        assert_eq!(z.phase(), ZoomPhase::Applying);

        z.request_zoom(3.0);
        assert_eq!(z.begin_apply(), None);

        z.complete_apply(first, Ok(()));
        assert_eq!(z.begin_apply(), Some(3.0));
    }
}
