//! Tap and pinch discrimination for pointer input over the camera view.
//!
//! A tap is a single pointer that goes down and up again quickly without
//! moving, while it was the only active pointer and no pinch happened. Two
//! simultaneous touch pointers form a pinch; mouse and pen never pinch.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Pen,
    Touch,
}

/// A pointer event in client (window) logical pixels.
#[derive(Clone, Copy, Debug)]
pub struct PointerEvent {
    pub id: u64,
    pub kind: PointerKind,
    pub x: f32,
    pub y: f32,
    /// Monotonic event time.
    pub time: Duration,
}

/// Limits for classifying a pointer-up as a tap. Both bounds are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapThresholds {
    pub max_distance_px: f32,
    pub max_duration_ms: u64,
}

impl Default for TapThresholds {
    fn default() -> Self {
        Self {
            max_distance_px: 5.0,
            max_duration_ms: 250,
        }
    }
}

/// Region (e.g. an overlay button) where pointer input is ignored. Edges are inclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExclusionRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl ExclusionRect {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GestureOutput {
    None,
    /// Tap at the pointer-up position.
    Tap { x: f32, y: f32 },
    PinchStarted,
    /// Current finger distance divided by the distance at pinch start.
    PinchChanged { ratio: f32 },
    PinchEnded,
}

#[derive(Clone, Copy, Debug)]
struct ActivePointer {
    id: u64,
    kind: PointerKind,
    x: f32,
    y: f32,
}

#[derive(Clone, Copy, Debug)]
struct TapCandidate {
    id: u64,
    x: f32,
    y: f32,
    time: Duration,
}

pub struct GestureClassifier {
    thresholds: TapThresholds,
    exclusion: Option<ExclusionRect>,
    // Insertion order decides which two touches form the pinch.
    active: Vec<ActivePointer>,
    candidate: Option<TapCandidate>,
    pinch_initial_distance: Option<f32>,
}

impl GestureClassifier {
    pub fn new(thresholds: TapThresholds) -> Self {
        Self {
            thresholds,
            exclusion: None,
            active: Vec::new(),
            candidate: None,
            pinch_initial_distance: None,
        }
    }

    pub fn set_exclusion(&mut self, rect: Option<ExclusionRect>) {
        self.exclusion = rect;
    }

    pub fn is_pinching(&self) -> bool {
        self.pinch_initial_distance.is_some()
    }

    pub fn active_pointers(&self) -> usize {
        self.active.len()
    }

    fn is_excluded(&self, x: f32, y: f32) -> bool {
        self.exclusion.is_some_and(|r| r.contains(x, y))
    }

    /// Wheel zoom is suppressed over the exclusion region.
    pub fn wheel_allowed(&self, x: f32, y: f32) -> bool {
        !self.is_excluded(x, y)
    }

    fn touch_pair(&self) -> Option<(ActivePointer, ActivePointer)> {
        let mut touches = self.active.iter().filter(|p| p.kind == PointerKind::Touch);
        let a = *touches.next()?;
        let b = *touches.next()?;
        Some((a, b))
    }

    fn touch_distance(&self) -> Option<f32> {
        self.touch_pair()
            .map(|(a, b)| (a.x - b.x).hypot(a.y - b.y))
    }

    pub fn pointer_down(&mut self, e: PointerEvent) -> GestureOutput {
        if self.is_excluded(e.x, e.y) {
            return GestureOutput::None;
        }
        self.active.retain(|p| p.id != e.id);
        self.active.push(ActivePointer {
            id: e.id,
            kind: e.kind,
            x: e.x,
            y: e.y,
        });

        if self.active.len() == 1 {
            self.candidate = Some(TapCandidate {
                id: e.id,
                x: e.x,
                y: e.y,
                time: e.time,
            });
            return GestureOutput::None;
        }

        // Any second pointer rules out a tap for everything currently down.
        self.candidate = None;

        if e.kind == PointerKind::Touch && !self.is_pinching() {
            if let Some(distance) = self.touch_distance() {
                self.pinch_initial_distance = Some(distance);
                return GestureOutput::PinchStarted;
            }
        }
        GestureOutput::None
    }

    pub fn pointer_move(&mut self, e: PointerEvent) -> GestureOutput {
        let Some(p) = self.active.iter_mut().find(|p| p.id == e.id) else {
            return GestureOutput::None;
        };
        p.x = e.x;
        p.y = e.y;

        match (self.pinch_initial_distance, self.touch_distance()) {
            (Some(initial), Some(current)) if initial > 0.0 => GestureOutput::PinchChanged {
                ratio: current / initial,
            },
            _ => GestureOutput::None,
        }
    }

    pub fn pointer_up(&mut self, e: PointerEvent) -> GestureOutput {
        if !self.active.iter().any(|p| p.id == e.id) {
            return GestureOutput::None;
        }
        self.active.retain(|p| p.id != e.id);

        if self.is_pinching() {
            if self.touch_pair().is_none() {
                self.pinch_initial_distance = None;
                return GestureOutput::PinchEnded;
            }
            return GestureOutput::None;
        }

        let Some(candidate) = self.candidate.take() else {
            return GestureOutput::None;
        };
        if candidate.id != e.id || self.is_excluded(e.x, e.y) {
            return GestureOutput::None;
        }

        let distance = (e.x - candidate.x).hypot(e.y - candidate.y);
        let elapsed = e.time.saturating_sub(candidate.time);
        let max_elapsed = Duration::from_millis(self.thresholds.max_duration_ms);

        if distance < self.thresholds.max_distance_px && elapsed < max_elapsed {
            GestureOutput::Tap { x: e.x, y: e.y }
        } else {
            GestureOutput::None
        }
    }

    /// Pointer cancelled by the platform; never produces a tap.
    pub fn pointer_cancel(&mut self, id: u64) -> GestureOutput {
        if !self.active.iter().any(|p| p.id == id) {
            return GestureOutput::None;
        }
        self.active.retain(|p| p.id != id);
        if self.candidate.is_some_and(|c| c.id == id) {
            self.candidate = None;
        }
        if self.is_pinching() && self.touch_pair().is_none() {
            self.pinch_initial_distance = None;
            return GestureOutput::PinchEnded;
        }
        GestureOutput::None
    }

    /// Pointer left the view; treated like a cancel.
    pub fn pointer_leave(&mut self, id: u64) -> GestureOutput {
        self.pointer_cancel(id)
    }

    /// Drops all tracked pointers, e.g. when the view loses focus.
    pub fn reset(&mut self) {
        self.active.clear();
        self.candidate = None;
        self.pinch_initial_distance = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(id: u64, kind: PointerKind, x: f32, y: f32, ms: u64) -> PointerEvent {
        PointerEvent {
            id,
            kind,
            x,
            y,
            time: Duration::from_millis(ms),
        }
    }

    fn touch(id: u64, x: f32, y: f32, ms: u64) -> PointerEvent {
        ev(id, PointerKind::Touch, x, y, ms)
    }

    fn classifier() -> GestureClassifier {
        GestureClassifier::new(TapThresholds::default())
    }

    #[test]
    fn test_short_still_press_is_tap() {
        let mut g = classifier();
        g.pointer_down(touch(1, 100.0, 100.0, 0));
        let out = g.pointer_up(touch(1, 104.0, 100.0, 100));
        assert_eq!(out, GestureOutput::Tap { x: 104.0, y: 100.0 });
    }

    #[test]
    fn test_drag_is_never_tap() {
        let mut g = classifier();
        g.pointer_down(touch(1, 100.0, 100.0, 0));
        g.pointer_move(touch(1, 150.0, 100.0, 20));
        assert_eq!(g.pointer_up(touch(1, 150.0, 100.0, 40)), GestureOutput::None);
    }

    #[test]
    fn test_long_press_is_not_tap() {
        let mut g = classifier();
        g.pointer_down(touch(1, 10.0, 10.0, 0));
        assert_eq!(g.pointer_up(touch(1, 10.0, 10.0, 600)), GestureOutput::None);
    }

    #[test]
    fn test_boundary_is_deterministic() {
        for _ in 0..3 {
            let mut g = classifier();
            g.pointer_down(touch(1, 0.0, 0.0, 0));
            assert_eq!(g.pointer_up(touch(1, 5.0, 0.0, 100)), GestureOutput::None);

            let mut g = classifier();
            g.pointer_down(touch(1, 0.0, 0.0, 0));
            assert_eq!(g.pointer_up(touch(1, 0.0, 0.0, 250)), GestureOutput::None);
        }
    }

    #[test]
    fn test_diagonal_displacement_uses_distance() {
        let mut g = classifier();
        g.pointer_down(touch(1, 0.0, 0.0, 0));
        // 4px on each axis is ~5.66px in total.
        assert_eq!(g.pointer_up(touch(1, 4.0, 4.0, 50)), GestureOutput::None);
    }

    #[test]
    fn test_pinch_suppresses_tap() {
        let mut g = classifier();
        g.pointer_down(touch(1, 100.0, 100.0, 0));
        assert_eq!(g.pointer_down(touch(2, 200.0, 100.0, 10)), GestureOutput::PinchStarted);

        assert_eq!(
            g.pointer_move(touch(2, 300.0, 100.0, 30)),
            GestureOutput::PinchChanged { ratio: 2.0 }
        );

        // Neither finger moved much relative to its own origin at release.
        assert_eq!(g.pointer_up(touch(1, 100.0, 100.0, 60)), GestureOutput::PinchEnded);
        assert_eq!(g.pointer_up(touch(2, 300.0, 100.0, 80)), GestureOutput::None);
        assert!(!g.is_pinching());
    }

    #[test]
    fn test_still_second_finger_does_not_tap() {
        let mut g = classifier();
        g.pointer_down(touch(1, 100.0, 100.0, 0));
        g.pointer_down(touch(2, 120.0, 100.0, 5));
        g.pointer_up(touch(2, 120.0, 100.0, 30));
        assert_eq!(g.pointer_up(touch(1, 100.0, 100.0, 40)), GestureOutput::None);

        // A fresh single touch afterwards taps normally.
        g.pointer_down(touch(3, 50.0, 50.0, 500));
        assert_eq!(
            g.pointer_up(touch(3, 50.0, 50.0, 520)),
            GestureOutput::Tap { x: 50.0, y: 50.0 }
        );
    }

    #[test]
    fn test_mouse_never_pinches() {
        let mut g = classifier();
        g.pointer_down(ev(1, PointerKind::Mouse, 10.0, 10.0, 0));
        assert_eq!(
            g.pointer_down(ev(2, PointerKind::Pen, 20.0, 20.0, 5)),
            GestureOutput::None
        );
        assert!(!g.is_pinching());
        assert_eq!(g.pointer_up(ev(1, PointerKind::Mouse, 10.0, 10.0, 20)), GestureOutput::None);
    }

    #[test]
    fn test_mouse_obeys_tap_thresholds() {
        let mut g = classifier();
        g.pointer_down(ev(1, PointerKind::Mouse, 10.0, 10.0, 0));
        assert!(matches!(
            g.pointer_up(ev(1, PointerKind::Mouse, 11.0, 12.0, 80)),
            GestureOutput::Tap { .. }
        ));

        g.pointer_down(ev(1, PointerKind::Mouse, 10.0, 10.0, 1000));
        assert_eq!(
            g.pointer_up(ev(1, PointerKind::Mouse, 10.0, 40.0, 1080)),
            GestureOutput::None
        );
    }

    #[test]
    fn test_exclusion_region_is_ignored() {
        let mut g = classifier();
        g.set_exclusion(Some(ExclusionRect {
            left: 0.0,
            top: 0.0,
            right: 40.0,
            bottom: 40.0,
        }));

        assert_eq!(g.pointer_down(touch(1, 40.0, 40.0, 0)), GestureOutput::None);
        assert_eq!(g.active_pointers(), 0);
        assert_eq!(g.pointer_up(touch(1, 40.0, 40.0, 10)), GestureOutput::None);
        assert!(!g.wheel_allowed(20.0, 20.0));
        assert!(g.wheel_allowed(41.0, 20.0));
    }

    #[test]
    fn test_cancel_drops_candidate() {
        let mut g = classifier();
        g.pointer_down(touch(1, 10.0, 10.0, 0));
        g.pointer_cancel(1);
        assert_eq!(g.pointer_up(touch(1, 10.0, 10.0, 20)), GestureOutput::None);

        g.pointer_down(touch(2, 10.0, 10.0, 100));
        g.pointer_leave(2);
        assert_eq!(g.active_pointers(), 0);
    }

    #[test]
    fn test_cancel_ends_pinch() {
        let mut g = classifier();
        g.pointer_down(touch(1, 0.0, 0.0, 0));
        g.pointer_down(touch(2, 10.0, 0.0, 0));
        assert!(g.is_pinching());
        assert_eq!(g.pointer_cancel(2), GestureOutput::PinchEnded);
        assert!(!g.is_pinching());
    }
}
