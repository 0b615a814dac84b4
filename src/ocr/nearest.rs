//! Resolves which recognized line the user tapped.

use super::{OcrBox, OcrResult, Point};

/// The chosen result and its signed distance to the tap.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestBox {
    pub index: usize,
    pub bbox: OcrBox,
    pub text: String,
    pub confidence: f32,
    pub distance: f64,
}

impl NearestBox {
    fn from_result(index: usize, result: &OcrResult, distance: f64) -> Self {
        Self {
            index,
            bbox: result.bbox,
            text: result.text.clone(),
            confidence: result.confidence,
            distance,
        }
    }
}

fn point_to_segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let [px, py] = p;
    let [x1, y1] = a;
    let [x2, y2] = b;
    let dx = x2 - x1;
    let dy = y2 - y1;

    if dx == 0.0 && dy == 0.0 {
        return (px - x1).hypot(py - y1);
    }

    let t = ((px - x1) * dx + (py - y1) * dy) / (dx * dx + dy * dy);
    if t <= 0.0 {
        return (px - x1).hypot(py - y1);
    }
    if t >= 1.0 {
        return (px - x2).hypot(py - y2);
    }
    (px - (x1 + t * dx)).hypot(py - (y1 + t * dy))
}

/// Signed distance from `point` to the quadrilateral: negative inside,
/// zero on an edge (within 1e-6), positive outside.
pub fn box_distance(point: Point, bbox: &OcrBox) -> f64 {
    let [px, py] = point;
    let n = bbox.len();

    // even-odd ray cast
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let [xi, yi] = bbox[i];
        let [xj, yj] = bbox[j];
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi + 1e-12) + xi {
            inside = !inside;
        }
        j = i;
    }

    let min_dist = (0..n)
        .map(|i| point_to_segment_distance(point, bbox[i], bbox[(i + 1) % n]))
        .fold(f64::INFINITY, f64::min);

    if min_dist < 1e-6 {
        0.0
    } else if inside {
        -min_dist
    } else {
        min_dist
    }
}

/// First box containing (or touching) the tap wins; otherwise the closest.
pub fn find_nearest_ocr_box(tap: Point, results: &[OcrResult]) -> Option<NearestBox> {
    let mut nearest: Option<NearestBox> = None;

    for (index, result) in results.iter().enumerate() {
        let dist = box_distance(tap, &result.bbox);
        if dist <= 0.0 {
            return Some(NearestBox::from_result(index, result, dist));
        }
        if nearest.as_ref().is_none_or(|n| dist < n.distance) {
            nearest = Some(NearestBox::from_result(index, result, dist));
        }
    }
    nearest
}

struct Bounds {
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

impl Bounds {
    fn of(bbox: &OcrBox) -> Self {
        let mut b = Bounds {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_y: f64::INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for [x, y] in bbox {
            b.min_x = b.min_x.min(*x);
            b.max_x = b.max_x.max(*x);
            b.min_y = b.min_y.min(*y);
            b.max_y = b.max_y.max(*y);
        }
        b
    }

    /// Lower bound of the distance from `p` to anything inside the bounds.
    fn approx_distance(&self, [px, py]: Point) -> f64 {
        let dx = (self.min_x - px).max(0.0).max(px - self.max_x);
        let dy = (self.min_y - py).max(0.0).max(py - self.max_y);
        dx.hypot(dy)
    }
}

/// Variant that skips boxes whose axis-aligned bounds are already farther
/// than the best candidate. Among boxes containing the tap, the one the tap is
/// deepest inside wins.
pub fn find_nearest_ocr_box_indexed(tap: Point, results: &[OcrResult]) -> Option<NearestBox> {
    let mut nearest_index: Option<usize> = None;
    let mut nearest_dist = f64::INFINITY;

    for (index, result) in results.iter().enumerate() {
        // Only boxes whose bounds hold the tap can beat an inside or edge hit.
        let approx = Bounds::of(&result.bbox).approx_distance(tap);
        if approx > 0.0 && approx >= nearest_dist.max(0.0) {
            continue;
        }
        let dist = box_distance(tap, &result.bbox);
        let better = if dist < 0.0 {
            nearest_dist >= 0.0 || dist < nearest_dist
        } else {
            nearest_dist >= 0.0 && dist < nearest_dist
        };
        if better {
            nearest_dist = dist;
            nearest_index = Some(index);
        }
    }

    nearest_index.map(|i| NearestBox::from_result(i, &results[i], nearest_dist))
}
