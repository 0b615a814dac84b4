//! Source-to-canvas mapping.
//!
//! The camera frame is cropped to the container's aspect ratio ("cover" fit),
//! then optionally shrunk around its centre by the overscan factor. The crop
//! is expressed both in source pixels ([`CameraLayout`]) and in texture UV
//! space ([`UvRect`]) for the fragment shader.

/// Intrinsic stream dimensions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoMeta {
    pub vw: u32,
    pub vh: u32,
}

/// Crop rectangle in source pixels plus the container it was computed for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraLayout {
    /// Container width in logical pixels
    pub cw: f64,
    /// Container height in logical pixels
    pub ch: f64,
    pub dpr: f64,
    pub sx: f64,
    pub sy: f64,
    pub sw: f64,
    pub sh: f64,
}

/// Crop rectangle in texture coordinates. `v0` is the top edge of the crop
/// expressed in the sampler's bottom-up V axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UvRect {
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

impl UvRect {
    pub const FULL: UvRect = UvRect {
        u0: 0.0,
        v0: 1.0,
        u1: 1.0,
        v1: 0.0,
    };

    pub fn as_array(&self) -> [f32; 4] {
        [self.u0, self.v0, self.u1, self.v1]
    }
}

/// Computes the centred crop of a `vw×vh` frame that fills a `cw×ch` container.
///
/// Dimensions below 1 are treated as 1 and `overscan` below 1 is clamped to 1.
pub fn compute_layout(vw: f64, vh: f64, cw: f64, ch: f64, dpr: f64, overscan: f64) -> CameraLayout {
    let vw = vw.max(1.0);
    let vh = vh.max(1.0);
    let cw = cw.max(1.0);
    let ch = ch.max(1.0);
    let overscan = if overscan.is_finite() { overscan.max(1.0) } else { 1.0 };

    let container_ratio = cw / ch;
    let video_ratio = vw / vh;

    let (mut sx, mut sy, sw, sh);
    if video_ratio > container_ratio {
        // Source is wider: keep full height, trim the sides.
        sh = vh;
        sw = vh * container_ratio;
        sx = (vw - sw) / 2.0;
        sy = 0.0;
    } else {
        sw = vw;
        sh = vw / container_ratio;
        sx = 0.0;
        sy = (vh - sh) / 2.0;
    }

    let osw = sw / overscan;
    let osh = sh / overscan;
    sx += (sw - osw) / 2.0;
    sy += (sh - osh) / 2.0;

    CameraLayout {
        cw,
        ch,
        dpr,
        sx,
        sy,
        sw: osw,
        sh: osh,
    }
}

/// Maps the crop rectangle into UV space with the vertical flip applied.
pub fn compute_uv_rect(layout: &CameraLayout, vw: f64, vh: f64) -> UvRect {
    let vw = vw.max(1.0);
    let vh = vh.max(1.0);
    UvRect {
        u0: (layout.sx / vw) as f32,
        v0: (1.0 - layout.sy / vh) as f32,
        u1: ((layout.sx + layout.sw) / vw) as f32,
        v1: (1.0 - (layout.sy + layout.sh) / vh) as f32,
    }
}

/// Clamps the platform device pixel ratio to `max_dpr`.
pub fn effective_dpr(device_dpr: f32, max_dpr: f32) -> f64 {
    let dpr = if device_dpr.is_finite() && device_dpr > 0.0 {
        device_dpr
    } else {
        1.0
    };
    dpr.min(max_dpr.max(1.0)) as f64
}

/// Backing-store size in device pixels for a container of `cw×ch` logical pixels.
pub fn canvas_pixel_size(cw: f64, ch: f64, dpr: f64) -> (u32, u32) {
    let w = (cw.max(1.0) * dpr).round().max(1.0) as u32;
    let h = (ch.max(1.0) * dpr).round().max(1.0) as u32;
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SIZES: &[(f64, f64)] = &[
        (1920.0, 1080.0),
        (1080.0, 1920.0),
        (640.0, 480.0),
        (4032.0, 3024.0),
        (500.0, 500.0),
    ];
    const CONTAINERS: &[(f64, f64)] = &[
        (390.0, 844.0),
        (1280.0, 720.0),
        (300.0, 300.0),
        (1024.0, 600.0),
    ];

    #[test]
    fn test_crop_preserves_container_aspect_and_is_centered() {
        for &(vw, vh) in SIZES {
            for &(cw, ch) in CONTAINERS {
                let l = compute_layout(vw, vh, cw, ch, 1.0, 1.0);
                assert_relative_eq!(l.sw / l.sh, cw / ch, max_relative = 1e-9);
                assert_relative_eq!(l.sx, (vw - l.sw) / 2.0, epsilon = 1e-9);
                assert_relative_eq!(l.sy, (vh - l.sh) / 2.0, epsilon = 1e-9);
                // Cover fit: one axis spans the full source.
                assert!(
                    (l.sw - vw).abs() < 1e-9 || (l.sh - vh).abs() < 1e-9,
                    "crop {}x{} does not fill {}x{}",
                    l.sw,
                    l.sh,
                    vw,
                    vh
                );
            }
        }
    }

    #[test]
    fn test_matching_aspect_uses_full_frame() {
        let l = compute_layout(1280.0, 720.0, 640.0, 360.0, 2.0, 1.0);
        assert_relative_eq!(l.sx, 0.0);
        assert_relative_eq!(l.sy, 0.0);
        assert_relative_eq!(l.sw, 1280.0);
        assert_relative_eq!(l.sh, 720.0);
    }

    #[test]
    fn test_crop_stays_inside_source() {
        for &(vw, vh) in SIZES {
            for &(cw, ch) in CONTAINERS {
                for overscan in [1.0, 1.2, 2.0, 3.5] {
                    let l = compute_layout(vw, vh, cw, ch, 1.0, overscan);
                    assert!(l.sx >= -1e-9 && l.sy >= -1e-9);
                    assert!(l.sx + l.sw <= vw + 1e-9);
                    assert!(l.sy + l.sh <= vh + 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_overscan_shrinks_and_stays_centered() {
        let (vw, vh, cw, ch) = (1920.0, 1080.0, 390.0, 844.0);
        let mut prev = compute_layout(vw, vh, cw, ch, 1.0, 1.0);
        for overscan in [1.1, 1.5, 2.0, 4.0] {
            let next = compute_layout(vw, vh, cw, ch, 1.0, overscan);
            assert!(next.sw < prev.sw);
            assert!(next.sh < prev.sh);
            // Same centre as the previous crop.
            assert_relative_eq!(next.sx + next.sw / 2.0, prev.sx + prev.sw / 2.0, epsilon = 1e-9);
            assert_relative_eq!(next.sy + next.sh / 2.0, prev.sy + prev.sh / 2.0, epsilon = 1e-9);
            // Contained in the previous crop.
            assert!(next.sx >= prev.sx && next.sx + next.sw <= prev.sx + prev.sw + 1e-9);
            assert!(next.sy >= prev.sy && next.sy + next.sh <= prev.sy + prev.sh + 1e-9);
            prev = next;
        }
    }

    #[test]
    fn test_overscan_below_one_is_clamped() {
        let a = compute_layout(1920.0, 1080.0, 800.0, 600.0, 1.0, 0.5);
        let b = compute_layout(1920.0, 1080.0, 800.0, 600.0, 1.0, 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_degenerate_sizes_do_not_divide_by_zero() {
        let l = compute_layout(0.0, 0.0, 0.0, 0.0, 1.0, 1.0);
        assert!(l.sw.is_finite() && l.sh.is_finite());
        assert_eq!(l.cw, 1.0);
        assert_eq!(l.ch, 1.0);
    }

    #[test]
    fn test_uv_full_frame() {
        let l = CameraLayout {
            cw: 100.0,
            ch: 100.0,
            dpr: 1.0,
            sx: 0.0,
            sy: 0.0,
            sw: 640.0,
            sh: 480.0,
        };
        assert_eq!(compute_uv_rect(&l, 640.0, 480.0), UvRect::FULL);
    }

    #[test]
    fn test_uv_center_crop_is_flipped() {
        // Portrait container over a landscape frame: trims the sides.
        let l = compute_layout(1000.0, 500.0, 250.0, 500.0, 1.0, 1.0);
        let uv = compute_uv_rect(&l, 1000.0, 500.0);
        assert_relative_eq!(uv.u0, 0.375);
        assert_relative_eq!(uv.u1, 0.625);
        assert_relative_eq!(uv.v0, 1.0);
        assert_relative_eq!(uv.v1, 0.0);
    }

    #[test]
    fn test_effective_dpr_is_capped() {
        assert_eq!(effective_dpr(3.0, 2.0), 2.0);
        assert_eq!(effective_dpr(1.5, 2.0), 1.5);
        assert_eq!(effective_dpr(f32::NAN, 2.0), 1.0);
    }

    #[test]
    fn test_canvas_pixel_size_rounds() {
        assert_eq!(canvas_pixel_size(390.0, 844.0, 2.0), (780, 1688));
        assert_eq!(canvas_pixel_size(100.3, 50.6, 1.0), (100, 51));
        assert_eq!(canvas_pixel_size(0.0, 0.0, 1.0), (1, 1));
    }
}
