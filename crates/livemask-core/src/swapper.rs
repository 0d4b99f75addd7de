//! Face swapping: composite a previously encoded source identity onto a
//! target detection.
//!
//! The canonical source snapshot is resized to the (scaled) target box,
//! optionally gain-matched to the target region's channel means, and
//! blended in with a soft radial mask so the boundary stays seamless.

use crate::types::{BoundingBox, DetectedFace, FaceEncoding, SwapOptions};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::sync::Arc;

/// Gain clamp for the color transfer, keeps extreme regions from blowing out.
const COLOR_GAIN_RANGE: (f32, f32) = (0.25, 4.0);

/// Stateful only in the single shared source encoding, which is replaced
/// wholesale (one `Arc` swap) and never mutated in place.
#[derive(Default)]
pub struct FaceSwapper {
    source: Option<Arc<FaceEncoding>>,
}

impl FaceSwapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or clear the source identity. Takes effect on the next swap.
    pub fn set_source(&mut self, encoding: Option<Arc<FaceEncoding>>) {
        self.source = encoding;
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Swap the source identity onto `target` in place.
    ///
    /// A defined no-op when no source encoding has been set. Out-of-range
    /// options are clamped, never rejected.
    pub fn swap(&self, frame: &mut RgbImage, target: &DetectedFace, options: &SwapOptions) {
        let Some(encoding) = &self.source else {
            return;
        };

        let blend = options.blend_strength.clamp(0.0, 1.0);
        if blend <= 0.0 {
            return;
        }
        let face_scale = options.face_scale.max(0.0);
        let erase = options.erasing_threshold.clamp(0.0, 1.0);

        let region = scaled_region(&target.bbox, face_scale);
        let sw = region.width.round() as u32;
        let sh = region.height.round() as u32;
        if sw == 0 || sh == 0 {
            return;
        }

        let source = imageops::resize(&encoding.aligned_face, sw, sh, FilterType::Triangle);

        let (x0, y0, x1, y1) = region.pixel_rect(frame.width(), frame.height());
        if x1 <= x0 || y1 <= y0 {
            return;
        }

        let gains = if options.color_correction {
            channel_gains(frame, &source, &region, (x0, y0, x1, y1))
        } else {
            [1.0; 3]
        };

        let cx = region.x + region.width / 2.0;
        let cy = region.y + region.height / 2.0;
        let half_w = region.width / 2.0;
        let half_h = region.height / 2.0;

        for y in y0..y1 {
            for x in x0..x1 {
                let sx = (x as f32 - region.x) as u32;
                let sy = (y as f32 - region.y) as u32;
                if sx >= sw || sy >= sh {
                    continue;
                }
                let src = source.get_pixel(sx, sy).0;

                if erase > 0.0 && luma(&src) < erase {
                    continue;
                }

                // Elliptical radial falloff: 1 at the region center, 0 at the edge.
                let nx = (x as f32 + 0.5 - cx) / half_w;
                let ny = (y as f32 + 0.5 - cy) / half_h;
                let radius = (nx * nx + ny * ny).sqrt();
                let alpha = (1.0 - radius).clamp(0.0, 1.0) * blend;
                if alpha <= 0.0 {
                    continue;
                }

                let dst = frame.get_pixel_mut(x, y);
                for c in 0..3 {
                    let corrected = (src[c] as f32 * gains[c]).clamp(0.0, 255.0);
                    let out = corrected * alpha + dst.0[c] as f32 * (1.0 - alpha);
                    dst.0[c] = out.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}

/// Target box scaled about its own center by `face_scale`.
fn scaled_region(bbox: &BoundingBox, face_scale: f32) -> BoundingBox {
    let w = bbox.width * face_scale;
    let h = bbox.height * face_scale;
    BoundingBox::new(
        bbox.x + (bbox.width - w) / 2.0,
        bbox.y + (bbox.height - h) / 2.0,
        w,
        h,
    )
}

/// Relative luma of an RGB pixel in [0, 1].
fn luma(px: &[u8; 3]) -> f32 {
    (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32) / 255.0
}

/// Gain-only color transfer: per-channel ratio of target-region means to
/// source means, clamped. Not a full histogram match.
fn channel_gains(
    frame: &RgbImage,
    source: &RgbImage,
    region: &BoundingBox,
    rect: (u32, u32, u32, u32),
) -> [f32; 3] {
    let (x0, y0, x1, y1) = rect;
    let mut target_sum = [0.0f64; 3];
    let mut source_sum = [0.0f64; 3];
    let mut count = 0u64;

    for y in y0..y1 {
        for x in x0..x1 {
            let sx = (x as f32 - region.x) as u32;
            let sy = (y as f32 - region.y) as u32;
            if sx >= source.width() || sy >= source.height() {
                continue;
            }
            let t = frame.get_pixel(x, y).0;
            let s = source.get_pixel(sx, sy).0;
            for c in 0..3 {
                target_sum[c] += t[c] as f64;
                source_sum[c] += s[c] as f64;
            }
            count += 1;
        }
    }

    if count == 0 {
        return [1.0; 3];
    }

    let mut gains = [1.0f32; 3];
    for c in 0..3 {
        let s_mean = source_sum[c] / count as f64;
        if s_mean > 1e-6 {
            let gain = (target_sum[c] / count as f64 / s_mean) as f32;
            gains[c] = gain.clamp(COLOR_GAIN_RANGE.0, COLOR_GAIN_RANGE.1);
        }
    }
    gains
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_face;
    use image::Rgb;

    fn frame_of(w: u32, h: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb(color))
    }

    fn encoding_of(color: [u8; 3]) -> Arc<FaceEncoding> {
        let source = frame_of(200, 200, color);
        let face = DetectedFace::new(BoundingBox::new(50.0, 50.0, 100.0, 100.0));
        Arc::new(encode_face(&source, &face).unwrap())
    }

    fn default_face() -> DetectedFace {
        DetectedFace::new(BoundingBox::new(100.0, 100.0, 200.0, 200.0))
    }

    #[test]
    fn test_swap_without_source_is_noop() {
        let swapper = FaceSwapper::new();
        let mut frame = frame_of(640, 480, [40, 80, 120]);
        let before = frame.clone();
        swapper.swap(&mut frame, &default_face(), &SwapOptions::default());
        assert_eq!(frame.as_raw(), before.as_raw());
    }

    #[test]
    fn test_zero_blend_is_noop() {
        let mut swapper = FaceSwapper::new();
        swapper.set_source(Some(encoding_of([230, 40, 40])));
        let mut frame = frame_of(640, 480, [40, 80, 120]);
        let before = frame.clone();
        let options = SwapOptions { blend_strength: 0.0, ..Default::default() };
        swapper.swap(&mut frame, &default_face(), &options);
        assert_eq!(frame.as_raw(), before.as_raw());

        // Negative values clamp to zero, same no-op
        let options = SwapOptions { blend_strength: -3.0, ..Default::default() };
        swapper.swap(&mut frame, &default_face(), &options);
        assert_eq!(frame.as_raw(), before.as_raw());
    }

    #[test]
    fn test_full_blend_replaces_center_and_preserves_outside() {
        let mut swapper = FaceSwapper::new();
        swapper.set_source(Some(encoding_of([230, 40, 40])));
        let mut frame = frame_of(640, 480, [40, 80, 120]);
        let options = SwapOptions {
            blend_strength: 1.0,
            color_correction: false,
            face_scale: 1.0,
            erasing_threshold: 0.0,
        };
        swapper.swap(&mut frame, &default_face(), &options);

        // Center of the box: pure source color
        let center = frame.get_pixel(200, 200).0;
        let d_src = color_distance(&center, &[230, 40, 40]);
        let d_orig = color_distance(&center, &[40, 80, 120]);
        assert!(d_src < d_orig, "center {center:?}");

        // Far outside the box: untouched
        assert_eq!(frame.get_pixel(10, 10).0, [40, 80, 120]);
        assert_eq!(frame.get_pixel(630, 470).0, [40, 80, 120]);
    }

    #[test]
    fn test_mask_fades_toward_edge() {
        let mut swapper = FaceSwapper::new();
        swapper.set_source(Some(encoding_of([255, 255, 255])));
        let mut frame = frame_of(640, 480, [0, 0, 0]);
        let options = SwapOptions {
            blend_strength: 1.0,
            color_correction: false,
            ..Default::default()
        };
        swapper.swap(&mut frame, &default_face(), &options);

        let center = frame.get_pixel(200, 200).0[0];
        let near_edge = frame.get_pixel(296, 200).0[0];
        assert!(center > near_edge, "center {center}, near edge {near_edge}");
        // Box edge itself stays effectively original
        assert!(frame.get_pixel(299, 200).0[0] < 16);
    }

    #[test]
    fn test_color_correction_pulls_toward_target_means() {
        let mut swapper = FaceSwapper::new();
        swapper.set_source(Some(encoding_of([240, 240, 240])));
        let mut frame = frame_of(640, 480, [60, 60, 60]);
        let options = SwapOptions {
            blend_strength: 1.0,
            color_correction: true,
            ..Default::default()
        };
        swapper.swap(&mut frame, &default_face(), &options);

        // Gain pulls the bright source down toward the dark target mean
        let center = frame.get_pixel(200, 200).0;
        assert!(center[0] < 120, "center {center:?}");
    }

    #[test]
    fn test_erasing_threshold_skips_dark_source_pixels() {
        let mut swapper = FaceSwapper::new();
        // Near-black source: luma ~0.04
        swapper.set_source(Some(encoding_of([10, 10, 10])));
        let mut frame = frame_of(640, 480, [200, 200, 200]);
        let before = frame.clone();
        let options = SwapOptions {
            blend_strength: 1.0,
            color_correction: false,
            face_scale: 1.0,
            erasing_threshold: 0.1,
        };
        swapper.swap(&mut frame, &default_face(), &options);
        assert_eq!(frame.as_raw(), before.as_raw());
    }

    #[test]
    fn test_face_scale_shrinks_composite() {
        let mut swapper = FaceSwapper::new();
        swapper.set_source(Some(encoding_of([255, 0, 0])));
        let mut frame = frame_of(640, 480, [0, 0, 0]);
        let options = SwapOptions {
            blend_strength: 1.0,
            color_correction: false,
            face_scale: 0.5,
            erasing_threshold: 0.0,
        };
        swapper.swap(&mut frame, &default_face(), &options);

        // Inside the half-size region
        assert!(frame.get_pixel(200, 200).0[0] > 128);
        // Inside the full box but outside the scaled region
        assert_eq!(frame.get_pixel(120, 120).0, [0, 0, 0]);
    }

    fn color_distance(a: &[u8; 3], b: &[u8; 3]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(&x, &y)| (x as f32 - y as f32).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}
