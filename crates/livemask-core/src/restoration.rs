//! Face restoration filtering.
//!
//! Applies denoise → detail enhancement → sharpen to the face sub-region
//! only, pasting the result back at the same location. Mirrors the remote
//! service's traditional (non-model) restoration path: each sub-step is
//! skipped when its controlling parameter is zero, and the final region is
//! blended over the original by `strength`.

use crate::types::{DetectedFace, RestorationOptions};
use image::RgbImage;

/// Contrast gain per unit of strength in the detail-enhancement step.
const DETAIL_CONTRAST_GAIN: f32 = 0.3;
/// Brightness lift per unit of strength in the detail-enhancement step.
const DETAIL_BRIGHTNESS_LIFT: f32 = 10.0;

/// Restore the face region of `frame` in place. Disabled options or an
/// empty region leave the frame untouched.
pub fn restore(frame: &mut RgbImage, detection: &DetectedFace, options: &RestorationOptions) {
    if !options.enabled {
        return;
    }

    let strength = options.strength.clamp(0.0, 1.0);
    if strength <= 0.0 {
        return;
    }

    let (x0, y0, x1, y1) = detection.bbox.pixel_rect(frame.width(), frame.height());
    if x1 <= x0 || y1 <= y0 {
        return;
    }
    let (rw, rh) = (x1 - x0, y1 - y0);

    let original = crop_region(frame, x0, y0, rw, rh);
    let mut region = original.clone();

    let denoise_level = options.denoise_level.clamp(0.0, 1.0);
    if denoise_level > 0.0 {
        let blurred = box_blur(&region);
        blend_in_place(&mut region, &blurred, denoise_level);
    }

    if options.enhance_details {
        enhance_details(&mut region, strength);
    }

    let sharpen_amount = options.sharpen_amount.max(0.0);
    if sharpen_amount > 0.0 {
        sharpen(&mut region, sharpen_amount);
    }

    // Overall strength blend over the untouched region.
    blend_in_place(&mut region, &original, 1.0 - strength);

    paste_region(frame, &region, x0, y0);
}

fn crop_region(frame: &RgbImage, x0: u32, y0: u32, w: u32, h: u32) -> RgbImage {
    let mut out = RgbImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            out.put_pixel(x, y, *frame.get_pixel(x0 + x, y0 + y));
        }
    }
    out
}

fn paste_region(frame: &mut RgbImage, region: &RgbImage, x0: u32, y0: u32) {
    for y in 0..region.height() {
        for x in 0..region.width() {
            frame.put_pixel(x0 + x, y0 + y, *region.get_pixel(x, y));
        }
    }
}

/// 3×3 box blur with clamped edge sampling.
fn box_blur(region: &RgbImage) -> RgbImage {
    let (w, h) = region.dimensions();
    let mut out = RgbImage::new(w, h);

    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let mut sums = [0.0f32; 3];
            for dy in -1..=1i64 {
                for dx in -1..=1i64 {
                    let sx = (x + dx).clamp(0, w as i64 - 1) as u32;
                    let sy = (y + dy).clamp(0, h as i64 - 1) as u32;
                    let px = region.get_pixel(sx, sy).0;
                    for c in 0..3 {
                        sums[c] += px[c] as f32;
                    }
                }
            }
            let px = out.get_pixel_mut(x as u32, y as u32);
            for c in 0..3 {
                px.0[c] = (sums[c] / 9.0).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

/// `dst = dst * (1 - weight) + src * weight`, per channel.
fn blend_in_place(dst: &mut RgbImage, src: &RgbImage, weight: f32) {
    let weight = weight.clamp(0.0, 1.0);
    if weight <= 0.0 {
        return;
    }
    for (d, s) in dst.pixels_mut().zip(src.pixels()) {
        for c in 0..3 {
            let v = d.0[c] as f32 * (1.0 - weight) + s.0[c] as f32 * weight;
            d.0[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Contrast/brightness lift proportional to strength, stands in for the
/// service's local-contrast equalization.
fn enhance_details(region: &mut RgbImage, strength: f32) {
    let contrast = 1.0 + DETAIL_CONTRAST_GAIN * strength;
    let lift = DETAIL_BRIGHTNESS_LIFT * strength;
    for px in region.pixels_mut() {
        for c in 0..3 {
            let v = (px.0[c] as f32 - 128.0) * contrast + 128.0 + lift;
            px.0[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Unsharp mask: `region + amount * (region - blurred)`.
fn sharpen(region: &mut RgbImage, amount: f32) {
    let blurred = box_blur(region);
    for (d, b) in region.pixels_mut().zip(blurred.pixels()) {
        for c in 0..3 {
            let v = d.0[c] as f32 + amount * (d.0[c] as f32 - b.0[c] as f32);
            d.0[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use image::Rgb;

    fn face() -> DetectedFace {
        DetectedFace::new(BoundingBox::new(20.0, 20.0, 60.0, 60.0))
    }

    fn noisy_frame() -> RgbImage {
        let mut frame = RgbImage::from_pixel(100, 100, Rgb([100, 100, 100]));
        frame.put_pixel(50, 50, Rgb([250, 250, 250])); // a noise spike
        frame
    }

    #[test]
    fn test_disabled_is_noop() {
        let mut frame = noisy_frame();
        let before = frame.clone();
        let options = RestorationOptions { enabled: false, ..Default::default() };
        restore(&mut frame, &face(), &options);
        assert_eq!(frame.as_raw(), before.as_raw());
    }

    #[test]
    fn test_zero_strength_is_noop() {
        let mut frame = noisy_frame();
        let before = frame.clone();
        let options = RestorationOptions { strength: 0.0, ..Default::default() };
        restore(&mut frame, &face(), &options);
        assert_eq!(frame.as_raw(), before.as_raw());
    }

    #[test]
    fn test_all_substeps_off_is_noop() {
        let mut frame = noisy_frame();
        let before = frame.clone();
        let options = RestorationOptions {
            enabled: true,
            strength: 1.0,
            denoise_level: 0.0,
            sharpen_amount: 0.0,
            enhance_details: false,
        };
        restore(&mut frame, &face(), &options);
        assert_eq!(frame.as_raw(), before.as_raw());
    }

    #[test]
    fn test_denoise_flattens_spike() {
        let mut frame = noisy_frame();
        let options = RestorationOptions {
            enabled: true,
            strength: 1.0,
            denoise_level: 1.0,
            sharpen_amount: 0.0,
            enhance_details: false,
        };
        restore(&mut frame, &face(), &options);
        assert!(frame.get_pixel(50, 50).0[0] < 250);
    }

    #[test]
    fn test_sharpen_raises_edge_contrast() {
        let mut frame = RgbImage::from_pixel(100, 100, Rgb([100, 100, 100]));
        for y in 20..80 {
            for x in 50..80 {
                frame.put_pixel(x, y, Rgb([180, 180, 180]));
            }
        }
        let options = RestorationOptions {
            enabled: true,
            strength: 1.0,
            denoise_level: 0.0,
            sharpen_amount: 1.5,
            enhance_details: false,
        };
        restore(&mut frame, &face(), &options);
        // The bright side of the edge overshoots past its original value
        assert!(frame.get_pixel(50, 50).0[0] > 180);
    }

    #[test]
    fn test_outside_box_untouched() {
        let mut frame = noisy_frame();
        let options = RestorationOptions {
            enabled: true,
            strength: 1.0,
            denoise_level: 0.5,
            sharpen_amount: 0.5,
            enhance_details: true,
        };
        restore(&mut frame, &face(), &options);
        assert_eq!(frame.get_pixel(5, 5).0, [100, 100, 100]);
        assert_eq!(frame.get_pixel(95, 95).0, [100, 100, 100]);
    }

    #[test]
    fn test_offscreen_box_is_noop() {
        let mut frame = noisy_frame();
        let before = frame.clone();
        let far = DetectedFace::new(BoundingBox::new(500.0, 500.0, 50.0, 50.0));
        restore(&mut frame, &far, &RestorationOptions::default());
        assert_eq!(frame.as_raw(), before.as_raw());
    }
}
