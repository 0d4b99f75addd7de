//! Cosmetic and diagnostic face-region effects.
//!
//! Exactly one configured effect is applied to each detected face region in
//! place. All effects are stateless across frames; the distort wobble takes
//! its phase from wall-clock time so frame-rate variance does not change
//! its speed.

use crate::types::{centroid, DetectedFace, FaceEffect, FaceEffectSettings};
use image::RgbImage;

/// Wobble period of the distort effect, milliseconds of wall-clock time.
const DISTORT_PERIOD_MS: i64 = 2000;
/// Maximum horizontal wobble amplitude at full intensity, pixels.
const DISTORT_AMPLITUDE: f32 = 8.0;
/// Maximum pixelation block size at full intensity.
const PIXELATE_MAX_BLOCK: u32 = 20;
/// Eye magnification radius as a multiple of the eye contour radius.
const BIG_EYES_REACH: f32 = 2.5;

/// Apply the configured effect to every face region.
pub fn apply_effect(frame: &mut RgbImage, faces: &[DetectedFace], settings: &FaceEffectSettings) {
    if settings.effect == FaceEffect::None {
        return;
    }
    let intensity = settings.intensity.clamp(0.0, 1.0);
    if intensity <= 0.0 {
        return;
    }

    for face in faces {
        let (x0, y0, x1, y1) = face.bbox.pixel_rect(frame.width(), frame.height());
        if x1 <= x0 || y1 <= y0 {
            continue;
        }
        let rect = (x0, y0, x1, y1);

        match settings.effect {
            FaceEffect::None => {}
            FaceEffect::FaceBlur => face_blur(frame, rect, intensity),
            FaceEffect::FacePixelate => face_pixelate(frame, rect, intensity),
            FaceEffect::FaceGlow => face_glow(frame, rect, intensity),
            FaceEffect::FaceDistort => face_distort(frame, rect, intensity),
            FaceEffect::BigEyes => big_eyes(frame, face, intensity),
            FaceEffect::SlimFace => slim_face(frame, rect, intensity),
            FaceEffect::Beautify => beautify(frame, rect, intensity),
        }
    }
}

fn copy_rect(frame: &RgbImage, rect: (u32, u32, u32, u32)) -> RgbImage {
    let (x0, y0, x1, y1) = rect;
    let mut out = RgbImage::new(x1 - x0, y1 - y0);
    for y in y0..y1 {
        for x in x0..x1 {
            out.put_pixel(x - x0, y - y0, *frame.get_pixel(x, y));
        }
    }
    out
}

/// Box blur of the region with radius proportional to intensity.
fn face_blur(frame: &mut RgbImage, rect: (u32, u32, u32, u32), intensity: f32) {
    let (x0, y0, x1, y1) = rect;
    let radius = (1.0 + intensity * 5.0) as i64;
    let src = copy_rect(frame, rect);
    let (w, h) = src.dimensions();

    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let mut sums = [0.0f32; 3];
            let mut count = 0.0f32;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let sx = (x + dx).clamp(0, w as i64 - 1) as u32;
                    let sy = (y + dy).clamp(0, h as i64 - 1) as u32;
                    let px = src.get_pixel(sx, sy).0;
                    for c in 0..3 {
                        sums[c] += px[c] as f32;
                    }
                    count += 1.0;
                }
            }
            let px = frame.get_pixel_mut(x0 + x as u32, y0 + y as u32);
            for c in 0..3 {
                px.0[c] = (sums[c] / count).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Replace the region with constant-color blocks sized by intensity.
fn face_pixelate(frame: &mut RgbImage, rect: (u32, u32, u32, u32), intensity: f32) {
    let (x0, y0, x1, y1) = rect;
    let block = 2 + (intensity * (PIXELATE_MAX_BLOCK - 2) as f32) as u32;

    let mut by = y0;
    while by < y1 {
        let mut bx = x0;
        let bh = block.min(y1 - by);
        while bx < x1 {
            let bw = block.min(x1 - bx);
            let mut sums = [0.0f32; 3];
            for y in by..by + bh {
                for x in bx..bx + bw {
                    let px = frame.get_pixel(x, y).0;
                    for c in 0..3 {
                        sums[c] += px[c] as f32;
                    }
                }
            }
            let n = (bw * bh) as f32;
            let mean = [
                (sums[0] / n).round() as u8,
                (sums[1] / n).round() as u8,
                (sums[2] / n).round() as u8,
            ];
            for y in by..by + bh {
                for x in bx..bx + bw {
                    frame.get_pixel_mut(x, y).0 = mean;
                }
            }
            bx += bw;
        }
        by += bh;
    }
}

/// Additive soft glow: a blurred copy is added back scaled by intensity.
fn face_glow(frame: &mut RgbImage, rect: (u32, u32, u32, u32), intensity: f32) {
    let (x0, y0, _, _) = rect;
    let mut blurred = copy_rect(frame, rect);
    let src = blurred.clone();
    blur_into(&src, &mut blurred, 2);

    for y in 0..blurred.height() {
        for x in 0..blurred.width() {
            let glow = blurred.get_pixel(x, y).0;
            let px = frame.get_pixel_mut(x0 + x, y0 + y);
            for c in 0..3 {
                let v = px.0[c] as f32 + glow[c] as f32 * intensity * 0.6;
                px.0[c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

fn blur_into(src: &RgbImage, dst: &mut RgbImage, radius: i64) {
    let (w, h) = src.dimensions();
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let mut sums = [0.0f32; 3];
            let mut count = 0.0f32;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let sx = (x + dx).clamp(0, w as i64 - 1) as u32;
                    let sy = (y + dy).clamp(0, h as i64 - 1) as u32;
                    let px = src.get_pixel(sx, sy).0;
                    for c in 0..3 {
                        sums[c] += px[c] as f32;
                    }
                    count += 1.0;
                }
            }
            let px = dst.get_pixel_mut(x as u32, y as u32);
            for c in 0..3 {
                px.0[c] = (sums[c] / count).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Horizontal sine wobble; phase comes from wall-clock milliseconds so the
/// motion speed is independent of frame rate.
fn face_distort(frame: &mut RgbImage, rect: (u32, u32, u32, u32), intensity: f32) {
    let (x0, y0, _, _) = rect;
    let now_ms = chrono::Utc::now().timestamp_millis();
    let phase = (now_ms % DISTORT_PERIOD_MS) as f32 / DISTORT_PERIOD_MS as f32
        * std::f32::consts::TAU;
    let amplitude = intensity * DISTORT_AMPLITUDE;

    let src = copy_rect(frame, rect);
    let (w, h) = src.dimensions();

    for y in 0..h {
        let offset = ((y as f32 / 12.0) + phase).sin() * amplitude;
        for x in 0..w {
            let sx = (x as f32 + offset).round().clamp(0.0, w as f32 - 1.0) as u32;
            frame.put_pixel(x0 + x, y0 + y, *src.get_pixel(sx, y));
        }
    }
}

/// Magnify each eye about its contour centroid. Faces without eye
/// landmarks are left unchanged.
fn big_eyes(frame: &mut RgbImage, face: &DetectedFace, intensity: f32) {
    let Some(landmarks) = &face.landmarks else {
        return;
    };

    for eye in [&landmarks.left_eye, &landmarks.right_eye] {
        let Some(center) = centroid(eye) else {
            continue;
        };
        // Contour radius: farthest landmark from the centroid.
        let radius = eye
            .iter()
            .map(|p| ((p.x - center.x).powi(2) + (p.y - center.y).powi(2)).sqrt())
            .fold(0.0f32, f32::max);
        if radius < 1.0 {
            continue;
        }
        let reach = radius * BIG_EYES_REACH;

        let rx0 = ((center.x - reach).floor().max(0.0)) as u32;
        let ry0 = ((center.y - reach).floor().max(0.0)) as u32;
        let rx1 = ((center.x + reach).ceil().min(frame.width() as f32)) as u32;
        let ry1 = ((center.y + reach).ceil().min(frame.height() as f32)) as u32;
        if rx1 <= rx0 || ry1 <= ry0 {
            continue;
        }

        let src = copy_rect(frame, (rx0, ry0, rx1, ry1));
        for y in ry0..ry1 {
            for x in rx0..rx1 {
                let dx = x as f32 + 0.5 - center.x;
                let dy = y as f32 + 0.5 - center.y;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist >= reach {
                    continue;
                }
                // Bulge: sample closer to the center than the output pixel.
                let k = 1.0 - intensity * 0.5 * (1.0 - dist / reach);
                let sx = (center.x + dx * k - rx0 as f32)
                    .clamp(0.0, (rx1 - rx0) as f32 - 1.0) as u32;
                let sy = (center.y + dy * k - ry0 as f32)
                    .clamp(0.0, (ry1 - ry0) as f32 - 1.0) as u32;
                frame.put_pixel(x, y, *src.get_pixel(sx, sy));
            }
        }
    }
}

/// Squeeze the region horizontally toward its center line; the squeeze
/// grows toward the left/right edges so the face narrows without a full
/// mesh warp.
fn slim_face(frame: &mut RgbImage, rect: (u32, u32, u32, u32), intensity: f32) {
    let (x0, y0, _, _) = rect;
    let src = copy_rect(frame, rect);
    let (w, h) = src.dimensions();
    let center = w as f32 / 2.0;

    for y in 0..h {
        for x in 0..w {
            let dx = x as f32 + 0.5 - center;
            let edge = (dx.abs() / center).min(1.0);
            let stretch = 1.0 + intensity * 0.3 * edge;
            let sx = (center + dx * stretch).clamp(0.0, w as f32 - 1.0) as u32;
            frame.put_pixel(x0 + x, y0 + y, *src.get_pixel(sx, y));
        }
    }
}

/// Skin smoothing plus a slight brightness lift.
fn beautify(frame: &mut RgbImage, rect: (u32, u32, u32, u32), intensity: f32) {
    let (x0, y0, _, _) = rect;
    let src = copy_rect(frame, rect);
    let mut smoothed = src.clone();
    blur_into(&src, &mut smoothed, 2);

    let weight = intensity * 0.6;
    let lift = intensity * 12.0;
    for y in 0..src.height() {
        for x in 0..src.width() {
            let orig = src.get_pixel(x, y).0;
            let soft = smoothed.get_pixel(x, y).0;
            let px = frame.get_pixel_mut(x0 + x, y0 + y);
            for c in 0..3 {
                let v = orig[c] as f32 * (1.0 - weight) + soft[c] as f32 * weight + lift;
                px.0[c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}
