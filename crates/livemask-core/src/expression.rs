//! Expression scoring from landmark geometry.
//!
//! Four scalar cues are measured from inter-landmark distances, normalized
//! against the face box dimensions with empirically chosen multipliers, and
//! combined by fixed formulas into the seven categorical scores. No temporal
//! smoothing: each frame scores independently.

use crate::types::{centroid, BoundingBox, FaceExpression, FaceLandmarks, Point};

const MOUTH_OPEN_GAIN: f32 = 8.0;
const BROW_RAISE_GAIN: f32 = 6.0;
const BROW_RAISE_BASELINE: f32 = 0.5;
const SMILE_GAIN: f32 = 10.0;
const EYE_OPEN_GAIN: f32 = 15.0;

fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

/// Vertical extent of a contour, 0 when fewer than two points.
fn vertical_extent(points: &[Point]) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    let min = points.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
    let max = points.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);
    max - min
}

/// Mouth openness: vertical gap of the inner lip contour (outer as a
/// fallback), relative to the box height.
pub(crate) fn mouth_openness(landmarks: &FaceLandmarks, bbox: &BoundingBox) -> f32 {
    let contour = if landmarks.inner_lips.len() >= 2 {
        &landmarks.inner_lips
    } else {
        &landmarks.outer_lips
    };
    clamp01(vertical_extent(contour) / bbox.height * MOUTH_OPEN_GAIN)
}

/// Eyebrow raise: eyebrow-to-eye vertical gap relative to the box height,
/// averaged over the sides that have both contours. The baseline offset
/// keeps a relaxed face near zero.
pub(crate) fn eyebrow_raise(landmarks: &FaceLandmarks, bbox: &BoundingBox) -> f32 {
    let sides = [
        (&landmarks.left_eyebrow, &landmarks.left_eye),
        (&landmarks.right_eyebrow, &landmarks.right_eye),
    ];

    let mut total = 0.0f32;
    let mut count = 0u32;
    for (brow, eye) in sides {
        if let (Some(b), Some(e)) = (centroid(brow), centroid(eye)) {
            let gap = e.y - b.y; // positive when the brow sits above the eye
            total += clamp01(gap / bbox.height * BROW_RAISE_GAIN - BROW_RAISE_BASELINE);
            count += 1;
        }
    }

    if count > 0 {
        total / count as f32
    } else {
        0.0
    }
}

/// Signed smile cue: mouth-corner elevation above the mouth center,
/// relative to the box width. Positive = corners above center (smile),
/// negative = corners below (droop). Unclamped.
pub(crate) fn smile_raw(landmarks: &FaceLandmarks, bbox: &BoundingBox) -> f32 {
    let lips = &landmarks.outer_lips;
    if lips.len() < 3 {
        return 0.0;
    }
    let left = lips
        .iter()
        .min_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
    let right = lips
        .iter()
        .max_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
    let center = centroid(lips);

    match (left, right, center) {
        (Some(l), Some(r), Some(c)) => {
            let corner_y = (l.y + r.y) / 2.0;
            (c.y - corner_y) / bbox.width * SMILE_GAIN
        }
        _ => 0.0,
    }
}

/// Eye openness: vertical eye-contour extent relative to the box height,
/// averaged over the available eyes.
pub(crate) fn eye_openness(landmarks: &FaceLandmarks, bbox: &BoundingBox) -> f32 {
    let eyes = [&landmarks.left_eye, &landmarks.right_eye];
    let mut total = 0.0f32;
    let mut count = 0u32;
    for eye in eyes {
        if eye.len() >= 2 {
            total += clamp01(vertical_extent(eye) / bbox.height * EYE_OPEN_GAIN);
            count += 1;
        }
    }
    if count > 0 {
        total / count as f32
    } else {
        0.0
    }
}

/// Score the seven expressions for one face. Pure function; identical input
/// always yields identical output.
pub fn compute_expression(landmarks: &FaceLandmarks, bbox: &BoundingBox) -> FaceExpression {
    if bbox.width <= 0.0 || bbox.height <= 0.0 {
        return FaceExpression::all_neutral();
    }

    let mouth_open = mouth_openness(landmarks, bbox);
    let brow_raise = eyebrow_raise(landmarks, bbox);
    let raw_smile = smile_raw(landmarks, bbox);
    let smile = clamp01(raw_smile);
    let droop = clamp01(-raw_smile);
    let eye_open = eye_openness(landmarks, bbox);

    let happy = smile;
    let surprised = clamp01(0.7 * mouth_open + 0.3 * brow_raise);
    let sad = clamp01(droop * (1.0 - mouth_open));
    let angry = clamp01((BROW_RAISE_BASELINE - brow_raise) * 2.0)
        * clamp01(1.0 - mouth_open)
        * clamp01(1.0 - smile)
        * clamp01(droop + mouth_open); // some active cue, else a blank face reads angry
    let fearful = clamp01(brow_raise.min(eye_open) * 0.8);
    let disgusted = clamp01(mouth_open * (1.0 - brow_raise) * 0.8);

    let activity = mouth_open.max(brow_raise).max(smile).max(droop);
    let neutral = clamp01(1.0 - activity);

    FaceExpression { neutral, happy, sad, angry, fearful, disgusted, surprised }
}
