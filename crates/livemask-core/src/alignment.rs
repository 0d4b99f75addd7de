//! Face alignment from eye geometry.
//!
//! Derives the similarity transform (rotate, scale, translate) that would
//! normalize a detected face to the canonical frontal pose: eyes level, eye
//! distance at a fixed fraction of the box width, eye midpoint at the
//! horizontal box center and 40% down the box.

use crate::types::{centroid, BoundingBox, FaceAlignment, FaceLandmarks, Point, Translation};

/// Canonical eye distance as a fraction of the box width.
const DESIRED_EYE_RATIO: f32 = 0.35;
/// Canonical eye height as a fraction of the box height, from the top.
const TARGET_EYE_HEIGHT: f32 = 0.40;
/// Below this eye distance (pixels) the geometry is treated as degenerate.
const MIN_EYE_DISTANCE: f32 = 1e-3;

/// Compute the alignment for one face. Pure function of the landmarks and
/// box; degenerate eye geometry yields the identity alignment rather than
/// an error.
pub fn compute_alignment(landmarks: &FaceLandmarks, bbox: &BoundingBox) -> FaceAlignment {
    let (left, right) = match (centroid(&landmarks.left_eye), centroid(&landmarks.right_eye)) {
        (Some(l), Some(r)) => (l, r),
        _ => return identity_alignment(bbox),
    };

    let dx = right.x - left.x;
    let dy = right.y - left.y;
    let eye_distance = (dx * dx + dy * dy).sqrt();
    if eye_distance < MIN_EYE_DISTANCE {
        return identity_alignment(bbox);
    }

    let angle = dy.atan2(dx).to_degrees();
    let scale = DESIRED_EYE_RATIO * bbox.width / eye_distance;

    let midpoint = Point::new((left.x + right.x) / 2.0, (left.y + right.y) / 2.0);
    let target = Point::new(
        bbox.x + bbox.width / 2.0,
        bbox.y + bbox.height * TARGET_EYE_HEIGHT,
    );
    let translation = Translation {
        dx: target.x - midpoint.x,
        dy: target.y - midpoint.y,
    };

    let aligned_box = transform_box(bbox, &midpoint, angle, scale, &translation);

    FaceAlignment { angle, scale, translation, aligned_box }
}

/// Identity alignment for degenerate input: no rotation, unit scale, zero
/// translation, aligned box equal to the detection box.
fn identity_alignment(bbox: &BoundingBox) -> FaceAlignment {
    FaceAlignment {
        angle: 0.0,
        scale: 1.0,
        translation: Translation::default(),
        aligned_box: bbox.clone(),
    }
}

/// Apply the alignment transform to the four box corners and take the
/// axis-aligned extent of the result.
///
/// The transform rotates by `-angle` about the eye midpoint (leveling the
/// eyes), scales about the same pivot, then translates.
fn transform_box(
    bbox: &BoundingBox,
    pivot: &Point,
    angle: f32,
    scale: f32,
    translation: &Translation,
) -> BoundingBox {
    let rad = (-angle).to_radians();
    let (sin, cos) = rad.sin_cos();

    let corners = [
        (bbox.x, bbox.y),
        (bbox.right(), bbox.y),
        (bbox.right(), bbox.bottom()),
        (bbox.x, bbox.bottom()),
    ];

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;

    for (cx, cy) in corners {
        let rx = cx - pivot.x;
        let ry = cy - pivot.y;
        let tx = scale * (rx * cos - ry * sin) + pivot.x + translation.dx;
        let ty = scale * (rx * sin + ry * cos) + pivot.y + translation.dy;
        min_x = min_x.min(tx);
        min_y = min_y.min(ty);
        max_x = max_x.max(tx);
        max_y = max_y.max(ty);
    }

    BoundingBox::new(min_x, min_y, max_x - min_x, max_y - min_y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eye_ring(cx: f32, cy: f32) -> Vec<Point> {
        // Six points around the center; centroid lands back on (cx, cy).
        (0..6)
            .map(|i| {
                let a = i as f32 * std::f32::consts::FRAC_PI_3;
                Point::new(cx + 4.0 * a.cos(), cy + 2.0 * a.sin())
            })
            .collect()
    }

    fn landmarks_with_eyes(left: (f32, f32), right: (f32, f32)) -> FaceLandmarks {
        FaceLandmarks {
            left_eye: eye_ring(left.0, left.1),
            right_eye: eye_ring(right.0, right.1),
            ..Default::default()
        }
    }

    #[test]
    fn test_level_eyes_give_zero_angle() {
        let bbox = BoundingBox::new(100.0, 100.0, 200.0, 200.0);
        let lm = landmarks_with_eyes((150.0, 180.0), (210.0, 180.0));
        let a = compute_alignment(&lm, &bbox);
        assert!(a.angle.abs() < 1e-3, "angle = {}", a.angle);
    }

    #[test]
    fn test_angle_matches_analytic_value() {
        let bbox = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        // dy = 10, dx = 40 → atan2(10, 40)
        let lm = landmarks_with_eyes((30.0, 40.0), (70.0, 50.0));
        let a = compute_alignment(&lm, &bbox);
        let expected = (10.0f32).atan2(40.0).to_degrees();
        assert!((a.angle - expected).abs() < 1e-3, "angle = {}", a.angle);
    }

    #[test]
    fn test_scale_restores_canonical_eye_distance() {
        let bbox = BoundingBox::new(100.0, 100.0, 200.0, 200.0);
        let lm = landmarks_with_eyes((150.0, 180.0), (210.0, 180.0));
        let a = compute_alignment(&lm, &bbox);
        let eye_distance = 60.0;
        assert!(
            (a.scale * eye_distance - DESIRED_EYE_RATIO * bbox.width).abs() < 1e-3,
            "scale = {}",
            a.scale
        );
    }

    #[test]
    fn test_translation_targets_canonical_point() {
        let bbox = BoundingBox::new(100.0, 100.0, 200.0, 200.0);
        let lm = landmarks_with_eyes((150.0, 180.0), (210.0, 180.0));
        let a = compute_alignment(&lm, &bbox);
        // Midpoint (180, 180) → target (200, 180)
        assert!((a.translation.dx - 20.0).abs() < 1e-3);
        assert!(a.translation.dy.abs() < 1e-3);
    }

    #[test]
    fn test_degenerate_eyes_yield_identity() {
        let bbox = BoundingBox::new(10.0, 20.0, 50.0, 60.0);
        let a = compute_alignment(&FaceLandmarks::default(), &bbox);
        assert_eq!(a.angle, 0.0);
        assert_eq!(a.scale, 1.0);
        assert_eq!(a.translation, Translation::default());
        assert_eq!(a.aligned_box, bbox);

        // Coincident eyes are degenerate too
        let lm = landmarks_with_eyes((30.0, 40.0), (30.0, 40.0));
        let a = compute_alignment(&lm, &bbox);
        assert_eq!(a.scale, 1.0);
    }

    #[test]
    fn test_alignment_is_idempotent() {
        let bbox = BoundingBox::new(100.0, 100.0, 200.0, 200.0);
        let lm = landmarks_with_eyes((140.0, 170.0), (220.0, 190.0));
        let a = compute_alignment(&lm, &bbox);
        let b = compute_alignment(&lm, &bbox);
        assert_eq!(a, b);
    }

    #[test]
    fn test_aligned_box_scales_with_transform() {
        let bbox = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        // Level eyes 70 apart → scale = 35/70 = 0.5, no rotation
        let lm = landmarks_with_eyes((15.0, 40.0), (85.0, 40.0));
        let a = compute_alignment(&lm, &bbox);
        assert!((a.aligned_box.width - 50.0).abs() < 1e-3);
        assert!((a.aligned_box.height - 50.0).abs() < 1e-3);
    }
}
