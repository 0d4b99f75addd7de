//! Detector abstraction and provider selection.
//!
//! Two interchangeable providers sit behind [`FaceDetector`]: the primary
//! ONNX detector (dense landmarks, multiple faces) and the fallback region
//! detector (pure-pixel heuristic, sparse landmarks). Selection tries the
//! primary first and falls back once; the chosen provider is fixed for the
//! session. Output ordering is provider-defined.

use crate::types::{BoundingBox, DetectedFace, FaceLandmarks, Point, ProcessingPipeline};
use image::RgbImage;
use thiserror::Error;

pub mod onnx;
pub mod region;

pub use onnx::OnnxDetector;
pub use region::RegionDetector;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("invalid detector configuration: {0}")]
    InvalidConfig(String),
    #[error("no detector available; primary: {primary}; fallback: {fallback}")]
    Unavailable { primary: String, fallback: String },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A per-frame face detection provider.
///
/// Construction doubles as initialization: a value of this trait is ready
/// to detect. Providers own their model resources until dropped.
pub trait FaceDetector: Send {
    fn name(&self) -> &'static str;

    /// Detect faces in one frame. Ordering of the result is
    /// provider-defined; callers must not assume stability across frames.
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError>;
}

/// Select a detector for the session: primary ONNX first, region fallback
/// second, terminal error when both are unavailable.
pub fn select_detector(
    config: &ProcessingPipeline,
) -> Result<Box<dyn FaceDetector>, DetectorError> {
    let primary_failure = match &config.detector_model {
        Some(path) => match OnnxDetector::load(path) {
            Ok(detector) => {
                tracing::info!(path = %path.display(), "primary ONNX detector selected");
                return Ok(Box::new(detector));
            }
            Err(err) => err.to_string(),
        },
        None => "no detector model configured".to_string(),
    };

    tracing::warn!(
        reason = %primary_failure,
        "primary detector unavailable, trying region fallback"
    );

    match RegionDetector::new() {
        Ok(detector) => {
            tracing::info!("fallback region detector selected");
            Ok(Box::new(detector))
        }
        Err(err) => Err(DetectorError::Unavailable {
            primary: primary_failure,
            fallback: err.to_string(),
        }),
    }
}

/// Landmark counts per contour for the two provider classes.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LandmarkDensity {
    /// Primary provider layout.
    Dense,
    /// Fallback provider layout.
    Sparse,
}

impl LandmarkDensity {
    fn ring(&self) -> usize {
        match self {
            Self::Dense => 8,
            Self::Sparse => 4,
        }
    }

    fn arc(&self) -> usize {
        match self {
            Self::Dense => 5,
            Self::Sparse => 3,
        }
    }

    fn oval(&self) -> usize {
        match self {
            Self::Dense => 16,
            Self::Sparse => 8,
        }
    }
}

/// Five anchor keypoints both providers can produce.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AnchorPoints {
    pub left_eye: Point,
    pub right_eye: Point,
    pub nose: Point,
    pub mouth_left: Point,
    pub mouth_right: Point,
}

impl AnchorPoints {
    /// Estimate the nose and mouth anchors from the eye pair alone, for
    /// providers that only localize eyes.
    pub fn from_eyes(left_eye: Point, right_eye: Point) -> Self {
        let (u, v, d) = eye_frame(&left_eye, &right_eye);
        let mid = Point::new(
            (left_eye.x + right_eye.x) / 2.0,
            (left_eye.y + right_eye.y) / 2.0,
        );
        Self {
            left_eye,
            right_eye,
            nose: offset(&mid, &u, &v, 0.0, 0.55 * d),
            mouth_left: offset(&mid, &u, &v, -0.35 * d, 0.95 * d),
            mouth_right: offset(&mid, &u, &v, 0.35 * d, 0.95 * d),
        }
    }
}

/// Orthonormal face frame from the eye pair: `u` along the eye axis,
/// `v` perpendicular (toward the chin), plus the eye distance.
fn eye_frame(left: &Point, right: &Point) -> ((f32, f32), (f32, f32), f32) {
    let dx = right.x - left.x;
    let dy = right.y - left.y;
    let d = (dx * dx + dy * dy).sqrt().max(1e-3);
    let u = (dx / d, dy / d);
    let v = (-u.1, u.0);
    (u, v, d)
}

fn offset(origin: &Point, u: &(f32, f32), v: &(f32, f32), along: f32, down: f32) -> Point {
    Point::new(
        origin.x + u.0 * along + v.0 * down,
        origin.y + u.1 * along + v.1 * down,
    )
}

/// Elliptical ring of `n` evenly spaced points; its centroid is the center.
fn ring(center: &Point, u: &(f32, f32), v: &(f32, f32), a: f32, b: f32, n: usize) -> Vec<Point> {
    (0..n)
        .map(|i| {
            let t = i as f32 / n as f32 * std::f32::consts::TAU;
            offset(center, u, v, a * t.cos(), b * t.sin())
        })
        .collect()
}

/// Arc of `n` points between angles `t0..t1` on an ellipse.
fn arc(
    center: &Point,
    u: &(f32, f32),
    v: &(f32, f32),
    a: f32,
    b: f32,
    t0: f32,
    t1: f32,
    n: usize,
) -> Vec<Point> {
    (0..n)
        .map(|i| {
            let t = t0 + (t1 - t0) * i as f32 / (n.max(2) - 1) as f32;
            offset(center, u, v, a * t.cos(), b * t.sin())
        })
        .collect()
}

/// Build the ten named landmark groups from the five anchor keypoints.
///
/// The layout is an estimate derived from face geometry, not a contour
/// model: rings for the eyes and lips, arcs for the brows, jaw, and oval.
/// Eye-ring centroids land exactly on the anchor eye centers, which is
/// what the alignment stage consumes.
pub(crate) fn synthesize_landmarks(
    bbox: &BoundingBox,
    anchors: &AnchorPoints,
    density: LandmarkDensity,
) -> FaceLandmarks {
    let (u, v, d) = eye_frame(&anchors.left_eye, &anchors.right_eye);
    let mid = Point::new(
        (anchors.left_eye.x + anchors.right_eye.x) / 2.0,
        (anchors.left_eye.y + anchors.right_eye.y) / 2.0,
    );
    let mouth_center = Point::new(
        (anchors.mouth_left.x + anchors.mouth_right.x) / 2.0,
        (anchors.mouth_left.y + anchors.mouth_right.y) / 2.0,
    );
    let mouth_half = {
        let dx = anchors.mouth_right.x - anchors.mouth_left.x;
        let dy = anchors.mouth_right.y - anchors.mouth_left.y;
        ((dx * dx + dy * dy).sqrt() / 2.0).max(0.1 * d)
    };

    use std::f32::consts::PI;

    let left_eye = ring(&anchors.left_eye, &u, &v, 0.18 * d, 0.10 * d, density.ring());
    let right_eye = ring(&anchors.right_eye, &u, &v, 0.18 * d, 0.10 * d, density.ring());

    // Brow arcs sit above each eye (negative v is up).
    let brow = |center: &Point| {
        let raised = offset(center, &u, &v, 0.0, -0.25 * d);
        arc(&raised, &u, &v, 0.28 * d, 0.08 * d, PI, 2.0 * PI, density.arc())
    };
    let left_eyebrow = brow(&anchors.left_eye);
    let right_eyebrow = brow(&anchors.right_eye);

    // Straight interpolation from the eye midpoint down to the nose anchor.
    let nose_bridge: Vec<Point> = (0..=density.arc())
        .map(|i| {
            let f = i as f32 / density.arc() as f32;
            Point::new(
                mid.x + (anchors.nose.x - mid.x) * f,
                mid.y + (anchors.nose.y - mid.y) * f,
            )
        })
        .collect();
    let nose_tip = arc(&anchors.nose, &u, &v, 0.12 * d, 0.05 * d, 0.0, PI, density.arc());

    let outer_lips = ring(&mouth_center, &u, &v, mouth_half, 0.45 * mouth_half, density.ring());
    let inner_lips = ring(
        &mouth_center,
        &u,
        &v,
        0.7 * mouth_half,
        0.25 * mouth_half,
        density.ring(),
    );

    // Face oval: ellipse around a center below the eye line, sized from the
    // detection box so the contour tracks the detected extent.
    let oval_center = offset(&mid, &u, &v, 0.0, 0.45 * d);
    let oval_a = bbox.width * 0.48;
    let oval_b = bbox.height * 0.48;
    let face_oval = ring(&oval_center, &u, &v, oval_a, oval_b, density.oval());
    let jaw = arc(&oval_center, &u, &v, oval_a, oval_b, 0.15 * PI, 0.85 * PI, density.arc() * 2 - 1);

    let mut positions = Vec::new();
    for group in [
        &jaw,
        &left_eyebrow,
        &right_eyebrow,
        &nose_bridge,
        &nose_tip,
        &left_eye,
        &right_eye,
        &outer_lips,
        &inner_lips,
        &face_oval,
    ] {
        positions.extend_from_slice(group);
    }

    FaceLandmarks {
        positions,
        jaw,
        left_eyebrow,
        right_eyebrow,
        nose_bridge,
        nose_tip,
        left_eye,
        right_eye,
        outer_lips,
        inner_lips,
        face_oval,
    }
}
