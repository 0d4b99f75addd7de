//! Shared value types for the per-frame face pipeline.
//!
//! Everything here is plain data: geometry, per-face enrichment records,
//! the identity encoding, and the option bags that tune each stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A single landmark point in frame-pixel coordinates.
///
/// `z` is relative depth when the producing detector estimates it, 0 otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// Axis-aligned bounding box in frame-pixel coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Confidence in [0, 1] when the producing detector supplies one.
    pub confidence: Option<f32>,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height, confidence: None }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Integer pixel rect clamped to a frame of the given dimensions.
    ///
    /// Returns `(x0, y0, x1, y1)` with `x1`/`y1` exclusive; empty when the
    /// box lies entirely outside the frame.
    pub fn pixel_rect(&self, frame_width: u32, frame_height: u32) -> (u32, u32, u32, u32) {
        let x0 = self.x.max(0.0).min(frame_width as f32) as u32;
        let y0 = self.y.max(0.0).min(frame_height as f32) as u32;
        let x1 = self.right().max(0.0).min(frame_width as f32) as u32;
        let y1 = self.bottom().max(0.0).min(frame_height as f32) as u32;
        (x0, y0, x1.max(x0), y1.max(y0))
    }
}

/// Intersection-over-Union between two bounding boxes.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = a.right().min(b.right());
    let y2 = a.bottom().min(b.bottom());

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Named landmark groups for one detected face.
///
/// `positions` holds every point the detector produced; the named groups are
/// derived copies of the semantically grouped subsets (kept as separate
/// arrays rather than index views for simplicity). Group density is
/// provider-defined: the ONNX detector emits a dense estimated layout, the
/// region detector a sparse one. Empty groups mean the provider could not
/// locate that feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub positions: Vec<Point>,
    pub jaw: Vec<Point>,
    pub left_eyebrow: Vec<Point>,
    pub right_eyebrow: Vec<Point>,
    pub nose_bridge: Vec<Point>,
    pub nose_tip: Vec<Point>,
    pub left_eye: Vec<Point>,
    pub right_eye: Vec<Point>,
    pub outer_lips: Vec<Point>,
    pub inner_lips: Vec<Point>,
    pub face_oval: Vec<Point>,
}

/// Centroid of a point set, `None` when empty.
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0f32, 0.0f32), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point::new(sx / n, sy / n))
}

/// Seven categorical expression scores. Non-negative, not normalized to
/// sum to one; the highest score is treated as dominant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceExpression {
    pub neutral: f32,
    pub happy: f32,
    pub sad: f32,
    pub angry: f32,
    pub fearful: f32,
    pub disgusted: f32,
    pub surprised: f32,
}

impl FaceExpression {
    /// All-neutral vector, used when no landmarks are available.
    pub fn all_neutral() -> Self {
        Self { neutral: 1.0, ..Default::default() }
    }

    /// The dominant expression label and its score.
    pub fn dominant(&self) -> (&'static str, f32) {
        let scores = [
            ("neutral", self.neutral),
            ("happy", self.happy),
            ("sad", self.sad),
            ("angry", self.angry),
            ("fearful", self.fearful),
            ("disgusted", self.disgusted),
            ("surprised", self.surprised),
        ];
        scores
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or(("neutral", 0.0))
    }
}

/// In-plane translation component of a similarity transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub dx: f32,
    pub dy: f32,
}

/// Similarity transform that would map a detected face onto the canonical
/// frontal pose (eyes level, fixed relative eye distance).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceAlignment {
    /// In-plane rotation between the eye centroids, degrees.
    pub angle: f32,
    /// Ratio mapping the actual eye distance to the canonical one.
    pub scale: f32,
    pub translation: Translation,
    /// Axis-aligned extent of the box corners under the transform.
    pub aligned_box: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

/// Per-frame aggregate for one detected face.
///
/// Created by the detector stage at frame start, enriched in place by later
/// stages, and discarded at end of frame. `id` is fresh every frame; there
/// is no cross-frame identity tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFace {
    pub id: Uuid,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub landmarks: Option<FaceLandmarks>,
    pub expression: Option<FaceExpression>,
    pub alignment: Option<FaceAlignment>,
    pub age: Option<f32>,
    pub gender: Option<Gender>,
    pub timestamp: DateTime<Utc>,
}

impl DetectedFace {
    /// A bare detection with a fresh id and no enrichments yet.
    pub fn new(bbox: BoundingBox) -> Self {
        Self {
            id: Uuid::new_v4(),
            bbox,
            landmarks: None,
            expression: None,
            alignment: None,
            age: None,
            gender: None,
            timestamp: Utc::now(),
        }
    }
}

/// Fixed-length identity embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    /// Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One-shot identity capture of a designated source face.
///
/// Held by the orchestrator for the lifetime of a swap session and replaced
/// wholesale when the user picks a new source face; never mutated in place.
#[derive(Debug, Clone)]
pub struct FaceEncoding {
    pub embedding: Embedding,
    pub landmarks: Option<FaceLandmarks>,
    pub bbox: BoundingBox,
    /// Canonical square snapshot of the padded source crop.
    pub aligned_face: image::RgbImage,
}

// --- Option bags (the complete external tuning surface) ---

/// Which stages the orchestrator builds and runs each frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingPipeline {
    pub detection: bool,
    pub landmarks: bool,
    pub alignment: bool,
    pub expression: bool,
    pub effects: bool,
    pub swap: bool,
    pub restoration: bool,
    /// Path to the primary detector's ONNX model. When unset or missing the
    /// fallback region detector is selected.
    pub detector_model: Option<PathBuf>,
}

impl Default for ProcessingPipeline {
    fn default() -> Self {
        Self {
            detection: true,
            landmarks: true,
            alignment: true,
            expression: true,
            effects: false,
            swap: false,
            restoration: false,
            detector_model: None,
        }
    }
}

/// Overlay selection for the renderer. Overlays with absent data are
/// skipped regardless of the flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub show_box: bool,
    pub show_landmarks: bool,
    pub show_mesh: bool,
    pub show_expression: bool,
    pub show_alignment: bool,
    pub show_id: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_box: true,
            show_landmarks: false,
            show_mesh: false,
            show_expression: false,
            show_alignment: false,
            show_id: false,
        }
    }
}

/// Cosmetic/diagnostic effect applied to each face region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceEffect {
    None,
    FaceBlur,
    FacePixelate,
    FaceGlow,
    FaceDistort,
    BigEyes,
    SlimFace,
    Beautify,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceEffectSettings {
    pub effect: FaceEffect,
    /// Effect intensity, clamped to [0, 1] at application time.
    pub intensity: f32,
}

impl Default for FaceEffectSettings {
    fn default() -> Self {
        Self { effect: FaceEffect::None, intensity: 0.5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapOptions {
    /// Composite opacity in [0, 1]; clamped at application time.
    pub blend_strength: f32,
    /// Rescale the swapped region's channel means to the target's.
    pub color_correction: bool,
    /// Scale factor applied to the target box before compositing.
    pub face_scale: f32,
    /// Luma floor in [0, 1]; source pixels darker than this are treated as
    /// background and left out of the composite.
    pub erasing_threshold: f32,
}

impl Default for SwapOptions {
    fn default() -> Self {
        Self {
            blend_strength: 0.8,
            color_correction: true,
            face_scale: 1.0,
            erasing_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestorationOptions {
    pub enabled: bool,
    /// Overall blend of the restored region over the original, [0, 1].
    pub strength: f32,
    pub denoise_level: f32,
    pub sharpen_amount: f32,
    pub enhance_details: bool,
}

impl Default for RestorationOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: 0.5,
            denoise_level: 0.3,
            sharpen_amount: 0.2,
            enhance_details: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical() {
        let a = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 10.0, 10.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 10.0, 10.0);
        // Overlap 5x10 = 50, union 150
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_pixel_rect_clamps_to_frame() {
        let b = BoundingBox::new(-10.0, -10.0, 50.0, 50.0);
        assert_eq!(b.pixel_rect(640, 480), (0, 0, 40, 40));

        let b = BoundingBox::new(600.0, 400.0, 100.0, 100.0);
        assert_eq!(b.pixel_rect(640, 480), (600, 400, 640, 480));
    }

    #[test]
    fn test_centroid() {
        let pts = vec![Point::new(0.0, 0.0), Point::new(10.0, 20.0)];
        let c = centroid(&pts).unwrap();
        assert!((c.x - 5.0).abs() < 1e-6);
        assert!((c.y - 10.0).abs() < 1e-6);
        assert!(centroid(&[]).is_none());
    }

    #[test]
    fn test_dominant_expression() {
        let e = FaceExpression { happy: 0.9, neutral: 0.2, ..Default::default() };
        assert_eq!(e.dominant().0, "happy");

        let n = FaceExpression::all_neutral();
        assert_eq!(n.dominant().0, "neutral");
    }

    #[test]
    fn test_embedding_similarity() {
        let a = Embedding { values: vec![1.0, 0.0] };
        let b = Embedding { values: vec![0.0, 1.0] };
        assert!(a.similarity(&b).abs() < 1e-6);
        assert!((a.similarity(&a) - 1.0).abs() < 1e-6);
        assert!((a.euclidean_distance(&b) - 2.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_detected_face_serializes_box_field() {
        let face = DetectedFace::new(BoundingBox::new(1.0, 2.0, 3.0, 4.0));
        let json = serde_json::to_value(&face).unwrap();
        assert!(json.get("box").is_some());
        assert!(json.get("bbox").is_none());
        assert_eq!(json["box"]["width"], 3.0);

        let back: DetectedFace = serde_json::from_value(json).unwrap();
        assert_eq!(back.bbox, face.bbox);
    }

    #[test]
    fn test_fresh_face_ids_are_unique() {
        let a = DetectedFace::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        let b = DetectedFace::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        assert_ne!(a.id, b.id);
    }
}
