//! Fallback region detector.
//!
//! A pure-pixel heuristic with no model dependency: skin-tone
//! classification on a downsampled grid, connected-component boxes, and
//! dark-blob eye localization inside the upper part of each box. Produces
//! sparse synthesized landmarks. Deterministic for identical input.

use super::{synthesize_landmarks, AnchorPoints, DetectorError, FaceDetector, LandmarkDensity};
use crate::types::{BoundingBox, DetectedFace, Point};
use image::RgbImage;

#[derive(Debug, Clone)]
pub struct RegionDetectorConfig {
    /// Grid downsampling step in pixels.
    pub grid_step: u32,
    /// Minimum component size in grid cells before it counts as a face.
    pub min_region_cells: usize,
    /// Luma ceiling (0-255) for a pixel to count as an eye candidate.
    pub dark_luma: u8,
    /// Fraction of the box height, from the top, searched for eyes.
    pub eye_search_depth: f32,
    /// Minimum dark pixels per side before an eye centroid is accepted.
    pub min_eye_pixels: usize,
}

impl Default for RegionDetectorConfig {
    fn default() -> Self {
        Self {
            grid_step: 4,
            min_region_cells: 60,
            dark_luma: 80,
            eye_search_depth: 0.6,
            min_eye_pixels: 8,
        }
    }
}

pub struct RegionDetector {
    config: RegionDetectorConfig,
}

impl RegionDetector {
    pub fn new() -> Result<Self, DetectorError> {
        Self::with_config(RegionDetectorConfig::default())
    }

    pub fn with_config(config: RegionDetectorConfig) -> Result<Self, DetectorError> {
        if config.grid_step == 0 {
            return Err(DetectorError::InvalidConfig("grid_step must be >= 1".into()));
        }
        if config.min_region_cells == 0 {
            return Err(DetectorError::InvalidConfig(
                "min_region_cells must be >= 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&config.eye_search_depth) || config.eye_search_depth == 0.0 {
            return Err(DetectorError::InvalidConfig(
                "eye_search_depth must be in (0, 1]".into(),
            ));
        }
        Ok(Self { config })
    }
}

impl FaceDetector for RegionDetector {
    fn name(&self) -> &'static str {
        "region"
    }

    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let step = self.config.grid_step;
        let gw = width.div_ceil(step) as usize;
        let gh = height.div_ceil(step) as usize;

        // Skin mask on the downsampled grid; one sample per cell center.
        let mut mask = vec![false; gw * gh];
        for gy in 0..gh {
            for gx in 0..gw {
                let x = (gx as u32 * step + step / 2).min(width - 1);
                let y = (gy as u32 * step + step / 2).min(height - 1);
                mask[gy * gw + gx] = is_skin(&frame.get_pixel(x, y).0);
            }
        }

        let components = connected_components(&mask, gw, gh, self.config.min_region_cells);

        let mut faces = Vec::new();
        for component in components {
            let bbox = component.to_bbox(step, width, height);
            let mut face = DetectedFace::new(bbox);

            if let Some((left, right)) = self.locate_eyes(frame, &face.bbox) {
                let anchors = AnchorPoints::from_eyes(left, right);
                face.landmarks = Some(synthesize_landmarks(
                    &face.bbox,
                    &anchors,
                    LandmarkDensity::Sparse,
                ));
            }

            faces.push(face);
        }

        tracing::trace!(count = faces.len(), "region detector frame");
        Ok(faces)
    }
}

impl RegionDetector {
    /// Find the two eye centroids as dark-pixel clusters in the upper part
    /// of the box, split left/right at the box center line.
    fn locate_eyes(&self, frame: &RgbImage, bbox: &BoundingBox) -> Option<(Point, Point)> {
        let (x0, y0, x1, _) = bbox.pixel_rect(frame.width(), frame.height());
        let y_limit = (bbox.y + bbox.height * self.config.eye_search_depth)
            .min(frame.height() as f32) as u32;
        if x1 <= x0 || y_limit <= y0 {
            return None;
        }

        let mid_x = bbox.x + bbox.width / 2.0;
        let mut sides = [(0.0f64, 0.0f64, 0usize); 2]; // (sum_x, sum_y, count)

        for y in y0..y_limit {
            for x in x0..x1 {
                let px = frame.get_pixel(x, y).0;
                if luma(&px) < self.config.dark_luma {
                    let side = if (x as f32 + 0.5) < mid_x { 0 } else { 1 };
                    sides[side].0 += x as f64 + 0.5;
                    sides[side].1 += y as f64 + 0.5;
                    sides[side].2 += 1;
                }
            }
        }

        let centroid_of = |(sx, sy, n): (f64, f64, usize)| -> Option<Point> {
            if n >= self.config.min_eye_pixels {
                Some(Point::new((sx / n as f64) as f32, (sy / n as f64) as f32))
            } else {
                None
            }
        };

        match (centroid_of(sides[0]), centroid_of(sides[1])) {
            (Some(l), Some(r)) => Some((l, r)),
            _ => None,
        }
    }
}

fn luma(px: &[u8; 3]) -> u8 {
    (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32) as u8
}

/// Classic RGB skin-tone rule; intentionally permissive so lighting shifts
/// do not drop the face, at the cost of occasional background acceptance.
fn is_skin(px: &[u8; 3]) -> bool {
    let (r, g, b) = (px[0] as i32, px[1] as i32, px[2] as i32);
    r > 95 && g > 40 && b > 20 && r > g + 10 && r > b + 10
}

struct Component {
    min_gx: usize,
    min_gy: usize,
    max_gx: usize,
    max_gy: usize,
    cells: usize,
}

impl Component {
    fn to_bbox(&self, step: u32, frame_width: u32, frame_height: u32) -> BoundingBox {
        let x = (self.min_gx as u32 * step) as f32;
        let y = (self.min_gy as u32 * step) as f32;
        let w = (((self.max_gx + 1) as u32 * step).min(frame_width)) as f32 - x;
        let h = (((self.max_gy + 1) as u32 * step).min(frame_height)) as f32 - y;

        let area_cells = (self.max_gx - self.min_gx + 1) * (self.max_gy - self.min_gy + 1);
        let confidence = (self.cells as f32 / area_cells as f32).clamp(0.0, 1.0);

        BoundingBox { x, y, width: w, height: h, confidence: Some(confidence) }
    }
}

/// 4-connected components over the grid mask, scan order, small ones
/// dropped.
fn connected_components(
    mask: &[bool],
    gw: usize,
    gh: usize,
    min_cells: usize,
) -> Vec<Component> {
    let mut visited = vec![false; mask.len()];
    let mut components = Vec::new();
    let mut stack = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }

        let mut comp = Component {
            min_gx: usize::MAX,
            min_gy: usize::MAX,
            max_gx: 0,
            max_gy: 0,
            cells: 0,
        };

        visited[start] = true;
        stack.push(start);
        while let Some(idx) = stack.pop() {
            let gx = idx % gw;
            let gy = idx / gw;
            comp.min_gx = comp.min_gx.min(gx);
            comp.min_gy = comp.min_gy.min(gy);
            comp.max_gx = comp.max_gx.max(gx);
            comp.max_gy = comp.max_gy.max(gy);
            comp.cells += 1;

            let mut push = |nx: usize, ny: usize| {
                let nidx = ny * gw + nx;
                if mask[nidx] && !visited[nidx] {
                    visited[nidx] = true;
                    stack.push(nidx);
                }
            };
            if gx > 0 {
                push(gx - 1, gy);
            }
            if gx + 1 < gw {
                push(gx + 1, gy);
            }
            if gy > 0 {
                push(gx, gy - 1);
            }
            if gy + 1 < gh {
                push(gx, gy + 1);
            }
        }

        if comp.cells >= min_cells {
            components.push(comp);
        }
    }

    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const SKIN: [u8; 3] = [210, 160, 120];
    // Brighter than the dark-luma eye threshold and outside the skin rule.
    const BACKGROUND: [u8; 3] = [90, 120, 150];
    const EYE: [u8; 3] = [20, 20, 20];

    fn paint_face(frame: &mut RgbImage, x0: u32, y0: u32, size: u32) {
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                frame.put_pixel(x, y, Rgb(SKIN));
            }
        }
        // Eye dots at 25% / 75% width, 40% height
        let ex = [x0 + size / 4, x0 + 3 * size / 4];
        let ey = y0 + 2 * size / 5;
        for cx in ex {
            for dy in 0..7u32 {
                for dx in 0..7u32 {
                    frame.put_pixel(cx + dx - 3, ey + dy - 3, Rgb(EYE));
                }
            }
        }
    }

    #[test]
    fn test_detects_single_face() {
        let mut frame = RgbImage::from_pixel(640, 480, Rgb(BACKGROUND));
        paint_face(&mut frame, 100, 100, 200);

        let mut detector = RegionDetector::new().unwrap();
        let faces = detector.detect(&frame).unwrap();
        assert_eq!(faces.len(), 1);

        let bbox = &faces[0].bbox;
        assert!((bbox.x - 100.0).abs() <= 8.0, "x = {}", bbox.x);
        assert!((bbox.y - 100.0).abs() <= 8.0, "y = {}", bbox.y);
        assert!((bbox.width - 200.0).abs() <= 12.0, "w = {}", bbox.width);
        assert!((bbox.height - 200.0).abs() <= 12.0, "h = {}", bbox.height);
        assert!(bbox.confidence.unwrap() > 0.5);
    }

    #[test]
    fn test_detects_multiple_faces() {
        let mut frame = RgbImage::from_pixel(640, 480, Rgb(BACKGROUND));
        paint_face(&mut frame, 50, 80, 150);
        paint_face(&mut frame, 380, 200, 180);

        let mut detector = RegionDetector::new().unwrap();
        let faces = detector.detect(&frame).unwrap();
        assert_eq!(faces.len(), 2);
    }

    #[test]
    fn test_empty_frame_detects_nothing() {
        let frame = RgbImage::from_pixel(320, 240, Rgb(BACKGROUND));
        let mut detector = RegionDetector::new().unwrap();
        assert!(detector.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_small_blob_is_ignored() {
        let mut frame = RgbImage::from_pixel(320, 240, Rgb(BACKGROUND));
        // 12x12 skin patch, far below the minimum component size
        for y in 100..112 {
            for x in 100..112 {
                frame.put_pixel(x, y, Rgb(SKIN));
            }
        }
        let mut detector = RegionDetector::new().unwrap();
        assert!(detector.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_eyes_produce_sparse_landmarks() {
        let mut frame = RgbImage::from_pixel(640, 480, Rgb(BACKGROUND));
        paint_face(&mut frame, 100, 100, 200);

        let mut detector = RegionDetector::new().unwrap();
        let faces = detector.detect(&frame).unwrap();
        let landmarks = faces[0].landmarks.as_ref().expect("eyes should be found");

        let left = crate::types::centroid(&landmarks.left_eye).unwrap();
        let right = crate::types::centroid(&landmarks.right_eye).unwrap();
        // Eye dots painted at x = 150 / 250, y = 180
        assert!((left.x - 150.0).abs() < 6.0, "left.x = {}", left.x);
        assert!((right.x - 250.0).abs() < 6.0, "right.x = {}", right.x);
        assert!((left.y - 180.0).abs() < 6.0, "left.y = {}", left.y);
    }

    #[test]
    fn test_face_without_eyes_has_no_landmarks() {
        let mut frame = RgbImage::from_pixel(640, 480, Rgb(BACKGROUND));
        for y in 100..300 {
            for x in 100..300 {
                frame.put_pixel(x, y, Rgb(SKIN));
            }
        }
        let mut detector = RegionDetector::new().unwrap();
        let faces = detector.detect(&frame).unwrap();
        assert_eq!(faces.len(), 1);
        assert!(faces[0].landmarks.is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = RegionDetectorConfig { grid_step: 0, ..Default::default() };
        assert!(RegionDetector::with_config(config).is_err());

        let config = RegionDetectorConfig { eye_search_depth: 0.0, ..Default::default() };
        assert!(RegionDetector::with_config(config).is_err());
    }
}
