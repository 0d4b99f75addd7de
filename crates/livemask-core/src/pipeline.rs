//! Frame pipeline orchestrator.
//!
//! Owns the selected detector and the swapper state, runs the enabled
//! stages in a fixed order for each frame, and enforces the session
//! lifecycle: `Uninitialized → Initializing → Ready → Disposed`.
//!
//! Per-frame stage failures are contained here. A failing detector means
//! no faces this frame; a failing enrichment stage leaves that field
//! unset on the affected face. Neither escapes to the frame loop.

use crate::detector::{select_detector, DetectorError, FaceDetector};
use crate::swapper::FaceSwapper;
use crate::types::{
    DetectedFace, FaceEffectSettings, FaceEncoding, FaceExpression, ProcessingPipeline,
    RestorationOptions, SwapOptions,
};
use crate::{alignment, effects, expression, restoration};
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline is not initialized")]
    NotInitialized,
    #[error("pipeline has been disposed")]
    Disposed,
    #[error("detector initialization failed: {0}")]
    Init(#[from] DetectorError),
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Initializing,
    Ready,
    Disposed,
}

pub struct FacePipeline {
    config: ProcessingPipeline,
    state: PipelineState,
    detector: Option<Box<dyn FaceDetector>>,
    swapper: FaceSwapper,
    effect_settings: FaceEffectSettings,
    swap_options: SwapOptions,
    restoration_options: RestorationOptions,
}

impl FacePipeline {
    pub fn new(config: ProcessingPipeline) -> Self {
        Self {
            config,
            state: PipelineState::Uninitialized,
            detector: None,
            swapper: FaceSwapper::new(),
            effect_settings: FaceEffectSettings::default(),
            swap_options: SwapOptions::default(),
            restoration_options: RestorationOptions::default(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &ProcessingPipeline {
        &self.config
    }

    /// Select and load the detector, transitioning to `Ready`.
    ///
    /// Idempotent once `Ready`. On failure the pipeline stays
    /// `Uninitialized` and the caller may retry. Fails after `dispose`.
    pub fn initialize(&mut self) -> Result<(), PipelineError> {
        match self.state {
            PipelineState::Ready => return Ok(()),
            PipelineState::Disposed => return Err(PipelineError::Disposed),
            PipelineState::Uninitialized | PipelineState::Initializing => {}
        }

        self.state = PipelineState::Initializing;
        match select_detector(&self.config) {
            Ok(detector) => {
                tracing::info!(detector = detector.name(), "pipeline ready");
                self.detector = Some(detector);
                self.state = PipelineState::Ready;
                Ok(())
            }
            Err(err) => {
                self.state = PipelineState::Uninitialized;
                Err(err.into())
            }
        }
    }

    /// Run the enabled stages over one frame, in place.
    ///
    /// Returns the frame's detections, enriched per the stage config.
    /// Valid only in `Ready`.
    pub fn process(&mut self, frame: &mut RgbImage) -> Result<Vec<DetectedFace>, PipelineError> {
        match self.state {
            PipelineState::Ready => {}
            PipelineState::Disposed => return Err(PipelineError::Disposed),
            _ => return Err(PipelineError::NotInitialized),
        }

        if !self.config.detection {
            return Ok(Vec::new());
        }

        let detector = self.detector.as_mut().ok_or(PipelineError::NotInitialized)?;
        let mut faces = match detector.detect(frame) {
            Ok(faces) => faces,
            Err(err) => {
                // Detection failure is fatal for this frame only.
                tracing::warn!(error = %err, "detection failed, skipping frame");
                return Ok(Vec::new());
            }
        };

        for face in &mut faces {
            if !self.config.landmarks {
                face.landmarks = None;
            }

            if self.config.alignment {
                if let Some(landmarks) = &face.landmarks {
                    face.alignment = Some(alignment::compute_alignment(landmarks, &face.bbox));
                }
            }
            // Faces without landmarks still get a score vector: all-neutral.
            if self.config.expression {
                face.expression = Some(match &face.landmarks {
                    Some(landmarks) => expression::compute_expression(landmarks, &face.bbox),
                    None => FaceExpression::all_neutral(),
                });
            }
        }

        if self.config.effects {
            effects::apply_effect(frame, &faces, &self.effect_settings);
        }

        if self.config.swap && self.swapper.has_source() {
            for face in &faces {
                self.swapper.swap(frame, face, &self.swap_options);
                if self.config.restoration {
                    restoration::restore(frame, face, &self.restoration_options);
                }
            }
        }

        Ok(faces)
    }

    /// Replace the swap source encoding. `None` clears it. Atomic from the
    /// frame loop's perspective: a `process` call sees the old encoding or
    /// the new one, never a partial update.
    pub fn set_source_face(&mut self, encoding: Option<Arc<FaceEncoding>>) {
        self.swapper.set_source(encoding);
    }

    pub fn update_effect_settings(&mut self, settings: FaceEffectSettings) {
        self.effect_settings = settings;
    }

    pub fn update_swap_options(&mut self, options: SwapOptions) {
        self.swap_options = options;
    }

    pub fn update_restoration_options(&mut self, options: RestorationOptions) {
        self.restoration_options = options;
    }

    /// Release the detector and swap state. Terminal: the pipeline cannot
    /// be re-initialized afterwards.
    pub fn dispose(&mut self) {
        self.detector = None;
        self.swapper.set_source(None);
        self.state = PipelineState::Disposed;
        tracing::debug!("pipeline disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn pipeline() -> FacePipeline {
        FacePipeline::new(ProcessingPipeline::default())
    }

    #[test]
    fn test_process_before_initialize_fails() {
        let mut p = pipeline();
        let mut frame = RgbImage::new(64, 64);
        assert!(matches!(
            p.process(&mut frame),
            Err(PipelineError::NotInitialized)
        ));
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut p = pipeline();
        p.initialize().unwrap();
        assert_eq!(p.state(), PipelineState::Ready);
        p.initialize().unwrap();
        assert_eq!(p.state(), PipelineState::Ready);
    }

    #[test]
    fn test_missing_model_falls_back() {
        let config = ProcessingPipeline {
            detector_model: Some(PathBuf::from("/no/such/model.onnx")),
            ..ProcessingPipeline::default()
        };
        let mut p = FacePipeline::new(config);
        p.initialize().unwrap();
        assert_eq!(p.state(), PipelineState::Ready);
    }

    #[test]
    fn test_process_after_dispose_fails() {
        let mut p = pipeline();
        p.initialize().unwrap();
        p.dispose();
        assert_eq!(p.state(), PipelineState::Disposed);

        let mut frame = RgbImage::new(64, 64);
        assert!(matches!(p.process(&mut frame), Err(PipelineError::Disposed)));
        assert!(matches!(p.initialize(), Err(PipelineError::Disposed)));
    }

    #[test]
    fn test_empty_frame_yields_no_faces() {
        let mut p = pipeline();
        p.initialize().unwrap();
        let mut frame = RgbImage::new(64, 64);
        let faces = p.process(&mut frame).unwrap();
        assert!(faces.is_empty());
    }

    #[test]
    fn test_detection_disabled_returns_empty() {
        let config = ProcessingPipeline {
            detection: false,
            ..ProcessingPipeline::default()
        };
        let mut p = FacePipeline::new(config);
        p.initialize().unwrap();
        let mut frame = RgbImage::new(64, 64);
        assert!(p.process(&mut frame).unwrap().is_empty());
    }

    // --- End-to-end synthetic face scenarios ---

    const SKIN: image::Rgb<u8> = image::Rgb([210, 160, 120]);
    const EYE: image::Rgb<u8> = image::Rgb([20, 20, 20]);
    // Brighter than the dark-luma eye threshold and outside the skin rule.
    const BACKGROUND: image::Rgb<u8> = image::Rgb([90, 120, 150]);

    /// 640x480 frame with a 200x200 skin square at (100, 100), eyes at
    /// (150, 180) and (210, 180), rotated in-plane about (200, 200).
    fn synthetic_face_frame(angle_deg: f32) -> RgbImage {
        let mut frame = RgbImage::from_pixel(640, 480, BACKGROUND);
        let (cx, cy) = (200.0f32, 200.0f32);
        let (sin, cos) = angle_deg.to_radians().sin_cos();

        for y in 0..480u32 {
            for x in 0..640u32 {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                // Inverse-rotate into the face's own axes.
                let u = cos * dx + sin * dy + cx;
                let v = -sin * dx + cos * dy + cy;
                if (100.0..300.0).contains(&u) && (100.0..300.0).contains(&v) {
                    let on_eye = [(150.0f32, 180.0f32), (210.0, 180.0)]
                        .iter()
                        .any(|&(ex, ey)| (u - ex).abs() <= 3.0 && (v - ey).abs() <= 3.0);
                    frame.put_pixel(x, y, if on_eye { EYE } else { SKIN });
                }
            }
        }
        frame
    }

    #[test]
    fn test_end_to_end_upright_face() {
        let mut p = pipeline();
        p.initialize().unwrap();

        let mut frame = synthetic_face_frame(0.0);
        let faces = p.process(&mut frame).unwrap();
        assert_eq!(faces.len(), 1);

        let face = &faces[0];
        assert!(face.landmarks.is_some());
        assert!(face.expression.is_some());

        let alignment = face.alignment.as_ref().unwrap();
        assert!(
            alignment.angle.abs() < 1.0,
            "level eyes should give angle near 0, got {}",
            alignment.angle
        );
        // scale x eye distance = 0.35 x box width: eyes 60px apart in a
        // 200px box gives scale near 7/6.
        assert!((alignment.scale - 7.0 / 6.0).abs() < 0.05);

        // Fresh ids every frame, no cross-frame tracking.
        let mut frame2 = synthetic_face_frame(0.0);
        let faces2 = p.process(&mut frame2).unwrap();
        assert_eq!(faces2.len(), 1);
        assert_ne!(faces[0].id, faces2[0].id);
    }

    #[test]
    fn test_end_to_end_rotated_face() {
        let mut p = pipeline();
        p.initialize().unwrap();

        let mut frame = synthetic_face_frame(15.0);
        let faces = p.process(&mut frame).unwrap();
        assert_eq!(faces.len(), 1);

        let alignment = faces[0].alignment.as_ref().unwrap();
        assert!(
            (alignment.angle - 15.0).abs() <= 1.0,
            "expected angle near 15 degrees, got {}",
            alignment.angle
        );
    }

    #[test]
    fn test_landmarks_disabled_strips_enrichment() {
        let config = ProcessingPipeline {
            landmarks: false,
            ..ProcessingPipeline::default()
        };
        let mut p = FacePipeline::new(config);
        p.initialize().unwrap();

        let mut frame = synthetic_face_frame(0.0);
        let faces = p.process(&mut frame).unwrap();
        assert_eq!(faces.len(), 1);
        assert!(faces[0].landmarks.is_none());
        assert!(faces[0].alignment.is_none());
        // Expression is still scored, landmark-free faces read all-neutral.
        assert_eq!(
            faces[0].expression,
            Some(crate::types::FaceExpression::all_neutral())
        );
    }

    #[test]
    fn test_face_without_landmarks_scores_all_neutral() {
        let mut p = pipeline();
        p.initialize().unwrap();

        // Skin square with no eye dots: detected, but no landmarks found.
        let mut frame = RgbImage::from_pixel(640, 480, BACKGROUND);
        for y in 100..300 {
            for x in 100..300 {
                frame.put_pixel(x, y, SKIN);
            }
        }

        let faces = p.process(&mut frame).unwrap();
        assert_eq!(faces.len(), 1);
        assert!(faces[0].landmarks.is_none());
        assert!(faces[0].alignment.is_none());
        assert_eq!(
            faces[0].expression,
            Some(crate::types::FaceExpression::all_neutral())
        );
    }
}
