//! livemask-core — Per-frame face processing pipeline.
//!
//! Detection (ONNX primary with a pure-pixel fallback), alignment,
//! expression scoring, identity encoding, face swapping, restoration,
//! cosmetic effects and overlay rendering, driven synchronously by a
//! lifecycle-checked orchestrator.

pub mod alignment;
pub mod detector;
pub mod effects;
pub mod encoder;
pub mod expression;
pub mod pipeline;
pub mod renderer;
pub mod restoration;
pub mod swapper;
pub mod types;

pub use detector::{DetectorError, FaceDetector};
pub use encoder::{encode_face, EncoderError};
pub use pipeline::{FacePipeline, PipelineError, PipelineState};
pub use swapper::FaceSwapper;
pub use types::{
    BoundingBox, DetectedFace, Embedding, FaceEncoding, FaceEffect, FaceEffectSettings,
    FaceExpression, FaceLandmarks, ProcessingPipeline, RenderOptions, RestorationOptions,
    SwapOptions,
};
