//! Identity encoding of a designated source face.
//!
//! A one-shot, expensive operation performed when the user selects or
//! changes a source face, never per frame: pad and crop the detection box,
//! resize to the canonical square, and derive a fixed-length embedding from
//! pixel content. The embedding is a deterministic block-mean statistic,
//! not a learned recognition model; its contract is reproducibility plus
//! weak discriminability (distinct faces are farther apart than
//! near-duplicate crops of the same face).

use crate::types::{BoundingBox, DetectedFace, Embedding, FaceEncoding};
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

/// Side length of the canonical aligned snapshot.
pub const CANONICAL_SIZE: u32 = 128;
/// Padding added around the detection box, as a fraction of each dimension.
const CROP_PADDING: f32 = 0.30;
/// Block grid used for the embedding; 8×8 blocks × 3 channels = 192 dims.
const EMBED_GRID: u32 = 8;
/// Fixed embedding length for the lifetime of the process.
pub const EMBEDDING_DIM: usize = (EMBED_GRID * EMBED_GRID * 3) as usize;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("source region is empty: box {0:?} lies outside the frame")]
    EmptyRegion(BoundingBox),
}

/// Encode a source face into a [`FaceEncoding`].
pub fn encode_face(
    source: &RgbImage,
    detection: &DetectedFace,
) -> Result<FaceEncoding, EncoderError> {
    let padded = pad_box(&detection.bbox);
    let (x0, y0, x1, y1) = padded.pixel_rect(source.width(), source.height());
    if x1 <= x0 || y1 <= y0 {
        return Err(EncoderError::EmptyRegion(detection.bbox.clone()));
    }

    let crop = imageops::crop_imm(source, x0, y0, x1 - x0, y1 - y0).to_image();
    let aligned_face = imageops::resize(&crop, CANONICAL_SIZE, CANONICAL_SIZE, FilterType::Triangle);
    let embedding = compute_embedding(&aligned_face);

    tracing::debug!(
        box_w = detection.bbox.width,
        box_h = detection.bbox.height,
        dims = embedding.values.len(),
        "encoded source face"
    );

    Ok(FaceEncoding {
        embedding,
        landmarks: detection.landmarks.clone(),
        bbox: detection.bbox.clone(),
        aligned_face,
    })
}

/// Expand a box by the crop padding on every side.
fn pad_box(bbox: &BoundingBox) -> BoundingBox {
    BoundingBox::new(
        bbox.x - bbox.width * CROP_PADDING,
        bbox.y - bbox.height * CROP_PADDING,
        bbox.width * (1.0 + 2.0 * CROP_PADDING),
        bbox.height * (1.0 + 2.0 * CROP_PADDING),
    )
}

/// L2-normalized per-block channel means over the canonical snapshot.
fn compute_embedding(canonical: &RgbImage) -> Embedding {
    let block = CANONICAL_SIZE / EMBED_GRID;
    let mut values = Vec::with_capacity(EMBEDDING_DIM);

    for by in 0..EMBED_GRID {
        for bx in 0..EMBED_GRID {
            let mut sums = [0.0f64; 3];
            for y in (by * block)..((by + 1) * block) {
                for x in (bx * block)..((bx + 1) * block) {
                    let px = canonical.get_pixel(x, y);
                    sums[0] += px[0] as f64;
                    sums[1] += px[1] as f64;
                    sums[2] += px[2] as f64;
                }
            }
            let n = (block * block) as f64 * 255.0;
            for c in sums {
                values.push((c / n) as f32);
            }
        }
    }

    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut values {
            *v /= norm;
        }
    }

    Embedding { values }
}
