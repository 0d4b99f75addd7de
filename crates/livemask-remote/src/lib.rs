//! livemask-remote — Client for the high-quality face service.
//!
//! Thin async HTTP wrapper over the remote swap/restore endpoints. The
//! service accepts PNG images as multipart form fields and returns PNG
//! bytes; this client deals purely in encoded bytes and shares no state
//! with the local pipeline.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("service returned {status}: {detail}")]
    Status { status: u16, detail: String },
}

/// Readiness of the individual server-side models.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelStatus {
    pub face_analysis: bool,
    pub face_swapper: bool,
    pub gfpgan_restorer: bool,
}

/// Response of the service's `/health` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub models_loaded: bool,
    pub device: String,
    pub cuda_available: bool,
    pub models: ModelStatus,
}

/// Scalar form fields of the swap endpoint. Defaults mirror the service's.
#[derive(Debug, Clone)]
pub struct RemoteSwapParams {
    pub blend_strength: f32,
    pub color_correction: bool,
    pub face_scale: f32,
}

impl Default for RemoteSwapParams {
    fn default() -> Self {
        Self { blend_strength: 0.8, color_correction: true, face_scale: 1.0 }
    }
}

/// Scalar form fields of the per-frame video swap endpoint. The service
/// fixes color correction and face scale for this path; only the blend is
/// tunable.
#[derive(Debug, Clone)]
pub struct RemoteVideoFrameParams {
    pub blend_strength: f32,
}

impl Default for RemoteVideoFrameParams {
    fn default() -> Self {
        Self { blend_strength: 0.8 }
    }
}

/// Scalar form fields of the restore endpoint. Defaults mirror the service's.
#[derive(Debug, Clone)]
pub struct RemoteRestoreParams {
    pub strength: f32,
    pub denoise_level: f32,
    pub sharpen_amount: f32,
    pub enhance_details: bool,
}

impl Default for RemoteRestoreParams {
    fn default() -> Self {
        Self {
            strength: 0.5,
            denoise_level: 0.3,
            sharpen_amount: 0.2,
            enhance_details: true,
        }
    }
}

pub struct RemoteFaceService {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteFaceService {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { base_url, client: reqwest::Client::new() }
    }

    /// Query the readiness of the remote models.
    pub async fn health(&self) -> Result<HealthReport, RemoteError> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Swap the source face onto the target image. Both inputs are encoded
    /// image bytes (PNG or JPEG); the result is PNG bytes.
    pub async fn swap(
        &self,
        source_face: Vec<u8>,
        target_image: Vec<u8>,
        params: &RemoteSwapParams,
    ) -> Result<Vec<u8>, RemoteError> {
        let url = format!("{}/api/face-swap", self.base_url);
        let form = reqwest::multipart::Form::new()
            .part(
                "source_face",
                reqwest::multipart::Part::bytes(source_face).file_name("source.png"),
            )
            .part(
                "target_image",
                reqwest::multipart::Part::bytes(target_image).file_name("target.png"),
            )
            .text("blend_strength", params.blend_strength.to_string())
            .text("color_correction", params.color_correction.to_string())
            .text("face_scale", params.face_scale.to_string());

        tracing::debug!(url, "remote face swap request");
        let response = self.client.post(&url).multipart(form).send().await?;
        let response = check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Swap the source face onto one video frame. Both inputs are encoded
    /// image bytes; the result is JPEG bytes (the service trades quality
    /// for speed on this path).
    pub async fn swap_video_frame(
        &self,
        source_face: Vec<u8>,
        frame: Vec<u8>,
        params: &RemoteVideoFrameParams,
    ) -> Result<Vec<u8>, RemoteError> {
        let url = format!("{}/api/face-swap-video-frame", self.base_url);
        let form = reqwest::multipart::Form::new()
            .part(
                "source_face",
                reqwest::multipart::Part::bytes(source_face).file_name("source.png"),
            )
            .part(
                "frame",
                reqwest::multipart::Part::bytes(frame).file_name("frame.png"),
            )
            .text("blend_strength", params.blend_strength.to_string());

        tracing::debug!(url, "remote video frame swap request");
        let response = self.client.post(&url).multipart(form).send().await?;
        let response = check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Restore the given image. Input is encoded image bytes; the result
    /// is PNG bytes.
    pub async fn restore(
        &self,
        image: Vec<u8>,
        params: &RemoteRestoreParams,
    ) -> Result<Vec<u8>, RemoteError> {
        let url = format!("{}/api/face-restore", self.base_url);
        let form = reqwest::multipart::Form::new()
            .part(
                "image",
                reqwest::multipart::Part::bytes(image).file_name("image.png"),
            )
            .text("strength", params.strength.to_string())
            .text("denoise_level", params.denoise_level.to_string())
            .text("sharpen_amount", params.sharpen_amount.to_string())
            .text("enhance_details", params.enhance_details.to_string());

        tracing::debug!(url, "remote face restore request");
        let response = self.client.post(&url).multipart(form).send().await?;
        let response = check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    Err(RemoteError::Status { status: status.as_u16(), detail })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_report_deserializes() {
        let body = r#"{
            "status": "healthy",
            "models_loaded": true,
            "device": "cuda",
            "cuda_available": true,
            "models": {
                "face_analysis": true,
                "face_swapper": true,
                "gfpgan_restorer": false
            }
        }"#;
        let report: HealthReport = serde_json::from_str(body).unwrap();
        assert_eq!(report.status, "healthy");
        assert!(report.models_loaded);
        assert!(!report.models.gfpgan_restorer);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let service = RemoteFaceService::new("http://localhost:8000/");
        assert_eq!(service.base_url, "http://localhost:8000");
    }

    #[test]
    fn test_param_defaults_match_service() {
        let swap = RemoteSwapParams::default();
        assert!((swap.blend_strength - 0.8).abs() < 1e-6);
        assert!(swap.color_correction);

        let restore = RemoteRestoreParams::default();
        assert!((restore.strength - 0.5).abs() < 1e-6);
        assert!(restore.enhance_details);

        let video = RemoteVideoFrameParams::default();
        assert!((video.blend_strength - 0.8).abs() < 1e-6);
    }
}
