use anyhow::Context;
use livemask_core::{
    FaceEffectSettings, ProcessingPipeline, RenderOptions, RestorationOptions, SwapOptions,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI configuration, loaded from `LIVEMASK_*` environment variables.
pub struct Config {
    /// Path to the primary detector's ONNX model, if available.
    pub model_path: Option<PathBuf>,
    /// Base URL of the remote face service.
    pub remote_url: String,
    /// Optional TOML file with stage option bags.
    pub options_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `LIVEMASK_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            model_path: std::env::var("LIVEMASK_MODEL").map(PathBuf::from).ok(),
            remote_url: std::env::var("LIVEMASK_REMOTE_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            options_file: std::env::var("LIVEMASK_OPTIONS").map(PathBuf::from).ok(),
        }
    }

    /// Load the options file if configured, defaults otherwise.
    pub fn load_options(&self) -> anyhow::Result<StageOptions> {
        match &self.options_file {
            Some(path) => StageOptions::from_file(path),
            None => Ok(StageOptions::default()),
        }
    }
}

/// The complete stage tuning surface, as a TOML document. Every section
/// and field is optional and falls back to its stage default.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StageOptions {
    pub pipeline: ProcessingPipeline,
    pub render: RenderOptions,
    pub effect: FaceEffectSettings,
    pub swap: SwapOptions,
    pub restoration: RestorationOptions,
}

impl StageOptions {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading options file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("parsing options file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livemask_core::FaceEffect;

    #[test]
    fn test_empty_options_use_defaults() {
        let options: StageOptions = toml::from_str("").unwrap();
        assert!(options.pipeline.detection);
        assert!(options.render.show_box);
        assert_eq!(options.effect.effect, FaceEffect::None);
    }

    #[test]
    fn test_partial_options_override() {
        let options: StageOptions = toml::from_str(
            r#"
            [pipeline]
            expression = false

            [effect]
            effect = "face_blur"
            intensity = 0.9

            [swap]
            blend_strength = 0.5
            "#,
        )
        .unwrap();

        assert!(!options.pipeline.expression);
        assert!(options.pipeline.detection);
        assert_eq!(options.effect.effect, FaceEffect::FaceBlur);
        assert!((options.effect.intensity - 0.9).abs() < 1e-6);
        assert!((options.swap.blend_strength - 0.5).abs() < 1e-6);
        assert!((options.restoration.strength - 0.5).abs() < 1e-6);
    }
}
