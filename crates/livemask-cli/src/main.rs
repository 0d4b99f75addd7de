mod config;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config::Config;
use image::RgbImage;
use livemask_core::{
    effects, encode_face, renderer, restoration, FaceEffect, FacePipeline, ProcessingPipeline,
    RenderOptions,
};
use livemask_remote::{RemoteFaceService, RemoteRestoreParams, RemoteSwapParams};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "livemask", about = "Livemask face pipeline CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces in an image, write an annotated copy and a JSON report
    Detect {
        input: PathBuf,
        /// Annotated output image (default: <input>_annotated.png)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the per-face report as JSON to this path
        #[arg(long)]
        json: Option<PathBuf>,
        /// Draw landmark dots
        #[arg(long)]
        landmarks: bool,
        /// Draw the landmark mesh
        #[arg(long)]
        mesh: bool,
        /// Draw the expression panel
        #[arg(long)]
        expression: bool,
        /// Draw angle/scale readouts
        #[arg(long)]
        alignment: bool,
        /// Draw short face identifiers
        #[arg(long)]
        id: bool,
    },
    /// Swap a source face onto every face of a target image
    Swap {
        source: PathBuf,
        target: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Blend opacity in [0, 1]
        #[arg(long)]
        blend: Option<f32>,
        /// Scale factor for the swapped region
        #[arg(long)]
        face_scale: Option<f32>,
        /// Disable channel-mean color correction
        #[arg(long)]
        no_color_correction: bool,
        /// Use the remote service instead of the local stages; takes an
        /// optional URL, defaulting to LIVEMASK_REMOTE_URL
        #[arg(long, num_args = 0..=1, value_name = "URL")]
        remote: Option<Option<String>>,
    },
    /// Restore (denoise/enhance/sharpen) every face of an image
    Restore {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Overall restoration strength in [0, 1]
        #[arg(long)]
        strength: Option<f32>,
        #[arg(long)]
        denoise: Option<f32>,
        #[arg(long)]
        sharpen: Option<f32>,
        /// Skip the detail-enhancement step
        #[arg(long)]
        no_details: bool,
        /// Use the remote service instead of the local stages
        #[arg(long, num_args = 0..=1, value_name = "URL")]
        remote: Option<Option<String>>,
    },
    /// Apply a cosmetic effect to every face of an image
    Effect {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(value_enum)]
        effect: EffectKind,
        /// Effect intensity in [0, 1]
        #[arg(long, default_value_t = 0.5)]
        intensity: f32,
    },
    /// Query the remote service's model readiness
    Health {
        /// Service URL, defaulting to LIVEMASK_REMOTE_URL
        #[arg(long)]
        remote: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EffectKind {
    None,
    FaceBlur,
    FacePixelate,
    FaceGlow,
    FaceDistort,
    BigEyes,
    SlimFace,
    Beautify,
}

impl From<EffectKind> for FaceEffect {
    fn from(kind: EffectKind) -> Self {
        match kind {
            EffectKind::None => FaceEffect::None,
            EffectKind::FaceBlur => FaceEffect::FaceBlur,
            EffectKind::FacePixelate => FaceEffect::FacePixelate,
            EffectKind::FaceGlow => FaceEffect::FaceGlow,
            EffectKind::FaceDistort => FaceEffect::FaceDistort,
            EffectKind::BigEyes => FaceEffect::BigEyes,
            EffectKind::SlimFace => FaceEffect::SlimFace,
            EffectKind::Beautify => FaceEffect::Beautify,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Detect { input, output, json, landmarks, mesh, expression, alignment, id } => {
            let overlays = RenderOptions {
                show_landmarks: landmarks,
                show_mesh: mesh,
                show_expression: expression,
                show_alignment: alignment,
                show_id: id,
                ..RenderOptions::default()
            };
            cmd_detect(&config, &input, output.as_deref(), json.as_deref(), overlays)
        }
        Commands::Swap { source, target, output, blend, face_scale, no_color_correction, remote } => {
            match remote {
                Some(url) => {
                    let service = remote_service(&config, url);
                    let params = RemoteSwapParams {
                        blend_strength: blend.unwrap_or(0.8),
                        color_correction: !no_color_correction,
                        face_scale: face_scale.unwrap_or(1.0),
                    };
                    cmd_remote_swap(&service, &source, &target, &output, &params).await
                }
                None => cmd_local_swap(
                    &config,
                    &source,
                    &target,
                    &output,
                    blend,
                    face_scale,
                    no_color_correction,
                ),
            }
        }
        Commands::Restore { input, output, strength, denoise, sharpen, no_details, remote } => {
            match remote {
                Some(url) => {
                    let service = remote_service(&config, url);
                    let params = RemoteRestoreParams {
                        strength: strength.unwrap_or(0.5),
                        denoise_level: denoise.unwrap_or(0.3),
                        sharpen_amount: sharpen.unwrap_or(0.2),
                        enhance_details: !no_details,
                    };
                    cmd_remote_restore(&service, &input, &output, &params).await
                }
                None => {
                    cmd_local_restore(&config, &input, &output, strength, denoise, sharpen, no_details)
                }
            }
        }
        Commands::Effect { input, output, effect, intensity } => {
            cmd_effect(&config, &input, &output, effect.into(), intensity)
        }
        Commands::Health { remote } => {
            let service = RemoteFaceService::new(remote.unwrap_or(config.remote_url));
            cmd_health(&service).await
        }
    }
}

fn remote_service(config: &Config, url: Option<String>) -> RemoteFaceService {
    RemoteFaceService::new(url.unwrap_or_else(|| config.remote_url.clone()))
}

fn load_rgb(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)
        .with_context(|| format!("opening image {}", path.display()))?
        .to_rgb8())
}

fn save_rgb(frame: &RgbImage, path: &Path) -> Result<()> {
    frame
        .save(path)
        .with_context(|| format!("writing image {}", path.display()))
}

/// Build and initialize a pipeline, pointing the primary detector at the
/// configured model when the stage config does not name one itself.
fn build_pipeline(config: &Config, mut stages: ProcessingPipeline) -> Result<FacePipeline> {
    if stages.detector_model.is_none() {
        stages.detector_model = config.model_path.clone();
    }
    let mut pipeline = FacePipeline::new(stages);
    pipeline.initialize().context("initializing pipeline")?;
    Ok(pipeline)
}

fn cmd_detect(
    config: &Config,
    input: &Path,
    output: Option<&Path>,
    json: Option<&Path>,
    overlays: RenderOptions,
) -> Result<()> {
    let options = config.load_options()?;
    let mut pipeline = build_pipeline(config, options.pipeline)?;

    let mut frame = load_rgb(input)?;
    let faces = pipeline.process(&mut frame)?;
    println!("{} face(s) detected", faces.len());
    for face in &faces {
        let short_id = face.id.simple().to_string();
        let label = face
            .expression
            .as_ref()
            .map(|e| e.dominant().0)
            .unwrap_or("-");
        println!(
            "  {} box ({:.0}, {:.0}) {:.0}x{:.0} expression {}",
            &short_id[..8],
            face.bbox.x,
            face.bbox.y,
            face.bbox.width,
            face.bbox.height,
            label
        );
    }

    renderer::render(&mut frame, &faces, &overlays);

    let default_output = annotated_path(input);
    save_rgb(&frame, output.unwrap_or(&default_output))?;

    if let Some(json_path) = json {
        let report = serde_json::to_string_pretty(&faces)?;
        std::fs::write(json_path, report)
            .with_context(|| format!("writing report {}", json_path.display()))?;
    }
    Ok(())
}

fn annotated_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}_annotated.png"))
}

fn cmd_local_swap(
    config: &Config,
    source: &Path,
    target: &Path,
    output: &Path,
    blend: Option<f32>,
    face_scale: Option<f32>,
    no_color_correction: bool,
) -> Result<()> {
    let options = config.load_options()?;

    // One-shot source capture: detect and encode the largest source face.
    let source_frame = load_rgb(source)?;
    let mut detect_pipeline = build_pipeline(config, ProcessingPipeline::default())?;
    let mut probe = source_frame.clone();
    let source_faces = detect_pipeline.process(&mut probe)?;
    let source_face = source_faces
        .iter()
        .max_by(|a, b| {
            (a.bbox.width * a.bbox.height)
                .partial_cmp(&(b.bbox.width * b.bbox.height))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .ok_or_else(|| anyhow!("no face found in source image {}", source.display()))?;
    let encoding = encode_face(&source_frame, source_face)?;

    let stages = ProcessingPipeline { swap: true, ..options.pipeline };
    let mut pipeline = build_pipeline(config, stages)?;

    let mut swap_options = options.swap;
    if let Some(blend) = blend {
        swap_options.blend_strength = blend;
    }
    if let Some(scale) = face_scale {
        swap_options.face_scale = scale;
    }
    if no_color_correction {
        swap_options.color_correction = false;
    }
    pipeline.update_swap_options(swap_options);
    pipeline.update_restoration_options(options.restoration);
    pipeline.set_source_face(Some(Arc::new(encoding)));

    let mut frame = load_rgb(target)?;
    let faces = pipeline.process(&mut frame)?;
    if faces.is_empty() {
        return Err(anyhow!("no face found in target image {}", target.display()));
    }
    println!("swapped {} face(s)", faces.len());
    save_rgb(&frame, output)
}

async fn cmd_remote_swap(
    service: &RemoteFaceService,
    source: &Path,
    target: &Path,
    output: &Path,
    params: &RemoteSwapParams,
) -> Result<()> {
    let source_bytes =
        std::fs::read(source).with_context(|| format!("reading {}", source.display()))?;
    let target_bytes =
        std::fs::read(target).with_context(|| format!("reading {}", target.display()))?;

    let result = service.swap(source_bytes, target_bytes, params).await?;
    std::fs::write(output, result).with_context(|| format!("writing {}", output.display()))?;
    println!("remote swap written to {}", output.display());
    Ok(())
}

fn cmd_local_restore(
    config: &Config,
    input: &Path,
    output: &Path,
    strength: Option<f32>,
    denoise: Option<f32>,
    sharpen: Option<f32>,
    no_details: bool,
) -> Result<()> {
    let options = config.load_options()?;
    let mut pipeline = build_pipeline(config, options.pipeline)?;

    let mut restore_options = options.restoration;
    restore_options.enabled = true;
    if let Some(strength) = strength {
        restore_options.strength = strength;
    }
    if let Some(denoise) = denoise {
        restore_options.denoise_level = denoise;
    }
    if let Some(sharpen) = sharpen {
        restore_options.sharpen_amount = sharpen;
    }
    if no_details {
        restore_options.enhance_details = false;
    }

    let mut frame = load_rgb(input)?;
    let faces = pipeline.process(&mut frame)?;
    if faces.is_empty() {
        return Err(anyhow!("no face found in {}", input.display()));
    }
    for face in &faces {
        restoration::restore(&mut frame, face, &restore_options);
    }
    println!("restored {} face(s)", faces.len());
    save_rgb(&frame, output)
}

async fn cmd_remote_restore(
    service: &RemoteFaceService,
    input: &Path,
    output: &Path,
    params: &RemoteRestoreParams,
) -> Result<()> {
    let image_bytes =
        std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let result = service.restore(image_bytes, params).await?;
    std::fs::write(output, result).with_context(|| format!("writing {}", output.display()))?;
    println!("remote restore written to {}", output.display());
    Ok(())
}

fn cmd_effect(
    config: &Config,
    input: &Path,
    output: &Path,
    effect: FaceEffect,
    intensity: f32,
) -> Result<()> {
    let options = config.load_options()?;
    let mut pipeline = build_pipeline(config, options.pipeline)?;

    let mut frame = load_rgb(input)?;
    let faces = pipeline.process(&mut frame)?;
    if faces.is_empty() {
        return Err(anyhow!("no face found in {}", input.display()));
    }

    let settings = livemask_core::FaceEffectSettings { effect, intensity };
    effects::apply_effect(&mut frame, &faces, &settings);
    println!("applied {:?} to {} face(s)", effect, faces.len());
    save_rgb(&frame, output)
}

async fn cmd_health(service: &RemoteFaceService) -> Result<()> {
    let report = service.health().await?;
    println!("status:         {}", report.status);
    println!("device:         {}", report.device);
    println!("cuda available: {}", report.cuda_available);
    println!("models loaded:  {}", report.models_loaded);
    println!("  face_analysis:   {}", report.models.face_analysis);
    println!("  face_swapper:    {}", report.models.face_swapper);
    println!("  gfpgan_restorer: {}", report.models.gfpgan_restorer);
    Ok(())
}
