//! # clipprep
//!
//! Encode images and texts with a CLIP ONNX model and print the embeddings
//! as JSON on stdout.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use clap::{Parser, Subcommand};
use clip_core::ImageSource;
use clip_core::similarity::rank_by_similarity;
use clip_runtime::{ClipPipeline, ModelPaths, load_text_encoder, load_visual_encoder};
use clip_settings::ClipSettings;
use serde_json::{Value, json};
use tracing::debug;

/// CLIP preprocessing and encoding.
#[derive(Parser, Debug)]
#[command(name = "clipprep", about = "Encode images and texts with a CLIP ONNX model")]
struct Cli {
    /// Settings file (defaults to `~/.clipprep/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Encode image files.
    Image {
        /// Image files, encoded as one batch.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Encode texts.
    Text {
        /// Texts, encoded as one batch.
        #[arg(required = true)]
        texts: Vec<String>,
    },
    /// Rank texts by similarity to an image.
    Similarity {
        /// Image file.
        #[arg(long)]
        image: PathBuf,
        /// Candidate texts (repeatable).
        #[arg(long = "text", required = true)]
        texts: Vec<String>,
    },
}

impl Cli {
    fn load_settings(&self) -> Result<ClipSettings> {
        let mut settings = match &self.settings {
            Some(path) => {
                ensure!(path.is_file(), "settings file not found: {}", path.display());
                clip_settings::load_settings_from_path(path)
                    .with_context(|| format!("Failed to load settings from {}", path.display()))?
            }
            None => clip_settings::load_settings().context("Failed to load settings")?,
        };
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

fn init_logging(settings: &ClipSettings) {
    if settings.logging.json {
        clip_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        clip_core::logging::init_subscriber(&settings.logging.level);
    }
}

fn image_report(paths: &[PathBuf], embeddings: Vec<Vec<f32>>) -> Value {
    Value::Array(
        paths
            .iter()
            .zip(embeddings)
            .map(|(path, embedding)| json!({ "image": path.display().to_string(), "embedding": embedding }))
            .collect(),
    )
}

fn text_report(texts: &[String], embeddings: Vec<Vec<f32>>) -> Value {
    Value::Array(
        texts
            .iter()
            .zip(embeddings)
            .map(|(text, embedding)| json!({ "text": text, "embedding": embedding }))
            .collect(),
    )
}

fn similarity_report(image: &Path, image_embedding: &[f32], texts: &[String], text_embeddings: &[Vec<f32>]) -> Result<Value> {
    let ranked = rank_by_similarity(image_embedding, text_embeddings).context("Failed to score texts")?;
    let scores: Vec<Value> = ranked
        .into_iter()
        .map(|(i, score)| json!({ "text": texts[i], "score": score }))
        .collect();
    Ok(json!({ "image": image.display().to_string(), "scores": scores }))
}

fn run(command: &Command, settings: &ClipSettings) -> Result<Value> {
    let paths = ModelPaths::resolve(&settings.model).context("Failed to resolve model files")?;
    debug!(?paths, "model files resolved");

    match command {
        Command::Image { paths: images } => {
            let encoder = load_visual_encoder(&paths.visual, settings).context("Failed to load image encoder")?;
            let sources: Vec<ImageSource> = images.iter().cloned().map(ImageSource::from).collect();
            let embeddings = encoder.encode_images(&sources).context("Failed to encode images")?;
            Ok(image_report(images, embeddings))
        }
        Command::Text { texts } => {
            let encoder = load_text_encoder(&paths.textual, &paths.tokenizer, settings)
                .context("Failed to load text encoder")?;
            let embeddings = encoder.encode_texts(texts).context("Failed to encode texts")?;
            Ok(text_report(texts, embeddings))
        }
        Command::Similarity { image, texts } => {
            let pipeline = ClipPipeline::from_paths(paths, settings).context("Failed to load CLIP pipeline")?;
            let image_embeddings = pipeline
                .encode_images(&[ImageSource::from(image.clone())])
                .context("Failed to encode image")?;
            let text_embeddings = pipeline.encode_texts(texts).context("Failed to encode texts")?;
            let image_embedding = image_embeddings.first().context("Image encoder returned no rows")?;
            similarity_report(image, image_embedding, texts, &text_embeddings)
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    init_logging(&settings);

    let report = run(&cli.command, &settings)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
