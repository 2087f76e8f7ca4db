//! Model file resolution: local directory first, `HuggingFace` download second.

use std::path::{Path, PathBuf};

use clip_core::{ClipError, Result};
use clip_settings::ModelSettings;
use tracing::debug;

/// Resolved paths of the files a pipeline needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelPaths {
    /// Image encoder ONNX model.
    pub visual: PathBuf,
    /// Text encoder ONNX model.
    pub textual: PathBuf,
    /// `tokenizers` JSON file.
    pub tokenizer: PathBuf,
}

impl ModelPaths {
    /// Paths under the configured model directory, whether or not they exist.
    pub fn in_dir(dir: &Path, settings: &ModelSettings) -> Self {
        Self {
            visual: dir.join(&settings.visual_file),
            textual: dir.join(&settings.textual_file),
            tokenizer: dir.join(&settings.tokenizer_file),
        }
    }

    /// Files that are not present on disk.
    pub fn missing(&self) -> Vec<&Path> {
        [&self.visual, &self.textual, &self.tokenizer]
            .into_iter()
            .filter(|p| !p.is_file())
            .map(PathBuf::as_path)
            .collect()
    }

    /// Resolve model files, downloading missing ones when a repository is configured.
    pub fn resolve(settings: &ModelSettings) -> Result<Self> {
        let dir = settings.resolved_model_dir();
        let paths = Self::in_dir(&dir, settings);
        let missing = paths.missing();
        if missing.is_empty() {
            debug!(dir = %dir.display(), "model files present");
            return Ok(paths);
        }
        if settings.hf_repo.is_empty() {
            return Err(ClipError::ModelNotAvailable(format!(
                "missing {} and no hfRepo configured",
                display_list(&missing)
            )));
        }
        download(&settings.hf_repo, &dir, settings)?;
        Ok(paths)
    }
}

fn display_list(paths: &[&Path]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(feature = "ort")]
fn download(repo_id: &str, dir: &Path, settings: &ModelSettings) -> Result<()> {
    use tracing::{info, warn};

    std::fs::create_dir_all(dir)?;
    let api = hf_hub::api::sync::Api::new()
        .map_err(|e| ClipError::ModelNotAvailable(format!("HF API init: {e}")))?;
    let repo = api.model(repo_id.to_string());

    for filename in [&settings.visual_file, &settings.textual_file, &settings.tokenizer_file] {
        let target = dir.join(filename);
        if target.is_file() {
            debug!("skipping {filename} (already exists)");
            continue;
        }

        info!(repo = repo_id, "downloading {filename}");
        let cached = repo.get(filename).map_err(|e| {
            warn!("failed to download {filename}: {e}");
            ClipError::ModelNotAvailable(format!("download failed for {filename}: {e}"))
        })?;
        if cached != target {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let _ = std::fs::copy(&cached, &target).map_err(|e| {
                ClipError::ModelNotAvailable(format!("failed to copy {filename}: {e}"))
            })?;
        }
    }

    info!(dir = %dir.display(), "model files ready");
    Ok(())
}

#[cfg(not(feature = "ort"))]
fn download(repo_id: &str, _dir: &Path, _settings: &ModelSettings) -> Result<()> {
    Err(ClipError::ModelNotAvailable(format!(
        "downloading from {repo_id} requires the `ort` feature"
    )))
}
