//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ClipSettings::default()`]
//! 2. If `~/.clipprep/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `CLIPPREP_*` environment variable overrides (highest priority)
//! 4. [`ClipSettings::validate`]
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{ClipSettings, MAX_IMAGE_SIZE, MAX_SEQUENCE_LENGTH};

/// Resolve the path to the settings file (`~/.clipprep/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".clipprep").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ClipSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or an invalid final value is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ClipSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults deep-merged with the file at `path`, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<ClipSettings> {
    let defaults = serde_json::to_value(ClipSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CLIPPREP_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut ClipSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Each variable has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Enum values use their lowercase JSON names
/// - Invalid values are ignored with a warning (fall back to file/default)
pub fn apply_overrides<F>(settings: &mut ClipSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Model ───────────────────────────────────────────────────────
    if let Some(v) = env.string("CLIPPREP_MODEL_DIR") {
        settings.model.model_dir = v;
    }
    if let Some(v) = env.string("CLIPPREP_HF_REPO") {
        settings.model.hf_repo = v;
    }

    // ── Image ───────────────────────────────────────────────────────
    if let Some(v) = env.usize("CLIPPREP_IMAGE_SIZE", 1, MAX_IMAGE_SIZE) {
        settings.image.size = v;
    }
    if let Some(v) = env.enumeration("CLIPPREP_IMAGE_BACKEND") {
        settings.image.backend = v;
    }
    if let Some(v) = env.string("CLIPPREP_ELEMENT_TYPE") {
        if v.parse::<clip_core::ElementType>().is_ok() {
            settings.image.element_type = v;
        } else {
            warn!(key = "CLIPPREP_ELEMENT_TYPE", value = %v, "invalid element type env var, ignoring");
        }
    }

    // ── Text ────────────────────────────────────────────────────────
    if let Some(v) = env.usize("CLIPPREP_SEQUENCE_LENGTH", 2, MAX_SEQUENCE_LENGTH) {
        settings.text.sequence_length = v;
    }

    // ── Runtime ─────────────────────────────────────────────────────
    if let Some(v) = env.enumeration("CLIPPREP_EXECUTION_PROVIDER") {
        settings.runtime.execution_provider = v;
    }
    if let Some(v) = env.usize("CLIPPREP_INTRA_THREADS", 1, 256) {
        settings.runtime.intra_threads = v;
    }
    if let Some(v) = env.usize("CLIPPREP_OPTIMIZATION_LEVEL", 0, 3) {
        settings.runtime.optimization_level = v as u8;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CLIPPREP_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("CLIPPREP_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `usize` within an inclusive range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    }

    fn enumeration<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let val = self.string(name)?;
        let result = serde_json::from_value(Value::String(val.to_lowercase())).ok();
        if result.is_none() {
            warn!(key = name, value = %val, "invalid enum env var, ignoring");
        }
        result
    }
}
