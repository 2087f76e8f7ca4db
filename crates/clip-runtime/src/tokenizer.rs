//! CLIP BPE tokenizer over `tokenizers`.

use std::path::Path;

use clip_core::{ClipError, Result, TextTokenizer};
use clip_settings::TextSettings;
use tokenizers::Tokenizer;
use tracing::debug;

/// A `tokenizer.json` tokenizer with resolved CLIP sentinel ids.
pub struct ClipTokenizer {
    inner: Tokenizer,
    sot: i32,
    eot: i32,
}

impl ClipTokenizer {
    /// Load from a `tokenizer.json` file and resolve the configured sentinel tokens.
    pub fn from_file(path: &Path, settings: &TextSettings) -> Result<Self> {
        if !path.is_file() {
            return Err(ClipError::ModelNotAvailable(format!(
                "tokenizer file not found: {}",
                path.display()
            )));
        }
        let inner = Tokenizer::from_file(path)
            .map_err(|e| ClipError::Tokenize(format!("tokenizer load: {e}")))?;
        Self::new(inner, settings)
    }

    /// Wrap a tokenizer; sequence length is enforced by the encoder, so the
    /// tokenizer's own padding and truncation are disabled.
    pub fn new(mut inner: Tokenizer, settings: &TextSettings) -> Result<Self> {
        let _ = inner.with_padding(None);
        let _ = inner
            .with_truncation(None)
            .map_err(|e| ClipError::Tokenize(format!("disable truncation: {e}")))?;
        let sot = token_id(&inner, &settings.sot_token)?;
        let eot = token_id(&inner, &settings.eot_token)?;
        debug!(sot, eot, "tokenizer ready");
        Ok(Self { inner, sot, eot })
    }
}

fn token_id(tokenizer: &Tokenizer, token: &str) -> Result<i32> {
    let id = tokenizer
        .token_to_id(token)
        .ok_or_else(|| ClipError::Tokenize(format!("token '{token}' is not in the vocabulary")))?;
    to_i32(id)
}

fn to_i32(id: u32) -> Result<i32> {
    i32::try_from(id).map_err(|_| ClipError::Tokenize(format!("token id {id} exceeds i32")))
}

impl TextTokenizer for ClipTokenizer {
    fn sot_token(&self) -> i32 {
        self.sot
    }

    fn eot_token(&self) -> i32 {
        self.eot
    }

    fn encode(&self, text: &str) -> Result<Vec<i32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| ClipError::Tokenize(e.to_string()))?;
        encoding.get_ids().iter().map(|&id| to_i32(id)).collect()
    }
}
