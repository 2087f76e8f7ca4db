//! Two-step execution provider selection.
//!
//! Step one builds with the preferred provider. If that fails, the error is
//! logged and step two builds with the CPU baseline. A CPU failure is final.

use clip_core::Result;
use clip_settings::ExecutionProvider;
use tracing::{info, warn};

/// Build with `preferred`, retrying once on CPU if a non-CPU provider fails.
///
/// Returns the built value and the provider that produced it.
pub fn build_with_fallback<T, F>(preferred: ExecutionProvider, mut build: F) -> Result<(T, ExecutionProvider)>
where
    F: FnMut(ExecutionProvider) -> Result<T>,
{
    if preferred != ExecutionProvider::Cpu {
        match build(preferred) {
            Ok(value) => {
                info!(provider = ?preferred, "execution provider ready");
                return Ok((value, preferred));
            }
            Err(e) => {
                warn!(provider = ?preferred, error = %e, "execution provider unavailable, falling back to CPU");
            }
        }
    }
    let value = build(ExecutionProvider::Cpu)?;
    info!(provider = ?ExecutionProvider::Cpu, "execution provider ready");
    Ok((value, ExecutionProvider::Cpu))
}
