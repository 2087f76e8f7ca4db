//! Embedding normalization and similarity scoring.

use crate::errors::{ClipError, Result};

/// Compute the L2 (Euclidean) norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// L2-normalize a vector in-place. Zero vectors remain zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity of two embeddings. Zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(ClipError::ShapeMismatch(format!(
            "cannot compare embeddings of width {} and {}",
            a.len(),
            b.len()
        )));
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a * norm_b))
}

/// Cosine similarity of every `rows[i]` against every `cols[j]`.
pub fn similarity_matrix<R, C>(rows: &[R], cols: &[C]) -> Result<Vec<Vec<f32>>>
where
    R: AsRef<[f32]>,
    C: AsRef<[f32]>,
{
    rows.iter()
        .map(|r| {
            cols.iter()
                .map(|c| cosine_similarity(r.as_ref(), c.as_ref()))
                .collect()
        })
        .collect()
}

/// Score candidates against a query, best first.
///
/// Returns `(candidate_index, score)` pairs; equal scores keep input order.
pub fn rank_by_similarity<C: AsRef<[f32]>>(query: &[f32], candidates: &[C]) -> Result<Vec<(usize, f32)>> {
    let mut scored = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| cosine_similarity(query, c.as_ref()).map(|s| (i, s)))
        .collect::<Result<Vec<_>>>()?;
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    Ok(scored)
}
