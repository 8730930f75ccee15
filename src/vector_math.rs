use ndarray::ArrayView1;

use crate::core::errors::RagError;

pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> Result<f32, RagError> {
    check_dimensions(query, candidate)?;

    let query_view = ArrayView1::from(query);
    let candidate_view = ArrayView1::from(candidate);

    let dot = query_view.dot(&candidate_view);
    let denom = l2_norm(query) * l2_norm(candidate);
    if denom <= f32::EPSILON {
        return Ok(0.0);
    }

    Ok((dot / denom).clamp(-1.0, 1.0))
}

pub fn l2_distance(query: &[f32], candidate: &[f32]) -> Result<f32, RagError> {
    check_dimensions(query, candidate)?;

    let diff = &ArrayView1::from(query) - &ArrayView1::from(candidate);
    Ok(diff.dot(&diff).sqrt())
}

/// Relevance in `[0, 1]` for an L2 distance between unit vectors.
///
/// Unit vectors are at most 2 apart; anything further (non-normalized input)
/// clamps to 0.
pub fn similarity_from_l2(distance: f32) -> f32 {
    (1.0 - distance / std::f32::consts::SQRT_2).clamp(0.0, 1.0)
}

pub fn l2_norm(vector: &[f32]) -> f32 {
    let view = ArrayView1::from(vector);
    view.dot(&view).sqrt()
}

/// Scales to unit length; zero vectors are returned unchanged.
pub fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = l2_norm(vector);
    if norm <= f32::EPSILON {
        return vector.to_vec();
    }
    vector.iter().map(|x| x / norm).collect()
}

fn check_dimensions(query: &[f32], candidate: &[f32]) -> Result<(), RagError> {
    if query.is_empty() || candidate.is_empty() {
        return Err(RagError::Embedding("vectors must not be empty".to_string()));
    }
    if query.len() != candidate.len() {
        return Err(RagError::Embedding(format!(
            "vector length mismatch: {} != {}",
            query.len(),
            candidate.len()
        )));
    }
    Ok(())
}
