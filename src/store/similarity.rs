//! Vector scoring and the on-disk embedding encoding.

use super::index::Similarity;
use crate::error::{RagsyncError, Result};

/// Raw dot product; callers guarantee equal lengths.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    // Handle zero magnitude vectors
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Relevance score in `[0, 1]`, higher is closer.
///
/// Cosine and dot product map `s` to `(1 + s) / 2`; euclidean maps distance
/// `d` to `1 / (1 + d)`. Dot-product scores only stay within range for
/// normalised vectors, so they are clamped.
pub fn score(similarity: Similarity, a: &[f32], b: &[f32]) -> f32 {
    match similarity {
        Similarity::Cosine => ((1.0 + cosine_similarity(a, b)) / 2.0).clamp(0.0, 1.0),
        Similarity::DotProduct => ((1.0 + dot_product(a, b)) / 2.0).clamp(0.0, 1.0),
        Similarity::Euclidean => 1.0 / (1.0 + euclidean_distance(a, b)),
    }
}

/// Encode an embedding as little-endian `f32` bytes.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn decode_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(RagsyncError::StoreUnavailable(format!(
            "Invalid embedding BLOB length: {}",
            blob.len()
        )));
    }

    Ok(blob
        .chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect())
}
