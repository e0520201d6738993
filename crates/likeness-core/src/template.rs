//! Template pooling, byte encoding and similarity scoring.
//!
//! A template is the byte-exact little-endian encoding of one
//! unit-L2-normalized 512-float vector. The all-zero template is the
//! deterministic "no usable face" sentinel.

use thiserror::Error;

use crate::types::{Embedding, EMBEDDING_DIM, TEMPLATE_BYTES};

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template must be {TEMPLATE_BYTES} bytes, got {0}")]
    WrongLength(usize),
}

/// Pool accepted embeddings into one unit vector: element-wise mean divided
/// by its own L2 norm. An empty input set yields the zero sentinel. The
/// mean makes pooling order-independent to the bit.
pub fn aggregate(embeddings: &[Embedding]) -> Vec<f32> {
    let mut pooled = vec![0.0f32; EMBEDDING_DIM];
    if embeddings.is_empty() {
        return pooled;
    }

    for embedding in embeddings {
        for (acc, &v) in pooled.iter_mut().zip(embedding.values.iter()) {
            *acc += v;
        }
    }
    let count = embeddings.len() as f32;
    for acc in pooled.iter_mut() {
        *acc /= count;
    }

    let norm = pooled.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for acc in pooled.iter_mut() {
            *acc /= norm;
        }
    }

    pooled
}

/// Encode a 512-float vector as 2048 little-endian bytes.
pub fn encode(vector: &[f32]) -> Vec<u8> {
    debug_assert_eq!(vector.len(), EMBEDDING_DIM);
    let mut bytes = Vec::with_capacity(TEMPLATE_BYTES);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a template back into its 512 floats, validating the length.
pub fn decode(bytes: &[u8]) -> Result<Vec<f32>, TemplateError> {
    if bytes.len() != TEMPLATE_BYTES {
        return Err(TemplateError::WrongLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Similarity between two templates: `300 * (3 - L2 distance)`.
///
/// Unit vectors are at most distance 2 apart, so real scores live in
/// `[300, 900]`. If either side is the zero sentinel the score is 0 rather
/// than computed; two sentinels would otherwise score as identical.
pub fn similarity(a: &[u8], b: &[u8]) -> Result<f64, TemplateError> {
    let va = decode(a)?;
    let vb = decode(b)?;

    if is_zero(&va) || is_zero(&vb) {
        return Ok(0.0);
    }

    let dist = va
        .iter()
        .zip(vb.iter())
        .map(|(x, y)| {
            let d = (*x - *y) as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt();

    Ok(300.0 * (3.0 - dist))
}

fn is_zero(vector: &[f32]) -> bool {
    vector.iter().all(|&v| v == 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(axis: usize) -> Embedding {
        let mut values = vec![0.0f32; EMBEDDING_DIM];
        values[axis] = 1.0;
        Embedding { values }
    }

    fn scaled(axis: usize, magnitude: f32) -> Embedding {
        let mut values = vec![0.0f32; EMBEDDING_DIM];
        values[axis] = magnitude;
        Embedding { values }
    }

    #[test]
    fn aggregate_empty_is_zero_sentinel() {
        let pooled = aggregate(&[]);
        assert_eq!(pooled.len(), EMBEDDING_DIM);
        assert!(pooled.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn aggregate_single_embedding_is_normalized() {
        let pooled = aggregate(&[scaled(3, 25.0)]);
        assert!((pooled[3] - 1.0).abs() < 1e-6);
        let norm = pooled.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn aggregate_is_order_independent_bitwise() {
        let e1 = scaled(0, 21.0);
        let e2 = scaled(5, 30.0);
        let e3 = scaled(17, 26.5);
        let a = aggregate(&[e1.clone(), e2.clone(), e3.clone()]);
        let b = aggregate(&[e3, e1, e2]);
        assert_eq!(a, b);
    }

    #[test]
    fn aggregate_identical_units_is_identity() {
        let pooled = aggregate(&[unit(7), unit(7)]);
        assert_eq!(pooled, unit(7).values);
    }

    #[test]
    fn codec_roundtrip() {
        let pooled = aggregate(&[scaled(1, 22.0), scaled(2, 28.0)]);
        let bytes = encode(&pooled);
        assert_eq!(bytes.len(), TEMPLATE_BYTES);
        assert_eq!(decode(&bytes).unwrap(), pooled);
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(matches!(
            decode(&[0u8; 100]),
            Err(TemplateError::WrongLength(100))
        ));
    }

    #[test]
    fn self_similarity_is_maximum() {
        let t = encode(&aggregate(&[scaled(4, 30.0)]));
        let score = similarity(&t, &t).unwrap();
        assert!((score - 900.0).abs() < 1e-6);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = encode(&aggregate(&[scaled(0, 25.0)]));
        let b = encode(&aggregate(&[scaled(1, 25.0), scaled(0, 10.0)]));
        let ab = similarity(&a, &b).unwrap();
        let ba = similarity(&b, &a).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn orthogonal_units_score() {
        let a = encode(&unit(0).values);
        let b = encode(&unit(1).values);
        // Distance sqrt(2): 300 * (3 - sqrt(2)).
        let expected = 300.0 * (3.0 - std::f64::consts::SQRT_2);
        assert!((similarity(&a, &b).unwrap() - expected).abs() < 1e-3);
    }

    #[test]
    fn zero_sentinel_scores_zero() {
        let zero = encode(&vec![0.0f32; EMBEDDING_DIM]);
        let real = encode(&unit(0).values);
        assert_eq!(similarity(&zero, &real).unwrap(), 0.0);
        assert_eq!(similarity(&real, &zero).unwrap(), 0.0);
        assert_eq!(similarity(&zero, &zero).unwrap(), 0.0);
    }
}
