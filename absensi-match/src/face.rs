use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::MatchError;

/// Face embedding: a fixed-length feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding {
    pub vector: Array1<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            vector: Array1::from_vec(values),
        }
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    pub fn is_finite(&self) -> bool {
        self.vector.iter().all(|v| v.is_finite())
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.vector.to_vec()
    }

    /// Plain L2 distance to `other`. Fails when the lengths differ.
    pub fn distance(&self, other: &Embedding) -> Result<f32, MatchError> {
        euclidean_distance(self, other)
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.vector.to_vec()
    }
}

/// Compute the Euclidean distance between two embeddings of equal length.
///
/// No normalization or weighting is applied.
pub fn euclidean_distance(a: &Embedding, b: &Embedding) -> Result<f32, MatchError> {
    if a.len() != b.len() {
        return Err(MatchError::EmbeddingLengthMismatch {
            expected: a.len(),
            found: b.len(),
        });
    }

    let diff = &a.vector - &b.vector;
    Ok(diff.dot(&diff).sqrt())
}
