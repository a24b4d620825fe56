use async_trait::async_trait;

use crate::error::EmbedError;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

/// The embedding capability. The same capability (and model version)
/// must be used for both ingestion and query; the store persists
/// `model_id` and refuses to open against a different one.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    /// Stable identity of the model/version producing the vectors.
    fn model_id(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Deterministic character-trigram hashing embedder.
///
/// Each lowercase trigram is FNV-hashed into one of `dimensions`
/// buckets and the resulting histogram is L2-normalized. No external
/// model service is required, which also makes it the test double.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    model: String,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model: format!("char-trigram-{dimensions}"),
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0f32; self.dimensions];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for window in chars.windows(3) {
            let bucket = (fnv1a(window) % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Ok(vector)
    }
}

fn fnv1a(window: &[char]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for ch in window {
        let mut buffer = [0u8; 4];
        for byte in ch.encode_utf8(&mut buffer).bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
    }
    hash
}
