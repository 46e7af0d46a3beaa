use async_trait::async_trait;
use docrag_core::{RagError, RagResult};
use std::collections::BTreeMap;

/// Trait for computing text embeddings (vector representations).
///
/// Every vector a provider returns must have [`EmbeddingProvider::dimension`]
/// entries; the vector index checks this on every write.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Compute embedding vector for a single text.
    async fn embed(&self, text: &str) -> RagResult<Vec<f32>>;

    /// Compute embeddings for a batch of texts, one vector per input, in order.
    async fn embed_batch(&self, texts: &[&str]) -> RagResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Dimension of the embedding vectors produced by this provider.
    fn dimension(&self) -> usize;

    /// Human-readable model name, reported in stats.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// Vector length of [`LocalEmbedding::default`].
pub const DEFAULT_DIMENSION: usize = 256;

/// Weights of the slots each token is hashed into. Slot `i` uses salt `i`.
const SLOT_WEIGHTS: [f32; 3] = [1.0, 0.7, 0.5];

/// Local bag-of-words embedding (no external model needed).
///
/// Each lowercase alphanumeric token of two or more characters adds its
/// term frequency to a few salted FNV-1a slots; the result is L2-normalized.
/// Text with no such token maps to the zero vector.
pub struct LocalEmbedding {
    dimension: usize,
}

impl LocalEmbedding {
    /// Create a provider producing vectors of `dimension` entries.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn project(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        // Ordered so float accumulation is identical run to run
        let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
        let mut total = 0u32;
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().nth(1).is_some())
        {
            *counts.entry(token).or_default() += 1;
            total += 1;
        }

        let mut vector = vec![0.0f32; self.dimension];
        if total == 0 {
            return vector;
        }
        for (token, count) in counts {
            let tf = count as f32 / total as f32;
            for (salt, weight) in (0u8..).zip(SLOT_WEIGHTS) {
                let slot = fnv1a(token.as_bytes(), salt) as usize % self.dimension;
                vector[slot] += tf * weight;
            }
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl Default for LocalEmbedding {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> RagResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RagError::Embedding("cannot embed empty text".to_string()));
        }
        if self.dimension == 0 {
            return Err(RagError::Configuration(
                "embedding dimension must be positive".to_string(),
            ));
        }
        Ok(self.project(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "local-hashed-bow"
    }
}

/// 32-bit FNV-1a over `data` followed by one `salt` byte.
fn fnv1a(data: &[u8], salt: u8) -> u32 {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    data.iter()
        .chain(std::iter::once(&salt))
        .fold(OFFSET, |hash, &byte| (hash ^ u32::from(byte)).wrapping_mul(PRIME))
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}
