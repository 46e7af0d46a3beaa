use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Metadata keys that address [`Fragment`] fields rather than `extra_metadata`.
pub const SOURCE_KEY: &str = "source";
/// Metadata key for [`Fragment::chunk_index`].
pub const CHUNK_INDEX_KEY: &str = "chunk_index";
/// Metadata key for [`Fragment::chunk_count`].
pub const CHUNK_COUNT_KEY: &str = "chunk_count";

/// A bounded piece of one ingested document.
///
/// Fragments are immutable once built. `chunk_index` and `chunk_count` describe
/// the fragment's position within the ingestion batch that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// The text of this fragment.
    pub content: String,
    /// Logical document name; every fragment of one document shares it.
    pub source: String,
    /// Zero-based position within the batch.
    pub chunk_index: usize,
    /// Number of fragments in the batch.
    pub chunk_count: usize,
    /// Free-form string metadata (file path, file type, ...).
    #[serde(default)]
    pub extra_metadata: BTreeMap<String, String>,
}

impl Fragment {
    /// Creates a fragment without extra metadata.
    pub fn new(
        content: impl Into<String>,
        source: impl Into<String>,
        chunk_index: usize,
        chunk_count: usize,
    ) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            chunk_index,
            chunk_count,
            extra_metadata: BTreeMap::new(),
        }
    }

    /// Adds one extra metadata entry. Chainable.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_metadata.insert(key.into(), value.into());
        self
    }

    /// Tags an ordered list of chunks as one ingestion batch.
    ///
    /// Every returned fragment carries `chunk_count == chunks.len()` and a dense
    /// `chunk_index` sequence.
    pub fn batch(
        source: &str,
        chunks: Vec<String>,
        extra_metadata: &BTreeMap<String, String>,
    ) -> Vec<Fragment> {
        let chunk_count = chunks.len();
        chunks
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| Fragment {
                content,
                source: source.to_string(),
                chunk_index,
                chunk_count,
                extra_metadata: extra_metadata.clone(),
            })
            .collect()
    }

    /// Looks up a metadata value by key, as the filter layer sees it.
    ///
    /// `source`, `chunk_index` and `chunk_count` resolve to the struct fields
    /// (numbers rendered in decimal); everything else comes from `extra_metadata`.
    pub fn metadata_value(&self, key: &str) -> Option<Cow<'_, str>> {
        match key {
            SOURCE_KEY => Some(Cow::Borrowed(self.source.as_str())),
            CHUNK_INDEX_KEY => Some(Cow::Owned(self.chunk_index.to_string())),
            CHUNK_COUNT_KEY => Some(Cow::Owned(self.chunk_count.to_string())),
            other => self
                .extra_metadata
                .get(other)
                .map(|v| Cow::Borrowed(v.as_str())),
        }
    }

    /// The id this fragment is stored under.
    pub fn id(&self) -> String {
        fragment_id(&self.source, self.chunk_index)
    }
}

/// Derives the index id for a `(source, chunk_index)` pair.
///
/// The id depends only on those two values, so re-ingesting the same chunk of
/// the same source overwrites the stored vector instead of duplicating it.
pub fn fragment_id(source: &str, chunk_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(chunk_index.to_string().as_bytes());
    let digest = hasher.finalize();
    format!("frag-{}", hex::encode(&digest[..16]))
}

/// A fragment as persisted inside a vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedFragment {
    /// Unique id within the index, see [`fragment_id`].
    pub id: String,
    /// The stored fragment.
    #[serde(flatten)]
    pub fragment: Fragment,
    /// Embedding vector; its length is the index dimension.
    pub embedding: Vec<f32>,
    /// When this fragment was (last) written.
    pub indexed_at: DateTime<Utc>,
}

impl IndexedFragment {
    /// Wraps a fragment with its embedding, deriving the id.
    pub fn new(fragment: Fragment, embedding: Vec<f32>) -> Self {
        Self {
            id: fragment.id(),
            fragment,
            embedding,
            indexed_at: Utc::now(),
        }
    }
}

/// A search hit: the fragment plus its cosine distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// The matched fragment.
    pub fragment: Fragment,
    /// Cosine distance (`1 - cosine similarity`); lower is more similar.
    pub distance: f32,
}

/// Summary returned once by an ingestion call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    /// Source name the fragments were stored under.
    pub source: String,
    /// Number of chunks the chunker produced.
    pub chunks_created: usize,
    /// Number of fragments written to the index.
    pub chunks_stored: usize,
}

/// Size information for a vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of stored fragments.
    pub total_fragments: usize,
    /// Dimension every stored embedding has.
    pub embedding_dimension: usize,
}
