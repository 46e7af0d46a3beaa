use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use docrag_core::{
    Fragment, IndexStats, IndexedFragment, MatchResult, MetadataFilter, RagError, RagResult,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::embedding::EmbeddingProvider;

/// Trait for vector index backends.
///
/// Implementations serialize writes against each other and against reads;
/// a batch passed to [`VectorIndex::add`] is either fully visible or not at all.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embed and insert a batch of fragments. Returns the number written.
    ///
    /// A fragment whose `(source, chunk_index)` is already stored replaces the
    /// previous entry.
    async fn add(&self, fragments: Vec<Fragment>) -> RagResult<usize>;

    /// Insert fragments whose embeddings were computed elsewhere.
    async fn add_embedded(&self, items: Vec<(Fragment, Vec<f32>)>) -> RagResult<usize>;

    /// Return up to `k` fragments closest to `query_embedding`, nearest first.
    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> RagResult<Vec<MatchResult>>;

    /// Remove every fragment of `source`. Returns the number removed.
    async fn delete_by_source(&self, source: &str) -> RagResult<usize>;

    /// Remove everything.
    async fn clear(&self) -> RagResult<()>;

    /// Fragment count and embedding dimension.
    async fn stats(&self) -> RagResult<IndexStats>;

    /// Sorted, deduplicated source names.
    async fn sources(&self) -> RagResult<Vec<String>>;

    /// Dimension every stored embedding has.
    fn dimension(&self) -> usize;
}

/// Mutable index contents. Entries are keyed by insertion sequence so that
/// iteration order is insertion order; overwrites keep their original slot.
#[derive(Debug, Clone, Default)]
struct IndexState {
    entries: BTreeMap<u64, IndexedFragment>,
    positions: HashMap<String, u64>,
    next_seq: u64,
}

impl IndexState {
    fn upsert(&mut self, item: IndexedFragment) {
        if let Some(&seq) = self.positions.get(&item.id) {
            self.entries.insert(seq, item);
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.positions.insert(item.id.clone(), seq);
        self.entries.insert(seq, item);
    }

    fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn iter(&self) -> impl Iterator<Item = &IndexedFragment> {
        self.entries.values()
    }

    fn count_source(&self, source: &str) -> usize {
        self.iter().filter(|e| e.fragment.source == source).count()
    }

    fn delete_by_source(&mut self, source: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.fragment.source != source);
        self.positions.retain(|_, seq| self.entries.contains_key(seq));
        before - self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
    }

    fn sources(&self) -> Vec<String> {
        self.iter()
            .map(|e| e.fragment.source.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<MatchResult> {
        let mut scored: Vec<(f32, &IndexedFragment)> = self
            .iter()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.fragment)))
            .map(|e| (cosine_distance(query_embedding, &e.embedding), e))
            .collect();

        // Stable sort: equal distances keep insertion order
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(distance, e)| MatchResult {
                fragment: e.fragment.clone(),
                distance,
            })
            .collect()
    }
}

/// In-memory vector index using brute-force cosine distance.
/// Suitable for small and medium corpora (<100k fragments).
pub struct InMemoryVectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    state: RwLock<IndexState>,
}

impl InMemoryVectorIndex {
    /// Create an empty index. Its dimension is fixed to the provider's.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let dimension = embedder.dimension();
        Self {
            embedder,
            dimension,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Embed a batch outside the index lock.
    async fn prepare(&self, fragments: Vec<Fragment>) -> RagResult<Vec<IndexedFragment>> {
        let texts: Vec<&str> = fragments.iter().map(|f| f.content.as_str()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(ingestion_error)?;

        if embeddings.len() != fragments.len() {
            return Err(RagError::Ingestion(format!(
                "embedding provider returned {} vectors for {} fragments",
                embeddings.len(),
                fragments.len()
            )));
        }

        self.attach(fragments.into_iter().zip(embeddings).collect())
    }

    /// Check dimensions and derive ids for precomputed embeddings.
    fn attach(&self, items: Vec<(Fragment, Vec<f32>)>) -> RagResult<Vec<IndexedFragment>> {
        items
            .into_iter()
            .map(|(fragment, embedding)| {
                check_dimension(self.dimension, embedding.len())?;
                Ok(IndexedFragment::new(fragment, embedding))
            })
            .collect()
    }

    async fn commit(&self, prepared: Vec<IndexedFragment>) -> usize {
        let count = prepared.len();
        let mut state = self.state.write().await;
        for item in prepared {
            state.upsert(item);
        }
        debug!(count, total = state.len(), "Fragments committed to index");
        count
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, fragments: Vec<Fragment>) -> RagResult<usize> {
        if fragments.is_empty() {
            return Ok(0);
        }
        let prepared = self.prepare(fragments).await?;
        Ok(self.commit(prepared).await)
    }

    async fn add_embedded(&self, items: Vec<(Fragment, Vec<f32>)>) -> RagResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let prepared = self.attach(items)?;
        Ok(self.commit(prepared).await)
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> RagResult<Vec<MatchResult>> {
        check_dimension(self.dimension, query_embedding.len())?;
        if let Some(f) = filter {
            f.validate()?;
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;
        Ok(state.search(query_embedding, k, filter))
    }

    async fn delete_by_source(&self, source: &str) -> RagResult<usize> {
        let mut state = self.state.write().await;
        let removed = state.delete_by_source(source);
        debug!(source, removed, "Deleted fragments by source");
        Ok(removed)
    }

    async fn clear(&self) -> RagResult<()> {
        self.state.write().await.clear();
        Ok(())
    }

    async fn stats(&self) -> RagResult<IndexStats> {
        let state = self.state.read().await;
        Ok(IndexStats {
            total_fragments: state.len(),
            embedding_dimension: self.dimension,
        })
    }

    async fn sources(&self) -> RagResult<Vec<String>> {
        Ok(self.state.read().await.sources())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// File-backed vector index that persists fragments as JSONL on disk.
///
/// Loads all fragments into memory on open. New fragments are appended;
/// overwrites, deletions and clears rewrite the file. The file is written
/// before the in-memory state changes, under the same write lock.
pub struct FileVectorIndex {
    path: PathBuf,
    inner: InMemoryVectorIndex,
}

impl FileVectorIndex {
    /// Open the index at `path`, loading any fragments it already holds.
    ///
    /// An unterminated last line that does not parse is left over from an
    /// interrupted append: it is dropped and the file rewritten without it.
    /// Any other unparsable line fails with [`RagError::Storage`].
    ///
    /// Fails with [`RagError::Configuration`] if a stored embedding does not
    /// match the provider's dimension.
    pub async fn open(
        path: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> RagResult<Self> {
        let path = path.into();
        let inner = InMemoryVectorIndex::new(embedder);

        if path.exists() {
            let data = tokio::fs::read_to_string(&path).await.map_err(|e| {
                RagError::Storage(format!("Failed to read index {}: {e}", path.display()))
            })?;
            let mut state = inner.state.write().await;
            let mut torn_tail = false;
            for (line_no, raw) in data.split_inclusive('\n').enumerate() {
                let complete = raw.ends_with('\n');
                let line = raw.trim_end();
                if line.is_empty() {
                    continue;
                }
                let entry: IndexedFragment = match serde_json::from_str(line) {
                    Ok(entry) => entry,
                    // Only the unterminated last line can be a torn append
                    Err(e) if !complete => {
                        warn!(
                            path = %path.display(),
                            line = line_no + 1,
                            error = %e,
                            "Dropping truncated trailing index entry"
                        );
                        torn_tail = true;
                        continue;
                    }
                    Err(e) => {
                        return Err(RagError::Storage(format!(
                            "Invalid index entry at line {}: {e}",
                            line_no + 1
                        )))
                    }
                };
                torn_tail |= !complete;
                if entry.embedding.len() != inner.dimension {
                    return Err(RagError::Configuration(format!(
                        "stored embedding at line {} has dimension {}, provider produces {}",
                        line_no + 1,
                        entry.embedding.len(),
                        inner.dimension
                    )));
                }
                state.upsert(entry);
            }
            if torn_tail {
                replace_file(&path, render_lines(state.iter())?).await?;
            }
            info!(path = %path.display(), fragments = state.len(), "Loaded vector index");
        } else if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RagError::Storage(format!("Failed to create dir: {e}")))?;
        }

        Ok(Self { path, inner })
    }

    /// Location of the JSONL file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_batch(&self, prepared: Vec<IndexedFragment>) -> RagResult<usize> {
        let count = prepared.len();
        let mut state = self.inner.state.write().await;

        if prepared.iter().any(|f| state.contains(&f.id)) {
            let mut next = (*state).clone();
            for item in prepared {
                next.upsert(item);
            }
            replace_file(&self.path, render_lines(next.iter())?).await?;
            *state = next;
        } else {
            append_to_file(&self.path, render_lines(prepared.iter())?).await?;
            for item in prepared {
                state.upsert(item);
            }
        }

        debug!(count, total = state.len(), "Fragments persisted to index");
        Ok(count)
    }
}

#[async_trait]
impl VectorIndex for FileVectorIndex {
    async fn add(&self, fragments: Vec<Fragment>) -> RagResult<usize> {
        if fragments.is_empty() {
            return Ok(0);
        }
        let prepared = self.inner.prepare(fragments).await?;
        self.write_batch(prepared).await
    }

    async fn add_embedded(&self, items: Vec<(Fragment, Vec<f32>)>) -> RagResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let prepared = self.inner.attach(items)?;
        self.write_batch(prepared).await
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> RagResult<Vec<MatchResult>> {
        self.inner.search(query_embedding, k, filter).await
    }

    async fn delete_by_source(&self, source: &str) -> RagResult<usize> {
        let mut state = self.inner.state.write().await;
        let removed = state.count_source(source);
        if removed == 0 {
            return Ok(0);
        }

        let data = render_lines(state.iter().filter(|e| e.fragment.source != source))?;
        replace_file(&self.path, data).await?;
        state.delete_by_source(source);
        debug!(source, removed, "Deleted fragments by source");
        Ok(removed)
    }

    async fn clear(&self) -> RagResult<()> {
        let mut state = self.inner.state.write().await;
        replace_file(&self.path, String::new()).await?;
        state.clear();
        Ok(())
    }

    async fn stats(&self) -> RagResult<IndexStats> {
        self.inner.stats().await
    }

    async fn sources(&self) -> RagResult<Vec<String>> {
        self.inner.sources().await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension
    }
}

fn render_lines<'a>(entries: impl Iterator<Item = &'a IndexedFragment>) -> RagResult<String> {
    let mut data = String::new();
    for entry in entries {
        let line = serde_json::to_string(entry)
            .map_err(|e| RagError::Storage(format!("Failed to serialize entry: {e}")))?;
        data.push_str(&line);
        data.push('\n');
    }
    Ok(data)
}

async fn append_to_file(path: &Path, data: String) -> RagResult<()> {
    use tokio::io::AsyncWriteExt;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| RagError::Storage(format!("Failed to open index: {e}")))?;
    let committed_len = file
        .metadata()
        .await
        .map_err(|e| RagError::Storage(format!("Failed to stat index: {e}")))?
        .len();

    let written: std::io::Result<()> = async {
        file.write_all(data.as_bytes()).await?;
        file.flush().await
    }
    .await;

    if let Err(e) = written {
        // Cut back to the last complete batch so a reopen never sees part of this one
        if let Err(undo) = file.set_len(committed_len).await {
            warn!(path = %path.display(), error = %undo, "Failed to roll back partial append");
        }
        return Err(RagError::Storage(format!("Failed to append to index: {e}")));
    }
    Ok(())
}

/// Rewrite the whole file through a temporary sibling and a rename.
async fn replace_file(path: &Path, data: String) -> RagResult<()> {
    let tmp = path.with_extension("jsonl.tmp");
    tokio::fs::write(&tmp, data.as_bytes())
        .await
        .map_err(|e| RagError::Storage(format!("Failed to write index: {e}")))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| RagError::Storage(format!("Failed to replace index: {e}")))?;
    Ok(())
}

fn ingestion_error(err: RagError) -> RagError {
    match err {
        RagError::Configuration(_) => err,
        other => RagError::Ingestion(format!("embedding failed: {other}")),
    }
}

fn check_dimension(expected: usize, actual: usize) -> RagResult<()> {
    if expected != actual {
        return Err(RagError::Configuration(format!(
            "embedding dimension mismatch: index uses {expected}, got {actual}"
        )));
    }
    Ok(())
}

/// Cosine distance (`1 - cosine similarity`). Zero vectors are at distance 1.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Cosine similarity between two vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::embedding::LocalEmbedding;

    /// Embedding provider that looks vectors up by content.
    struct TableEmbedding {
        dimension: usize,
        fail_on: Option<String>,
    }

    impl TableEmbedding {
        fn new(dimension: usize) -> Self {
            Self {
                dimension,
                fail_on: None,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for TableEmbedding {
        async fn embed(&self, text: &str) -> RagResult<Vec<f32>> {
            if self.fail_on.as_deref() == Some(text) {
                return Err(RagError::Embedding("model unavailable".into()));
            }
            if text == "wrong-dim" {
                return Ok(vec![1.0; self.dimension + 1]);
            }
            let mut v = vec![0.0; self.dimension];
            let axis = text.bytes().next().map_or(0, |b| b as usize % self.dimension);
            v[axis] = 1.0;
            Ok(v)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }

    fn frag(content: &str, source: &str, index: usize) -> Fragment {
        Fragment::new(content, source, index, 3)
    }

    fn index() -> InMemoryVectorIndex {
        InMemoryVectorIndex::new(Arc::new(LocalEmbedding::new(64)))
    }

    #[tokio::test]
    async fn test_add_and_stats() {
        let idx = index();
        assert_eq!(idx.stats().await.unwrap().total_fragments, 0);
        let added = idx
            .add(vec![frag("rust ownership", "a.txt", 0), frag("borrow checker", "a.txt", 1)])
            .await
            .unwrap();
        assert_eq!(added, 2);
        let stats = idx.stats().await.unwrap();
        assert_eq!(stats.total_fragments, 2);
        assert_eq!(stats.embedding_dimension, 64);
    }

    #[tokio::test]
    async fn test_add_empty_batch() {
        let idx = index();
        assert_eq!(idx.add(Vec::new()).await.unwrap(), 0);
        assert_eq!(idx.add_embedded(Vec::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_same_source_and_index_overwrites() {
        let idx = index();
        idx.add(vec![frag("first version", "a.txt", 0)]).await.unwrap();
        idx.add(vec![frag("second version", "a.txt", 0)]).await.unwrap();

        assert_eq!(idx.stats().await.unwrap().total_fragments, 1);
        let q = LocalEmbedding::new(64).embed("second version").await.unwrap();
        let hits = idx.search(&q, 5, None).await.unwrap();
        assert_eq!(hits[0].fragment.content, "second version");
    }

    #[tokio::test]
    async fn test_search_orders_by_distance() {
        let idx = InMemoryVectorIndex::new(Arc::new(TableEmbedding::new(3)));
        idx.add_embedded(vec![
            (frag("far", "a", 0), vec![0.0, 0.0, 1.0]),
            (frag("close", "a", 1), vec![0.9, 0.1, 0.0]),
            (frag("exact", "a", 2), vec![1.0, 0.0, 0.0]),
        ])
        .await
        .unwrap();

        let hits = idx.search(&[1.0, 0.0, 0.0], 10, None).await.unwrap();
        let contents: Vec<&str> = hits.iter().map(|h| h.fragment.content.as_str()).collect();
        assert_eq!(contents, vec!["exact", "close", "far"]);
        assert!(hits[0].distance.abs() < 1e-6);
        assert!((hits[2].distance - 1.0).abs() < 1e-6);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let idx = InMemoryVectorIndex::new(Arc::new(TableEmbedding::new(2)));
        idx.add_embedded(vec![
            (frag("first", "a", 0), vec![1.0, 0.0]),
            (frag("second", "b", 0), vec![1.0, 0.0]),
            (frag("third", "c", 0), vec![1.0, 0.0]),
        ])
        .await
        .unwrap();
        // Overwrite keeps the slot of the original insertion
        idx.add_embedded(vec![(frag("first again", "a", 0), vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = idx.search(&[1.0, 0.0], 3, None).await.unwrap();
        let contents: Vec<&str> = hits.iter().map(|h| h.fragment.content.as_str()).collect();
        assert_eq!(contents, vec!["first again", "second", "third"]);
    }

    #[tokio::test]
    async fn test_search_k_limits_and_zero() {
        let idx = InMemoryVectorIndex::new(Arc::new(TableEmbedding::new(3)));
        for i in 0..10 {
            let mut emb = vec![0.0f32; 3];
            emb[i % 3] = 1.0;
            idx.add_embedded(vec![(frag(&format!("entry_{i}"), "s", i), emb)])
                .await
                .unwrap();
        }
        assert_eq!(idx.search(&[1.0, 0.0, 0.0], 3, None).await.unwrap().len(), 3);
        assert_eq!(idx.search(&[1.0, 0.0, 0.0], 50, None).await.unwrap().len(), 10);
        assert!(idx.search(&[1.0, 0.0, 0.0], 0, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_with_filter() {
        let idx = InMemoryVectorIndex::new(Arc::new(TableEmbedding::new(2)));
        idx.add_embedded(vec![
            (frag("a0", "a.txt", 0), vec![1.0, 0.0]),
            (frag("b0", "b.txt", 0), vec![1.0, 0.0]),
            (frag("a1", "a.txt", 1), vec![0.0, 1.0]),
        ])
        .await
        .unwrap();

        let filter = MetadataFilter::source("a.txt");
        let hits = idx.search(&[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.fragment.source == "a.txt"));

        let none = MetadataFilter::source("missing.txt");
        assert!(idx.search(&[1.0, 0.0], 10, Some(&none)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_empty_index() {
        let idx = index();
        assert!(idx.search(&[0.5; 64], 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_dimension_mismatch() {
        let idx = index();
        let err = idx.search(&[1.0, 0.0], 5, None).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_batch() {
        let provider = TableEmbedding {
            dimension: 4,
            fail_on: Some("boom".into()),
        };
        let idx = InMemoryVectorIndex::new(Arc::new(provider));
        let err = idx
            .add(vec![frag("fine", "a", 0), frag("boom", "a", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Ingestion(_)));
        assert_eq!(idx.stats().await.unwrap().total_fragments, 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_aborts_batch() {
        let idx = InMemoryVectorIndex::new(Arc::new(TableEmbedding::new(4)));
        let err = idx
            .add(vec![frag("fine", "a", 0), frag("wrong-dim", "a", 1)])
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(idx.stats().await.unwrap().total_fragments, 0);

        let err = idx
            .add_embedded(vec![(frag("x", "a", 0), vec![1.0; 3])])
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_delete_by_source() {
        let idx = index();
        idx.add(vec![frag("alpha one", "a.txt", 0), frag("alpha two", "a.txt", 1)])
            .await
            .unwrap();
        idx.add(vec![frag("beta one", "b.txt", 0)]).await.unwrap();

        assert_eq!(idx.delete_by_source("a.txt").await.unwrap(), 2);
        assert_eq!(idx.delete_by_source("a.txt").await.unwrap(), 0);
        assert_eq!(idx.delete_by_source("nope").await.unwrap(), 0);
        assert_eq!(idx.sources().await.unwrap(), vec!["b.txt".to_string()]);
        assert_eq!(idx.stats().await.unwrap().total_fragments, 1);
    }

    #[tokio::test]
    async fn test_reinsert_after_delete_gets_new_slot() {
        let idx = InMemoryVectorIndex::new(Arc::new(TableEmbedding::new(2)));
        idx.add_embedded(vec![
            (frag("a", "a", 0), vec![1.0, 0.0]),
            (frag("b", "b", 0), vec![1.0, 0.0]),
        ])
        .await
        .unwrap();
        idx.delete_by_source("a").await.unwrap();
        idx.add_embedded(vec![(frag("a", "a", 0), vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = idx.search(&[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits[0].fragment.source, "b");
        assert_eq!(hits[1].fragment.source, "a");
    }

    #[tokio::test]
    async fn test_clear_and_reuse() {
        let idx = index();
        idx.add(vec![frag("some text", "a.txt", 0)]).await.unwrap();
        idx.clear().await.unwrap();
        assert_eq!(idx.stats().await.unwrap().total_fragments, 0);
        assert!(idx.sources().await.unwrap().is_empty());

        idx.add(vec![frag("more text", "c.txt", 0)]).await.unwrap();
        assert_eq!(idx.sources().await.unwrap(), vec!["c.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_sources_sorted_and_deduplicated() {
        let idx = index();
        idx.add(vec![
            frag("zulu text", "z.md", 0),
            frag("alpha text", "a.md", 0),
            frag("alpha more", "a.md", 1),
        ])
        .await
        .unwrap();
        assert_eq!(
            idx.sources().await.unwrap(),
            vec!["a.md".to_string(), "z.md".to_string()]
        );
    }

    #[test]
    fn test_cosine_distance_identical() {
        let v = vec![1.0, 0.0, 0.0];
        assert!(cosine_distance(&v, &v).abs() < 0.001);
    }

    #[test]
    fn test_cosine_distance_orthogonal() {
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_distance_opposite() {
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 0.001);
    }

    // --- FileVectorIndex tests ---

    #[tokio::test]
    async fn test_file_index_persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.jsonl");
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(LocalEmbedding::new(32));

        {
            let idx = FileVectorIndex::open(path.clone(), embedder.clone()).await.unwrap();
            idx.add(vec![frag("hello world", "a.txt", 0), frag("goodbye", "b.txt", 0)])
                .await
                .unwrap();
        }

        let reopened = FileVectorIndex::open(path, embedder.clone()).await.unwrap();
        assert_eq!(reopened.stats().await.unwrap().total_fragments, 2);
        let q = embedder.embed("hello world").await.unwrap();
        let hits = reopened.search(&q, 1, None).await.unwrap();
        assert_eq!(hits[0].fragment.content, "hello world");
    }

    #[tokio::test]
    async fn test_file_index_overwrite_rewrites_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.jsonl");
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(LocalEmbedding::new(32));

        let idx = FileVectorIndex::open(path.clone(), embedder.clone()).await.unwrap();
        idx.add(vec![frag("old text", "a.txt", 0)]).await.unwrap();
        idx.add(vec![frag("new text", "a.txt", 0)]).await.unwrap();

        let data = std::fs::read_to_string(&path).unwrap();
        assert_eq!(data.lines().count(), 1);
        assert!(data.contains("new text"));
    }

    #[tokio::test]
    async fn test_file_index_delete_and_clear() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("index.jsonl");
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(LocalEmbedding::new(32));

        let idx = FileVectorIndex::open(path.clone(), embedder.clone()).await.unwrap();
        idx.add(vec![frag("keep me", "keep.txt", 0), frag("drop me", "drop.txt", 0)])
            .await
            .unwrap();
        assert_eq!(idx.delete_by_source("drop.txt").await.unwrap(), 1);

        let reopened = FileVectorIndex::open(path.clone(), embedder.clone()).await.unwrap();
        assert_eq!(reopened.sources().await.unwrap(), vec!["keep.txt".to_string()]);

        reopened.clear().await.unwrap();
        let again = FileVectorIndex::open(path, embedder).await.unwrap();
        assert_eq!(again.stats().await.unwrap().total_fragments, 0);
    }

    #[tokio::test]
    async fn test_file_index_rejects_dimension_change() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.jsonl");

        let idx = FileVectorIndex::open(path.clone(), Arc::new(LocalEmbedding::new(32)))
            .await
            .unwrap();
        idx.add(vec![frag("some words", "a.txt", 0)]).await.unwrap();

        let err = FileVectorIndex::open(path, Arc::new(LocalEmbedding::new(64)))
            .await
            .err()
            .unwrap();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_file_index_drops_torn_last_line() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.jsonl");
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(LocalEmbedding::new(16));

        {
            let idx = FileVectorIndex::open(path.clone(), embedder.clone()).await.unwrap();
            idx.add(vec![frag("intact entry", "a.txt", 0)]).await.unwrap();
        }
        // A batch append cut off halfway through its line
        let mut data = std::fs::read_to_string(&path).unwrap();
        data.push_str(r#"{"id":"frag-0","content":"half wri"#);
        std::fs::write(&path, &data).unwrap();

        let idx = FileVectorIndex::open(path.clone(), embedder.clone()).await.unwrap();
        assert_eq!(idx.sources().await.unwrap(), vec!["a.txt".to_string()]);
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk.lines().count(), 1);
        assert!(on_disk.ends_with('\n'));

        // Appends after recovery start on a fresh line
        idx.add(vec![frag("later entry", "b.txt", 0)]).await.unwrap();
        let reopened = FileVectorIndex::open(path, embedder).await.unwrap();
        assert_eq!(reopened.stats().await.unwrap().total_fragments, 2);
    }

    #[tokio::test]
    async fn test_file_index_unterminated_valid_line_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.jsonl");
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(LocalEmbedding::new(16));

        {
            let idx = FileVectorIndex::open(path.clone(), embedder.clone()).await.unwrap();
            idx.add(vec![frag("only entry", "a.txt", 0)]).await.unwrap();
        }
        let data = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, data.trim_end()).unwrap();

        let idx = FileVectorIndex::open(path.clone(), embedder.clone()).await.unwrap();
        assert_eq!(idx.stats().await.unwrap().total_fragments, 1);
        idx.add(vec![frag("second entry", "b.txt", 0)]).await.unwrap();

        let reopened = FileVectorIndex::open(path, embedder).await.unwrap();
        assert_eq!(
            reopened.sources().await.unwrap(),
            vec!["a.txt".to_string(), "b.txt".to_string()]
        );
    }

    #[tokio::test]
    async fn test_file_index_corrupt_line() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();

        let err = FileVectorIndex::open(path, Arc::new(LocalEmbedding::new(8)))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RagError::Storage(_)));
    }
}
