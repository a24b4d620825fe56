use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::models::{Category, EmbeddingRecord};

/// On-disk snapshot layout. The embedder identity is part of the
/// persisted metadata so a store can refuse to serve queries embedded
/// with a different model.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    dimensions: usize,
    embedder_model: String,
    records: Vec<EmbeddingRecord>,
}

/// Persistent vector index: an in-memory record list behind a read-write
/// lock, snapshotted to disk after every mutation.
///
/// Records stay in insertion order so equal-score query results are
/// deterministic. Mutations for one `source_id` replace that source's
/// records in a single critical section; readers observe either the
/// full old set or the full new set, never a partial replacement.
pub struct VectorStore {
    path: PathBuf,
    dimensions: usize,
    embedder_model: String,
    records: RwLock<Vec<EmbeddingRecord>>,
    write_gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    persist_gate: Mutex<()>,
}

impl VectorStore {
    /// Opens the store at `path`, loading the snapshot when present.
    ///
    /// Fails fast with `DimensionMismatch`/`ModelMismatch` when the
    /// snapshot disagrees with the configured embedder, since querying
    /// across embedding spaces silently degrades relevance.
    pub async fn open(
        path: impl Into<PathBuf>,
        dimensions: usize,
        embedder_model: &str,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                if snapshot.dimensions != dimensions {
                    return Err(StoreError::DimensionMismatch {
                        expected: dimensions,
                        actual: snapshot.dimensions,
                    });
                }
                if snapshot.embedder_model != embedder_model {
                    return Err(StoreError::ModelMismatch {
                        stored: snapshot.embedder_model,
                        configured: embedder_model.to_string(),
                    });
                }
                snapshot.records
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(error) => return Err(error.into()),
        };

        Ok(Self {
            path,
            dimensions,
            embedder_model: embedder_model.to_string(),
            records: RwLock::new(records),
            write_gates: Mutex::new(HashMap::new()),
            persist_gate: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embedder_model(&self) -> &str {
        &self.embedder_model
    }

    pub fn len(&self) -> usize {
        self.read_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_records().is_empty()
    }

    /// Atomically replaces every record previously associated with
    /// `source_id`. All vectors are validated before anything is
    /// touched, so a mismatched insert leaves no partial write.
    /// Upserts for the same source are serialized; the last writer wins.
    pub async fn upsert(
        &self,
        source_id: &str,
        records: Vec<EmbeddingRecord>,
    ) -> Result<(), StoreError> {
        for record in &records {
            if record.vector.len() != self.dimensions {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: record.vector.len(),
                });
            }
        }

        let gate = self.write_gate(source_id).await;
        let _held = gate.lock().await;
        {
            let mut all = self
                .records
                .write()
                .expect("vector store lock poisoned");
            all.retain(|record| record.source_id != source_id);
            all.extend(records);
        }
        self.persist().await
    }

    /// Removes all records for a source. Deleting an absent source is a
    /// no-op, not an error.
    pub async fn delete(&self, source_id: &str) -> Result<(), StoreError> {
        let gate = self.write_gate(source_id).await;
        let _held = gate.lock().await;
        {
            let mut all = self
                .records
                .write()
                .expect("vector store lock poisoned");
            all.retain(|record| record.source_id != source_id);
        }
        self.persist().await
    }

    /// Returns the `k` nearest records by cosine similarity, scored in
    /// [0, 1]. Ties keep insertion order.
    pub fn query(
        &self,
        vector: &[f32],
        k: usize,
        category: Option<Category>,
    ) -> Result<Vec<(EmbeddingRecord, f32)>, StoreError> {
        if vector.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }

        let records = self.read_records();
        let mut scored: Vec<(EmbeddingRecord, f32)> = records
            .iter()
            .filter(|record| category.map_or(true, |wanted| record.category == wanted))
            .map(|record| (record.clone(), cosine_score(vector, &record.vector)))
            .collect();

        // Stable sort: insertion order breaks score ties.
        scored.sort_by(|left, right| {
            right
                .1
                .partial_cmp(&left.1)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    fn read_records(&self) -> std::sync::RwLockReadGuard<'_, Vec<EmbeddingRecord>> {
        self.records.read().expect("vector store lock poisoned")
    }

    async fn write_gate(&self, source_id: &str) -> Arc<Mutex<()>> {
        let mut gates = self.write_gates.lock().await;
        Arc::clone(gates.entry(source_id.to_string()).or_default())
    }

    async fn persist(&self) -> Result<(), StoreError> {
        // Temp file + rename keeps the snapshot readable after a crash
        // mid-write; the gate keeps concurrent persists ordered and off
        // one temp file. The record clone happens under the gate so a
        // later persist can never write an older state.
        let _held = self.persist_gate.lock().await;
        let snapshot = Snapshot {
            dimensions: self.dimensions,
            embedder_model: self.embedder_model.clone(),
            records: self.read_records().clone(),
        };
        let bytes = serde_json::to_vec(&snapshot)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, &bytes).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

/// Cosine similarity clamped into [0, 1].
pub fn cosine_score(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        (dot / (mag_a * mag_b)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn record(chunk_id: &str, source_id: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            chunk_id: chunk_id.to_string(),
            vector,
            text: format!("text for {chunk_id}"),
            category: Category::Licensing,
            source_id: source_id.to_string(),
        }
    }

    async fn empty_store(dir: &tempfile::TempDir) -> VectorStore {
        VectorStore::open(dir.path().join("index.json"), 3, "char-trigram-3")
            .await
            .expect("store opens")
    }

    #[tokio::test]
    async fn upsert_replaces_the_whole_source() {
        let dir = tempdir().expect("tempdir");
        let store = empty_store(&dir).await;

        store
            .upsert(
                "dol-wage-page",
                vec![
                    record("c0", "dol-wage-page", vec![1.0, 0.0, 0.0]),
                    record("c1", "dol-wage-page", vec![0.0, 1.0, 0.0]),
                    record("c2", "dol-wage-page", vec![0.0, 0.0, 1.0]),
                ],
            )
            .await
            .expect("first upsert");

        store
            .upsert(
                "dol-wage-page",
                vec![record("c0", "dol-wage-page", vec![1.0, 0.0, 0.0])],
            )
            .await
            .expect("second upsert shrinks the source");

        let hits = store
            .query(&[1.0, 1.0, 1.0], 10, None)
            .expect("query succeeds");
        let ids: Vec<&str> = hits.iter().map(|(record, _)| record.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c0"]);
    }

    #[tokio::test]
    async fn mismatched_insert_fails_with_no_partial_write() {
        let dir = tempdir().expect("tempdir");
        let store = empty_store(&dir).await;

        let result = store
            .upsert(
                "doc",
                vec![
                    record("good", "doc", vec![1.0, 0.0, 0.0]),
                    record("bad", "doc", vec![1.0, 0.0]),
                ],
            )
            .await;

        assert!(matches!(
            result,
            Err(StoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn query_with_wrong_arity_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let store = empty_store(&dir).await;
        let result = store.query(&[1.0, 0.0], 5, None);
        assert!(matches!(result, Err(StoreError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn equal_scores_keep_insertion_order() {
        let dir = tempdir().expect("tempdir");
        let store = empty_store(&dir).await;

        store
            .upsert(
                "doc",
                vec![
                    record("first", "doc", vec![1.0, 0.0, 0.0]),
                    record("second", "doc", vec![1.0, 0.0, 0.0]),
                    record("third", "doc", vec![1.0, 0.0, 0.0]),
                ],
            )
            .await
            .expect("upsert");

        let hits = store.query(&[1.0, 0.0, 0.0], 3, None).expect("query");
        let ids: Vec<&str> = hits.iter().map(|(record, _)| record.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn category_filter_restricts_results() {
        let dir = tempdir().expect("tempdir");
        let store = empty_store(&dir).await;

        let mut wages = record("wages", "doc", vec![1.0, 0.0, 0.0]);
        wages.category = Category::Wages;
        store
            .upsert(
                "doc",
                vec![wages, record("licensing", "doc", vec![1.0, 0.0, 0.0])],
            )
            .await
            .expect("upsert");

        let hits = store
            .query(&[1.0, 0.0, 0.0], 5, Some(Category::Wages))
            .expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.chunk_id, "wages");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let store = empty_store(&dir).await;

        store
            .upsert("doc", vec![record("c0", "doc", vec![1.0, 0.0, 0.0])])
            .await
            .expect("upsert");
        store.delete("doc").await.expect("first delete");
        store.delete("doc").await.expect("second delete is a no-op");
        store.delete("never-existed").await.expect("absent source");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("index.json");

        {
            let store = VectorStore::open(&path, 3, "char-trigram-3")
                .await
                .expect("store opens");
            store
                .upsert("doc", vec![record("c0", "doc", vec![0.5, 0.5, 0.0])])
                .await
                .expect("upsert");
        }

        let reopened = VectorStore::open(&path, 3, "char-trigram-3")
            .await
            .expect("store reopens");
        assert_eq!(reopened.len(), 1);
        let hits = reopened.query(&[0.5, 0.5, 0.0], 1, None).expect("query");
        assert_eq!(hits[0].0.chunk_id, "c0");
        assert!(hits[0].1 > 0.99);
    }

    #[tokio::test]
    async fn reopening_with_a_different_model_fails_fast() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("index.json");

        {
            let store = VectorStore::open(&path, 3, "char-trigram-3")
                .await
                .expect("store opens");
            store
                .upsert("doc", vec![record("c0", "doc", vec![1.0, 0.0, 0.0])])
                .await
                .expect("upsert");
        }

        let result = VectorStore::open(&path, 3, "other-model-v2").await;
        assert!(matches!(result, Err(StoreError::ModelMismatch { .. })));
    }

    #[tokio::test]
    async fn readers_never_observe_a_partial_replacement() {
        let dir = tempdir().expect("tempdir");
        let store = Arc::new(empty_store(&dir).await);

        let large: Vec<EmbeddingRecord> = (0..4)
            .map(|index| record(&format!("v1-{index}"), "x", vec![1.0, 0.0, 0.0]))
            .collect();
        let small = vec![record("v2-0", "x", vec![0.0, 1.0, 0.0])];

        store.upsert("x", large.clone()).await.expect("seed upsert");

        let writer = {
            let store = Arc::clone(&store);
            let large = large.clone();
            let small = small.clone();
            tokio::spawn(async move {
                for round in 0..25 {
                    let next = if round % 2 == 0 {
                        small.clone()
                    } else {
                        large.clone()
                    };
                    store.upsert("x", next).await.expect("writer upsert");
                }
            })
        };

        let full_old: HashSet<String> =
            large.iter().map(|record| record.chunk_id.clone()).collect();
        let full_new: HashSet<String> =
            small.iter().map(|record| record.chunk_id.clone()).collect();

        for _ in 0..100 {
            let hits = store.query(&[1.0, 1.0, 0.0], 16, None).expect("query");
            let observed: HashSet<String> = hits
                .into_iter()
                .map(|(record, _)| record.chunk_id)
                .collect();
            assert!(
                observed == full_old || observed == full_new,
                "observed a mixed replacement: {observed:?}"
            );
            tokio::task::yield_now().await;
        }

        writer.await.expect("writer task");
    }
}
