//! Exhaustive cosine-similarity index over chunk vectors, persisted as JSON.
//!
//! An index directory holds two files: `entries.json` with every
//! (chunk, vector) pair in chunk order, and `manifest.json` describing the
//! build (embedding model, dimensions, SHA-256 of the entries file). Saving
//! always replaces the whole directory.

use crate::error::IndexError;
use crate::models::RetrievedChunk;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

const ENTRIES_FILE: &str = "entries.json";
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub text: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub index_id: Uuid,
    pub embedding_model: String,
    pub dimensions: usize,
    pub entry_count: usize,
    pub built_at: DateTime<Utc>,
    pub checksum: String,
}

#[derive(Debug, Clone)]
pub struct FlatIndex {
    index_id: Uuid,
    embedding_model: String,
    dimensions: usize,
    built_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl FlatIndex {
    /// Pairs `chunks[i]` with `vectors[i]`. All vectors must share one non-zero
    /// dimension.
    pub fn build(
        chunks: Vec<String>,
        vectors: Vec<Vec<f32>>,
        embedding_model: impl Into<String>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        let dimensions = match vectors.first() {
            Some(first) => first.len(),
            None => return Err(IndexError::Empty),
        };

        if dimensions == 0 {
            return Err(IndexError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(text, vector)| {
                if vector.len() != dimensions {
                    return Err(IndexError::DimensionMismatch {
                        expected: dimensions,
                        actual: vector.len(),
                    });
                }
                Ok(IndexEntry { text, vector })
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        Ok(Self {
            index_id: Uuid::new_v4(),
            embedding_model: embedding_model.into(),
            dimensions,
            built_at: Utc::now(),
            entries,
        })
    }

    pub fn id(&self) -> Uuid {
        self.index_id
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// The `k` entries most similar to `query_vector`, best first. Equal
    /// scores keep chunk order.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, IndexError> {
        if query_vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query_vector.len(),
            });
        }

        let mut scored = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, cosine_similarity(query_vector, &entry.vector)))
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| match right.1.total_cmp(&left.1) {
            Ordering::Equal => left.0.cmp(&right.0),
            other => other,
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(position, score)| RetrievedChunk {
                position,
                text: self.entries[position].text.clone(),
                score,
            })
            .collect())
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}

/// The one fixed on-disk location of the index.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.join(MANIFEST_FILE).is_file()
    }

    /// Writes `index` to a fresh sibling directory, then swaps it in place of
    /// whatever index was there before.
    pub fn save(&self, index: &FlatIndex) -> Result<IndexManifest, IndexError> {
        let entries = serde_json::to_vec(&index.entries)?;
        let manifest = IndexManifest {
            index_id: index.index_id,
            embedding_model: index.embedding_model.clone(),
            dimensions: index.dimensions,
            entry_count: index.entries.len(),
            built_at: index.built_at,
            checksum: digest_bytes(&entries),
        };

        if let Some(parent) = self.dir.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let staging = self.sibling_dir("staging");
        self.stage_and_swap(&staging, &entries, &manifest)?;

        info!(
            path = %self.dir.display(),
            index_id = %manifest.index_id,
            entries = manifest.entry_count,
            "saved index"
        );
        Ok(manifest)
    }

    /// Deserializes the persisted index.
    ///
    /// Only call this for an index you built yourself or have otherwise
    /// decided to trust; the entries file is checked against the manifest
    /// checksum, which detects damage but not a forged manifest.
    pub fn load_trusted(&self, expected_embedding_model: &str) -> Result<FlatIndex, IndexError> {
        if !self.exists() {
            return Err(IndexError::NotFound(self.dir.display().to_string()));
        }

        let manifest: IndexManifest =
            serde_json::from_slice(&fs::read(self.dir.join(MANIFEST_FILE))?).map_err(|error| {
                self.corrupt(format!("unreadable manifest: {error}"))
            })?;

        if manifest.embedding_model != expected_embedding_model {
            return Err(IndexError::EmbeddingMismatch {
                expected: expected_embedding_model.to_string(),
                found: manifest.embedding_model,
            });
        }

        let raw_entries = fs::read(self.dir.join(ENTRIES_FILE))?;
        if digest_bytes(&raw_entries) != manifest.checksum {
            return Err(self.corrupt("entries do not match manifest checksum".to_string()));
        }

        let entries: Vec<IndexEntry> = serde_json::from_slice(&raw_entries)?;
        if entries.len() != manifest.entry_count {
            return Err(self.corrupt(format!(
                "manifest lists {} entries, found {}",
                manifest.entry_count,
                entries.len()
            )));
        }
        if let Some(entry) = entries
            .iter()
            .find(|entry| entry.vector.len() != manifest.dimensions)
        {
            return Err(IndexError::DimensionMismatch {
                expected: manifest.dimensions,
                actual: entry.vector.len(),
            });
        }

        debug!(
            path = %self.dir.display(),
            index_id = %manifest.index_id,
            entries = entries.len(),
            "loaded index"
        );

        Ok(FlatIndex {
            index_id: manifest.index_id,
            embedding_model: manifest.embedding_model,
            dimensions: manifest.dimensions,
            built_at: manifest.built_at,
            entries,
        })
    }

    /// Writes both files into `staging` and moves it into place. On any error
    /// `staging` is removed and the previous index, if any, is left as it was.
    fn stage_and_swap(
        &self,
        staging: &Path,
        entries: &[u8],
        manifest: &IndexManifest,
    ) -> Result<(), IndexError> {
        let result = write_index_files(staging, entries, manifest)
            .and_then(|()| self.swap_in(staging));
        if result.is_err() {
            discard(staging);
        }
        result
    }

    /// Moves the current index aside, renames `staging` into its place and
    /// only then deletes the old copy. A failed rename puts the old one back.
    fn swap_in(&self, staging: &Path) -> Result<(), IndexError> {
        let retired = if self.dir.exists() {
            let retired = self.sibling_dir("retired");
            fs::rename(&self.dir, &retired)?;
            Some(retired)
        } else {
            None
        };

        if let Err(error) = fs::rename(staging, &self.dir) {
            if let Some(retired) = &retired {
                if let Err(restore) = fs::rename(retired, &self.dir) {
                    warn!(
                        path = %retired.display(),
                        error = %restore,
                        "could not restore previous index"
                    );
                }
            }
            return Err(error.into());
        }

        if let Some(retired) = retired {
            discard(&retired);
        }
        Ok(())
    }

    fn sibling_dir(&self, purpose: &str) -> PathBuf {
        let name = self
            .dir
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "index".to_string());
        self.dir
            .with_file_name(format!(".{name}.{purpose}-{}", Uuid::new_v4()))
    }

    fn corrupt(&self, details: String) -> IndexError {
        IndexError::Corrupt {
            path: self.dir.display().to_string(),
            details,
        }
    }
}

fn write_index_files(
    dir: &Path,
    entries: &[u8],
    manifest: &IndexManifest,
) -> Result<(), IndexError> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(ENTRIES_FILE), entries)?;
    fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(manifest)?)?;
    Ok(())
}

fn discard(dir: &Path) {
    if dir.exists() {
        if let Err(error) = fs::remove_dir_all(dir) {
            warn!(path = %dir.display(), %error, "could not remove index directory");
        }
    }
}

fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn abc_index() -> FlatIndex {
        FlatIndex::build(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]],
            "test-model",
        )
        .unwrap()
    }

    #[test]
    fn nearest_vector_is_ranked_first() {
        let index = abc_index();
        let hits = index.search(&[0.1, 0.9, 0.2], 3).unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].text, "b");
        assert_eq!(hits[0].position, 1);
        assert!(hits[0].score >= hits[1].score);
        assert!(hits[1].score >= hits[2].score);
    }

    #[test]
    fn search_returns_at_most_k() {
        let index = abc_index();
        assert_eq!(index.search(&[1.0, 1.0, 1.0], 2).unwrap().len(), 2);
        assert_eq!(index.search(&[1.0, 1.0, 1.0], 10).unwrap().len(), 3);
    }

    #[test]
    fn ties_keep_chunk_order() {
        let index = abc_index();
        let hits = index.search(&[1.0, 1.0, 1.0], 3).unwrap();
        let positions = hits.iter().map(|hit| hit.position).collect::<Vec<_>>();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn build_rejects_mismatched_inputs() {
        let result = FlatIndex::build(vec!["a".to_string()], vec![], "m");
        assert!(matches!(result, Err(IndexError::LengthMismatch { .. })));

        let result = FlatIndex::build(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![1.0, 0.0], vec![1.0]],
            "m",
        );
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));

        let result = FlatIndex::build(vec![], vec![], "m");
        assert!(matches!(result, Err(IndexError::Empty)));
    }

    #[test]
    fn query_dimension_must_match() {
        let index = abc_index();
        assert!(matches!(
            index.search(&[1.0, 0.0], 4),
            Err(IndexError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn save_then_load_keeps_entries() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("pdf_index"));
        let index = abc_index();

        let manifest = store.save(&index)?;
        let loaded = store.load_trusted("test-model")?;

        assert_eq!(manifest.entry_count, 3);
        assert_eq!(loaded.id(), index.id());
        assert_eq!(loaded.entries(), index.entries());
        Ok(())
    }

    #[test]
    fn loading_missing_index_is_not_found() {
        let dir = tempdir().unwrap();
        let store = IndexStore::new(dir.path().join("missing"));
        assert!(matches!(
            store.load_trusted("test-model"),
            Err(IndexError::NotFound(_))
        ));
    }

    #[test]
    fn save_replaces_previous_index() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("pdf_index"));
        store.save(&abc_index())?;

        let replacement = FlatIndex::build(vec!["z".to_string()], vec![vec![0.0, 1.0, 0.0]], "test-model")?;
        store.save(&replacement)?;

        let loaded = store.load_trusted("test-model")?;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.entries()[0].text, "z");

        let leftovers = fs::read_dir(dir.path())?.count();
        assert_eq!(leftovers, 1);
        Ok(())
    }

    #[test]
    fn failed_write_cleans_up_staging() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("pdf_index"));
        let original = store.save(&abc_index())?;

        // A directory where the manifest file should go makes the write fail.
        let staging = dir.path().join(".pdf_index.staging-test");
        fs::create_dir_all(staging.join(MANIFEST_FILE))?;

        let replacement = FlatIndex::build(vec!["z".to_string()], vec![vec![0.0, 1.0, 0.0]], "test-model")?;
        let entries = serde_json::to_vec(replacement.entries())?;
        let manifest = IndexManifest {
            index_id: replacement.id(),
            embedding_model: "test-model".to_string(),
            dimensions: 3,
            entry_count: 1,
            built_at: replacement.built_at(),
            checksum: digest_bytes(&entries),
        };

        assert!(store.stage_and_swap(&staging, &entries, &manifest).is_err());
        assert!(!staging.exists());
        assert_eq!(store.load_trusted("test-model")?.id(), original.index_id);
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn failed_swap_restores_previous_index() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("pdf_index"));
        let original = store.save(&abc_index())?;

        let missing = dir.path().join(".pdf_index.staging-missing");
        assert!(matches!(store.swap_in(&missing), Err(IndexError::Io(_))));

        let loaded = store.load_trusted("test-model")?;
        assert_eq!(loaded.id(), original.index_id);
        assert_eq!(loaded.len(), 3);
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn tampered_entries_fail_checksum() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("pdf_index"));
        store.save(&abc_index())?;

        let tampered = serde_json::to_vec(&vec![IndexEntry {
            text: "injected".to_string(),
            vector: vec![0.0, 1.0, 0.0],
        }])?;
        fs::write(store.dir().join(ENTRIES_FILE), tampered)?;

        assert!(matches!(
            store.load_trusted("test-model"),
            Err(IndexError::Corrupt { .. })
        ));
        Ok(())
    }

    #[test]
    fn different_embedding_model_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = IndexStore::new(dir.path().join("pdf_index"));
        store.save(&abc_index())?;

        assert!(matches!(
            store.load_trusted("other-model"),
            Err(IndexError::EmbeddingMismatch { .. })
        ));
        Ok(())
    }
}
