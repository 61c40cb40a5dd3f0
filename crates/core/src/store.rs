use crate::error::StoreError;
use crate::models::{ChunkRecord, IndexManifest, ScoredChunk};
use crate::traits::VectorStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::warn;

#[derive(Serialize, Deserialize)]
struct CollectionFile {
    manifest: IndexManifest,
    records: Vec<ChunkRecord>,
}

/// A named collection persisted as one JSON file under a directory and
/// searched exhaustively in memory.
#[derive(Debug)]
pub struct FlatCollection {
    manifest: IndexManifest,
    records: Vec<ChunkRecord>,
}

impl FlatCollection {
    pub fn collection_file(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.json"))
    }

    pub fn exists(dir: &Path, name: &str) -> bool {
        Self::collection_file(dir, name).is_file()
    }

    /// Persists the records atomically: readers see the whole collection or none.
    pub fn create(
        dir: &Path,
        manifest: IndexManifest,
        records: Vec<ChunkRecord>,
    ) -> Result<Self, StoreError> {
        for record in &records {
            if record.embedding.len() != manifest.dimensions {
                return Err(StoreError::DimensionMismatch {
                    expected: manifest.dimensions,
                    actual: record.embedding.len(),
                });
            }
        }

        fs::create_dir_all(dir)?;
        let target = Self::collection_file(dir, &manifest.collection);
        let staging = target.with_extension("json.tmp");

        let file = CollectionFile { manifest, records };
        let written = (|| {
            let mut writer = BufWriter::new(fs::File::create(&staging)?);
            serde_json::to_writer(&mut writer, &file)?;
            writer.flush()?;
            fs::rename(&staging, &target)?;
            Ok::<_, StoreError>(())
        })();

        if let Err(error) = written {
            let _ = fs::remove_file(&staging);
            return Err(error);
        }

        Ok(Self {
            manifest: file.manifest,
            records: file.records,
        })
    }

    pub fn open(dir: &Path, name: &str) -> Result<Self, StoreError> {
        let reader = BufReader::new(fs::File::open(Self::collection_file(dir, name))?);
        let file: CollectionFile = serde_json::from_reader(reader)?;
        Ok(Self {
            manifest: file.manifest,
            records: file.records,
        })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.chunk.id.as_str())
    }
}

#[async_trait]
impl VectorStore for FlatCollection {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn dimensions(&self) -> usize {
        self.manifest.dimensions
    }

    async fn similarity_search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if query_vector.len() != self.manifest.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.manifest.dimensions,
                actual: query_vector.len(),
            });
        }

        let mut scored = self
            .records
            .iter()
            .map(|record| (cosine_similarity(query_vector, &record.embedding), record))
            .collect::<Vec<_>>();

        // stable: equal scores keep insertion order
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, record)| ScoredChunk {
                chunk: record.chunk.clone(),
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

/// Advisory lock held while a collection is being built. Removed on drop.
/// The file holds the builder's pid; a lock whose pid is no longer running
/// was left by a killed build and is taken over.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    pub fn acquire(dir: &Path, name: &str) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{name}.lock"));

        if let Some(lock) = Self::try_create(&path)? {
            return Ok(lock);
        }

        if Self::is_stale(&path) {
            warn!(path = %path.display(), "removing stale build lock");
            match fs::remove_file(&path) {
                Err(error) if error.kind() != ErrorKind::NotFound => return Err(error.into()),
                _ => {}
            }
            if let Some(lock) = Self::try_create(&path)? {
                return Ok(lock);
            }
        }

        Err(StoreError::Locked {
            collection: name.to_string(),
            path,
        })
    }

    /// `None` when the lock file already exists.
    fn try_create(path: &Path) -> Result<Option<Self>, StoreError> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let lock = Self {
                    path: path.to_path_buf(),
                };
                writeln!(file, "{}", std::process::id())?;
                Ok(Some(lock))
            }
            Err(error) if error.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(error) => Err(StoreError::Io(error)),
        }
    }

    /// True when the lock names a pid that is not running. A lock without a
    /// readable pid may be mid-write and counts as held.
    fn is_stale(path: &Path) -> bool {
        let Some(pid) = fs::read_to_string(path)
            .ok()
            .and_then(|contents| contents.trim().parse::<u32>().ok())
        else {
            return false;
        };

        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing(),
        );
        system.process(pid).is_none()
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), %error, "failed to remove build lock");
        }
    }
}
