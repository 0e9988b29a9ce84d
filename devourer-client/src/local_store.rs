//! Offline persistence: the whole task collection as one JSON file.

use devourer_core::{StoreError, StoreResult, Task};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every task from the file. A missing file is an empty collection;
    /// a file that does not parse is an error, never a partial result.
    pub async fn load_all(&self) -> StoreResult<Vec<Task>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_tasks(&path))
            .await
            .map_err(|e| StoreError::Background(e.to_string()))?
    }

    /// Overwrite the file with `tasks`. The data goes to a sibling temp file
    /// first and is renamed over the target, so readers never see a torn file.
    pub async fn save_all(&self, tasks: &[Task]) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(tasks)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| StoreError::Background(e.to_string()))?
    }
}

fn read_tasks(path: &Path) -> StoreResult<Vec<Task>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("No task file at {}, starting empty", path.display());
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let tasks: Vec<Task> = serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("Read {} tasks from {}", tasks.len(), path.display());
    Ok(tasks)
}

fn write_atomic(path: &Path, contents: &[u8]) -> StoreResult<()> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(contents).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
