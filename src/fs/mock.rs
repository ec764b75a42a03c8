// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

#[derive(Debug, Clone)]
struct MockFile {
    content: Vec<u8>,
    modified: SystemTime,
}

/// In-memory filesystem. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockFile>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.add_file_modified(path, content, SystemTime::now());
    }

    /// Add a file with an explicit modification time (for staleness tests).
    pub fn add_file_modified(
        &self,
        path: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
        modified: SystemTime,
    ) {
        self.entries().insert(
            normalise(path.as_ref()),
            MockFile {
                content: content.into(),
                modified,
            },
        );
    }

    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        self.entries().remove(&normalise(path.as_ref())).is_some()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, MockFile>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn normalise(path: &Path) -> PathBuf {
    path.strip_prefix("./").unwrap_or(path).to_path_buf()
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        match self.entries().get(&normalise(path)) {
            Some(file) => {
                String::from_utf8(file.content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.entries().contains_key(&normalise(path))
    }

    fn is_file(&self, path: &Path) -> bool {
        self.exists(path)
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        self.entries()
            .get(&normalise(path))
            .map(|f| f.modified)
            .ok_or_else(|| anyhow!("File not found: {:?}", path))
    }
}
