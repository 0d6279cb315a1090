use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use mycelium_core::{ContentStore, MyceliumError, Result};
use tracing::debug;

/// Filesystem-backed store. Relative locators resolve against `root` when set.
#[derive(Debug, Clone, Default)]
pub struct FsContentStore {
    root: Option<PathBuf>,
}

impl FsContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn resolve(&self, locator: &str) -> PathBuf {
        let path = Path::new(locator);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn read(&self, locator: &str) -> Result<Vec<u8>> {
        let path = self.resolve(locator);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(MyceliumError::read(locator, "no such file"))
            }
            Err(e) => Err(MyceliumError::read(locator, e)),
        }
    }

    async fn write(&self, locator: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(locator);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MyceliumError::write(locator, e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| MyceliumError::write(locator, e))?;
        debug!(locator, bytes = bytes.len(), "wrote artifact content");
        Ok(())
    }
}

/// In-memory store keyed by locator, for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<L: Into<String>, B: Into<Vec<u8>>>(&self, locator: L, bytes: B) {
        self.entries.insert(locator.into(), bytes.into());
    }

    pub fn get(&self, locator: &str) -> Option<Vec<u8>> {
        self.entries.get(locator).map(|e| e.value().clone())
    }

    pub fn get_string(&self, locator: &str) -> Option<String> {
        self.get(locator)
            .and_then(|b| String::from_utf8(b).ok())
    }

    pub fn remove(&self, locator: &str) -> Option<Vec<u8>> {
        self.entries.remove(locator).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn read(&self, locator: &str) -> Result<Vec<u8>> {
        self.get(locator)
            .ok_or_else(|| MyceliumError::read(locator, "no such entry"))
    }

    async fn write(&self, locator: &str, bytes: &[u8]) -> Result<()> {
        self.insert(locator, bytes);
        Ok(())
    }
}
