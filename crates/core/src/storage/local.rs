use crate::storage::ObjectStore;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Writes objects as files below a root directory.
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for LocalDirStore {
    fn uri_prefix(&self) -> String {
        self.root.display().to_string()
    }

    async fn ensure_ready(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create {}", self.root.display()))
    }

    async fn put(&self, name: &str, bytes: Vec<u8>, _content_type: &str) -> anyhow::Result<String> {
        anyhow::ensure!(
            !name.split('/').any(|part| part == ".."),
            "object name must not escape the store root: {name}"
        );

        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(dir.path().join("out"));

        store.ensure_ready().await.unwrap();
        let location = store
            .put("debug/a.html", b"<p>".to_vec(), "text/html")
            .await
            .unwrap();

        assert!(location.ends_with("debug/a.html"));
        assert_eq!(std::fs::read(dir.path().join("out/debug/a.html")).unwrap(), b"<p>");
    }

    #[tokio::test]
    async fn put_rejects_parent_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDirStore::new(dir.path());
        assert!(store.put("../x.json", Vec::new(), "application/json").await.is_err());
    }
}
