use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use super::{AddedEntry, CasError, ContentHash, ContentStore, Result};

/// Filesystem-backed content store with git-style 2-char sharding.
///
/// Layout: `<root>/objects/<first 2 hex chars>/<remaining hex chars>`
pub struct FsContentStore {
    objects_dir: PathBuf,
}

impl FsContentStore {
    /// Create a store rooted at `root`. Creates `root/objects/` if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let objects_dir = root.as_ref().join("objects");
        fs::create_dir_all(&objects_dir)?;
        Ok(Self { objects_dir })
    }

    fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        let hex = hash.as_str();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    /// Store `data`, deduplicating on content.
    pub fn put(&self, data: &[u8]) -> Result<ContentHash> {
        let hash = ContentHash::compute(data);
        let path = self.blob_path(&hash);

        if path.exists() {
            return Ok(hash);
        }

        let shard_dir = self.objects_dir.join(&hash.as_str()[..2]);
        fs::create_dir_all(&shard_dir)?;

        // Write to a temp file in the shard, then rename into place.
        let mut tmp = NamedTempFile::new_in(&shard_dir)?;
        tmp.write_all(data)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        Ok(hash)
    }

    /// Resolve a hash back to its bytes.
    pub fn get(&self, hash: &ContentHash) -> Result<Vec<u8>> {
        fs::read(self.blob_path(hash)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CasError::NotFound(hash.clone())
            } else {
                CasError::Io(e)
            }
        })
    }

    pub fn exists(&self, hash: &ContentHash) -> bool {
        self.blob_path(hash).exists()
    }
}

/// Every regular file below `dir`, as (relative `/`-joined name, path),
/// sorted by name.
pub(crate) fn collect_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Err(CasError::NotADirectory(dir.display().to_string()));
    }
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.is_file() {
                let name = path
                    .strip_prefix(dir)
                    .unwrap_or(&path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((name, path));
            }
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn add_string(&self, text: &str) -> Result<ContentHash> {
        self.put(text.as_bytes())
    }

    async fn add_directory(&self, dir: &Path) -> Result<Vec<AddedEntry>> {
        collect_files(dir)?
            .into_iter()
            .map(|(name, path)| {
                let data = fs::read(&path)?;
                Ok(AddedEntry {
                    name,
                    hash: self.put(&data)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, FsContentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn blob_roundtrip() {
        let (_dir, store) = make_store();
        let hash = store.put(b"hello world").unwrap();
        assert_eq!(store.get(&hash).unwrap(), b"hello world");
        assert!(store.exists(&hash));
    }

    #[test]
    fn dedupe_invariant() {
        let (dir, store) = make_store();
        let h1 = store.put(b"duplicate me").unwrap();
        let h2 = store.put(b"duplicate me").unwrap();
        assert_eq!(h1, h2);

        let shard = dir.path().join("objects").join(&h1.as_str()[..2]);
        let entries: Vec<_> = std::fs::read_dir(shard).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn get_missing_is_not_found() {
        let (_dir, store) = make_store();
        let fake = ContentHash::compute(b"no such blob");
        match store.get(&fake) {
            Err(CasError::NotFound(h)) => assert_eq!(h, fake),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn add_directory_lists_nested_files_sorted() {
        let (_dir, store) = make_store();
        let out = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(out.path().join("spoon/emulator")).unwrap();
        std::fs::write(out.path().join("log.txt"), "log").unwrap();
        std::fs::write(out.path().join("spoon/emulator/debug"), "dbg").unwrap();

        let entries = store.add_directory(out.path()).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["log.txt", "spoon/emulator/debug"]);
        assert_eq!(store.get(&entries[1].hash).unwrap(), b"dbg");
    }

    #[tokio::test]
    async fn add_empty_directory_yields_no_entries() {
        let (_dir, store) = make_store();
        let out = tempfile::tempdir().unwrap();
        assert!(store.add_directory(out.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_directory_rejects_missing_dir() {
        let (dir, store) = make_store();
        let missing = dir.path().join("nope");
        assert!(matches!(
            store.add_directory(&missing).await,
            Err(CasError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn add_string_is_resolvable() {
        let (_dir, store) = make_store();
        let hash = store.add_string("<a href='x'>y</a>").await.unwrap();
        assert_eq!(store.get(&hash).unwrap(), b"<a href='x'>y</a>");
    }
}
