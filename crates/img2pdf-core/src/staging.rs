//! Request-scoped staging of uploaded images and generated documents.
//!
//! A [`StagingStore`] is the shared namespace (a directory, or a map in
//! memory). A [`StagingArea`] is one request's view of it: every key it
//! writes is derived from a fresh UUID token, never from caller input, and
//! everything it wrote is removed exactly once, either explicitly through
//! [`StagingArea::cleanup`] or when the area is dropped.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Backing storage shared by all requests.
///
/// `put` must never overwrite: writing an existing key is an
/// `AlreadyExists` error.
pub trait StagingStore: Send + Sync {
    /// Store everything `reader` yields under `key`. Returns bytes written.
    fn put(&self, key: &str, reader: &mut dyn Read) -> io::Result<u64>;

    fn open(&self, key: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> io::Result<()>;

    fn contains(&self, key: &str) -> bool;

    /// All keys currently stored, in no particular order.
    fn keys(&self) -> io::Result<Vec<String>>;

    /// Short description for log lines.
    fn describe(&self) -> String;
}

fn check_key(key: &str) -> io::Result<()> {
    let valid = !key.is_empty()
        && key != "."
        && key != ".."
        && !key.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid staging key '{key}'"),
        ))
    }
}

// =============================================================================
// Disk Store
// =============================================================================

/// Files in one shared directory.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            Error::StagingIo(format!(
                "Failed to create staging directory {}: {}",
                root.display(),
                e
            ))
        })?;
        debug!("Opened staging directory at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> io::Result<PathBuf> {
        check_key(key)?;
        Ok(self.root.join(key))
    }
}

impl StagingStore for DiskStore {
    fn put(&self, key: &str, reader: &mut dyn Read) -> io::Result<u64> {
        let path = self.path_for(key)?;
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;

        match io::copy(reader, &mut file).and_then(|n| file.sync_all().map(|()| n)) {
            Ok(written) => Ok(written),
            Err(e) => {
                drop(file);
                let _ = std::fs::remove_file(&path);
                Err(e)
            }
        }
    }

    fn open(&self, key: &str) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(self.path_for(key)?)?;
        Ok(Box::new(file))
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path_for(key)?) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn contains(&self, key: &str) -> bool {
        self.path_for(key).is_ok_and(|path| path.is_file())
    }

    fn keys(&self) -> io::Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                keys.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(keys)
    }

    fn describe(&self) -> String {
        format!("disk:{}", self.root.display())
    }
}

// =============================================================================
// Memory Store
// =============================================================================

/// In-process store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, HashMap<String, Bytes>>> {
        self.entries
            .lock()
            .map_err(|_| io::Error::other("memory store lock poisoned"))
    }
}

impl StagingStore for MemoryStore {
    fn put(&self, key: &str, reader: &mut dyn Read) -> io::Result<u64> {
        check_key(key)?;
        if self.lock()?.contains_key(key) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("staging key '{key}' already exists"),
            ));
        }

        // Read outside the lock so slow readers don't block other requests
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        let written = buf.len() as u64;

        let mut entries = self.lock()?;
        if entries.contains_key(key) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("staging key '{key}' already exists"),
            ));
        }
        entries.insert(key.to_string(), Bytes::from(buf));
        Ok(written)
    }

    fn open(&self, key: &str) -> io::Result<Box<dyn Read + Send>> {
        let data = self
            .lock()?
            .get(key)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no staged file '{key}'")))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.lock().is_ok_and(|entries| entries.contains_key(key))
    }

    fn keys(&self) -> io::Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

// =============================================================================
// Staging Area
// =============================================================================

/// A file written by a [`StagingArea`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub key: String,
    pub size: u64,
}

/// Outcome of [`StagingArea::cleanup`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    /// Keys that could not be removed
    pub failed: Vec<String>,
}

/// One request's arena in a [`StagingStore`].
pub struct StagingArea {
    store: Arc<dyn StagingStore>,
    token: String,
    staged: Vec<String>,
    cleaned: bool,
}

impl StagingArea {
    pub fn new(store: Arc<dyn StagingStore>) -> Self {
        Self {
            store,
            token: Uuid::new_v4().simple().to_string(),
            staged: Vec::new(),
            cleaned: false,
        }
    }

    /// Unique per-request token every key is derived from.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Name of the output document for this request.
    pub fn output_name(&self) -> String {
        format!("converted_{}.pdf", self.token)
    }

    /// Keys this area owns, including ones whose write failed midway.
    pub fn staged_keys(&self) -> &[String] {
        &self.staged
    }

    /// Stage the `index`th input item.
    pub fn stage_input(
        &mut self,
        index: usize,
        extension: &str,
        reader: &mut dyn Read,
    ) -> Result<StagedFile> {
        let key = format!("{}_{index:04}.{extension}", self.token);
        self.put(key, reader)
    }

    /// Stage the generated document.
    pub fn stage_output(&mut self, bytes: &[u8]) -> Result<StagedFile> {
        let key = self.output_name();
        self.put(key, &mut Cursor::new(bytes))
    }

    fn put(&mut self, key: String, reader: &mut dyn Read) -> Result<StagedFile> {
        if self.cleaned {
            return Err(Error::StagingIo(format!(
                "staging area {} already cleaned up",
                self.token
            )));
        }

        // Tracked before writing so a partial write is still cleaned up
        self.staged.push(key.clone());

        let size = match self.store.put(&key, reader) {
            Ok(size) => size,
            Err(e) => {
                // The existing file belongs to another writer
                if e.kind() == io::ErrorKind::AlreadyExists {
                    self.staged.pop();
                }
                return Err(Error::StagingIo(format!(
                    "Failed to stage {key} in {}: {e}",
                    self.store.describe()
                )));
            }
        };
        debug!("Staged {} ({} bytes)", key, size);

        Ok(StagedFile { key, size })
    }

    pub fn read(&self, file: &StagedFile) -> Result<Vec<u8>> {
        let mut reader = self.open(file)?;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| Error::StagingIo(format!("Failed to read {}: {e}", file.key)))?;
        Ok(buf)
    }

    pub fn open(&self, file: &StagedFile) -> Result<Box<dyn Read + Send>> {
        self.store
            .open(&file.key)
            .map_err(|e| Error::StagingIo(format!("Failed to open {}: {e}", file.key)))
    }

    pub const fn is_cleaned(&self) -> bool {
        self.cleaned
    }

    /// Remove everything this area staged. Only the first call does work.
    pub fn cleanup(&mut self) -> CleanupReport {
        if self.cleaned {
            return CleanupReport::default();
        }
        self.cleaned = true;

        let mut report = CleanupReport::default();
        for key in self.staged.drain(..) {
            match self.store.remove(&key) {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!("Failed to remove staged file {}: {}", key, e);
                    report.failed.push(key);
                }
            }
        }

        debug!(
            "Cleaned up staging area {} ({} removed, {} failed)",
            self.token,
            report.removed,
            report.failed.len()
        );
        report
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl std::fmt::Debug for StagingArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingArea")
            .field("store", &self.store.describe())
            .field("token", &self.token)
            .field("staged", &self.staged)
            .field("cleaned", &self.cleaned)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("connection reset"))
        }
    }

    fn stores() -> Vec<(Arc<dyn StagingStore>, Option<tempfile::TempDir>)> {
        let dir = tempfile::tempdir().unwrap();
        let disk: Arc<dyn StagingStore> = Arc::new(DiskStore::new(dir.path().join("staging")).unwrap());
        vec![
            (Arc::new(MemoryStore::new()), None),
            (disk, Some(dir)),
        ]
    }

    #[test]
    fn test_put_open_remove() {
        for (store, _dir) in stores() {
            let written = store.put("k.png", &mut Cursor::new(b"abc".to_vec())).unwrap();
            assert_eq!(written, 3);
            assert!(store.contains("k.png"));

            let mut buf = Vec::new();
            store.open("k.png").unwrap().read_to_end(&mut buf).unwrap();
            assert_eq!(buf, b"abc");

            store.remove("k.png").unwrap();
            assert!(!store.contains("k.png"));
            // Removing twice is fine
            store.remove("k.png").unwrap();
        }
    }

    #[test]
    fn test_put_never_overwrites() {
        for (store, _dir) in stores() {
            store.put("same", &mut Cursor::new(b"first".to_vec())).unwrap();
            let err = store.put("same", &mut Cursor::new(b"second".to_vec())).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

            let mut buf = Vec::new();
            store.open("same").unwrap().read_to_end(&mut buf).unwrap();
            assert_eq!(buf, b"first");
        }
    }

    #[test]
    fn test_rejects_path_like_keys() {
        for (store, _dir) in stores() {
            for key in ["../escape.png", "a/b.png", "a\\b.png", "", ".."] {
                assert!(store.put(key, &mut Cursor::new(Vec::new())).is_err(), "{key}");
            }
        }
    }

    #[test]
    fn test_area_keys_ignore_caller_names() {
        let store = Arc::new(MemoryStore::new());
        let mut area = StagingArea::new(store.clone());
        let file = area.stage_input(0, "png", &mut Cursor::new(b"x".to_vec())).unwrap();

        assert!(file.key.starts_with(area.token()));
        assert!(file.key.ends_with("_0000.png"));
        assert_eq!(area.output_name(), format!("converted_{}.pdf", area.token()));
    }

    #[test]
    fn test_area_cleanup_is_total_and_once() {
        let store = Arc::new(MemoryStore::new());
        let mut area = StagingArea::new(store.clone());
        area.stage_input(0, "png", &mut Cursor::new(b"a".to_vec())).unwrap();
        area.stage_input(1, "jpg", &mut Cursor::new(b"b".to_vec())).unwrap();
        area.stage_output(b"%PDF").unwrap();
        assert_eq!(store.len(), 3);

        let report = area.cleanup();
        assert_eq!(report.removed, 3);
        assert!(store.is_empty());
        assert!(area.is_cleaned());

        assert_eq!(area.cleanup(), CleanupReport::default());
        assert!(area.stage_output(b"late").is_err());
    }

    #[test]
    fn test_area_cleans_up_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DiskStore::new(dir.path()).unwrap());
        {
            let mut area = StagingArea::new(store.clone());
            area.stage_input(0, "gif", &mut Cursor::new(b"gif".to_vec())).unwrap();
            assert_eq!(store.keys().unwrap().len(), 1);
        }
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_collision_leaves_existing_file_alone() {
        let store = Arc::new(MemoryStore::new());
        let mut area = StagingArea::new(store.clone());
        let taken = format!("{}_0000.png", area.token());
        store.put(&taken, &mut Cursor::new(b"someone else".to_vec())).unwrap();

        let err = area
            .stage_input(0, "png", &mut Cursor::new(b"mine".to_vec()))
            .unwrap_err();
        assert!(matches!(err, Error::StagingIo(_)));
        assert!(area.staged_keys().is_empty());

        area.cleanup();
        assert!(store.contains(&taken));
        let mut content = Vec::new();
        store.open(&taken).unwrap().read_to_end(&mut content).unwrap();
        assert_eq!(content, b"someone else");
    }

    #[test]
    fn test_failed_write_is_still_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DiskStore::new(dir.path()).unwrap());
        let mut area = StagingArea::new(store.clone());
        let mut broken = BrokenReader;

        assert!(area.stage_input(0, "jpg", &mut broken).is_err());
        assert_eq!(area.staged_keys().len(), 1);

        area.cleanup();
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_two_areas_never_collide() {
        let store = Arc::new(MemoryStore::new());
        let mut first = StagingArea::new(store.clone());
        let mut second = StagingArea::new(store.clone());
        assert_ne!(first.token(), second.token());

        let a = first.stage_input(0, "png", &mut Cursor::new(b"first".to_vec())).unwrap();
        let b = second.stage_input(0, "png", &mut Cursor::new(b"second".to_vec())).unwrap();
        assert_ne!(a.key, b.key);
        assert_eq!(first.read(&a).unwrap(), b"first");
        assert_eq!(second.read(&b).unwrap(), b"second");

        first.cleanup();
        assert!(store.contains(&b.key));
    }
}
