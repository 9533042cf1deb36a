use chrono::{DateTime, Utc};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot store I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot record could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("atomic swap requested with nothing staged")]
    NothingStaged,
}

/// Persistent home of the single published record.
///
/// Writers stage the complete bytes somewhere readers cannot see, then
/// publish them in one atomic step. `atomic_swap` reports the commit time
/// as seen by the medium, in epoch milliseconds.
pub trait SnapshotStore: Send + Sync {
    fn read(&self) -> Result<Option<Vec<u8>>, StoreError>;

    fn stage(&self, bytes: &[u8]) -> Result<(), StoreError>;

    fn atomic_swap(&self) -> Result<i64, StoreError>;

    fn write(&self, bytes: &[u8]) -> Result<i64, StoreError> {
        self.stage(bytes)?;
        self.atomic_swap()
    }
}

/// JSON file on disk, replaced via write-to-temp + rename.
///
/// Every `stage` gets its own uniquely named file next to the target, so
/// writers sharing a path never scribble over each other's staged bytes.
pub struct FileStore {
    path: PathBuf,
    staged: Mutex<Option<NamedTempFile>>,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            staged: Mutex::new(None),
        }
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl SnapshotStore for FileStore {
    fn read(&self) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn stage(&self, bytes: &[u8]) -> Result<(), StoreError> {
        fs::create_dir_all(self.dir())?;

        let mut file = NamedTempFile::new_in(self.dir())?;
        file.write_all(bytes)?;
        file.as_file().sync_all()?;

        // a previously staged, never swapped file is dropped (and removed) here
        *self.staged.lock().unwrap_or_else(PoisonError::into_inner) = Some(file);
        Ok(())
    }

    fn atomic_swap(&self) -> Result<i64, StoreError> {
        let file = self
            .staged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(StoreError::NothingStaged)?;
        let published = file.persist(&self.path).map_err(|e| e.error)?;

        let modified = published.metadata()?.modified()?;
        Ok(DateTime::<Utc>::from(modified).timestamp_millis())
    }
}

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// Process-local store; used when no cache path is configured and in tests.
pub struct MemoryStore {
    published: RwLock<Option<Vec<u8>>>,
    staged: Mutex<Option<Vec<u8>>>,
    clock: Clock,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_clock(|| Utc::now().timestamp_millis())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose commit times come from `clock` instead of the wall clock.
    pub fn with_clock(clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        Self {
            published: RwLock::new(None),
            staged: Mutex::new(None),
            clock: Box::new(clock),
        }
    }
}

impl SnapshotStore for MemoryStore {
    fn read(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let published = self.published.read().unwrap_or_else(PoisonError::into_inner);
        Ok(published.clone())
    }

    fn stage(&self, bytes: &[u8]) -> Result<(), StoreError> {
        *self.staged.lock().unwrap_or_else(PoisonError::into_inner) = Some(bytes.to_vec());
        Ok(())
    }

    fn atomic_swap(&self) -> Result<i64, StoreError> {
        let bytes = self
            .staged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(StoreError::NothingStaged)?;

        let committed_at = (self.clock)();
        *self.published.write().unwrap_or_else(PoisonError::into_inner) = Some(bytes);
        Ok(committed_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn file_store_roundtrip_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("cache").join("state.json"));

        assert_eq!(store.read().unwrap(), None);

        let at = store.write(b"{\"v\":1}").unwrap();
        assert!(at > 0);
        assert_eq!(store.read().unwrap().as_deref(), Some(&b"{\"v\":1}"[..]));
        assert_eq!(entries(&dir.path().join("cache")), 1);
    }

    #[test]
    fn staged_bytes_are_invisible_until_swap() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state.json"));
        store.write(b"old").unwrap();

        store.stage(b"new").unwrap();
        assert_eq!(store.read().unwrap().as_deref(), Some(&b"old"[..]));

        store.atomic_swap().unwrap();
        assert_eq!(store.read().unwrap().as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn swap_without_stage_fails_and_keeps_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state.json"));
        store.write(b"kept").unwrap();

        assert!(matches!(store.atomic_swap(), Err(StoreError::NothingStaged)));
        assert_eq!(store.read().unwrap().as_deref(), Some(&b"kept"[..]));
    }

    #[test]
    fn abandoned_stage_leaves_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStore::new(&path);
        store.write(b"intact").unwrap();

        store.stage(b"never published").unwrap();
        drop(store);

        assert_eq!(fs::read(&path).unwrap(), b"intact");
        assert_eq!(entries(dir.path()), 1);
    }

    #[test]
    fn two_stores_on_one_path_do_not_mix_staged_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let a = FileStore::new(&path);
        let b = FileStore::new(&path);

        a.stage(b"from a").unwrap();
        b.stage(b"from b, longer").unwrap();
        a.atomic_swap().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"from a");
        b.atomic_swap().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"from b, longer");
    }

    #[test]
    fn concurrent_writers_never_publish_a_torn_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let payloads: Vec<Vec<u8>> = (0..4u8).map(|i| vec![b'a' + i; 64 * 1024]).collect();

        std::thread::scope(|scope| {
            for payload in &payloads {
                let store = FileStore::new(&path);
                scope.spawn(move || {
                    for _ in 0..20 {
                        store.write(payload).unwrap();
                    }
                });
            }
            let reader = FileStore::new(&path);
            let payloads = &payloads;
            scope.spawn(move || {
                for _ in 0..200 {
                    if let Some(bytes) = reader.read().unwrap() {
                        assert!(payloads.contains(&bytes), "torn record of {} bytes", bytes.len());
                    }
                }
            });
        });

        let last = fs::read(&path).unwrap();
        assert!(payloads.contains(&last));
        assert_eq!(entries(dir.path()), 1);
    }

    #[test]
    fn memory_store_uses_injected_clock() {
        let store = MemoryStore::with_clock(|| 1_234);
        assert_eq!(store.read().unwrap(), None);
        assert_eq!(store.write(b"x").unwrap(), 1_234);
        assert_eq!(store.read().unwrap().as_deref(), Some(&b"x"[..]));
        assert!(matches!(store.atomic_swap(), Err(StoreError::NothingStaged)));
    }
}
