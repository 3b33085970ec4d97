//! File-based backend for cross-process variables.

use crate::error::{StorageError, StorageResult};
use crate::lock::{Lock, LockMode, ReadWriteLock};
use crate::persistence::Persistence;
use fs2::FileExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a named variable lives inside a backend directory.
///
/// Names are hashed so that any string (paths, keys with separators) maps to
/// a flat, portable file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLayout {
    /// The advisory lock file.
    pub lock_path: PathBuf,
    /// The CBOR value file.
    pub value_path: PathBuf,
}

impl FileLayout {
    /// Computes the layout of `name` under `dir`.
    #[must_use]
    pub fn new(dir: &Path, name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        let stem: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        Self {
            lock_path: dir.join(format!("{stem}.lock")),
            value_path: dir.join(format!("{stem}.cbor")),
        }
    }
}

/// One side of a [`FileLock`].
///
/// Every acquisition opens its own descriptor so that advisory locks taken by
/// different transactions of the same process conflict the way they would
/// across processes.
#[derive(Debug)]
pub struct FileLockHandle {
    path: PathBuf,
    mode: LockMode,
    held: Mutex<Vec<File>>,
}

impl FileLockHandle {
    fn new(path: PathBuf, mode: LockMode) -> Self {
        Self {
            path,
            mode,
            held: Mutex::new(Vec::new()),
        }
    }

    fn open(&self) -> StorageResult<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        Ok(file)
    }

    fn try_acquire(&self, file: &File) -> io::Result<()> {
        match self.mode {
            LockMode::Read => FileExt::try_lock_shared(file),
            LockMode::Write => FileExt::try_lock_exclusive(file),
        }
    }
}

impl Lock for FileLockHandle {
    fn lock(&self) -> StorageResult<()> {
        let file = self.open()?;
        match self.mode {
            LockMode::Read => FileExt::lock_shared(&file)?,
            LockMode::Write => FileExt::lock_exclusive(&file)?,
        }
        self.held.lock().push(file);
        Ok(())
    }

    fn try_lock(&self) -> StorageResult<bool> {
        let file = self.open()?;
        match self.try_acquire(&file) {
            Ok(()) => {
                self.held.lock().push(file);
                Ok(true)
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn unlock(&self) -> StorageResult<()> {
        let file = self
            .held
            .lock()
            .pop()
            .ok_or(StorageError::LockNotHeld { mode: self.mode })?;
        FileExt::unlock(&file)?;
        Ok(())
    }
}

/// An advisory shared/exclusive lock backed by a lock file.
///
/// Any process that opens the same directory and variable name contends on
/// the same lock.
#[derive(Debug)]
pub struct FileLock {
    read: Arc<FileLockHandle>,
    write: Arc<FileLockHandle>,
}

impl FileLock {
    /// Creates a lock over `path`. The file is created on first acquisition.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            read: Arc::new(FileLockHandle::new(path.clone(), LockMode::Read)),
            write: Arc::new(FileLockHandle::new(path, LockMode::Write)),
        }
    }

    /// Returns the path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.read.path
    }
}

impl ReadWriteLock for FileLock {
    fn read_lock(&self) -> Arc<dyn Lock> {
        self.read.clone()
    }

    fn write_lock(&self) -> Arc<dyn Lock> {
        self.write.clone()
    }
}

/// A value stored as a CBOR document in a single file.
///
/// Writes go to a sibling temporary file which is synced and renamed over the
/// value file, so readers never observe a torn value.
#[derive(Debug)]
pub struct FilePersistence<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FilePersistence<T> {
    /// Creates a persistence cell at `path`. A missing file reads as `None`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Returns the path to the value file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl<T> Persistence<T> for FilePersistence<T>
where
    T: Serialize + DeserializeOwned,
{
    fn read(&self) -> StorageResult<Option<T>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(lockstep_codec::decode(&bytes)?))
    }

    fn write(&self, value: T) -> StorageResult<()> {
        let bytes = lockstep_codec::encode(&value)?;
        let temp_path = self.temp_path();
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}
