//! Sandboxed file writer.
//!
//! # Responsibility
//! - Create directories, check file sizes and write/append memo files.
//! - Reject any target that does not normalize to a path under `base_dir`.
//!
//! # Invariants
//! - `base_dir` is absolute and traversal-free (checked at construction).
//! - Content above `stream_threshold_bytes` is streamed in chunks; smaller
//!   content is written with one call. Both paths produce identical bytes.

use super::{FsError, FsResult};
use crate::security::{validate_root, SecurityResult};
use log::{debug, warn};
use std::collections::HashMap;
use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Default size cap for an existing memo file (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_STREAM_THRESHOLD_BYTES: usize = 64 * 1024;
const STREAM_CHUNK_BYTES: usize = 16 * 1024;

/// Time-bounded record of directories already confirmed to exist.
///
/// Scoped to whoever constructs it (typically one `MemoCommand`); entries
/// older than `ttl` are ignored and re-checked against the filesystem. A
/// directory removed while its entry is fresh is recreated when a write
/// into it fails with not-found.
#[derive(Debug)]
pub struct DirectoryCache {
    ttl: Duration,
    confirmed: HashMap<PathBuf, Instant>,
}

impl DirectoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            confirmed: HashMap::new(),
        }
    }

    /// Returns whether `path` was confirmed within the TTL.
    pub fn is_fresh(&self, path: &Path) -> bool {
        self.confirmed
            .get(path)
            .is_some_and(|at| at.elapsed() < self.ttl)
    }

    /// Marks `path` as confirmed now and drops expired entries.
    pub fn record(&mut self, path: &Path) {
        let ttl = self.ttl;
        self.confirmed.retain(|_, at| at.elapsed() < ttl);
        self.confirmed.insert(path.to_path_buf(), Instant::now());
    }

    /// Drops `path` so the next lookup goes back to the filesystem.
    pub fn forget(&mut self, path: &Path) {
        self.confirmed.remove(path);
    }

    pub fn len(&self) -> usize {
        self.confirmed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty()
    }
}

/// Filesystem facade bound to one sandbox base directory.
#[derive(Debug)]
pub struct FsService {
    base_dir: PathBuf,
    max_file_size_bytes: u64,
    stream_threshold_bytes: usize,
    dir_cache: Option<Arc<Mutex<DirectoryCache>>>,
}

impl FsService {
    /// Creates a service rooted at `base_dir` with default limits.
    ///
    /// # Errors
    /// - `InvalidRoot` when `base_dir` is empty or contains `..`.
    pub fn try_new(base_dir: impl AsRef<Path>) -> SecurityResult<Self> {
        Ok(Self {
            base_dir: validate_root(base_dir)?,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            stream_threshold_bytes: DEFAULT_STREAM_THRESHOLD_BYTES,
            dir_cache: None,
        })
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size_bytes = bytes;
        self
    }

    pub fn with_stream_threshold(mut self, bytes: usize) -> Self {
        self.stream_threshold_bytes = bytes;
        self
    }

    /// Consults and updates `cache` in `ensure_directory`.
    pub fn with_directory_cache(mut self, cache: Arc<Mutex<DirectoryCache>>) -> Self {
        self.dir_cache = Some(cache);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_bytes
    }

    /// Creates `path` and its parents; no-op when it already exists.
    pub fn ensure_directory(&self, path: impl AsRef<Path>) -> FsResult<()> {
        let path = path.as_ref();
        if let Some(cache) = &self.dir_cache {
            if cache.lock().is_ok_and(|cache| cache.is_fresh(path)) {
                return Ok(());
            }
        }

        fs::create_dir_all(path)?;

        if let Some(cache) = &self.dir_cache {
            if let Ok(mut cache) = cache.lock() {
                cache.record(path);
            }
        }
        Ok(())
    }

    /// Drops any cached entry for `path` and recreates it when missing.
    pub fn refresh_directory(&self, path: impl AsRef<Path>) -> FsResult<()> {
        let path = path.as_ref();
        if let Some(cache) = &self.dir_cache {
            if let Ok(mut cache) = cache.lock() {
                cache.forget(path);
            }
        }
        self.ensure_directory(path)
    }

    /// Returns metadata for an existing file, `None` when absent.
    ///
    /// # Errors
    /// - `FileTooLarge` when the file exceeds the size limit.
    /// - `Io` for any stat failure other than not-found.
    pub fn validate(&self, path: impl AsRef<Path>) -> FsResult<Option<Metadata>> {
        let path = path.as_ref();
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        if metadata.len() > self.max_file_size_bytes {
            warn!(
                "event=fs_validate module=storage status=error error_code=file_too_large size_bytes={} limit_bytes={}",
                metadata.len(),
                self.max_file_size_bytes
            );
            return Err(FsError::FileTooLarge {
                path: path.to_path_buf(),
                size_bytes: metadata.len(),
                limit_bytes: self.max_file_size_bytes,
            });
        }

        Ok(Some(metadata))
    }

    /// Replaces the target file with `content`.
    ///
    /// Relative targets are resolved against the base directory.
    pub fn write_secure(&self, path: impl AsRef<Path>, content: &str) -> FsResult<PathBuf> {
        let target = self.resolve_within_base(path.as_ref())?;
        self.validate(&target)?;
        self.ensure_parent(&target)?;

        let file = self.open_in_directory(&target, |path| File::create(path))?;
        let mode = self.write_content(file, content)?;
        debug!(
            "event=fs_write module=storage status=ok op=write mode={} bytes={}",
            mode,
            content.len()
        );
        Ok(target)
    }

    /// Appends `content` to the target file, creating it when absent.
    pub fn append_secure(&self, path: impl AsRef<Path>, content: &str) -> FsResult<PathBuf> {
        let target = self.resolve_within_base(path.as_ref())?;
        self.validate(&target)?;
        self.ensure_parent(&target)?;

        let file = self.open_in_directory(&target, |target| {
            OpenOptions::new().create(true).append(true).open(target)
        })?;
        let mode = self.write_content(file, content)?;
        debug!(
            "event=fs_write module=storage status=ok op=append mode={} bytes={}",
            mode,
            content.len()
        );
        Ok(target)
    }

    /// Returns whether the target exists; relative targets resolve against
    /// the base directory and escaping targets report `false`.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.resolve_within_base(path.as_ref())
            .is_ok_and(|target| target.exists())
    }

    /// Lexically normalizes `path` and checks it lies under the base directory.
    ///
    /// # Errors
    /// - `PathEscape` when the normalized target equals or leaves `base_dir`.
    pub fn resolve_within_base(&self, path: &Path) -> FsResult<PathBuf> {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };
        let normalized = normalize_lexically(&joined);

        if normalized == self.base_dir || !normalized.starts_with(&self.base_dir) {
            warn!("event=fs_sandbox module=storage status=error error_code=path_escape");
            return Err(FsError::PathEscape {
                target: path.to_path_buf(),
                base: self.base_dir.clone(),
            });
        }
        Ok(normalized)
    }

    fn ensure_parent(&self, target: &Path) -> FsResult<()> {
        match target.parent() {
            Some(parent) => self.ensure_directory(parent),
            None => Ok(()),
        }
    }

    /// Runs `open`, recreating a cached-but-missing parent once on not-found.
    fn open_in_directory<F>(&self, target: &Path, open: F) -> FsResult<File>
    where
        F: Fn(&Path) -> io::Result<File>,
    {
        match open(target) {
            Err(err) if err.kind() == ErrorKind::NotFound && self.dir_cache.is_some() => {
                let Some(parent) = target.parent() else {
                    return Err(err.into());
                };
                debug!("event=fs_dir_cache module=storage status=stale");
                self.refresh_directory(parent)?;
                Ok(open(target)?)
            }
            other => Ok(other?),
        }
    }

    fn write_content(&self, file: File, content: &str) -> FsResult<&'static str> {
        let bytes = content.as_bytes();
        if bytes.len() <= self.stream_threshold_bytes {
            let mut file = file;
            file.write_all(bytes)?;
            file.flush()?;
            return Ok("buffered");
        }

        let mut writer = BufWriter::with_capacity(STREAM_CHUNK_BYTES, file);
        for chunk in bytes.chunks(STREAM_CHUNK_BYTES) {
            writer.write_all(chunk)?;
        }
        writer.flush()?;
        Ok("streamed")
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
