//! Configuration sources the watcher can poll.
//!
//! A source reports a cheap [`SourceMarker`] every tick and is only parsed
//! when the marker moves. Reads are capped at [`MAX_SOURCE_BYTES`] so a
//! runaway file can never stall a control tick.

use std::fs::File;
use std::hash::{DefaultHasher, Hasher};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use recede_core::error::WatchError;

/// Upper bound on the size of a single configuration source.
pub const MAX_SOURCE_BYTES: u64 = 64 * 1024;

/// A modification younger than this can share its mtime with a later write
/// of the same length on coarse-grained filesystems.
pub const RACY_WINDOW: Duration = Duration::from_secs(2);

/// Last-seen modification state of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMarker {
    /// Filesystem modification time plus length. `digest` hashes the
    /// contents while the mtime is within [`RACY_WINDOW`] of now.
    Modified {
        at: SystemTime,
        len: u64,
        digest: Option<u64>,
    },
    /// Monotonic revision counter for in-memory sources.
    Revision(u64),
}

/// A pollable key/value configuration source.
pub trait ConfigSource: Send {
    /// Stable name used to address the source (e.g. the file name).
    fn name(&self) -> &str;

    /// Current modification marker. Reads the payload only when metadata
    /// alone cannot tell two versions apart.
    fn marker(&self) -> Result<SourceMarker, WatchError>;

    /// Full payload, at most [`MAX_SOURCE_BYTES`] long.
    fn read(&self) -> Result<String, WatchError>;
}

// ---------------------------------------------------------------------------
// FileSource
// ---------------------------------------------------------------------------

/// A TOML file on disk, change-detected by mtime and length.
///
/// A file modified within [`RACY_WINDOW`] also has its contents hashed into
/// the marker, so two equal-length writes inside one mtime tick are still
/// told apart. Once the file settles the digest is dropped, which costs one
/// extra re-read with an empty diff.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    name: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn digest(&self) -> Result<u64, WatchError> {
        let mut bytes = Vec::new();
        File::open(&self.path)?
            .take(MAX_SOURCE_BYTES + 1)
            .read_to_end(&mut bytes)?;
        let mut hasher = DefaultHasher::new();
        hasher.write(&bytes);
        Ok(hasher.finish())
    }
}

impl ConfigSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn marker(&self) -> Result<SourceMarker, WatchError> {
        let meta = std::fs::metadata(&self.path)?;
        let at = meta.modified()?;
        let settled = SystemTime::now()
            .duration_since(at)
            .is_ok_and(|age| age >= RACY_WINDOW);
        let digest = if settled { None } else { Some(self.digest()?) };
        Ok(SourceMarker::Modified {
            at,
            len: meta.len(),
            digest,
        })
    }

    fn read(&self) -> Result<String, WatchError> {
        let file = File::open(&self.path)?;
        let mut text = String::new();
        // One byte past the limit tells an exactly-full file from an oversized one.
        let read = file.take(MAX_SOURCE_BYTES + 1).read_to_string(&mut text)?;
        let read = u64::try_from(read).unwrap_or(u64::MAX);
        if read > MAX_SOURCE_BYTES {
            return Err(WatchError::TooLarge {
                size: read,
                limit: MAX_SOURCE_BYTES,
            });
        }
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct MemoryState {
    revision: u64,
    text: String,
}

/// An in-memory source. Clones share the same contents, so one handle can
/// be given to the watcher while another publishes new text.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MemoryState {
                revision: 0,
                text: text.into(),
            })),
        }
    }

    /// Publish new contents and bump the revision.
    pub fn set(&self, text: impl Into<String>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.revision += 1;
        state.text = text.into();
    }

    /// Bump the revision without changing the contents.
    pub fn touch(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.revision += 1;
    }
}

impl ConfigSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn marker(&self) -> Result<SourceMarker, WatchError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(SourceMarker::Revision(state.revision))
    }

    fn read(&self) -> Result<String, WatchError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let size = u64::try_from(state.text.len()).unwrap_or(u64::MAX);
        if size > MAX_SOURCE_BYTES {
            return Err(WatchError::TooLarge {
                size,
                limit: MAX_SOURCE_BYTES,
            });
        }
        Ok(state.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn file_source_name_is_file_name() {
        let src = FileSource::new("/etc/recede/config_optimizers.toml");
        assert_eq!(src.name(), "config_optimizers.toml");
    }

    #[test]
    fn file_source_marker_tracks_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.toml");
        std::fs::write(&path, "x = 1\n").unwrap();
        let src = FileSource::new(&path);

        let first = src.marker().unwrap();
        assert_eq!(first, src.marker().unwrap());

        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();
        assert_ne!(first, src.marker().unwrap());
    }

    #[test]
    fn equal_length_rewrite_within_one_mtime_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opt.toml");
        let at = SystemTime::now();
        std::fs::write(&path, "P = 5.0\n").unwrap();
        File::options().write(true).open(&path).unwrap().set_modified(at).unwrap();
        let src = FileSource::new(&path);
        let first = src.marker().unwrap();

        std::fs::write(&path, "P = 7.0\n").unwrap();
        File::options().write(true).open(&path).unwrap().set_modified(at).unwrap();
        let second = src.marker().unwrap();

        assert!(matches!(first, SourceMarker::Modified { digest: Some(_), .. }));
        assert_ne!(first, second);
    }

    #[test]
    fn settled_file_marker_skips_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.toml");
        std::fs::write(&path, "P = 5.0\n").unwrap();
        let old = SystemTime::now() - Duration::from_secs(60);
        File::options().write(true).open(&path).unwrap().set_modified(old).unwrap();

        let marker = FileSource::new(&path).marker().unwrap();
        assert!(matches!(marker, SourceMarker::Modified { digest: None, len: 8, .. }));
    }

    #[test]
    fn file_source_rejects_oversized_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.toml");
        let mut file = File::create(&path).unwrap();
        let line = "k = 1\n".repeat(20_000);
        file.write_all(line.as_bytes()).unwrap();
        drop(file);

        let err = FileSource::new(&path).read().unwrap_err();
        assert!(matches!(err, WatchError::TooLarge { limit, .. } if limit == MAX_SOURCE_BYTES));
    }

    #[test]
    fn file_source_missing_file_is_io_error() {
        let src = FileSource::new("/nonexistent/recede.toml");
        assert!(matches!(src.marker(), Err(WatchError::Io(_))));
    }

    #[test]
    fn memory_source_handles_share_state() {
        let src = MemorySource::new("mem", "P = 5.0");
        let handle = src.clone();
        assert_eq!(src.marker().unwrap(), SourceMarker::Revision(0));

        handle.set("P = 7.0");
        assert_eq!(src.marker().unwrap(), SourceMarker::Revision(1));
        assert_eq!(src.read().unwrap(), "P = 7.0");

        handle.touch();
        assert_eq!(src.marker().unwrap(), SourceMarker::Revision(2));
        assert_eq!(src.read().unwrap(), "P = 7.0");
    }
}
