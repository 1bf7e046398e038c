//! Hot-reload of scalar configuration values.
//!
//! A [`ConfigWatcher`] polls a small, fixed set of [`ConfigSource`]s once per
//! control tick. Sources are TOML; only integer and float leaves take part in
//! diffing, so a reload yields a typed list of [`ScalarChange`]s and never a
//! structural change. Malformed sources are rejected without touching the
//! last valid [`ConfigSnapshot`].

pub mod snapshot;
pub mod source;
pub mod watcher;

pub use snapshot::{ConfigSnapshot, ScalarChange, SnapshotDiff};
pub use source::{
    ConfigSource, FileSource, MAX_SOURCE_BYTES, MemorySource, RACY_WINDOW, SourceMarker,
};
pub use watcher::{CheckOutcome, ConfigWatcher};
