//! Polling watcher over a fixed set of configuration sources.
//!
//! Each check costs one marker query per source. A source is only re-read
//! when its marker moved, and a failed re-read leaves the previous snapshot
//! in place.

use recede_core::error::WatchError;
use tracing::{debug, warn};

use crate::snapshot::{ConfigSnapshot, ScalarChange};
use crate::source::{ConfigSource, SourceMarker};

/// Outcome of checking one source.
#[derive(Debug)]
pub enum CheckOutcome {
    /// Marker unchanged; nothing was read.
    Unchanged,
    /// Source re-parsed; the numeric keys that changed (possibly none).
    Reloaded(Vec<ScalarChange>),
    /// Source changed but could not be read or parsed; snapshot retained.
    Rejected(WatchError),
}

impl CheckOutcome {
    /// Numeric changes to apply. Empty unless [`CheckOutcome::Reloaded`].
    pub fn changes(&self) -> &[ScalarChange] {
        match self {
            Self::Reloaded(changes) => changes,
            Self::Unchanged | Self::Rejected(_) => &[],
        }
    }

    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

struct Watched {
    source: Box<dyn ConfigSource>,
    snapshot: ConfigSnapshot,
    marker: Option<SourceMarker>,
}

/// Owns one [`ConfigSnapshot`] per registered source.
#[derive(Default)]
pub struct ConfigWatcher {
    watched: Vec<Watched>,
}

impl ConfigWatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source and take its baseline snapshot.
    ///
    /// Unlike later checks, a baseline that cannot be read or parsed is an
    /// error. Re-registering a name replaces the previous entry.
    pub fn watch(
        &mut self,
        source: impl ConfigSource + 'static,
    ) -> Result<&ConfigSnapshot, WatchError> {
        let marker = source.marker()?;
        let snapshot = ConfigSnapshot::parse(source.name(), source.read()?)?;
        let entry = Watched {
            source: Box::new(source),
            snapshot,
            marker: Some(marker),
        };

        let index = match self.position(entry.source.name()) {
            Some(i) => {
                self.watched[i] = entry;
                i
            }
            None => {
                self.watched.push(entry);
                self.watched.len() - 1
            }
        };
        Ok(&self.watched[index].snapshot)
    }

    /// Registered source names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.watched.iter().map(|w| w.source.name())
    }

    pub fn snapshot(&self, name: &str) -> Option<&ConfigSnapshot> {
        self.position(name).map(|i| &self.watched[i].snapshot)
    }

    /// Check one source for changes since the previous check.
    pub fn check(&mut self, name: &str) -> Result<CheckOutcome, WatchError> {
        let index = self
            .position(name)
            .ok_or_else(|| WatchError::UnknownSource(name.to_string()))?;
        Ok(check_entry(&mut self.watched[index]))
    }

    /// Check every source, in registration order.
    pub fn check_all(&mut self) -> Vec<(String, CheckOutcome)> {
        self.watched
            .iter_mut()
            .map(|entry| {
                let outcome = check_entry(entry);
                (entry.source.name().to_string(), outcome)
            })
            .collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.watched.iter().position(|w| w.source.name() == name)
    }
}

fn check_entry(entry: &mut Watched) -> CheckOutcome {
    let name = entry.source.name().to_string();

    let marker = match entry.source.marker() {
        Ok(marker) => marker,
        Err(e) => {
            // A vanished source keeps its last snapshot; it reloads once it reappears.
            if entry.marker.take().is_some() {
                warn!("config source {name} unavailable, keeping last snapshot: {e}");
            }
            return CheckOutcome::Rejected(e);
        }
    };
    if entry.marker == Some(marker) {
        return CheckOutcome::Unchanged;
    }
    // Record the marker even if the reparse fails, so a broken file warns once.
    entry.marker = Some(marker);

    let parsed = entry
        .source
        .read()
        .and_then(|text| ConfigSnapshot::parse(&name, text));
    match parsed {
        Ok(next) => {
            let diff = entry.snapshot.diff(&next);
            entry.snapshot = entry.snapshot.succeed(next);
            if !diff.removed.is_empty() {
                debug!("config source {name}: keys removed {:?}", diff.removed);
            }
            CheckOutcome::Reloaded(diff.changed)
        }
        Err(e) => {
            let version = entry.snapshot.version();
            warn!("config source {name} rejected, keeping version {version}: {e}");
            CheckOutcome::Rejected(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn watcher_with(src: &MemorySource) -> ConfigWatcher {
        let mut w = ConfigWatcher::new();
        w.watch(src.clone()).unwrap();
        w
    }

    #[test]
    fn unchanged_marker_reports_no_changes() {
        let src = MemorySource::new("opt", "[lqr]\nP = 5.0\n");
        let mut w = watcher_with(&src);

        assert!(matches!(w.check("opt").unwrap(), CheckOutcome::Unchanged));
        assert!(matches!(w.check("opt").unwrap(), CheckOutcome::Unchanged));
    }

    #[test]
    fn changed_value_is_reported_once() {
        let src = MemorySource::new("opt", "[lqr]\nP = 5.0\nR = 1.0\n");
        let mut w = watcher_with(&src);

        src.set("[lqr]\nP = 7.0\nR = 1.0\n");
        let outcome = w.check("opt").unwrap();
        assert_eq!(
            outcome.changes(),
            &[ScalarChange {
                key: "lqr.P".into(),
                value: 7.0
            }]
        );
        assert_eq!(w.snapshot("opt").unwrap().version(), 1);
        assert_eq!(w.snapshot("opt").unwrap().get("lqr.P"), Some(7.0));

        assert!(matches!(w.check("opt").unwrap(), CheckOutcome::Unchanged));
    }

    #[test]
    fn touch_without_edit_reloads_with_no_changes() {
        let src = MemorySource::new("opt", "P = 5.0\n");
        let mut w = watcher_with(&src);

        src.touch();
        let outcome = w.check("opt").unwrap();
        assert!(matches!(outcome, CheckOutcome::Reloaded(ref c) if c.is_empty()));
    }

    #[test]
    fn malformed_source_retains_snapshot_exactly() {
        let src = MemorySource::new("opt", "[lqr]\nP = 5.0\n");
        let mut w = watcher_with(&src);
        let before = w.snapshot("opt").unwrap().clone();

        src.set("[lqr\nP = = 7.0");
        let outcome = w.check("opt").unwrap();
        assert!(outcome.is_rejected());
        assert!(outcome.changes().is_empty());

        let after = w.snapshot("opt").unwrap();
        assert_eq!(after, &before);
        assert_eq!(after.text().as_bytes(), before.text().as_bytes());

        // Same broken revision is not re-parsed.
        assert!(matches!(w.check("opt").unwrap(), CheckOutcome::Unchanged));

        // Fixing the file diffs against the last valid snapshot.
        src.set("[lqr]\nP = 6.0\n");
        let outcome = w.check("opt").unwrap();
        assert_eq!(outcome.changes().len(), 1);
        assert_eq!(outcome.changes()[0].value, 6.0);
    }

    #[test]
    fn baseline_parse_failure_is_fatal() {
        let mut w = ConfigWatcher::new();
        let err = w.watch(MemorySource::new("bad", "P = ")).unwrap_err();
        assert!(matches!(err, WatchError::Parse { .. }));
        assert_eq!(w.names().count(), 0);
    }

    #[test]
    fn unknown_source_is_an_error() {
        let mut w = ConfigWatcher::new();
        assert!(matches!(w.check("nope"), Err(WatchError::UnknownSource(_))));
    }

    #[test]
    fn check_all_preserves_registration_order() {
        let a = MemorySource::new("a", "x = 1");
        let b = MemorySource::new("b", "y = 2");
        let mut w = ConfigWatcher::new();
        w.watch(a.clone()).unwrap();
        w.watch(b.clone()).unwrap();

        b.set("y = 3");
        let results = w.check_all();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "a");
        assert!(matches!(results[0].1, CheckOutcome::Unchanged));
        assert_eq!(results[1].0, "b");
        assert_eq!(results[1].1.changes()[0].value, 3.0);
    }

    #[test]
    fn rewatch_replaces_entry() {
        let mut w = ConfigWatcher::new();
        w.watch(MemorySource::new("a", "x = 1")).unwrap();
        w.watch(MemorySource::new("a", "x = 2")).unwrap();
        assert_eq!(w.names().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(w.snapshot("a").unwrap().get("x"), Some(2.0));
    }
}
