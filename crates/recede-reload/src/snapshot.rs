//! Versioned, last-known-valid view of one configuration source.

use std::collections::BTreeMap;

use recede_core::error::WatchError;

/// A numeric key whose value differs between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarChange {
    /// Dotted path of the key, e.g. `lqr.P`.
    pub key: String,
    pub value: f64,
}

impl ScalarChange {
    /// Last path segment, the name subordinates match on (`lqr.P` -> `P`).
    pub fn leaf(&self) -> &str {
        self.key.rsplit('.').next().unwrap_or(&self.key)
    }
}

/// Result of diffing two snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotDiff {
    /// Keys that are new or whose numeric value changed, in key order.
    pub changed: Vec<ScalarChange>,
    /// Keys that were numeric before and are gone or no longer numeric.
    pub removed: Vec<String>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

/// The numeric scalar fields of a parsed source.
///
/// Only integer and float leaves are tracked; strings, booleans and arrays
/// are structural and need a full reconfigure. Nested tables are flattened
/// into dotted keys.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    version: u64,
    text: String,
    values: BTreeMap<String, f64>,
}

impl ConfigSnapshot {
    /// Parse `text` as TOML. The snapshot starts at version 0.
    pub fn parse(source_name: &str, text: String) -> Result<Self, WatchError> {
        let table: toml::Table = toml::from_str(&text).map_err(|e| WatchError::Parse {
            source_name: source_name.to_string(),
            message: e.message().to_string(),
        })?;
        let mut values = BTreeMap::new();
        flatten_numeric("", &table, &mut values);
        Ok(Self {
            version: 0,
            text,
            values,
        })
    }

    pub const fn version(&self) -> u64 {
        self.version
    }

    /// The exact text this snapshot was parsed from.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub const fn values(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Compare against a newer snapshot.
    pub fn diff(&self, next: &Self) -> SnapshotDiff {
        let changed = next
            .values
            .iter()
            .filter(|&(key, value)| {
                self.values
                    .get(key)
                    .is_none_or(|old| old.total_cmp(value).is_ne())
            })
            .map(|(key, value)| ScalarChange {
                key: key.clone(),
                value: *value,
            })
            .collect();
        let removed = self
            .values
            .keys()
            .filter(|key| !next.values.contains_key(*key))
            .cloned()
            .collect();
        SnapshotDiff { changed, removed }
    }

    /// Adopt `next` as the successor of this snapshot.
    pub(crate) fn succeed(&self, mut next: Self) -> Self {
        next.version = self.version + 1;
        next
    }
}

#[allow(clippy::cast_precision_loss)]
fn flatten_numeric(prefix: &str, table: &toml::Table, out: &mut BTreeMap<String, f64>) {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Integer(i) => {
                out.insert(path, *i as f64);
            }
            toml::Value::Float(f) => {
                out.insert(path, *f);
            }
            toml::Value::Table(inner) => flatten_numeric(&path, inner, out),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(text: &str) -> ConfigSnapshot {
        ConfigSnapshot::parse("test.toml", text.to_string()).unwrap()
    }

    #[test]
    fn parse_flattens_numeric_leaves_only() {
        let s = snap(
            r#"
[lqr]
P = 5.0
mpc_horizon = 10
solver = "clarabel"
verbose = true
limits = [-1.0, 1.0]

[lqr.inner]
gain = 0.5
"#,
        );
        assert_eq!(s.values().len(), 3);
        assert_eq!(s.get("lqr.P"), Some(5.0));
        assert_eq!(s.get("lqr.mpc_horizon"), Some(10.0));
        assert_eq!(s.get("lqr.inner.gain"), Some(0.5));
        assert_eq!(s.get("lqr.solver"), None);
        assert_eq!(s.version(), 0);
    }

    #[test]
    fn parse_error_names_source() {
        let err = ConfigSnapshot::parse("bad.toml", "[lqr\nP =".into()).unwrap_err();
        assert!(matches!(
            err,
            WatchError::Parse { ref source_name, .. } if source_name == "bad.toml"
        ));
    }

    #[test]
    fn diff_reports_changed_added_and_removed() {
        let old = snap("[lqr]\nP = 5.0\nR = 1.0\naction_max = 1.0\n");
        let new = snap("[lqr]\nP = 7.0\nR = 1.0\nstate_bound = 50\n");
        let diff = old.diff(&new);

        assert_eq!(
            diff.changed,
            vec![
                ScalarChange {
                    key: "lqr.P".into(),
                    value: 7.0
                },
                ScalarChange {
                    key: "lqr.state_bound".into(),
                    value: 50.0
                },
            ]
        );
        assert_eq!(diff.removed, vec!["lqr.action_max".to_string()]);
    }

    #[test]
    fn diff_of_equal_values_is_empty() {
        let old = snap("P = 5.0\n# comment\n");
        let new = snap("# reformatted\nP = 5.0\n");
        assert!(old.diff(&new).is_empty());
    }

    #[test]
    fn numeric_to_string_counts_as_removed() {
        let old = snap("P = 5.0\n");
        let new = snap("P = \"five\"\n");
        let diff = old.diff(&new);
        assert!(diff.changed.is_empty());
        assert_eq!(diff.removed, vec!["P".to_string()]);
    }

    #[test]
    fn succeed_bumps_version() {
        let first = snap("P = 1.0");
        let second = first.succeed(snap("P = 2.0"));
        assert_eq!(second.version(), 1);
        assert_eq!(second.get("P"), Some(2.0));
    }

    #[test]
    fn scalar_change_leaf() {
        let c = ScalarChange {
            key: "lqr.P".into(),
            value: 1.0,
        };
        assert_eq!(c.leaf(), "P");
        let top = ScalarChange {
            key: "dt".into(),
            value: 0.02,
        };
        assert_eq!(top.leaf(), "dt");
    }
}
