//! Quota history: snapshot persistence, delta computation and change-log rebuild.
//!
//! The log is a JSON array of [`HistoryEntry`] capped at [`MAX_ENTRIES`]. A save
//! only writes when the new snapshot differs from the last entry (unless forced),
//! so a fixed-interval poller does not grow the file while quota is idle.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::extract::{extract_models, extract_user_info};
use crate::models::{
    ChangeLog, CreditChange, CreditKind, Delta, HistoryEntry, ModelChange, ModelDelta,
    ModelRecord, QuotaSnapshot,
};
use crate::utils::round1;

/// Oldest entries are evicted beyond this length
pub const MAX_ENTRIES: usize = 2000;

pub const HISTORY_FILE_NAME: &str = "quota_history.json";

/// Durable storage for the history log
pub trait HistoryStore {
    /// Stored entries, oldest first. Missing or corrupt storage reads as empty;
    /// individual unreadable entries are skipped.
    fn load(&self) -> Vec<HistoryEntry>;

    /// Replace the stored log.
    fn persist(&self, entries: &[HistoryEntry]) -> Result<()>;
}

/// Pretty-printed JSON file store
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `quota_history.json` inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(HISTORY_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for JsonFileStore {
    fn load(&self) -> Vec<HistoryEntry> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        let raw: Vec<Value> = match serde_json::from_str(&contents) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "history unreadable, starting empty");
                return Vec::new();
            }
        };
        let total = raw.len();
        let entries: Vec<HistoryEntry> = raw
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        if entries.len() < total {
            tracing::warn!(
                skipped = total - entries.len(),
                "ignoring unreadable history entries"
            );
        }
        entries
    }

    fn persist(&self, entries: &[HistoryEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(entries).context("serialize history")?;
        fs::write(&self.path, json)
            .with_context(|| format!("write history: {}", self.path.display()))?;
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<Vec<HistoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<HistoryEntry>) -> Self {
        Self {
            entries: RefCell::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl HistoryStore for MemoryStore {
    fn load(&self) -> Vec<HistoryEntry> {
        self.entries.borrow().clone()
    }

    fn persist(&self, entries: &[HistoryEntry]) -> Result<()> {
        *self.entries.borrow_mut() = entries.to_vec();
        Ok(())
    }
}

/// Write the raw response verbatim next to the history, for offline inspection.
pub fn write_raw_response(dir: &Path, data: &Value, now: DateTime<Local>) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = crate::config::raw_dump_path(dir, now);
    let json = serde_json::to_string_pretty(data).context("serialize raw response")?;
    fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// Result of [`HistoryTracker::save`]
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Nothing changed since the last entry; no write happened
    Unchanged,
    Written {
        /// Changes versus the previous entry; `None` for the first entry
        delta: Option<Delta>,
        /// Log length after the write
        total: usize,
    },
}

/// Reduce a raw response to its comparable fields.
pub fn build_snapshot(data: &Value) -> QuotaSnapshot {
    let user = extract_user_info(data);
    let mut snapshot = QuotaSnapshot {
        prompt_credits: user.prompt_credits,
        flow_credits: user.flow_credits,
        models: Vec::new(),
    };
    for m in extract_models(data) {
        snapshot.set_model(&m.label, m.remaining_fraction);
    }
    snapshot
}

fn credit_delta(prev: Option<f64>, curr: Option<f64>) -> Option<f64> {
    match (prev, curr) {
        (Some(p), Some(c)) if c != p => Some(c - p),
        _ => None,
    }
}

/// Label to remaining fraction of an entry; later duplicates win.
fn fractions_by_label(entry: &HistoryEntry) -> HashMap<&str, Option<f64>> {
    entry
        .models
        .iter()
        .map(|m| (m.label.as_str(), m.remaining))
        .collect()
}

/// Field-level changes from `prev` to `curr`.
///
/// Models that disappeared since `prev` produce no entry.
pub fn compute_deltas(prev: &HistoryEntry, curr: &QuotaSnapshot) -> Delta {
    let mut delta = Delta {
        prompt_credits: credit_delta(prev.prompt_credits, curr.prompt_credits),
        flow_credits: credit_delta(prev.flow_credits, curr.flow_credits),
        ..Delta::default()
    };

    let prev_models = fractions_by_label(prev);
    for (label, curr_frac) in &curr.models {
        let Some(curr_frac) = curr_frac else {
            continue;
        };
        match prev_models.get(label.as_str()).copied().flatten() {
            Some(prev_frac) => {
                let diff = round1((curr_frac - prev_frac) * 100.0);
                if diff != 0.0 {
                    delta.models.insert(label.clone(), ModelDelta::Points(diff));
                }
            }
            None => {
                delta.models.insert(label.clone(), ModelDelta::New);
            }
        }
    }

    delta
}

pub fn has_changes(prev: &HistoryEntry, curr: &QuotaSnapshot) -> bool {
    !compute_deltas(prev, curr).is_empty()
}

/// Rebuild every nonzero change across consecutive entries.
///
/// Independent of the stored `deltas` field.
pub fn build_change_log(entries: &[HistoryEntry]) -> ChangeLog {
    let mut log = ChangeLog {
        checks: entries.len(),
        ..ChangeLog::default()
    };

    for pair in entries.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);

        for (kind, before, after) in [
            (CreditKind::Prompt, prev.prompt_credits, curr.prompt_credits),
            (CreditKind::Flow, prev.flow_credits, curr.flow_credits),
        ] {
            if let (Some(before), Some(after)) = (before, after) {
                if after != before {
                    log.credits.push(CreditChange {
                        timestamp: curr.timestamp.clone(),
                        kind,
                        before,
                        after,
                        delta: after - before,
                    });
                }
            }
        }

        let prev_models = fractions_by_label(prev);
        for m in &curr.models {
            let prev_frac = prev_models.get(m.label.as_str()).copied().flatten();
            if let (Some(prev_frac), Some(curr_frac)) = (prev_frac, m.remaining) {
                let diff = round1((curr_frac - prev_frac) * 100.0);
                if diff != 0.0 {
                    log.models
                        .entry(m.label.clone())
                        .or_default()
                        .push(ModelChange {
                            timestamp: curr.timestamp.clone(),
                            before: round1(prev_frac * 100.0),
                            after: round1(curr_frac * 100.0),
                            delta: diff,
                        });
                }
            }
        }
    }

    log
}

/// Appends snapshots to a [`HistoryStore`], skipping no-op writes
pub struct HistoryTracker<S> {
    store: S,
}

impl<S: HistoryStore> HistoryTracker<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn load(&self) -> Vec<HistoryEntry> {
        self.store.load()
    }

    /// Save `data` stamped with the current local time.
    pub fn save(&self, data: &Value, force: bool) -> Result<SaveOutcome> {
        self.save_at(data, force, Local::now())
    }

    /// Save `data` unless it matches the last entry and `force` is false.
    pub fn save_at(&self, data: &Value, force: bool, now: DateTime<Local>) -> Result<SaveOutcome> {
        let mut history = self.store.load();
        let snapshot = build_snapshot(data);

        let delta = history.last().map(|prev| compute_deltas(prev, &snapshot));
        if !force && delta.as_ref().is_some_and(Delta::is_empty) {
            tracing::debug!("quota unchanged, skipping write");
            return Ok(SaveOutcome::Unchanged);
        }
        let delta = delta.filter(|d| !d.is_empty());

        let user = extract_user_info(data);
        let entry = HistoryEntry {
            timestamp: now.to_rfc3339(),
            user: user.email,
            plan: user.plan,
            prompt_credits: user.prompt_credits,
            flow_credits: user.flow_credits,
            models: extract_models(data)
                .into_iter()
                .map(|m| ModelRecord {
                    label: m.label,
                    remaining: m.remaining_fraction,
                    reset_time: m.reset_time,
                })
                .collect(),
            deltas: delta.clone(),
        };

        history.push(entry);
        if history.len() > MAX_ENTRIES {
            let excess = history.len() - MAX_ENTRIES;
            history.drain(..excess);
        }
        self.store.persist(&history)?;
        tracing::debug!(total = history.len(), "history entry written");

        Ok(SaveOutcome::Written {
            delta,
            total: history.len(),
        })
    }

    /// Change log rebuilt from the full stored history.
    pub fn change_log(&self) -> ChangeLog {
        build_change_log(&self.store.load())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(prompt: Option<f64>, models: &[(&str, Option<f64>)]) -> HistoryEntry {
        HistoryEntry {
            timestamp: "2025-01-01T00:00:00+00:00".to_string(),
            user: "a@b.c".to_string(),
            plan: "Pro".to_string(),
            prompt_credits: prompt,
            flow_credits: Some(50.0),
            models: models
                .iter()
                .map(|(l, f)| ModelRecord {
                    label: l.to_string(),
                    remaining: *f,
                    reset_time: None,
                })
                .collect(),
            deltas: None,
        }
    }

    fn snapshot(prompt: Option<f64>, models: &[(&str, Option<f64>)]) -> QuotaSnapshot {
        let mut s = QuotaSnapshot {
            prompt_credits: prompt,
            flow_credits: Some(50.0),
            models: Vec::new(),
        };
        for (l, f) in models {
            s.set_model(l, *f);
        }
        s
    }

    #[test]
    fn test_credit_delta_requires_both_numbers() {
        let prev = entry(None, &[]);
        let d = compute_deltas(&prev, &snapshot(Some(10.0), &[]));
        assert_eq!(d.prompt_credits, None);
        assert!(d.is_empty());
    }

    #[test]
    fn test_null_previous_fraction_counts_as_new() {
        let prev = entry(Some(1.0), &[("Fast", None)]);
        let d = compute_deltas(&prev, &snapshot(Some(1.0), &[("Fast", Some(0.4))]));
        assert_eq!(d.models.get("Fast"), Some(&ModelDelta::New));
    }

    #[test]
    fn test_unknown_current_fraction_is_ignored() {
        let prev = entry(Some(1.0), &[("Fast", Some(0.4))]);
        let d = compute_deltas(&prev, &snapshot(Some(1.0), &[("Fast", None), ("Slow", None)]));
        assert!(d.is_empty());
    }

    #[test]
    fn test_removed_model_is_silent() {
        let prev = entry(Some(1.0), &[("Fast", Some(0.4)), ("Gone", Some(1.0))]);
        let d = compute_deltas(&prev, &snapshot(Some(1.0), &[("Fast", Some(0.4))]));
        assert!(d.is_empty());
        assert!(!has_changes(&prev, &snapshot(Some(1.0), &[("Fast", Some(0.4))])));
    }

    #[test]
    fn test_sub_rounding_change_is_not_a_change() {
        let prev = entry(Some(1.0), &[("Fast", Some(0.5))]);
        let d = compute_deltas(&prev, &snapshot(Some(1.0), &[("Fast", Some(0.5004))]));
        assert!(d.is_empty());
    }

    #[test]
    fn test_build_snapshot_from_response() {
        let data = json!({
            "userStatus": {
                "planStatus": {"availablePromptCredits": 7, "availableFlowCredits": 8},
                "cascadeModelConfigData": {"clientModelConfigs": [
                    {"label": "A", "quotaInfo": {"remainingFraction": 0.5}},
                    {"label": "B"}
                ]}
            }
        });
        let s = build_snapshot(&data);
        assert_eq!(s.prompt_credits, Some(7.0));
        assert_eq!(s.flow_credits, Some(8.0));
        assert_eq!(
            s.models,
            vec![("A".to_string(), Some(0.5)), ("B".to_string(), None)]
        );
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = JsonFileStore::in_dir(dir.path());
        fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_raw_response_is_written_verbatim() {
        let dir = tempfile::TempDir::new().unwrap();
        let data = json!({"userStatus": {"name": "Trần Văn A"}});
        let path = write_raw_response(dir.path(), &data, Local::now()).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("Trần Văn A"));
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), data);
    }

    #[test]
    fn test_missing_file_loads_empty_and_persist_creates_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = JsonFileStore::in_dir(&dir.path().join("nested").join("deeper"));
        assert!(store.load().is_empty());
        store.persist(&[entry(Some(1.0), &[])]).unwrap();
        assert_eq!(store.load().len(), 1);
    }
}
