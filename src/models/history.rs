//! Persisted quota history records.
//!
//! Field names match the on-disk `quota_history.json` layout, so files written by
//! earlier versions of the checker keep loading. Credit values that were stored as
//! placeholders (`"?"`) load as `None`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::utils::{
    deserialize_lenient, deserialize_lenient_seq, deserialize_non_empty, deserialize_or_default,
};

fn unknown_label() -> String {
    "?".to_string()
}

fn not_available() -> String {
    "N/A".to_string()
}

fn label_or_unknown<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(deserialize_non_empty(deserializer)?.unwrap_or_else(unknown_label))
}

/// Null or non-string text fields (older files store `null` for a missing email or plan)
fn text_or_not_available<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(deserialize_lenient(deserializer)?.unwrap_or_else(not_available))
}

/// One model line inside a history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    #[serde(default = "unknown_label", deserialize_with = "label_or_unknown")]
    pub label: String,
    /// Remaining fraction at the time of the check
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub remaining: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_non_empty"
    )]
    pub reset_time: Option<String>,
}

/// Per-model change between two consecutive snapshots
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelDelta {
    /// Percentage-point change, rounded to one decimal
    Points(f64),
    /// The model had no known fraction in the previous entry
    New,
}

impl Serialize for ModelDelta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ModelDelta::Points(v) => serializer.serialize_f64(*v),
            ModelDelta::New => serializer.serialize_str("NEW"),
        }
    }
}

impl<'de> Deserialize<'de> for ModelDelta {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_f64()
                .map(ModelDelta::Points)
                .ok_or_else(|| serde::de::Error::custom("model delta out of range")),
            Value::String(s) if s == "NEW" => Ok(ModelDelta::New),
            other => Err(serde::de::Error::custom(format!(
                "unexpected model delta: {other}"
            ))),
        }
    }
}

/// Field-level changes versus the previous entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_lenient"
    )]
    pub prompt_credits: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_lenient"
    )]
    pub flow_credits: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub models: BTreeMap<String, ModelDelta>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.prompt_credits.is_none() && self.flow_credits.is_none() && self.models.is_empty()
    }
}

/// A snapshot as written to the history log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default, deserialize_with = "deserialize_or_default")]
    pub timestamp: String,
    /// Account email
    #[serde(default = "not_available", deserialize_with = "text_or_not_available")]
    pub user: String,
    #[serde(default = "not_available", deserialize_with = "text_or_not_available")]
    pub plan: String,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub prompt_credits: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub flow_credits: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_lenient_seq")]
    pub models: Vec<ModelRecord>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_lenient"
    )]
    pub deltas: Option<Delta>,
}

/// Minimal comparable form of a quota response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuotaSnapshot {
    pub prompt_credits: Option<f64>,
    pub flow_credits: Option<f64>,
    /// Label to remaining fraction, in response order with unique labels
    pub models: Vec<(String, Option<f64>)>,
}

impl QuotaSnapshot {
    /// Insert or overwrite a model, keeping the position of the first occurrence.
    pub fn set_model(&mut self, label: &str, fraction: Option<f64>) {
        match self.models.iter_mut().find(|(l, _)| l == label) {
            Some(slot) => slot.1 = fraction,
            None => self.models.push((label.to_string(), fraction)),
        }
    }
}

impl From<&HistoryEntry> for QuotaSnapshot {
    fn from(entry: &HistoryEntry) -> Self {
        let mut snapshot = QuotaSnapshot {
            prompt_credits: entry.prompt_credits,
            flow_credits: entry.flow_credits,
            models: Vec::with_capacity(entry.models.len()),
        };
        for m in &entry.models {
            snapshot.set_model(&m.label, m.remaining);
        }
        snapshot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditKind {
    Prompt,
    Flow,
}

impl CreditKind {
    pub fn label(self) -> &'static str {
        match self {
            CreditKind::Prompt => "Prompt Credits",
            CreditKind::Flow => "Flow Credits",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreditChange {
    pub timestamp: String,
    pub kind: CreditKind,
    pub before: f64,
    pub after: f64,
    pub delta: f64,
}

/// A model quota change; values are percentages rounded to one decimal
#[derive(Debug, Clone, PartialEq)]
pub struct ModelChange {
    pub timestamp: String,
    pub before: f64,
    pub after: f64,
    pub delta: f64,
}

/// Changes rebuilt from consecutive history entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeLog {
    /// Number of entries the log was built from
    pub checks: usize,
    pub credits: Vec<CreditChange>,
    pub models: BTreeMap<String, Vec<ModelChange>>,
}

impl ChangeLog {
    pub fn is_empty(&self) -> bool {
        self.credits.is_empty() && self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_delta_serializes_number_and_marker() {
        let mut delta = Delta::default();
        delta.models.insert("Fast".to_string(), ModelDelta::Points(-20.0));
        delta.models.insert("Slow".to_string(), ModelDelta::New);

        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(json["models"]["Fast"], -20.0);
        assert_eq!(json["models"]["Slow"], "NEW");
        assert!(json.get("prompt_credits").is_none());
    }

    #[test]
    fn test_entry_loads_placeholder_credits_as_none() {
        let raw = r#"{
            "timestamp": "2025-01-02T03:04:05.123456",
            "user": "a@b.c",
            "plan": "Pro",
            "prompt_credits": "?",
            "flow_credits": 50,
            "models": [{"label": "Fast", "remaining": null, "reset_time": ""}],
            "deltas": {"models": {"Fast": "NEW"}}
        }"#;
        let entry: HistoryEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.prompt_credits, None);
        assert_eq!(entry.flow_credits, Some(50.0));
        assert_eq!(entry.models[0].remaining, None);
        assert_eq!(entry.models[0].reset_time, None);
        assert_eq!(
            entry.deltas.unwrap().models.get("Fast"),
            Some(&ModelDelta::New)
        );
    }

    #[test]
    fn test_snapshot_keeps_first_position_for_duplicate_labels() {
        let mut snapshot = QuotaSnapshot::default();
        snapshot.set_model("A", Some(0.1));
        snapshot.set_model("B", Some(0.2));
        snapshot.set_model("A", Some(0.3));
        assert_eq!(
            snapshot.models,
            vec![("A".to_string(), Some(0.3)), ("B".to_string(), Some(0.2))]
        );
    }

    #[test]
    fn test_entry_with_null_text_fields_still_loads() {
        let raw = r#"{
            "timestamp": null,
            "user": null,
            "plan": 3,
            "models": [{"label": null, "remaining": 0.5}, null, {"label": "Fast"}],
            "deltas": {"models": {"Fast": "gone"}}
        }"#;
        let entry: HistoryEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.timestamp, "");
        assert_eq!(entry.user, "N/A");
        assert_eq!(entry.plan, "N/A");
        assert_eq!(entry.models.len(), 2);
        assert_eq!(entry.models[0].label, "?");
        assert_eq!(entry.models[0].remaining, Some(0.5));
        assert_eq!(entry.models[1].label, "Fast");
        assert_eq!(entry.deltas, None);
    }
}
