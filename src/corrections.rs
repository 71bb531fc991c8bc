//! The correction metadata stored with a song, and the translation between
//! its field names and the editor's.
//!
//! Song files in the wild carry lyric lines in several historical shapes;
//! [`normalize_line`] is the only place that knows about them.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::models::{LyricLine, PitchActivity, RejectionRecord, SuggestionRecord, MIN_WORD_RETENTION};

/// Default length of a line whose end time is missing, and the spacing used
/// when a line has no start time at all.
pub const DEFAULT_LINE_SECS: f64 = 3.0;

/// Start-time keys, most preferred first.
const START_KEYS: [&str; 3] = ["start", "time", "start_time"];
/// End-time keys, most preferred first.
const END_KEYS: [&str; 2] = ["end", "end_time"];

const REJECTED_KEY: &str = "rejected";
const SUGGESTED_KEY: &str = "missing_lines_suggested";

/// `null` reads as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Line numbers may be stored as whole floats (`2.0`).
fn line_number<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<f64>::deserialize(deserializer)? {
        None => Ok(0),
        Some(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
        Some(v) => Err(D::Error::custom(format!("invalid line number {}", v))),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedRejection {
    #[serde(default, deserialize_with = "line_number")]
    pub line: usize,
    #[serde(default, deserialize_with = "null_as_default")]
    pub start: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub end: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub old: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub new: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_retention: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedSuggestion {
    #[serde(default, deserialize_with = "null_as_default")]
    pub suggested_text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub start: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch_activity: Option<PitchActivity>,
}

/// `meta.corrections` of a song. Keys this editor does not own are kept in
/// `other` and written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Corrections {
    pub rejected: Vec<PersistedRejection>,
    pub missing_lines_suggested: Vec<PersistedSuggestion>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Parse a stored list one record at a time, skipping records that do not
/// parse. Anything other than an array reads as an empty list.
fn parse_records<T: for<'de> Deserialize<'de>>(key: &str, value: Option<Value>) -> Vec<T> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| match serde_json::from_value(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("skipping malformed {}[{}]: {}", key, i, e);
                    None
                }
            })
            .collect(),
        Some(other) => {
            log::warn!("ignoring {}: expected a list, found {}", key, other);
            Vec::new()
        }
    }
}

impl Corrections {
    /// Parse a corrections object. Malformed records are skipped one by one;
    /// the rest of the object, unknown keys included, is kept.
    pub fn from_value(value: Option<&Value>) -> Self {
        let mut map = match value {
            None | Some(Value::Null) => return Self::default(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                log::warn!("ignoring corrections: expected an object, found {}", other);
                return Self::default();
            }
        };

        let rejected = parse_records(REJECTED_KEY, map.remove(REJECTED_KEY));
        let missing_lines_suggested = parse_records(SUGGESTED_KEY, map.remove(SUGGESTED_KEY));
        Self {
            rejected,
            missing_lines_suggested,
            other: map,
        }
    }

    pub fn rejections(&self) -> Vec<RejectionRecord> {
        self.rejected.iter().map(RejectionRecord::from).collect()
    }

    pub fn suggestions(&self) -> Vec<SuggestionRecord> {
        self.missing_lines_suggested
            .iter()
            .map(SuggestionRecord::from)
            .collect()
    }

    /// Replace the editor-owned lists, keeping everything else.
    pub fn set_records(&mut self, rejections: &[RejectionRecord], suggestions: &[SuggestionRecord]) {
        self.rejected = rejections.iter().map(PersistedRejection::from).collect();
        self.missing_lines_suggested = suggestions.iter().map(PersistedSuggestion::from).collect();
    }
}

impl From<&PersistedRejection> for RejectionRecord {
    fn from(p: &PersistedRejection) -> Self {
        Self {
            line_num: p.line,
            start_time: p.start,
            end_time: p.end,
            old_text: p.old.clone(),
            new_text: p.new.clone(),
            reason: p.reason.clone(),
            retention_rate: p.word_retention,
            min_retention: MIN_WORD_RETENTION,
        }
    }
}

impl From<&RejectionRecord> for PersistedRejection {
    fn from(r: &RejectionRecord) -> Self {
        Self {
            line: r.line_num,
            start: r.start_time,
            end: r.end_time,
            old: r.old_text.clone(),
            new: r.new_text.clone(),
            reason: r.reason.clone(),
            word_retention: r.retention_rate,
        }
    }
}

impl From<&PersistedSuggestion> for SuggestionRecord {
    fn from(p: &PersistedSuggestion) -> Self {
        Self {
            suggested_text: p.suggested_text.clone(),
            start_time: p.start,
            end_time: p.end,
            confidence: p.confidence,
            reason: p.reason.clone(),
            pitch_activity: p.pitch_activity.clone(),
        }
    }
}

impl From<&SuggestionRecord> for PersistedSuggestion {
    fn from(s: &SuggestionRecord) -> Self {
        Self {
            suggested_text: s.suggested_text.clone(),
            start: s.start_time,
            end: s.end_time,
            confidence: s.confidence,
            reason: s.reason.clone(),
            pitch_activity: s.pitch_activity.clone(),
        }
    }
}

fn first_number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_f64))
}

fn flag(obj: &Map<String, Value>, key: &str) -> bool {
    matches!(obj.get(key), Some(Value::Bool(true)))
}

/// Turn one stored lyric entry into a [`LyricLine`].
///
/// A bare string becomes the text of a line at `index * 3` seconds. For
/// objects the start time is the first number among `start`, `time`,
/// `start_time` (else `index * 3`) and the end time the first among `end`,
/// `end_time` (else start + 3). Any other value becomes an empty line at the
/// fallback time.
pub fn normalize_line(index: usize, value: &Value) -> LyricLine {
    let fallback_start = index as f64 * DEFAULT_LINE_SECS;
    match value {
        Value::String(text) => LyricLine::new(fallback_start, fallback_start + DEFAULT_LINE_SECS, text.clone()),
        Value::Object(obj) => {
            let start = first_number(obj, &START_KEYS).unwrap_or(fallback_start);
            let end = first_number(obj, &END_KEYS).unwrap_or(start + DEFAULT_LINE_SECS);
            let text = obj
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            LyricLine {
                start,
                end,
                text,
                disabled: flag(obj, "disabled"),
                backup: flag(obj, "backup"),
            }
        }
        _ => LyricLine::new(fallback_start, fallback_start + DEFAULT_LINE_SECS, ""),
    }
}

pub fn normalize_lines(values: &[Value]) -> Vec<LyricLine> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| normalize_line(i, v))
        .collect()
}
