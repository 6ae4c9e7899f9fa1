use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Result, StepscoreError};

/// Per-track hit arrays keyed by track id.
pub type PatternMap = BTreeMap<String, Vec<bool>>;

/// One instrument lane. Identity is the `id`; the position in the track list is
/// the display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_label: Option<String>,
}

impl Track {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            short_label: None,
        }
    }

    pub fn with_short_label(mut self, short_label: impl Into<String>) -> Self {
        self.short_label = Some(short_label.into());
        self
    }

    /// Label to use where space is tight.
    pub fn display_short(&self) -> &str {
        self.short_label.as_deref().unwrap_or(&self.label)
    }
}

/// Hi-hat, snare and kick, in that display order.
pub fn default_tracks() -> Vec<Track> {
    vec![
        Track::new("hh", "Hi-hat").with_short_label("HH"),
        Track::new("sn", "Snare").with_short_label("SN"),
        Track::new("bd", "Kick").with_short_label("BD"),
    ]
}

/// Drops tracks with an empty id and every repeat of an id after its first
/// appearance.
pub fn dedup_tracks(tracks: Vec<Track>) -> Vec<Track> {
    let mut seen = HashSet::new();
    tracks
        .into_iter()
        .filter(|track| {
            if track.id.is_empty() {
                tracing::debug!("dropping track without an id");
                return false;
            }
            let fresh = seen.insert(track.id.clone());
            if !fresh {
                tracing::debug!(id = %track.id, "dropping duplicate track id");
            }
            fresh
        })
        .collect()
}

/// Index-preserving resize: the overlapping prefix is copied, new slots are
/// `false`, slots past `len` are dropped.
pub fn resize_steps(steps: &[bool], len: usize) -> Vec<bool> {
    let mut resized = vec![false; len];
    let keep = steps.len().min(len);
    resized[..keep].copy_from_slice(&steps[..keep]);
    resized
}

/// Rebuilds `pattern` so that it holds exactly one array of length `steps` per
/// track. Arrays for known ids are resized, missing ids are zero-filled and
/// orphans are dropped.
pub fn normalize_pattern(pattern: &PatternMap, tracks: &[Track], steps: usize) -> PatternMap {
    tracks
        .iter()
        .map(|track| {
            let row = pattern
                .get(&track.id)
                .map(|row| resize_steps(row, steps))
                .unwrap_or_else(|| vec![false; steps]);
            (track.id.clone(), row)
        })
        .collect()
}

/// An all-`false` pattern for the given tracks.
pub fn empty_pattern(tracks: &[Track], steps: usize) -> PatternMap {
    normalize_pattern(&PatternMap::new(), tracks, steps)
}

/// Indices of the hits in a step array.
pub fn active_steps(steps: &[bool]) -> impl Iterator<Item = usize> + '_ {
    steps
        .iter()
        .enumerate()
        .filter_map(|(index, hit)| hit.then_some(index))
}

/// Coerces loosely typed input into a [`PatternMap`].
///
/// Objects map track ids to arrays. Array items are read truthily: booleans as
/// is, numbers when non-zero, strings unless empty, `"0"` or `"false"`.
/// Anything that is not an object yields an empty map and non-array entries are
/// skipped. Lengths are left alone; the store resizes on ingestion.
pub fn coerce_pattern(value: &Value) -> PatternMap {
    let Some(object) = value.as_object() else {
        tracing::debug!("pattern input is not an object, ignoring it");
        return PatternMap::new();
    };

    object
        .iter()
        .filter_map(|(id, row)| match row {
            Value::Array(items) => Some((id.clone(), items.iter().map(truthy).collect())),
            _ => {
                tracing::debug!(%id, "skipping pattern entry that is not an array");
                None
            }
        })
        .collect()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !matches!(text.trim(), "" | "0" | "false"),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Parses a JSON document and coerces it with [`coerce_pattern`].
pub fn parse_pattern_json(json: &str) -> Result<PatternMap> {
    let value: Value = serde_json::from_str(json)?;
    Ok(coerce_pattern(&value))
}

/// Parses the compact grid notation used on the command line.
///
/// `x`, `X` and `1` are hits, `.`, `-` and `0` are rests. Whitespace and `|`
/// (bar or beat separators) are ignored.
pub fn parse_steps(grid: &str) -> Result<Vec<bool>> {
    let mut steps = Vec::with_capacity(grid.len());
    for (position, symbol) in grid.chars().enumerate() {
        match symbol {
            'x' | 'X' | '1' => steps.push(true),
            '.' | '-' | '0' => steps.push(false),
            '|' => {}
            c if c.is_whitespace() => {}
            _ => return Err(StepscoreError::InvalidStep { symbol, position }),
        }
    }
    Ok(steps)
}

/// Formats a step array back into compact grid notation.
pub fn format_steps(steps: &[bool]) -> String {
    steps.iter().map(|hit| if *hit { 'x' } else { '.' }).collect()
}
