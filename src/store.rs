use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::corrections::{normalize_lines, Corrections};
use crate::models::{LyricLine, RejectionRecord, SuggestionRecord};

/// A song's JSON document. Only `lyrics` and `meta.corrections` are touched;
/// every other key is written back as it was read.
#[derive(Debug, Clone, PartialEq)]
pub struct SongDocument {
    raw: Value,
}

impl SongDocument {
    pub fn from_value(raw: Value) -> Self {
        let raw = if raw.is_object() {
            raw
        } else {
            log::warn!("song document is not an object, starting from an empty one");
            Value::Object(Map::new())
        };
        Self { raw }
    }

    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    pub fn title(&self) -> Option<&str> {
        self.raw
            .pointer("/meta/title")
            .or_else(|| self.raw.get("title"))
            .and_then(Value::as_str)
    }

    /// Normalized lyric lines. A missing `lyrics` key reads as no lines.
    pub fn lyrics(&self) -> Vec<LyricLine> {
        match self.raw.get("lyrics") {
            Some(Value::Array(values)) => normalize_lines(values),
            _ => Vec::new(),
        }
    }

    pub fn corrections(&self) -> Corrections {
        Corrections::from_value(self.raw.pointer("/meta/corrections"))
    }

    /// Write edited state back into the document.
    pub fn apply_edits(
        &mut self,
        lines: &[LyricLine],
        rejections: &[RejectionRecord],
        suggestions: &[SuggestionRecord],
    ) -> Result<()> {
        let mut corrections = self.corrections();
        corrections.set_records(rejections, suggestions);

        let lyrics = serde_json::to_value(lines).context("Failed to serialize lyrics")?;
        let corrections = serde_json::to_value(&corrections).context("Failed to serialize corrections")?;

        let mut root = match std::mem::take(&mut self.raw) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut meta = match root.remove("meta") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        meta.insert("corrections".to_string(), corrections);
        root.insert("meta".to_string(), Value::Object(meta));
        root.insert("lyrics".to_string(), lyrics);
        self.raw = Value::Object(root);
        Ok(())
    }
}

/// Read a song document from disk.
pub fn load_song(path: &Path) -> Result<SongDocument> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read song file: {}", path.display()))?;
    let raw: Value = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse song file: {}", path.display()))?;
    Ok(SongDocument::from_value(raw))
}

/// Save a song document as pretty-printed JSON.
pub fn save_song(path: &Path, song: &SongDocument) -> Result<()> {
    let json = serde_json::to_string_pretty(&song.raw).context("Failed to serialize song")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write song file: {}", path.display()))?;
    log::info!("saved {}", path.display());
    Ok(())
}
