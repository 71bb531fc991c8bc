//! Lyric timeline model.
//!
//! Lines are kept in editing order, which need not be chronological; lines
//! may overlap. A pristine copy taken at load time backs
//! [`LyricEditor::reset_to_original`]. Rejection and suggestion annotations
//! live beside the lines and are only merged with them for display.
//!
//! Every successful mutation calls the registered listener exactly once with
//! the full current state. Asking the user for confirmation is up to the
//! caller.

use crate::corrections::DEFAULT_LINE_SECS;
use crate::error::LyricsError;
use crate::models::{LyricLine, RejectionRecord, SuggestionRecord};

pub type ChangeListener = Box<dyn FnMut(&[LyricLine], &[RejectionRecord], &[SuggestionRecord]) + Send>;

/// A single-field edit to one line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineEdit {
    Start(f64),
    End(f64),
    Text(String),
    Disabled(bool),
    Backup(bool),
}

/// One row of the merged display list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEntry {
    Line(usize),
    Rejection(usize),
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Snapshot {
    lines: Vec<LyricLine>,
    rejections: Vec<RejectionRecord>,
    suggestions: Vec<SuggestionRecord>,
}

#[derive(Default)]
pub struct LyricEditor {
    current: Snapshot,
    original: Snapshot,
    listener: Option<ChangeListener>,
}

impl LyricEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all state with copies of the given lines and annotations.
    /// The copies also become the target of [`reset_to_original`](Self::reset_to_original).
    pub fn load(&mut self, lines: &[LyricLine], rejections: &[RejectionRecord], suggestions: &[SuggestionRecord]) {
        self.current = Snapshot {
            lines: lines.to_vec(),
            rejections: rejections.to_vec(),
            suggestions: suggestions.to_vec(),
        };
        self.original = self.current.clone();
    }

    /// Register the change listener, replacing any previous one.
    pub fn on_change(&mut self, listener: ChangeListener) {
        self.listener = Some(listener);
    }

    pub fn lines(&self) -> &[LyricLine] {
        &self.current.lines
    }

    pub fn rejections(&self) -> &[RejectionRecord] {
        &self.current.rejections
    }

    pub fn suggestions(&self) -> &[SuggestionRecord] {
        &self.current.suggestions
    }

    pub fn is_modified(&self) -> bool {
        self.current != self.original
    }

    /// The lines as they should be saved. Flags serialize only when set.
    pub fn edited_lyrics(&self) -> Vec<LyricLine> {
        self.current.lines.clone()
    }

    fn notify(&mut self) {
        if let Some(listener) = self.listener.as_mut() {
            listener(
                &self.current.lines,
                &self.current.rejections,
                &self.current.suggestions,
            );
        }
    }

    fn check_line(&self, index: usize) -> Result<(), LyricsError> {
        let len = self.current.lines.len();
        if index >= len {
            return Err(LyricsError::LineOutOfRange { index, len });
        }
        Ok(())
    }

    /// Insert a line right after `index`, starting where that line ends and
    /// ending where the following line starts. Returns the new line's index.
    pub fn add_line_after(&mut self, index: usize) -> Result<usize, LyricsError> {
        self.check_line(index)?;
        let lines = &self.current.lines;

        let current = &lines[index];
        let start = if current.end.is_finite() {
            current.end
        } else {
            current.start + DEFAULT_LINE_SECS
        };
        let end = lines
            .get(index + 1)
            .map(|next| next.start)
            .unwrap_or(start + DEFAULT_LINE_SECS);

        let at = index + 1;
        self.current.lines.insert(at, LyricLine::new(start, end, ""));
        self.notify();
        Ok(at)
    }

    /// Append a line after the last one. Returns the new line's index.
    pub fn add_new_line(&mut self) -> usize {
        let lines = &self.current.lines;
        let start = lines
            .last()
            .map(|last| last.end)
            .unwrap_or(lines.len() as f64 * DEFAULT_LINE_SECS);

        self.current
            .lines
            .push(LyricLine::new(start, start + DEFAULT_LINE_SECS, ""));
        self.notify();
        self.current.lines.len() - 1
    }

    pub fn delete_line(&mut self, index: usize) -> Result<LyricLine, LyricsError> {
        self.check_line(index)?;
        let removed = self.current.lines.remove(index);
        self.notify();
        Ok(removed)
    }

    pub fn delete_rejection(&mut self, index: usize) -> Result<RejectionRecord, LyricsError> {
        let len = self.current.rejections.len();
        if index >= len {
            return Err(LyricsError::RejectionOutOfRange { index, len });
        }
        let removed = self.current.rejections.remove(index);
        self.notify();
        Ok(removed)
    }

    /// Replace one field of one line.
    pub fn update_line(&mut self, index: usize, edit: LineEdit) -> Result<(), LyricsError> {
        self.check_line(index)?;
        let line = &mut self.current.lines[index];
        match edit {
            LineEdit::Start(v) => line.start = v,
            LineEdit::End(v) => line.end = v,
            LineEdit::Text(text) => line.text = text,
            LineEdit::Disabled(v) => line.disabled = v,
            LineEdit::Backup(v) => line.backup = v,
        }
        self.notify();
        Ok(())
    }

    /// Throw away every edit, annotations included.
    pub fn reset_to_original(&mut self) {
        self.current = self.original.clone();
        self.notify();
    }

    /// Lines and rejections in one list ordered by line number. A lyric line
    /// sorts before a rejection that points at it.
    pub fn display_list(&self) -> Vec<DisplayEntry> {
        let lines = (0..self.current.lines.len()).map(|i| (i + 1, 0u8, DisplayEntry::Line(i)));
        let rejections = self
            .current
            .rejections
            .iter()
            .enumerate()
            .map(|(i, r)| (r.line_num, 1u8, DisplayEntry::Rejection(i)));

        let mut merged: Vec<(usize, u8, DisplayEntry)> = lines.chain(rejections).collect();
        merged.sort_by_key(|&(line_num, kind, _)| (line_num, kind));
        merged.into_iter().map(|(_, _, entry)| entry).collect()
    }
}
