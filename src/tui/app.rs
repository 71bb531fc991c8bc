use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use anyhow::Result;

use crate::config::Settings;
use crate::lyrics::{DisplayEntry, LineEdit, LyricEditor};
use crate::models::{BandEnergy, DecodedAudio, LoadEvent};
use crate::spectrum::{analysis_channel, spawn_live_feed, AnalysisReceiver, LiveFeed, ANALYSIS_QUEUE_CAPACITY};
use crate::store::{load_song, save_song, SongDocument};
use crate::waveform::{hit_test, lyric_rects, spawn_extraction, Applied, LyricRect, WaveformState};

/// Logical size of the waveform canvas. Terminal cells are mapped onto it.
pub const CANVAS_WIDTH: f64 = 1000.0;
pub const CANVAS_HEIGHT: f64 = 100.0;

/// Seconds moved by one nudge of a start or end time.
pub const NUDGE_SECS: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Main,
    About,
    ConfirmDelete,
    ConfirmReset,
    EditText,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioStatus {
    None,
    Loading(f32),
    Ready,
    Error(String),
}

/// Where the waveform pane was last drawn, in terminal cells.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PaneArea {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

struct Playback {
    feed: LiveFeed,
    frames: AnalysisReceiver,
}

pub struct App {
    pub editor: LyricEditor,
    pub song: SongDocument,
    pub song_path: PathBuf,
    pub audio_path: Option<PathBuf>,
    pub settings: Settings,
    pub waveform: WaveformState,
    pub audio_status: AudioStatus,
    pub view: View,
    /// Index into the display list
    pub selected: usize,
    pub scroll_offset: usize,
    /// Visible height of the lyrics list (updated each frame by the renderer)
    pub visible_rows: usize,
    pub waveform_area: PaneArea,
    pub edit_buffer: String,
    pub status: Option<String>,
    pub bands: BandEnergy,
    pub position: Option<f64>,
    pub should_quit: bool,
    /// Set by a first quit request while edits are unsaved
    pub quit_armed: bool,
    audio: Option<Arc<DecodedAudio>>,
    playback: Option<Playback>,
    unsaved: Arc<AtomicBool>,
}

impl App {
    pub fn new(song_path: PathBuf, song: SongDocument, audio_path: Option<PathBuf>, settings: Settings) -> Self {
        let unsaved = Arc::new(AtomicBool::new(false));
        let mut editor = LyricEditor::new();
        let dirty = Arc::clone(&unsaved);
        editor.on_change(Box::new(move |lines, rejections, _| {
            dirty.store(true, Ordering::Relaxed);
            log::trace!("edit: {} lines, {} rejections", lines.len(), rejections.len());
        }));

        let mut app = Self {
            editor,
            song,
            song_path,
            audio_path,
            settings,
            waveform: WaveformState::new(),
            audio_status: AudioStatus::None,
            view: View::Main,
            selected: 0,
            scroll_offset: 0,
            visible_rows: 20,
            waveform_area: PaneArea::default(),
            edit_buffer: String::new(),
            status: None,
            bands: BandEnergy::default(),
            position: None,
            should_quit: false,
            quit_armed: false,
            audio: None,
            playback: None,
            unsaved,
        };
        app.load_editor();
        app
    }

    fn load_editor(&mut self) {
        let corrections = self.song.corrections();
        self.editor
            .load(&self.song.lyrics(), &corrections.rejections(), &corrections.suggestions());
        self.clamp_selection();
        self.mark_saved();
    }

    /// True once the editor has reported a change since the last load, save or reset.
    pub fn has_unsaved_edits(&self) -> bool {
        self.unsaved.load(Ordering::Relaxed)
    }

    fn mark_saved(&mut self) {
        self.unsaved.store(false, Ordering::Relaxed);
        self.quit_armed = false;
    }

    /// Quit, unless there are unsaved edits: then the first request only warns.
    pub fn request_quit(&mut self) {
        if self.has_unsaved_edits() && !self.quit_armed {
            self.quit_armed = true;
            self.status = Some("Unsaved edits, press q again to quit".to_string());
            return;
        }
        self.should_quit = true;
    }

    pub fn title(&self) -> String {
        self.song
            .title()
            .map(String::from)
            .or_else(|| {
                self.song_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| "Untitled".to_string())
    }

    pub fn entries(&self) -> Vec<DisplayEntry> {
        self.editor.display_list()
    }

    pub fn selected_entry(&self) -> Option<DisplayEntry> {
        self.entries().get(self.selected).copied()
    }

    pub fn selected_line(&self) -> Option<usize> {
        match self.selected_entry()? {
            DisplayEntry::Line(i) => Some(i),
            DisplayEntry::Rejection(_) => None,
        }
    }

    pub fn selected_rejection(&self) -> Option<usize> {
        match self.selected_entry()? {
            DisplayEntry::Rejection(i) => Some(i),
            DisplayEntry::Line(_) => None,
        }
    }

    pub fn select_next(&mut self) {
        let len = self.entries().len();
        if len > 0 {
            self.selected = (self.selected + 1).min(len - 1);
            self.ensure_visible();
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
        self.ensure_visible();
    }

    /// Move the selection to lyric line `line`.
    pub fn select_line(&mut self, line: usize) {
        if let Some(pos) = self
            .entries()
            .iter()
            .position(|e| *e == DisplayEntry::Line(line))
        {
            self.selected = pos;
            self.ensure_visible();
        }
    }

    fn clamp_selection(&mut self) {
        let len = self.entries().len();
        self.selected = self.selected.min(len.saturating_sub(1));
        self.ensure_visible();
    }

    /// Adjust scroll_offset so that self.selected is within the visible window.
    fn ensure_visible(&mut self) {
        if self.visible_rows == 0 {
            return;
        }
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        } else if self.selected >= self.scroll_offset + self.visible_rows {
            self.scroll_offset = self.selected - self.visible_rows + 1;
        }
    }

    fn report<T>(&mut self, result: Result<T, crate::error::LyricsError>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.status = Some(e.to_string());
                None
            }
        }
    }

    pub fn add_after_selected(&mut self) {
        let added = match self.selected_line() {
            Some(line) => {
                let result = self.editor.add_line_after(line);
                self.report(result)
            }
            None => Some(self.editor.add_new_line()),
        };
        if let Some(line) = added {
            self.select_line(line);
        }
    }

    pub fn append_line(&mut self) {
        let line = self.editor.add_new_line();
        self.select_line(line);
    }

    /// Ask before deleting the selected line.
    pub fn request_delete(&mut self) {
        if self.selected_line().is_some() {
            self.view = View::ConfirmDelete;
        }
    }

    pub fn confirm_delete(&mut self) {
        self.view = View::Main;
        if let Some(line) = self.selected_line() {
            let result = self.editor.delete_line(line);
            if let Some(removed) = self.report(result) {
                self.status = Some(format!("Deleted \"{}\"", removed.text));
            }
            self.clamp_selection();
        }
    }

    pub fn delete_selected_rejection(&mut self) {
        if let Some(index) = self.selected_rejection() {
            let result = self.editor.delete_rejection(index);
            if self.report(result).is_some() {
                self.status = Some("Rejection removed".to_string());
            }
            self.clamp_selection();
        }
    }

    fn edit_selected(&mut self, make: impl FnOnce(&crate::models::LyricLine) -> LineEdit) {
        if let Some(line) = self.selected_line() {
            let edit = make(&self.editor.lines()[line]);
            let result = self.editor.update_line(line, edit);
            self.report(result);
        }
    }

    pub fn toggle_backup(&mut self) {
        self.edit_selected(|l| LineEdit::Backup(!l.backup));
    }

    pub fn toggle_disabled(&mut self) {
        self.edit_selected(|l| LineEdit::Disabled(!l.disabled));
    }

    pub fn nudge_start(&mut self, delta: f64) {
        self.edit_selected(|l| LineEdit::Start((l.start + delta).max(0.0)));
    }

    pub fn nudge_end(&mut self, delta: f64) {
        self.edit_selected(|l| LineEdit::End((l.end + delta).max(0.0)));
    }

    pub fn begin_edit(&mut self) {
        if let Some(line) = self.selected_line() {
            self.edit_buffer = self.editor.lines()[line].text.clone();
            self.view = View::EditText;
        }
    }

    pub fn commit_edit(&mut self) {
        self.view = View::Main;
        let text = std::mem::take(&mut self.edit_buffer);
        if let Some(line) = self.selected_line() {
            if self.editor.lines()[line].text != text {
                let result = self.editor.update_line(line, LineEdit::Text(text));
                self.report(result);
            }
        }
    }

    pub fn cancel_edit(&mut self) {
        self.edit_buffer.clear();
        self.view = View::Main;
    }

    pub fn request_reset(&mut self) {
        self.view = View::ConfirmReset;
    }

    pub fn confirm_reset(&mut self) {
        self.view = View::Main;
        self.editor.reset_to_original();
        self.clamp_selection();
        self.mark_saved();
        self.status = Some("Reverted to last saved state".to_string());
    }

    /// Write edits to the song file. On failure the edits stay in the editor.
    pub fn save(&mut self) {
        match self.try_save() {
            Ok(()) => {
                self.load_editor();
                self.status = Some(format!("Saved {}", self.song_path.display()));
            }
            Err(e) => {
                log::error!("save failed: {:#}", e);
                self.status = Some(format!("Save failed: {:#}", e));
            }
        }
    }

    fn try_save(&mut self) -> Result<()> {
        let mut song = self.song.clone();
        song.apply_edits(
            &self.editor.edited_lyrics(),
            self.editor.rejections(),
            self.editor.suggestions(),
        )?;
        save_song(&self.song_path, &song)?;
        self.song = song;
        Ok(())
    }

    /// Re-read the song from disk and restart the audio load.
    pub fn reload(&mut self, sender: &Sender<LoadEvent>) {
        match load_song(&self.song_path) {
            Ok(song) => {
                self.song = song;
                self.load_editor();
                self.status = Some("Reloaded".to_string());
            }
            Err(e) => self.status = Some(format!("Reload failed: {:#}", e)),
        }
        self.begin_audio_load(sender);
    }

    pub fn begin_audio_load(&mut self, sender: &Sender<LoadEvent>) {
        self.stop_playback();
        let Some(path) = self.audio_path.clone() else {
            return;
        };
        let generation = self.waveform.begin_load();
        self.audio_status = AudioStatus::Loading(0.0);
        log::info!("loading audio {} (generation {})", path.display(), generation);
        spawn_extraction(&path, self.settings.waveform.sample_count, generation, sender.clone());
    }

    pub fn handle_load_event(&mut self, event: LoadEvent) {
        match event {
            LoadEvent::Progress { generation, percent } => {
                if generation == self.waveform.generation() {
                    self.audio_status = AudioStatus::Loading(percent);
                }
            }
            LoadEvent::Completed {
                generation,
                envelope,
                audio,
            } => {
                if self.waveform.apply(generation, Ok((envelope, audio.duration_secs))) == Applied::Replaced {
                    self.audio = Some(audio);
                    self.audio_status = AudioStatus::Ready;
                }
            }
            LoadEvent::Failed { generation, message } => {
                if let Applied::Failed(message) = self.waveform.apply(generation, Err(message)) {
                    self.audio_status = AudioStatus::Error(message);
                }
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_some()
    }

    /// Start or stop the preview clock from the selected line.
    pub fn toggle_playback(&mut self) {
        if self.playback.is_some() {
            self.stop_playback();
            return;
        }
        let Some(audio) = self.audio.clone() else {
            self.status = Some("No audio loaded".to_string());
            return;
        };
        let start = self
            .selected_line()
            .map(|i| self.editor.lines()[i].start)
            .or(self.position)
            .unwrap_or(0.0);
        let (sender, frames) = analysis_channel(ANALYSIS_QUEUE_CAPACITY);
        let feed = spawn_live_feed(
            audio,
            start,
            self.settings.analyzer.block_size,
            self.settings.analyzer.analyzer_config(),
            sender,
        );
        self.position = Some(start);
        self.playback = Some(Playback { feed, frames });
    }

    pub fn stop_playback(&mut self) {
        if let Some(mut playback) = self.playback.take() {
            playback.feed.stop();
            self.position = Some(playback.feed.position_secs());
        }
        self.bands = BandEnergy::default();
    }

    /// Pull the playhead position and the newest analysis frame.
    pub fn tick(&mut self) {
        let Some(playback) = self.playback.as_mut() else {
            return;
        };
        self.position = Some(playback.feed.position_secs());
        if let Some(frame) = playback.frames.latest() {
            self.bands = frame;
        }
        if playback.feed.is_finished() {
            self.stop_playback();
        }
    }

    pub fn lyric_rects(&self) -> Vec<LyricRect> {
        lyric_rects(
            self.editor.lines(),
            self.waveform.duration(),
            CANVAS_WIDTH,
            CANVAS_HEIGHT,
        )
    }

    /// Map a terminal cell to canvas coordinates, if it is inside the pane.
    pub fn cell_to_canvas(&self, column: u16, row: u16) -> Option<(f64, f64)> {
        let area = self.waveform_area;
        if area.width == 0
            || area.height == 0
            || column < area.x
            || row < area.y
            || column >= area.x + area.width
            || row >= area.y + area.height
        {
            return None;
        }
        let x = (column - area.x) as f64 + 0.5;
        let y = (row - area.y) as f64 + 0.5;
        Some((
            x / area.width as f64 * CANVAS_WIDTH,
            y / area.height as f64 * CANVAS_HEIGHT,
        ))
    }

    /// Select the lyric under a mouse click on the waveform pane.
    pub fn click(&mut self, column: u16, row: u16) {
        let Some((x, y)) = self.cell_to_canvas(column, row) else {
            return;
        };
        if let Some(line) = hit_test(&self.lyric_rects(), x, y) {
            self.select_line(line);
        }
    }
}
