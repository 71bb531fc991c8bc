pub mod app;
pub mod ui;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind, MouseButton,
    MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use crate::config::Settings;
use crate::models::LoadEvent;
use crate::store::load_song;

use app::{App, View, NUDGE_SECS};

/// Open the editor on `song_path`, optionally with the song's audio.
pub fn run(song_path: &Path, audio_path: Option<PathBuf>, settings: Settings) -> Result<()> {
    let song = load_song(song_path)?;
    let mut app = App::new(song_path.to_path_buf(), song, audio_path, settings);

    let (tx, rx) = mpsc::channel::<LoadEvent>();
    app.begin_audio_load(&tx);

    // Setup terminal
    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    io::stdout().execute(EnableMouseCapture)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app, &tx, rx);

    // Restore terminal
    app.stop_playback();
    io::stdout().execute(DisableMouseCapture)?;
    disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    tx: &mpsc::Sender<LoadEvent>,
    rx: mpsc::Receiver<LoadEvent>,
) -> Result<()> {
    loop {
        app.tick();
        terminal.draw(|frame| ui::render(frame, app))?;

        // Drain waveform worker events
        while let Ok(event) = rx.try_recv() {
            app.handle_load_event(event);
        }

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(app, key, tx),
                Event::Mouse(mouse) => {
                    if app.view == View::Main && mouse.kind == MouseEventKind::Down(MouseButton::Left) {
                        app.click(mouse.column, mouse.row);
                    }
                }
                _ => {}
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent, tx: &mpsc::Sender<LoadEvent>) {
    match app.view {
        View::Main => {
            app.status = None;
            if key.code != KeyCode::Char('q') {
                app.quit_armed = false;
            }
            match key.code {
                KeyCode::Char('q') => app.request_quit(),
                KeyCode::Char('j') | KeyCode::Down => app.select_next(),
                KeyCode::Char('k') | KeyCode::Up => app.select_prev(),
                KeyCode::Char('a') => app.add_after_selected(),
                KeyCode::Char('n') => app.append_line(),
                KeyCode::Char('d') => app.request_delete(),
                KeyCode::Char('x') => app.delete_selected_rejection(),
                KeyCode::Char('b') => app.toggle_backup(),
                KeyCode::Char('D') => app.toggle_disabled(),
                KeyCode::Char('[') => app.nudge_start(-NUDGE_SECS),
                KeyCode::Char(']') => app.nudge_start(NUDGE_SECS),
                KeyCode::Char('{') => app.nudge_end(-NUDGE_SECS),
                KeyCode::Char('}') => app.nudge_end(NUDGE_SECS),
                KeyCode::Char('e') | KeyCode::Enter => app.begin_edit(),
                KeyCode::Char(' ') => app.toggle_playback(),
                KeyCode::Char('s') => app.save(),
                KeyCode::Char('r') => app.request_reset(),
                KeyCode::Char('L') => app.reload(tx),
                KeyCode::Char('?') => app.view = View::About,
                _ => {}
            }
        }
        View::About => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?')) {
                app.view = View::Main;
            }
        }
        View::ConfirmDelete => match key.code {
            KeyCode::Char('y') | KeyCode::Enter => app.confirm_delete(),
            KeyCode::Char('n') | KeyCode::Esc => app.view = View::Main,
            _ => {}
        },
        View::ConfirmReset => match key.code {
            KeyCode::Char('y') | KeyCode::Enter => app.confirm_reset(),
            KeyCode::Char('n') | KeyCode::Esc => app.view = View::Main,
            _ => {}
        },
        View::EditText => match key.code {
            KeyCode::Enter => app.commit_edit(),
            KeyCode::Esc => app.cancel_edit(),
            KeyCode::Backspace => {
                app.edit_buffer.pop();
            }
            KeyCode::Char(c) => app.edit_buffer.push(c),
            _ => {}
        },
    }
}
