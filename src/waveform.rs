//! Waveform envelope extraction and the geometry of the editor overlay.
//!
//! Everything here works on plain data: the renderer asks for trace
//! columns, lyric rectangles and the playhead, then draws them however it
//! likes. The worker at the bottom decodes off the UI thread and tags its
//! result with the generation of the load that requested it.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::decode::decode_file_with_progress;
use crate::error::WaveformError;
use crate::models::{LoadEvent, LyricLine, WaveformEnvelope};

/// Default number of envelope buckets, independent of display width.
pub const DEFAULT_SAMPLE_COUNT: usize = 1000;

/// Top of the lyric band as a fraction of the canvas height.
const LYRIC_BAND_TOP: f64 = 0.25;
/// Height of the lyric band as a fraction of the canvas height.
const LYRIC_BAND_HEIGHT: f64 = 0.5;
/// Playhead tick length as a fraction of the canvas height.
const PLAYHEAD_TICK: f64 = 0.06;

/// Downsample decoded audio into `target` peak buckets.
///
/// The window size is `samples.len() / target` (floor); trailing samples that
/// do not fill a whole window are dropped. Each bucket holds
/// `floor(127 * max |s|)`, clamped to 127 for over-range input.
pub fn extract_envelope(samples: &[f32], target: usize) -> Result<WaveformEnvelope, WaveformError> {
    if target == 0 {
        return Err(WaveformError::EmptyTarget);
    }

    let factor = samples.len() / target;
    if factor == 0 {
        return Err(WaveformError::InsufficientAudio {
            available: samples.len(),
            requested: target,
        });
    }

    let peaks = (0..target)
        .map(|i| {
            let start = i * factor;
            let end = ((i + 1) * factor).min(samples.len());
            let max = samples[start..end]
                .iter()
                .fold(0.0f32, |acc, &s| acc.max(s.abs()));
            (max * 127.0).floor().min(127.0) as i8
        })
        .collect();

    Ok(WaveformEnvelope::from_peaks(peaks))
}

/// One pixel column of the mirrored amplitude trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceColumn {
    pub x: f64,
    pub top: f64,
    pub bottom: f64,
}

/// Scale an envelope to a canvas: one column per pixel, mirrored around the
/// vertical centre.
pub fn envelope_trace(envelope: &WaveformEnvelope, width: usize, height: f64) -> Vec<TraceColumn> {
    if envelope.is_empty() || width == 0 {
        return Vec::new();
    }

    let peaks = envelope.samples();
    let mid = height / 2.0;
    (0..width)
        .map(|x| {
            let idx = (x * peaks.len() / width).min(peaks.len() - 1);
            let half = peaks[idx].max(0) as f64 / 127.0 * mid;
            TraceColumn {
                x: x as f64,
                top: mid - half,
                bottom: mid + half,
            }
        })
        .collect()
}

/// Screen-space box of a lyric line, rebuilt on every redraw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LyricRect {
    pub line: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub backup: bool,
}

impl LyricRect {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

/// Lay out lyric lines over a canvas of `width` x `height`.
///
/// Backup lines come first so they are drawn behind regular lines. Disabled
/// lines are left out.
pub fn lyric_rects(lines: &[LyricLine], duration: f64, width: f64, height: f64) -> Vec<LyricRect> {
    if duration <= 0.0 || !duration.is_finite() {
        return Vec::new();
    }

    let y = height * LYRIC_BAND_TOP;
    let band = height * LYRIC_BAND_HEIGHT;
    let rect = |(index, line): (usize, &LyricLine)| {
        let x = line.start / duration * width;
        let w = ((line.end - line.start) / duration * width).max(0.0);
        LyricRect {
            line: index,
            x,
            y,
            width: w,
            height: band,
            backup: line.backup,
        }
    };

    let backups = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| !l.disabled && l.backup)
        .map(rect);
    let regular = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| !l.disabled && !l.backup)
        .map(rect);

    backups.chain(regular).collect()
}

/// Find the lyric line under a click. The last-drawn rectangle wins.
pub fn hit_test(rects: &[LyricRect], x: f64, y: f64) -> Option<usize> {
    rects.iter().rev().find(|r| r.contains(x, y)).map(|r| r.line)
}

/// Playhead marker: a vertical line with short ticks at top and bottom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Playhead {
    pub x: f64,
    pub height: f64,
    pub tick: f64,
}

/// Position the playhead. `None` until playback has started.
pub fn playhead(position: Option<f64>, duration: f64, width: f64, height: f64) -> Option<Playhead> {
    let position = position?;
    if duration <= 0.0 || !duration.is_finite() {
        return None;
    }
    let x = (position / duration).clamp(0.0, 1.0) * width;
    Some(Playhead {
        x,
        height,
        tick: height * PLAYHEAD_TICK,
    })
}

/// Outcome of offering a worker result to [`WaveformState::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Replaced,
    Stale,
    Failed(String),
}

/// The envelope currently shown, plus the generation of the newest load.
#[derive(Debug, Default)]
pub struct WaveformState {
    envelope: Option<WaveformEnvelope>,
    duration: f64,
    generation: u64,
}

impl WaveformState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn envelope(&self) -> Option<&WaveformEnvelope> {
        self.envelope.as_ref()
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a new load; any result from an earlier generation becomes stale.
    pub fn begin_load(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Offer a finished extraction. Only the newest generation is applied,
    /// and a failure never touches the envelope on display.
    pub fn apply(&mut self, generation: u64, result: Result<(WaveformEnvelope, f64), String>) -> Applied {
        if generation != self.generation {
            log::debug!(
                "discarding stale waveform result (generation {}, current {})",
                generation,
                self.generation
            );
            return Applied::Stale;
        }
        match result {
            Ok((envelope, duration)) => {
                self.envelope = Some(envelope);
                self.duration = duration;
                Applied::Replaced
            }
            Err(message) => {
                log::warn!("waveform analysis failed: {}", message);
                Applied::Failed(message)
            }
        }
    }
}

/// Decode `path` and extract its envelope on a worker thread.
pub fn spawn_extraction(path: &Path, target: usize, generation: u64, sender: Sender<LoadEvent>) {
    let path: PathBuf = path.to_path_buf();
    std::thread::spawn(move || {
        let progress_sender = sender.clone();
        let decoded = decode_file_with_progress(&path, |percent| {
            let _ = progress_sender.send(LoadEvent::Progress { generation, percent });
        });

        let event = match decoded {
            Ok(audio) => match extract_envelope(&audio.samples, target) {
                Ok(envelope) => LoadEvent::Completed {
                    generation,
                    envelope,
                    audio: Arc::new(audio),
                },
                Err(e) => LoadEvent::Failed {
                    generation,
                    message: e.to_string(),
                },
            },
            Err(e) => LoadEvent::Failed {
                generation,
                message: format!("{:#}", e),
            },
        };
        let _ = sender.send(event);
    });
}
