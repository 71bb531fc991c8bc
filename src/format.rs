use serde::Serialize;

use crate::lyrics::{DisplayEntry, LyricEditor};
use crate::models::{BandEnergy, LyricLine, RejectionRecord, SuggestionRecord, WaveformEnvelope};

const SPARK_CHARS: [char; 8] = [
    '\u{2581}', '\u{2582}', '\u{2583}', '\u{2584}', '\u{2585}', '\u{2586}', '\u{2587}', '\u{2588}',
];
const SPARK_WIDTH: usize = 64;
const UNKNOWN: &str = "Unknown";

/// Format a duration in seconds as "M:SS".
pub fn format_duration(secs: f64) -> String {
    let total_secs = secs.max(0.0).round() as u64;
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    format!("{}:{:02}", minutes, seconds)
}

/// Format a timestamp in seconds as "M:SS.ss".
pub fn format_time(secs: f64) -> String {
    let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
    let centis = (secs * 100.0).round() as u64;
    let minutes = centis / 6000;
    let rest = centis % 6000;
    format!("{}:{:02}.{:02}", minutes, rest / 100, rest % 100)
}

fn format_percent(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.0}%", v * 100.0))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn or_unknown(text: &str) -> &str {
    if text.is_empty() {
        UNKNOWN
    } else {
        text
    }
}

fn line_flags(line: &LyricLine) -> String {
    let mut flags = String::new();
    if line.backup {
        flags.push_str("[B]");
    }
    if line.disabled {
        flags.push_str("[D]");
    }
    flags
}

/// One lyric row of the display table.
pub fn format_line_row(number: usize, line: &LyricLine) -> String {
    format!(
        "{:<4} {:>9} {:>9}  {:<6} {}",
        number,
        format_time(line.start),
        format_time(line.end),
        line_flags(line),
        line.text,
    )
}

/// The boxed rejection note shown under its line.
pub fn format_rejection(rejection: &RejectionRecord) -> String {
    format!(
        "     \u{21b3} rejected: \"{}\" \u{2192} \"{}\" ({}; retention {}, needs {:.0}%)",
        rejection.old_text,
        rejection.new_text,
        or_unknown(&rejection.reason),
        format_percent(rejection.retention_rate),
        rejection.min_retention * 100.0,
    )
}

/// Lines and rejections merged in display order.
pub fn format_display_list(editor: &LyricEditor) -> String {
    let separator = "\u{2500}".repeat(64);
    let mut output = String::new();

    output.push_str(&format!(
        "{:<4} {:>9} {:>9}  {:<6} {}\n",
        "#", "Start", "End", "Flags", "Text"
    ));
    output.push_str(&separator);
    output.push('\n');

    for entry in editor.display_list() {
        match entry {
            DisplayEntry::Line(i) => {
                output.push_str(&format_line_row(i + 1, &editor.lines()[i]));
            }
            DisplayEntry::Rejection(i) => {
                output.push_str(&format_rejection(&editor.rejections()[i]));
            }
        }
        output.push('\n');
    }

    output.push_str(&separator);
    output.push('\n');
    output.push_str(&format!(
        "Lines: {}  Backup: {}  Disabled: {}  Rejections: {}  Suggestions: {}",
        editor.lines().len(),
        editor.lines().iter().filter(|l| l.backup).count(),
        editor.lines().iter().filter(|l| l.disabled).count(),
        editor.rejections().len(),
        editor.suggestions().len(),
    ));

    output
}

/// Suggested missing lines, one per row.
pub fn format_suggestions(suggestions: &[SuggestionRecord]) -> String {
    let mut output = String::new();
    for s in suggestions {
        let confidence = s
            .confidence
            .map(|c| format!("{:.0}%", c * 100.0))
            .unwrap_or_else(|| UNKNOWN.to_string());
        let pitch = s
            .pitch_activity
            .as_ref()
            .map(|p| p.to_string())
            .unwrap_or_else(|| UNKNOWN.to_string());
        output.push_str(&format!(
            "{:>9} {:>9}  \"{}\" (confidence {}, pitch {}, {})\n",
            format_time(s.start_time),
            format_time(s.end_time),
            s.suggested_text,
            confidence,
            pitch,
            or_unknown(&s.reason),
        ));
    }
    output
}

/// Envelope summary with a one-line sparkline.
pub fn format_envelope(envelope: &WaveformEnvelope, duration_secs: f64) -> String {
    let peaks = envelope.samples();
    let max = peaks.iter().copied().max().unwrap_or(0);
    let mean = if peaks.is_empty() {
        0.0
    } else {
        peaks.iter().map(|&v| v as f64).sum::<f64>() / peaks.len() as f64
    };

    let width = SPARK_WIDTH.min(peaks.len());
    let spark: String = (0..width)
        .map(|col| {
            let start = col * peaks.len() / width;
            let end = ((col + 1) * peaks.len() / width).max(start + 1);
            let peak = peaks[start..end].iter().copied().max().unwrap_or(0).max(0) as usize;
            SPARK_CHARS[(peak * (SPARK_CHARS.len() - 1)) / 127]
        })
        .collect();

    format!(
        "Samples:  {}\nDuration: {}\nPeak:     {}\nMean:     {:.1}\n{}",
        envelope.len(),
        format_duration(duration_secs),
        max,
        mean,
        spark,
    )
}

/// Analysis frames as a table, followed by their averages.
pub fn format_bands(frames: &[BandEnergy]) -> String {
    let separator = "\u{2500}".repeat(50);
    let mut output = format!(
        "{:>6} {:>8} {:>8} {:>8} {:>8} {:>8}\n{}\n",
        "#", "Energy", "Bass", "Mid", "Treble", "Centroid", separator
    );
    for (i, f) in frames.iter().enumerate() {
        output.push_str(&format!(
            "{:>6} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>8.3}\n",
            i, f.energy, f.bass, f.mid, f.treble, f.centroid
        ));
    }
    output.push_str(&separator);
    output.push('\n');

    let n = frames.len().max(1) as f32;
    let avg = |get: fn(&BandEnergy) -> f32| frames.iter().map(get).sum::<f32>() / n;
    output.push_str(&format!(
        "{:>6} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>8.3}\nFrames: {}",
        "avg",
        avg(|f| f.energy),
        avg(|f| f.bass),
        avg(|f| f.mid),
        avg(|f| f.treble),
        avg(|f| f.centroid),
        frames.len(),
    ));
    output
}

/// Pretty-printed JSON of any serializable value.
pub fn format_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
