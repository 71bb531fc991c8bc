use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Word-retention floor a correction had to clear to be accepted.
pub const MIN_WORD_RETENTION: f64 = 0.5;

fn is_false(value: &bool) -> bool {
    !*value
}

/// One time-ranged lyric entry. `end > start` is expected but not enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub backup: bool,
}

impl LyricLine {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            disabled: false,
            backup: false,
        }
    }
}

/// A correction that was proposed for a line but not applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectionRecord {
    /// 1-based lyric line number
    pub line_num: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub old_text: String,
    pub new_text: String,
    pub reason: String,
    /// Fraction of the original words kept by the proposed text
    pub retention_rate: Option<f64>,
    pub min_retention: f64,
}

/// Pitch activity attached to a suggested line. Historical files store it
/// as a flag, a level or a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PitchActivity {
    Flag(bool),
    Level(f64),
    Label(String),
}

impl fmt::Display for PitchActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PitchActivity::Flag(true) => write!(f, "yes"),
            PitchActivity::Flag(false) => write!(f, "no"),
            PitchActivity::Level(v) => write!(f, "{:.2}", v),
            PitchActivity::Label(s) => write!(f, "{}", s),
        }
    }
}

/// A line the transcription pass thinks is missing from the lyrics.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionRecord {
    pub suggested_text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub confidence: Option<f64>,
    pub reason: String,
    pub pitch_activity: Option<PitchActivity>,
}

/// Fixed-length peak envelope of an audio source, one signed byte per bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WaveformEnvelope(Vec<i8>);

impl WaveformEnvelope {
    pub(crate) fn from_peaks(peaks: Vec<i8>) -> Self {
        Self(peaks)
    }

    pub fn samples(&self) -> &[i8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One analysis frame from the spectral analyzer. Every field is in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandEnergy {
    pub energy: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub centroid: f32,
}

/// Decoded audio ready for analysis. `samples` holds the first channel.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
    pub duration_secs: f64,
    pub title: String,
}

/// Sent from the extraction worker to the UI. Every event carries the
/// generation of the load that produced it.
pub enum LoadEvent {
    Progress {
        generation: u64,
        percent: f32,
    },
    Completed {
        generation: u64,
        envelope: WaveformEnvelope,
        audio: Arc<DecodedAudio>,
    },
    Failed {
        generation: u64,
        message: String,
    },
}
