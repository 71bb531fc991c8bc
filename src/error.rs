use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WaveformError {
    #[error("envelope sample count must be greater than zero")]
    EmptyTarget,

    #[error("audio too short for envelope: {available} samples available, {requested} requested")]
    InsufficientAudio { available: usize, requested: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LyricsError {
    #[error("lyric line {index} out of range (have {len})")]
    LineOutOfRange { index: usize, len: usize },

    #[error("rejection {index} out of range (have {len})")]
    RejectionOutOfRange { index: usize, len: usize },
}
