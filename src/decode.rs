use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::{MetadataOptions, StandardTagKey};
use symphonia::core::probe::Hint;

use crate::models::DecodedAudio;

const AUDIO_EXTENSIONS: &[&str] = &[
    "flac", "mp3", "wav", "ogg", "m4a", "opus", "wv", "aif", "aiff",
];

/// Check if a path has a recognized audio file extension.
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn extract_title(format: &mut dyn FormatReader) -> Option<String> {
    let metadata = format.metadata();
    let current = metadata.current()?;
    current
        .tags()
        .iter()
        .find(|tag| tag.std_key == Some(StandardTagKey::TrackTitle))
        .map(|tag| tag.value.to_string())
}

/// Decode an audio file into its first channel.
pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    decode_file_with_progress(path, |_| {})
}

/// Decode an audio file, reporting progress (0.0..=1.0) by bytes consumed.
pub fn decode_file_with_progress(path: &Path, on_progress: impl Fn(f32)) -> Result<DecodedAudio> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let file_size = file.metadata().map(|m| m.len()).unwrap_or(0);
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let fallback_title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string();

    decode_stream(mss, &hint, &path.display().to_string(), file_size, fallback_title, on_progress)
}

/// Decode audio from STDIN with a format hint.
pub fn decode_stdin(format_hint: &str) -> Result<DecodedAudio> {
    let source = ReadOnlySource::new(std::io::stdin());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format_hint);

    decode_stream(mss, &hint, "STDIN", 0, "STDIN".to_string(), |_| {})
}

fn decode_stream(
    mss: MediaSourceStream,
    hint: &Hint,
    label: &str,
    total_bytes: u64,
    fallback_title: String,
    on_progress: impl Fn(f32),
) -> Result<DecodedAudio> {
    let probed = symphonia::default::get_probe()
        .format(hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Failed to probe {}", label))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .with_context(|| format!("No audio track found in {}", label))?;

    let codec_params = track.codec_params.clone();
    let track_id = track.id;
    let sample_rate = codec_params.sample_rate.unwrap_or(44100);
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(2);

    let title = extract_title(format.as_mut()).unwrap_or(fallback_title);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .context("Failed to create decoder")?;

    let mut samples: Vec<f32> = Vec::new();
    if let Some(frames) = codec_params.n_frames {
        samples.reserve(frames as usize);
    }

    let mut bytes_decoded: u64 = 0;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut sample_buf_capacity: u64 = 0;
    let mut skipped_packets = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(symphonia::core::errors::Error::ResetRequired) => break,
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", label)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        bytes_decoded += packet.data.len() as u64;
        if total_bytes > 0 {
            on_progress((bytes_decoded as f32 / total_bytes as f32).min(1.0));
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => {
                skipped_packets += 1;
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to decode {}", label)),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames() as u64;
        let packet_channels = spec.channels.count().max(1);

        // Reuse the sample buffer across packets; only reallocate when it is too small
        if sample_buf.is_none() || sample_buf_capacity < num_frames {
            sample_buf = Some(SampleBuffer::new(num_frames, spec));
            sample_buf_capacity = num_frames;
        }

        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend(buf.samples().iter().step_by(packet_channels).copied());
        }
    }

    on_progress(1.0);

    if skipped_packets > 0 {
        log::warn!("{}: skipped {} undecodable packets", label, skipped_packets);
    }

    let duration_secs = samples.len() as f64 / sample_rate.max(1) as f64;
    log::debug!(
        "decoded {}: {} frames, {} Hz, {} channels",
        label,
        samples.len(),
        sample_rate,
        channels
    );

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
        duration_secs,
        title,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("track.flac")));
        assert!(is_audio_file(Path::new("track.MP3")));
        assert!(is_audio_file(Path::new("vocals.wav")));
        assert!(is_audio_file(Path::new("song.ogg")));
        assert!(!is_audio_file(Path::new("song.kai")));
        assert!(!is_audio_file(Path::new("lyrics.json")));
    }

    #[test]
    fn test_decode_missing_file_is_error() {
        let err = decode_file(Path::new("/definitely/not/here.wav")).unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }

    #[test]
    fn test_decode_garbage_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"this is not a riff file").unwrap();
        assert!(decode_file(&path).is_err());
    }
}
