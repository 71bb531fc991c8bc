use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use assert_cmd::cargo::cargo_bin_cmd;
use kaiedit::decode;
use kaiedit::models::LoadEvent;
use kaiedit::spectrum::{analyze_offline, AnalyzerConfig};
use kaiedit::waveform::{extract_envelope, spawn_extraction, Applied, WaveformState};
use serde_json::{json, Value};

/// Generate a WAV file with a pure sine wave at a given frequency and amplitude.
/// Returns the path to the temporary WAV file.
fn generate_sine_wav(
    dir: &std::path::Path,
    filename: &str,
    frequency: f64,
    amplitude: f32,
    duration_secs: f64,
    sample_rate: u32,
) -> PathBuf {
    let num_channels: u16 = 1;
    let bits_per_sample: u16 = 16;
    let num_samples = (sample_rate as f64 * duration_secs) as usize;
    let byte_rate = sample_rate * num_channels as u32 * bits_per_sample as u32 / 8;
    let block_align = num_channels * bits_per_sample / 8;
    let data_size = (num_samples * num_channels as usize * (bits_per_sample as usize / 8)) as u32;

    let path = dir.join(filename);
    let mut file = std::fs::File::create(&path).unwrap();

    // RIFF header
    file.write_all(b"RIFF").unwrap();
    file.write_all(&(36 + data_size).to_le_bytes()).unwrap();
    file.write_all(b"WAVE").unwrap();

    // fmt chunk
    file.write_all(b"fmt ").unwrap();
    file.write_all(&16u32.to_le_bytes()).unwrap(); // chunk size
    file.write_all(&1u16.to_le_bytes()).unwrap(); // PCM
    file.write_all(&num_channels.to_le_bytes()).unwrap();
    file.write_all(&sample_rate.to_le_bytes()).unwrap();
    file.write_all(&byte_rate.to_le_bytes()).unwrap();
    file.write_all(&block_align.to_le_bytes()).unwrap();
    file.write_all(&bits_per_sample.to_le_bytes()).unwrap();

    // data chunk
    file.write_all(b"data").unwrap();
    file.write_all(&data_size.to_le_bytes()).unwrap();

    for i in 0..num_samples {
        let t = i as f64 / sample_rate as f64;
        let sample = amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin() as f32;
        let sample_i16 = (sample * i16::MAX as f32) as i16;
        file.write_all(&sample_i16.to_le_bytes()).unwrap();
    }

    path
}

fn write_song(dir: &std::path::Path, value: &Value) -> PathBuf {
    let path = dir.join("song.json");
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn legacy_song() -> Value {
    json!({
        "meta": {
            "title": "Demo Song",
            "corrections": {
                "rejected": [{
                    "line": 1, "start": 0.5, "end": 2.0,
                    "old": "hello wrld", "new": "yellow world", "reason": ""
                }],
                "missing_lines_suggested": [{
                    "suggested_text": "ooh", "start": 20.0, "end": 21.0,
                    "reason": "vocals without lyrics", "pitch_activity": true
                }],
                "applied": [{"line": 2}]
            }
        },
        "audio": {"sources": ["vocals.mp3"]},
        "lyrics": [
            {"time": 0.5, "end_time": 2.0, "text": "hello world"},
            "bare string line",
            {"start": 7.0, "end": 8.0, "text": "echo", "backup": true}
        ]
    })
}

// --- Decoding and envelope ---

#[test]
fn test_decode_sine_wav() {
    let dir = tempfile::tempdir().unwrap();
    let path = generate_sine_wav(dir.path(), "sine.wav", 440.0, 0.5, 1.0, 8000);

    let audio = decode::decode_file(&path).unwrap();
    assert_eq!(audio.sample_rate, 8000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 8000);
    assert!((audio.duration_secs - 1.0).abs() < 0.01);
    assert_eq!(audio.title, "sine");

    let peak = audio.samples.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
    assert!((peak - 0.5).abs() < 0.02, "peak {}", peak);
}

#[test]
fn test_envelope_of_decoded_sine() {
    let dir = tempfile::tempdir().unwrap();
    let path = generate_sine_wav(dir.path(), "sine.wav", 440.0, 0.99, 1.0, 8000);
    let audio = decode::decode_file(&path).unwrap();

    let envelope = extract_envelope(&audio.samples, 100).unwrap();
    assert_eq!(envelope.len(), 100);
    assert!(envelope.samples().iter().all(|&v| (115..=127).contains(&v)));
}

#[test]
fn test_worker_delivers_completed_event() {
    let dir = tempfile::tempdir().unwrap();
    let path = generate_sine_wav(dir.path(), "sine.wav", 440.0, 0.5, 1.0, 8000);

    let mut state = WaveformState::new();
    let stale = state.begin_load();
    let current = state.begin_load();
    let (tx, rx) = mpsc::channel();
    spawn_extraction(&path, 50, current, tx);

    let mut applied = None;
    while let Ok(event) = rx.recv_timeout(Duration::from_secs(10)) {
        match event {
            LoadEvent::Progress { generation, percent } => {
                assert_eq!(generation, current);
                assert!((0.0..=1.0).contains(&percent));
            }
            LoadEvent::Completed {
                generation,
                envelope,
                audio,
            } => {
                assert_eq!(state.apply(stale, Ok((envelope.clone(), 9.0))), Applied::Stale);
                applied = Some(state.apply(generation, Ok((envelope, audio.duration_secs))));
                break;
            }
            LoadEvent::Failed { message, .. } => panic!("extraction failed: {}", message),
        }
    }

    assert_eq!(applied, Some(Applied::Replaced));
    assert_eq!(state.envelope().unwrap().len(), 50);
    assert!((state.duration() - 1.0).abs() < 0.01);
}

#[test]
fn test_worker_reports_missing_file() {
    let (tx, rx) = mpsc::channel();
    spawn_extraction(std::path::Path::new("/nonexistent/song.wav"), 10, 1, tx);
    match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
        LoadEvent::Failed { generation, message } => {
            assert_eq!(generation, 1);
            assert!(message.contains("Failed to open"));
        }
        _ => panic!("expected a failure event"),
    }
}

#[test]
fn test_offline_spectrum_of_sine() {
    let dir = tempfile::tempdir().unwrap();
    let path = generate_sine_wav(dir.path(), "sine.wav", 440.0, 0.9, 1.0, 8000);
    let audio = decode::decode_file(&path).unwrap();

    // 63 blocks of 128, every 4th analyzed
    let frames = analyze_offline(&audio.samples, 128, AnalyzerConfig::default());
    assert_eq!(frames.len(), 15);
    // 440 Hz at 8 kHz lands in bin 28, inside the mid band
    let last = frames.last().unwrap();
    assert!(last.mid > last.bass, "mid {} bass {}", last.mid, last.bass);
    assert!(last.energy > 0.0);
}

// --- CLI validation tests ---

#[test]
fn test_tui_conflicts_with_batch_flags() {
    cargo_bin_cmd!("kaiedit")
        .args(["song.json", "--tui", "--rewrite"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("--tui cannot be used with"));
}

#[test]
fn test_envelope_requires_audio() {
    cargo_bin_cmd!("kaiedit")
        .args(["--envelope"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("require --audio"));
}

#[test]
fn test_stdin_requires_format() {
    cargo_bin_cmd!("kaiedit")
        .args(["--audio", "-", "--envelope"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("--format is required"));
}

#[test]
fn test_missing_song_file() {
    cargo_bin_cmd!("kaiedit")
        .args(["/nonexistent/song.json"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("Failed to read song file"));
}

// --- Audio analysis CLI ---

#[test]
fn test_cli_envelope_text() {
    let dir = tempfile::tempdir().unwrap();
    let wav = generate_sine_wav(dir.path(), "tone.wav", 440.0, 0.8, 1.0, 8000);

    cargo_bin_cmd!("kaiedit")
        .args(["--audio", wav.to_str().unwrap(), "--envelope", "--samples", "100"])
        .assert()
        .success()
        .stdout(predicates::str::contains("tone"))
        .stdout(predicates::str::contains("Samples:  100"))
        .stdout(predicates::str::contains("Duration: 0:01"));
}

#[test]
fn test_cli_envelope_json() {
    let dir = tempfile::tempdir().unwrap();
    let wav = generate_sine_wav(dir.path(), "tone.wav", 440.0, 0.99, 1.0, 8000);

    let output = cargo_bin_cmd!("kaiedit")
        .args(["--audio", wav.to_str().unwrap(), "--envelope", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["sample_rate"], json!(8000));
    let envelope = value["envelope"].as_array().unwrap();
    assert_eq!(envelope.len(), 1000);
    assert!(envelope.iter().all(|v| v.as_i64().unwrap() <= 127));
}

#[test]
fn test_cli_envelope_rejects_short_audio() {
    let dir = tempfile::tempdir().unwrap();
    let wav = generate_sine_wav(dir.path(), "tone.wav", 440.0, 0.5, 0.1, 8000);

    cargo_bin_cmd!("kaiedit")
        .args(["--audio", wav.to_str().unwrap(), "--envelope", "--samples", "5000"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("Cannot build envelope"));
}

#[test]
fn test_cli_envelope_from_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let wav = generate_sine_wav(dir.path(), "tone.wav", 440.0, 0.5, 1.0, 8000);
    let bytes = std::fs::read(&wav).unwrap();

    cargo_bin_cmd!("kaiedit")
        .args(["--audio", "-", "--format", "wav", "--envelope", "--samples", "10"])
        .write_stdin(bytes)
        .assert()
        .success()
        .stdout(predicates::str::contains("STDIN"))
        .stdout(predicates::str::contains("Samples:  10"));
}

#[test]
fn test_cli_spectrum_json() {
    let dir = tempfile::tempdir().unwrap();
    let wav = generate_sine_wav(dir.path(), "tone.wav", 440.0, 0.9, 1.0, 8000);

    let output = cargo_bin_cmd!("kaiedit")
        .args(["--audio", wav.to_str().unwrap(), "--spectrum", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["fft_size"], json!(512));
    assert_eq!(value["frames"].as_array().unwrap().len(), 15);
}

#[test]
fn test_cli_spectrum_uses_settings() {
    let dir = tempfile::tempdir().unwrap();
    let wav = generate_sine_wav(dir.path(), "tone.wav", 440.0, 0.9, 1.0, 8000);
    let config = dir.path().join("settings.yaml");
    std::fs::write(&config, "analyzer:\n  fft_size: 256\n  analysis_interval: 1\n  block_size: 1000\n").unwrap();

    let output = cargo_bin_cmd!("kaiedit")
        .args(["--audio", wav.to_str().unwrap(), "--spectrum", "--json"])
        .args(["--config", config.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["fft_size"], json!(256));
    assert_eq!(value["frames"].as_array().unwrap().len(), 8);
}

// --- Song CLI ---

#[test]
fn test_cli_display_list() {
    let dir = tempfile::tempdir().unwrap();
    let song = write_song(dir.path(), &legacy_song());

    cargo_bin_cmd!("kaiedit")
        .arg(song.to_str().unwrap())
        .assert()
        .success()
        .stdout(predicates::str::contains("Demo Song"))
        .stdout(predicates::str::contains("bare string line"))
        .stdout(predicates::str::contains("\"hello wrld\" \u{2192} \"yellow world\""))
        .stdout(predicates::str::contains("Unknown"))
        .stdout(predicates::str::contains("[B]"))
        .stdout(predicates::str::contains("Suggested missing lines:"))
        .stdout(predicates::str::contains("pitch yes"));
}

#[test]
fn test_cli_json_normalizes_lines() {
    let dir = tempfile::tempdir().unwrap();
    let song = write_song(dir.path(), &legacy_song());

    let output = cargo_bin_cmd!("kaiedit")
        .args([song.to_str().unwrap(), "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["title"], json!("Demo Song"));
    assert_eq!(
        value["lyrics"][0],
        json!({"start": 0.5, "end": 2.0, "text": "hello world"})
    );
    assert_eq!(
        value["lyrics"][1],
        json!({"start": 3.0, "end": 6.0, "text": "bare string line"})
    );
    assert_eq!(value["lyrics"][2]["backup"], json!(true));
    assert_eq!(value["corrections"]["rejected"][0]["old"], json!("hello wrld"));
    assert_eq!(value["corrections"]["applied"], json!([{"line": 2}]));
}

#[test]
fn test_cli_rewrite_keeps_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let song = write_song(dir.path(), &legacy_song());

    cargo_bin_cmd!("kaiedit")
        .args([song.to_str().unwrap(), "--rewrite"])
        .assert()
        .success()
        .stderr(predicates::str::contains("Rewrote"));

    let value: Value = serde_json::from_str(&std::fs::read_to_string(&song).unwrap()).unwrap();
    assert_eq!(value["lyrics"][0], json!({"start": 0.5, "end": 2.0, "text": "hello world"}));
    assert_eq!(value["audio"]["sources"], json!(["vocals.mp3"]));
    assert_eq!(value["meta"]["title"], json!("Demo Song"));
    assert_eq!(value["meta"]["corrections"]["applied"], json!([{"line": 2}]));
    assert_eq!(
        value["meta"]["corrections"]["missing_lines_suggested"][0]["pitch_activity"],
        json!(true)
    );
}

#[test]
fn test_cli_analyze_vocals_saves_setting() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("conf").join("settings.yaml");

    cargo_bin_cmd!("kaiedit")
        .args(["--analyze-vocals", "true", "--config", config.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicates::str::contains("Vocal analysis enabled"));

    let saved = kaiedit::config::load_settings(&config);
    assert!(saved.analyze_vocals);

    cargo_bin_cmd!("kaiedit")
        .args(["--analyze-vocals", "false", "--config", config.to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicates::str::contains("Vocal analysis disabled"));
    assert!(!kaiedit::config::load_settings(&config).analyze_vocals);
}
