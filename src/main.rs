use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use kaiedit::config::{self, Settings};
use kaiedit::decode;
use kaiedit::format;
use kaiedit::lyrics::LyricEditor;
use kaiedit::models::DecodedAudio;
use kaiedit::spectrum::analyze_offline;
use kaiedit::store;
use kaiedit::waveform::extract_envelope;

#[derive(Parser)]
#[command(name = "kaiedit", about = "Karaoke lyric timing editor")]
struct Cli {
    /// Song JSON file
    song: Option<PathBuf>,

    /// Audio file for the song, or "-" for STDIN
    #[arg(long)]
    audio: Option<String>,

    /// Format hint for STDIN (e.g. flac, mp3, wav)
    #[arg(long)]
    format: Option<String>,

    /// Print the waveform envelope of --audio
    #[arg(long)]
    envelope: bool,

    /// Envelope bucket count (overrides the settings file)
    #[arg(long)]
    samples: Option<usize>,

    /// Print spectral analysis frames of --audio
    #[arg(long)]
    spectrum: bool,

    /// Output as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Launch interactive editor
    #[arg(long)]
    tui: bool,

    /// Normalize the song's lyrics and corrections and save it
    #[arg(long)]
    rewrite: bool,

    /// Settings file (default: ~/.config/kaiedit/settings.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Store the vocal analysis preference in the settings file
    #[arg(long)]
    analyze_vocals: Option<bool>,
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();
}

fn decode_audio(source: &str, format_hint: Option<&str>) -> Result<DecodedAudio> {
    if source == "-" {
        let fmt = format_hint.context("--format is required when reading from STDIN (e.g. --format wav)")?;
        return decode::decode_stdin(fmt);
    }
    let path = Path::new(source);
    if !decode::is_audio_file(path) {
        log::warn!("{} does not have a known audio extension", path.display());
    }
    decode::decode_file(path)
}

fn print_envelope(audio: &DecodedAudio, sample_count: usize, as_json: bool) -> Result<()> {
    let envelope = extract_envelope(&audio.samples, sample_count)
        .with_context(|| format!("Cannot build envelope for {}", audio.title))?;
    if as_json {
        println!(
            "{}",
            format::format_json(&json!({
                "title": audio.title,
                "duration_secs": audio.duration_secs,
                "sample_rate": audio.sample_rate,
                "envelope": envelope,
            }))
        );
    } else {
        println!("{}", audio.title);
        println!("{}", format::format_envelope(&envelope, audio.duration_secs));
    }
    Ok(())
}

fn print_spectrum(audio: &DecodedAudio, settings: &Settings, as_json: bool) {
    let analyzer = settings.analyzer.analyzer_config();
    let start = Instant::now();
    let frames = analyze_offline(&audio.samples, settings.analyzer.block_size, analyzer);
    log::info!(
        "analyzed {} samples into {} frames in {:.2}s",
        audio.samples.len(),
        frames.len(),
        start.elapsed().as_secs_f64()
    );

    if as_json {
        println!(
            "{}",
            format::format_json(&json!({
                "title": audio.title,
                "fft_size": analyzer.fft_size,
                "analysis_interval": analyzer.analysis_interval,
                "block_size": settings.analyzer.block_size,
                "frames": frames,
            }))
        );
    } else {
        println!("{}", audio.title);
        println!("{}", format::format_bands(&frames));
    }
}

fn rewrite_song(path: &Path) -> Result<()> {
    let mut song = store::load_song(path)?;
    let corrections = song.corrections();
    let lines = song.lyrics();
    song.apply_edits(&lines, &corrections.rejections(), &corrections.suggestions())?;
    store::save_song(path, &song)?;
    eprintln!("Rewrote {}", path.display());
    Ok(())
}

fn print_song(path: &Path, as_json: bool) -> Result<()> {
    let song = store::load_song(path)?;
    let corrections = song.corrections();
    let mut editor = LyricEditor::new();
    editor.load(&song.lyrics(), &corrections.rejections(), &corrections.suggestions());

    if as_json {
        let mut out = corrections.clone();
        out.set_records(editor.rejections(), editor.suggestions());
        println!(
            "{}",
            format::format_json(&json!({
                "title": song.title(),
                "lyrics": editor.edited_lyrics(),
                "corrections": out,
            }))
        );
        return Ok(());
    }

    if let Some(title) = song.title() {
        println!("{}\n", title);
    }
    println!("{}", format::format_display_list(&editor));
    if !editor.suggestions().is_empty() {
        println!("\nSuggested missing lines:");
        print!("{}", format::format_suggestions(editor.suggestions()));
    }
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    if cli.tui && (cli.envelope || cli.spectrum || cli.rewrite) {
        anyhow::bail!("--tui cannot be used with --envelope, --spectrum or --rewrite");
    }
    if (cli.envelope || cli.spectrum) && cli.audio.is_none() {
        anyhow::bail!("--envelope and --spectrum require --audio");
    }

    let settings_path = cli.config.clone().unwrap_or_else(config::default_settings_path);
    let mut settings = config::load_settings(&settings_path);

    if let Some(analyze) = cli.analyze_vocals {
        settings.analyze_vocals = analyze;
        config::save_settings(&settings, &settings_path)?;
        eprintln!(
            "Vocal analysis {} ({})",
            if analyze { "enabled" } else { "disabled" },
            settings_path.display()
        );
    }

    if let Some(samples) = cli.samples {
        settings.waveform.sample_count = samples;
    }

    // Audio analysis mode
    if cli.envelope || cli.spectrum {
        let source = cli.audio.as_deref().unwrap_or("-");
        let audio = decode_audio(source, cli.format.as_deref())?;
        if cli.envelope {
            print_envelope(&audio, settings.waveform.sample_count, cli.json)?;
        }
        if cli.spectrum {
            print_spectrum(&audio, &settings, cli.json);
        }
        return Ok(());
    }

    let Some(song_path) = cli.song.as_deref() else {
        if cli.analyze_vocals.is_some() {
            return Ok(());
        }
        anyhow::bail!("No song file given");
    };

    if cli.tui {
        let audio_path = match cli.audio.as_deref() {
            Some("-") => anyhow::bail!("--tui cannot read audio from STDIN"),
            Some(path) => Some(PathBuf::from(path)),
            None => None,
        };
        return kaiedit::tui::run(song_path, audio_path, settings);
    }

    if cli.rewrite {
        return rewrite_song(song_path);
    }

    print_song(song_path, cli.json)
}
