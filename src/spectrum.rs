//! Real-time spectral analyzer.
//!
//! [`SpectralAnalyzer::process`] is meant to be called from an audio
//! callback: it never allocates, locks or logs. Every call appends the block
//! to a circular buffer; only every `analysis_interval`-th call runs a full
//! pass (Hann window, direct DFT, band split).
//!
//! Results leave the callback through an `rtrb` SPSC ring buffer. Sending
//! never blocks: when the UI falls behind, frames are dropped, and the UI
//! only ever looks at the newest one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::models::{BandEnergy, DecodedAudio};

pub const DEFAULT_FFT_SIZE: usize = 512;
pub const DEFAULT_ANALYSIS_INTERVAL: u32 = 4;
/// Frames per callback when driving the analyzer from decoded audio.
pub const DEFAULT_BLOCK_SIZE: usize = 128;
/// Frames kept in flight between the analyzer and the UI.
pub const ANALYSIS_QUEUE_CAPACITY: usize = 16;

const BASS_GAIN: f32 = 100.0;
const MID_GAIN: f32 = 80.0;
const TREBLE_GAIN: f32 = 60.0;
const ENERGY_GAIN: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub fft_size: usize,
    /// Run a full pass every N callbacks
    pub analysis_interval: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            analysis_interval: DEFAULT_ANALYSIS_INTERVAL,
        }
    }
}

/// Split `n` spectrum bins into bass `[0, bass_end)`, mid `[bass_end, mid_end)`
/// and treble `[mid_end, n)`: the first 10%, the next 30%, the rest.
pub fn band_bounds(n: usize) -> (usize, usize) {
    (n / 10, n * 2 / 5)
}

fn average(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

/// Reduce a magnitude spectrum to scaled band energies and a centroid.
pub fn band_energy(magnitudes: &[f32]) -> BandEnergy {
    let n = magnitudes.len();
    if n == 0 {
        return BandEnergy::default();
    }

    let (bass_end, mid_end) = band_bounds(n);
    let bass = average(&magnitudes[..bass_end]);
    let mid = average(&magnitudes[bass_end..mid_end]);
    let treble = average(&magnitudes[mid_end..]);
    let energy = average(magnitudes);

    let total: f32 = magnitudes.iter().sum();
    let centroid = if total > 0.0 {
        let weighted: f32 = magnitudes
            .iter()
            .enumerate()
            .map(|(k, &m)| k as f32 * m)
            .sum();
        weighted / total / n as f32
    } else {
        0.0
    };

    BandEnergy {
        energy: (energy * ENERGY_GAIN).clamp(0.0, 1.0),
        bass: (bass * BASS_GAIN).clamp(0.0, 1.0),
        mid: (mid * MID_GAIN).clamp(0.0, 1.0),
        treble: (treble * TREBLE_GAIN).clamp(0.0, 1.0),
        centroid: centroid.clamp(0.0, 1.0),
    }
}

pub struct SpectralAnalyzer {
    fft_size: usize,
    interval: u32,
    ring: Vec<f32>,
    write_pos: usize,
    callbacks: u32,
    frame: Vec<f32>,
    window: Vec<f32>,
    cos_table: Vec<f32>,
    sin_table: Vec<f32>,
    magnitudes: Vec<f32>,
}

impl SpectralAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let n = config.fft_size.max(2);
        let tau = 2.0 * std::f32::consts::PI;

        let window = (0..n)
            .map(|i| 0.5 * (1.0 - (tau * i as f32 / (n - 1) as f32).cos()))
            .collect();
        let cos_table = (0..n).map(|j| (tau * j as f32 / n as f32).cos()).collect();
        let sin_table = (0..n).map(|j| (tau * j as f32 / n as f32).sin()).collect();

        Self {
            fft_size: n,
            interval: config.analysis_interval.max(1),
            ring: vec![0.0; 2 * n],
            write_pos: 0,
            callbacks: 0,
            frame: vec![0.0; n],
            window,
            cos_table,
            sin_table,
            magnitudes: vec![0.0; n / 2],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Magnitude spectrum from the most recent pass.
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Feed one audio block. Returns a frame only on analysis callbacks.
    pub fn process(&mut self, block: &[f32]) -> Option<BandEnergy> {
        let len = self.ring.len();
        for &s in block {
            self.ring[self.write_pos] = s;
            self.write_pos = (self.write_pos + 1) % len;
        }

        self.callbacks = self.callbacks.wrapping_add(1);
        if self.callbacks % self.interval != 0 {
            return None;
        }

        self.run_pass();
        Some(band_energy(&self.magnitudes))
    }

    fn run_pass(&mut self) {
        let n = self.fft_size;
        let len = self.ring.len();

        // Oldest of the latest `n` samples sits `n` slots behind the write head
        let start = (self.write_pos + len - n) % len;
        for i in 0..n {
            self.frame[i] = self.ring[(start + i) % len] * self.window[i];
        }

        for (k, magnitude) in self.magnitudes.iter_mut().enumerate() {
            let mut re = 0.0f32;
            let mut im = 0.0f32;
            for (i, &x) in self.frame.iter().enumerate() {
                let j = (k * i) % n;
                re += x * self.cos_table[j];
                im -= x * self.sin_table[j];
            }
            *magnitude = (re * re + im * im).sqrt() / n as f32;
        }
    }
}

/// Create the one-way channel from the analyzer to the UI.
pub fn analysis_channel(capacity: usize) -> (AnalysisSender, AnalysisReceiver) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity.max(1));
    (
        AnalysisSender {
            producer,
            dropped: 0,
        },
        AnalysisReceiver { consumer },
    )
}

/// Analyzer side of the channel.
pub struct AnalysisSender {
    producer: rtrb::Producer<BandEnergy>,
    dropped: u64,
}

impl AnalysisSender {
    /// Queue a frame without blocking. Returns false if it was dropped.
    pub fn send(&mut self, frame: BandEnergy) -> bool {
        match self.producer.push(frame) {
            Ok(()) => true,
            Err(rtrb::PushError::Full(_)) => {
                self.dropped += 1;
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// UI side of the channel.
pub struct AnalysisReceiver {
    consumer: rtrb::Consumer<BandEnergy>,
}

impl AnalysisReceiver {
    /// Drain everything queued and return the newest frame, if any.
    pub fn latest(&mut self) -> Option<BandEnergy> {
        let mut newest = None;
        while let Ok(frame) = self.consumer.pop() {
            newest = Some(frame);
        }
        newest
    }
}

/// The unit that lives inside the audio callback.
pub struct AnalyzerNode {
    analyzer: SpectralAnalyzer,
    sender: AnalysisSender,
}

impl AnalyzerNode {
    pub fn new(config: AnalyzerConfig, sender: AnalysisSender) -> Self {
        Self {
            analyzer: SpectralAnalyzer::new(config),
            sender,
        }
    }

    pub fn process(&mut self, block: &[f32]) {
        if let Some(frame) = self.analyzer.process(block) {
            self.sender.send(frame);
        }
    }

    pub fn dropped(&self) -> u64 {
        self.sender.dropped()
    }
}

/// Run the analyzer over a decoded buffer in fixed-size blocks.
pub fn analyze_offline(samples: &[f32], block_size: usize, config: AnalyzerConfig) -> Vec<BandEnergy> {
    let mut analyzer = SpectralAnalyzer::new(config);
    samples
        .chunks(block_size.max(1))
        .filter_map(|block| analyzer.process(block))
        .collect()
}

/// A feeder thread that plays decoded samples through an [`AnalyzerNode`]
/// at wall-clock pace, standing in for the audio hardware clock.
pub struct LiveFeed {
    stop: Arc<AtomicBool>,
    frames_played: Arc<AtomicU64>,
    sample_rate: u32,
    handle: Option<JoinHandle<()>>,
}

impl LiveFeed {
    pub fn position_secs(&self) -> f64 {
        self.frames_played.load(Ordering::Relaxed) as f64 / self.sample_rate.max(1) as f64
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start feeding `audio` from `start_secs` onwards.
pub fn spawn_live_feed(
    audio: Arc<DecodedAudio>,
    start_secs: f64,
    block_size: usize,
    config: AnalyzerConfig,
    sender: AnalysisSender,
) -> LiveFeed {
    let sample_rate = audio.sample_rate;
    let stop = Arc::new(AtomicBool::new(false));
    let start_frame = ((start_secs.max(0.0) * sample_rate as f64) as usize).min(audio.samples.len());
    let frames_played = Arc::new(AtomicU64::new(start_frame as u64));

    let thread_stop = Arc::clone(&stop);
    let thread_frames = Arc::clone(&frames_played);
    let block_size = block_size.max(1);
    let rate = sample_rate.max(1) as f64;

    let handle = std::thread::spawn(move || {
        let mut node = AnalyzerNode::new(config, sender);
        let started = Instant::now();
        let mut fed = 0usize;

        for block in audio.samples[start_frame..].chunks(block_size) {
            if thread_stop.load(Ordering::Relaxed) {
                break;
            }
            node.process(block);
            fed += block.len();
            thread_frames.store((start_frame + fed) as u64, Ordering::Relaxed);

            let due = Duration::from_secs_f64(fed as f64 / rate);
            let elapsed = started.elapsed();
            if due > elapsed {
                std::thread::sleep(due - elapsed);
            }
        }
        log::debug!("live feed finished, {} frames dropped", node.dropped());
    });

    LiveFeed {
        stop,
        frames_played,
        sample_rate,
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_band_bounds_partition() {
        for n in 0..600 {
            let (bass_end, mid_end) = band_bounds(n);
            assert!(bass_end <= mid_end && mid_end <= n);
            assert_eq!(bass_end, (n as f64 * 0.1).floor() as usize);
            assert_eq!(mid_end, (n as f64 * 0.4).floor() as usize);
            // every bin lands in exactly one band
            let assigned = bass_end + (mid_end - bass_end) + (n - mid_end);
            assert_eq!(assigned, n);
        }
        assert_eq!(band_bounds(256), (25, 102));
    }

    #[test]
    fn test_throttled_passes() {
        let mut analyzer = SpectralAnalyzer::new(AnalyzerConfig::default());
        let block = [0.0f32; 128];
        let results: Vec<bool> = (0..8).map(|_| analyzer.process(&block).is_some()).collect();
        assert_eq!(
            results,
            vec![false, false, false, true, false, false, false, true]
        );
    }

    #[test]
    fn test_silence_is_zero() {
        let frames = analyze_offline(&[0.0; 4096], 128, AnalyzerConfig::default());
        assert_eq!(frames.len(), 8);
        assert!(frames.iter().all(|f| *f == BandEnergy::default()));
    }

    #[test]
    fn test_bass_tone_lands_in_bass() {
        // Bin width 44100/512 ≈ 86 Hz; 200 Hz sits near bin 2 of 256
        let samples = sine(200.0, 44100.0, 8192, 0.8);
        let frames = analyze_offline(&samples, 128, AnalyzerConfig::default());
        let last = frames.last().unwrap();
        assert!(last.bass > last.treble, "bass {} treble {}", last.bass, last.treble);
        assert!(last.centroid < 0.1, "centroid {}", last.centroid);
    }

    #[test]
    fn test_treble_tone_raises_centroid() {
        let samples = sine(15000.0, 44100.0, 8192, 0.8);
        let frames = analyze_offline(&samples, 128, AnalyzerConfig::default());
        let last = frames.last().unwrap();
        assert!(last.treble > last.bass);
        assert!(last.centroid > 0.5, "centroid {}", last.centroid);
    }

    #[test]
    fn test_outputs_clamped() {
        let loud = band_energy(&[5.0; 64]);
        assert_eq!(loud.bass, 1.0);
        assert_eq!(loud.mid, 1.0);
        assert_eq!(loud.treble, 1.0);
        assert_eq!(loud.energy, 1.0);
        assert!(loud.centroid >= 0.0 && loud.centroid <= 1.0);
    }

    #[test]
    fn test_band_gains_below_clamp() {
        // 10 bins: bass [0, 1), mid [1, 4), treble [4, 10)
        let flat = band_energy(&[0.005; 10]);
        assert!((flat.bass - 0.5).abs() < 1e-6, "bass {}", flat.bass);
        assert!((flat.mid - 0.4).abs() < 1e-6, "mid {}", flat.mid);
        assert!((flat.treble - 0.3).abs() < 1e-6, "treble {}", flat.treble);
        assert!((flat.energy - 0.25).abs() < 1e-6, "energy {}", flat.energy);
        // mean bin index 4.5 over 10 bins
        assert!((flat.centroid - 0.45).abs() < 1e-6, "centroid {}", flat.centroid);

        // 20 bins: only the bass band [0, 2) carries energy
        let mut bins = [0.0f32; 20];
        bins[0] = 0.005;
        bins[1] = 0.005;
        let low = band_energy(&bins);
        assert!((low.bass - 0.5).abs() < 1e-6);
        assert_eq!(low.mid, 0.0);
        assert_eq!(low.treble, 0.0);
        assert!((low.energy - 0.025).abs() < 1e-6, "energy {}", low.energy);
    }

    #[test]
    fn test_hann_window_shape() {
        let analyzer = SpectralAnalyzer::new(AnalyzerConfig::default());
        let w = &analyzer.window;
        assert_eq!(w.len(), 512);
        assert!(w[0].abs() < 1e-6);
        assert!(w[511].abs() < 1e-5);
        assert!(w[255] > 0.99 && w[255] <= 1.0);
        assert!(w[256] > 0.99 && w[256] <= 1.0);
        assert!((w[100] - w[411]).abs() < 1e-5);
    }

    #[test]
    fn test_dc_and_tone_normalization() {
        let mut analyzer = SpectralAnalyzer::new(AnalyzerConfig::default());
        for _ in 0..4 {
            analyzer.process(&[1.0; 128]);
        }
        // Hann sum over n points is (n - 1) / 2, divided by n
        let dc = analyzer.magnitudes()[0];
        assert!((dc - 255.5 / 512.0).abs() < 1e-3, "dc {}", dc);
        assert!(analyzer.magnitudes()[10] < 1e-3);

        // Unit sine centred on bin 32 reads about a quarter after windowing
        let tone = sine(32.0 * 44100.0 / 512.0, 44100.0, 512, 1.0);
        let mut analyzer = SpectralAnalyzer::new(AnalyzerConfig::default());
        for block in tone.chunks(128) {
            analyzer.process(block);
        }
        let peak = analyzer.magnitudes()[32];
        assert!((peak - 0.25).abs() < 0.01, "peak {}", peak);
    }

    #[test]
    fn test_wraparound_matches_linear_order() {
        // Feed an odd block size so the write head wraps mid-block
        let samples = sine(1000.0, 44100.0, 3000, 0.5);
        let config = AnalyzerConfig {
            fft_size: 64,
            analysis_interval: 1,
        };
        let mut analyzer = SpectralAnalyzer::new(config);
        for block in samples.chunks(37) {
            analyzer.process(block);
        }

        // Reference: a fresh analyzer fed only the final 64 samples at once
        let mut reference = SpectralAnalyzer::new(config);
        reference.process(&samples[samples.len() - 64..]);

        for (a, b) in analyzer.magnitudes().iter().zip(reference.magnitudes()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_channel_is_lossy_and_latest_wins() {
        let (mut tx, mut rx) = analysis_channel(2);
        let frame = |v: f32| BandEnergy {
            energy: v,
            ..Default::default()
        };
        assert!(tx.send(frame(0.1)));
        assert!(tx.send(frame(0.2)));
        assert!(!tx.send(frame(0.3)));
        assert_eq!(tx.dropped(), 1);

        assert_eq!(rx.latest().unwrap().energy, 0.2);
        assert!(rx.latest().is_none());
    }

    #[test]
    fn test_node_forwards_frames() {
        let (tx, mut rx) = analysis_channel(ANALYSIS_QUEUE_CAPACITY);
        let mut node = AnalyzerNode::new(AnalyzerConfig::default(), tx);
        let samples = sine(440.0, 44100.0, 1024, 0.5);
        for block in samples.chunks(128) {
            node.process(block);
        }
        assert!(rx.latest().is_some());
        assert_eq!(node.dropped(), 0);
    }

    #[test]
    fn test_live_feed_runs_to_end() {
        let audio = Arc::new(DecodedAudio {
            samples: sine(440.0, 8000.0, 800, 0.5),
            sample_rate: 8000,
            channels: 1,
            duration_secs: 0.1,
            title: "tone".to_string(),
        });
        let (tx, mut rx) = analysis_channel(64);
        let mut feed = spawn_live_feed(Arc::clone(&audio), 0.0, 100, AnalyzerConfig::default(), tx);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !feed.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        feed.stop();
        assert!((feed.position_secs() - 0.1).abs() < 1e-9);
        assert!(rx.latest().is_some());
    }
}
