//! Waveform monitor
//!
//! Real-time visual feedback derived from the live input signal, decoupled
//! from the recording pipeline: the monitor opens its own handle on the same
//! physical microphone, so a visualization glitch can never affect
//! transcription. A tick loop at ~30fps reads frequency-domain bytes from the
//! analyzer, stores the mean amplitude as the displayed level, and renders one
//! bar per bin onto a caller-supplied surface.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::device::{CaptureDevice, InputHints, OpenInput, StreamHandle};

/// Analysis window size; the analyzer exposes `FFT_SIZE / 2` frequency bins.
pub const FFT_SIZE: usize = 256;

/// Number of frequency bins.
pub const BIN_COUNT: usize = FFT_SIZE / 2;

/// Per-bin exponential time smoothing constant.
const SMOOTHING: f32 = 0.8;

/// Frame interval for the ~30fps tick loop.
const FRAME_INTERVAL_MS: u64 = 33;

/// Byte mapping range, in decibels.
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;

/// Bars occupy at most this fraction of the surface height.
const BAR_HEIGHT_SCALE: f32 = 0.8;

/// 256-point frequency analyzer over the most recent input samples.
///
/// Magnitudes are time-smoothed per bin and mapped onto 0-255 over the
/// [-100 dB, -30 dB] range.
pub struct FrequencyAnalyzer {
    window: VecDeque<f32>,
    smoothed: [f32; BIN_COUNT],
}

impl FrequencyAnalyzer {
    pub fn new() -> Self {
        Self {
            window: VecDeque::with_capacity(FFT_SIZE),
            smoothed: [0.0; BIN_COUNT],
        }
    }

    /// Feed PCM samples; only the latest `FFT_SIZE` are kept.
    pub fn push_samples(&mut self, samples: &[i16]) {
        for &sample in samples {
            if self.window.len() == FFT_SIZE {
                self.window.pop_front();
            }
            self.window.push_back(sample as f32 / i16::MAX as f32);
        }
    }

    /// Current frequency-domain bytes, one per bin.
    pub fn frequency_bytes(&mut self) -> [u8; BIN_COUNT] {
        let mut re = [0.0f32; FFT_SIZE];
        let mut im = [0.0f32; FFT_SIZE];

        for (i, &sample) in self.window.iter().enumerate() {
            // Hann window
            let w = 0.5 - 0.5 * (2.0 * PI * i as f32 / (FFT_SIZE - 1) as f32).cos();
            re[i] = sample * w;
        }

        fft_in_place(&mut re, &mut im);

        let mut out = [0u8; BIN_COUNT];
        for (bin, byte) in out.iter_mut().enumerate() {
            let magnitude =
                (re[bin] * re[bin] + im[bin] * im[bin]).sqrt() / (FFT_SIZE as f32 / 2.0);
            self.smoothed[bin] = SMOOTHING * self.smoothed[bin] + (1.0 - SMOOTHING) * magnitude;

            let db = 20.0 * self.smoothed[bin].max(1e-10).log10();
            let scaled = (db - MIN_DB) / (MAX_DB - MIN_DB);
            *byte = (scaled.clamp(0.0, 1.0) * 255.0) as u8;
        }
        out
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.smoothed = [0.0; BIN_COUNT];
    }
}

impl Default for FrequencyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterative radix-2 FFT. Input length must be a power of two.
fn fft_in_place(re: &mut [f32], im: &mut [f32]) {
    let n = re.len();

    // Bit-reversal permutation
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    // Butterfly stages
    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f32;
        let (step_re, step_im) = (angle.cos(), angle.sin());
        let mut start = 0;
        while start < n {
            let (mut w_re, mut w_im) = (1.0f32, 0.0f32);
            for k in 0..len / 2 {
                let (a_re, a_im) = (re[start + k], im[start + k]);
                let (b_re, b_im) = (re[start + k + len / 2], im[start + k + len / 2]);
                let (t_re, t_im) = (b_re * w_re - b_im * w_im, b_re * w_im + b_im * w_re);

                re[start + k] = a_re + t_re;
                im[start + k] = a_im + t_im;
                re[start + k + len / 2] = a_re - t_re;
                im[start + k + len / 2] = a_im - t_im;

                let next_re = w_re * step_re - w_im * step_im;
                w_im = w_re * step_im + w_im * step_re;
                w_re = next_re;
            }
            start += len;
        }
        len <<= 1;
    }
}

/// One rendered bar: height as a fraction of the surface, hue in degrees
/// (120 = green for quiet, 0 = red for loud).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformBar {
    pub height: f32,
    pub hue: f32,
}

/// Where the monitor draws. The host supplies the actual rendering.
pub trait RenderSurface: Send {
    fn draw(&mut self, bars: &[WaveformBar]);
    fn clear(&mut self);
}

type SharedSurface = Arc<Mutex<Box<dyn RenderSurface>>>;

/// Drives the visualization while a recording is in progress.
pub struct WaveformMonitor {
    device: Arc<dyn CaptureDevice>,
    surface: SharedSurface,
    level: Arc<AtomicU8>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl WaveformMonitor {
    pub fn new(device: Arc<dyn CaptureDevice>, surface: Box<dyn RenderSurface>) -> Self {
        Self {
            device,
            surface: Arc::new(Mutex::new(surface)),
            level: Arc::new(AtomicU8::new(0)),
            stop_tx: None,
            task: None,
        }
    }

    /// Open the device and start the tick loop. Failure to acquire the
    /// microphone for visualization is non-fatal: transcription does not
    /// depend on this component, so the error is logged and monitoring is
    /// skipped.
    pub fn activate(&mut self) {
        if self.task.is_some() {
            return;
        }

        let opened = match self.device.open_input(&InputHints::default()) {
            Ok(opened) => opened,
            Err(e) => {
                log::warn!("Could not open microphone for visualization: {}", e);
                return;
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_monitor(
            opened,
            self.surface.clone(),
            self.level.clone(),
            stop_rx,
        ));

        self.stop_tx = Some(stop_tx);
        self.task = Some(task);
    }

    /// Stop the tick loop and wait for its teardown (tracks stopped, surface
    /// cleared, level zeroed). The teardown runs inside the task, so it
    /// completes even when the stop lands mid-tick.
    pub async fn deactivate(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Current mean amplitude, 0-255.
    pub fn level(&self) -> u8 {
        self.level.load(Ordering::Relaxed)
    }
}

impl Drop for WaveformMonitor {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn run_monitor(
    mut opened: OpenInput,
    surface: SharedSurface,
    level: Arc<AtomicU8>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut analyzer = FrequencyAnalyzer::new();
    let mut tick = tokio::time::interval(Duration::from_millis(FRAME_INTERVAL_MS));

    log::debug!("Waveform monitor started");

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = tick.tick() => {
                while let Ok(frame) = opened.frames.try_recv() {
                    analyzer.push_samples(&frame.samples);
                }

                let bins = analyzer.frequency_bytes();
                let mean = bins.iter().map(|&b| b as u32).sum::<u32>() / bins.len() as u32;
                level.store(mean as u8, Ordering::Relaxed);

                let bars: Vec<WaveformBar> = bins
                    .iter()
                    .map(|&bin| {
                        let intensity = bin as f32 / 255.0;
                        WaveformBar {
                            height: intensity * BAR_HEIGHT_SCALE,
                            hue: 120.0 - intensity * 120.0,
                        }
                    })
                    .collect();

                surface.lock().unwrap().draw(&bars);
            }
        }
    }

    // Teardown must run even when deactivation lands mid-tick.
    opened.handle.stop();
    surface.lock().unwrap().clear();
    level.store(0, Ordering::Relaxed);

    log::debug!("Waveform monitor stopped");
}
