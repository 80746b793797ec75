//! Microphone capture devices
//!
//! The browser media-stream API this pipeline was designed against has no
//! native equivalent, so device access is modelled as the `CaptureDevice`
//! trait: opening an input yields a track handle plus a channel of PCM frames.
//! `CpalDevice` is the hardware implementation; `replay::ReplayDevice` feeds
//! scripted frames for tests and batch callers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use tokio::sync::mpsc;

use super::CaptureError;

/// Frame channel depth. Capture callbacks use try_send and drop frames on
/// overflow rather than block the audio thread.
pub(crate) const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Advisory constraints passed to `open_input`. Devices apply what they can;
/// the stream's actual format is reported back in `OpenInput::spec`.
#[derive(Debug, Clone)]
pub struct InputHints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub sample_rate: u32,
}

impl Default for InputHints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            sample_rate: 16_000,
        }
    }
}

/// Actual format of an opened input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

/// One chunk of interleaved 16-bit PCM delivered by a device.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Milliseconds since the stream opened.
    pub timestamp_ms: u64,
}

/// Handle on the device tracks behind an open stream.
///
/// Stopping must be idempotent: the session stops tracks on stop, on error,
/// and on dispose, and all three paths may run for one cycle.
pub trait StreamHandle: Send {
    fn stop(&mut self);
    fn is_live(&self) -> bool;
}

/// An opened input stream.
pub struct OpenInput {
    pub handle: Box<dyn StreamHandle>,
    pub frames: mpsc::Receiver<AudioFrame>,
    pub spec: StreamSpec,
}

/// A source of microphone input.
///
/// Two consumers may hold handles on the same physical device at once: the
/// capture session and the waveform monitor each open their own stream and
/// neither assumes exclusive ownership.
pub trait CaptureDevice: Send + Sync {
    fn open_input(&self, hints: &InputHints) -> Result<OpenInput, CaptureError>;

    /// Device name for logging.
    fn name(&self) -> String;
}

/// Microphone capture via the default CPAL input device.
pub struct CpalDevice;

impl CpalDevice {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpalDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for CpalDevice {
    fn open_input(&self, hints: &InputHints) -> Result<OpenInput, CaptureError> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no audio input device found".into()))?;

        log::info!("Using audio input device: {:?}", device.name());

        let supported = device.default_input_config().map_err(|e| {
            CaptureError::DeviceUnavailable(format!("no supported input configuration: {}", e))
        })?;

        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let spec = StreamSpec {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };

        // CPAL exposes no echo-cancellation or noise-suppression toggles, and
        // the device's native rate wins over the hinted one.
        if spec.sample_rate != hints.sample_rate {
            log::debug!(
                "Requested {} Hz, device delivers {} Hz",
                hints.sample_rate,
                spec.sample_rate
            );
        }

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let live = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), String>>();

        // The CPAL stream is !Send, so it lives on a dedicated thread for the
        // duration of the capture. The handle talks to it over channels.
        let live_for_thread = live.clone();
        std::thread::spawn(move || {
            let stream = match build_input_stream(&device, &config, sample_format, frame_tx) {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(format!("failed to start stream: {}", e)));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Park until the handle is stopped or dropped.
            let _ = stop_rx.recv();
            drop(stream);
            live_for_thread.store(false, Ordering::SeqCst);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(CaptureError::DeviceUnavailable(e)),
            Err(_) => {
                return Err(CaptureError::DeviceUnavailable(
                    "audio thread exited during startup".into(),
                ))
            }
        }

        log::info!(
            "Audio input open: {} Hz, {} channel(s), {:?}",
            spec.sample_rate,
            spec.channels,
            sample_format
        );

        Ok(OpenInput {
            handle: Box::new(CpalStreamHandle {
                live,
                stop_tx: Some(stop_tx),
            }),
            frames: frame_rx,
            spec,
        })
    }

    fn name(&self) -> String {
        cpal::default_host()
            .default_input_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_else(|| "default input".into())
    }
}

struct CpalStreamHandle {
    live: Arc<AtomicBool>,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
}

impl StreamHandle for CpalStreamHandle {
    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for CpalStreamHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_input_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: SampleFormat,
    frames: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream, String> {
    let err_fn = |err| log::error!("Audio stream error: {}", err);

    match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(device, config, frames, err_fn),
        SampleFormat::U16 => build_stream_typed::<u16>(device, config, frames, err_fn),
        SampleFormat::F32 => build_stream_typed::<f32>(device, config, frames, err_fn),
        other => Err(format!("unsupported sample format: {:?}", other)),
    }
}

fn build_stream_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    frames: mpsc::Sender<AudioFrame>,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, String>
where
    T: cpal::Sample<Float = f32> + cpal::SizedSample + Send + 'static,
{
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;
    let mut samples_sent: u64 = 0;

    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<i16> = data.iter().map(|&s| sample_to_i16(s)).collect();
                let timestamp_ms =
                    samples_sent * 1_000 / (sample_rate as u64 * channels as u64).max(1);
                samples_sent += data.len() as u64;

                let frame = AudioFrame {
                    samples,
                    sample_rate,
                    channels,
                    timestamp_ms,
                };

                // Dropping a frame under backpressure beats blocking the
                // audio callback.
                if frames.try_send(frame).is_err() {
                    log::debug!("Frame channel full, dropping {} samples", data.len());
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| e.to_string())?;

    Ok(stream)
}

/// Convert any sample type to i16 PCM.
fn sample_to_i16<T: cpal::Sample<Float = f32>>(sample: T) -> i16 {
    let f32_sample: f32 = sample.to_float_sample();
    let clamped = f32_sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_to_i16() {
        assert_eq!(sample_to_i16(0.0f32), 0);
        assert_eq!(sample_to_i16(1.0f32), i16::MAX);
        assert_eq!(sample_to_i16(-1.0f32), -i16::MAX);

        // Out-of-range input clamps instead of wrapping
        assert_eq!(sample_to_i16(2.0f32), i16::MAX);
        assert_eq!(sample_to_i16(-2.0f32), -i16::MAX);
    }

    #[test]
    fn default_hints_request_processed_16k_input() {
        let hints = InputHints::default();
        assert!(hints.echo_cancellation);
        assert!(hints.noise_suppression);
        assert_eq!(hints.sample_rate, 16_000);
    }
}
