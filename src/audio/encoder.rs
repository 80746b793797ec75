//! Audio encoders and encoding negotiation
//!
//! The recorder half of the browser media API is modelled as the
//! `AudioEncoder` trait: a session feeds it PCM frames and collects encoded
//! fragments. `WavEncoder` is the bundled implementation (16-bit PCM WAV via
//! hound, in memory); the trait is the seam for container formats the native
//! pipeline cannot produce itself.

use std::io::Cursor;

use super::device::{AudioFrame, StreamSpec};

/// Container/codec formats an artifact can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    WebmOpus,
    Webm,
    OggOpus,
    Mp4,
    Wav,
}

impl AudioEncoding {
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioEncoding::WebmOpus => "audio/webm;codecs=opus",
            AudioEncoding::Webm => "audio/webm",
            AudioEncoding::OggOpus => "audio/ogg;codecs=opus",
            AudioEncoding::Mp4 => "audio/mp4",
            AudioEncoding::Wav => "audio/wav",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioEncoding::WebmOpus | AudioEncoding::Webm => "webm",
            AudioEncoding::OggOpus => "ogg",
            AudioEncoding::Mp4 => "mp4",
            AudioEncoding::Wav => "wav",
        }
    }
}

/// Negotiation preference, most preferred first. The four browser container
/// formats keep their original order; WAV sits last so the bundled native
/// encoder is reachable.
pub const PREFERRED_ENCODINGS: [AudioEncoding; 5] = [
    AudioEncoding::WebmOpus,
    AudioEncoding::Webm,
    AudioEncoding::OggOpus,
    AudioEncoding::Mp4,
    AudioEncoding::Wav,
];

/// Fallback when the encoder reports support for nothing on the list.
pub const DEFAULT_ENCODING: AudioEncoding = AudioEncoding::Webm;

/// Pick the first encoding on the preference list the encoder supports.
pub fn negotiate_encoding(encoder: &dyn AudioEncoder) -> AudioEncoding {
    PREFERRED_ENCODINGS
        .iter()
        .copied()
        .find(|encoding| encoder.supports(*encoding))
        .unwrap_or(DEFAULT_ENCODING)
}

/// Encodes PCM frames into fragments of one container format.
pub trait AudioEncoder: Send {
    /// Whether this encoder can produce `encoding`.
    fn supports(&self, encoding: AudioEncoding) -> bool;

    /// Prepare for a stream of frames in the given format.
    fn begin(&mut self, encoding: AudioEncoding, spec: StreamSpec);

    /// Consume one frame.
    fn push(&mut self, frame: &AudioFrame);

    /// Encoded bytes produced since the last poll, for codecs that can emit
    /// mid-stream. `None` when the codec only emits on finish.
    fn poll_fragment(&mut self) -> Option<Vec<u8>>;

    /// Flush and return the final fragment.
    fn finish(self: Box<Self>) -> Vec<u8>;
}

/// 16-bit PCM WAV encoder backed by hound, writing into memory.
pub struct WavEncoder {
    spec: Option<StreamSpec>,
    samples: Vec<i16>,
}

impl WavEncoder {
    pub fn new() -> Self {
        Self {
            spec: None,
            samples: Vec::new(),
        }
    }
}

impl Default for WavEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEncoder for WavEncoder {
    fn supports(&self, encoding: AudioEncoding) -> bool {
        matches!(encoding, AudioEncoding::Wav)
    }

    fn begin(&mut self, encoding: AudioEncoding, spec: StreamSpec) {
        log::debug!(
            "WAV encoder started: {} @ {} Hz, {} channel(s)",
            encoding.mime_type(),
            spec.sample_rate,
            spec.channels
        );
        self.spec = Some(spec);
        self.samples.clear();
    }

    fn push(&mut self, frame: &AudioFrame) {
        self.samples.extend_from_slice(&frame.samples);
    }

    fn poll_fragment(&mut self) -> Option<Vec<u8>> {
        // The WAV header carries sizes, so nothing useful can be emitted
        // before the stream ends.
        None
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        let Some(spec) = self.spec else {
            return Vec::new();
        };
        // A capture with no samples yields no bytes, so the session can
        // report the recording as empty.
        if self.samples.is_empty() {
            return Vec::new();
        }

        let wav_spec = hound::WavSpec {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = match hound::WavWriter::new(&mut cursor, wav_spec) {
                Ok(w) => w,
                Err(e) => {
                    log::error!("Failed to create WAV writer: {}", e);
                    return Vec::new();
                }
            };
            for &sample in &self.samples {
                if writer.write_sample(sample).is_err() {
                    log::error!("Failed to write sample");
                    break;
                }
            }
            if let Err(e) = writer.finalize() {
                log::error!("Failed to finalize WAV data: {}", e);
                return Vec::new();
            }
        }

        cursor.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSupport(Vec<AudioEncoding>);

    impl AudioEncoder for FixedSupport {
        fn supports(&self, encoding: AudioEncoding) -> bool {
            self.0.contains(&encoding)
        }
        fn begin(&mut self, _encoding: AudioEncoding, _spec: StreamSpec) {}
        fn push(&mut self, _frame: &AudioFrame) {}
        fn poll_fragment(&mut self) -> Option<Vec<u8>> {
            None
        }
        fn finish(self: Box<Self>) -> Vec<u8> {
            Vec::new()
        }
    }

    #[test]
    fn negotiation_prefers_webm_opus() {
        let encoder = FixedSupport(vec![
            AudioEncoding::Mp4,
            AudioEncoding::WebmOpus,
            AudioEncoding::Webm,
        ]);
        assert_eq!(negotiate_encoding(&encoder), AudioEncoding::WebmOpus);
    }

    #[test]
    fn negotiation_walks_the_preference_order() {
        let encoder = FixedSupport(vec![AudioEncoding::Mp4, AudioEncoding::OggOpus]);
        assert_eq!(negotiate_encoding(&encoder), AudioEncoding::OggOpus);

        let encoder = FixedSupport(vec![AudioEncoding::Wav, AudioEncoding::Mp4]);
        assert_eq!(negotiate_encoding(&encoder), AudioEncoding::Mp4);
    }

    #[test]
    fn negotiation_defaults_to_webm() {
        let encoder = FixedSupport(vec![]);
        assert_eq!(negotiate_encoding(&encoder), AudioEncoding::Webm);
    }

    #[test]
    fn wav_encoder_negotiates_wav() {
        let encoder = WavEncoder::new();
        assert_eq!(negotiate_encoding(&encoder), AudioEncoding::Wav);
    }

    #[test]
    fn wav_output_round_trips_samples() {
        let spec = StreamSpec {
            sample_rate: 16_000,
            channels: 1,
        };
        let mut encoder = Box::new(WavEncoder::new());
        encoder.begin(AudioEncoding::Wav, spec);
        encoder.push(&AudioFrame {
            samples: vec![0, 100, -100, i16::MAX, i16::MIN],
            sample_rate: 16_000,
            channels: 1,
            timestamp_ms: 0,
        });

        let bytes = encoder.finish();
        assert!(!bytes.is_empty());

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        let decoded: Vec<i16> = reader.into_samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(decoded, vec![0, 100, -100, i16::MAX, i16::MIN]);
    }

    #[test]
    fn empty_capture_produces_no_bytes() {
        let spec = StreamSpec {
            sample_rate: 16_000,
            channels: 1,
        };
        let mut encoder = Box::new(WavEncoder::new());
        encoder.begin(AudioEncoding::Wav, spec);

        let bytes = encoder.finish();
        assert!(bytes.is_empty());
    }

    #[test]
    fn mime_types_and_extensions_match_containers() {
        assert_eq!(AudioEncoding::WebmOpus.mime_type(), "audio/webm;codecs=opus");
        assert_eq!(AudioEncoding::WebmOpus.extension(), "webm");
        assert_eq!(AudioEncoding::Wav.mime_type(), "audio/wav");
        assert_eq!(AudioEncoding::Wav.extension(), "wav");
    }
}
