//! Speech I/O: PCM decoding, playback sinks and one-shot dictation.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::error::CoachError;
use crate::message::MessageId;

/// Sample rate of synthesized speech.
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

/// A decoded mono waveform, normalized to `[-1.0, 1.0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode base64 of raw signed 16-bit little-endian mono PCM.
///
/// A trailing odd byte is ignored.
pub fn decode_pcm16(payload: &str) -> Result<AudioClip, CoachError> {
    let bytes = BASE64_STANDARD.decode(payload.trim())?;
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();

    Ok(AudioClip {
        samples,
        sample_rate: SPEECH_SAMPLE_RATE,
    })
}

/// Plays a clip once, resolving on natural completion.
#[async_trait]
pub trait AudioOutput: Send {
    async fn play(&mut self, message_id: MessageId, clip: &AudioClip) -> Result<(), CoachError>;
}

/// Renders each clip to a 16-bit WAV file instead of an audio device.
pub struct WavFileOutput {
    dir: PathBuf,
    last_written: Option<PathBuf>,
}

impl WavFileOutput {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last_written: None,
        }
    }

    /// Path of the most recently rendered clip.
    pub fn last_written(&self) -> Option<&Path> {
        self.last_written.as_deref()
    }

    fn write_wav(path: &Path, clip: &AudioClip) -> Result<(), CoachError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: clip.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &clip.samples {
            let scaled = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32);
            writer.write_sample(scaled as i16)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

#[async_trait]
impl AudioOutput for WavFileOutput {
    async fn play(&mut self, message_id: MessageId, clip: &AudioClip) -> Result<(), CoachError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("duothink-{}.wav", message_id));
        Self::write_wav(&path, clip)?;
        tracing::debug!(path = %path.display(), secs = clip.duration_secs(), "rendered speech");
        self.last_written = Some(path);
        Ok(())
    }
}

/// Events raised by a platform speech recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// A single recognized utterance.
    Result(String),
    /// The recognition session ended.
    End,
}

/// Platform speech-to-text in one-shot mode.
pub trait SpeechRecognizer {
    fn start(&mut self);
    fn stop(&mut self);
}

/// Draft input fed by one-shot dictation.
#[derive(Debug, Clone, Default)]
pub struct DictationCapture {
    draft: String,
    listening: bool,
}

impl DictationCapture {
    pub fn new(draft: impl Into<String>) -> Self {
        Self {
            draft: draft.into(),
            listening: false,
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn start<R: SpeechRecognizer + ?Sized>(&mut self, recognizer: &mut R) {
        self.listening = true;
        recognizer.start();
    }

    /// Fold a recognizer event into the draft. Any event ends listening.
    ///
    /// Events arriving while not listening are ignored.
    pub fn handle<R: SpeechRecognizer + ?Sized>(&mut self, recognizer: &mut R, event: RecognitionEvent) {
        if !self.listening {
            return;
        }
        if let RecognitionEvent::Result(utterance) = event {
            self.draft.push(' ');
            self.draft.push_str(&utterance);
        }
        self.listening = false;
        recognizer.stop();
    }
}

/// Strip markdown markup that would be read aloud literally.
pub fn speech_text(text: &str) -> String {
    let mut result = text.to_string();

    // Keep link labels, drop targets
    if let Ok(link_re) = Regex::new(r"\[([^\]]*)\]\([^)]*\)") {
        result = link_re.replace_all(&result, "$1").to_string();
    }

    if let Ok(heading_re) = Regex::new(r"(?m)^\s*#+\s*") {
        result = heading_re.replace_all(&result, "").to_string();
    }

    result = result.replace(['*', '_', '`'], "");

    if let Ok(ws_re) = Regex::new(r"\s+") {
        result = ws_re.replace_all(&result, " ").to_string();
    }

    result.trim().to_string()
}
