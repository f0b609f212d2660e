//! Voice-activity filtering for the local model.
//!
//! WebRTC VAD classifies 30 ms frames; voiced frames are grouped into padded
//! speech chunks, the chunks are concatenated for decoding, and
//! [`SpeechTimeline::restore`] maps decoded timestamps back onto the original
//! recording.

use webrtc_vad::{SampleRate, Vad, VadMode};

use crate::application::ports::SpeechModelError;

use super::audio_decoder::TARGET_SAMPLE_RATE;

/// 30 ms at 16 kHz.
pub const FRAME_SAMPLES: usize = 480;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadConfig {
    pub min_speech_ms: u32,
    pub min_silence_ms: u32,
    pub speech_pad_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            min_speech_ms: 250,
            min_silence_ms: 2000,
            speech_pad_ms: 400,
        }
    }
}

/// Half-open sample range `[start, end)` in the original recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechChunk {
    pub start: usize,
    pub end: usize,
}

impl SpeechChunk {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

pub fn detect_speech(pcm: &[f32], config: &VadConfig) -> Result<Vec<SpeechChunk>, SpeechModelError> {
    let mut vad = Vad::new();
    vad.set_mode(VadMode::Aggressive);
    vad.set_sample_rate(SampleRate::Rate16kHz);

    let mut flags = Vec::with_capacity(pcm.len() / FRAME_SAMPLES);
    let mut frame = [0i16; FRAME_SAMPLES];

    for chunk in pcm.chunks_exact(FRAME_SAMPLES) {
        for (dst, &sample) in frame.iter_mut().zip(chunk) {
            *dst = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        }
        let voiced = vad
            .is_voice_segment(&frame)
            .map_err(|_| SpeechModelError::Decode("voice activity detection failed".to_string()))?;
        flags.push(voiced);
    }

    let chunks = chunks_from_flags(&flags, pcm.len(), config);

    tracing::debug!(
        frames = flags.len(),
        voiced = flags.iter().filter(|v| **v).count(),
        chunks = chunks.len(),
        "Voice activity detected"
    );

    Ok(chunks)
}

/// Groups per-frame voice decisions into padded speech chunks.
pub fn chunks_from_flags(flags: &[bool], total_samples: usize, config: &VadConfig) -> Vec<SpeechChunk> {
    let min_speech = ms_to_samples(config.min_speech_ms);
    let min_silence = ms_to_samples(config.min_silence_ms);
    let pad = ms_to_samples(config.speech_pad_ms);

    let mut raw: Vec<SpeechChunk> = Vec::new();
    let mut open: Option<usize> = None;
    for (i, &voiced) in flags.iter().enumerate() {
        match (voiced, open) {
            (true, None) => open = Some(i * FRAME_SAMPLES),
            (false, Some(start)) => {
                raw.push(SpeechChunk { start, end: i * FRAME_SAMPLES });
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        raw.push(SpeechChunk {
            start,
            end: (flags.len() * FRAME_SAMPLES).min(total_samples),
        });
    }

    let mut bridged: Vec<SpeechChunk> = Vec::new();
    for chunk in raw {
        match bridged.last_mut() {
            Some(last) if chunk.start - last.end < min_silence => last.end = chunk.end,
            _ => bridged.push(chunk),
        }
    }

    let mut padded: Vec<SpeechChunk> = Vec::new();
    for chunk in bridged.into_iter().filter(|c| c.len() >= min_speech) {
        let chunk = SpeechChunk {
            start: chunk.start.saturating_sub(pad),
            end: (chunk.end + pad).min(total_samples),
        };
        match padded.last_mut() {
            Some(last) if chunk.start <= last.end => last.end = last.end.max(chunk.end),
            _ => padded.push(chunk),
        }
    }

    padded
}

fn ms_to_samples(ms: u32) -> usize {
    ms as usize * TARGET_SAMPLE_RATE as usize / 1000
}

/// Bookkeeping between the concatenated speech-only audio and the original.
#[derive(Debug, Clone)]
pub struct SpeechTimeline {
    chunks: Vec<SpeechChunk>,
    offsets: Vec<usize>,
}

impl SpeechTimeline {
    pub fn new(chunks: Vec<SpeechChunk>) -> Self {
        let mut offsets = Vec::with_capacity(chunks.len());
        let mut offset = 0;
        for chunk in &chunks {
            offsets.push(offset);
            offset += chunk.len();
        }
        Self { chunks, offsets }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Concatenates the speech chunks of `pcm`.
    pub fn collect(&self, pcm: &[f32]) -> Vec<f32> {
        let total = self.chunks.iter().map(SpeechChunk::len).sum();
        let mut speech = Vec::with_capacity(total);
        for chunk in &self.chunks {
            speech.extend_from_slice(&pcm[chunk.start.min(pcm.len())..chunk.end.min(pcm.len())]);
        }
        speech
    }

    /// Maps a time in the concatenated audio to the original recording.
    pub fn restore(&self, seconds: f64) -> f64 {
        if self.chunks.is_empty() {
            return seconds;
        }

        let sample = (seconds.max(0.0) * TARGET_SAMPLE_RATE as f64).round() as usize;
        let index = self
            .offsets
            .iter()
            .rposition(|&offset| offset <= sample)
            .unwrap_or(0);
        let chunk = self.chunks[index];
        let within = (sample - self.offsets[index]).min(chunk.len());

        (chunk.start + within) as f64 / TARGET_SAMPLE_RATE as f64
    }
}
