use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use candle_core::{D, DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_nn::ops::{log_softmax, softmax};
use candle_transformers::models::whisper::{self as m, Config};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;

use crate::application::ports::{
    DecodeParams, ModelSegment, ModelTranscript, SpeechModel, SpeechModelError,
};
use crate::infrastructure::audio::audio_decoder::read_pcm_16k;
use crate::infrastructure::audio::vad::{SpeechTimeline, VadConfig, detect_speech};

use super::decoding::{
    TokenLayout, apply_timestamp_rules, compression_ratio, split_timestamped, top_k,
};
use super::languages::{LANGUAGES, language_token};

const MEL_FILTERS_REPO: &str = "FL33TW00D-HF/whisper-base";
const START_OF_PREV_TOKEN: &str = "<|startofprev|>";

impl From<candle_core::Error> for SpeechModelError {
    fn from(e: candle_core::Error) -> Self {
        SpeechModelError::Inference(e.to_string())
    }
}

/// Whisper running on the CPU through candle.
///
/// One instance is shared by the whole process. Windows of 30 s are decoded
/// lazily as the returned segment stream is consumed.
pub struct CandleWhisperModel {
    runtime: Arc<WhisperRuntime>,
}

struct WhisperRuntime {
    model: Mutex<m::model::Whisper>,
    tokenizer: Tokenizer,
    config: Config,
    device: Device,
    dtype: DType,
    mel_filters: Vec<f32>,
    layout: TokenLayout,
    sot: u32,
    transcribe: u32,
    start_of_prev: Option<u32>,
    no_speech: Option<u32>,
    languages: Vec<(&'static str, u32)>,
    suppress_mask: Tensor,
}

impl CandleWhisperModel {
    pub fn new(model_id: &str, dtype: DType) -> Result<Self, SpeechModelError> {
        let device = Device::Cpu;

        tracing::info!(
            device = ?device,
            dtype = ?dtype,
            model = model_id,
            "Loading Candle Whisper model"
        );

        let api = Api::new().map_err(|e| SpeechModelError::ModelLoad(e.to_string()))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .map_err(|e| SpeechModelError::ModelLoad(format!("config.json: {}", e)))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| SpeechModelError::ModelLoad(format!("tokenizer.json: {}", e)))?;
        let weights_path = repo
            .get("model.safetensors")
            .map_err(|e| SpeechModelError::ModelLoad(format!("model.safetensors: {}", e)))?;

        let config_contents = std::fs::read_to_string(&config_path)
            .map_err(|e| SpeechModelError::ModelLoad(format!("read config: {}", e)))?;
        let config: Config = serde_json::from_str(&config_contents)
            .map_err(|e| SpeechModelError::ModelLoad(format!("parse config: {}", e)))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| SpeechModelError::ModelLoad(format!("tokenizer: {}", e)))?;

        let mel_file = match config.num_mel_bins {
            80 => "melfilters.bytes",
            128 => "melfilters128.bytes",
            other => {
                return Err(SpeechModelError::ModelLoad(format!(
                    "unsupported mel bin count: {}",
                    other
                )));
            }
        };
        let mel_path = api
            .repo(Repo::new(MEL_FILTERS_REPO.to_string(), RepoType::Model))
            .get(mel_file)
            .map_err(|e| SpeechModelError::ModelLoad(format!("{}: {}", mel_file, e)))?;
        let mel_bytes = std::fs::read(&mel_path)
            .map_err(|e| SpeechModelError::ModelLoad(format!("mel filters: {}", e)))?;
        let mel_filters = read_mel_filters(&mel_bytes, &config)?;

        // SAFETY: safetensors files are memory-mapped read-only
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], dtype, &device)
                .map_err(|e| SpeechModelError::ModelLoad(format!("weights: {}", e)))?
        };
        let model = m::model::Whisper::load(&vb, config.clone())
            .map_err(|e| SpeechModelError::ModelLoad(format!("model: {}", e)))?;

        let layout = TokenLayout {
            eot: token_id(&tokenizer, m::EOT_TOKEN)?,
            no_timestamps: token_id(&tokenizer, m::NO_TIMESTAMPS_TOKEN)?,
        };
        let sot = token_id(&tokenizer, m::SOT_TOKEN)?;
        let transcribe = token_id(&tokenizer, m::TRANSCRIBE_TOKEN)?;
        let start_of_prev = tokenizer.token_to_id(START_OF_PREV_TOKEN);
        let no_speech = m::NO_SPEECH_TOKENS
            .iter()
            .find_map(|t| tokenizer.token_to_id(t));
        let languages: Vec<(&'static str, u32)> = LANGUAGES
            .iter()
            .filter_map(|code| {
                tokenizer
                    .token_to_id(&language_token(code))
                    .map(|id| (*code, id))
            })
            .collect();

        let suppress_mask = build_suppress_mask(&config, &layout, &device)
            .map_err(|e| SpeechModelError::ModelLoad(format!("suppress mask: {}", e)))?;

        tracing::info!(
            multilingual = !languages.is_empty(),
            mel_bins = config.num_mel_bins,
            "Candle Whisper model loaded"
        );

        Ok(Self {
            runtime: Arc::new(WhisperRuntime {
                model: Mutex::new(model),
                tokenizer,
                config,
                device,
                dtype,
                mel_filters,
                layout,
                sot,
                transcribe,
                start_of_prev,
                no_speech,
                languages,
                suppress_mask,
            }),
        })
    }
}

impl SpeechModel for CandleWhisperModel {
    fn transcribe(
        &self,
        audio_path: &Path,
        params: &DecodeParams,
    ) -> Result<ModelTranscript, SpeechModelError> {
        let rt = &self.runtime;
        let pcm = read_pcm_16k(audio_path)?;

        let (pcm, timeline) = if params.vad_filter {
            let timeline = SpeechTimeline::new(detect_speech(&pcm, &VadConfig::default())?);
            (timeline.collect(&pcm), Some(timeline))
        } else {
            (pcm, None)
        };

        if params.word_timestamps {
            tracing::debug!("Word-level alignment is not produced by this model; segment timing only");
        }

        if pcm.is_empty() {
            tracing::info!("No speech found in waveform");
            return Ok(ModelTranscript {
                language: params.language.clone(),
                segments: Box::new(std::iter::empty()),
            });
        }

        let content_frames = pcm.len() / m::HOP_LENGTH;
        let mut padded = pcm;
        padded.resize(padded.len() + m::N_SAMPLES, 0.0);

        let mel = m::audio::pcm_to_mel(&rt.config, &padded, &rt.mel_filters);
        let n_mel = rt.config.num_mel_bins;
        let n_frames = mel.len() / n_mel;
        let mel = Tensor::from_vec(mel, (1, n_mel, n_frames), &rt.device)?.to_dtype(rt.dtype)?;

        let mut model = rt.lock()?;
        let first_window = mel.narrow(2, 0, m::N_FRAMES)?;
        let first_features = model.encoder.forward(&first_window, true)?;
        let (language, language_token) =
            rt.resolve_language(&mut model, &first_features, params.language.as_deref())?;
        drop(model);

        let history = match params.initial_prompt.as_deref() {
            Some(prompt) => rt.encode_prompt(prompt)?,
            None => Vec::new(),
        };

        tracing::debug!(
            content_frames,
            language = %language,
            prompt_tokens = history.len(),
            "Decoding windows"
        );

        Ok(ModelTranscript {
            language: Some(language),
            segments: Box::new(WindowDecoder {
                runtime: Arc::clone(rt),
                mel,
                content_frames,
                seek: 0,
                first_features: Some(first_features),
                language_token,
                params: params.clone(),
                history,
                timeline,
                pending: VecDeque::new(),
                finished: false,
            }),
        })
    }
}

struct Prefix {
    tokens: Vec<u32>,
    sot_index: usize,
}

struct DecodedWindow {
    tokens: Vec<u32>,
    avg_logprob: f64,
    no_speech_prob: f64,
}

#[derive(Clone)]
struct Hypothesis {
    tokens: Vec<u32>,
    logprob: f64,
}

impl Hypothesis {
    fn score(&self) -> f64 {
        self.logprob / self.tokens.len().max(1) as f64
    }
}

impl WhisperRuntime {
    fn lock(&self) -> Result<MutexGuard<'_, m::model::Whisper>, SpeechModelError> {
        self.model
            .lock()
            .map_err(|_| SpeechModelError::Inference("model lock poisoned".to_string()))
    }

    fn max_prompt_tokens(&self) -> usize {
        self.config.max_target_positions / 2 - 1
    }

    fn encode_prompt(&self, prompt: &str) -> Result<Vec<u32>, SpeechModelError> {
        let encoding = self
            .tokenizer
            .encode(format!(" {}", prompt.trim()), false)
            .map_err(|e| SpeechModelError::Inference(format!("prompt tokenization: {}", e)))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode_text(&self, tokens: &[u32]) -> Result<String, SpeechModelError> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| SpeechModelError::Inference(format!("detokenization: {}", e)))
    }

    /// English-only checkpoints carry no language tokens and always report
    /// `en`. Otherwise a hint must name a known language, and its absence
    /// triggers detection on the first window.
    fn resolve_language(
        &self,
        model: &mut m::model::Whisper,
        features: &Tensor,
        hint: Option<&str>,
    ) -> Result<(String, Option<u32>), SpeechModelError> {
        if self.languages.is_empty() {
            if let Some(code) = hint.filter(|c| *c != "en") {
                tracing::warn!(requested = code, "English-only model ignores language hint");
            }
            return Ok(("en".to_string(), None));
        }

        if let Some(code) = hint {
            return self
                .languages
                .iter()
                .find(|(known, _)| *known == code)
                .map(|(known, id)| (known.to_string(), Some(*id)))
                .ok_or_else(|| SpeechModelError::UnsupportedLanguage(code.to_string()));
        }

        let tokens = Tensor::new(&[self.sot], &self.device)?.unsqueeze(0)?;
        let ys = model.decoder.forward(&tokens, features, true)?;
        let logits = model
            .decoder
            .final_linear(&ys.i(..1)?)?
            .i(0)?
            .i(0)?
            .to_dtype(DType::F32)?;

        let ids: Vec<u32> = self.languages.iter().map(|(_, id)| *id).collect();
        let ids = Tensor::new(ids.as_slice(), &self.device)?;
        let best = logits.index_select(&ids, 0)?.argmax(0)?.to_scalar::<u32>()? as usize;
        let (code, id) = self.languages[best];

        tracing::info!(language = code, "Language detected");
        Ok((code.to_string(), Some(id)))
    }

    fn prefix(&self, history: &[u32], language_token: Option<u32>) -> Prefix {
        let mut tokens = Vec::new();
        if let (Some(prev), false) = (self.start_of_prev, history.is_empty()) {
            tokens.push(prev);
            let keep_from = history.len().saturating_sub(self.max_prompt_tokens());
            tokens.extend_from_slice(&history[keep_from..]);
        }

        let sot_index = tokens.len();
        tokens.push(self.sot);
        if let Some(language) = language_token {
            tokens.push(language);
        }
        tokens.push(self.transcribe);

        Prefix { tokens, sot_index }
    }

    /// Runs the decoder over prefix + generated tokens and returns masked
    /// log-probabilities for the next token. On the first call of a window the
    /// cross-attention cache is rebuilt and the no-speech probability read.
    fn step(
        &self,
        model: &mut m::model::Whisper,
        features: &Tensor,
        prefix: &Prefix,
        generated: &[u32],
        first: bool,
    ) -> Result<(Vec<f32>, Option<f64>), SpeechModelError> {
        let mut sequence = prefix.tokens.clone();
        sequence.extend_from_slice(generated);

        let tokens = Tensor::new(sequence.as_slice(), &self.device)?.unsqueeze(0)?;
        let ys = model.decoder.forward(&tokens, features, first)?;

        let no_speech = match (first, self.no_speech) {
            (true, Some(no_speech)) => {
                let at = prefix.sot_index;
                let logits = model
                    .decoder
                    .final_linear(&ys.i((..1, at..at + 1))?)?
                    .i(0)?
                    .i(0)?
                    .to_dtype(DType::F32)?;
                let prob = softmax(&logits, 0)?
                    .i(no_speech as usize)?
                    .to_scalar::<f32>()?;
                Some(prob as f64)
            }
            _ => None,
        };

        let (_, seq_len, _) = ys.dims3()?;
        let logits = model
            .decoder
            .final_linear(&ys.i((..1, seq_len - 1..))?)?
            .i(0)?
            .i(0)?
            .to_dtype(DType::F32)?
            .broadcast_add(&self.suppress_mask)?;

        let mut logprobs = log_softmax(&logits, D::Minus1)?.to_vec1::<f32>()?;
        apply_timestamp_rules(&mut logprobs, generated, &self.layout);

        Ok((logprobs, no_speech))
    }

    fn decode(
        &self,
        model: &mut m::model::Whisper,
        features: &Tensor,
        prefix: &Prefix,
        beam_size: usize,
    ) -> Result<DecodedWindow, SpeechModelError> {
        let max_positions = self.config.max_target_positions;
        let limit = (max_positions / 2).min(max_positions.saturating_sub(prefix.tokens.len()));

        if beam_size <= 1 {
            self.decode_greedy(model, features, prefix, limit)
        } else {
            self.decode_beam(model, features, prefix, limit, beam_size)
        }
    }

    fn decode_greedy(
        &self,
        model: &mut m::model::Whisper,
        features: &Tensor,
        prefix: &Prefix,
        limit: usize,
    ) -> Result<DecodedWindow, SpeechModelError> {
        let mut generated = Vec::new();
        let mut sum_logprob = 0.0;
        let mut no_speech_prob = 0.0;

        for i in 0..limit {
            let (logprobs, no_speech) = self.step(model, features, prefix, &generated, i == 0)?;
            if let Some(p) = no_speech {
                no_speech_prob = p;
            }

            let Some(&(next, logprob)) = top_k(&logprobs, 1).first() else {
                break;
            };
            if next == self.layout.eot {
                break;
            }
            sum_logprob += logprob as f64;
            generated.push(next);
        }

        Ok(DecodedWindow {
            avg_logprob: sum_logprob / generated.len().max(1) as f64,
            tokens: generated,
            no_speech_prob,
        })
    }

    fn decode_beam(
        &self,
        model: &mut m::model::Whisper,
        features: &Tensor,
        prefix: &Prefix,
        limit: usize,
        beam_size: usize,
    ) -> Result<DecodedWindow, SpeechModelError> {
        let eot = self.layout.eot;
        let mut beams = vec![Hypothesis {
            tokens: Vec::new(),
            logprob: 0.0,
        }];
        let mut finished: Vec<Hypothesis> = Vec::new();
        let mut no_speech_prob = 0.0;
        let mut first = true;

        for _ in 0..limit {
            let mut candidates = Vec::new();
            for beam in &beams {
                let (logprobs, no_speech) = self.step(model, features, prefix, &beam.tokens, first)?;
                if first {
                    no_speech_prob = no_speech.unwrap_or(0.0);
                    first = false;
                }
                for (token, logprob) in top_k(&logprobs, beam_size + 1) {
                    let mut tokens = beam.tokens.clone();
                    tokens.push(token);
                    candidates.push(Hypothesis {
                        tokens,
                        logprob: beam.logprob + logprob as f64,
                    });
                }
            }

            candidates.sort_by(|a, b| b.logprob.total_cmp(&a.logprob));
            beams.clear();
            for candidate in candidates {
                if candidate.tokens.last() == Some(&eot) {
                    if finished.len() < beam_size {
                        finished.push(candidate);
                    }
                } else if beams.len() < beam_size {
                    beams.push(candidate);
                }
            }

            if finished.len() >= beam_size || beams.is_empty() {
                break;
            }
        }

        finished.extend(beams);
        let best = finished
            .into_iter()
            .max_by(|a, b| a.score().total_cmp(&b.score()))
            .unwrap_or(Hypothesis {
                tokens: Vec::new(),
                logprob: 0.0,
            });

        let mut tokens = best.tokens;
        if tokens.last() == Some(&eot) {
            tokens.pop();
        }

        Ok(DecodedWindow {
            avg_logprob: best.logprob / tokens.len().max(1) as f64,
            tokens,
            no_speech_prob,
        })
    }
}

/// Lazy, single-use sequence of segments over consecutive 30 s windows.
struct WindowDecoder {
    runtime: Arc<WhisperRuntime>,
    mel: Tensor,
    content_frames: usize,
    seek: usize,
    first_features: Option<Tensor>,
    language_token: Option<u32>,
    params: DecodeParams,
    history: Vec<u32>,
    timeline: Option<SpeechTimeline>,
    pending: VecDeque<ModelSegment>,
    finished: bool,
}

impl Iterator for WindowDecoder {
    type Item = Result<ModelSegment, SpeechModelError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(segment) = self.pending.pop_front() {
                return Some(Ok(segment));
            }
            if self.finished || self.seek >= self.content_frames {
                return None;
            }
            if let Err(e) = self.advance() {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }
}

impl WindowDecoder {
    fn advance(&mut self) -> Result<(), SpeechModelError> {
        let rt = Arc::clone(&self.runtime);
        let frames_per_second = (m::SAMPLE_RATE / m::HOP_LENGTH) as f64;
        let segment_size = (self.content_frames - self.seek).min(m::N_FRAMES);
        let time_offset = self.seek as f64 / frames_per_second;
        let window_secs = segment_size as f64 / frames_per_second;

        let mut model = rt.lock()?;
        let features = match self.first_features.take() {
            Some(features) if self.seek == 0 => features,
            _ => {
                let window = self.mel.narrow(2, self.seek, m::N_FRAMES)?;
                model.encoder.forward(&window, true)?
            }
        };
        let prefix = rt.prefix(&self.history, self.language_token);
        let decoded = rt.decode(&mut model, &features, &prefix, self.params.beam_size)?;
        drop(model);

        if decoded.no_speech_prob > self.params.no_speech_threshold
            && decoded.avg_logprob < self.params.log_prob_threshold
        {
            tracing::debug!(
                offset_secs = time_offset,
                no_speech_prob = decoded.no_speech_prob,
                "Skipping silent window"
            );
            self.seek += segment_size;
            return Ok(());
        }

        let text_tokens: Vec<u32> = decoded
            .tokens
            .iter()
            .copied()
            .filter(|t| *t < rt.layout.eot)
            .collect();
        let ratio = compression_ratio(&rt.decode_text(&text_tokens)?);
        if ratio > self.params.compression_ratio_threshold {
            tracing::warn!(
                offset_secs = time_offset,
                compression_ratio = ratio,
                "Discarding repetitive window"
            );
            self.history.clear();
            self.seek += segment_size;
            return Ok(());
        }

        let parsed = split_timestamped(&decoded.tokens, &rt.layout);
        for span in &parsed.spans {
            let text = rt.decode_text(&span.tokens)?;
            self.push_segment(time_offset + span.start, time_offset + span.end, text);
        }

        let mut advance = segment_size;
        let mut kept = decoded.tokens.len();
        if !parsed.trailing.is_empty() {
            match parsed.spans.last() {
                Some(last) => {
                    advance = ((last.end * frames_per_second) as usize).clamp(1, segment_size);
                    kept = parsed.closed_len;
                }
                None => {
                    let text = rt.decode_text(&parsed.trailing)?;
                    let start = parsed.trailing_start.unwrap_or(0.0);
                    self.push_segment(time_offset + start, time_offset + window_secs, text);
                }
            }
        }

        if self.params.condition_on_previous_text {
            self.history.extend_from_slice(&decoded.tokens[..kept]);
        } else {
            self.history.clear();
        }

        self.seek += advance;
        Ok(())
    }

    fn push_segment(&mut self, start: f64, end: f64, text: String) {
        let (start, end) = match &self.timeline {
            Some(timeline) => (timeline.restore(start), timeline.restore(end)),
            None => (start, end),
        };
        self.pending.push_back(ModelSegment { start, end, text });
    }
}

fn token_id(tokenizer: &Tokenizer, token: &str) -> Result<u32, SpeechModelError> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| SpeechModelError::ModelLoad(format!("token not found: {}", token)))
}

/// Zero for allowed tokens, negative infinity for special tokens that must
/// never be sampled.
fn build_suppress_mask(
    config: &Config,
    layout: &TokenLayout,
    device: &Device,
) -> candle_core::Result<Tensor> {
    let mask: Vec<f32> = (0..config.vocab_size as u32)
        .map(|id| {
            let special = id > layout.eot && id <= layout.no_timestamps;
            if special || config.suppress_tokens.contains(&id) {
                f32::NEG_INFINITY
            } else {
                0.0
            }
        })
        .collect();
    Tensor::new(mask.as_slice(), device)
}

fn read_mel_filters(bytes: &[u8], config: &Config) -> Result<Vec<f32>, SpeechModelError> {
    let expected_len = config.num_mel_bins * (m::N_FFT / 2 + 1);
    if bytes.len() < expected_len * 4 {
        return Err(SpeechModelError::ModelLoad(format!(
            "mel filters file too small: {} bytes, expected at least {}",
            bytes.len(),
            expected_len * 4
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .take(expected_len)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
