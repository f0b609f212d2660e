//! Model-agnostic pieces of Whisper decoding: timestamp-token rules, splitting
//! a decoded window into timed spans, and the repetition gate.

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;

/// Seconds covered by one timestamp token step.
pub const TIMESTAMP_RESOLUTION: f64 = 0.02;

/// Largest timestamp index allowed as the first token of a window (1 s).
pub const MAX_INITIAL_TIMESTAMP_INDEX: usize = 50;

/// Positions of the special tokens that shape decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLayout {
    pub eot: u32,
    pub no_timestamps: u32,
}

impl TokenLayout {
    pub fn timestamp_begin(&self) -> u32 {
        self.no_timestamps + 1
    }

    pub fn is_timestamp(&self, token: u32) -> bool {
        token >= self.timestamp_begin()
    }

    pub fn timestamp_seconds(&self, token: u32) -> f64 {
        (token - self.timestamp_begin()) as f64 * TIMESTAMP_RESOLUTION
    }
}

/// Masks log-probabilities so that timestamps come in well-formed,
/// non-decreasing pairs and every window opens with a timestamp.
pub fn apply_timestamp_rules(logprobs: &mut [f32], generated: &[u32], layout: &TokenLayout) {
    let begin = (layout.timestamp_begin() as usize).min(logprobs.len());
    let eot = (layout.eot as usize).min(begin);

    if generated.is_empty() {
        logprobs[..begin].fill(f32::NEG_INFINITY);
        let last_initial = (begin + MAX_INITIAL_TIMESTAMP_INDEX + 1).min(logprobs.len());
        logprobs[last_initial..].fill(f32::NEG_INFINITY);
        return;
    }

    let last_was_timestamp = generated
        .last()
        .is_some_and(|t| layout.is_timestamp(*t));
    let penultimate_was_timestamp =
        generated.len() < 2 || layout.is_timestamp(generated[generated.len() - 2]);

    if last_was_timestamp {
        if penultimate_was_timestamp {
            logprobs[begin..].fill(f32::NEG_INFINITY);
        } else {
            logprobs[..eot].fill(f32::NEG_INFINITY);
        }
    }

    if let Some(&last) = generated.iter().rev().find(|t| layout.is_timestamp(**t)) {
        let floor = if last_was_timestamp && !penultimate_was_timestamp {
            last
        } else {
            last + 1
        };
        let floor = (floor as usize).min(logprobs.len());
        logprobs[begin..floor.max(begin)].fill(f32::NEG_INFINITY);
    }
}

/// Text tokens between two timestamps, in window-relative seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpan {
    pub start: f64,
    pub end: f64,
    pub tokens: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedWindow {
    pub spans: Vec<TokenSpan>,
    /// Text tokens after the last closing timestamp.
    pub trailing: Vec<u32>,
    pub trailing_start: Option<f64>,
    /// Number of generated tokens up to and including the last closing
    /// timestamp.
    pub closed_len: usize,
}

/// Splits generated tokens into timed spans. Special tokens other than
/// timestamps are ignored; decoding stops at end-of-text.
pub fn split_timestamped(tokens: &[u32], layout: &TokenLayout) -> ParsedWindow {
    let mut parsed = ParsedWindow::default();
    let mut start: Option<f64> = None;
    let mut last_end: Option<f64> = None;
    let mut text: Vec<u32> = Vec::new();

    for (index, &token) in tokens.iter().enumerate() {
        if token == layout.eot {
            break;
        }
        if layout.is_timestamp(token) {
            let at = layout.timestamp_seconds(token);
            if text.is_empty() {
                start = Some(at);
            } else {
                parsed.spans.push(TokenSpan {
                    start: start.or(last_end).unwrap_or(0.0),
                    end: at,
                    tokens: std::mem::take(&mut text),
                });
                last_end = Some(at);
                start = None;
                parsed.closed_len = index + 1;
            }
        } else if token < layout.eot {
            text.push(token);
        }
    }

    parsed.trailing_start = start.or(last_end);
    parsed.trailing = text;
    parsed
}

/// Ratio between raw and zlib-compressed text length. Highly repetitive
/// output compresses well and scores high.
pub fn compression_ratio(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    if encoder.write_all(text.as_bytes()).is_err() {
        return 0.0;
    }

    match encoder.finish() {
        Ok(bytes) if !bytes.is_empty() => text.len() as f64 / bytes.len() as f64,
        _ => 0.0,
    }
}

/// Best `k` finite entries, highest first.
pub fn top_k(logprobs: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut ranked: Vec<(u32, f32)> = logprobs
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_finite())
        .map(|(i, p)| (i as u32, *p))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(k);
    ranked
}
