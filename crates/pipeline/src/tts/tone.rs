//! Tone synthesizer for development and tests
//!
//! Renders each word as a fixed-length sine burst so playback time is a
//! pure function of word count. Every chunk reports the character offset
//! reached, which makes the interruption point of a reply exact.

use async_trait::async_trait;
use std::f32::consts::PI;

use voice_turn_core::{PipelineError, SampleRate, SpeechChunk, SpeechChunkStream, Synthesizer};

const TONE_HZ: f32 = 220.0;
const AMPLITUDE: f32 = 0.2;

#[derive(Debug, Clone)]
pub struct ToneSynthesizer {
    words_per_second: f32,
    sample_rate: SampleRate,
}

impl ToneSynthesizer {
    pub fn new(words_per_second: f32) -> Self {
        Self {
            words_per_second: words_per_second.max(0.1),
            sample_rate: SampleRate::Hz16000,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: SampleRate) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    fn samples_per_word(&self) -> usize {
        (self.sample_rate.as_u32() as f32 / self.words_per_second).round() as usize
    }

    /// (word, char offset after the word and its separator)
    fn word_offsets(text: &str) -> Vec<usize> {
        let total = text.chars().count();
        let mut offsets = Vec::new();
        let mut offset = 0usize;
        for word in text.split(' ') {
            let len = word.chars().count();
            offset = (offset + len + 1).min(total);
            if !word.trim().is_empty() {
                offsets.push(offset);
            }
        }
        offsets
    }
}

impl Default for ToneSynthesizer {
    fn default() -> Self {
        Self::new(2.5)
    }
}

#[async_trait]
impl Synthesizer for ToneSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SpeechChunkStream, PipelineError> {
        let offsets = Self::word_offsets(text);
        let per_word = self.samples_per_word();
        let rate = self.sample_rate.as_u32() as f32;

        let stream = async_stream::stream! {
            let mut phase = 0usize;
            for offset in offsets {
                let samples: Vec<f32> = (0..per_word)
                    .map(|i| AMPLITUDE * (2.0 * PI * TONE_HZ * (phase + i) as f32 / rate).sin())
                    .collect();
                phase += per_word;
                yield Ok(SpeechChunk::new(samples, Some(offset)));
            }
        };

        Ok(Box::pin(stream))
    }

    fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    fn model_name(&self) -> &str {
        "tone"
    }
}
