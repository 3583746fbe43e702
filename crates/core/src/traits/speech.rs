//! Streaming speech ports
//!
//! Vendors are consumed as pull-based streams. The adapters in the pipeline
//! crate own reconnection, ordering and cancellation on top of these.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::transcript::TranscriptFrame;
use crate::{AudioFrame, SampleRate};

/// Audio flowing into a transcription vendor
pub type AudioStream = Pin<Box<dyn Stream<Item = AudioFrame> + Send>>;

/// Captions flowing back from a transcription vendor
pub type TranscriptStream =
    Pin<Box<dyn Stream<Item = Result<TranscriptFrame, PipelineError>> + Send>>;

/// Audio chunks flowing back from a synthesis vendor
pub type SpeechChunkStream =
    Pin<Box<dyn Stream<Item = Result<SpeechChunk, PipelineError>> + Send>>;

/// Streaming speech-to-text vendor
///
/// `open` is called once per connection. The returned stream ending, or
/// yielding an error, means the connection is gone and the caller should
/// reconnect with a fresh audio stream.
///
/// # Example
///
/// ```ignore
/// let captions = transcriber.open("session-1", Box::pin(audio_rx)).await?;
/// while let Some(frame) = captions.next().await {
///     println!("{:?}", frame?);
/// }
/// ```
#[async_trait]
pub trait Transcriber: Send + Sync + 'static {
    async fn open(
        &self,
        session_id: &str,
        audio: AudioStream,
    ) -> Result<TranscriptStream, PipelineError>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}

/// A run of synthesized samples
#[derive(Debug, Clone)]
pub struct SpeechChunk {
    pub samples: Arc<[f32]>,
    /// Characters of the source text spoken once this chunk has played
    pub text_offset: Option<usize>,
}

impl SpeechChunk {
    pub fn new(samples: Vec<f32>, text_offset: Option<usize>) -> Self {
        Self {
            samples: samples.into(),
            text_offset,
        }
    }
}

/// Streaming text-to-speech vendor
///
/// Dropping the returned stream must release the vendor connection.
#[async_trait]
pub trait Synthesizer: Send + Sync + 'static {
    async fn synthesize(&self, text: &str) -> Result<SpeechChunkStream, PipelineError>;

    /// Sample rate of the produced chunks
    fn sample_rate(&self) -> SampleRate;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}
