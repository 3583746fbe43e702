//! Scripted transcriber for development and tests
//!
//! Each `open` consumes the next scripted connection. A caption is released
//! once the connection has heard a given number of audio frames. With no
//! script left the transcriber is silent: it drains audio and never speaks.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use voice_turn_core::{AudioStream, PipelineError, Transcriber, TranscriptFrame, TranscriptStream};

#[derive(Debug, Clone)]
struct ScriptedCaption {
    after_frames: usize,
    frame: TranscriptFrame,
}

/// One vendor connection's worth of behaviour
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnection {
    captions: Vec<ScriptedCaption>,
    disconnect: bool,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `frame` once `after_frames` audio frames have arrived
    pub fn caption(mut self, after_frames: usize, frame: TranscriptFrame) -> Self {
        self.captions.push(ScriptedCaption {
            after_frames,
            frame,
        });
        self
    }

    /// Drop the connection after the last caption
    pub fn disconnect(mut self) -> Self {
        self.disconnect = true;
        self
    }
}

/// Transcriber that replays pre-programmed connections
#[derive(Debug, Default)]
pub struct ScriptedTranscriber {
    script: Mutex<VecDeque<ScriptedConnection>>,
    opened: AtomicUsize,
}

impl ScriptedTranscriber {
    pub fn new(connections: Vec<ScriptedConnection>) -> Self {
        Self {
            script: Mutex::new(connections.into()),
            opened: AtomicUsize::new(0),
        }
    }

    /// Never produces captions
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn connections_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn open(
        &self,
        _session_id: &str,
        audio: AudioStream,
    ) -> Result<TranscriptStream, PipelineError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let ScriptedConnection {
            captions,
            disconnect,
        } = self.script.lock().pop_front().unwrap_or_default();

        let stream = async_stream::stream! {
            let mut audio = audio;
            let mut captions = captions.into_iter().peekable();
            let mut heard = 0usize;

            loop {
                while captions.peek().map_or(false, |c| c.after_frames <= heard) {
                    if let Some(c) = captions.next() {
                        yield Ok(c.frame);
                    }
                }

                if disconnect && captions.peek().is_none() {
                    yield Err(PipelineError::Disconnected("scripted disconnect".to_string()));
                    break;
                }

                match audio.next().await {
                    Some(_) => heard += 1,
                    None => break,
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_turn_core::{AudioFrame, SampleRate};

    #[tokio::test]
    async fn test_silent_transcriber_drains_audio() {
        let transcriber = ScriptedTranscriber::silent();
        let audio = futures::stream::iter(
            (0..5).map(|i| AudioFrame::silence(20, SampleRate::Hz16000, i, i * 20)),
        );
        let captions: Vec<_> = transcriber
            .open("s", Box::pin(audio))
            .await
            .unwrap()
            .collect()
            .await;
        assert!(captions.is_empty());
        assert_eq!(transcriber.connections_opened(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_after_captions() {
        let transcriber = ScriptedTranscriber::new(vec![ScriptedConnection::new()
            .caption(0, TranscriptFrame::partial("hi", 0))
            .disconnect()]);
        let mut captions = transcriber
            .open("s", Box::pin(futures::stream::pending::<AudioFrame>()))
            .await
            .unwrap();

        assert!(captions.next().await.unwrap().is_ok());
        assert!(matches!(
            captions.next().await,
            Some(Err(PipelineError::Disconnected(_)))
        ));
        assert!(captions.next().await.is_none());
    }
}
