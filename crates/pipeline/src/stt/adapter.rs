//! Transcript stream adapter
//!
//! Owns one vendor connection at a time. Audio is pushed in through a
//! handle; caption events come out of the same handle in non-decreasing
//! timestamp order. Connection loss is retried with exponential backoff and
//! any partial caption in flight is discarded, never promoted to final.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use voice_turn_config::TranscriptConfig;
use voice_turn_core::{AudioFrame, CaptionEvent, PipelineError, Transcriber, TranscriptFrame};

/// Output of the adapter
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEvent {
    Caption(CaptionEvent),
    /// Connection dropped; a new one will be opened after `delay_ms`
    Reconnecting { attempt: u32, delay_ms: u64 },
    /// Gave up after repeated failures
    Failed(PipelineError),
}

/// Factory for per-session transcript streams
#[derive(Clone)]
pub struct TranscriptStreamAdapter {
    transcriber: Arc<dyn Transcriber>,
    config: TranscriptConfig,
}

impl TranscriptStreamAdapter {
    pub fn new(transcriber: Arc<dyn Transcriber>, config: TranscriptConfig) -> Self {
        Self { transcriber, config }
    }

    /// Spawn the connection task for one session
    pub fn start(&self, session_id: &str) -> TranscriptHandle {
        let (audio_tx, audio_rx) = mpsc::channel(self.config.buffer);
        let (event_tx, event_rx) = mpsc::channel(self.config.buffer);

        let worker = ConnectionWorker {
            session_id: session_id.to_string(),
            transcriber: self.transcriber.clone(),
            config: self.config.clone(),
            last_timestamp_ms: 0,
            pending_partial: None,
        };
        let task = tokio::spawn(worker.run(audio_rx, event_tx));

        TranscriptHandle {
            audio_tx,
            events: event_rx,
            task,
        }
    }
}

/// Per-session handle: audio in, caption events out
///
/// Dropping the handle tears the connection down.
pub struct TranscriptHandle {
    audio_tx: mpsc::Sender<AudioFrame>,
    events: mpsc::Receiver<TranscriptEvent>,
    task: JoinHandle<()>,
}

impl TranscriptHandle {
    /// Forward a frame without waiting; a full buffer drops the frame
    pub fn push(&self, frame: AudioFrame) -> Result<(), PipelineError> {
        match self.audio_tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(frame)) => {
                tracing::debug!(sequence = frame.sequence, "Transcript audio buffer full, dropping frame");
                Ok(())
            },
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PipelineError::ChannelClosed),
        }
    }

    /// Next event; `None` once the connection task has ended
    pub async fn recv(&mut self) -> Option<TranscriptEvent> {
        self.events.recv().await
    }

    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for TranscriptHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum ConnectionEnd {
    /// Audio input closed; the session is done
    InputClosed,
    /// Vendor went away
    Lost(PipelineError),
}

struct ConnectionWorker {
    session_id: String,
    transcriber: Arc<dyn Transcriber>,
    config: TranscriptConfig,
    last_timestamp_ms: u64,
    pending_partial: Option<TranscriptFrame>,
}

impl ConnectionWorker {
    async fn run(
        mut self,
        mut audio_rx: mpsc::Receiver<AudioFrame>,
        event_tx: mpsc::Sender<TranscriptEvent>,
    ) {
        let mut failures: u32 = 0;

        loop {
            let (end, delivered) = self.connect_once(&mut audio_rx, &event_tx).await;
            let err = match end {
                ConnectionEnd::InputClosed => break,
                ConnectionEnd::Lost(err) => err,
            };

            if let Some(partial) = self.pending_partial.take() {
                tracing::info!(
                    session_id = %self.session_id,
                    text = %partial.text,
                    "Discarding in-flight partial after disconnect"
                );
            }

            if delivered {
                failures = 0;
            }
            failures += 1;

            let max = self.config.max_reconnect_attempts;
            if max > 0 && failures > max {
                tracing::warn!(
                    session_id = %self.session_id,
                    attempts = failures - 1,
                    error = %err,
                    "Transcriber reconnect attempts exhausted"
                );
                let _ = event_tx.send(TranscriptEvent::Failed(err)).await;
                break;
            }

            let delay_ms = self.backoff_ms(failures);
            tracing::info!(
                session_id = %self.session_id,
                attempt = failures,
                delay_ms,
                error = %err,
                "Transcriber disconnected, reconnecting"
            );
            if event_tx
                .send(TranscriptEvent::Reconnecting {
                    attempt: failures,
                    delay_ms,
                })
                .await
                .is_err()
            {
                break;
            }

            // The vendor cannot hear audio while we wait
            let sleep = tokio::time::sleep(Duration::from_millis(delay_ms));
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    frame = audio_rx.recv() => {
                        if frame.is_none() {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Exponential backoff capped at the configured maximum
    fn backoff_ms(&self, attempt: u32) -> u64 {
        let exp = attempt.saturating_sub(1).min(16);
        self.config
            .reconnect_initial_backoff_ms
            .saturating_mul(1u64 << exp)
            .min(self.config.reconnect_max_backoff_ms)
    }

    /// Run one connection; also reports whether any caption got through
    async fn connect_once(
        &mut self,
        audio_rx: &mut mpsc::Receiver<AudioFrame>,
        event_tx: &mpsc::Sender<TranscriptEvent>,
    ) -> (ConnectionEnd, bool) {
        let (conn_tx, conn_rx) = mpsc::channel(self.config.buffer);
        let audio = Box::pin(ReceiverStream::new(conn_rx));

        let mut captions = match self.transcriber.open(&self.session_id, audio).await {
            Ok(stream) => stream,
            Err(e) => return (ConnectionEnd::Lost(e), false),
        };
        tracing::debug!(
            session_id = %self.session_id,
            model = self.transcriber.model_name(),
            "Transcriber connected"
        );

        let mut delivered = false;
        let mut conn_tx = Some(conn_tx);

        loop {
            tokio::select! {
                frame = audio_rx.recv(), if conn_tx.is_some() => {
                    match frame {
                        Some(frame) => {
                            if let Some(tx) = &conn_tx {
                                if tx.send(frame).await.is_err() {
                                    conn_tx = None;
                                }
                            }
                        },
                        None => {
                            // Let the vendor flush what it has
                            conn_tx = None;
                        },
                    }
                },
                caption = captions.next() => {
                    match caption {
                        Some(Ok(frame)) => {
                            if let Some(event) = self.accept(frame) {
                                delivered = true;
                                if event_tx.send(TranscriptEvent::Caption(event)).await.is_err() {
                                    return (ConnectionEnd::InputClosed, delivered);
                                }
                            }
                        },
                        Some(Err(e)) => return (ConnectionEnd::Lost(e), delivered),
                        None if audio_rx.is_closed() || conn_tx.is_none() => {
                            return (ConnectionEnd::InputClosed, delivered);
                        },
                        None => {
                            return (
                                ConnectionEnd::Lost(PipelineError::Disconnected(
                                    "caption stream ended".to_string(),
                                )),
                                delivered,
                            );
                        },
                    }
                },
            }
        }
    }

    /// Enforce ordering and track the in-flight partial
    fn accept(&mut self, frame: TranscriptFrame) -> Option<CaptionEvent> {
        if frame.timestamp_ms < self.last_timestamp_ms {
            tracing::warn!(
                session_id = %self.session_id,
                timestamp_ms = frame.timestamp_ms,
                last_timestamp_ms = self.last_timestamp_ms,
                "Dropping out-of-order caption"
            );
            return None;
        }
        self.last_timestamp_ms = frame.timestamp_ms;

        if frame.is_final {
            self.pending_partial = None;
        } else {
            self.pending_partial = Some(frame.clone());
        }

        Some(CaptionEvent::from_frame(&self.session_id, frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::{ScriptedConnection, ScriptedTranscriber};
    use voice_turn_core::SampleRate;

    fn config() -> TranscriptConfig {
        TranscriptConfig {
            buffer: 16,
            reconnect_initial_backoff_ms: 200,
            reconnect_max_backoff_ms: 5_000,
            max_reconnect_attempts: 3,
        }
    }

    fn frame(seq: u64) -> AudioFrame {
        AudioFrame::silence(20, SampleRate::Hz16000, seq, seq * 20)
    }

    async fn next_caption(handle: &mut TranscriptHandle) -> Option<CaptionEvent> {
        while let Some(event) = handle.recv().await {
            if let TranscriptEvent::Caption(c) = event {
                return Some(c);
            }
        }
        None
    }

    #[tokio::test]
    async fn test_partials_then_final() {
        let transcriber = ScriptedTranscriber::new(vec![ScriptedConnection::new()
            .caption(1, TranscriptFrame::partial("two", 20))
            .caption(2, TranscriptFrame::partial("two bed", 40))
            .caption(3, TranscriptFrame::final_text("two bedroom", 60))]);
        let adapter = TranscriptStreamAdapter::new(Arc::new(transcriber), config());
        let mut handle = adapter.start("s1");

        for seq in 0..4 {
            handle.push(frame(seq)).unwrap();
        }

        let first = next_caption(&mut handle).await.unwrap();
        assert!(!first.is_final);
        assert_eq!(first.session_id, "s1");
        next_caption(&mut handle).await.unwrap();
        let last = next_caption(&mut handle).await.unwrap();
        assert!(last.is_final);
        assert_eq!(last.text, "two bedroom");
    }

    #[tokio::test]
    async fn test_out_of_order_caption_dropped() {
        let transcriber = ScriptedTranscriber::new(vec![ScriptedConnection::new()
            .caption(0, TranscriptFrame::partial("a", 100))
            .caption(0, TranscriptFrame::partial("stale", 50))
            .caption(0, TranscriptFrame::final_text("a b", 120))]);
        let adapter = TranscriptStreamAdapter::new(Arc::new(transcriber), config());
        let mut handle = adapter.start("s1");
        handle.push(frame(0)).unwrap();

        let a = next_caption(&mut handle).await.unwrap();
        let b = next_caption(&mut handle).await.unwrap();
        assert_eq!(a.text, "a");
        assert_eq!(b.text, "a b");
        assert!(b.timestamp_ms >= a.timestamp_ms);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_discards_partial() {
        let transcriber = Arc::new(ScriptedTranscriber::new(vec![
            ScriptedConnection::new()
                .caption(0, TranscriptFrame::partial("book the", 20))
                .disconnect(),
            ScriptedConnection::new().caption(0, TranscriptFrame::final_text("book the visit", 400)),
        ]));
        let adapter = TranscriptStreamAdapter::new(transcriber.clone(), config());
        let mut handle = adapter.start("s1");
        handle.push(frame(0)).unwrap();

        let mut seen = Vec::new();
        while let Some(event) = handle.recv().await {
            let done = matches!(&event, TranscriptEvent::Caption(c) if c.is_final);
            seen.push(event);
            if done {
                break;
            }
        }

        assert!(matches!(&seen[0], TranscriptEvent::Caption(c) if !c.is_final));
        assert_eq!(
            seen[1],
            TranscriptEvent::Reconnecting {
                attempt: 1,
                delay_ms: 200
            }
        );
        match &seen[2] {
            TranscriptEvent::Caption(c) => {
                assert!(c.is_final);
                assert_eq!(c.text, "book the visit");
            },
            other => panic!("unexpected event {:?}", other),
        }
        // the partial "book the" never became final
        let finals: Vec<_> = seen
            .iter()
            .filter(|e| matches!(e, TranscriptEvent::Caption(c) if c.is_final))
            .collect();
        assert_eq!(finals.len(), 1);
        assert_eq!(transcriber.connections_opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let transcriber = ScriptedTranscriber::new(
            (0..10).map(|_| ScriptedConnection::new().disconnect()).collect(),
        );
        let adapter = TranscriptStreamAdapter::new(Arc::new(transcriber), config());
        let mut handle = adapter.start("s1");

        let mut delays = Vec::new();
        let mut failed = false;
        while let Some(event) = handle.recv().await {
            match event {
                TranscriptEvent::Reconnecting { delay_ms, .. } => delays.push(delay_ms),
                TranscriptEvent::Failed(_) => failed = true,
                TranscriptEvent::Caption(_) => {},
            }
        }

        assert!(failed);
        assert_eq!(delays, vec![200, 400, 800]);
    }

    #[test]
    fn test_backoff_is_capped() {
        let worker = ConnectionWorker {
            session_id: "s".into(),
            transcriber: Arc::new(ScriptedTranscriber::silent()),
            config: config(),
            last_timestamp_ms: 0,
            pending_partial: None,
        };
        assert_eq!(worker.backoff_ms(1), 200);
        assert_eq!(worker.backoff_ms(5), 3_200);
        assert_eq!(worker.backoff_ms(6), 5_000);
        assert_eq!(worker.backoff_ms(40), 5_000);
    }
}
