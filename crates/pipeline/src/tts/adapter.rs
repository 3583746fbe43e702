//! Cancellable speech stream adapter
//!
//! A synthesis task pulls chunks from the vendor, re-frames them into fixed
//! frames and paces them at playback speed. `stop()` aborts the task, which
//! drops the vendor stream, and closes the receiving side so frames already
//! buffered are never yielded.

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use voice_turn_config::constants::timing;
use voice_turn_config::SpeechConfig;
use voice_turn_core::{AudioFrame, PipelineError, SampleRate, SpeechChunk, Synthesizer};

/// One output frame plus how much of the text it completes
#[derive(Debug, Clone)]
pub struct SpeechFrame {
    pub frame: AudioFrame,
    /// Characters of the reply spoken once this frame has played
    pub text_offset: Option<usize>,
}

/// Factory for cancellable speech streams
#[derive(Clone)]
pub struct SpeechStreamAdapter {
    synthesizer: Arc<dyn Synthesizer>,
    config: SpeechConfig,
    start_timeout: Duration,
}

impl SpeechStreamAdapter {
    pub fn new(synthesizer: Arc<dyn Synthesizer>, config: SpeechConfig) -> Self {
        Self {
            synthesizer,
            config,
            start_timeout: Duration::from_millis(timing::SPEECH_START_TIMEOUT_MS),
        }
    }

    /// Deadline for the vendor to hand back a stream
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Start speaking `text`; output timestamps begin at `start_ms`
    pub fn speak(&self, text: &str, start_ms: u64) -> SpeechStream {
        let (tx, rx) = mpsc::channel(self.config.buffer.max(1));
        let control = SpeechControl::new();

        let job = SynthesisJob {
            synthesizer: self.synthesizer.clone(),
            text: text.to_string(),
            frame_ms: self.config.frame_ms.max(1),
            pacing: self.config.realtime_pacing,
            start_timeout: self.start_timeout,
            start_ms,
        };
        let task = tokio::spawn(job.run(tx, control.clone()));
        control.attach(task);

        SpeechStream { rx, control }
    }
}

struct ControlInner {
    stopped: AtomicBool,
    notify: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable stop handle for a speech stream
#[derive(Clone)]
pub struct SpeechControl {
    inner: Arc<ControlInner>,
}

impl SpeechControl {
    fn new() -> Self {
        Self {
            inner: Arc::new(ControlInner {
                stopped: AtomicBool::new(false),
                notify: Notify::new(),
                task: Mutex::new(None),
            }),
        }
    }

    fn attach(&self, task: JoinHandle<()>) {
        if self.is_stopped() {
            task.abort();
            return;
        }
        *self.inner.task.lock() = Some(task);
    }

    /// Stop output; safe to call any number of times
    ///
    /// Returns `true` only for the call that actually stopped the stream.
    pub fn stop(&self) -> bool {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.inner.notify.notify_waiters();
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }
        tracing::debug!("Speech stream stopped");
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    async fn stopped(&self) {
        let notified = self.inner.notify.notified();
        if self.is_stopped() {
            return;
        }
        notified.await;
    }
}

/// Receiving side of one reply
pub struct SpeechStream {
    rx: mpsc::Receiver<Result<SpeechFrame, PipelineError>>,
    control: SpeechControl,
}

impl SpeechStream {
    /// Next frame; `None` when finished or stopped
    pub async fn next_frame(&mut self) -> Option<Result<SpeechFrame, PipelineError>> {
        if self.control.is_stopped() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.control.stopped() => None,
            item = self.rx.recv() => {
                // stop() may have raced with the receive
                if self.control.is_stopped() { None } else { item }
            },
        }
    }

    pub fn stop(&self) -> bool {
        self.control.stop()
    }

    pub fn control(&self) -> SpeechControl {
        self.control.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.control.is_stopped()
    }
}

impl Drop for SpeechStream {
    fn drop(&mut self) {
        self.control.stop();
    }
}

struct SynthesisJob {
    synthesizer: Arc<dyn Synthesizer>,
    text: String,
    frame_ms: u64,
    pacing: bool,
    start_timeout: Duration,
    start_ms: u64,
}

impl SynthesisJob {
    async fn run(self, tx: mpsc::Sender<Result<SpeechFrame, PipelineError>>, control: SpeechControl) {
        let opened = tokio::select! {
            biased;
            _ = control.stopped() => return,
            r = tokio::time::timeout(self.start_timeout, self.synthesizer.synthesize(&self.text)) => r,
        };

        let mut chunks = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                let _ = tx.send(Err(e)).await;
                return;
            },
            Err(_) => {
                let _ = tx
                    .send(Err(PipelineError::Timeout(self.start_timeout.as_millis() as u64)))
                    .await;
                return;
            },
        };

        let sample_rate = self.synthesizer.sample_rate();
        let mut framer = Framer::new(sample_rate, self.frame_ms, self.start_ms);
        let frame_duration = Duration::from_millis(self.frame_ms);
        let mut deadline = Instant::now();

        loop {
            let next = tokio::select! {
                biased;
                _ = control.stopped() => return,
                chunk = chunks.next() => chunk,
            };

            let done = next.is_none();
            let ready = match next {
                Some(Ok(chunk)) => framer.push(chunk),
                Some(Err(e)) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                },
                None => framer.finish(),
            };

            for frame in ready {
                if self.pacing {
                    tokio::select! {
                        biased;
                        _ = control.stopped() => return,
                        _ = tokio::time::sleep_until(deadline) => {},
                    }
                    deadline += frame_duration;
                }
                if tx.send(Ok(frame)).await.is_err() {
                    return;
                }
            }

            if done {
                return;
            }
        }
    }
}

/// Re-frames variable-size chunks into fixed frames
struct Framer {
    sample_rate: SampleRate,
    frame_ms: u64,
    frame_len: usize,
    pending: Vec<f32>,
    pending_offset: Option<usize>,
    sequence: u64,
    next_ms: u64,
}

impl Framer {
    fn new(sample_rate: SampleRate, frame_ms: u64, start_ms: u64) -> Self {
        Self {
            sample_rate,
            frame_ms,
            frame_len: sample_rate.samples_for_ms(frame_ms).max(1),
            pending: Vec::new(),
            pending_offset: None,
            sequence: 0,
            next_ms: start_ms,
        }
    }

    fn push(&mut self, chunk: SpeechChunk) -> Vec<SpeechFrame> {
        let mut out = Vec::new();
        for &sample in chunk.samples.iter() {
            self.pending.push(sample);
            if self.pending.len() == self.frame_len {
                out.push(self.emit());
            }
        }
        if chunk.text_offset.is_some() {
            match out.last_mut() {
                // chunk ended exactly on a frame boundary
                Some(last) if self.pending.is_empty() => last.text_offset = chunk.text_offset,
                _ => self.pending_offset = chunk.text_offset,
            }
        }
        out
    }

    fn finish(&mut self) -> Vec<SpeechFrame> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        vec![self.emit()]
    }

    fn emit(&mut self) -> SpeechFrame {
        let samples = std::mem::take(&mut self.pending);
        let frame = AudioFrame::new(samples, self.sample_rate, self.sequence, self.next_ms);
        self.sequence += 1;
        self.next_ms += self.frame_ms;
        SpeechFrame {
            frame,
            text_offset: self.pending_offset.take(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::ToneSynthesizer;

    fn adapter(pacing: bool) -> SpeechStreamAdapter {
        SpeechStreamAdapter::new(
            Arc::new(ToneSynthesizer::new(2.0)),
            SpeechConfig {
                frame_ms: 20,
                realtime_pacing: pacing,
                buffer: 8,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_are_fixed_size_and_timestamped() {
        let mut stream = adapter(false).speak("hello there", 1_000);
        let mut frames = Vec::new();
        while let Some(item) = stream.next_frame().await {
            frames.push(item.unwrap());
        }

        // two words at 2 words/s is one second of audio
        assert_eq!(frames.len(), 50);
        assert_eq!(frames[0].frame.timestamp_ms, 1_000);
        assert_eq!(frames[1].frame.timestamp_ms, 1_020);
        assert!(frames.iter().all(|f| f.frame.samples.len() == 320));
        assert_eq!(frames.last().and_then(|f| f.text_offset), Some(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_follows_playback_clock() {
        let mut stream = adapter(true).speak("one two three four", 0);
        let started = Instant::now();
        let mut count = 0;
        while let Some(item) = stream.next_frame().await {
            item.unwrap();
            count += 1;
        }
        assert_eq!(count, 100);
        // first frame is immediate, the rest arrive every 20ms
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(99 * 20));
        assert!(elapsed < Duration::from_millis(100 * 20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_yields_nothing_more() {
        let mut stream = adapter(true).speak("a fairly long reply to interrupt", 0);
        for _ in 0..5 {
            stream.next_frame().await.unwrap().unwrap();
        }

        assert!(stream.stop());
        assert!(stream.next_frame().await.is_none());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(stream.next_frame().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_safe_before_start() {
        let stream = adapter(true).speak("hi", 0);
        let control = stream.control();
        assert!(control.stop());
        assert!(!control.stop());
        assert!(!stream.stop());
        assert!(stream.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_from_another_task_wakes_reader() {
        let mut stream = adapter(true).speak("one two three four five six", 0);
        let control = stream.control();
        stream.next_frame().await.unwrap().unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(105)).await;
            control.stop();
        });

        let started = Instant::now();
        let mut after = 0;
        while stream.next_frame().await.is_some() {
            after += 1;
        }
        assert!(started.elapsed() <= Duration::from_millis(105));
        assert!(after <= 6);
    }
}
