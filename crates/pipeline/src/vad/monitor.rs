//! Edge-triggered voice activity monitor
//!
//! Durations are counted on the media clock (frame durations), so the
//! trigger and hangover windows do not depend on how quickly frames are
//! delivered. Only the stall watchdog looks at wall time.

use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::time::Instant;

use voice_turn_config::VadConfig;
use voice_turn_core::{AudioFrame, VadEdge, VadSignal};

/// Reported once when frames stop arriving
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StallNotice {
    /// Synthetic stop, present only if the caller was mid-speech
    pub synthetic_stop: Option<VadSignal>,
    /// Media time at which the last frame ended
    pub last_frame_ms: u64,
}

/// Per-session voice activity monitor
///
/// Emits strictly alternating `start`/`stop` edges. `start` fires once
/// energy has stayed above the threshold for `trigger_ms`; `stop` fires once
/// it has stayed below for `hangover_ms`.
#[derive(Debug)]
pub struct VoiceActivityMonitor {
    threshold_db: f32,
    trigger_ms: u64,
    hangover_ms: u64,
    watchdog: Duration,
    speaking: bool,
    speech_run_ms: u64,
    silence_run_ms: u64,
    last_frame_end_ms: u64,
    last_frame_at: Option<Instant>,
    stalled: bool,
    starts: u64,
    stops: u64,
}

impl VoiceActivityMonitor {
    pub fn new(config: &VadConfig) -> Self {
        Self {
            threshold_db: config.energy_threshold_db,
            trigger_ms: config.trigger_ms,
            hangover_ms: config.hangover_ms,
            watchdog: Duration::from_millis(config.watchdog_ms),
            speaking: false,
            speech_run_ms: 0,
            silence_run_ms: 0,
            last_frame_end_ms: 0,
            last_frame_at: None,
            stalled: false,
            starts: 0,
            stops: 0,
        }
    }

    /// Feed one frame, returning an edge if this frame completed one
    pub fn process(&mut self, frame: &AudioFrame) -> Option<VadSignal> {
        self.last_frame_at = Some(Instant::now());
        self.last_frame_end_ms = frame.end_ms();
        if self.stalled {
            tracing::debug!(timestamp_ms = frame.timestamp_ms, "Audio resumed after stall");
            self.stalled = false;
        }

        let duration_ms = frame.duration_ms();
        let is_speech = frame.energy_db > self.threshold_db;

        if is_speech {
            self.silence_run_ms = 0;
            self.speech_run_ms += duration_ms;
            if !self.speaking && self.speech_run_ms >= self.trigger_ms {
                self.speaking = true;
                return Some(self.edge(VadSignal::start(frame.end_ms())));
            }
        } else {
            self.speech_run_ms = 0;
            if self.speaking {
                self.silence_run_ms += duration_ms;
                if self.silence_run_ms >= self.hangover_ms {
                    self.speaking = false;
                    self.silence_run_ms = 0;
                    return Some(self.edge(VadSignal::stop(frame.end_ms())));
                }
            }
        }

        None
    }

    /// Watchdog tick; reports a stall once per gap in frame arrival
    pub fn check_stall(&mut self, now: Instant) -> Option<StallNotice> {
        let last = self.last_frame_at?;
        if self.stalled || now.saturating_duration_since(last) < self.watchdog {
            return None;
        }

        self.stalled = true;
        self.speech_run_ms = 0;
        self.silence_run_ms = 0;

        let synthetic_stop = if self.speaking {
            self.speaking = false;
            Some(self.edge(VadSignal::stalled(self.last_frame_end_ms)))
        } else {
            None
        };

        tracing::warn!(
            last_frame_ms = self.last_frame_end_ms,
            watchdog_ms = self.watchdog.as_millis() as u64,
            "Audio stalled"
        );

        Some(StallNotice {
            synthetic_stop,
            last_frame_ms: self.last_frame_end_ms,
        })
    }

    fn edge(&mut self, signal: VadSignal) -> VadSignal {
        match signal.edge {
            VadEdge::Start => self.starts += 1,
            VadEdge::Stop => self.stops += 1,
        }
        metrics::counter!("voice_turn_vad_edges_total", "edge" => signal.edge.as_str()).increment(1);
        tracing::debug!(edge = signal.edge.as_str(), timestamp_ms = signal.timestamp_ms, "VAD edge");
        signal
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn start_count(&self) -> u64 {
        self.starts
    }

    pub fn stop_count(&self) -> u64 {
        self.stops
    }

    pub fn watchdog(&self) -> Duration {
        self.watchdog
    }

    /// Reset to the initial silent state
    pub fn reset(&mut self) {
        self.speaking = false;
        self.speech_run_ms = 0;
        self.silence_run_ms = 0;
        self.stalled = false;
        self.last_frame_at = None;
    }
}

/// Lazy, non-restartable edge stream over a frame stream
///
/// A gap longer than the watchdog yields the synthetic stop (if any) and
/// the stream keeps waiting for audio. The stream ends when `frames` does.
pub fn monitor_stream<S>(
    mut monitor: VoiceActivityMonitor,
    frames: S,
) -> impl Stream<Item = VadSignal> + Send
where
    S: Stream<Item = AudioFrame> + Send + 'static,
{
    async_stream::stream! {
        let mut frames = Box::pin(frames);
        loop {
            match tokio::time::timeout(monitor.watchdog(), frames.next()).await {
                Ok(Some(frame)) => {
                    if let Some(signal) = monitor.process(&frame) {
                        yield signal;
                    }
                },
                Ok(None) => break,
                Err(_) => {
                    if let Some(notice) = monitor.check_stall(Instant::now()) {
                        if let Some(stop) = notice.synthetic_stop {
                            yield stop;
                        }
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_turn_core::SampleRate;

    const LOUD: f32 = 0.3;

    fn config() -> VadConfig {
        VadConfig::default()
    }

    fn frames(pattern: &[(bool, usize)]) -> Vec<AudioFrame> {
        let mut out = Vec::new();
        let mut seq = 0u64;
        for &(loud, count) in pattern {
            for _ in 0..count {
                let ts = seq * 20;
                let frame = if loud {
                    AudioFrame::tone(LOUD, 20, SampleRate::Hz16000, seq, ts)
                } else {
                    AudioFrame::silence(20, SampleRate::Hz16000, seq, ts)
                };
                out.push(frame);
                seq += 1;
            }
        }
        out
    }

    fn edges(monitor: &mut VoiceActivityMonitor, input: &[AudioFrame]) -> Vec<VadSignal> {
        input.iter().filter_map(|f| monitor.process(f)).collect()
    }

    #[test]
    fn test_start_requires_trigger_window() {
        let mut monitor = VoiceActivityMonitor::new(&config());

        // 140ms of speech is below the 160ms trigger
        assert!(edges(&mut monitor, &frames(&[(true, 7), (false, 1)])).is_empty());

        let mut monitor = VoiceActivityMonitor::new(&config());
        let out = edges(&mut monitor, &frames(&[(true, 8)]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].edge, VadEdge::Start);
        assert_eq!(out[0].timestamp_ms, 160);
    }

    #[test]
    fn test_stop_after_hangover() {
        let mut monitor = VoiceActivityMonitor::new(&config());
        // 280ms pause is inside the 300ms hangover
        let out = edges(&mut monitor, &frames(&[(true, 10), (false, 14), (true, 5)]));
        assert_eq!(out.len(), 1);

        let out = edges(&mut monitor, &frames(&[(false, 15)]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].edge, VadEdge::Stop);
        assert!(!monitor.is_speaking());
    }

    #[test]
    fn test_edges_strictly_alternate() {
        let mut monitor = VoiceActivityMonitor::new(&config());
        let pattern: Vec<(bool, usize)> = (0..40)
            .map(|i| (i % 2 == 0, 1 + (i * 7 % 23)))
            .collect();

        let out = edges(&mut monitor, &frames(&pattern));
        assert!(!out.is_empty());
        assert_eq!(out[0].edge, VadEdge::Start);
        for pair in out.windows(2) {
            assert_ne!(pair[0].edge, pair[1].edge);
        }
        assert!(monitor.start_count() - monitor.stop_count() <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_emits_synthetic_stop_once() {
        let mut monitor = VoiceActivityMonitor::new(&config());
        edges(&mut monitor, &frames(&[(true, 10)]));
        assert!(monitor.is_speaking());

        assert!(monitor.check_stall(Instant::now()).is_none());

        tokio::time::advance(Duration::from_millis(1_001)).await;
        let notice = monitor.check_stall(Instant::now()).unwrap();
        let stop = notice.synthetic_stop.unwrap();
        assert_eq!(stop.edge, VadEdge::Stop);
        assert!(stop.stalled);
        assert_eq!(notice.last_frame_ms, 200);
        assert!(monitor.is_stalled());

        // reported once per gap
        tokio::time::advance(Duration::from_millis(2_000)).await;
        assert!(monitor.check_stall(Instant::now()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_while_silent_has_no_edge() {
        let mut monitor = VoiceActivityMonitor::new(&config());
        edges(&mut monitor, &frames(&[(false, 3)]));

        tokio::time::advance(Duration::from_millis(1_500)).await;
        let notice = monitor.check_stall(Instant::now()).unwrap();
        assert!(notice.synthetic_stop.is_none());

        // audio resuming clears the stall
        monitor.process(&AudioFrame::silence(20, SampleRate::Hz16000, 4, 80));
        assert!(!monitor.is_stalled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stream_is_lazy_and_ends_with_input() {
        let input = frames(&[(true, 10), (false, 20)]);
        let stream = monitor_stream(
            VoiceActivityMonitor::new(&config()),
            futures::stream::iter(input),
        );
        let out: Vec<VadSignal> = stream.collect().await;
        assert_eq!(
            out.iter().map(|s| s.edge).collect::<Vec<_>>(),
            vec![VadEdge::Start, VadEdge::Stop]
        );
    }
}
