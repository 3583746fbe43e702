//! Per-session counters

use serde::Serialize;

/// Counters for one call, exposed on the session endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionMetrics {
    pub vad_start_count: u64,
    pub vad_end_count: u64,
    /// Speech streams actually stopped
    pub tts_stop_count: u64,
    pub barge_in_count: u64,
    /// Final caption to first reply frame
    pub latency_sum_ms: u64,
    pub latency_count: u64,
    pub avg_latency_ms: f64,
}

impl SessionMetrics {
    pub fn record_latency(&mut self, latency_ms: u64) {
        self.latency_sum_ms += latency_ms;
        self.latency_count += 1;
        self.avg_latency_ms = self.latency_sum_ms as f64 / self.latency_count as f64;
        metrics::histogram!("voice_turn_turn_latency_ms").record(latency_ms as f64);
    }
}
