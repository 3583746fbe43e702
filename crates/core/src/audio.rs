//! Audio frame types and utilities

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Minimum energy reported for an empty or all-zero frame
pub const SILENCE_DB: f32 = -96.0;

/// Supported audio sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SampleRate {
    /// 8kHz - Telephony
    Hz8000,
    /// 16kHz - Speech recognition and browser capture
    #[default]
    Hz16000,
    /// 24kHz - Common synthesis output
    Hz24000,
    /// 48kHz - WebRTC native
    Hz48000,
}

impl SampleRate {
    /// Get sample rate as u32
    pub fn as_u32(&self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
            SampleRate::Hz24000 => 24000,
            SampleRate::Hz48000 => 48000,
        }
    }

    /// Number of mono samples in a frame of `ms` milliseconds
    pub fn samples_for_ms(&self, ms: u64) -> usize {
        (self.as_u32() as u64 * ms / 1000) as usize
    }
}

/// Mono audio frame on the session media clock
///
/// `timestamp_ms` is measured from the start of the session, not wall time,
/// so ordering survives reconnects and paused test clocks alike.
#[derive(Clone)]
pub struct AudioFrame {
    /// Samples normalized to [-1.0, 1.0]
    pub samples: Arc<[f32]>,
    pub sample_rate: SampleRate,
    /// Frame sequence number for ordering
    pub sequence: u64,
    /// Offset of the first sample from session start
    pub timestamp_ms: u64,
    pub duration: Duration,
    /// RMS energy in dB
    pub energy_db: f32,
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("samples_len", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("sequence", &self.sequence)
            .field("timestamp_ms", &self.timestamp_ms)
            .field("duration", &self.duration)
            .field("energy_db", &self.energy_db)
            .finish()
    }
}

impl AudioFrame {
    /// Create a new audio frame from f32 samples
    pub fn new(samples: Vec<f32>, sample_rate: SampleRate, sequence: u64, timestamp_ms: u64) -> Self {
        let duration =
            Duration::from_secs_f64(samples.len() as f64 / sample_rate.as_u32() as f64);
        let energy_db = Self::calculate_energy_db(&samples);

        Self {
            samples: samples.into(),
            sample_rate,
            sequence,
            timestamp_ms,
            duration,
            energy_db,
        }
    }

    /// A frame of digital silence lasting `ms` milliseconds
    pub fn silence(ms: u64, sample_rate: SampleRate, sequence: u64, timestamp_ms: u64) -> Self {
        Self::new(vec![0.0; sample_rate.samples_for_ms(ms)], sample_rate, sequence, timestamp_ms)
    }

    /// A constant-amplitude frame, handy for driving energy detectors
    pub fn tone(
        amplitude: f32,
        ms: u64,
        sample_rate: SampleRate,
        sequence: u64,
        timestamp_ms: u64,
    ) -> Self {
        let len = sample_rate.samples_for_ms(ms);
        let samples = (0..len)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect();
        Self::new(samples, sample_rate, sequence, timestamp_ms)
    }

    /// Calculate RMS energy in decibels
    pub fn calculate_energy_db(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return SILENCE_DB;
        }

        let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
        let rms = (sum_squares / samples.len() as f32).sqrt();

        if rms > 0.0 {
            (20.0 * rms.log10()).max(SILENCE_DB)
        } else {
            SILENCE_DB
        }
    }

    /// Convert from PCM16 bytes (little-endian)
    ///
    /// A trailing odd byte is ignored.
    pub fn from_pcm16(bytes: &[u8], sample_rate: SampleRate, sequence: u64, timestamp_ms: u64) -> Self {
        const PCM16_NORMALIZE: f32 = 32768.0;

        let samples: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / PCM16_NORMALIZE)
            .collect();

        Self::new(samples, sample_rate, sequence, timestamp_ms)
    }

    /// Convert to PCM16 bytes (little-endian)
    pub fn to_pcm16(&self) -> Vec<u8> {
        const PCM16_SCALE: f32 = 32767.0;

        self.samples
            .iter()
            .flat_map(|&sample| ((sample.clamp(-1.0, 1.0) * PCM16_SCALE) as i16).to_le_bytes())
            .collect()
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }

    /// Media-clock time at which this frame ends
    pub fn end_ms(&self) -> u64 {
        self.timestamp_ms + self.duration_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame::silence(20, SampleRate::Hz16000, 0, 0);
        assert_eq!(frame.samples.len(), 320);
        assert_eq!(frame.duration_ms(), 20);
        assert_eq!(frame.end_ms(), 20);
    }

    #[test]
    fn test_energy_levels() {
        let silent = AudioFrame::silence(20, SampleRate::Hz16000, 0, 0);
        assert_eq!(silent.energy_db, SILENCE_DB);

        // amplitude 0.1 -> -20 dB
        let loud = AudioFrame::tone(0.1, 20, SampleRate::Hz16000, 1, 20);
        assert!((loud.energy_db + 20.0).abs() < 0.01);

        assert_eq!(AudioFrame::calculate_energy_db(&[]), SILENCE_DB);
    }

    #[test]
    fn test_pcm16_conversion() {
        let frame = AudioFrame::tone(0.5, 10, SampleRate::Hz16000, 0, 0);
        let bytes = frame.to_pcm16();
        assert_eq!(bytes.len(), frame.samples.len() * 2);

        let decoded = AudioFrame::from_pcm16(&bytes, SampleRate::Hz16000, 0, 0);
        assert_eq!(decoded.samples.len(), frame.samples.len());
        assert!((decoded.samples[0] - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_pcm16_odd_byte_ignored() {
        let frame = AudioFrame::from_pcm16(&[0, 0, 7], SampleRate::Hz16000, 0, 0);
        assert_eq!(frame.samples.len(), 1);
    }
}
