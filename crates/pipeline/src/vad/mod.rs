//! Voice Activity Detection
//!
//! Energy-gated monitor that turns per-frame RMS levels into edge-only
//! `start`/`stop` signals with a trigger window, a hangover and a watchdog
//! for stalled audio.

mod monitor;

pub use monitor::{monitor_stream, StallNotice, VoiceActivityMonitor};
