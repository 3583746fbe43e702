//! Text-to-speech side of the pipeline
//!
//! - `SpeechStreamAdapter`: re-framed, paced, cancellable speech output
//! - `ToneSynthesizer`: local synthesizer used in development and tests

mod adapter;
mod tone;

pub use adapter::{SpeechControl, SpeechFrame, SpeechStream, SpeechStreamAdapter};
pub use tone::ToneSynthesizer;
