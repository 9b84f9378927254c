//! Voice assessment pipeline
//!
//! Capture, playback, transcription, synthesis, command parsing, and the
//! orchestration machine that ties them into a hands-free answer loop.

mod capture;
pub mod command;
pub mod orchestrator;
mod playback;
mod session;
mod stt;
mod tts;

pub use capture::{samples_to_wav, AudioCapture, SAMPLE_RATE};
pub use orchestrator::{Action, Event, HostEvent, Machine, TimerKind, VoiceModeState};
pub use playback::{AudioPlayback, PlaybackHandle};
pub use session::{SessionCommand, SessionHandle, VoiceSession};
pub use stt::{MatchedOption, Transcription, TranscriptionClient};
pub use tts::{SynthesisClient, Voice};
