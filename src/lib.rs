//! Viva - voice-driven assessment sessions
//!
//! This library provides the interaction core for answering multiple-choice
//! questions entirely by voice:
//! - Question read-aloud via backend TTS
//! - Microphone capture and transcription with server-side answer matching
//! - Command parsing (answers, navigation, control) with confidence tiers
//! - An orchestration state machine with confirmation and safety guardrails
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                       Host                           │
//! │        question flow  │  answers  │  display        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ commands / host events
//! ┌────────────────────▼────────────────────────────────┐
//! │                  VoiceSession                        │
//! │   Machine  │  Capture  │  Playback  │  Timers       │
//! └────────────────────┬────────────────────────────────┘
//!                      │ HTTP
//! ┌────────────────────▼────────────────────────────────┐
//! │              Assessment backend                      │
//! │        /audio/transcribe  │  /audio/synthesize      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod assessment;
pub mod config;
pub mod error;
pub mod voice;

pub use assessment::{Question, QuestionOption, QuestionSet};
pub use config::Config;
pub use error::{Error, Result};
pub use voice::{
    HostEvent, Machine, SessionHandle, VoiceModeState, VoiceSession,
};
