//! Voice assessment orchestration state machine
//!
//! The machine is pure: it consumes [`Event`]s and produces [`Action`]s,
//! never touching audio or network directly. The session driver executes
//! actions against the capture/playback/transcription adapters and feeds
//! the outcomes back in as events, so every transition is testable without
//! hardware. Events are handled one at a time; each handler fully updates
//! state before returning.
//!
//! Guardrails carried by the machine:
//! - capture and playback are mutually exclusive, with a settle delay after
//!   speech before the microphone reopens (the device must not hear its own
//!   TTS output);
//! - one speech synthesis in flight at a time;
//! - transcripts that are too short or match a blocklist of self-hearing
//!   artifacts are discarded and listening resumes after a cooldown;
//! - each question is announced exactly once per presentation, tracked by a
//!   read-aloud flag that resets on question change or an explicit repeat;
//! - disabling from any state stops playback, aborts recording, cancels all
//!   timers, and invalidates in-flight results via a generation counter.

use std::time::Duration;

use crate::assessment::Question;
use crate::config::TimingConfig;
use crate::voice::command::{
    self, Confidence, ControlAction, NavAction, ParsedVoiceCommand, VoiceCommand,
};
use crate::voice::stt::MatchedOption;

/// Server-side match confidence at or above which a command executes
/// without clarification
const SERVER_HIGH_CONFIDENCE: f32 = 0.8;

/// Server-side match confidence at or above which a command is worth
/// confirming when the local parse found nothing
const SERVER_CLARIFY_CONFIDENCE: f32 = 0.5;

/// Current mode of the voice assessment machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceModeState {
    /// Voice mode is off
    Disabled,
    /// Enabled, waiting for a question or between turns
    Idle,
    /// Reading the current question aloud
    ReadingQuestion,
    /// Microphone turn: waiting for or capturing the learner's answer
    Listening,
    /// A recording was finalized; awaiting and interpreting the transcript
    Processing,
    /// A medium-confidence command awaits spoken confirmation
    Confirming,
    /// A command was accepted; effects are being delivered to the host
    Executing,
}

/// Timers the machine schedules through the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Post-TTS delay before the microphone reopens
    Settle,
    /// Bounds how long one recording turn lasts
    AutoStop,
    /// Bounds how long a confirmation is awaited
    ConfirmTimeout,
    /// Pause before re-listening after a rejected transcript
    Cooldown,
}

/// Inputs to the machine
#[derive(Debug, Clone)]
pub enum Event {
    /// Host enabled voice mode
    Enable,
    /// Host disabled voice mode
    Disable,
    /// Host presented a (possibly new) question
    QuestionChanged(Question),
    /// TTS playback completed naturally
    SpeechFinished,
    /// Synthesis or playback failed
    SpeechFailed(String),
    /// The microphone could not be opened
    RecordingFailed(String),
    /// A scheduled timer fired
    Timer { kind: TimerKind, generation: u64 },
    /// A transcription round-trip completed
    TranscriptReady {
        generation: u64,
        transcript: String,
        matched: Option<MatchedOption>,
    },
    /// A transcription round-trip failed (includes empty recordings)
    TranscriptionFailed { generation: u64, reason: String },
    /// The driver delivered the pending host effects
    EffectsDelivered,
}

/// Side effects the driver must execute
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Synthesize and play the given text
    Speak(String),
    /// Halt any in-progress synthesis/playback
    StopSpeaking,
    /// Open the microphone
    StartRecording,
    /// Stop the microphone and transcribe what was captured
    FinishRecording { generation: u64 },
    /// Stop the microphone, discarding what was captured
    AbortRecording,
    /// Schedule a timer
    StartTimer {
        kind: TimerKind,
        generation: u64,
        duration: Duration,
    },
    /// Abort all scheduled timers
    CancelTimers,
    /// Deliver an event to the host
    Emit(HostEvent),
}

/// Events surfaced to the hosting assessment session
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// The learner selected an answer option
    AnswerSelected { option_id: String },
    /// The learner asked to navigate
    Navigate(NavAction),
    /// The learner asked for help
    HelpRequested,
    /// Voice mode turned itself off
    VoiceDisabled,
    /// What the learner said, with any server-side match metadata
    /// (reasoning, uncertainty markers, changed-mind)
    Transcript {
        text: String,
        matched: Option<MatchedOption>,
    },
    /// Non-blocking status message for display
    Status(String),
    /// Blocking error message for display
    Error(String),
    /// Live microphone level in [0, 1] (driver-generated)
    AudioLevel(f32),
}

/// Where the machine settles after `Executing`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterExecute {
    Idle,
    Disabled,
}

/// The voice assessment state machine
pub struct Machine {
    state: VoiceModeState,
    timing: TimingConfig,
    question: Option<Question>,
    /// Has the current question been announced this presentation
    question_read: bool,
    /// Re-entrancy guard: one synthesis in flight at a time
    speaking: bool,
    recording: bool,
    /// Command awaiting spoken confirmation
    pending_command: Option<VoiceCommand>,
    /// Invalidates timers and in-flight transcriptions when bumped
    generation: u64,
    /// Timers scheduled and not yet fired or cancelled
    pending_timers: Vec<TimerKind>,
    after_execute: AfterExecute,
    /// Last surfaced status or error message
    status: Option<String>,
}

impl Machine {
    /// Create a new machine, optionally already enabled
    #[must_use]
    pub fn new(timing: TimingConfig, auto_enable: bool) -> Self {
        Self {
            state: if auto_enable { VoiceModeState::Idle } else { VoiceModeState::Disabled },
            timing,
            question: None,
            question_read: false,
            speaking: false,
            recording: false,
            pending_command: None,
            generation: 0,
            pending_timers: Vec::new(),
            after_execute: AfterExecute::Idle,
            status: None,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> VoiceModeState {
        self.state
    }

    /// Whether a synthesis/playback is in flight
    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Whether the microphone is open
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.recording
    }

    /// Timers scheduled and not yet fired or cancelled
    #[must_use]
    pub fn pending_timers(&self) -> &[TimerKind] {
        &self.pending_timers
    }

    /// Current generation for timers and transcription results
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Last surfaced status or error message
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Command awaiting confirmation, if any
    #[must_use]
    pub const fn pending_command(&self) -> Option<&VoiceCommand> {
        self.pending_command.as_ref()
    }

    /// Process one event, fully updating state, and return the side effects
    /// the driver must execute
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        let mut actions = Vec::new();
        tracing::trace!(state = ?self.state, event = ?event, "machine event");

        match event {
            Event::Enable => self.on_enable(&mut actions),
            Event::Disable => self.on_disable(&mut actions),
            Event::QuestionChanged(q) => self.on_question(q, &mut actions),
            Event::SpeechFinished => self.on_speech_finished(&mut actions),
            Event::SpeechFailed(reason) => self.on_speech_failed(&reason, &mut actions),
            Event::RecordingFailed(reason) => self.on_recording_failed(&reason, &mut actions),
            Event::Timer { kind, generation } => self.on_timer(kind, generation, &mut actions),
            Event::TranscriptReady { generation, transcript, matched } => {
                self.on_transcript(generation, &transcript, matched, &mut actions);
            }
            Event::TranscriptionFailed { generation, reason } => {
                self.on_transcription_failed(generation, &reason, &mut actions);
            }
            Event::EffectsDelivered => self.on_effects_delivered(&mut actions),
        }

        debug_assert!(
            !(self.speaking && self.recording),
            "capture and playback must be mutually exclusive"
        );
        actions
    }

    fn on_enable(&mut self, actions: &mut Vec<Action>) {
        if self.state != VoiceModeState::Disabled {
            return;
        }
        self.state = VoiceModeState::Idle;
        self.status = None;
        if self.question.is_some() && self.question_read {
            // Re-enabled mid-question: the announcement already happened,
            // so resume the listening turn directly
            self.state = VoiceModeState::Listening;
            self.start_timer(TimerKind::Settle, self.timing.settle_delay, actions);
        } else {
            self.maybe_announce(actions);
        }
    }

    fn on_disable(&mut self, actions: &mut Vec<Action>) {
        if self.state == VoiceModeState::Disabled {
            return;
        }
        if self.speaking {
            actions.push(Action::StopSpeaking);
            self.speaking = false;
        }
        if self.recording {
            actions.push(Action::AbortRecording);
            self.recording = false;
        }
        self.cancel_timers(actions);
        self.pending_command = None;
        self.state = VoiceModeState::Disabled;
        actions.push(Action::Emit(HostEvent::VoiceDisabled));
    }

    fn on_question(&mut self, question: Question, actions: &mut Vec<Action>) {
        let same_question = self
            .question
            .as_ref()
            .is_some_and(|cur| cur.id == question.id);

        // A re-render of the question already announced must not restart
        // the turn
        if same_question && self.question_read {
            self.question = Some(question);
            return;
        }

        self.question = Some(question);
        self.question_read = false;

        if self.state == VoiceModeState::Disabled {
            return;
        }

        // A new question interrupts whatever turn was in progress
        if self.recording {
            actions.push(Action::AbortRecording);
            self.recording = false;
        }
        self.cancel_timers(actions);
        self.pending_command = None;
        self.begin_reading(actions);
    }

    fn on_speech_finished(&mut self, actions: &mut Vec<Action>) {
        if !self.speaking {
            return;
        }
        self.speaking = false;

        match self.state {
            VoiceModeState::ReadingQuestion => {
                self.state = VoiceModeState::Listening;
                self.start_timer(TimerKind::Settle, self.timing.settle_delay, actions);
            }
            VoiceModeState::Confirming => {
                self.start_timer(TimerKind::Settle, self.timing.settle_delay, actions);
                self.start_timer(TimerKind::ConfirmTimeout, self.timing.confirm_timeout, actions);
            }
            _ => {}
        }
    }

    fn on_speech_failed(&mut self, reason: &str, actions: &mut Vec<Action>) {
        if !self.speaking {
            return;
        }
        self.speaking = false;

        match self.state {
            VoiceModeState::ReadingQuestion => {
                // Allow a fresh enable to try announcing again
                self.question_read = false;
                self.state = VoiceModeState::Idle;
                self.surface_error(format!("Could not read the question aloud: {reason}"), actions);
            }
            VoiceModeState::Confirming => {
                self.pending_command = None;
                self.cancel_timers(actions);
                self.state = VoiceModeState::Idle;
                self.surface_error(format!("Could not ask for confirmation: {reason}"), actions);
            }
            _ => {}
        }
    }

    fn on_recording_failed(&mut self, reason: &str, actions: &mut Vec<Action>) {
        self.recording = false;
        self.cancel_timers(actions);
        self.pending_command = None;
        self.state = VoiceModeState::Idle;
        self.surface_error(
            format!("Microphone unavailable: {reason}. Check your audio permissions."),
            actions,
        );
    }

    fn on_timer(&mut self, kind: TimerKind, generation: u64, actions: &mut Vec<Action>) {
        if generation != self.generation {
            return;
        }
        if let Some(pos) = self.pending_timers.iter().position(|t| *t == kind) {
            self.pending_timers.remove(pos);
        }

        match kind {
            TimerKind::Settle | TimerKind::Cooldown => {
                let listening_turn = matches!(
                    self.state,
                    VoiceModeState::Listening | VoiceModeState::Confirming
                );
                if listening_turn && !self.speaking && !self.recording {
                    self.recording = true;
                    actions.push(Action::StartRecording);
                    self.start_timer(TimerKind::AutoStop, self.timing.auto_stop, actions);
                }
            }
            TimerKind::AutoStop => {
                if self.recording {
                    self.recording = false;
                    actions.push(Action::FinishRecording { generation: self.generation });
                    if self.state == VoiceModeState::Listening {
                        self.state = VoiceModeState::Processing;
                    }
                }
            }
            TimerKind::ConfirmTimeout => {
                if self.state == VoiceModeState::Confirming {
                    self.pending_command = None;
                    if self.recording {
                        actions.push(Action::AbortRecording);
                        self.recording = false;
                    }
                    self.cancel_timers(actions);
                    self.surface_status("No confirmation heard. Let's try again.", actions);
                    self.state = VoiceModeState::Listening;
                    self.start_timer(TimerKind::Cooldown, self.timing.cooldown, actions);
                }
            }
        }
    }

    fn on_transcript(
        &mut self,
        generation: u64,
        transcript: &str,
        matched: Option<MatchedOption>,
        actions: &mut Vec<Action>,
    ) {
        if generation != self.generation {
            tracing::debug!(transcript, "discarding stale transcript");
            return;
        }

        match self.state {
            VoiceModeState::Processing => {
                if self.is_rejected(transcript) {
                    tracing::debug!(transcript, "transcript rejected by quality filter");
                    self.surface_status("Sorry, I didn't catch that.", actions);
                    self.state = VoiceModeState::Listening;
                    self.start_timer(TimerKind::Cooldown, self.timing.cooldown, actions);
                    return;
                }
                actions.push(Action::Emit(HostEvent::Transcript {
                    text: transcript.to_string(),
                    matched: matched.clone(),
                }));
                let parsed = self.resolve_command(transcript, matched);
                self.route_command(parsed, actions);
            }
            VoiceModeState::Confirming => {
                if self.is_rejected(transcript) {
                    tracing::debug!(transcript, "confirmation transcript rejected by quality filter");
                    self.start_timer(TimerKind::Cooldown, self.timing.cooldown, actions);
                    return;
                }
                self.on_confirmation_transcript(transcript, matched, actions);
            }
            _ => {}
        }
    }

    fn on_confirmation_transcript(
        &mut self,
        transcript: &str,
        matched: Option<MatchedOption>,
        actions: &mut Vec<Action>,
    ) {
        match command::parse_confirmation(transcript) {
            Some(true) => {
                if let Some(cmd) = self.pending_command.take() {
                    self.enter_executing(cmd, actions);
                } else {
                    self.state = VoiceModeState::Listening;
                    self.start_timer(TimerKind::Cooldown, self.timing.cooldown, actions);
                }
            }
            Some(false) => {
                self.pending_command = None;
                self.cancel_timers(actions);
                self.surface_status("Okay, cancelled. What is your answer?", actions);
                self.state = VoiceModeState::Listening;
                self.start_timer(TimerKind::Cooldown, self.timing.cooldown, actions);
            }
            None => {
                // Not a yes/no; the learner may have restated the answer
                let parsed = self.resolve_command(transcript, matched);
                match parsed.confidence {
                    Confidence::High => {
                        self.pending_command = None;
                        self.cancel_timers(actions);
                        self.enter_executing(parsed.command, actions);
                    }
                    Confidence::NeedsClarification => {
                        self.cancel_timers(actions);
                        self.pending_command = Some(parsed.command.clone());
                        self.speak_confirmation_prompt(&parsed.command, actions);
                    }
                    Confidence::Low => {
                        self.surface_status("Please say yes or no.", actions);
                        self.start_timer(TimerKind::Cooldown, self.timing.cooldown, actions);
                    }
                }
            }
        }
    }

    fn on_transcription_failed(&mut self, generation: u64, reason: &str, actions: &mut Vec<Action>) {
        if generation != self.generation {
            return;
        }
        match self.state {
            VoiceModeState::Processing => {
                self.surface_status(
                    format!("Couldn't understand the recording: {reason}. Please try again."),
                    actions,
                );
                self.state = VoiceModeState::Listening;
                self.start_timer(TimerKind::Cooldown, self.timing.cooldown, actions);
            }
            VoiceModeState::Confirming => {
                self.surface_status("Please say yes or no.", actions);
                self.start_timer(TimerKind::Cooldown, self.timing.cooldown, actions);
            }
            _ => {}
        }
    }

    fn on_effects_delivered(&mut self, actions: &mut Vec<Action>) {
        if self.state != VoiceModeState::Executing {
            return;
        }
        match self.after_execute {
            AfterExecute::Idle => {
                self.state = VoiceModeState::Idle;
                self.maybe_announce(actions);
            }
            AfterExecute::Disabled => {
                self.state = VoiceModeState::Disabled;
                actions.push(Action::Emit(HostEvent::VoiceDisabled));
            }
        }
    }

    /// Announce the current question if it has not been read this
    /// presentation
    fn maybe_announce(&mut self, actions: &mut Vec<Action>) {
        if self.state == VoiceModeState::Idle && self.question.is_some() && !self.question_read {
            self.begin_reading(actions);
        }
    }

    fn begin_reading(&mut self, actions: &mut Vec<Action>) {
        let Some(question) = &self.question else {
            self.state = VoiceModeState::Idle;
            return;
        };
        let text = question.spoken_text();
        self.question_read = true;
        self.state = VoiceModeState::ReadingQuestion;
        self.speak(text, actions);
    }

    /// Start speaking, replacing any in-flight synthesis
    fn speak(&mut self, text: String, actions: &mut Vec<Action>) {
        if self.speaking {
            actions.push(Action::StopSpeaking);
        }
        self.speaking = true;
        actions.push(Action::Speak(text));
    }

    fn speak_confirmation_prompt(&mut self, command: &VoiceCommand, actions: &mut Vec<Action>) {
        let prompt = match command {
            VoiceCommand::AnswerSelection { option_id } => {
                format!("Did you mean option {option_id}? Say yes or no.")
            }
            _ => "Say yes or no.".to_string(),
        };
        self.state = VoiceModeState::Confirming;
        self.speak(prompt, actions);
    }

    /// Combine the server-side match with the local lexical parse
    ///
    /// A confident, unhedged server match wins outright; otherwise the local
    /// parse decides; a middling server match is worth confirming when the
    /// local parse found nothing.
    fn resolve_command(
        &self,
        transcript: &str,
        matched: Option<MatchedOption>,
    ) -> ParsedVoiceCommand {
        let options = self.question.as_ref().map_or(&[][..], |q| q.options.as_slice());

        let known_match = matched.as_ref().and_then(|m| {
            options
                .iter()
                .find(|o| o.id.eq_ignore_ascii_case(&m.option_id))
                .map(|o| (o.id.clone(), m))
        });

        if let Some((option_id, m)) = &known_match {
            let unhedged = !m.changed_mind && m.uncertainty_markers.is_empty();
            if m.confidence >= SERVER_HIGH_CONFIDENCE && unhedged {
                return ParsedVoiceCommand {
                    command: VoiceCommand::AnswerSelection { option_id: option_id.clone() },
                    confidence: Confidence::High,
                };
            }
        }

        let local = command::parse(transcript, options);
        if local.command != VoiceCommand::Unrecognized {
            return local;
        }

        if let Some((option_id, m)) = known_match {
            if m.confidence >= SERVER_CLARIFY_CONFIDENCE {
                return ParsedVoiceCommand {
                    command: VoiceCommand::AnswerSelection { option_id },
                    confidence: Confidence::NeedsClarification,
                };
            }
        }

        local
    }

    fn route_command(&mut self, parsed: ParsedVoiceCommand, actions: &mut Vec<Action>) {
        match parsed.confidence {
            Confidence::High => self.enter_executing(parsed.command, actions),
            Confidence::NeedsClarification => {
                self.pending_command = Some(parsed.command.clone());
                self.speak_confirmation_prompt(&parsed.command, actions);
            }
            Confidence::Low => {
                self.surface_status(
                    "I didn't understand. Say an option letter, or say repeat.",
                    actions,
                );
                self.state = VoiceModeState::Listening;
                self.start_timer(TimerKind::Cooldown, self.timing.cooldown, actions);
            }
        }
    }

    fn enter_executing(&mut self, command: VoiceCommand, actions: &mut Vec<Action>) {
        self.cancel_timers(actions);
        self.pending_command = None;
        self.state = VoiceModeState::Executing;
        self.after_execute = AfterExecute::Idle;

        match command {
            VoiceCommand::AnswerSelection { option_id } => {
                tracing::info!(option_id, "answer selected");
                actions.push(Action::Emit(HostEvent::AnswerSelected { option_id }));
            }
            VoiceCommand::Navigation(action) => {
                tracing::info!(?action, "navigation requested");
                if action == NavAction::Repeat {
                    self.question_read = false;
                }
                actions.push(Action::Emit(HostEvent::Navigate(action)));
            }
            VoiceCommand::Control(ControlAction::Help) => {
                actions.push(Action::Emit(HostEvent::HelpRequested));
            }
            VoiceCommand::Control(ControlAction::DisableVoice) => {
                self.after_execute = AfterExecute::Disabled;
            }
            VoiceCommand::Unrecognized => {
                // Unreachable by routing; settle back without effects
            }
        }
    }

    /// Quality filter: too-short transcripts and known artifacts of the
    /// device hearing its own voice output are discarded
    fn is_rejected(&self, transcript: &str) -> bool {
        let trimmed = transcript.trim();
        if trimmed.chars().count() < self.timing.min_transcript_chars {
            return true;
        }
        let lowered = trimmed.to_lowercase();
        let lowered = lowered.trim_end_matches(['.', '!', '?']);
        self.timing.blocklist.iter().any(|b| b == lowered)
    }

    fn start_timer(&mut self, kind: TimerKind, duration: Duration, actions: &mut Vec<Action>) {
        self.pending_timers.push(kind);
        actions.push(Action::StartTimer { kind, generation: self.generation, duration });
    }

    /// Cancel all scheduled timers and invalidate in-flight results
    fn cancel_timers(&mut self, actions: &mut Vec<Action>) {
        self.generation += 1;
        if !self.pending_timers.is_empty() {
            self.pending_timers.clear();
            actions.push(Action::CancelTimers);
        }
    }

    fn surface_status(&mut self, message: impl Into<String>, actions: &mut Vec<Action>) {
        let message = message.into();
        self.status = Some(message.clone());
        actions.push(Action::Emit(HostEvent::Status(message)));
    }

    fn surface_error(&mut self, message: String, actions: &mut Vec<Action>) {
        self.status = Some(message.clone());
        actions.push(Action::Emit(HostEvent::Error(message)));
    }
}
