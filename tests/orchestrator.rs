//! Orchestration state machine integration tests
//!
//! Drives the machine through full voice turns without audio hardware: the
//! tests play the role of the session driver, feeding back the events that
//! executing each action would produce.

use viva_voice::config::TimingConfig;
use viva_voice::voice::command::NavAction;
use viva_voice::voice::{
    Action, Event, HostEvent, Machine, MatchedOption, TimerKind, VoiceModeState,
};
use viva_voice::{Question, QuestionOption};

fn question() -> Question {
    Question {
        id: "q-add-1".to_string(),
        stem: "What is 12 + 8?".to_string(),
        context: None,
        options: vec![
            QuestionOption { id: "A".to_string(), text: "18".to_string() },
            QuestionOption { id: "B".to_string(), text: "20".to_string() },
            QuestionOption { id: "C".to_string(), text: "22".to_string() },
        ],
    }
}

fn matched(option_id: &str, confidence: f32) -> MatchedOption {
    MatchedOption {
        option_id: option_id.to_string(),
        value: None,
        confidence,
        extraction_method: "ai_gpt4_mini".to_string(),
        reasoning: None,
        uncertainty_markers: Vec::new(),
        changed_mind: false,
    }
}

fn enabled_machine() -> Machine {
    Machine::new(TimingConfig::default(), true)
}

/// The generation a scheduled timer of the given kind was issued with
fn timer_gen(actions: &[Action], kind: TimerKind) -> u64 {
    actions
        .iter()
        .find_map(|a| match a {
            Action::StartTimer { kind: k, generation, .. } if *k == kind => Some(*generation),
            _ => None,
        })
        .unwrap_or_else(|| panic!("expected {kind:?} timer in {actions:?}"))
}

fn has_speak(actions: &[Action]) -> bool {
    actions.iter().any(|a| matches!(a, Action::Speak(_)))
}

/// Drive an enabled machine with a presented question up to the point where
/// a recording has been finalized and its transcript is awaited. Returns
/// the generation the transcription was issued with.
fn advance_to_processing(machine: &mut Machine) -> u64 {
    let actions = machine.handle(Event::QuestionChanged(question()));
    assert!(has_speak(&actions));
    assert_eq!(machine.state(), VoiceModeState::ReadingQuestion);

    let actions = machine.handle(Event::SpeechFinished);
    assert_eq!(machine.state(), VoiceModeState::Listening);
    let gen = timer_gen(&actions, TimerKind::Settle);

    let actions = machine.handle(Event::Timer { kind: TimerKind::Settle, generation: gen });
    assert!(actions.contains(&Action::StartRecording));
    assert!(machine.is_recording());
    let gen = timer_gen(&actions, TimerKind::AutoStop);

    let actions = machine.handle(Event::Timer { kind: TimerKind::AutoStop, generation: gen });
    assert_eq!(machine.state(), VoiceModeState::Processing);
    assert!(!machine.is_recording());
    actions
        .iter()
        .find_map(|a| match a {
            Action::FinishRecording { generation } => Some(*generation),
            _ => None,
        })
        .expect("recording finalized")
}

#[test]
fn happy_path_answer_selection() {
    let mut machine = enabled_machine();
    let gen = advance_to_processing(&mut machine);

    let actions = machine.handle(Event::TranscriptReady {
        generation: gen,
        transcript: "It's B, twenty".to_string(),
        matched: Some(matched("B", 0.92)),
    });

    assert_eq!(machine.state(), VoiceModeState::Executing);
    assert!(actions.contains(&Action::Emit(HostEvent::AnswerSelected {
        option_id: "B".to_string()
    })));

    let actions = machine.handle(Event::EffectsDelivered);
    assert_eq!(machine.state(), VoiceModeState::Idle);
    // Question already announced; no re-read
    assert!(!has_speak(&actions));
}

#[test]
fn speaking_and_recording_stay_mutually_exclusive() {
    let mut machine = enabled_machine();

    machine.handle(Event::QuestionChanged(question()));
    assert!(machine.is_speaking() && !machine.is_recording());

    let actions = machine.handle(Event::SpeechFinished);
    let gen = timer_gen(&actions, TimerKind::Settle);
    assert!(!machine.is_speaking() && !machine.is_recording());

    machine.handle(Event::Timer { kind: TimerKind::Settle, generation: gen });
    assert!(!machine.is_speaking() && machine.is_recording());

    // A new question while recording aborts capture before speaking starts
    let mut new_question = question();
    new_question.id = "q-add-2".to_string();
    let actions = machine.handle(Event::QuestionChanged(new_question));
    assert!(actions.contains(&Action::AbortRecording));
    assert!(machine.is_speaking() && !machine.is_recording());
}

#[test]
fn question_read_exactly_once_per_presentation() {
    let mut machine = enabled_machine();

    let actions = machine.handle(Event::QuestionChanged(question()));
    assert!(has_speak(&actions));

    // The same question re-presented (host re-render) stays quiet
    let actions = machine.handle(Event::QuestionChanged(question()));
    assert!(!has_speak(&actions));

    let actions = machine.handle(Event::SpeechFinished);
    let gen = timer_gen(&actions, TimerKind::Settle);
    machine.handle(Event::Timer { kind: TimerKind::Settle, generation: gen });

    let actions = machine.handle(Event::QuestionChanged(question()));
    assert!(!has_speak(&actions));
    assert_eq!(machine.state(), VoiceModeState::Listening);
}

#[test]
fn disable_clears_timers_and_invalidates_results() {
    let mut machine = enabled_machine();
    let gen = advance_to_processing(&mut machine);

    let actions = machine.handle(Event::Disable);
    assert_eq!(machine.state(), VoiceModeState::Disabled);
    assert!(machine.pending_timers().is_empty());
    assert!(actions.contains(&Action::Emit(HostEvent::VoiceDisabled)));

    // The in-flight transcription lands after re-enabling: stale, ignored
    machine.handle(Event::Enable);
    let actions = machine.handle(Event::TranscriptReady {
        generation: gen,
        transcript: "option B".to_string(),
        matched: Some(matched("B", 0.95)),
    });
    assert!(actions.is_empty());
    assert_ne!(machine.state(), VoiceModeState::Executing);
}

#[test]
fn disable_while_reading_stops_speech() {
    let mut machine = enabled_machine();
    machine.handle(Event::QuestionChanged(question()));
    assert!(machine.is_speaking());

    let actions = machine.handle(Event::Disable);
    assert!(actions.contains(&Action::StopSpeaking));
    assert!(!machine.is_speaking());
    assert_eq!(machine.state(), VoiceModeState::Disabled);
}

#[test]
fn hedged_answer_requires_confirmation_then_yes() {
    let mut machine = enabled_machine();
    let gen = advance_to_processing(&mut machine);

    let actions = machine.handle(Event::TranscriptReady {
        generation: gen,
        transcript: "um, maybe B?".to_string(),
        matched: None,
    });
    assert_eq!(machine.state(), VoiceModeState::Confirming);
    let prompt = actions
        .iter()
        .find_map(|a| match a {
            Action::Speak(text) => Some(text.clone()),
            _ => None,
        })
        .expect("confirmation prompt spoken");
    assert!(prompt.contains("option B"));

    // Prompt finishes; machine listens for the confirmation
    let actions = machine.handle(Event::SpeechFinished);
    let gen = timer_gen(&actions, TimerKind::Settle);
    timer_gen(&actions, TimerKind::ConfirmTimeout);

    let actions = machine.handle(Event::Timer { kind: TimerKind::Settle, generation: gen });
    let gen = timer_gen(&actions, TimerKind::AutoStop);
    let actions = machine.handle(Event::Timer { kind: TimerKind::AutoStop, generation: gen });
    let gen = actions
        .iter()
        .find_map(|a| match a {
            Action::FinishRecording { generation } => Some(*generation),
            _ => None,
        })
        .expect("confirmation recording finalized");

    let actions = machine.handle(Event::TranscriptReady {
        generation: gen,
        transcript: "yes".to_string(),
        matched: None,
    });
    assert_eq!(machine.state(), VoiceModeState::Executing);
    assert!(actions.contains(&Action::Emit(HostEvent::AnswerSelected {
        option_id: "B".to_string()
    })));
}

#[test]
fn confirmation_no_returns_to_listening() {
    let mut machine = enabled_machine();
    let gen = advance_to_processing(&mut machine);

    machine.handle(Event::TranscriptReady {
        generation: gen,
        transcript: "maybe B".to_string(),
        matched: None,
    });
    machine.handle(Event::SpeechFinished);

    let gen = machine.generation();
    let actions = machine.handle(Event::TranscriptReady {
        generation: gen,
        transcript: "no".to_string(),
        matched: None,
    });
    assert_eq!(machine.state(), VoiceModeState::Listening);
    assert!(machine.pending_command().is_none());
    timer_gen(&actions, TimerKind::Cooldown);
}

#[test]
fn confirmation_times_out_to_listening() {
    let mut machine = enabled_machine();
    let gen = advance_to_processing(&mut machine);

    machine.handle(Event::TranscriptReady {
        generation: gen,
        transcript: "I think it's B".to_string(),
        matched: Some(matched("B", 0.6)),
    });
    assert_eq!(machine.state(), VoiceModeState::Confirming);

    let actions = machine.handle(Event::SpeechFinished);
    let gen = timer_gen(&actions, TimerKind::ConfirmTimeout);

    let actions =
        machine.handle(Event::Timer { kind: TimerKind::ConfirmTimeout, generation: gen });
    assert_eq!(machine.state(), VoiceModeState::Listening);
    assert!(machine.pending_command().is_none());
    assert!(actions
        .iter()
        .any(|a| matches!(a, Action::Emit(HostEvent::Status(_)))));
    timer_gen(&actions, TimerKind::Cooldown);
}

#[test]
fn server_match_with_uncertainty_markers_is_confirmed() {
    let mut machine = enabled_machine();
    let gen = advance_to_processing(&mut machine);

    let mut m = matched("C", 0.9);
    m.uncertainty_markers = vec!["I guess".to_string()];

    machine.handle(Event::TranscriptReady {
        generation: gen,
        transcript: "I guess C".to_string(),
        matched: Some(m),
    });
    assert_eq!(machine.state(), VoiceModeState::Confirming);
}

#[test]
fn short_and_blocklisted_transcripts_are_discarded() {
    for transcript in ["a", "Thank you."] {
        let mut machine = enabled_machine();
        let gen = advance_to_processing(&mut machine);

        let actions = machine.handle(Event::TranscriptReady {
            generation: gen,
            transcript: transcript.to_string(),
            matched: None,
        });
        assert_eq!(machine.state(), VoiceModeState::Listening, "transcript {transcript:?}");
        timer_gen(&actions, TimerKind::Cooldown);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Emit(HostEvent::Status(_)))));
        // Filtered artifacts are not surfaced to the host
        assert!(!actions
            .iter()
            .any(|a| matches!(a, Action::Emit(HostEvent::Transcript { .. }))));
    }
}

#[test]
fn transcript_and_match_metadata_are_surfaced() {
    let mut machine = enabled_machine();
    let gen = advance_to_processing(&mut machine);

    let mut m = matched("B", 0.92);
    m.value = Some("20".to_string());
    m.reasoning = Some("counted on from twelve".to_string());

    let actions = machine.handle(Event::TranscriptReady {
        generation: gen,
        transcript: "it's B, twenty".to_string(),
        matched: Some(m.clone()),
    });

    assert!(actions.contains(&Action::Emit(HostEvent::Transcript {
        text: "it's B, twenty".to_string(),
        matched: Some(m),
    })));
    assert_eq!(machine.state(), VoiceModeState::Executing);
}

#[test]
fn blocklisted_transcript_during_confirmation_is_discarded() {
    let mut machine = enabled_machine();
    let gen = advance_to_processing(&mut machine);

    machine.handle(Event::TranscriptReady {
        generation: gen,
        transcript: "maybe B".to_string(),
        matched: None,
    });
    machine.handle(Event::SpeechFinished);
    assert_eq!(machine.state(), VoiceModeState::Confirming);

    let gen = machine.generation();
    let actions = machine.handle(Event::TranscriptReady {
        generation: gen,
        transcript: "Thank you.".to_string(),
        matched: None,
    });

    // The artifact neither confirms nor cancels; listening quietly resumes
    assert_eq!(machine.state(), VoiceModeState::Confirming);
    assert!(machine.pending_command().is_some());
    assert!(!has_speak(&actions));
    timer_gen(&actions, TimerKind::Cooldown);
}

#[test]
fn reenable_resumes_listening_without_rereading() {
    let mut machine = enabled_machine();
    machine.handle(Event::QuestionChanged(question()));
    machine.handle(Event::SpeechFinished);
    assert_eq!(machine.state(), VoiceModeState::Listening);

    machine.handle(Event::Disable);
    let actions = machine.handle(Event::Enable);

    // Already announced this presentation; pick up the listening turn
    assert_eq!(machine.state(), VoiceModeState::Listening);
    assert!(!has_speak(&actions));
    let gen = timer_gen(&actions, TimerKind::Settle);

    let actions = machine.handle(Event::Timer { kind: TimerKind::Settle, generation: gen });
    assert!(actions.contains(&Action::StartRecording));
    assert!(machine.is_recording());
}

#[test]
fn unrecognized_transcript_resumes_listening() {
    let mut machine = enabled_machine();
    let gen = advance_to_processing(&mut machine);

    let actions = machine.handle(Event::TranscriptReady {
        generation: gen,
        transcript: "the weather is lovely today".to_string(),
        matched: None,
    });
    assert_eq!(machine.state(), VoiceModeState::Listening);
    timer_gen(&actions, TimerKind::Cooldown);
}

#[test]
fn repeat_command_reads_question_again() {
    let mut machine = enabled_machine();
    let gen = advance_to_processing(&mut machine);

    let actions = machine.handle(Event::TranscriptReady {
        generation: gen,
        transcript: "repeat please".to_string(),
        matched: None,
    });
    assert_eq!(machine.state(), VoiceModeState::Executing);
    assert!(actions.contains(&Action::Emit(HostEvent::Navigate(NavAction::Repeat))));

    // Settling out of Executing re-announces the question
    let actions = machine.handle(Event::EffectsDelivered);
    assert_eq!(machine.state(), VoiceModeState::ReadingQuestion);
    assert!(has_speak(&actions));
}

#[test]
fn spoken_disable_turns_voice_off() {
    let mut machine = enabled_machine();
    let gen = advance_to_processing(&mut machine);

    machine.handle(Event::TranscriptReady {
        generation: gen,
        transcript: "turn off voice".to_string(),
        matched: None,
    });
    assert_eq!(machine.state(), VoiceModeState::Executing);

    let actions = machine.handle(Event::EffectsDelivered);
    assert_eq!(machine.state(), VoiceModeState::Disabled);
    assert!(actions.contains(&Action::Emit(HostEvent::VoiceDisabled)));
}

#[test]
fn transcription_failure_resumes_listening() {
    let mut machine = enabled_machine();
    let gen = advance_to_processing(&mut machine);

    let actions = machine.handle(Event::TranscriptionFailed {
        generation: gen,
        reason: "no audio captured".to_string(),
    });
    assert_eq!(machine.state(), VoiceModeState::Listening);
    timer_gen(&actions, TimerKind::Cooldown);
}

#[test]
fn synthesis_failure_returns_to_idle_without_listening() {
    let mut machine = enabled_machine();
    machine.handle(Event::QuestionChanged(question()));

    let actions = machine.handle(Event::SpeechFailed("connection refused".to_string()));
    assert_eq!(machine.state(), VoiceModeState::Idle);
    assert!(!machine.is_recording());
    assert!(machine.pending_timers().is_empty());
    assert!(actions
        .iter()
        .any(|a| matches!(a, Action::Emit(HostEvent::Error(_)))));
}

#[test]
fn recording_failure_surfaces_error_and_idles() {
    let mut machine = enabled_machine();
    machine.handle(Event::QuestionChanged(question()));
    let actions = machine.handle(Event::SpeechFinished);
    let gen = timer_gen(&actions, TimerKind::Settle);
    machine.handle(Event::Timer { kind: TimerKind::Settle, generation: gen });

    let actions = machine.handle(Event::RecordingFailed("device busy".to_string()));
    assert_eq!(machine.state(), VoiceModeState::Idle);
    assert!(machine.pending_timers().is_empty());
    assert!(actions
        .iter()
        .any(|a| matches!(a, Action::Emit(HostEvent::Error(_)))));
}

#[test]
fn new_question_interrupts_listening_turn() {
    let mut machine = enabled_machine();
    machine.handle(Event::QuestionChanged(question()));
    let actions = machine.handle(Event::SpeechFinished);
    let gen = timer_gen(&actions, TimerKind::Settle);
    machine.handle(Event::Timer { kind: TimerKind::Settle, generation: gen });
    assert!(machine.is_recording());

    let mut next = question();
    next.id = "q-add-2".to_string();
    next.stem = "What is 7 + 6?".to_string();

    let actions = machine.handle(Event::QuestionChanged(next));
    assert!(actions.contains(&Action::AbortRecording));
    assert!(has_speak(&actions));
    assert_eq!(machine.state(), VoiceModeState::ReadingQuestion);

    // The old turn's auto-stop timer is now stale
    let stale = machine.handle(Event::Timer { kind: TimerKind::AutoStop, generation: gen });
    assert!(stale.is_empty());
}

#[test]
fn disabled_machine_ignores_questions_until_enabled() {
    let mut machine = Machine::new(TimingConfig::default(), false);

    let actions = machine.handle(Event::QuestionChanged(question()));
    assert!(actions.is_empty());
    assert_eq!(machine.state(), VoiceModeState::Disabled);

    // Enabling announces the stored question
    let actions = machine.handle(Event::Enable);
    assert!(has_speak(&actions));
    assert_eq!(machine.state(), VoiceModeState::ReadingQuestion);
}
