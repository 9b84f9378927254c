//! Voice command parsing
//!
//! Pure, deterministic interpretation of a transcript against the current
//! question's option set. No side effects; the same transcript and options
//! always produce the same command.

use std::sync::OnceLock;

use regex::Regex;

use crate::assessment::QuestionOption;

/// Navigation requests the learner can speak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    /// Read the current question again
    Repeat,
    /// Move to the next question
    Next,
    /// Skip the current question
    Skip,
}

/// Control requests the learner can speak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// Ask for help
    Help,
    /// Turn voice mode off
    DisableVoice,
}

/// A structured command extracted from a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceCommand {
    /// The learner selected an answer option
    AnswerSelection {
        /// Id of the selected option
        option_id: String,
    },
    /// The learner asked to navigate
    Navigation(NavAction),
    /// The learner asked for a control action
    Control(ControlAction),
    /// Nothing recognizable
    Unrecognized,
}

/// How sure the parser is about the extracted command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Exact, unambiguous lexical match
    High,
    /// Partial, hedged, or ambiguous match — confirm before executing
    NeedsClarification,
    /// No recognizable pattern
    Low,
}

/// A parsed command with its confidence tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVoiceCommand {
    pub command: VoiceCommand,
    pub confidence: Confidence,
}

impl ParsedVoiceCommand {
    const fn new(command: VoiceCommand, confidence: Confidence) -> Self {
        Self { command, confidence }
    }
}

/// Hedging phrases that demote an answer match to needs-clarification
const HEDGE_MARKERS: &[&str] = &[
    "maybe",
    "i think",
    "i guess",
    "probably",
    "perhaps",
    "possibly",
    "not sure",
    "could be",
    "might be",
];

/// Ordinal words mapped to option indices
const ORDINALS: &[(&str, usize)] = &[
    ("first", 0),
    ("second", 1),
    ("third", 2),
    ("fourth", 3),
    ("fifth", 4),
    ("sixth", 5),
];

/// Parse a transcript into a structured command
///
/// Recognizes, in priority order: control phrases, navigation phrases, and
/// answer selections by option letter ("option A", "B"), ordinal ("the
/// second one"), or exact option value.
#[must_use]
pub fn parse(transcript: &str, options: &[QuestionOption]) -> ParsedVoiceCommand {
    let text = normalize(transcript);
    if text.is_empty() {
        return ParsedVoiceCommand::new(VoiceCommand::Unrecognized, Confidence::Low);
    }

    if let Some(cmd) = parse_control(&text) {
        return ParsedVoiceCommand::new(VoiceCommand::Control(cmd), Confidence::High);
    }

    if let Some(nav) = parse_navigation(&text) {
        return ParsedVoiceCommand::new(VoiceCommand::Navigation(nav), Confidence::High);
    }

    let candidates = answer_candidates(&text, options);
    match candidates.as_slice() {
        [] => ParsedVoiceCommand::new(VoiceCommand::Unrecognized, Confidence::Low),
        [option_id] => {
            let confidence = if is_hedged(&text) {
                Confidence::NeedsClarification
            } else {
                Confidence::High
            };
            ParsedVoiceCommand::new(
                VoiceCommand::AnswerSelection { option_id: option_id.clone() },
                confidence,
            )
        }
        // Several distinct options mentioned; take the first but confirm
        [option_id, ..] => ParsedVoiceCommand::new(
            VoiceCommand::AnswerSelection { option_id: option_id.clone() },
            Confidence::NeedsClarification,
        ),
    }
}

/// Interpret a transcript as a yes/no confirmation, if it is one
#[must_use]
pub fn parse_confirmation(transcript: &str) -> Option<bool> {
    let text = normalize(transcript);

    const YES: &[&str] = &["yes", "yeah", "yep", "correct", "right", "confirm", "sure"];
    const NO: &[&str] = &["no", "nope", "cancel", "wrong", "incorrect"];

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.iter().any(|w| YES.contains(w)) {
        return Some(true);
    }
    if words.iter().any(|w| NO.contains(w)) {
        return Some(false);
    }
    None
}

/// Lowercase, strip punctuation, collapse whitespace
fn normalize(transcript: &str) -> String {
    transcript
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_control(text: &str) -> Option<ControlAction> {
    const DISABLE_PHRASES: &[&str] = &[
        "turn off voice",
        "voice off",
        "disable voice",
        "stop voice mode",
        "exit voice mode",
    ];

    if DISABLE_PHRASES.iter().any(|p| text.contains(p)) {
        return Some(ControlAction::DisableVoice);
    }
    if has_word(text, "help") {
        return Some(ControlAction::Help);
    }
    None
}

fn parse_navigation(text: &str) -> Option<NavAction> {
    if has_word(text, "repeat") || text.contains("say that again") || text.contains("read it again")
    {
        return Some(NavAction::Repeat);
    }
    if has_word(text, "skip") {
        return Some(NavAction::Skip);
    }
    if has_word(text, "next") {
        return Some(NavAction::Next);
    }
    None
}

/// Distinct option ids referenced by the transcript, in mention order
fn answer_candidates(text: &str, options: &[QuestionOption]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |id: &str| {
        if !found.iter().any(|f| f.eq_ignore_ascii_case(id)) {
            found.push(id.to_string());
        }
    };

    // Letter references: "option a", "letter b", or a bare letter
    for cap in letter_pattern().captures_iter(text) {
        let letter = &cap[1];
        if let Some(opt) = options.iter().find(|o| o.id.eq_ignore_ascii_case(letter)) {
            push(&opt.id);
        }
    }

    // Ordinal references: "the second one"
    for (word, index) in ORDINALS {
        if has_word(text, word) {
            if let Some(opt) = options.get(*index) {
                push(&opt.id);
            }
        }
    }

    // Exact option value spoken aloud
    for opt in options {
        let value = normalize(&opt.text);
        if !value.is_empty() && has_phrase(text, &value) {
            push(&opt.id);
        }
    }

    found
}

fn is_hedged(text: &str) -> bool {
    HEDGE_MARKERS.iter().any(|m| text.contains(m))
}

/// Single-letter option reference pattern, anchored on word boundaries
fn letter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|\s)(?:option\s+|letter\s+)?([a-z])(?:\s|$)").expect("valid regex")
    })
}

/// Whole-word containment
fn has_word(text: &str, word: &str) -> bool {
    text.split_whitespace().any(|w| w == word)
}

/// Whole-word phrase containment
fn has_phrase(text: &str, phrase: &str) -> bool {
    if text == phrase {
        return true;
    }
    text.starts_with(&format!("{phrase} "))
        || text.ends_with(&format!(" {phrase}"))
        || text.contains(&format!(" {phrase} "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<QuestionOption> {
        vec![
            QuestionOption { id: "A".to_string(), text: "4".to_string() },
            QuestionOption { id: "B".to_string(), text: "5".to_string() },
            QuestionOption { id: "C".to_string(), text: "6".to_string() },
        ]
    }

    #[test]
    fn option_letter_is_high_confidence() {
        let parsed = parse("option B", &options());
        assert_eq!(
            parsed.command,
            VoiceCommand::AnswerSelection { option_id: "B".to_string() }
        );
        assert_eq!(parsed.confidence, Confidence::High);
    }

    #[test]
    fn bare_letter_matches() {
        let parsed = parse("B.", &options());
        assert_eq!(
            parsed.command,
            VoiceCommand::AnswerSelection { option_id: "B".to_string() }
        );
    }

    #[test]
    fn ordinal_reference_matches() {
        let parsed = parse("the second one", &options());
        assert_eq!(
            parsed.command,
            VoiceCommand::AnswerSelection { option_id: "B".to_string() }
        );
        assert_eq!(parsed.confidence, Confidence::High);
    }

    #[test]
    fn spoken_value_matches() {
        let parsed = parse("the answer is 5", &options());
        assert_eq!(
            parsed.command,
            VoiceCommand::AnswerSelection { option_id: "B".to_string() }
        );
    }

    #[test]
    fn hedged_answer_needs_clarification() {
        let parsed = parse("maybe B?", &options());
        assert_eq!(
            parsed.command,
            VoiceCommand::AnswerSelection { option_id: "B".to_string() }
        );
        assert_eq!(parsed.confidence, Confidence::NeedsClarification);
    }

    #[test]
    fn multiple_mentions_need_clarification() {
        let parsed = parse("b no wait c", &options());
        assert_eq!(parsed.confidence, Confidence::NeedsClarification);
    }

    #[test]
    fn navigation_words() {
        assert_eq!(
            parse("repeat", &options()).command,
            VoiceCommand::Navigation(NavAction::Repeat)
        );
        assert_eq!(
            parse("skip this one", &options()).command,
            VoiceCommand::Navigation(NavAction::Skip)
        );
        assert_eq!(
            parse("next question please", &options()).command,
            VoiceCommand::Navigation(NavAction::Next)
        );
    }

    #[test]
    fn control_words() {
        assert_eq!(
            parse("help", &options()).command,
            VoiceCommand::Control(ControlAction::Help)
        );
        assert_eq!(
            parse("turn off voice mode", &options()).command,
            VoiceCommand::Control(ControlAction::DisableVoice)
        );
    }

    #[test]
    fn gibberish_is_low_confidence() {
        let parsed = parse("the weather is lovely today", &options());
        assert_eq!(parsed.command, VoiceCommand::Unrecognized);
        assert_eq!(parsed.confidence, Confidence::Low);
    }

    #[test]
    fn confirmation_words() {
        assert_eq!(parse_confirmation("yes"), Some(true));
        assert_eq!(parse_confirmation("Yeah, that's right"), Some(true));
        assert_eq!(parse_confirmation("no, cancel"), Some(false));
        assert_eq!(parse_confirmation("banana"), None);
    }

    #[test]
    fn deterministic() {
        let a = parse("I think it's option C", &options());
        let b = parse("I think it's option C", &options());
        assert_eq!(a, b);
        assert_eq!(a.confidence, Confidence::NeedsClarification);
    }
}
