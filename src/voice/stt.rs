//! Speech-to-text transcription client
//!
//! Uploads recorded audio plus question context to the assessment backend.
//! Answer matching against the question's options happens server-side; this
//! client only relays the structured result.

use serde::{Deserialize, Serialize};

use crate::assessment::Question;
use crate::{Error, Result};

/// Server-side best-guess mapping of a transcript to a question option
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedOption {
    /// Matched option id, e.g. "B"
    pub option_id: String,
    /// Matched option value, if the server resolved one
    pub value: Option<String>,
    /// Match confidence in [0, 1]
    pub confidence: f32,
    /// How the match was produced ("ai_gpt4_mini", "regex_fallback", ...)
    pub extraction_method: String,
    /// The learner's reasoning, when the extractor captured it
    pub reasoning: Option<String>,
    /// Hedging phrases the extractor noticed ("maybe", "I think", ...)
    pub uncertainty_markers: Vec<String>,
    /// Whether the learner audibly changed their mind mid-utterance
    pub changed_mind: bool,
}

/// Result of one transcription round-trip
#[derive(Debug, Clone)]
pub struct Transcription {
    /// Raw transcript text
    pub transcript: String,
    /// Optional server-side answer match
    pub matched: Option<MatchedOption>,
}

/// Wire shape of the backend's transcription response
#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    success: bool,
    #[serde(default)]
    transcription: String,
    #[serde(default)]
    matched_option_id: Option<String>,
    #[serde(default)]
    matched_value: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    extraction_method: Option<String>,
    #[serde(default)]
    student_reasoning: Option<String>,
    #[serde(default)]
    uncertainty_markers: Option<Vec<String>>,
    #[serde(default)]
    changed_mind: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

/// Wire shape of one option in the `match_options` form field
#[derive(Serialize)]
struct MatchOption<'a> {
    option_id: &'a str,
    value: &'a str,
}

/// Transcribes recorded answers via the assessment backend
pub struct TranscriptionClient {
    client: reqwest::Client,
    endpoint: String,
    language: String,
}

impl TranscriptionClient {
    /// Create a new transcription client
    #[must_use]
    pub fn new(base_url: &str, language: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{base_url}/api/v1/audio/transcribe"),
            language: language.to_string(),
        }
    }

    /// Upload a WAV recording together with the current question's option
    /// set and stem, and return the transcript plus any server-side match
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transcription`] on network failure, non-2xx status,
    /// or a response marked unsuccessful
    pub async fn transcribe(&self, audio_wav: Vec<u8>, question: &Question) -> Result<Transcription> {
        tracing::debug!(
            audio_bytes = audio_wav.len(),
            question = %question.id,
            "starting transcription"
        );

        let match_options: Vec<MatchOption<'_>> = question
            .options
            .iter()
            .map(|o| MatchOption { option_id: &o.id, value: &o.text })
            .collect();

        let form = reqwest::multipart::Form::new()
            .part(
                "audio_file",
                reqwest::multipart::Part::bytes(audio_wav)
                    .file_name("answer.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Transcription(e.to_string()))?,
            )
            .text("language", self.language.clone())
            .text("match_options", serde_json::to_string(&match_options)?)
            .text("question_stem", question.stem.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                Error::Transcription(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(Error::Transcription(format!(
                "transcription error {status}: {body}"
            )));
        }

        let result: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(e.to_string()))?;

        if !result.success {
            return Err(Error::Transcription(
                result.error.unwrap_or_else(|| "unspecified server error".to_string()),
            ));
        }

        let matched = result.matched_option_id.map(|option_id| MatchedOption {
            option_id,
            value: result.matched_value,
            confidence: result.confidence.unwrap_or(0.0),
            extraction_method: result
                .extraction_method
                .unwrap_or_else(|| "none".to_string()),
            reasoning: result.student_reasoning,
            uncertainty_markers: result.uncertainty_markers.unwrap_or_default(),
            changed_mind: result.changed_mind.unwrap_or(false),
        });

        tracing::info!(
            transcript = %result.transcription,
            matched = matched.as_ref().map(|m| m.option_id.as_str()),
            "transcription complete"
        );

        Ok(Transcription { transcript: result.transcription, matched })
    }
}
