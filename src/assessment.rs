//! Assessment question data model
//!
//! Questions are read-only inputs to the voice core: the session host owns
//! advancement and replaces the current question wholesale.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A single answer option within a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    /// Option identifier, e.g. "A"
    pub id: String,
    /// Display/answer text, e.g. "20"
    pub text: String,
}

/// A diagnostic question presented to the learner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Stable question identifier
    pub id: String,
    /// Question stem read aloud to the learner
    pub stem: String,
    /// Optional context preceding the stem (scenario, diagram description)
    #[serde(default)]
    pub context: Option<String>,
    /// Ordered answer options
    pub options: Vec<QuestionOption>,
}

impl Question {
    /// Text read aloud when announcing this question: context (if any),
    /// stem, then each option as "Option A: ...".
    #[must_use]
    pub fn spoken_text(&self) -> String {
        let mut parts = Vec::with_capacity(self.options.len() + 2);
        if let Some(ctx) = &self.context {
            parts.push(ctx.clone());
        }
        parts.push(self.stem.clone());
        for opt in &self.options {
            parts.push(format!("Option {}: {}.", opt.id, opt.text));
        }
        parts.join(" ")
    }

    /// Look up an option by id, case-insensitively
    #[must_use]
    pub fn option(&self, id: &str) -> Option<&QuestionOption> {
        self.options.iter().find(|o| o.id.eq_ignore_ascii_case(id))
    }
}

/// An ordered set of questions forming one assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSet {
    /// Assessment title, shown at session start
    pub title: String,
    /// Questions in presentation order
    pub questions: Vec<Question>,
}

impl QuestionSet {
    /// Load a question set from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or contains
    /// no questions.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let set: Self = serde_json::from_str(&data)?;

        if set.questions.is_empty() {
            return Err(Error::QuestionSet("question set is empty".to_string()));
        }
        for q in &set.questions {
            if q.options.is_empty() {
                return Err(Error::QuestionSet(format!(
                    "question {} has no options",
                    q.id
                )));
            }
        }

        tracing::debug!(
            title = %set.title,
            questions = set.questions.len(),
            "loaded question set"
        );
        Ok(set)
    }
}
