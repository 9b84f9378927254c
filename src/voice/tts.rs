//! Text-to-speech synthesis client
//!
//! Requests MP3 audio from the assessment backend's synthesis endpoint.
//! Playback itself is handled by [`super::AudioPlayback`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Named TTS voices offered by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl Voice {
    /// All voices, in catalogue order
    pub const ALL: [Self; 6] = [
        Self::Alloy,
        Self::Echo,
        Self::Fable,
        Self::Onyx,
        Self::Nova,
        Self::Shimmer,
    ];

    /// Short human description of the voice
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Alloy => "Neutral, balanced voice",
            Self::Echo => "Male, calm voice",
            Self::Fable => "Expressive, storytelling voice",
            Self::Onyx => "Deep, authoritative voice",
            Self::Nova => "Female, friendly voice",
            Self::Shimmer => "Warm, engaging voice",
        }
    }

    /// Voice recommended for young learners
    #[must_use]
    pub const fn recommended_for_learners() -> Self {
        Self::Nova
    }

    /// Wire name of the voice
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Echo => "echo",
            Self::Fable => "fable",
            Self::Onyx => "onyx",
            Self::Nova => "nova",
            Self::Shimmer => "shimmer",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "alloy" => Ok(Self::Alloy),
            "echo" => Ok(Self::Echo),
            "fable" => Ok(Self::Fable),
            "onyx" => Ok(Self::Onyx),
            "nova" => Ok(Self::Nova),
            "shimmer" => Ok(Self::Shimmer),
            other => Err(Error::Config(format!("unknown TTS voice: {other}"))),
        }
    }
}

/// Requests synthesized speech from the backend
pub struct SynthesisClient {
    client: reqwest::Client,
    endpoint: String,
    voice: Voice,
    speed: f64,
}

impl SynthesisClient {
    /// Create a new synthesis client
    ///
    /// Speed is clamped to the backend's accepted range of 0.25 to 4.0.
    #[must_use]
    pub fn new(base_url: &str, voice: Voice, speed: f64) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{base_url}/api/v1/audio/synthesize"),
            voice,
            speed: speed.clamp(0.25, 4.0),
        }
    }

    /// Synthesize text to speech
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Synthesis`] on network failure or non-2xx response
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct SynthesizeRequest<'a> {
            text: &'a str,
            voice: &'a str,
            speed: f64,
        }

        let request = SynthesizeRequest {
            text,
            voice: self.voice.as_str(),
            speed: self.speed,
        };

        tracing::debug!(chars = text.len(), voice = %self.voice, "requesting synthesis");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("synthesis error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;
        tracing::debug!(bytes = audio.len(), "synthesis complete");
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_parse_roundtrip() {
        for voice in Voice::ALL {
            let parsed: Voice = voice.as_str().parse().unwrap();
            assert_eq!(parsed, voice);
        }
        assert!("robot".parse::<Voice>().is_err());
    }

    #[test]
    fn voice_parse_case_insensitive() {
        assert_eq!("NOVA".parse::<Voice>().unwrap(), Voice::Nova);
    }

    #[test]
    fn speed_is_clamped() {
        let client = SynthesisClient::new("http://localhost:8000", Voice::Alloy, 9.0);
        assert!((client.speed - 4.0).abs() < f64::EPSILON);
    }
}
