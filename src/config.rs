//! Configuration management for the viva voice client
//!
//! Supports `~/.config/viva/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of
//! defaults, and environment variables override the file (env > toml >
//! default).

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::voice::Voice;
use crate::Result;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the assessment backend (synthesis/transcription)
    pub backend_url: String,

    /// Transcription language hint ("en", "af", ...)
    pub language: String,

    /// Voice output configuration
    pub voice: VoiceConfig,

    /// State machine timing knobs
    pub timing: TimingConfig,
}

/// Voice output configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// TTS voice identity
    pub voice: Voice,

    /// TTS speed multiplier (0.25 to 4.0)
    pub speed: f64,

    /// Enable voice mode as soon as the session starts
    pub auto_enable: bool,
}

/// Timing and quality-filter knobs for the orchestrator
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Delay between TTS finishing and the microphone reopening, so the
    /// tail of the device's own speech is not captured
    pub settle_delay: Duration,

    /// Maximum time the microphone stays open per listening turn
    pub auto_stop: Duration,

    /// How long to wait for a spoken confirmation before auto-cancelling
    pub confirm_timeout: Duration,

    /// Pause before re-listening after a rejected or unrecognized transcript
    pub cooldown: Duration,

    /// Transcripts shorter than this (in characters) are discarded
    pub min_transcript_chars: usize,

    /// Transcripts exactly matching one of these phrases are discarded;
    /// these are known artifacts of the device hearing its own TTS output
    pub blocklist: Vec<String>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(600),
            auto_stop: Duration::from_secs(5),
            confirm_timeout: Duration::from_secs(6),
            cooldown: Duration::from_millis(800),
            min_transcript_chars: 2,
            blocklist: default_blocklist(),
        }
    }
}

/// Phrases Whisper commonly hallucinates from TTS bleed or silence
fn default_blocklist() -> Vec<String> {
    ["thank you", "thanks for watching", "you", "bye"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    backend_url: Option<String>,

    #[serde(default)]
    language: Option<String>,

    #[serde(default)]
    voice: VoiceFileConfig,

    #[serde(default)]
    timing: TimingFileConfig,
}

#[derive(Debug, Default, Deserialize)]
struct VoiceFileConfig {
    voice: Option<String>,
    speed: Option<f64>,
    auto_enable: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct TimingFileConfig {
    settle_delay_ms: Option<u64>,
    auto_stop_ms: Option<u64>,
    confirm_timeout_ms: Option<u64>,
    cooldown_ms: Option<u64>,
    min_transcript_chars: Option<usize>,
    blocklist: Option<Vec<String>>,
}

/// Default config file path (`~/.config/viva/config.toml`)
fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "viva", "viva")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load the optional config file; missing or unreadable files yield defaults
fn load_config_file() -> ConfigFile {
    let Some(path) = config_file_path() else {
        return ConfigFile::default();
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(fc) => {
                tracing::debug!(path = %path.display(), "loaded config file");
                fc
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
                ConfigFile::default()
            }
        },
        Err(_) => ConfigFile::default(),
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if the configured TTS voice name or speed is invalid
    pub fn load() -> Result<Self> {
        let fc = load_config_file();

        let backend_url = std::env::var("VIVA_BACKEND_URL")
            .ok()
            .or(fc.backend_url)
            .unwrap_or_else(|| "http://localhost:8000".to_string());
        // Trailing slashes would double up when joining endpoint paths
        let backend_url = backend_url.trim_end_matches('/').to_string();

        let language = std::env::var("VIVA_LANGUAGE")
            .ok()
            .or(fc.language)
            .unwrap_or_else(|| "en".to_string());

        let voice_name = std::env::var("VIVA_TTS_VOICE")
            .ok()
            .or(fc.voice.voice)
            .unwrap_or_else(|| Voice::default().to_string());
        let voice: Voice = voice_name.parse()?;

        let speed = std::env::var("VIVA_TTS_SPEED")
            .ok()
            .and_then(|s| s.parse().ok())
            .or(fc.voice.speed)
            .unwrap_or(1.0);

        let timing_defaults = TimingConfig::default();
        let timing = TimingConfig {
            settle_delay: fc
                .timing
                .settle_delay_ms
                .map_or(timing_defaults.settle_delay, Duration::from_millis),
            auto_stop: fc
                .timing
                .auto_stop_ms
                .map_or(timing_defaults.auto_stop, Duration::from_millis),
            confirm_timeout: fc
                .timing
                .confirm_timeout_ms
                .map_or(timing_defaults.confirm_timeout, Duration::from_millis),
            cooldown: fc
                .timing
                .cooldown_ms
                .map_or(timing_defaults.cooldown, Duration::from_millis),
            min_transcript_chars: fc
                .timing
                .min_transcript_chars
                .unwrap_or(timing_defaults.min_transcript_chars),
            blocklist: fc.timing.blocklist.unwrap_or(timing_defaults.blocklist),
        };

        Ok(Self {
            backend_url,
            language,
            voice: VoiceConfig {
                voice,
                speed: speed.clamp(0.25, 4.0),
                auto_enable: fc.voice.auto_enable.unwrap_or(true),
            },
            timing,
        })
    }
}
