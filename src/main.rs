use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use viva_voice::voice::command::NavAction;
use viva_voice::voice::{AudioCapture, AudioPlayback, SynthesisClient, Voice};
use viva_voice::{Config, HostEvent, Question, QuestionSet, SessionHandle, VoiceSession};

/// Viva - voice-driven assessment sessions
#[derive(Parser)]
#[command(name = "viva", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a voice assessment from a question set file
    Run {
        /// Path to a question set JSON file
        questions: PathBuf,
    },
    /// List available TTS voices
    Voices,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,viva_voice=info",
        1 => "info,viva_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run { questions } => run_assessment(&questions).await,
        Command::Voices => {
            list_voices();
            Ok(())
        }
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
        Command::TestTts { text } => test_tts(&text).await,
    }
}

/// Run a full voice assessment session
#[allow(clippy::future_not_send)]
async fn run_assessment(path: &std::path::Path) -> anyhow::Result<()> {
    let config = Config::load()?;
    let set = QuestionSet::load(path)?;

    println!("Assessment: {}", set.title);
    println!("Questions: {}\n", set.questions.len());

    let (session, handle, host_rx) = VoiceSession::new(&config)?;

    // The session loop owns the audio devices and must stay on this thread;
    // the question flow only needs the handle and the event stream.
    let flow = tokio::spawn(drive_questions(handle.clone(), host_rx, set.questions));
    session.run().await?;

    let answers = flow.await??;

    println!("\n--- Results ---");
    for (question_id, answer) in &answers {
        match answer {
            Some(option_id) => println!("{question_id}: option {option_id}"),
            None => println!("{question_id}: skipped"),
        }
    }
    Ok(())
}

/// Walk the question list, reacting to voice session events
async fn drive_questions(
    handle: SessionHandle,
    mut host_rx: tokio::sync::mpsc::Receiver<HostEvent>,
    questions: Vec<Question>,
) -> anyhow::Result<Vec<(String, Option<String>)>> {
    handle.enable().await?;
    let mut answers = Vec::new();

    'questions: for question in questions {
        println!("\n{}", question.stem);
        for opt in &question.options {
            println!("  {}. {}", opt.id, opt.text);
        }
        handle.set_question(question.clone()).await?;

        loop {
            let Some(event) = host_rx.recv().await else {
                // Session ended underneath us
                break 'questions;
            };
            match event {
                HostEvent::AnswerSelected { option_id } => {
                    match question.option(&option_id) {
                        Some(opt) => println!("  -> answered: option {} ({})", opt.id, opt.text),
                        None => println!("  -> answered: option {option_id}"),
                    }
                    answers.push((question.id.clone(), Some(option_id)));
                    continue 'questions;
                }
                HostEvent::Transcript { text, matched } => {
                    println!("  heard: \"{text}\"");
                    if let Some(m) = matched {
                        if let Some(value) = &m.value {
                            println!(
                                "  match: option {} = {} ({:.2}, {})",
                                m.option_id, value, m.confidence, m.extraction_method
                            );
                        }
                        if let Some(reasoning) = &m.reasoning {
                            println!("  reasoning: {reasoning}");
                        }
                        if !m.uncertainty_markers.is_empty() {
                            println!("  uncertainty: {}", m.uncertainty_markers.join(", "));
                        }
                        if m.changed_mind {
                            println!("  (changed their mind mid-answer)");
                        }
                    }
                }
                HostEvent::Navigate(NavAction::Next | NavAction::Skip) => {
                    println!("  -> skipped");
                    answers.push((question.id.clone(), None));
                    continue 'questions;
                }
                // The session re-reads the question on its own
                HostEvent::Navigate(NavAction::Repeat) => {}
                HostEvent::HelpRequested => print_voice_help(),
                HostEvent::VoiceDisabled => {
                    println!("\nVoice mode turned off.");
                    break 'questions;
                }
                HostEvent::Status(msg) => println!("  {msg}"),
                HostEvent::Error(msg) => eprintln!("  error: {msg}"),
                HostEvent::AudioLevel(_) => {}
            }
        }
    }

    let _ = handle.shutdown().await;
    Ok(answers)
}

fn print_voice_help() {
    println!("  Say an option letter (\"option B\"), an ordinal (\"the second one\"),");
    println!("  or an answer value. You can also say \"repeat\", \"skip\", \"next\",");
    println!("  or \"turn off voice\".");
}

/// List available TTS voices
fn list_voices() {
    println!("Available voices:\n");
    for voice in Voice::ALL {
        let mut notes = Vec::new();
        if voice == Voice::default() {
            notes.push("default");
        }
        if voice == Voice::recommended_for_learners() {
            notes.push("recommended for learners");
        }
        let suffix = if notes.is_empty() {
            String::new()
        } else {
            format!(" ({})", notes.join(", "))
        };
        println!("  {:8} {}{}", voice.to_string(), voice.description(), suffix);
    }
    println!("\nSelect with VIVA_TTS_VOICE or voice.voice in config.toml.");
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let level = capture.level();

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (level * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] level: {:.4} | [{}]", i + 1, level, meter);
    }

    capture.abort();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If the level stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");
    println!("  4. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test speaker output with a sine wave
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut playback = AudioPlayback::new()?;

    // Generate 2 seconds of 440Hz sine wave at 24kHz sample rate
    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    let mut handle = playback.play_samples(samples)?;
    handle.finished().await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS output via the assessment backend
#[allow(clippy::future_not_send)]
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load()?;
    let synth = SynthesisClient::new(&config.backend_url, config.voice.voice, config.voice.speed);

    println!("Synthesizing speech with voice \"{}\"...", config.voice.voice);
    let mp3_data = synth.synthesize(text).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    // Check MP3 header
    if mp3_data.len() > 3 {
        println!(
            "First 4 bytes: {:02x} {:02x} {:02x} {:02x}",
            mp3_data[0], mp3_data[1], mp3_data[2], mp3_data[3]
        );
    }

    println!("Playing audio...");
    let mut playback = AudioPlayback::new()?;
    let mut handle = playback.play_mp3(&mp3_data)?;
    handle.finished().await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
