//! Voice session driver
//!
//! Owns the audio devices and network clients and runs the orchestration
//! machine's event loop: host commands and adapter outcomes go in as events,
//! the resulting actions are executed here. cpal streams are not Send, so a
//! [`VoiceSession`] must be driven on the thread that created it; blocking
//! work (synthesis, transcription, playback) runs on spawned tasks that
//! report back over an internal channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::assessment::Question;
use crate::config::Config;
use crate::voice::capture::AudioCapture;
use crate::voice::orchestrator::{Action, Event, HostEvent, Machine, VoiceModeState};
use crate::voice::playback::AudioPlayback;
use crate::voice::stt::TranscriptionClient;
use crate::voice::tts::SynthesisClient;
use crate::{Error, Result};

/// How often the live microphone level is reported while recording
const LEVEL_REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Commands the host can send into a running session
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Turn voice mode on
    Enable,
    /// Turn voice mode off
    Disable,
    /// Present a question
    SetQuestion(Question),
    /// Disable and end the session loop
    Shutdown,
}

/// Cloneable handle for sending commands into a session
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Turn voice mode on
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if the session loop has ended
    pub async fn enable(&self) -> Result<()> {
        self.send(SessionCommand::Enable).await
    }

    /// Turn voice mode off
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if the session loop has ended
    pub async fn disable(&self) -> Result<()> {
        self.send(SessionCommand::Disable).await
    }

    /// Present a question to the learner
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if the session loop has ended
    pub async fn set_question(&self, question: Question) -> Result<()> {
        self.send(SessionCommand::SetQuestion(question)).await
    }

    /// End the session
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if the session loop has ended
    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown).await
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::Audio("voice session is not running".to_string()))
    }
}

/// Messages flowing back into the session loop from spawned tasks
enum Internal {
    /// An event for the orchestration machine
    Machine(Event),
    /// A synthesis task completed
    Synthesis { gen: u64, result: std::result::Result<Vec<u8>, String> },
    /// A playback finished or failed
    Playback { gen: u64, result: std::result::Result<(), String> },
}

/// A running voice assessment session
pub struct VoiceSession {
    driver: Driver,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
}

impl VoiceSession {
    /// Open the audio devices and build a session plus its control handle
    /// and host event stream
    ///
    /// # Errors
    ///
    /// Returns an error if no input or output audio device is available
    pub fn new(config: &Config) -> Result<(Self, SessionHandle, mpsc::Receiver<HostEvent>)> {
        let capture = AudioCapture::new()?;
        let playback = AudioPlayback::new()?;
        let tts = Arc::new(SynthesisClient::new(
            &config.backend_url,
            config.voice.voice,
            config.voice.speed,
        ));
        let stt = Arc::new(TranscriptionClient::new(&config.backend_url, &config.language));

        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (host_tx, host_rx) = mpsc::channel(64);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let session = Self {
            driver: Driver {
                machine: Machine::new(config.timing.clone(), config.voice.auto_enable),
                capture,
                playback,
                tts,
                stt,
                question: None,
                timers: Vec::new(),
                speak_gen: 0,
                host_tx,
                internal_tx,
            },
            cmd_rx,
            internal_rx,
        };

        Ok((session, SessionHandle { tx: cmd_tx }, host_rx))
    }

    /// Drive the session until the handle is dropped or shut down
    ///
    /// # Errors
    ///
    /// Currently infallible; adapter failures are surfaced as
    /// [`HostEvent::Error`] instead
    pub async fn run(self) -> Result<()> {
        let Self { mut driver, mut cmd_rx, mut internal_rx } = self;
        let mut level_tick = tokio::time::interval(LEVEL_REPORT_INTERVAL);
        level_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Enable) => driver.apply(Event::Enable).await,
                    Some(SessionCommand::Disable) => driver.apply(Event::Disable).await,
                    Some(SessionCommand::SetQuestion(question)) => {
                        driver.question = Some(question.clone());
                        driver.apply(Event::QuestionChanged(question)).await;
                    }
                    Some(SessionCommand::Shutdown) | None => {
                        driver.apply(Event::Disable).await;
                        break;
                    }
                },
                Some(msg) = internal_rx.recv() => driver.on_internal(msg).await,
                _ = level_tick.tick() => driver.report_level().await,
            }
        }

        driver.teardown();
        tracing::debug!("voice session ended");
        Ok(())
    }
}

/// Executes machine actions against the audio and network adapters
struct Driver {
    machine: Machine,
    capture: AudioCapture,
    playback: AudioPlayback,
    tts: Arc<SynthesisClient>,
    stt: Arc<TranscriptionClient>,
    /// Current question, needed as transcription context
    question: Option<Question>,
    /// Outstanding timer tasks
    timers: Vec<JoinHandle<()>>,
    /// Invalidates synthesis/playback results from superseded speech
    speak_gen: u64,
    host_tx: mpsc::Sender<HostEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
}

impl Driver {
    /// Feed one event through the machine and execute the resulting actions
    async fn apply(&mut self, event: Event) {
        let actions = self.machine.handle(event);
        self.dispatch(actions).await;

        // Host effects are delivered synchronously by dispatch, so the
        // machine can settle out of Executing right away
        while self.machine.state() == VoiceModeState::Executing {
            let actions = self.machine.handle(Event::EffectsDelivered);
            self.dispatch(actions).await;
        }
    }

    async fn dispatch(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Speak(text) => self.start_speaking(text),
                Action::StopSpeaking => {
                    self.speak_gen += 1;
                    self.playback.stop();
                }
                Action::StartRecording => {
                    if let Err(e) = self.capture.start() {
                        let _ = self
                            .internal_tx
                            .send(Internal::Machine(Event::RecordingFailed(e.to_string())));
                    }
                }
                Action::FinishRecording { generation } => self.finish_recording(generation),
                Action::AbortRecording => self.capture.abort(),
                Action::StartTimer { kind, generation, duration } => {
                    let tx = self.internal_tx.clone();
                    self.timers.push(tokio::spawn(async move {
                        tokio::time::sleep(duration).await;
                        let _ = tx.send(Internal::Machine(Event::Timer { kind, generation }));
                    }));
                }
                Action::CancelTimers => {
                    for timer in self.timers.drain(..) {
                        timer.abort();
                    }
                }
                Action::Emit(event) => {
                    let _ = self.host_tx.send(event).await;
                }
            }
        }
        self.timers.retain(|t| !t.is_finished());
    }

    async fn on_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Machine(event) => self.apply(event).await,
            Internal::Synthesis { gen, result } => {
                if gen != self.speak_gen {
                    return; // superseded speech
                }
                match result {
                    Ok(audio) => match self.playback.play_mp3(&audio) {
                        Ok(mut handle) => {
                            let tx = self.internal_tx.clone();
                            tokio::spawn(async move {
                                let result =
                                    handle.finished().await.map_err(|e| e.to_string());
                                let _ = tx.send(Internal::Playback { gen, result });
                            });
                        }
                        Err(e) => self.apply(Event::SpeechFailed(e.to_string())).await,
                    },
                    Err(e) => self.apply(Event::SpeechFailed(e)).await,
                }
            }
            Internal::Playback { gen, result } => {
                if gen != self.speak_gen {
                    return;
                }
                match result {
                    Ok(()) => self.apply(Event::SpeechFinished).await,
                    Err(e) => self.apply(Event::SpeechFailed(e)).await,
                }
            }
        }
    }

    /// Kick off synthesis for new speech, superseding any in flight
    fn start_speaking(&mut self, text: String) {
        self.speak_gen += 1;
        let gen = self.speak_gen;
        self.playback.stop();

        let tts = Arc::clone(&self.tts);
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = tts.synthesize(&text).await.map_err(|e| e.to_string());
            let _ = tx.send(Internal::Synthesis { gen, result });
        });
    }

    /// Stop the microphone and hand the recording to a transcription task
    fn finish_recording(&mut self, generation: u64) {
        let tx = self.internal_tx.clone();
        match (self.capture.finish(), self.question.clone()) {
            (Ok(wav), Some(question)) => {
                let stt = Arc::clone(&self.stt);
                tokio::spawn(async move {
                    let event = match stt.transcribe(wav, &question).await {
                        Ok(t) => Event::TranscriptReady {
                            generation,
                            transcript: t.transcript,
                            matched: t.matched,
                        },
                        Err(e) => Event::TranscriptionFailed { generation, reason: e.to_string() },
                    };
                    let _ = tx.send(Internal::Machine(event));
                });
            }
            (Ok(_), None) => {
                let _ = tx.send(Internal::Machine(Event::TranscriptionFailed {
                    generation,
                    reason: "no active question".to_string(),
                }));
            }
            (Err(e), _) => {
                let _ = tx.send(Internal::Machine(Event::TranscriptionFailed {
                    generation,
                    reason: e.to_string(),
                }));
            }
        }
    }

    async fn report_level(&mut self) {
        if self.capture.is_recording() {
            let _ = self
                .host_tx
                .send(HostEvent::AudioLevel(self.capture.level()))
                .await;
        }
    }

    fn teardown(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
        self.capture.abort();
        self.playback.stop();
    }
}
