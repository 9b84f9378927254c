//! Audio playback to speakers
//!
//! Playback runs on a dedicated thread (cpal streams are not Send) and is
//! controlled through a [`PlaybackHandle`]: completion is awaited over a
//! oneshot, progress and duration are readable at any time, and a stop flag
//! halts output immediately. At most one playback is active; starting a new
//! one stops the previous one first.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use tokio::sync::oneshot;

use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Shared playback position bookkeeping
struct Progress {
    position: AtomicUsize,
    total: usize,
}

/// Control and completion handle for one playback
pub struct PlaybackHandle {
    stop: Arc<AtomicBool>,
    progress: Arc<Progress>,
    done: oneshot::Receiver<Result<()>>,
}

impl PlaybackHandle {
    /// Playback progress, 0–100
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self) -> f32 {
        if self.progress.total == 0 {
            return 100.0;
        }
        let pos = self.progress.position.load(Ordering::Relaxed);
        (pos as f32 / self.progress.total as f32 * 100.0).min(100.0)
    }

    /// Total duration of the loaded audio in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f32 {
        self.progress.total as f32 / PLAYBACK_SAMPLE_RATE as f32
    }

    /// Halt playback immediately; safe to call more than once
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Wait for playback to finish naturally or be stopped
    ///
    /// # Errors
    ///
    /// Returns the playback thread's error, if any
    pub async fn finished(&mut self) -> Result<()> {
        match (&mut self.done).await {
            Ok(res) => res,
            Err(_) => Err(Error::Audio("playback thread exited".to_string())),
        }
    }
}

/// Plays MP3 audio to the default output device
pub struct AudioPlayback {
    /// Stop flag of the currently active playback, if any
    active_stop: Option<Arc<AtomicBool>>,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns [`Error::PlaybackBlocked`] if no output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::PlaybackBlocked("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            "audio playback initialized"
        );

        Ok(Self { active_stop: None })
    }

    /// Start playing MP3 bytes, replacing any active playback
    ///
    /// # Errors
    ///
    /// Returns error if the MP3 cannot be decoded
    pub fn play_mp3(&mut self, mp3_data: &[u8]) -> Result<PlaybackHandle> {
        let samples = decode_mp3(mp3_data)?;
        self.play_samples(samples)
    }

    /// Start playing raw f32 samples, replacing any active playback
    ///
    /// # Errors
    ///
    /// Returns error if the samples cannot be queued
    pub fn play_samples(&mut self, samples: Vec<f32>) -> Result<PlaybackHandle> {
        // Exclusive replacement: no overlapping audio
        self.stop();

        let stop = Arc::new(AtomicBool::new(false));
        let progress = Arc::new(Progress {
            position: AtomicUsize::new(0),
            total: samples.len(),
        });
        let (done_tx, done_rx) = oneshot::channel();

        let thread_stop = Arc::clone(&stop);
        let thread_progress = Arc::clone(&progress);
        std::thread::spawn(move || {
            let result = run_playback(&samples, &thread_stop, &thread_progress);
            if let Err(e) = &result {
                tracing::warn!(error = %e, "playback failed");
            }
            let _ = done_tx.send(result);
        });

        self.active_stop = Some(Arc::clone(&stop));
        Ok(PlaybackHandle { stop, progress, done: done_rx })
    }

    /// Stop any active playback; safe to call when idle
    pub fn stop(&mut self) {
        if let Some(stop) = self.active_stop.take() {
            stop.store(true, Ordering::Relaxed);
        }
    }
}

/// Open the output stream and drive samples through it until done or stopped
fn run_playback(samples: &[f32], stop: &Arc<AtomicBool>, progress: &Arc<Progress>) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::PlaybackBlocked("no output device".to_string()))?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::PlaybackBlocked(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        })
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
        })
        .ok_or_else(|| Error::PlaybackBlocked("no suitable output config found".to_string()))?;

    let config = supported_config
        .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
        .config();
    let channels = config.channels as usize;

    let buffer = Arc::new(Mutex::new(samples.to_vec()));
    let finished = Arc::new(AtomicBool::new(false));
    let finished_cb = Arc::clone(&finished);
    let buffer_cb = Arc::clone(&buffer);
    let progress_cb = Arc::clone(progress);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let samples = buffer_cb.lock().unwrap();
                let mut pos = progress_cb.position.load(Ordering::Relaxed);

                for frame in data.chunks_mut(channels) {
                    let sample = if pos < samples.len() {
                        samples[pos]
                    } else {
                        finished_cb.store(true, Ordering::Relaxed);
                        0.0
                    };

                    for out in frame.iter_mut() {
                        *out = sample;
                    }

                    if pos < samples.len() {
                        pos += 1;
                    }
                }

                progress_cb.position.store(pos, Ordering::Relaxed);
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::PlaybackBlocked(e.to_string()))?;

    stream.play().map_err(|e| Error::PlaybackBlocked(e.to_string()))?;

    let sample_count = samples.len();
    let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);

    // Poll for completion or a stop request, with a safety timeout
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(duration_ms + 500);

    while !finished.load(Ordering::Relaxed) && !stop.load(Ordering::Relaxed) {
        if start.elapsed() > timeout {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    if !stop.load(Ordering::Relaxed) {
        // Small delay to let the device drain
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    drop(stream);
    tracing::debug!(
        samples = sample_count,
        stopped = stop.load(Ordering::Relaxed),
        "playback complete"
    );

    Ok(())
}

/// Decode MP3 bytes to f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                // Convert i16 samples to f32 and handle stereo to mono
                let frame_samples: Vec<f32> = if frame.channels == 2 {
                    // Stereo: average channels
                    frame
                        .data
                        .chunks(2)
                        .map(|chunk| {
                            let left = f32::from(chunk[0]) / 32768.0;
                            let right =
                                f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                            (left + right) / 2.0
                        })
                        .collect()
                } else {
                    // Mono
                    frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect()
                };

                samples.extend(frame_samples);
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
