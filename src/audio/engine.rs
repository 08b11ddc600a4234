// Production media backend
// Fetches a narration file over HTTPS, decodes it with Symphonia and
// plays it through cpal on a dedicated playback thread.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tokio::sync::{mpsc as tokio_mpsc, oneshot};

use super::backend::{AcquiredMedia, AudioError, MediaBackend, MediaHandle, PlaybackEvent};
use super::decoder::NarrationDecoder;
use super::output::AudioOutput;

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

/// How often the playback thread reports progress while playing.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Idle wait between command polls while paused.
const PAUSE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug)]
enum EngineCommand {
    Play,
    Pause,
    Seek(u64),
    Release,
}

pub struct EngineBackend;

impl EngineBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EngineBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaBackend for EngineBackend {
    async fn acquire(&self, url: &str) -> Result<AcquiredMedia, AudioError> {
        let response = HTTP_CLIENT
            .get(url)
            .send()
            .await
            .map_err(|e| AudioError::Fetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AudioError::Fetch(format!(
                "server answered {} for {url}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AudioError::Fetch(e.to_string()))?
            .to_vec();

        let hint = extension_hint(url);
        let decoder = tokio::task::spawn_blocking(move || {
            NarrationDecoder::open(bytes, hint.as_deref())
        })
        .await
        .map_err(|e| AudioError::Decode(format!("decoder task failed: {e}")))??;

        let duration_ms = decoder.duration_ms();

        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = tokio_mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("narration-playback".to_string())
            .spawn(move || playback_thread(decoder, cmd_rx, event_tx, ready_tx))
            .map_err(|e| AudioError::Output(format!("failed to spawn playback thread: {e}")))?;

        // The output device is opened on the playback thread (the stream
        // is not Send); acquisition fails if that does not come up.
        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(AudioError::Output("playback thread died".to_string())),
        }

        Ok(AcquiredMedia {
            handle: Box::new(EngineHandle {
                commands: cmd_tx,
                released: false,
            }),
            events: event_rx,
            duration_ms,
        })
    }
}

struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    released: bool,
}

impl MediaHandle for EngineHandle {
    fn play(&mut self) {
        let _ = self.commands.send(EngineCommand::Play);
    }

    fn pause(&mut self) {
        let _ = self.commands.send(EngineCommand::Pause);
    }

    fn seek_to(&mut self, position_ms: u64) {
        let _ = self.commands.send(EngineCommand::Seek(position_ms));
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            let _ = self.commands.send(EngineCommand::Release);
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.release();
    }
}

fn extension_hint(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 4 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

struct PlaybackProgress {
    /// Position the last seek landed on.
    origin_ms: u64,
    /// Source frames decoded since that seek.
    frames_since_origin: u64,
    source_rate: u32,
    duration_ms: u64,
}

impl PlaybackProgress {
    fn position_ms(&self) -> u64 {
        let elapsed = self.frames_since_origin * 1_000 / self.source_rate.max(1) as u64;
        let position = self.origin_ms + elapsed;
        if self.duration_ms > 0 {
            position.min(self.duration_ms)
        } else {
            position
        }
    }
}

/// Decode/output loop. Owns the decoder and the device stream; reacts to
/// transport commands and reports progress until released.
fn playback_thread(
    mut decoder: NarrationDecoder,
    commands: mpsc::Receiver<EngineCommand>,
    events: tokio_mpsc::UnboundedSender<PlaybackEvent>,
    ready: oneshot::Sender<Result<(), AudioError>>,
) {
    let output = match AudioOutput::new() {
        Ok(output) => output,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let source_rate = decoder.sample_rate();
    let source_channels = decoder.channels();
    let output_rate = output.sample_rate();
    let output_channels = output.channels() as usize;

    let mut resampler = (source_rate != output_rate)
        .then(|| LinearResampler::new(source_rate, output_rate, source_channels));

    let mut progress = PlaybackProgress {
        origin_ms: 0,
        frames_since_origin: 0,
        source_rate,
        duration_ms: decoder.duration_ms(),
    };

    let mut playing = false;
    let mut decoding_done = false;
    let mut finish_sent = false;
    let mut backlog: Vec<f32> = Vec::new();
    let mut last_report = Instant::now();

    let emit = |progress: &PlaybackProgress, playing: bool, did_finish: bool| {
        let _ = events.send(PlaybackEvent {
            position_ms: if did_finish {
                progress.duration_ms.max(progress.position_ms())
            } else {
                progress.position_ms()
            },
            duration_ms: progress.duration_ms,
            is_playing: playing,
            did_finish,
        });
    };

    'main: loop {
        // Apply everything queued before touching the decoder again.
        loop {
            let command = if playing {
                match commands.try_recv() {
                    Ok(cmd) => Some(cmd),
                    Err(mpsc::TryRecvError::Empty) => None,
                    Err(mpsc::TryRecvError::Disconnected) => break 'main,
                }
            } else {
                match commands.recv_timeout(PAUSE_POLL) {
                    Ok(cmd) => Some(cmd),
                    Err(mpsc::RecvTimeoutError::Timeout) => None,
                    Err(mpsc::RecvTimeoutError::Disconnected) => break 'main,
                }
            };
            let Some(command) = command else { break };

            match command {
                EngineCommand::Play => {
                    playing = true;
                    emit(&progress, true, false);
                }
                EngineCommand::Pause => {
                    playing = false;
                    emit(&progress, false, false);
                }
                EngineCommand::Seek(position_ms) => match decoder.seek(position_ms) {
                    Ok(actual_ms) => {
                        output.clear();
                        backlog.clear();
                        if let Some(resampler) = resampler.as_mut() {
                            resampler.reset();
                        }
                        progress.origin_ms = actual_ms;
                        progress.frames_since_origin = 0;
                        decoding_done = false;
                        finish_sent = false;
                        emit(&progress, playing, false);
                    }
                    Err(err) => {
                        eprintln!("[Engine] seek failed: {err}");
                    }
                },
                EngineCommand::Release => break 'main,
            }
        }

        if !playing {
            continue;
        }

        if backlog.is_empty() && !decoding_done {
            match decoder.decode_next() {
                Ok(Some(samples)) => {
                    progress.frames_since_origin +=
                        (samples.len() / source_channels.max(1)) as u64;
                    let resampled = match resampler.as_mut() {
                        Some(resampler) => resampler.process(&samples),
                        None => samples,
                    };
                    backlog = adapt_channels(&resampled, source_channels, output_channels);
                }
                Ok(None) => {
                    decoding_done = true;
                }
                Err(err) => {
                    eprintln!("[Engine] decoding aborted: {err}");
                    decoding_done = true;
                }
            }
        }

        if !backlog.is_empty() {
            let written = output.write(&backlog);
            if written > 0 {
                backlog.drain(..written);
            } else {
                // Device buffer full; give the callback time to drain.
                std::thread::sleep(Duration::from_millis(5));
            }
        } else if decoding_done {
            if output.pending_samples() == 0 {
                if !finish_sent {
                    finish_sent = true;
                    playing = false;
                    emit(&progress, false, true);
                }
            } else {
                std::thread::sleep(Duration::from_millis(10));
            }
        }

        if last_report.elapsed() >= PROGRESS_INTERVAL {
            last_report = Instant::now();
            if !finish_sent {
                emit(&progress, playing, false);
            }
        }
    }
}

/// Map interleaved samples between channel layouts: duplicate mono out,
/// average extra source channels down.
fn adapt_channels(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 {
        return samples.to_vec();
    }
    let frames = samples.len() / from;
    let mut adapted = Vec::with_capacity(frames * to);
    for frame in samples.chunks_exact(from) {
        if from == 1 {
            adapted.extend(std::iter::repeat(frame[0]).take(to));
        } else {
            let mixed: f32 = frame.iter().sum::<f32>() / from as f32;
            for channel in 0..to {
                adapted.push(*frame.get(channel).unwrap_or(&mixed));
            }
        }
    }
    adapted
}

/// Linear-interpolation resampler for interleaved audio. Keeps the
/// fractional read position across chunks so streamed audio stays
/// click-free at chunk boundaries.
struct LinearResampler {
    channels: usize,
    step: f64,
    fractional_pos: f64,
    last_frame: Vec<f32>,
    primed: bool,
}

impl LinearResampler {
    fn new(from_rate: u32, to_rate: u32, channels: usize) -> Self {
        Self {
            channels: channels.max(1),
            step: from_rate as f64 / to_rate.max(1) as f64,
            fractional_pos: 0.0,
            last_frame: vec![0.0; channels.max(1)],
            primed: false,
        }
    }

    fn reset(&mut self) {
        self.fractional_pos = 0.0;
        self.last_frame.fill(0.0);
        self.primed = false;
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let ch = self.channels;
        let frames = input.len() / ch;
        if frames == 0 {
            return Vec::new();
        }

        let mut out = Vec::with_capacity((frames as f64 / self.step) as usize * ch + ch);
        // Position -1.0 is the carried-over frame from the previous chunk.
        let mut pos = if self.primed {
            self.fractional_pos - 1.0
        } else {
            self.fractional_pos
        };

        while pos < (frames - 1) as f64 {
            if pos < 0.0 {
                let t = (pos + 1.0) as f32;
                for c in 0..ch {
                    let next = input[c];
                    let prev = self.last_frame[c];
                    out.push(prev + (next - prev) * t);
                }
            } else {
                let base = pos.floor() as usize;
                let t = (pos - base as f64) as f32;
                for c in 0..ch {
                    let prev = input[base * ch + c];
                    let next = input[(base + 1) * ch + c];
                    out.push(prev + (next - prev) * t);
                }
            }
            pos += self.step;
        }

        self.fractional_pos = pos - (frames - 1) as f64;
        self.last_frame
            .copy_from_slice(&input[(frames - 1) * ch..frames * ch]);
        self.primed = true;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_hint_from_upload_path() {
        assert_eq!(
            extension_hint("https://x.test/api/uploads/audio/en-1.mp3").as_deref(),
            Some("mp3")
        );
        assert_eq!(
            extension_hint("https://x.test/a/en-1.OGG?token=abc").as_deref(),
            Some("ogg")
        );
        assert_eq!(extension_hint("https://x.test/no-extension"), None);
    }

    #[test]
    fn test_adapt_channels_mono_to_stereo() {
        let out = adapt_channels(&[0.5, -0.5], 1, 2);
        assert_eq!(out, vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    fn test_adapt_channels_passthrough() {
        let samples = [0.1, 0.2, 0.3, 0.4];
        assert_eq!(adapt_channels(&samples, 2, 2), samples.to_vec());
    }

    #[test]
    fn test_resampler_preserves_constant_signal() {
        let mut resampler = LinearResampler::new(48_000, 44_100, 1);
        let out = resampler.process(&vec![1.0; 4800]);
        assert!(!out.is_empty());
        assert!(out.iter().all(|s| (s - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_resampler_ratio_roughly_holds() {
        let mut resampler = LinearResampler::new(48_000, 24_000, 2);
        let input: Vec<f32> = (0..9600).map(|i| (i as f32).sin()).collect();
        let out = resampler.process(&input);
        let frames_out = out.len() / 2;
        assert!((2380..=2420).contains(&frames_out), "got {frames_out}");
    }

    #[test]
    fn test_progress_clamps_to_duration() {
        let progress = PlaybackProgress {
            origin_ms: 170_000,
            frames_since_origin: 48_000 * 20,
            source_rate: 48_000,
            duration_ms: 182_000,
        };
        assert_eq!(progress.position_ms(), 182_000);
    }
}
