// Audio decoder using Symphonia
// Turns a fetched narration file into interleaved f32 PCM

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use super::backend::AudioError;

/// Streaming decoder over one in-memory narration file. The whole file is
/// already fetched; decoding still happens packet by packet so the
/// playback thread stays responsive to transport commands.
pub struct NarrationDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    sample_buf: Option<SampleBuffer<f32>>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    duration_ms: u64,
}

impl NarrationDecoder {
    /// Probe and open the container held in `data`. `extension_hint` is
    /// the lowercase file extension from the URL, when there was one.
    pub fn open(data: Vec<u8>, extension_hint: Option<&str>) -> Result<Self, AudioError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension_hint {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioError::Decode(format!("unrecognized container: {e}")))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::Decode("no audio track found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

        let duration_ms = match (track.codec_params.time_base, track.codec_params.n_frames) {
            (Some(tb), Some(frames)) => {
                let time = tb.calc_time(frames);
                time.seconds * 1_000 + (time.frac * 1_000.0) as u64
            }
            _ => 0,
        };

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::Decode(format!("no decoder for codec: {e}")))?;

        Ok(Self {
            format,
            decoder,
            sample_buf: None,
            track_id,
            sample_rate,
            channels,
            duration_ms,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Total duration in milliseconds, 0 when the container does not
    /// report a frame count.
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Decode the next packet into interleaved f32 samples. Returns `None`
    /// at end of stream; packets with decode errors are skipped.
    pub fn decode_next(&mut self) -> Result<Option<Vec<f32>>, AudioError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(AudioError::Decode(format!("failed to read packet: {e}"))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let needed = decoded.capacity() * self.channels;
                    if self
                        .sample_buf
                        .as_ref()
                        .map_or(true, |buf| buf.capacity() < needed)
                    {
                        self.sample_buf =
                            Some(SampleBuffer::new(decoded.capacity() as u64, *decoded.spec()));
                    }
                    let buf = self
                        .sample_buf
                        .as_mut()
                        .ok_or_else(|| AudioError::Decode("sample buffer missing".to_string()))?;
                    buf.copy_interleaved_ref(decoded);
                    return Ok(Some(buf.samples().to_vec()));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    eprintln!("[Engine] decode error (skipping packet): {e}");
                    continue;
                }
                Err(e) => return Err(AudioError::Decode(format!("decode failed: {e}"))),
            }
        }
    }

    /// Seek to a position in milliseconds, returning the position actually
    /// reached (coarse seeks land on packet boundaries).
    pub fn seek(&mut self, position_ms: u64) -> Result<u64, AudioError> {
        let seconds = position_ms as f64 / 1000.0;
        let time = Time::new(seconds as u64, seconds.fract());

        let seeked_to = self
            .format
            .seek(
                SeekMode::Coarse,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| AudioError::Decode(format!("seek failed: {e}")))?;

        self.decoder.reset();
        // A fresh sample buffer avoids replaying stale frames after the jump.
        self.sample_buf = None;

        Ok((seeked_to.actual_ts as f64 / self.sample_rate as f64 * 1000.0) as u64)
    }
}
