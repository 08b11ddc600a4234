// Audio output using cpal
// Ring-buffered bridge between the decode loop and the device callback

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::backend::AudioError;

const RING_BUFFER_SIZE: usize = 48000 * 2 / 4; // ~250ms of stereo audio at 48kHz

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

/// Output stream for the narration. Samples are pushed by the playback
/// thread and drained by the device callback; underruns play silence.
pub struct AudioOutput {
    _stream: Stream,
    producer: Mutex<RingProducer>,
    sample_rate: u32,
    channels: u16,
    clear_flag: Arc<AtomicBool>,
}

impl AudioOutput {
    /// Open the default output device with its preferred configuration.
    /// The caller adapts the decoded audio to this rate/channel layout.
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::Output("no output device available".to_string()))?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::Output(format!("no default output config: {e}")))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        let rb = HeapRb::<f32>::new(RING_BUFFER_SIZE);
        let (producer, consumer) = rb.split();
        let consumer = Arc::new(Mutex::new(consumer));

        let clear_flag = Arc::new(AtomicBool::new(false));
        let clear_flag_clone = Arc::clone(&clear_flag);

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config.into(), consumer, clear_flag_clone)?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config.into(), consumer, clear_flag_clone)?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config.into(), consumer, clear_flag_clone)?
            }
            format => {
                return Err(AudioError::Output(format!(
                    "unsupported sample format: {format:?}"
                )))
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::Output(format!("failed to start stream: {e}")))?;

        Ok(Self {
            _stream: stream,
            producer: Mutex::new(producer),
            sample_rate,
            channels,
            clear_flag,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        consumer: Arc<Mutex<RingConsumer>>,
        clear_flag: Arc<AtomicBool>,
    ) -> Result<Stream, AudioError> {
        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut consumer = consumer.lock();

                    // A seek invalidates whatever is still queued.
                    if clear_flag.swap(false, Ordering::SeqCst) {
                        while consumer.try_pop().is_some() {}
                    }

                    for sample in data.iter_mut() {
                        let value = consumer.try_pop().unwrap_or(0.0);
                        *sample = T::from_sample(value);
                    }
                },
                move |err| {
                    eprintln!("[Engine] audio output error: {err}");
                },
                None,
            )
            .map_err(|e| AudioError::Output(format!("failed to build output stream: {e}")))?;

        Ok(stream)
    }

    /// Write as many samples as currently fit; returns how many were taken.
    pub fn write(&self, samples: &[f32]) -> usize {
        let mut producer = self.producer.lock();
        let mut written = 0;

        for &sample in samples {
            if producer.try_push(sample).is_ok() {
                written += 1;
            } else {
                break;
            }
        }

        written
    }

    /// Number of samples queued but not yet played.
    pub fn pending_samples(&self) -> usize {
        self.producer.lock().occupied_len()
    }

    /// Drop everything queued; takes effect in the next device callback.
    pub fn clear(&self) {
        self.clear_flag.store(true, Ordering::SeqCst);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}
