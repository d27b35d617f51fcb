//! Microphone capture with in-memory WAV encoding.
//!
//! The cpal stream runs for the life of the process but stays paused
//! between sessions; `start`/`stop` toggle it and drain the lock-free ring
//! buffer. Captured audio is downmixed to mono, resampled to the target
//! rate, and encoded as 16-bit PCM WAV entirely in memory.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::{SampleFormat, WavSpec, WavWriter};
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapRb,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::Capture;
use crate::config::AudioConfig;

/// Longest session the ring buffer can hold without dropping samples.
const MAX_RECORDING_SECS: usize = 30;

/// Audio capture failures.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No default input device is available.
    #[error("no input device available")]
    NoDevice,

    /// The audio backend rejected a stream operation.
    #[error("audio stream error: {0}")]
    Stream(String),

    /// WAV encoding failed.
    #[error("wav encoding failed: {0}")]
    Encode(#[from] hound::Error),
}

/// Trait for controlling audio stream lifecycle.
trait StreamControl: Send {
    /// Resume audio stream (activate microphone).
    fn play(&self) -> Result<(), CaptureError>;
    /// Pause audio stream (deactivate microphone).
    fn pause(&self) -> Result<(), CaptureError>;
}

struct CpalStreamControl {
    stream: cpal::Stream,
}

// SAFETY: the stream is only driven from the owning AudioCapture, which the
// session serializes behind a mutex; it is never shared across threads.
unsafe impl Send for CpalStreamControl {}

impl StreamControl for CpalStreamControl {
    fn play(&self) -> Result<(), CaptureError> {
        self.stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))
    }

    fn pause(&self) -> Result<(), CaptureError> {
        self.stream
            .pause()
            .map_err(|e| CaptureError::Stream(e.to_string()))
    }
}

/// Microphone capture bound to the default input device.
pub struct AudioCapture {
    stream_control: Box<dyn StreamControl>,
    ring_buffer_consumer: HeapCons<f32>,
    is_recording: Arc<AtomicBool>,
    device_sample_rate: u32,
    device_channels: u16,
    target_sample_rate: u32,
}

impl AudioCapture {
    /// Opens the default input device and parks the stream paused.
    ///
    /// # Errors
    /// [`CaptureError`] if no device is available or the stream cannot be
    /// built.
    pub fn new(config: &AudioConfig) -> Result<Self, CaptureError> {
        info!("initializing audio capture");

        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_owned());
        info!(device = %device_name, "using input device");

        let supported_config = device
            .default_input_config()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;
        let device_sample_rate = supported_config.sample_rate();
        let device_channels = supported_config.channels();
        info!(
            sample_rate = device_sample_rate,
            channels = device_channels,
            "device config"
        );

        // Sized for the longest session at the device rate so nothing is
        // dropped mid-dictation.
        let ring_buffer_capacity =
            device_sample_rate as usize * device_channels as usize * MAX_RECORDING_SECS;
        let ring_buffer = HeapRb::<f32>::new(ring_buffer_capacity);
        let (mut producer, ring_buffer_consumer) = ring_buffer.split();

        let is_recording = Arc::new(AtomicBool::new(false));
        let recording_flag = Arc::clone(&is_recording);

        let stream_config = supported_config.into();
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if recording_flag.load(Ordering::Relaxed) {
                        let pushed = producer.push_slice(data);
                        if pushed < data.len() {
                            warn!(dropped = data.len() - pushed, "ring buffer full");
                        }
                    }
                },
                move |err| {
                    warn!(error = %err, "audio stream error");
                },
                None,
            )
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        let stream_control = CpalStreamControl { stream };

        // Start then immediately pause: the microphone stays cold until a
        // session begins.
        stream_control.play()?;
        stream_control.pause()?;
        info!("audio stream initialized (paused)");

        Ok(Self {
            stream_control: Box::new(stream_control),
            ring_buffer_consumer,
            is_recording,
            device_sample_rate,
            device_channels,
            target_sample_rate: config.sample_rate,
        })
    }

    fn drain(&mut self) -> Vec<f32> {
        let mut samples = Vec::with_capacity(self.ring_buffer_consumer.occupied_len());
        while let Some(sample) = self.ring_buffer_consumer.try_pop() {
            samples.push(sample);
        }
        samples
    }

    fn to_target_mono(&self, samples: &[f32]) -> Vec<f32> {
        let mono = downmix(samples, self.device_channels);
        resample(&mono, self.device_sample_rate, self.target_sample_rate)
    }
}

impl Capture for AudioCapture {
    fn start(&mut self) -> Result<(), CaptureError> {
        debug!("starting recording");
        // Discard anything left over from a cancelled session.
        self.ring_buffer_consumer.clear();
        // Flag before resume so no callback slice is missed.
        self.is_recording.store(true, Ordering::Relaxed);
        self.stream_control.play()?;
        info!("recording started");
        Ok(())
    }

    fn stop(&mut self) -> Result<Vec<u8>, CaptureError> {
        debug!("stopping recording");
        self.is_recording.store(false, Ordering::Relaxed);
        self.stream_control.pause()?;

        let raw = self.drain();
        let mono = self.to_target_mono(&raw);
        info!(
            raw_samples = raw.len(),
            encoded_samples = mono.len(),
            "recording stopped"
        );
        encode_wav(&mono, self.target_sample_rate)
    }

    fn is_active(&self) -> bool {
        self.is_recording.load(Ordering::Relaxed)
    }
}

/// Average interleaved channels down to mono.
fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels_f64 = f64::from(channels);
    samples
        .chunks(channels as usize)
        .map(|frame| {
            let sum: f64 = frame.iter().map(|&s| f64::from(s)).sum();
            // f64 → f32: audio sample precision is sufficient
            #[allow(clippy::cast_possible_truncation)]
            {
                (sum / channels_f64) as f32
            }
        })
        .collect()
}

/// Linear-interpolation resampler, good enough for speech.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = f64::from(from_rate) / f64::from(to_rate);
    let output_len = (samples.len() as f64 / ratio) as usize;
    (0..output_len)
        .map(|i| {
            let src = i as f64 * ratio;
            let left = src as usize;
            let right = (left + 1).min(samples.len() - 1);
            let frac = (src - left as f64) as f32;
            samples[left].mul_add(1.0 - frac, samples[right] * frac)
        })
        .collect()
}

/// Encodes mono f32 samples as 16-bit PCM WAV bytes.
fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, CaptureError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut bytes = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut bytes, spec)?;
    for &sample in samples {
        // Clamp before scaling: stray over-range samples must not wrap.
        #[allow(clippy::cast_possible_truncation)]
        let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    Ok(bytes.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_passes_mono_through() {
        let samples = vec![0.1, -0.2, 0.3];
        assert_eq!(downmix(&samples, 1), samples);
    }

    #[test]
    fn downmix_averages_stereo_frames() {
        let samples = vec![1.0, 0.0, -1.0, 1.0];
        let mono = downmix(&samples, 2);
        assert_eq!(mono, vec![0.5, 0.0]);
    }

    #[test]
    fn resample_identity_at_equal_rates() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 24_000, 24_000), samples);
    }

    #[test]
    fn resample_halves_sample_count() {
        let samples: Vec<f32> = (0..480).map(|i| i as f32 / 480.0).collect();
        let out = resample(&samples, 48_000, 24_000);
        assert_eq!(out.len(), 240);
        // Values stay within the input range and keep rising.
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn encode_wav_produces_valid_header_and_samples() {
        let samples = vec![0.0, 0.5, -0.5, 1.0, -1.0];
        let bytes = encode_wav(&samples, 24_000).unwrap();

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(spec.bits_per_sample, 16);

        let decoded: Vec<i16> = reader.into_samples().map(Result::unwrap).collect();
        assert_eq!(decoded.len(), samples.len());
        assert_eq!(decoded[0], 0);
        assert_eq!(decoded[3], i16::MAX);
        assert_eq!(decoded[4], -i16::MAX);
    }

    #[test]
    fn encode_wav_clamps_out_of_range_samples() {
        let bytes = encode_wav(&[2.0, -2.0], 24_000).unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let decoded: Vec<i16> = reader.into_samples().map(Result::unwrap).collect();
        assert_eq!(decoded, vec![i16::MAX, -i16::MAX]);
    }

    #[test]
    #[ignore = "requires an audio input device"]
    fn capture_round_trip_on_real_device() {
        let config = AudioConfig {
            sample_rate: 24_000,
            duck_factor: 0.3,
            last_recording: String::new(),
        };
        let mut capture = AudioCapture::new(&config).unwrap();
        capture.start().unwrap();
        assert!(capture.is_active());
        std::thread::sleep(std::time::Duration::from_millis(200));
        let wav = capture.stop().unwrap();
        assert!(!capture.is_active());
        assert!(wav.len() > 44, "expected WAV header plus samples");
    }
}
