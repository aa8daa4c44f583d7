/// Microphone capture and chime playback.
///
/// Owns all cpal plumbing so the session can stay hardware-free. The input
/// stream converts the driver's f32 samples to 16-bit little-endian PCM and
/// feeds the shared ring buffer from the audio callback.

use crate::ring_buffer::RingBuffer;
use crate::scorer::AudioFormat;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum AudioStreamError {
    #[error("no default input device available")]
    NoInputDevice,

    #[error("no default output device available")]
    NoOutputDevice,

    #[error("no supported device config for {channels}ch at {sample_rate}Hz")]
    UnsupportedFormat { channels: u16, sample_rate: u32 },

    #[error("audio stream error: {0}")]
    Stream(String),

    #[error("could not read chime file: {0}")]
    ChimeFile(#[from] hound::Error),
}

/// Convert f32 samples in [-1.0, 1.0] to i16 little-endian bytes.
fn extend_as_i16_le(out: &mut Vec<u8>, samples: &[f32]) {
    for &sample in samples {
        let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Mix interleaved multi-channel samples down to mono by averaging.
fn mix_to_mono(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Cloneable mute switch for a capture stream.
///
/// Muting keeps the device stream alive but stops the callback from
/// feeding the ring buffer, so chime playback is not heard back as part
/// of a phrase.
#[derive(Clone)]
pub struct CaptureGate {
    live: Arc<AtomicBool>,
}

impl CaptureGate {
    pub fn new() -> Self {
        Self {
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Stop feeding captured audio into the ring buffer.
    pub fn mute(&self) {
        self.live.store(false, Ordering::Relaxed);
    }

    /// Resume feeding captured audio.
    pub fn unmute(&self) {
        self.live.store(true, Ordering::Relaxed);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }
}

impl Default for CaptureGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Live microphone stream feeding a ring buffer.
///
/// The data callback runs on the audio thread and must stay real-time
/// clean: it converts samples into a reused scratch buffer and pushes them
/// through the ring's single lock, nothing else. Errors are reported on
/// cpal's dedicated error callback instead.
pub struct InputStream {
    stream: Option<Stream>,
    format: AudioFormat,
    gate: CaptureGate,
}

impl InputStream {
    /// Open the default input device in the given format and start
    /// capturing into `ring`, gated by `gate`.
    ///
    /// The format comes from the scorer: the model dictates what the
    /// microphone must deliver, never the other way around.
    pub fn open(
        format: AudioFormat,
        ring: Arc<RingBuffer>,
        gate: CaptureGate,
    ) -> Result<Self, AudioStreamError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AudioStreamError::NoInputDevice)?;

        let supported = device
            .supported_input_configs()
            .map_err(|e| AudioStreamError::Stream(e.to_string()))?
            .find(|c| {
                c.channels() == format.channels
                    && c.min_sample_rate() <= SampleRate(format.sample_rate)
                    && c.max_sample_rate() >= SampleRate(format.sample_rate)
                    && c.sample_format() == SampleFormat::F32
            })
            .ok_or(AudioStreamError::UnsupportedFormat {
                channels: format.channels,
                sample_rate: format.sample_rate,
            })?;

        let config = supported
            .with_sample_rate(SampleRate(format.sample_rate))
            .config();

        debug!(
            "input device: {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        let live = Arc::clone(&gate.live);
        let mut scratch: Vec<u8> = Vec::with_capacity(32 * 1024);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !live.load(Ordering::Relaxed) {
                        return;
                    }
                    scratch.clear();
                    extend_as_i16_le(&mut scratch, data);
                    ring.extend(&scratch);
                },
                |err| {
                    error!("audio capture error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioStreamError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioStreamError::Stream(e.to_string()))?;

        info!(
            "audio capture started: {}ch {}Hz",
            format.channels, format.sample_rate
        );

        Ok(Self {
            stream: Some(stream),
            format,
            gate,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Mute switch shared with the stream's data callback.
    pub fn gate(&self) -> CaptureGate {
        self.gate.clone()
    }

    pub fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Stop capturing. Idempotent.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            debug!("audio capture stopped");
        }
    }
}

impl Drop for InputStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Short notification sound played when a keyword fires.
///
/// Decoded once at startup and replayed from memory, so a failure to read
/// the file surfaces before the session starts listening.
pub struct Chime {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Chime {
    /// Load a WAV file, mixing multi-channel audio down to mono.
    pub fn load(path: &Path) -> Result<Self, AudioStreamError> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        };

        let samples = mix_to_mono(samples, channels);

        debug!(
            "chime loaded: {} samples at {}Hz from {}",
            samples.len(),
            spec.sample_rate,
            path.display()
        );

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.samples.len() as u64 * 1000 / u64::from(self.sample_rate))
    }

    /// Play through the default output device, blocking until done.
    pub fn play(&self) -> Result<(), AudioStreamError> {
        if self.samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioStreamError::NoOutputDevice)?;

        let rate = SampleRate(self.sample_rate);
        let supported = device
            .supported_output_configs()
            .map_err(|e| AudioStreamError::Stream(e.to_string()))?
            .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .or_else(|| {
                // Fall back to stereo when the device has no mono config.
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
                })
            })
            .ok_or(AudioStreamError::UnsupportedFormat {
                channels: 1,
                sample_rate: self.sample_rate,
            })?;

        let config = supported.with_sample_rate(rate).config();
        let channels = config.channels as usize;

        let samples = self.samples.clone();
        let position = Arc::new(parking_lot::Mutex::new(0usize));
        let finished = Arc::new(parking_lot::Mutex::new(false));

        let position_cb = Arc::clone(&position);
        let finished_cb = Arc::clone(&finished);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position_cb.lock();
                    for frame in data.chunks_mut(channels) {
                        let sample = if *pos < samples.len() {
                            let s = samples[*pos];
                            *pos += 1;
                            s
                        } else {
                            *finished_cb.lock() = true;
                            0.0
                        };
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }
                },
                |err| {
                    error!("audio playback error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioStreamError::Stream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioStreamError::Stream(e.to_string()))?;

        // Poll for completion, bounded by the chime length plus a margin.
        let deadline = Instant::now() + self.duration() + Duration::from_millis(500);
        while !*finished.lock() {
            if Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        std::thread::sleep(Duration::from_millis(50));

        drop(stream);
        debug!("chime playback complete");

        Ok(())
    }
}
