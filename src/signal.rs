//! Signal
//!
//! Turns raw decoded PCM into the mono, peak-normalized [`AudioBuffer`] every
//! analysis stage works on.

use thiserror::Error;

/// Default analysis cap, in seconds. Longer clips are truncated.
pub const DEFAULT_MAX_DURATION_SECS: f32 = 30.0;

/// Errors returned while building an [`AudioBuffer`].
#[derive(Debug, Error, PartialEq)]
pub enum SignalError {
    /// No samples survived downmixing.
    #[error("audio contains no samples")]
    EmptyAudio,

    /// Sample rate was zero.
    #[error("invalid sample rate: {rate} Hz")]
    InvalidSampleRate {
        /// The rejected sample rate.
        rate: u32,
    },

    /// Channel count was zero.
    #[error("channel count must be at least 1")]
    InvalidChannelCount,

    /// Channel data did not line up (ragged planar channels, or an
    /// interleaved buffer that is not a whole number of frames).
    #[error("channel {channel} holds {got} samples, expected {expected}")]
    ChannelLengthMismatch {
        /// Offending channel index.
        channel: usize,
        /// Sample count implied by the other channels.
        expected: usize,
        /// Sample count actually present.
        got: usize,
    },

    /// An error occurred during the configuration of the Normalizer.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// A PCM sample type the [`Normalizer`] accepts.
///
/// Unsigned integer formats store silence at mid-scale (128 for `u8`), so
/// they are recentred before scaling.
pub trait Sample: Copy {
    /// Full-scale value in `[-1, 1]`, silence at zero.
    fn to_f64(self) -> f64;
}

impl Sample for f32 {
    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Sample for f64 {
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
}

macro_rules! signed_sample {
    ($($t:ty),*) => {$(
        impl Sample for $t {
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64 / -(<$t>::MIN as f64)
            }
        }
    )*};
}

macro_rules! unsigned_sample {
    ($($t:ty),*) => {$(
        impl Sample for $t {
            #[inline]
            fn to_f64(self) -> f64 {
                let mid = (<$t>::MAX / 2) as f64 + 1.0;
                (self as f64 - mid) / mid
            }
        }
    )*};
}

signed_sample!(i8, i16, i32);
unsigned_sample!(u8, u16, u32);

/// Mono, peak-normalized audio ready for analysis.
///
/// Always non-empty with a positive sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Wrap samples that are already mono and scaled to `[-1, 1]`.
    ///
    /// No normalization or truncation is applied; use [`Normalizer`] for raw
    /// decoder output.
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self, SignalError> {
        if sample_rate == 0 {
            return Err(SignalError::InvalidSampleRate { rate: sample_rate });
        }
        if samples.is_empty() {
            return Err(SignalError::EmptyAudio);
        }
        Ok(AudioBuffer {
            samples,
            sample_rate,
        })
    }

    /// The mono samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer has no samples (never true for a constructed
    /// buffer).
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// The first `secs` seconds of audio, or all of it if shorter.
    pub fn head(&self, secs: f32) -> &[f32] {
        let n = secs_to_samples(secs, self.sample_rate).min(self.samples.len());
        &self.samples[..n]
    }
}

/// Builder for a [`Normalizer`].
#[derive(Debug, Clone)]
pub struct NormalizerBuilder {
    max_duration_secs: f32,
}

impl NormalizerBuilder {
    /// Start with default parameters: max_duration_secs = 30.0.
    pub fn new() -> Self {
        NormalizerBuilder {
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
        }
    }

    /// Set the truncation cap in seconds.
    pub fn max_duration_secs(mut self, secs: f32) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Finalize and create the Normalizer.
    pub fn build(self) -> Result<Normalizer, SignalError> {
        if !self.max_duration_secs.is_finite() || self.max_duration_secs <= 0.0 {
            return Err(SignalError::Configuration(format!(
                "max_duration_secs must be positive, got {}",
                self.max_duration_secs
            )));
        }
        Ok(Normalizer {
            max_duration_secs: self.max_duration_secs,
        })
    }
}

impl Default for NormalizerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Downmixes, peak-normalizes and truncates decoded audio.
///
/// Accepts float, signed and unsigned integer PCM through [`Sample`].
#[derive(Debug, Clone)]
pub struct Normalizer {
    max_duration_secs: f32,
}

impl Normalizer {
    /// Start customizing with a builder.
    pub fn builder() -> NormalizerBuilder {
        NormalizerBuilder::new()
    }

    /// Truncation cap in seconds.
    pub fn max_duration_secs(&self) -> f32 {
        self.max_duration_secs
    }

    /// Normalize a single-channel sequence.
    pub fn mono<T>(&self, samples: &[T], sample_rate: u32) -> Result<AudioBuffer, SignalError>
    where
        T: Sample,
    {
        self.interleaved(samples, 1, sample_rate)
    }

    /// Normalize interleaved frames (`L R L R ...`).
    pub fn interleaved<T>(
        &self,
        samples: &[T],
        channels: usize,
        sample_rate: u32,
    ) -> Result<AudioBuffer, SignalError>
    where
        T: Sample,
    {
        check_sample_rate(sample_rate)?;
        if channels == 0 {
            return Err(SignalError::InvalidChannelCount);
        }
        let remainder = samples.len() % channels;
        if remainder != 0 {
            let frames = samples.len() / channels;
            return Err(SignalError::ChannelLengthMismatch {
                channel: remainder,
                expected: frames + 1,
                got: frames,
            });
        }

        let scale = 1.0 / channels as f64;
        let mono = samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().map(|&s| s.to_f64()).sum::<f64>() * scale)
            .collect();
        self.finish(mono, sample_rate)
    }

    /// Normalize planar channel data, one slice per channel.
    pub fn planar<T, C>(&self, channels: &[C], sample_rate: u32) -> Result<AudioBuffer, SignalError>
    where
        T: Sample,
        C: AsRef<[T]>,
    {
        check_sample_rate(sample_rate)?;
        let first = channels.first().ok_or(SignalError::InvalidChannelCount)?;
        let expected = first.as_ref().len();
        for (channel, data) in channels.iter().enumerate() {
            let got = data.as_ref().len();
            if got != expected {
                return Err(SignalError::ChannelLengthMismatch {
                    channel,
                    expected,
                    got,
                });
            }
        }

        let mut mono = vec![0.0f64; expected];
        for data in channels {
            for (acc, &s) in mono.iter_mut().zip(data.as_ref()) {
                *acc += s.to_f64();
            }
        }
        let scale = 1.0 / channels.len() as f64;
        mono.iter_mut().for_each(|s| *s *= scale);
        self.finish(mono, sample_rate)
    }

    fn finish(&self, mono: Vec<f64>, sample_rate: u32) -> Result<AudioBuffer, SignalError> {
        if mono.is_empty() {
            return Err(SignalError::EmptyAudio);
        }

        let peak = mono.iter().fold(0.0f64, |m, s| m.max(s.abs()));
        let gain = if peak > 0.0 { 1.0 / peak } else { 1.0 };

        let keep = secs_to_samples(self.max_duration_secs, sample_rate).min(mono.len());
        let samples: Vec<f32> = mono[..keep].iter().map(|&s| (s * gain) as f32).collect();

        log::debug!(
            "normalized {} mono samples at {} Hz (peak {:.4}, kept {})",
            mono.len(),
            sample_rate,
            peak,
            samples.len()
        );
        if peak == 0.0 {
            log::warn!("input audio is entirely silent");
        }

        AudioBuffer::from_mono(samples, sample_rate)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer {
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
        }
    }
}

fn check_sample_rate(sample_rate: u32) -> Result<(), SignalError> {
    if sample_rate == 0 {
        Err(SignalError::InvalidSampleRate { rate: sample_rate })
    } else {
        Ok(())
    }
}

fn secs_to_samples(secs: f32, sample_rate: u32) -> usize {
    (secs.max(0.0) as f64 * sample_rate as f64).round() as usize
}
