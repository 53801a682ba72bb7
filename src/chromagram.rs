//! Chromagram
//!
//! 12-bin pitch-class energy profile of a whole buffer: Hamming-windowed STFT,
//! each bin folded onto the pitch class of its nearest equal-tempered note,
//! frames averaged over time.

use std::{
    f32::consts::PI,
    ops::Index,
    sync::Arc,
};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use thiserror::Error;

use crate::note::{NoteName, SEMITONES};
use crate::signal::AudioBuffer;

/// STFT window length in samples.
pub const DEFAULT_WINDOW_SIZE: usize = 4096;
/// Hop between STFT frames in samples.
pub const DEFAULT_HOP_SIZE: usize = DEFAULT_WINDOW_SIZE / 2;
/// Lowest bin frequency folded into the profile (C1).
pub const DEFAULT_MIN_FREQUENCY: f32 = 32.703_197;
/// Highest bin frequency folded into the profile.
pub const DEFAULT_MAX_FREQUENCY: f32 = 5000.0;

/// Errors returned by the Chromagram pipeline.
#[derive(Debug, Error)]
pub enum ChromagramError {
    /// An error occurred during the configuration of the Chromagram.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Relative energy per pitch class; index = semitone offset from C.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct ChromaProfile([f32; SEMITONES]);

impl ChromaProfile {
    /// Wrap raw pitch-class energies. Negative values are clamped to zero.
    pub fn new(energies: [f32; SEMITONES]) -> Self {
        ChromaProfile(energies.map(|e| e.max(0.0)))
    }

    /// The 12 energies, C first.
    pub fn energies(&self) -> &[f32; SEMITONES] {
        &self.0
    }

    /// Sum of all energies.
    pub fn total(&self) -> f32 {
        self.0.iter().sum()
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f32 {
        self.0.iter().map(|e| e * e).sum::<f32>().sqrt()
    }

    /// Pitch class carrying the most energy.
    pub fn dominant(&self) -> NoteName {
        let mut best = 0;
        for (i, &e) in self.0.iter().enumerate() {
            if e > self.0[best] {
                best = i;
            }
        }
        NoteName::ALL[best]
    }
}

impl Index<NoteName> for ChromaProfile {
    type Output = f32;

    fn index(&self, note: NoteName) -> &f32 {
        &self.0[note.index()]
    }
}

/// Builder for a Chromagram pipeline.
#[derive(Debug, Clone)]
pub struct ChromagramBuilder {
    window_size: usize,
    hop_size: usize,
    min_frequency: f32,
    max_frequency: f32,
}

impl ChromagramBuilder {
    /// Start with default parameters:
    /// window_size = 4096, hop_size = 2048,
    /// min_frequency = C1, max_frequency = 5000 Hz.
    pub fn new() -> Self {
        ChromagramBuilder {
            window_size: DEFAULT_WINDOW_SIZE,
            hop_size: DEFAULT_HOP_SIZE,
            min_frequency: DEFAULT_MIN_FREQUENCY,
            max_frequency: DEFAULT_MAX_FREQUENCY,
        }
    }

    /// Set the STFT window length.
    pub fn window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    /// Set the hop between frames.
    pub fn hop_size(mut self, size: usize) -> Self {
        self.hop_size = size;
        self
    }

    /// Set the lowest bin frequency considered.
    pub fn min_frequency(mut self, hz: f32) -> Self {
        self.min_frequency = hz;
        self
    }

    /// Set the highest bin frequency considered.
    pub fn max_frequency(mut self, hz: f32) -> Self {
        self.max_frequency = hz;
        self
    }

    /// Finalize and create the Chromagram.
    pub fn build(self) -> Result<Chromagram, ChromagramError> {
        if self.window_size < 2 {
            return Err(ChromagramError::Configuration(
                "window_size must be at least 2".into(),
            ));
        }
        if self.hop_size == 0 {
            return Err(ChromagramError::Configuration("hop_size cannot be zero".into()));
        }
        if !(self.min_frequency.is_finite() && self.min_frequency > 0.0) {
            return Err(ChromagramError::Configuration(
                "min_frequency must be positive".into(),
            ));
        }
        if self.max_frequency.is_nan() || self.max_frequency <= self.min_frequency {
            return Err(ChromagramError::Configuration(
                "max_frequency must be greater than min_frequency".into(),
            ));
        }

        Ok(Chromagram::with_config(
            self.window_size,
            self.hop_size,
            self.min_frequency,
            self.max_frequency,
        ))
    }
}

impl Default for ChromagramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole-buffer chromagram calculator.
///
/// Cloning is cheap (the FFT plan is shared) and gives the clone its own
/// scratch buffer.
#[derive(Clone)]
pub struct Chromagram {
    fft_buffer: Vec<Complex<f32>>,
    window: Vec<f32>,
    window_size: usize,
    hop_size: usize,
    min_frequency: f32,
    max_frequency: f32,
    fft: Arc<dyn Fft<f32>>,
}

impl Chromagram {
    /// Start customizing with a builder.
    pub fn builder() -> ChromagramBuilder {
        ChromagramBuilder::new()
    }

    /// Create a chromagram from already validated parameters
    fn with_config(
        window_size: usize,
        hop_size: usize,
        min_frequency: f32,
        max_frequency: f32,
    ) -> Self {
        // Prepare FFT plan once
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_size);

        Chromagram {
            fft_buffer: vec![Complex { re: 0.0, im: 0.0 }; window_size],
            window: hamming_window(window_size),
            window_size,
            hop_size,
            min_frequency,
            max_frequency,
            fft,
        }
    }

    /// Time-averaged chroma profile of the whole buffer.
    pub fn profile(&mut self, buffer: &AudioBuffer) -> ChromaProfile {
        self.profile_of(buffer.samples(), buffer.sample_rate())
    }

    /// Time-averaged chroma profile of raw mono samples.
    pub fn profile_of(&mut self, samples: &[f32], sample_rate: u32) -> ChromaProfile {
        let frames = self.frames(samples, sample_rate);
        let mut mean = [0.0f32; SEMITONES];
        if frames.is_empty() {
            return ChromaProfile(mean);
        }
        for frame in &frames {
            for (acc, &e) in mean.iter_mut().zip(frame) {
                *acc += e;
            }
        }
        let scale = 1.0 / frames.len() as f32;
        mean.iter_mut().for_each(|e| *e *= scale);
        ChromaProfile(mean)
    }

    /// One chroma vector per STFT frame. Input shorter than a window is
    /// zero-padded into a single frame.
    pub fn frames(&mut self, samples: &[f32], sample_rate: u32) -> Vec<[f32; SEMITONES]> {
        if samples.is_empty() || sample_rate == 0 {
            return Vec::new();
        }
        let classes = self.bin_classes(sample_rate);

        if samples.len() <= self.window_size {
            return vec![self.compute_frame(samples, &classes)];
        }

        let last = samples.len() - self.window_size;
        (0..=last)
            .step_by(self.hop_size)
            .map(|start| self.compute_frame(&samples[start..start + self.window_size], &classes))
            .collect()
    }

    /// Pitch class for every bin below Nyquist, `None` outside the band.
    fn bin_classes(&self, sample_rate: u32) -> Vec<Option<usize>> {
        let bin_width = sample_rate as f32 / self.window_size as f32;
        (0..=self.window_size / 2)
            .map(|bin| {
                let freq = bin as f32 * bin_width;
                if freq < self.min_frequency || freq > self.max_frequency {
                    return None;
                }
                let midi = 69.0 + 12.0 * (freq / 440.0).log2();
                Some(NoteName::from_index(midi.round() as i32).index())
            })
            .collect()
    }

    #[inline]
    fn compute_frame(&mut self, frame: &[f32], classes: &[Option<usize>]) -> [f32; SEMITONES] {
        (0..self.window_size).for_each(|i| {
            let sample = frame.get(i).copied().unwrap_or(0.0);
            self.fft_buffer[i].re = sample * self.window[i];
            self.fft_buffer[i].im = 0.0;
        });

        self.fft.process(&mut self.fft_buffer);

        let mut chroma = [0.0; SEMITONES];
        for (c, class) in self.fft_buffer.iter().zip(classes) {
            if let Some(pc) = class {
                chroma[*pc] += c.re * c.re + c.im * c.im;
            }
        }
        chroma
    }
}

impl Default for Chromagram {
    fn default() -> Self {
        Chromagram::with_config(
            DEFAULT_WINDOW_SIZE,
            DEFAULT_HOP_SIZE,
            DEFAULT_MIN_FREQUENCY,
            DEFAULT_MAX_FREQUENCY,
        )
    }
}

fn hamming_window(size: usize) -> Vec<f32> {
    let denom = (size - 1) as f32;
    (0..size)
        .map(|n| 0.54 - 0.46 * (2.0 * PI * n as f32 / denom).cos())
        .collect()
}
