//! Pitch
//!
//! Frame-wise YIN fundamental-frequency tracking over an [`AudioBuffer`], with
//! a median across voiced frames as the clip's single pitch estimate.
//!
//! The difference function is computed through an FFT cross-correlation so
//! long clips at high sample rates stay cheap. Input below
//! [`MIN_TRACKING_RATE`] is upsampled first: with only a few samples per
//! period the integer-lag trough is too coarse to refine near `fmax`.
//!
//! # Reference
//!
//! de Cheveigné, A., & Kawahara, H. (2002). YIN, a fundamental frequency
//! estimator for speech and music. *JASA*, 111(4), 1917-1930.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::{borrow::Cow, sync::Arc};
use thiserror::Error;

use crate::signal::AudioBuffer;

/// C2, the lowest pitch searched by default.
pub const DEFAULT_FMIN: f32 = 65.406_39;
/// C7, the highest pitch searched by default.
pub const DEFAULT_FMAX: f32 = 2093.004_5;
/// Minimum frame length in samples.
pub const DEFAULT_FRAME_LENGTH: usize = 2048;
/// Hop between frames in samples.
pub const DEFAULT_HOP_LENGTH: usize = 512;
/// Cumulative-mean-normalized-difference trough threshold.
pub const DEFAULT_THRESHOLD: f32 = 0.1;
/// Frames with RMS below this are treated as unvoiced.
pub const DEFAULT_SILENCE_RMS: f32 = 0.01;
/// Slower input is upsampled by an integer factor to at least this rate.
pub const MIN_TRACKING_RATE: u32 = 16_000;
/// Input needing a larger factor than this is tracked as is.
const MAX_UPSAMPLE_FACTOR: u32 = 8;

/// Errors returned when configuring a [`PitchTracker`].
#[derive(Debug, Error)]
pub enum PitchError {
    /// An error occurred during the configuration of the PitchTracker.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Upsampling low-rate input failed.
    #[error("resampling failed: {0}")]
    Resample(String),
}

/// Builder for a [`PitchTracker`].
#[derive(Debug, Clone)]
pub struct PitchTrackerBuilder {
    fmin: f32,
    fmax: f32,
    frame_length: usize,
    hop_length: usize,
    threshold: f32,
    silence_rms: f32,
}

impl PitchTrackerBuilder {
    /// Start with default parameters:
    /// fmin = C2, fmax = C7, frame_length = 2048, hop_length = 512,
    /// threshold = 0.1, silence_rms = 0.01.
    pub fn new() -> Self {
        PitchTrackerBuilder {
            fmin: DEFAULT_FMIN,
            fmax: DEFAULT_FMAX,
            frame_length: DEFAULT_FRAME_LENGTH,
            hop_length: DEFAULT_HOP_LENGTH,
            threshold: DEFAULT_THRESHOLD,
            silence_rms: DEFAULT_SILENCE_RMS,
        }
    }

    /// Set the lowest frequency to search, in Hz.
    pub fn fmin(mut self, hz: f32) -> Self {
        self.fmin = hz;
        self
    }

    /// Set the highest frequency to search, in Hz.
    pub fn fmax(mut self, hz: f32) -> Self {
        self.fmax = hz;
        self
    }

    /// Set the minimum frame length. Grown per buffer when two periods of
    /// `fmin` do not fit.
    pub fn frame_length(mut self, samples: usize) -> Self {
        self.frame_length = samples;
        self
    }

    /// Set the hop between successive frames.
    pub fn hop_length(mut self, samples: usize) -> Self {
        self.hop_length = samples;
        self
    }

    /// Set the trough threshold (0.0..1.0). Lower is stricter.
    pub fn threshold(mut self, value: f32) -> Self {
        self.threshold = value;
        self
    }

    /// Set the RMS gate below which frames are unvoiced.
    pub fn silence_rms(mut self, value: f32) -> Self {
        self.silence_rms = value;
        self
    }

    /// Finalize and create the PitchTracker.
    pub fn build(self) -> Result<PitchTracker, PitchError> {
        if !(self.fmin.is_finite() && self.fmin > 0.0) {
            return Err(PitchError::Configuration("fmin must be positive".into()));
        }
        if !(self.fmax.is_finite() && self.fmax > self.fmin) {
            return Err(PitchError::Configuration(
                "fmax must be greater than fmin".into(),
            ));
        }
        if self.frame_length == 0 || self.hop_length == 0 {
            return Err(PitchError::Configuration(
                "frame_length and hop_length cannot be zero".into(),
            ));
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(PitchError::Configuration(
                "threshold must lie in (0, 1)".into(),
            ));
        }
        if self.silence_rms.is_nan() || self.silence_rms < 0.0 {
            return Err(PitchError::Configuration(
                "silence_rms cannot be negative".into(),
            ));
        }

        Ok(PitchTracker {
            fmin: self.fmin,
            fmax: self.fmax,
            frame_length: self.frame_length,
            hop_length: self.hop_length,
            threshold: self.threshold as f64,
            silence_rms: self.silence_rms as f64,
        })
    }
}

impl Default for PitchTrackerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// YIN pitch tracker.
///
/// Holds configuration only; every call plans its own FFTs and scratch
/// buffers, so one tracker can serve many threads.
#[derive(Debug, Clone)]
pub struct PitchTracker {
    fmin: f32,
    fmax: f32,
    frame_length: usize,
    hop_length: usize,
    threshold: f64,
    silence_rms: f64,
}

impl PitchTracker {
    /// Start customizing with a builder.
    pub fn builder() -> PitchTrackerBuilder {
        PitchTrackerBuilder::new()
    }

    /// Median fundamental frequency across voiced frames, or `None` when no
    /// frame carries a reliable pitch.
    pub fn estimate(&self, buffer: &AudioBuffer) -> Option<f32> {
        let mut voiced: Vec<f32> = self.track(buffer).into_iter().flatten().collect();
        log::debug!("pitch: {} voiced frames", voiced.len());
        median(&mut voiced)
    }

    /// Per-frame pitch contour; `None` marks an unvoiced frame.
    ///
    /// Frame and hop lengths are counted at the buffer's own rate, so each
    /// entry spans the same stretch of time whether or not the input was
    /// upsampled.
    pub fn track(&self, buffer: &AudioBuffer) -> Vec<Option<f32>> {
        let (samples, sample_rate, factor) = tracking_signal(buffer);
        let mut yin = YinFrame::new(self, sample_rate, factor);

        if samples.len() < yin.frame_length {
            let mut padded = samples.into_owned();
            padded.resize(yin.frame_length, 0.0);
            return vec![yin.pitch(&padded)];
        }

        (0..=samples.len() - yin.frame_length)
            .step_by(self.hop_length * factor)
            .map(|start| yin.pitch(&samples[start..start + yin.frame_length]))
            .collect()
    }
}

/// Samples and rate YIN runs on, plus the upsampling factor applied.
fn tracking_signal(buffer: &AudioBuffer) -> (Cow<'_, [f32]>, u32, usize) {
    let sample_rate = buffer.sample_rate();
    let factor = MIN_TRACKING_RATE.div_ceil(sample_rate);
    if factor <= 1 || factor > MAX_UPSAMPLE_FACTOR {
        return (Cow::Borrowed(buffer.samples()), sample_rate, 1);
    }

    match upsample(buffer.samples(), factor as usize) {
        Ok(samples) => {
            log::debug!(
                "pitch: upsampled {} Hz input by {}x for tracking",
                sample_rate,
                factor
            );
            (Cow::Owned(samples), sample_rate * factor, factor as usize)
        }
        Err(e) => {
            log::warn!("pitch: {e}; tracking at {sample_rate} Hz");
            (Cow::Borrowed(buffer.samples()), sample_rate, 1)
        }
    }
}

/// Band-limited integer-ratio upsampling of a mono signal.
fn upsample(samples: &[f32], factor: usize) -> Result<Vec<f32>, PitchError> {
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(factor as f64, 1.0, params, samples.len(), 1)
        .map_err(|e| PitchError::Resample(e.to_string()))?;
    let mut channels = resampler
        .process(&[samples], None)
        .map_err(|e| PitchError::Resample(e.to_string()))?;
    Ok(channels.pop().unwrap_or_default())
}

impl Default for PitchTracker {
    fn default() -> Self {
        PitchTracker {
            fmin: DEFAULT_FMIN,
            fmax: DEFAULT_FMAX,
            frame_length: DEFAULT_FRAME_LENGTH,
            hop_length: DEFAULT_HOP_LENGTH,
            threshold: DEFAULT_THRESHOLD as f64,
            silence_rms: DEFAULT_SILENCE_RMS as f64,
        }
    }
}

/// Per-call YIN state for one sample rate.
struct YinFrame {
    sample_rate: f64,
    threshold: f64,
    silence_rms: f64,
    tau_min: usize,
    tau_max: usize,
    /// Integration window length.
    window: usize,
    frame_length: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    head: Vec<Complex<f64>>,
    full: Vec<Complex<f64>>,
    diff: Vec<f64>,
    cmnd: Vec<f64>,
}

impl YinFrame {
    fn new(tracker: &PitchTracker, sample_rate: u32, factor: usize) -> Self {
        let sr = sample_rate as f64;
        let tau_min = ((sr / tracker.fmax as f64).floor() as usize).max(2);
        // One extra lag so the trough at tau_max can still be interpolated.
        let tau_max = ((sr / tracker.fmin as f64).ceil() as usize).max(tau_min + 1) + 1;
        let frame_length = (tracker.frame_length * factor).max(2 * tau_max);
        let window = frame_length - tau_max;
        let fft_size = (frame_length + window).next_power_of_two();

        let mut planner = FftPlanner::<f64>::new();
        YinFrame {
            sample_rate: sr,
            threshold: tracker.threshold,
            silence_rms: tracker.silence_rms,
            tau_min,
            tau_max,
            window,
            frame_length,
            forward: planner.plan_fft_forward(fft_size),
            inverse: planner.plan_fft_inverse(fft_size),
            head: vec![Complex::default(); fft_size],
            full: vec![Complex::default(); fft_size],
            diff: vec![0.0; tau_max + 1],
            cmnd: vec![0.0; tau_max + 1],
        }
    }

    fn pitch(&mut self, frame: &[f32]) -> Option<f32> {
        let rms = (frame.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>()
            / frame.len() as f64)
            .sqrt();
        if rms < self.silence_rms {
            return None;
        }

        self.difference(frame);
        self.cumulative_mean_normalize();

        let tau = self.first_trough()?;
        let period = self.interpolate(tau);
        let frequency = (self.sample_rate / period) as f32;

        if frequency.is_finite() && frequency > 0.0 {
            Some(frequency)
        } else {
            None
        }
    }

    /// d(tau) = e(0) + e(tau) - 2 r(tau), with r(tau) from an FFT
    /// cross-correlation of the first window against the whole frame.
    fn difference(&mut self, frame: &[f32]) {
        let w = self.window;
        let n = self.head.len();

        for (i, c) in self.head.iter_mut().enumerate() {
            *c = Complex::new(if i < w { frame[i] as f64 } else { 0.0 }, 0.0);
        }
        for (i, c) in self.full.iter_mut().enumerate() {
            *c = Complex::new(frame.get(i).map_or(0.0, |&s| s as f64), 0.0);
        }

        self.forward.process(&mut self.head);
        self.forward.process(&mut self.full);
        for (h, f) in self.head.iter_mut().zip(&self.full) {
            *h = h.conj() * *f;
        }
        self.inverse.process(&mut self.head);

        let mut energy = Vec::with_capacity(frame.len() + 1);
        energy.push(0.0);
        let mut acc = 0.0;
        for &s in frame {
            acc += (s as f64) * (s as f64);
            energy.push(acc);
        }
        let window_energy = |start: usize| energy[start + w] - energy[start];

        let e0 = window_energy(0);
        for tau in 0..=self.tau_max {
            let r = self.head[tau].re / n as f64;
            self.diff[tau] = (e0 + window_energy(tau) - 2.0 * r).max(0.0);
        }
    }

    fn cumulative_mean_normalize(&mut self) {
        self.cmnd[0] = 1.0;
        let mut running = 0.0;
        for tau in 1..=self.tau_max {
            running += self.diff[tau];
            self.cmnd[tau] = if running > 0.0 {
                self.diff[tau] * tau as f64 / running
            } else {
                1.0
            };
        }
    }

    /// First lag whose normalized difference dips under the threshold,
    /// followed down to the bottom of its trough.
    fn first_trough(&self) -> Option<usize> {
        let last = self.tau_max - 1;
        let mut tau = self.tau_min;
        while tau <= last {
            if self.cmnd[tau] < self.threshold {
                while tau < last && self.cmnd[tau + 1] < self.cmnd[tau] {
                    tau += 1;
                }
                return Some(tau);
            }
            tau += 1;
        }
        None
    }

    /// Parabolic interpolation of the raw difference around `tau`.
    fn interpolate(&self, tau: usize) -> f64 {
        let y1 = self.diff[tau - 1];
        let y2 = self.diff[tau];
        let y3 = self.diff[tau + 1];
        let denom = y1 - 2.0 * y2 + y3;
        if denom.abs() < f64::EPSILON {
            return tau as f64;
        }
        let shift = (y1 - y3) / (2.0 * denom);
        if shift.abs() <= 1.0 {
            tau as f64 + shift
        } else {
            tau as f64
        }
    }
}

/// Median of a sample set; the mean of the two middle values for even counts.
fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
