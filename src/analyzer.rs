//! Analyzer
//!
//! Runs pitch, note, key and chord analysis over one [`AudioBuffer`].

use std::fmt::{self, Display};
use thiserror::Error;

use crate::chords::{diatonic_triads, ChordList};
use crate::chromagram::ChromagramError;
use crate::key::{KeyEstimator, KeyEstimatorBuilder, KeyResult};
use crate::note::{NoteResult, TuningStatus, DEFAULT_IN_TUNE_TOLERANCE_CENTS};
use crate::pitch::{PitchError, PitchTracker, PitchTrackerBuilder};
use crate::signal::AudioBuffer;

/// Errors returned when configuring an [`Analyzer`].
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Invalid pitch tracker settings.
    #[error(transparent)]
    Pitch(#[from] PitchError),

    /// Invalid chromagram or key window settings.
    #[error(transparent)]
    Chromagram(#[from] ChromagramError),

    /// An error occurred during the configuration of the Analyzer.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Everything learned about one clip.
///
/// Absent pitch fields mean "no reliable pitch", not failure. Key and chords
/// are always present; `key.confidence` tells how much to trust them.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// Median fundamental frequency in Hz.
    pub pitch_hz: Option<f32>,
    /// Nearest note to `pitch_hz`.
    pub note: Option<NoteResult>,
    /// In tune / sharp / flat relative to `note`.
    pub tuning: Option<TuningStatus>,
    /// Best-matching key.
    pub key: KeyResult,
    /// Diatonic triads of `key`.
    pub chords: ChordList,
}

impl Analysis {
    /// Labels for annotating a waveform: note, then key.
    pub fn labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(2);
        if let Some(note) = &self.note {
            labels.push(note.label());
        }
        labels.push(self.key.key.to_string());
        labels
    }
}

impl Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.pitch_hz, &self.note) {
            (Some(hz), Some(note)) => {
                writeln!(f, "Detected Note: {note}")?;
                writeln!(f, "Frequency: {hz:.2} Hz")?;
                writeln!(f, "Target Note Frequency: {:.2} Hz", note.target_frequency)?;
                if let Some(tuning) = &self.tuning {
                    writeln!(f, "Tuning Status: {tuning}")?;
                }
            }
            _ => writeln!(f, "No clear pitch detected. Try a sustained tone or single note.")?,
        }
        writeln!(
            f,
            "Key: {} (confidence {:.2})",
            self.key.key, self.key.confidence
        )?;
        let chords: Vec<String> = self.chords.iter().map(|c| c.to_string()).collect();
        write!(f, "Chords: {}", chords.join(" "))
    }
}

/// Builder for an [`Analyzer`].
#[derive(Debug, Clone)]
pub struct AnalyzerBuilder {
    pitch: PitchTrackerBuilder,
    key: KeyEstimatorBuilder,
    in_tune_tolerance_cents: f32,
}

impl AnalyzerBuilder {
    /// Start with default pitch tracker, key estimator and a 5 cent
    /// in-tune tolerance.
    pub fn new() -> Self {
        AnalyzerBuilder {
            pitch: PitchTrackerBuilder::new(),
            key: KeyEstimatorBuilder::new(),
            in_tune_tolerance_cents: DEFAULT_IN_TUNE_TOLERANCE_CENTS,
        }
    }

    /// Replace the pitch tracker configuration.
    pub fn pitch_tracker(mut self, builder: PitchTrackerBuilder) -> Self {
        self.pitch = builder;
        self
    }

    /// Replace the key estimator configuration.
    pub fn key_estimator(mut self, builder: KeyEstimatorBuilder) -> Self {
        self.key = builder;
        self
    }

    /// Set the deviation, in cents, still reported as in tune.
    pub fn in_tune_tolerance_cents(mut self, cents: f32) -> Self {
        self.in_tune_tolerance_cents = cents;
        self
    }

    /// Finalize and create the Analyzer.
    pub fn build(self) -> Result<Analyzer, AnalyzerError> {
        if !(self.in_tune_tolerance_cents.is_finite() && self.in_tune_tolerance_cents >= 0.0) {
            return Err(AnalyzerError::Configuration(
                "in_tune_tolerance_cents must be a non-negative number".into(),
            ));
        }
        Ok(Analyzer {
            pitch: self.pitch.build()?,
            key: self.key.build()?,
            in_tune_tolerance_cents: self.in_tune_tolerance_cents,
        })
    }
}

impl Default for AnalyzerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Stateless analysis pipeline.
///
/// Shareable across threads: each call allocates its own working buffers.
#[derive(Clone)]
pub struct Analyzer {
    pitch: PitchTracker,
    key: KeyEstimator,
    in_tune_tolerance_cents: f32,
}

impl Analyzer {
    /// Start customizing with a builder.
    pub fn builder() -> AnalyzerBuilder {
        AnalyzerBuilder::new()
    }

    /// The configured pitch tracker.
    pub fn pitch_tracker(&self) -> &PitchTracker {
        &self.pitch
    }

    /// The configured key estimator.
    pub fn key_estimator(&self) -> &KeyEstimator {
        &self.key
    }

    /// Analyse one clip.
    pub fn analyze(&self, buffer: &AudioBuffer) -> Analysis {
        log::debug!(
            "analyzing {:.2}s of audio at {} Hz",
            buffer.duration_secs(),
            buffer.sample_rate()
        );

        let pitch_hz = self.pitch.estimate(buffer);
        let note = pitch_hz.and_then(NoteResult::from_frequency);
        let tuning = note.map(|n| n.tuning(self.in_tune_tolerance_cents));

        let key = self.key.estimate(buffer);
        let chords = diatonic_triads(key.key);

        match &note {
            Some(n) => log::debug!("note {} ({:+.1} cents)", n, n.cents),
            None => log::debug!("no reliable pitch"),
        }

        Analysis {
            pitch_hz,
            note,
            tuning,
            key,
            chords,
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer {
            pitch: PitchTracker::default(),
            key: KeyEstimator::default(),
            in_tune_tolerance_cents: DEFAULT_IN_TUNE_TOLERANCE_CENTS,
        }
    }
}
