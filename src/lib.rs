//! # tune_trainer
//!
//! Analysis core for short audio clips: fundamental pitch, nearest note and
//! tuning deviation, musical key with its diatonic chords, and a PNG waveform.
//!
//! ## Example
//! ```rust
//! use tune_trainer::{Analyzer, Normalizer, WaveformRenderer};
//!
//! fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1) Normalize decoded PCM (here: one second of A4, 16-bit stereo)
//!     let sample_rate = 22_050;
//!     let pcm: Vec<i16> = (0..sample_rate)
//!         .flat_map(|i| {
//!             let t = i as f32 / sample_rate as f32;
//!             let s = (t * 440.0 * std::f32::consts::TAU).sin();
//!             let v = (s * 12_000.0) as i16;
//!             [v, v]
//!         })
//!         .collect();
//!     let buffer = Normalizer::default().interleaved(&pcm, 2, sample_rate as u32)?;
//!
//!     // 2) Analyse
//!     let analysis = Analyzer::builder().build()?.analyze(&buffer);
//!     if let Some(note) = analysis.note {
//!         println!("{} ({:+.1} cents)", note, note.cents);
//!     }
//!
//!     // 3) Render; a failure here leaves `analysis` intact
//!     let labels = analysis.labels();
//!     let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
//!     match WaveformRenderer::default().render(&buffer, &labels) {
//!         Ok(png) => println!("{} byte waveform", png.len()),
//!         Err(e) => eprintln!("could not render waveform: {e}"),
//!     }
//!
//!     Ok(())
//! }
//! # run().unwrap();
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rust_2018_idioms)]
#![deny(clippy::all)]

/// High-level analysis API.
pub use analyzer::{Analysis, Analyzer, AnalyzerBuilder, AnalyzerError};

/// Diatonic chord suggestions.
pub use chords::{diatonic_labels, diatonic_triads, Chord, ChordKind, ChordList};

/// Pitch-class energy extraction.
pub use chromagram::{ChromaProfile, Chromagram, ChromagramBuilder, ChromagramError};

/// Key estimation.
pub use key::{
    Key, KeyDetector, KeyError, KeyEstimator, KeyEstimatorBuilder, KeyProfile, KeyResult, Mode,
};

/// Frequency to note mapping.
pub use note::{map_frequency, NoteName, NoteResult, TuningStatus};

/// Fundamental frequency tracking.
pub use pitch::{PitchError, PitchTracker, PitchTrackerBuilder};

/// Input normalization.
pub use signal::{AudioBuffer, Normalizer, NormalizerBuilder, Sample, SignalError};

/// Waveform rendering.
pub use waveform::{RenderError, WaveformRenderer, WaveformRendererBuilder};

/// Analysis orchestration module.
pub mod analyzer;

/// Diatonic chord module.
pub mod chords;

/// Chromagram computation module.
pub mod chromagram;

/// Key detection module.
pub mod key;

/// Note mapping module.
pub mod note;

/// Pitch detection module.
pub mod pitch;

/// Signal normalization module.
pub mod signal;

/// Waveform rendering module.
pub mod waveform;

/// Analyse a buffer with default settings.
pub fn analyze(buffer: &AudioBuffer) -> Analysis {
    Analyzer::default().analyze(buffer)
}

/// Render a waveform with default settings.
pub fn render_waveform(buffer: &AudioBuffer, labels: &[&str]) -> Result<Vec<u8>, RenderError> {
    WaveformRenderer::default().render(buffer, labels)
}
