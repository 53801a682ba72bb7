//! Note
//!
//! Maps a frequency onto the nearest equal-tempered note (A4 = 440 Hz) and
//! classifies how far off it is.

use std::fmt::{self, Display};
use std::str::FromStr;

pub(crate) const SEMITONES: usize = 12;

/// Deviation, in cents, below which a pitch counts as in tune.
pub const DEFAULT_IN_TUNE_TOLERANCE_CENTS: f32 = 5.0;

const A4_FREQUENCY: f64 = 440.0;
const A4_MIDI: i32 = 69;

/// Twelve chromatic pitch classes, in semitone order from C.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NoteName {
    /// C
    C,
    /// C sharp / D flat
    Cs,
    /// D
    D,
    /// D sharp / E flat
    Ds,
    /// E
    E,
    /// F
    F,
    /// F sharp / G flat
    Fs,
    /// G
    G,
    /// G sharp / A flat
    Gs,
    /// A
    A,
    /// A sharp / B flat
    As,
    /// B
    B,
}

impl NoteName {
    /// All pitch classes, index = semitone offset from C.
    pub const ALL: [NoteName; SEMITONES] = [
        NoteName::C,
        NoteName::Cs,
        NoteName::D,
        NoteName::Ds,
        NoteName::E,
        NoteName::F,
        NoteName::Fs,
        NoteName::G,
        NoteName::Gs,
        NoteName::A,
        NoteName::As,
        NoteName::B,
    ];

    const LABELS: [&'static str; SEMITONES] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];

    /// Pitch class for any semitone number; wraps in both directions, so
    /// `-1` is B and `12` is C.
    pub const fn from_index(idx: i32) -> NoteName {
        Self::ALL[idx.rem_euclid(SEMITONES as i32) as usize]
    }

    /// Semitone offset from C (0..12).
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Sharp-spelled label, e.g. `"C#"`.
    pub const fn as_str(self) -> &'static str {
        Self::LABELS[self as usize]
    }

    /// The pitch class `semitones` above this one.
    pub const fn transpose(self, semitones: i32) -> NoteName {
        Self::from_index(self as i32 + semitones)
    }
}

impl Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteName {
    type Err = String;

    /// Parses sharp or flat spellings (`"C#"`, `"Db"`, `"Bb"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        let base = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('C') => 0,
            Some('D') => 2,
            Some('E') => 4,
            Some('F') => 5,
            Some('G') => 7,
            Some('A') => 9,
            Some('B') => 11,
            _ => return Err(format!("unrecognized note name: `{s}`")),
        };
        let shift = match chars.as_str() {
            "" => 0,
            "#" | "♯" => 1,
            "b" | "♭" => -1,
            _ => return Err(format!("unrecognized note name: `{s}`")),
        };
        Ok(NoteName::from_index(base + shift))
    }
}

/// The equal-tempered note nearest to a measured frequency.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NoteResult {
    /// Pitch class of the nearest note.
    pub name: NoteName,
    /// Octave in MIDI convention (MIDI 60 = C4).
    pub octave: i32,
    /// MIDI note number of the nearest note.
    pub midi: i32,
    /// Deviation from the nearest note in cents, roughly `[-50, 50]`.
    pub cents: f32,
    /// Exact frequency of the nearest note in Hz.
    pub target_frequency: f32,
}

impl NoteResult {
    /// Map a frequency to its nearest note.
    ///
    /// Returns `None` for zero, negative or non-finite input.
    pub fn from_frequency(freq: f32) -> Option<NoteResult> {
        if !freq.is_finite() || freq <= 0.0 {
            return None;
        }

        let midi = A4_MIDI as f64 + 12.0 * (freq as f64 / A4_FREQUENCY).log2();
        let nearest = midi.round();
        let cents = (midi - nearest) * 100.0;
        let nearest = nearest as i32;
        let target = A4_FREQUENCY * 2f64.powf((nearest - A4_MIDI) as f64 / 12.0);

        Some(NoteResult {
            name: NoteName::from_index(nearest),
            octave: nearest.div_euclid(SEMITONES as i32) - 1,
            midi: nearest,
            cents: cents as f32,
            target_frequency: target as f32,
        })
    }

    /// Note label with octave, e.g. `"A#4"`.
    pub fn label(&self) -> String {
        format!("{}{}", self.name, self.octave)
    }

    /// Tuning classification using the given tolerance in cents.
    pub fn tuning(&self, tolerance_cents: f32) -> TuningStatus {
        TuningStatus::classify(self.cents, tolerance_cents)
    }
}

impl Display for NoteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.octave)
    }
}

/// Map an optional pitch estimate to a note; absence propagates.
pub fn map_frequency(freq: Option<f32>) -> Option<NoteResult> {
    freq.and_then(NoteResult::from_frequency)
}

/// How a pitch sits relative to its target note.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TuningStatus {
    /// Within tolerance.
    InTune,
    /// Above the target by this many cents.
    Sharp(f32),
    /// Below the target by this many cents (stored as a positive magnitude).
    Flat(f32),
}

impl TuningStatus {
    /// Classify a cents deviation. `|cents| < tolerance` is in tune.
    pub fn classify(cents: f32, tolerance_cents: f32) -> TuningStatus {
        if cents.abs() < tolerance_cents {
            TuningStatus::InTune
        } else if cents > 0.0 {
            TuningStatus::Sharp(cents)
        } else {
            TuningStatus::Flat(-cents)
        }
    }
}

impl Display for TuningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TuningStatus::InTune => f.write_str("Perfectly in tune!"),
            TuningStatus::Sharp(c) => write!(f, "{c:.1} cents sharp"),
            TuningStatus::Flat(c) => write!(f, "{c:.1} cents flat"),
        }
    }
}
