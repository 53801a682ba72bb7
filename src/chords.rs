//! Chords
//!
//! Diatonic triads of a major or natural minor key, in scale-degree order.

use std::fmt::{self, Display};

use crate::key::{Key, Mode, MAJOR_DEGREES, MINOR_DEGREES};
use crate::note::NoteName;

/// Number of scale degrees
const NUM_DEGREES: usize = 7;

/// Triad qualities on each major scale degree (I ii iii IV V vi vii°)
const MAJOR_QUALITIES: [ChordKind; NUM_DEGREES] = [
    ChordKind::Major,
    ChordKind::Minor,
    ChordKind::Minor,
    ChordKind::Major,
    ChordKind::Major,
    ChordKind::Minor,
    ChordKind::Diminished,
];

/// Triad qualities on each natural minor scale degree (i ii° III iv v VI VII)
const MINOR_QUALITIES: [ChordKind; NUM_DEGREES] = [
    ChordKind::Minor,
    ChordKind::Diminished,
    ChordKind::Major,
    ChordKind::Minor,
    ChordKind::Minor,
    ChordKind::Major,
    ChordKind::Major,
];

/// Triad qualities that occur diatonically
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChordKind {
    /// Major triad (e.g., C-E-G)
    Major,
    /// Minor triad (e.g., C-Eb-G)
    Minor,
    /// Diminished triad (e.g., C-Eb-Gb)
    Diminished,
}

impl ChordKind {
    /// Label suffix: `""`, `"m"` or `"dim"`.
    pub const fn suffix(self) -> &'static str {
        match self {
            ChordKind::Major => "",
            ChordKind::Minor => "m",
            ChordKind::Diminished => "dim",
        }
    }

    /// Intervals (in semitones) above the root.
    pub const fn intervals(self) -> [usize; 3] {
        match self {
            ChordKind::Major => [0, 4, 7],
            ChordKind::Minor => [0, 3, 7],
            ChordKind::Diminished => [0, 3, 6],
        }
    }
}

impl Display for ChordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A triad: root plus quality.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Chord {
    /// The root note of the chord.
    pub root: NoteName,
    /// The quality of the chord.
    pub quality: ChordKind,
}

impl Chord {
    /// Pitch classes of the chord, root first.
    pub fn notes(&self) -> [NoteName; 3] {
        self.quality
            .intervals()
            .map(|i| self.root.transpose(i as i32))
    }
}

impl Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.root, self.quality.suffix())
    }
}

/// The seven diatonic triads of a key, in scale-degree order.
pub type ChordList = [Chord; NUM_DEGREES];

/// Diatonic triads of `key`, tonic first.
pub fn diatonic_triads(key: Key) -> ChordList {
    let (degrees, qualities) = match key.mode {
        Mode::Major => (MAJOR_DEGREES, MAJOR_QUALITIES),
        Mode::Minor => (MINOR_DEGREES, MINOR_QUALITIES),
    };
    let mut chords = [Chord {
        root: key.root,
        quality: ChordKind::Major,
    }; NUM_DEGREES];
    for ((chord, degree), quality) in chords.iter_mut().zip(degrees).zip(qualities) {
        *chord = Chord {
            root: key.root.transpose(degree as i32),
            quality,
        };
    }
    chords
}

/// Chord labels of `key`, e.g. `["C", "Dm", "Em", "F", "G", "Am", "Bdim"]`.
pub fn diatonic_labels(key: Key) -> Vec<String> {
    diatonic_triads(key).iter().map(Chord::to_string).collect()
}
