//! Key
//!
//! Major/minor key estimation by cosine similarity between a chroma profile
//! and diatonic scale masks rotated over all 12 tonics.

use std::fmt::{self, Display};
use std::str::FromStr;
use thiserror::Error;

use crate::chromagram::{ChromaProfile, Chromagram, ChromagramBuilder, ChromagramError};
use crate::note::{NoteName, SEMITONES};
use crate::signal::AudioBuffer;

/// Seconds of audio, from the start of the clip, used for key estimation.
pub const DEFAULT_KEY_WINDOW_SECS: f32 = 30.0;

/// Total number of candidate keys (tonic × mode)
const NUM_KEYS: usize = SEMITONES * 2;

/// Major scale degrees, in semitones above the tonic.
pub(crate) const MAJOR_DEGREES: [usize; 7] = [0, 2, 4, 5, 7, 9, 11];
/// Natural minor scale degrees, in semitones above the tonic.
pub(crate) const MINOR_DEGREES: [usize; 7] = [0, 2, 3, 5, 7, 8, 10];

/// Errors when detecting or parsing keys
#[derive(Debug, Error, PartialEq)]
pub enum KeyError {
    /// The chromagram provided did not have the expected number of semitones.
    #[error("expected a {expected}-bin chromagram, got {got}")]
    InvalidLength {
        /// The expected number of semitones (12).
        expected: usize,
        /// The actual number of semitones provided.
        got: usize,
    },

    /// A key label could not be parsed.
    #[error("invalid key name `{0}`")]
    InvalidKeyName(String),
}

/// Major or (natural) minor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Ionian.
    Major,
    /// Aeolian.
    Minor,
}

impl Mode {
    /// Scale degrees of this mode, in semitones above the tonic.
    pub const fn degrees(self) -> [usize; 7] {
        match self {
            Mode::Major => MAJOR_DEGREES,
            Mode::Minor => MINOR_DEGREES,
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A tonic plus a mode, e.g. A minor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Key {
    /// Tonic pitch class.
    pub root: NoteName,
    /// Major or minor.
    pub mode: Mode,
}

impl Key {
    /// Construct a key.
    pub const fn new(root: NoteName, mode: Mode) -> Self {
        Key { root, mode }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.root, self.mode)
    }
}

impl FromStr for Key {
    type Err = KeyError;

    /// Accepts `"C Major"`, `"a minor"`, `"F#maj"`, `"Bbm"` and a bare tonic
    /// (major).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || KeyError::InvalidKeyName(s.to_string());
        let trimmed = s.trim();
        let split = trimmed
            .char_indices()
            .skip(1)
            .find(|&(_, c)| !matches!(c, '#' | 'b' | '♯' | '♭'))
            .map_or(trimmed.len(), |(i, _)| i);
        let (root, mode) = trimmed.split_at(split);

        let root = root.parse::<NoteName>().map_err(|_| invalid())?;
        let mode = match mode.trim() {
            "M" => Mode::Major,
            "m" => Mode::Minor,
            other => match other.to_ascii_lowercase().as_str() {
                "" | "major" | "maj" => Mode::Major,
                "minor" | "min" => Mode::Minor,
                _ => return Err(invalid()),
            },
        };
        Ok(Key { root, mode })
    }
}

/// The best-matching key and how well it matched.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct KeyResult {
    /// The detected key.
    pub key: Key,
    /// Cosine similarity with the key's template, in `[-1, 1]`.
    pub confidence: f32,
}

impl Display for KeyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2})", self.key, self.confidence)
    }
}

/// Krumhansl-Kessler probe-tone ratings, major, tonic first
const KK_MAJOR: [f32; SEMITONES] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Kessler probe-tone ratings, minor, tonic first
const KK_MINOR: [f32; SEMITONES] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Tonal templates the chroma profile is matched against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum KeyProfile {
    /// Binary diatonic masks: major {0,2,4,5,7,9,11}, natural minor
    /// {0,2,3,5,7,8,10}. A major key and its relative minor share a mask, so
    /// they always tie and the major key is reported.
    #[default]
    ScaleMask,
    /// Krumhansl-Kessler probe-tone profiles, which weight the tonic triad
    /// and can tell relative keys apart.
    KrumhanslKessler,
}

impl KeyProfile {
    /// Unrotated template (tonic = C) for a mode.
    pub fn template(self, mode: Mode) -> [f32; SEMITONES] {
        match self {
            KeyProfile::ScaleMask => {
                let mut mask = [0.0; SEMITONES];
                for off in mode.degrees() {
                    mask[off] = 1.0;
                }
                mask
            }
            KeyProfile::KrumhanslKessler => match mode {
                Mode::Major => KK_MAJOR,
                Mode::Minor => KK_MINOR,
            },
        }
    }
}

/// Precomputed unit-norm rotated template
#[derive(Copy, Clone)]
struct PrecalcTemplate {
    key: Key,
    weights: [f32; SEMITONES],
}

/// Scores chroma profiles against 24 rotated major/minor templates.
#[derive(Clone)]
pub struct KeyDetector {
    profile: KeyProfile,
    templates: [PrecalcTemplate; NUM_KEYS],
}

impl KeyDetector {
    /// Create a detector with the diatonic major and natural minor masks.
    pub fn new() -> Self {
        Self::with_profile(KeyProfile::ScaleMask)
    }

    /// Create a detector with the given templates.
    pub fn with_profile(profile: KeyProfile) -> Self {
        let blank = PrecalcTemplate {
            key: Key::new(NoteName::C, Mode::Major),
            weights: [0.0; SEMITONES],
        };
        let mut templates = [blank; NUM_KEYS];

        // Enumeration order doubles as the tie-break:
        // C..B major, then C..B minor.
        for (mode_idx, mode) in [Mode::Major, Mode::Minor].into_iter().enumerate() {
            let base = unit_vector(&profile.template(mode));
            for (root_idx, root) in NoteName::ALL.iter().enumerate() {
                let t = &mut templates[mode_idx * SEMITONES + root_idx];
                t.key = Key::new(*root, mode);
                for (off, &w) in base.iter().enumerate() {
                    t.weights[(root_idx + off) % SEMITONES] = w;
                }
            }
        }

        KeyDetector { profile, templates }
    }

    /// The templates in use.
    pub fn profile(&self) -> KeyProfile {
        self.profile
    }

    /// Best key for a chroma profile.
    ///
    /// Ties keep the first key in enumeration order (C major ... B major,
    /// then C minor ... B minor). A silent profile scores 0 everywhere and
    /// yields C major with confidence 0.
    pub fn detect(&self, chroma: &ChromaProfile) -> KeyResult {
        let unit = unit_vector(chroma.energies());
        let mut best = KeyResult {
            key: self.templates[0].key,
            confidence: score(&unit, &self.templates[0]),
        };
        for t in &self.templates[1..] {
            let s = score(&unit, t);
            if s > best.confidence {
                best = KeyResult {
                    key: t.key,
                    confidence: s,
                };
            }
        }
        best
    }

    /// Detect from a chromagram slice.
    ///
    /// Returns `Err(KeyError::InvalidLength)` if `chroma.len() != 12`.
    pub fn detect_slice(&self, chroma: &[f32]) -> Result<KeyResult, KeyError> {
        let bins: [f32; SEMITONES] = chroma.try_into().map_err(|_| KeyError::InvalidLength {
            expected: SEMITONES,
            got: chroma.len(),
        })?;
        Ok(self.detect(&ChromaProfile::new(bins)))
    }

    /// All 24 keys, best first. Equal scores keep enumeration order.
    pub fn rank(&self, chroma: &ChromaProfile) -> Vec<KeyResult> {
        let unit = unit_vector(chroma.energies());
        let mut ranked: Vec<KeyResult> = self
            .templates
            .iter()
            .map(|t| KeyResult {
                key: t.key,
                confidence: score(&unit, t),
            })
            .collect();
        ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        ranked
    }
}

impl Default for KeyDetector {
    fn default() -> Self {
        KeyDetector::new()
    }
}

/// Cosine similarity of a unit chroma vector with a unit template
#[inline(always)]
fn score(unit_chroma: &[f32; SEMITONES], t: &PrecalcTemplate) -> f32 {
    unit_chroma
        .iter()
        .zip(&t.weights)
        .map(|(c, w)| c * w)
        .sum()
}

fn unit_vector(v: &[f32; SEMITONES]) -> [f32; SEMITONES] {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        (*v).map(|x| x / norm)
    } else {
        [0.0; SEMITONES]
    }
}

/// Builder for a [`KeyEstimator`].
#[derive(Debug, Clone)]
pub struct KeyEstimatorBuilder {
    chromagram: ChromagramBuilder,
    profile: KeyProfile,
    window_secs: f32,
}

impl KeyEstimatorBuilder {
    /// Start with default parameters: default chromagram, scale-mask
    /// templates, window_secs = 30.0.
    pub fn new() -> Self {
        KeyEstimatorBuilder {
            chromagram: ChromagramBuilder::new(),
            profile: KeyProfile::ScaleMask,
            window_secs: DEFAULT_KEY_WINDOW_SECS,
        }
    }

    /// Select the tonal templates.
    pub fn profile(mut self, profile: KeyProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Replace the chromagram configuration.
    pub fn chromagram(mut self, builder: ChromagramBuilder) -> Self {
        self.chromagram = builder;
        self
    }

    /// Set how many leading seconds of the clip are analysed.
    pub fn window_secs(mut self, secs: f32) -> Self {
        self.window_secs = secs;
        self
    }

    /// Finalize and create the KeyEstimator.
    pub fn build(self) -> Result<KeyEstimator, ChromagramError> {
        if !(self.window_secs.is_finite() && self.window_secs > 0.0) {
            return Err(ChromagramError::Configuration(format!(
                "window_secs must be positive, got {}",
                self.window_secs
            )));
        }
        Ok(KeyEstimator {
            chromagram: self.chromagram.build()?,
            detector: KeyDetector::with_profile(self.profile),
            window_secs: self.window_secs,
        })
    }
}

impl Default for KeyEstimatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Chroma extraction plus key detection over the head of a buffer.
#[derive(Clone)]
pub struct KeyEstimator {
    chromagram: Chromagram,
    detector: KeyDetector,
    window_secs: f32,
}

impl KeyEstimator {
    /// Start customizing with a builder.
    pub fn builder() -> KeyEstimatorBuilder {
        KeyEstimatorBuilder::new()
    }

    /// Seconds of audio analysed.
    pub fn window_secs(&self) -> f32 {
        self.window_secs
    }

    /// The underlying detector.
    pub fn detector(&self) -> &KeyDetector {
        &self.detector
    }

    /// Chroma profile of the analysed window.
    pub fn chroma(&self, buffer: &AudioBuffer) -> ChromaProfile {
        let mut chromagram = self.chromagram.clone();
        chromagram.profile_of(buffer.head(self.window_secs), buffer.sample_rate())
    }

    /// Best-matching key for the analysed window.
    ///
    /// There is no silence threshold: a window without spectral energy scores
    /// 0 against every template and yields C major with confidence 0.
    pub fn estimate(&self, buffer: &AudioBuffer) -> KeyResult {
        let chroma = self.chroma(buffer);
        if chroma.total() <= 0.0 {
            log::warn!("key: no pitch-class energy in the analysed window");
        }
        let result = self.detector.detect(&chroma);
        log::debug!("key: {} (score {:.3})", result.key, result.confidence);
        result
    }
}

impl Default for KeyEstimator {
    fn default() -> Self {
        KeyEstimator {
            chromagram: Chromagram::default(),
            detector: KeyDetector::new(),
            window_secs: DEFAULT_KEY_WINDOW_SECS,
        }
    }
}
