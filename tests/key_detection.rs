//! Chroma extraction, key detection and diatonic chord suggestions.

mod common;

use common::{buffer, midi_to_hz, mix, sine, SAMPLE_RATE};
use lazy_static::lazy_static;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tune_trainer::{
    diatonic_labels, diatonic_triads, ChordKind, ChromaProfile, Chromagram, ChromagramBuilder,
    Key, KeyDetector, KeyError, KeyEstimator, KeyEstimatorBuilder, KeyProfile, Mode, NoteName,
};

lazy_static! {
    static ref DETECTOR: KeyDetector = KeyDetector::new();
    static ref KK_DETECTOR: KeyDetector = KeyDetector::with_profile(KeyProfile::KrumhanslKessler);
}

/// Template for `mode` rotated onto `root`.
fn rotated(profile: KeyProfile, root: usize, mode: Mode) -> ChromaProfile {
    let base = profile.template(mode);
    let mut bins = [0.0; 12];
    for (off, w) in base.iter().enumerate() {
        bins[(root + off) % 12] = *w;
    }
    ChromaProfile::new(bins)
}

#[test]
fn major_mask_detects_its_own_key_at_every_root() {
    let failures: Vec<String> = (0..12usize)
        .into_par_iter()
        .filter_map(|root| {
            let result = DETECTOR.detect(&rotated(KeyProfile::ScaleMask, root, Mode::Major));
            let expected = Key::new(NoteName::ALL[root], Mode::Major);
            if result.key == expected && (result.confidence - 1.0).abs() < 1e-5 {
                None
            } else {
                Some(format!("expected {expected}, got {result}"))
            }
        })
        .collect();

    assert!(failures.is_empty(), "{}", failures.join("\n"));
}

#[test]
fn minor_mask_resolves_to_its_relative_major() {
    for root in 0..12 {
        let result = DETECTOR.detect(&rotated(KeyProfile::ScaleMask, root, Mode::Minor));
        assert_eq!(
            result.key,
            Key::new(NoteName::ALL[root].transpose(3), Mode::Major),
            "minor mask at {}",
            NoteName::ALL[root]
        );
        assert!((result.confidence - 1.0).abs() < 1e-5);
    }
}

#[test]
fn krumhansl_profiles_tell_relative_keys_apart() {
    for root in 0..12 {
        for mode in [Mode::Major, Mode::Minor] {
            let result = KK_DETECTOR.detect(&rotated(KeyProfile::KrumhanslKessler, root, mode));
            assert_eq!(result.key, Key::new(NoteName::ALL[root], mode));
            assert!((result.confidence - 1.0).abs() < 1e-5);
        }
    }
    assert_eq!(KK_DETECTOR.profile(), KeyProfile::KrumhanslKessler);
}

#[test]
fn silent_profile_falls_back_to_c_major() {
    let result = DETECTOR.detect(&ChromaProfile::default());
    assert_eq!(result.key, Key::new(NoteName::C, Mode::Major));
    assert_eq!(result.confidence, 0.0);
}

#[test]
fn confidence_is_a_cosine() {
    let mut bins = [0.0; 12];
    bins[NoteName::C.index()] = 1.0;
    let result = DETECTOR.detect(&ChromaProfile::new(bins));
    assert!((result.confidence - 1.0 / 7f32.sqrt()).abs() < 1e-5);
    assert_eq!(result.key, Key::new(NoteName::C, Mode::Major));
}

#[test]
fn slice_detection_checks_the_length() {
    assert_eq!(
        DETECTOR.detect_slice(&[1.0; 11]),
        Err(KeyError::InvalidLength {
            expected: 12,
            got: 11,
        })
    );
    let ok = DETECTOR.detect_slice(&[1.0; 12]).unwrap();
    assert_eq!(ok.key, Key::new(NoteName::C, Mode::Major));
}

#[test]
fn ranking_covers_all_keys_best_first() {
    let chroma = rotated(KeyProfile::ScaleMask, NoteName::G.index(), Mode::Major);
    let ranked = DETECTOR.rank(&chroma);

    assert_eq!(ranked.len(), 24);
    assert_eq!(ranked[0], DETECTOR.detect(&chroma));
    assert!(ranked
        .windows(2)
        .all(|w| w[0].confidence >= w[1].confidence));
    // G major and E minor share a mask; enumeration order puts G major first.
    assert_eq!(ranked[1].key, Key::new(NoteName::E, Mode::Minor));
}

#[test]
fn c_major_scale_audio_is_detected() {
    // C5 D5 E5 F5 G5 A5 B5
    let scale: Vec<f32> = [72, 74, 76, 77, 79, 81, 83]
        .into_iter()
        .map(midi_to_hz)
        .collect();
    let buf = buffer(mix(&scale, 3.0, SAMPLE_RATE), SAMPLE_RATE);

    let result = KeyEstimator::default().estimate(&buf);
    assert_eq!(result.key, Key::new(NoteName::C, Mode::Major));
    assert!(result.confidence > 0.9, "confidence {}", result.confidence);
}

#[test]
fn silent_audio_estimates_c_major_with_zero_confidence() {
    let buf = buffer(vec![0.0; SAMPLE_RATE as usize], SAMPLE_RATE);
    let result = KeyEstimator::default().estimate(&buf);
    assert_eq!(result.key, Key::new(NoteName::C, Mode::Major));
    assert_eq!(result.confidence, 0.0);
    assert_eq!(
        diatonic_labels(result.key),
        ["C", "Dm", "Em", "F", "G", "Am", "Bdim"]
    );
}

#[test]
fn key_window_limits_the_analysed_audio() {
    // One second of A, then nine of F#: only the A survives a 1 s window.
    let mut samples = sine(440.0, 1.0, SAMPLE_RATE, 0.8);
    samples.extend(sine(739.99, 9.0, SAMPLE_RATE, 0.8));
    let buf = buffer(samples, SAMPLE_RATE);

    let estimator = KeyEstimatorBuilder::new().window_secs(1.0).build().unwrap();
    assert_eq!(estimator.window_secs(), 1.0);
    assert_eq!(estimator.chroma(&buf).dominant(), NoteName::A);
    assert_eq!(KeyEstimator::default().chroma(&buf).dominant(), NoteName::Fs);
}

#[test]
fn chroma_of_a_pure_tone_peaks_on_its_pitch_class() {
    let buf = buffer(sine(440.0, 1.0, SAMPLE_RATE, 0.8), SAMPLE_RATE);
    let mut chromagram = Chromagram::default();
    let profile = chromagram.profile(&buf);

    assert_eq!(profile.dominant(), NoteName::A);
    assert!(profile[NoteName::A] > 0.8 * profile.total());

    let short = sine(440.0, 0.05, SAMPLE_RATE, 0.8);
    assert_eq!(chromagram.frames(&short, SAMPLE_RATE).len(), 1);
}

#[test]
fn invalid_chromagram_settings_are_rejected() {
    assert!(ChromagramBuilder::new().window_size(1).build().is_err());
    assert!(ChromagramBuilder::new().hop_size(0).build().is_err());
    assert!(ChromagramBuilder::new().min_frequency(0.0).build().is_err());
    assert!(ChromagramBuilder::new()
        .min_frequency(500.0)
        .max_frequency(100.0)
        .build()
        .is_err());
    assert!(KeyEstimatorBuilder::new().window_secs(-1.0).build().is_err());
}

#[test]
fn keys_parse_from_labels() {
    let cases = [
        ("C Major", Key::new(NoteName::C, Mode::Major)),
        ("a minor", Key::new(NoteName::A, Mode::Minor)),
        ("F#maj", Key::new(NoteName::Fs, Mode::Major)),
        ("Bbm", Key::new(NoteName::As, Mode::Minor)),
        ("Db", Key::new(NoteName::Cs, Mode::Major)),
        ("EM", Key::new(NoteName::E, Mode::Major)),
    ];
    for (label, key) in cases {
        assert_eq!(label.parse::<Key>(), Ok(key), "{label}");
    }
    assert!("H minor".parse::<Key>().is_err());
    assert!("C dorian".parse::<Key>().is_err());

    let key = Key::new(NoteName::Gs, Mode::Minor);
    assert_eq!(key.to_string(), "G# Minor");
    assert_eq!(key.to_string().parse::<Key>(), Ok(key));
}

#[test]
fn major_keys_get_their_diatonic_triads() {
    let c = Key::new(NoteName::C, Mode::Major);
    assert_eq!(diatonic_labels(c), ["C", "Dm", "Em", "F", "G", "Am", "Bdim"]);

    let fs = Key::new(NoteName::Fs, Mode::Major);
    assert_eq!(
        diatonic_labels(fs),
        ["F#", "G#m", "A#m", "B", "C#", "D#m", "Fdim"]
    );
}

#[test]
fn minor_keys_get_their_diatonic_triads() {
    let a = Key::new(NoteName::A, Mode::Minor);
    assert_eq!(diatonic_labels(a), ["Am", "Bdim", "C", "Dm", "Em", "F", "G"]);

    let e = Key::new(NoteName::E, Mode::Minor);
    assert_eq!(diatonic_labels(e), ["Em", "F#dim", "G", "Am", "Bm", "C", "D"]);
}

#[test]
fn triads_spell_their_notes() {
    let chords = diatonic_triads(Key::new(NoteName::C, Mode::Major));
    assert_eq!(chords[0].notes(), [NoteName::C, NoteName::E, NoteName::G]);
    assert_eq!(chords[1].notes(), [NoteName::D, NoteName::F, NoteName::A]);
    assert_eq!(chords[6].quality, ChordKind::Diminished);
    assert_eq!(chords[6].notes(), [NoteName::B, NoteName::D, NoteName::F]);

    // Every triad of a key stays inside its scale.
    for root in NoteName::ALL {
        for mode in [Mode::Major, Mode::Minor] {
            let key = Key::new(root, mode);
            let scale: Vec<NoteName> = mode.degrees().iter().map(|&d| root.transpose(d as i32)).collect();
            for chord in diatonic_triads(key) {
                assert!(chord.notes().iter().all(|n| scale.contains(n)), "{chord} in {key}");
            }
        }
    }
}
