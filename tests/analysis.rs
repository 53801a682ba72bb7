//! End-to-end analysis: determinism, thread sharing and the text report.

mod common;

use common::{buffer, midi_to_hz, mix, sine, SAMPLE_RATE};
use lazy_static::lazy_static;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tune_trainer::{
    analyze, diatonic_triads, Analysis, Analyzer, AnalyzerBuilder, AnalyzerError, AudioBuffer,
    Key, KeyEstimatorBuilder, KeyProfile, KeyResult, Mode, NoteName, Normalizer,
    PitchTrackerBuilder, TuningStatus,
};

lazy_static! {
    static ref ANALYZER: Analyzer = Analyzer::default();
    static ref CLIPS: Vec<AudioBuffer> = {
        let mut clips: Vec<AudioBuffer> = [82.41f32, 196.0, 440.0, 880.0]
            .iter()
            .map(|&f| buffer(sine(f, 1.5, SAMPLE_RATE, 0.7), SAMPLE_RATE))
            .collect();
        let c_major: Vec<f32> = [60, 64, 67].into_iter().map(midi_to_hz).collect();
        clips.push(buffer(mix(&c_major, 1.5, SAMPLE_RATE), SAMPLE_RATE));
        clips.push(buffer(vec![0.0; SAMPLE_RATE as usize], SAMPLE_RATE));
        clips
    };
}

#[test]
fn in_tune_a4_is_fully_reported() {
    let buf = buffer(sine(440.0, 2.0, SAMPLE_RATE, 0.8), SAMPLE_RATE);
    let analysis = ANALYZER.analyze(&buf);

    let note = analysis.note.expect("A4 should be detected");
    assert_eq!(note.label(), "A4");
    assert_eq!(analysis.tuning, Some(TuningStatus::InTune));
    assert_eq!(analysis.chords[0].root, analysis.key.key.root);

    let report = analysis.to_string();
    assert!(report.contains("Detected Note: A4"), "{report}");
    assert!(report.contains("Target Note Frequency: 440.00 Hz"), "{report}");
    assert!(report.contains("Tuning Status: Perfectly in tune!"), "{report}");
    assert!(report.contains("Key: "), "{report}");
    assert!(report.contains("Chords: "), "{report}");
}

#[test]
fn detuned_tone_is_reported_sharp() {
    let freq = 440.0 * 2f32.powf(20.0 / 1200.0);
    let buf = buffer(sine(freq, 2.0, SAMPLE_RATE, 0.8), SAMPLE_RATE);
    let analysis = analyze(&buf);

    assert_eq!(analysis.note.map(|n| n.name), Some(NoteName::A));
    match analysis.tuning {
        Some(TuningStatus::Sharp(c)) => assert!((c - 20.0).abs() < 10.0, "{c} cents"),
        other => panic!("expected sharp, got {other:?}"),
    }
}

#[test]
fn silence_has_no_pitch_but_still_a_key() {
    let buf = buffer(vec![0.0; SAMPLE_RATE as usize], SAMPLE_RATE);
    let analysis = ANALYZER.analyze(&buf);

    let c_major = Key::new(NoteName::C, Mode::Major);
    assert_eq!(
        analysis,
        Analysis {
            pitch_hz: None,
            note: None,
            tuning: None,
            key: KeyResult {
                key: c_major,
                confidence: 0.0,
            },
            chords: diatonic_triads(c_major),
        }
    );
    assert_eq!(analysis.labels(), ["C Major"]);
    assert_eq!(
        analysis.to_string(),
        "No clear pitch detected. Try a sustained tone or single note.\n\
         Key: C Major (confidence 0.00)\n\
         Chords: C Dm Em F G Am Bdim"
    );
}

#[test]
fn analysis_is_deterministic() {
    for clip in CLIPS.iter() {
        assert_eq!(ANALYZER.analyze(clip), ANALYZER.analyze(clip));
    }
}

#[test]
fn concurrent_analyses_match_sequential_ones() {
    let sequential: Vec<Analysis> = CLIPS.iter().map(|c| ANALYZER.analyze(c)).collect();
    let parallel: Vec<Analysis> = CLIPS.par_iter().map(|c| ANALYZER.analyze(c)).collect();
    assert_eq!(sequential, parallel);
}

#[test]
fn labels_carry_note_then_key() {
    let c_major: Vec<f32> = [72, 76, 79, 74, 77, 81, 83]
        .into_iter()
        .map(midi_to_hz)
        .collect();
    let mut samples = sine(midi_to_hz(72), 2.0, SAMPLE_RATE, 0.8);
    samples.extend(mix(&c_major, 2.0, SAMPLE_RATE));
    let buf = Normalizer::default().mono(&samples, SAMPLE_RATE).unwrap();

    let analysis = ANALYZER.analyze(&buf);
    assert_eq!(analysis.key.key, Key::new(NoteName::C, Mode::Major));

    let labels = analysis.labels();
    assert_eq!(labels.last().map(String::as_str), Some("C Major"));
    if let Some(note) = analysis.note {
        assert_eq!(labels[0], note.label());
    }
}

#[test]
fn components_are_configurable() {
    let analyzer = AnalyzerBuilder::new()
        .pitch_tracker(PitchTrackerBuilder::new().fmin(100.0).fmax(1000.0))
        .key_estimator(
            KeyEstimatorBuilder::new()
                .window_secs(10.0)
                .profile(KeyProfile::KrumhanslKessler),
        )
        .in_tune_tolerance_cents(30.0)
        .build()
        .unwrap();

    assert_eq!(analyzer.key_estimator().window_secs(), 10.0);
    assert_eq!(
        analyzer.key_estimator().detector().profile(),
        KeyProfile::KrumhanslKessler
    );

    let freq = 440.0 * 2f32.powf(20.0 / 1200.0);
    let buf = buffer(sine(freq, 1.0, SAMPLE_RATE, 0.8), SAMPLE_RATE);
    assert_eq!(analyzer.analyze(&buf).tuning, Some(TuningStatus::InTune));

    // Below the configured fmin there is nothing to find.
    let low = buffer(sine(55.0, 1.0, SAMPLE_RATE, 0.8), SAMPLE_RATE);
    assert_ne!(
        analyzer.analyze(&low).note.map(|n| n.label()),
        Some("A1".to_string())
    );
}

#[test]
fn invalid_configuration_is_reported() {
    assert!(matches!(
        Analyzer::builder().in_tune_tolerance_cents(-1.0).build(),
        Err(AnalyzerError::Configuration(_))
    ));
    assert!(matches!(
        Analyzer::builder()
            .pitch_tracker(PitchTrackerBuilder::new().hop_length(0))
            .build(),
        Err(AnalyzerError::Pitch(_))
    ));
    assert!(matches!(
        Analyzer::builder()
            .key_estimator(KeyEstimatorBuilder::new().window_secs(0.0))
            .build(),
        Err(AnalyzerError::Chromagram(_))
    ));
}
