//! Synthetic signal fixtures shared by the integration tests.

#![allow(dead_code)]

use std::f64::consts::TAU;
use tune_trainer::AudioBuffer;

pub const SAMPLE_RATE: u32 = 22_050;

/// `secs` seconds of a sine at `freq` Hz, amplitude `amp`.
pub fn sine(freq: f32, secs: f32, sample_rate: u32, amp: f32) -> Vec<f32> {
    let n = (secs * sample_rate as f32) as usize;
    let step = TAU * freq as f64 / sample_rate as f64;
    (0..n)
        .map(|i| amp * ((step * i as f64) % TAU).sin() as f32)
        .collect()
}

/// Equal-amplitude sum of sines, scaled to stay inside [-1, 1].
pub fn mix(freqs: &[f32], secs: f32, sample_rate: u32) -> Vec<f32> {
    let n = (secs * sample_rate as f32) as usize;
    let amp = 0.9 / freqs.len() as f32;
    let mut out = vec![0.0f32; n];
    for &f in freqs {
        for (acc, s) in out.iter_mut().zip(sine(f, secs, sample_rate, amp)) {
            *acc += s;
        }
    }
    out
}

/// Frequency of a MIDI note number (A4 = 69 = 440 Hz).
pub fn midi_to_hz(midi: i32) -> f32 {
    440.0 * 2f32.powf((midi - 69) as f32 / 12.0)
}

pub fn buffer(samples: Vec<f32>, sample_rate: u32) -> AudioBuffer {
    AudioBuffer::from_mono(samples, sample_rate).unwrap()
}

pub fn assert_close(actual: f32, expected: f32, rel: f32, what: &str) {
    let err = (actual - expected).abs() / expected.abs();
    assert!(
        err <= rel,
        "{what}: expected {expected}, got {actual} (relative error {err:.5})"
    );
}
