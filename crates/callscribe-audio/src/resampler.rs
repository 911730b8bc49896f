//! Streaming 2x band-limited upsampler.
//!
//! Polyphase half-band interpolation: the even output phase is the input
//! sample itself, the odd phase is a Kaiser-windowed sinc evaluated at the
//! half-sample point from `2 * half_taps` neighbours. The last
//! `2 * half_taps - 1` inputs carry over between calls, so the output does
//! not depend on how the input stream is split into chunks.

use std::f64::consts::PI;

const KAISER_BETA: f64 = 8.0;

pub struct Upsampler {
    half_taps: usize,
    coeffs: Vec<f32>,
    history: Vec<f32>,
    work: Vec<f32>,
}

impl Upsampler {
    pub fn new(half_taps: usize) -> Self {
        assert!(half_taps > 0, "half_taps must be non-zero");
        Self {
            half_taps,
            coeffs: design_half_band(half_taps),
            history: vec![0.0; 2 * half_taps - 1],
            work: Vec::new(),
        }
    }

    /// Group delay in input samples: output sample `2 * i` is input sample `i - delay()`.
    pub fn delay(&self) -> usize {
        self.half_taps
    }

    /// Upsample `input` into the front of `output`, returning the number of
    /// samples written (always `2 * input.len()`).
    ///
    /// # Panics
    /// If `output` is shorter than `2 * input.len()`.
    pub fn process(&mut self, input: &[i16], output: &mut [i16]) -> usize {
        let produced = input.len() * 2;
        assert!(
            output.len() >= produced,
            "output holds {} samples, {} needed",
            output.len(),
            produced
        );
        if input.is_empty() {
            return 0;
        }

        let taps = 2 * self.half_taps;
        self.work.clear();
        self.work.extend_from_slice(&self.history);
        self.work.extend(input.iter().map(|&s| s as f32));

        for (i, pair) in output[..produced].chunks_exact_mut(2).enumerate() {
            let window = &self.work[i..i + taps];
            let odd: f32 = window
                .iter()
                .zip(&self.coeffs)
                .map(|(x, c)| x * c)
                .sum();
            pair[0] = to_i16(window[self.half_taps - 1]);
            pair[1] = to_i16(odd);
        }

        self.history.clear();
        self.history.extend_from_slice(&self.work[input.len()..]);
        produced
    }

    /// Forget the filter history.
    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0.0);
    }
}

fn to_i16(sample: f32) -> i16 {
    // float-to-int `as` saturates
    sample.round() as i16
}

/// Odd-phase coefficients of a half-band lowpass, normalised to unity DC gain.
fn design_half_band(half_taps: usize) -> Vec<f32> {
    let span = half_taps as f64;
    let centre = span - 0.5;
    let norm = bessel_i0(KAISER_BETA);

    let raw: Vec<f64> = (0..2 * half_taps)
        .map(|j| {
            let d = j as f64 - centre;
            let sinc = (PI * d).sin() / (PI * d);
            let r = d / span;
            let window = bessel_i0(KAISER_BETA * (1.0 - r * r).max(0.0).sqrt()) / norm;
            sinc * window
        })
        .collect();

    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|c| (c / sum) as f32).collect()
}

/// Zeroth-order modified Bessel function of the first kind (power series).
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut sum = 1.0;
    let mut term = 1.0;
    let mut k = 1.0;
    loop {
        term *= (half / k) * (half / k);
        sum += term;
        if term < sum * 1e-12 {
            return sum;
        }
        k += 1.0;
    }
}
