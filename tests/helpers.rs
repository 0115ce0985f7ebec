//! Test helper utilities for generating synthetic Q.15 I/Q streams
//! and driving a filter over chunked sample buffers.

use std::f64::consts::PI;

use num_complex::Complex;

use decimato::{DirectFir, Error, SampleBuf};

/// Generate a complex tone in Q.15, truncated the way a 16-bit
/// capture front-end would deliver it.
///
/// # Arguments
/// * `frequency` - Tone frequency in Hz (negative spins the other way)
/// * `sample_rate` - Sample rate in Hz
/// * `amplitude` - Peak amplitude in Q.15 counts
/// * `num_samples` - Number of samples to generate
pub fn tone_q15(
    frequency: f64,
    sample_rate: u32,
    amplitude: f64,
    num_samples: usize,
) -> Vec<Complex<i16>> {
    let angular = 2.0 * PI * frequency / f64::from(sample_rate);
    (0..num_samples)
        .map(|n| {
            let phase = angular * n as f64;
            Complex::new(
                (phase.cos() * amplitude) as i16,
                (phase.sin() * amplitude) as i16,
            )
        })
        .collect()
}

/// A constant stream of one complex value.
pub fn constant_q15(value: Complex<i16>, num_samples: usize) -> Vec<Complex<i16>> {
    vec![value; num_samples]
}

/// A deterministic wideband exercise stream: two incommensurate tones
/// plus a sawtooth, so every tap position sees distinct values.
pub fn exercise_stream(num_samples: usize) -> Vec<Complex<i16>> {
    (0..num_samples)
        .map(|n| {
            let a = (2.0 * PI * 0.0137 * n as f64).sin() * 9000.0;
            let b = (2.0 * PI * 0.1711 * n as f64).cos() * 7000.0;
            let saw = f64::from((n % 41) as i16) * 80.0 - 1640.0;
            Complex::new((a + saw) as i16, (b - saw) as i16)
        })
        .collect()
}

/// Split `input` into buffers of the given sizes (cycled until the
/// input is exhausted), push them through `fir`, draining as needed,
/// and return everything produced.
///
/// Chunk sizes must be non-zero and at least the filter's tap count,
/// so that the two held buffers always cover one convolution span.
pub fn run_chunked(
    fir: &mut DirectFir,
    input: &[Complex<i16>],
    chunk_sizes: &[usize],
) -> Vec<Complex<i16>> {
    assert!(!chunk_sizes.is_empty());

    let mut produced = Vec::new();
    let mut scratch = vec![Complex::new(0i16, 0); 32];
    let mut sizes = chunk_sizes.iter().copied().cycle();

    let mut pos = 0;
    while pos < input.len() {
        let take = sizes.next().unwrap().min(input.len() - pos);
        assert!(take > 0, "chunk sizes must be non-zero");
        let mut pending = Some(SampleBuf::new(input[pos..pos + take].to_vec()));
        pos += take;

        while let Some(buf) = pending.take() {
            match fir.push(buf) {
                Ok(()) => {}
                Err(Error::Busy(buf)) => {
                    let drained = drain(fir, &mut scratch, &mut produced);
                    assert!(drained > 0, "filter is full but cannot produce output");
                    pending = Some(buf);
                }
                Err(err) => panic!("unexpected push error: {err}"),
            }
        }
        drain(fir, &mut scratch, &mut produced);
    }
    drain(fir, &mut scratch, &mut produced);

    produced
}

fn drain(
    fir: &mut DirectFir,
    scratch: &mut [Complex<i16>],
    produced: &mut Vec<Complex<i16>>,
) -> usize {
    let mut total = 0;
    loop {
        let n = fir.process(scratch);
        produced.extend_from_slice(&scratch[..n]);
        total += n;
        if n < scratch.len() {
            return total;
        }
    }
}

/// Direct-form reference: one inner product per decimation offset that
/// fits entirely inside `input`, with the same Q.30 accumulation and
/// Q.15 narrowing as the engine.
pub fn reference_fir(
    input: &[Complex<i16>],
    taps: &[Complex<i16>],
    decimation: usize,
) -> Vec<Complex<i16>> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset + taps.len() <= input.len() {
        let mut acc_re: i32 = 0;
        let mut acc_im: i32 = 0;
        for (k, c) in taps.iter().enumerate() {
            let s = input[offset + k];
            acc_re += i32::from(c.re) * i32::from(s.re) - i32::from(c.im) * i32::from(s.im);
            acc_im += i32::from(s.im) * i32::from(c.re) + i32::from(s.re) * i32::from(c.im);
        }
        out.push(Complex::new(round_q15(acc_re), round_q15(acc_im)));
        offset += decimation;
    }
    out
}

/// Round a Q.30 value half-up to Q.15 and saturate to 16 bits.
pub fn round_q15(x: i32) -> i16 {
    ((x + (1 << 14)) >> 15).clamp(-32768, 32767) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_q15_starts_on_the_real_axis() {
        let samples = tone_q15(1000.0, 96_000, 20000.0, 4);
        assert_eq!(samples[0], Complex::new(20000, 0));
    }

    #[test]
    fn exercise_stream_is_deterministic() {
        assert_eq!(exercise_stream(64), exercise_stream(64));
    }

    #[test]
    fn reference_fir_counts_valid_offsets() {
        let taps = vec![Complex::new(32767i16, 0); 4];
        let input = exercise_stream(10);
        assert_eq!(reference_fir(&input, &taps, 2).len(), 4);
    }
}
