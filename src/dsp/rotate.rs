//! Q.15 phase derotation for offset channel extraction.
//!
//! A [`Derotator`] multiplies each produced output sample by a
//! unit-magnitude complex phasor and then advances that phasor by a
//! fixed per-sample increment, shifting the output spectrum by a
//! constant frequency without any per-sample trigonometry. The phasor
//! is kept in Q.15 and re-multiplied every step, trading a tiny
//! long-term magnitude drift for a branchless update; callers that
//! need exact phase stability over very long runs re-construct the
//! filter periodically.

use std::f64::consts::PI;

use num_complex::Complex;
use tracing::debug;

use crate::dsp::q15::{cmul_q15_q15, cmul_q15_q30, Q15_ONE};

/// Rotates output samples by `exp(-j·ω·decimation·k)`, where
/// `ω = 2π·freq_shift/sample_rate` and `k` counts produced samples.
///
/// The increment absorbs the decimation factor so that one complex
/// multiply per *output* sample tracks the phase the shift would have
/// accumulated over `decimation` *input* samples.
#[derive(Debug, Clone)]
pub struct Derotator {
    /// Current phasor, Q.15. Unit magnitude can reach `Q15_ONE`
    /// exactly, which does not fit an `i16`, so state stays in `i32`.
    phase_re: i32,
    phase_im: i32,
    /// Per-output-sample step, Q.15.
    incr_re: i32,
    incr_im: i32,
    /// Rotations applied since construction.
    count: u64,
}

impl Derotator {
    /// Build a derotator for the given shift.
    ///
    /// `sample_rate_hz` is the *input* rate; the per-output increment
    /// is scaled by `decimation` internally. A negative
    /// `freq_shift_hz` rotates the spectrum upward.
    pub fn new(sample_rate_hz: u32, freq_shift_hz: i32, decimation: usize) -> Self {
        debug_assert!(sample_rate_hz > 0);
        let fwt0 = 2.0 * PI * f64::from(freq_shift_hz) / f64::from(sample_rate_hz);
        let incr = Complex::from_polar(1.0, -fwt0 * decimation as f64);
        let incr_re = (incr.re * f64::from(Q15_ONE)) as i32;
        let incr_im = (incr.im * f64::from(Q15_ONE)) as i32;
        debug!(
            "derotation increment: {:.6}{:+.6}j ({:#010x}, {:#010x})",
            incr.re, incr.im, incr_re, incr_im
        );
        Self {
            phase_re: Q15_ONE,
            phase_im: 0,
            incr_re,
            incr_im,
            count: 0,
        }
    }

    /// Rotate one Q.15 sample by the current phasor, then step the
    /// phasor for the next sample.
    ///
    /// The rotated value is returned in Q.30; the caller narrows it at
    /// the output boundary.
    #[inline]
    pub fn apply(&mut self, re: i32, im: i32) -> (i32, i32) {
        let out = cmul_q15_q30(re, im, self.phase_re, self.phase_im);

        let (phase_re, phase_im) =
            cmul_q15_q15(self.phase_re, self.phase_im, self.incr_re, self.incr_im);
        self.phase_re = phase_re;
        self.phase_im = phase_im;
        self.count += 1;

        out
    }

    /// Number of rotations applied since construction.
    pub fn count(&self) -> u64 {
        self.count
    }
}
