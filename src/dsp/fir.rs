//! Decimating complex FIR filter over chained sample buffers.
//!
//! [`DirectFir`] is a direct-form FIR with complex Q.15 taps,
//! integrated decimation and optional phase derotation. It does not
//! keep a delay line: input stays in the producer's ref-counted
//! [`SampleBuf`] blocks, and each output sample is an inner product
//! taken in place, spanning the boundary between the active buffer
//! and the look-ahead buffer when the taps straddle it.
//!
//! The filter holds at most two buffers. Producers [`push`] one
//! reference in, the engine drops it once the read cursor has moved
//! past the buffer, and a third push is refused with
//! [`Error::Busy`] until [`process`] drains enough input.
//!
//! Each output is `sum(coeff[i] * sample[offset + i])` over the tap
//! count, accumulated in Q.30, after which the cursor advances by the
//! decimation factor. The coefficient array is applied in supplied
//! order; callers that want true convolution semantics pass their
//! impulse response pre-reversed, as usual for a direct inner
//! product.
//!
//! [`push`]: DirectFir::push
//! [`process`]: DirectFir::process
//! [`Error::Busy`]: crate::Error::Busy

use std::sync::Arc;

use num_complex::Complex;
use tracing::{debug, trace};

use crate::dsp::q15::round_q30_q15;
use crate::dsp::rotate::Derotator;
use crate::error::{Error, Result};
use crate::sample_buf::SampleBuf;

/// Decimating complex FIR filter with optional derotation.
///
/// All methods require exclusive access; a single instance is
/// strictly single-threaded. Independent instances are free to run on
/// distinct threads.
pub struct DirectFir {
    /// Q.15 taps split into parallel re/im arrays for the vector kernel.
    coeff_re: Vec<i16>,
    coeff_im: Vec<i16>,
    /// Input samples consumed per output sample.
    decimation: usize,
    /// Buffer currently being read. `None` only when `sb_next` is too.
    sb_active: Option<Arc<SampleBuf>>,
    /// Look-ahead buffer for spans and strides that cross the edge.
    sb_next: Option<Arc<SampleBuf>>,
    /// Index of the next input sample within `sb_active`.
    sample_offset: usize,
    /// Unconsumed input samples across both held buffers.
    nr_samples: usize,
    /// `None` when derotation is disabled.
    derotator: Option<Derotator>,
}

impl DirectFir {
    /// Create a filter from complex Q.15 taps, without derotation.
    ///
    /// Fails if `taps` is empty or `decimation` is zero.
    ///
    /// # Example
    ///
    /// ```
    /// use num_complex::Complex;
    /// use decimato::DirectFir;
    ///
    /// // Boxcar lowpass decimating by 2.
    /// let taps = vec![Complex::new(4096i16, 0); 8];
    /// let fir = DirectFir::new(&taps, 2).unwrap();
    /// assert_eq!(fir.num_taps(), 8);
    /// assert_eq!(fir.decimation(), 2);
    /// ```
    pub fn new(taps: &[Complex<i16>], decimation: usize) -> Result<Self> {
        Self::init(taps, decimation, None)
    }

    /// Create a filter whose outputs are derotated by
    /// `exp(-j·2π·freq_shift_hz/sample_rate_hz·decimation)` per sample,
    /// recentring a channel that sits `freq_shift_hz` away from
    /// baseband.
    ///
    /// Fails if `taps` is empty, or `decimation` or `sample_rate_hz`
    /// is zero.
    pub fn with_freq_shift(
        taps: &[Complex<i16>],
        decimation: usize,
        sample_rate_hz: u32,
        freq_shift_hz: i32,
    ) -> Result<Self> {
        if sample_rate_hz == 0 {
            return Err(Error::Config("sample rate must be non-zero"));
        }
        if decimation == 0 {
            return Err(Error::Config("decimation factor must be at least 1"));
        }
        Self::init(
            taps,
            decimation,
            Some(Derotator::new(sample_rate_hz, freq_shift_hz, decimation)),
        )
    }

    fn init(
        taps: &[Complex<i16>],
        decimation: usize,
        derotator: Option<Derotator>,
    ) -> Result<Self> {
        if taps.is_empty() {
            return Err(Error::Config("at least one coefficient is required"));
        }
        if decimation == 0 {
            return Err(Error::Config("decimation factor must be at least 1"));
        }

        debug!(
            "preparing {} coefficients, decimation by {}, with{} derotation",
            taps.len(),
            decimation,
            if derotator.is_some() { "" } else { "out" }
        );

        Ok(Self {
            coeff_re: taps.iter().map(|c| c.re).collect(),
            coeff_im: taps.iter().map(|c| c.im).collect(),
            decimation,
            sb_active: None,
            sb_next: None,
            sample_offset: 0,
            nr_samples: 0,
            derotator,
        })
    }

    /// Transfer one buffer reference into the filter.
    ///
    /// The buffer lands in the active slot if the filter is empty,
    /// otherwise in the look-ahead slot. With both slots occupied the
    /// buffer is handed back in [`Error::Busy`] and nothing is
    /// consumed; drain with [`process`](Self::process) and retry.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is a buffer instance the filter already holds.
    pub fn push(&mut self, buf: Arc<SampleBuf>) -> Result<()> {
        assert!(!buf.is_empty(), "pushed an empty sample buffer");
        if let Some(active) = &self.sb_active {
            assert!(
                !Arc::ptr_eq(active, &buf),
                "pushed a buffer the filter already holds"
            );
        }
        if let Some(next) = &self.sb_next {
            assert!(
                !Arc::ptr_eq(next, &buf),
                "pushed a buffer the filter already holds"
            );
        }

        let nr_new = buf.len();
        if self.sb_active.is_none() {
            debug_assert!(self.sb_next.is_none());
            debug_assert_eq!(self.sample_offset, 0);
            self.sb_active = Some(buf);
        } else if self.sb_next.is_none() {
            self.sb_next = Some(buf);
        } else {
            return Err(Error::Busy(buf));
        }

        self.nr_samples += nr_new;
        trace!(
            "push: {} pending samples, look-ahead {}",
            self.nr_samples,
            self.sb_next.is_some()
        );
        Ok(())
    }

    /// Produce up to `out.len()` output samples.
    ///
    /// Stops early when the remaining input is too short for another
    /// convolution or stride; the return value is the number of
    /// samples written to the front of `out`. Returns 0 when the
    /// filter holds no buffers.
    pub fn process(&mut self, out: &mut [Complex<i16>]) -> usize {
        let mut generated = 0;
        while generated < out.len() && self.sb_active.is_some() {
            match self.process_sample() {
                Some(sample) => {
                    out[generated] = sample;
                    generated += 1;
                }
                None => break,
            }
        }
        generated
    }

    /// Whether enough input is pending for at least one output sample.
    pub fn can_process(&self) -> bool {
        self.nr_samples >= self.coeff_re.len()
    }

    /// Lower bound on the number of outputs `process` could produce
    /// right now. The exact count depends on the stride position.
    pub fn ready_estimate(&self) -> usize {
        self.nr_samples / self.coeff_re.len()
    }

    /// Whether the look-ahead slot is occupied (a push would be
    /// refused).
    pub fn is_full(&self) -> bool {
        self.sb_next.is_some()
    }

    /// Number of taps.
    pub fn num_taps(&self) -> usize {
        self.coeff_re.len()
    }

    /// Decimation factor.
    pub fn decimation(&self) -> usize {
        self.decimation
    }

    /// Unconsumed input samples across both held buffers.
    pub fn pending_samples(&self) -> usize {
        self.nr_samples
    }

    /// Number of derotations applied so far; 0 when derotation is
    /// disabled.
    pub fn rotation_count(&self) -> u64 {
        self.derotator.as_ref().map_or(0, Derotator::count)
    }

    /// Compute one output sample and advance the read cursor by one
    /// decimation stride. `None` means the filter has drained: the
    /// remaining input is too short for the convolution span or for
    /// the stride, and nothing was consumed.
    fn process_sample(&mut self) -> Option<Complex<i16>> {
        let nr_taps = self.coeff_re.len();
        let active = self
            .sb_active
            .as_ref()
            .expect("engine entered without an active buffer");
        let active_len = active.len();

        // The convolution span must not read past the end of the held
        // input.
        if self.nr_samples < nr_taps {
            return None;
        }

        // Nor may the stride skip past every sample we hold; refusing
        // up front keeps the cursor untouched so the caller can push
        // more and retry. Consuming a lone buffer exactly to its end
        // is fine and leaves the filter empty.
        let stride_end = self.sample_offset + self.decimation;
        if stride_end >= active_len {
            let spill = stride_end - active_len;
            let can_advance = match &self.sb_next {
                Some(next) => spill < next.len(),
                None => spill == 0,
            };
            if !can_advance {
                return None;
            }
        }

        // Inner product across the active buffer and, when the taps
        // straddle its end, the look-ahead buffer.
        let mut acc_re: i32 = 0;
        let mut acc_im: i32 = 0;
        let mut remaining = nr_taps;
        let mut offset = self.sample_offset;
        let mut cur = active;
        while remaining > 0 {
            let take = remaining.min(cur.len() - offset);
            let start_coeff = nr_taps - remaining;

            let (span_re, span_im) = convolve_span(
                &cur.samples()[offset..offset + take],
                &self.coeff_re[start_coeff..start_coeff + take],
                &self.coeff_im[start_coeff..start_coeff + take],
            );
            acc_re += span_re;
            acc_im += span_im;

            remaining -= take;
            offset = 0;
            if remaining > 0 {
                cur = self
                    .sb_next
                    .as_ref()
                    .expect("availability check admits the straddling span");
            }
        }

        // Advance one stride, retiring the active buffer once the
        // cursor reaches its end (exact fit included). Retiring drops
        // the reference the producer transferred in.
        if self.sample_offset + self.decimation >= active_len {
            self.sb_active = self.sb_next.take();
            self.sample_offset = self.sample_offset + self.decimation - active_len;
            trace!(
                "retired active buffer, cursor at {} of the promoted buffer",
                self.sample_offset
            );
        } else {
            self.sample_offset += self.decimation;
        }
        self.nr_samples -= self.decimation;

        // Derotate on the rounded Q.15 value, then narrow once at the
        // output boundary (the accumulators are Q.30 either way).
        let (acc_re, acc_im) = match &mut self.derotator {
            Some(rot) => rot.apply(round_q30_q15(acc_re), round_q30_q15(acc_im)),
            None => (acc_re, acc_im),
        };

        Some(Complex::new(
            round_q30_q15(acc_re) as i16,
            round_q30_q15(acc_im) as i16,
        ))
    }
}

#[cfg(not(feature = "simd"))]
#[inline]
fn convolve_span(samples: &[Complex<i16>], coeff_re: &[i16], coeff_im: &[i16]) -> (i32, i32) {
    scalar::convolve_span(samples, coeff_re, coeff_im)
}

#[cfg(feature = "simd")]
#[inline]
fn convolve_span(samples: &[Complex<i16>], coeff_re: &[i16], coeff_im: &[i16]) -> (i32, i32) {
    simd::convolve_span(samples, coeff_re, coeff_im)
}

mod scalar {
    use num_complex::Complex;

    use crate::dsp::q15::cmul_q15_q30;

    /// Multiply-accumulate one contiguous span of samples against the
    /// matching coefficient range. Q.15 × Q.15 products accumulate in
    /// Q.30 without narrowing.
    #[inline]
    pub(super) fn convolve_span(
        samples: &[Complex<i16>],
        coeff_re: &[i16],
        coeff_im: &[i16],
    ) -> (i32, i32) {
        debug_assert_eq!(samples.len(), coeff_re.len());
        debug_assert_eq!(samples.len(), coeff_im.len());

        let mut acc_re: i32 = 0;
        let mut acc_im: i32 = 0;
        for (sample, (&c_re, &c_im)) in samples.iter().zip(coeff_re.iter().zip(coeff_im)) {
            let (f_re, f_im) = cmul_q15_q30(
                c_re as i32,
                c_im as i32,
                sample.re as i32,
                sample.im as i32,
            );
            acc_re += f_re;
            acc_im += f_im;
        }
        (acc_re, acc_im)
    }
}

/// Vector kernel: taps in chunks of 4 with widening 16×16→32
/// multiply-accumulate, scalar remainder for the tail. Integer MACs
/// are exact, so lane regrouping only reassociates additions and the
/// result matches the scalar path bit for bit.
#[cfg(feature = "simd")]
mod simd {
    use num_complex::Complex;

    use super::scalar;

    #[inline]
    pub(super) fn convolve_span(
        samples: &[Complex<i16>],
        coeff_re: &[i16],
        coeff_im: &[i16],
    ) -> (i32, i32) {
        debug_assert_eq!(samples.len(), coeff_re.len());
        debug_assert_eq!(samples.len(), coeff_im.len());

        #[cfg(target_arch = "aarch64")]
        return unsafe { convolve_neon(samples, coeff_re, coeff_im) };

        #[cfg(not(target_arch = "aarch64"))]
        convolve_lanes(samples, coeff_re, coeff_im)
    }

    #[cfg(target_arch = "aarch64")]
    unsafe fn convolve_neon(
        samples: &[Complex<i16>],
        coeff_re: &[i16],
        coeff_im: &[i16],
    ) -> (i32, i32) {
        use core::arch::aarch64::*;

        let chunks = samples.len() / 4;
        // Complex<i16> is repr(C) (re, im), so the span is interleaved
        // i16 pairs that vld2 deinterleaves into re and im lanes.
        let sample_base = samples.as_ptr() as *const i16;

        let mut acc_re_v = vdupq_n_s32(0);
        let mut acc_im_v = vdupq_n_s32(0);
        for i in 0..chunks {
            let s = vld2_s16(sample_base.add(8 * i));
            let c_re = vld1_s16(coeff_re.as_ptr().add(4 * i));
            let c_im = vld1_s16(coeff_im.as_ptr().add(4 * i));

            // f_re = s_re·c_re − s_im·c_im
            let f_re = vmlsl_s16(vmull_s16(s.0, c_re), s.1, c_im);
            acc_re_v = vaddq_s32(acc_re_v, f_re);

            // f_im = s_im·c_re + s_re·c_im
            let f_im = vmlal_s16(vmull_s16(s.1, c_re), s.0, c_im);
            acc_im_v = vaddq_s32(acc_im_v, f_im);
        }

        let bulk = chunks * 4;
        let (tail_re, tail_im) =
            scalar::convolve_span(&samples[bulk..], &coeff_re[bulk..], &coeff_im[bulk..]);
        (
            vaddvq_s32(acc_re_v) + tail_re,
            vaddvq_s32(acc_im_v) + tail_im,
        )
    }

    /// 4-lane chunked kernel for targets without a dedicated
    /// widening-MAC path; shaped for straightforward
    /// auto-vectorization.
    #[cfg(not(target_arch = "aarch64"))]
    fn convolve_lanes(
        samples: &[Complex<i16>],
        coeff_re: &[i16],
        coeff_im: &[i16],
    ) -> (i32, i32) {
        const LANES: usize = 4;

        let chunks = samples.len() / LANES;
        let mut acc_re = [0i32; LANES];
        let mut acc_im = [0i32; LANES];
        for i in 0..chunks {
            for lane in 0..LANES {
                let j = i * LANES + lane;
                let s_re = samples[j].re as i32;
                let s_im = samples[j].im as i32;
                let c_re = coeff_re[j] as i32;
                let c_im = coeff_im[j] as i32;
                acc_re[lane] += s_re * c_re - s_im * c_im;
                acc_im[lane] += s_im * c_re + s_re * c_im;
            }
        }

        let bulk = chunks * LANES;
        let (tail_re, tail_im) =
            scalar::convolve_span(&samples[bulk..], &coeff_re[bulk..], &coeff_im[bulk..]);
        (
            acc_re.iter().sum::<i32>() + tail_re,
            acc_im.iter().sum::<i32>() + tail_im,
        )
    }
}
