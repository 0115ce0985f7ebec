//! Reference-counted blocks of interleaved complex Q.15 samples.
//!
//! Sample buffers are produced upstream (a capture driver, a file
//! reader, a previous pipeline stage) and shared by handing out
//! [`Arc`] clones. A consumer that is done with a buffer drops its
//! clone; the storage is freed when the last reference goes away.
//! [`DirectFir`](crate::DirectFir) takes ownership of one reference
//! per [`push`](crate::DirectFir::push) and drops it once every
//! sample in the buffer has been consumed.

use std::fmt;
use std::sync::Arc;

use num_complex::Complex;

/// An immutable, non-empty block of complex Q.15 samples.
///
/// The sample storage is interleaved `(re, im)` pairs in memory
/// (`Complex<i16>` is `repr(C)` with `re` first), matching the
/// `[re0, im0, re1, im1, ..]` wire layout of 16-bit I/Q streams.
pub struct SampleBuf {
    samples: Box<[Complex<i16>]>,
}

impl SampleBuf {
    /// Wrap a block of complex samples in a shared buffer.
    ///
    /// # Panics
    ///
    /// Panics if `samples` is empty. Zero-length buffers have no
    /// meaning in a sample stream and the consumers here do not
    /// accept them.
    pub fn new(samples: Vec<Complex<i16>>) -> Arc<Self> {
        assert!(
            !samples.is_empty(),
            "sample buffers must hold at least one sample"
        );
        Arc::new(Self {
            samples: samples.into_boxed_slice(),
        })
    }

    /// Build a buffer from interleaved `[re0, im0, re1, im1, ..]` data.
    ///
    /// # Panics
    ///
    /// Panics if `raw` is empty or has an odd number of values.
    ///
    /// # Example
    ///
    /// ```
    /// use decimato::SampleBuf;
    ///
    /// let buf = SampleBuf::from_interleaved(&[100, -100, 200, -200]);
    /// assert_eq!(buf.len(), 2);
    /// ```
    pub fn from_interleaved(raw: &[i16]) -> Arc<Self> {
        assert!(
            raw.len() % 2 == 0,
            "interleaved I/Q data must pair re and im values"
        );
        Self::new(
            raw.chunks_exact(2)
                .map(|pair| Complex::new(pair[0], pair[1]))
                .collect(),
        )
    }

    /// Number of complex samples in the buffer.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; buffers are non-empty by construction.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The samples, in stream order.
    pub fn samples(&self) -> &[Complex<i16>] {
        &self.samples
    }
}

impl fmt::Debug for SampleBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuf")
            .field("len", &self.len())
            .finish()
    }
}
