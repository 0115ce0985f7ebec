//! Error handling for the decimato library.
//!
//! The error surface is deliberately small: filters reject bad
//! configuration at construction, and [`DirectFir::push`] refuses a
//! buffer while both slots are occupied. Running out of input is not
//! an error; [`DirectFir::process`] simply returns a short count.
//!
//! [`DirectFir::push`]: crate::DirectFir::push
//! [`DirectFir::process`]: crate::DirectFir::process

use std::sync::Arc;

use thiserror::Error;

use crate::sample_buf::SampleBuf;

/// A specialized Result type for decimato operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for decimato operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A filter constructor rejected its configuration.
    #[error("invalid filter configuration: {0}")]
    Config(&'static str),

    /// Both buffer slots were occupied when a buffer was pushed.
    ///
    /// The rejected buffer is handed back, so the caller still owns the
    /// reference it tried to transfer and can retry after draining the
    /// filter with [`DirectFir::process`](crate::DirectFir::process).
    #[error("filter is full: active and look-ahead buffer slots are occupied")]
    Busy(Arc<SampleBuf>),
}
