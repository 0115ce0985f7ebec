#![doc = include_str!("../readme.md")]

pub mod dsp;
pub mod error;
pub mod sample_buf;

pub use dsp::fir::DirectFir;
pub use error::{Error, Result};
pub use sample_buf::SampleBuf;
