//! Rotating capture of transcoder output.

mod sink;

pub use sink::*;
