//! Transcoder subprocess spawning and control.

mod transcoder;

pub use transcoder::*;
