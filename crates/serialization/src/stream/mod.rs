//! Growable byte buffers backing every encode/decode session.

mod input;
mod output;

pub use input::ByteInputStream;
pub use output::{ByteOutputStream, DEFAULT_CAPACITY};
