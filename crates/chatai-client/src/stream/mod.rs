//! Stream decoding - bytes to text, text to frames, frames to deltas

mod decoder;
mod frame;

pub use decoder::Utf8StreamDecoder;
pub use frame::{DATA_MARKER, FrameParser, MarkerMode, StreamDelta, parse_delta};
