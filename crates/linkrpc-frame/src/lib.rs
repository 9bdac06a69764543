//! Frame codec for linkrpc.
//!
//! [`parse`] and [`FrameBuilder`] handle the JSON envelope every channel
//! carries. The [`stream`] module adds the `"LR"` length prefix that byte
//! stream channels put in front of each envelope.

pub mod envelope;
pub mod error;
pub mod stream;

pub use envelope::{parse, ErrorBody, Frame, FrameBuilder, FrameId, FrameKind};
pub use error::{FrameError, Result};
pub use stream::{
    decode_frame, encode_frame, FrameConfig, FrameReader, FrameWriter, DEFAULT_MAX_PAYLOAD,
    HEADER_SIZE,
};
