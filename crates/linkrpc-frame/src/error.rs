/// Envelope decoding and stream framing failures.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame is not valid JSON.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is valid JSON but not an object.
    #[error("malformed frame: not a JSON object")]
    NotAnObject,

    /// `id` is present but is neither a number nor a string.
    #[error("malformed frame: id must be a number or a string")]
    InvalidId,

    /// A well-known member has the wrong JSON type.
    #[error("malformed frame: invalid `{0}` member")]
    InvalidField(&'static str),

    /// A stream header that does not start with `"LR"`.
    #[error("stream out of sync: bad frame magic")]
    InvalidMagic,

    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("stream I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The peer went away, or stopped accepting bytes, mid-frame.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// True for errors caused by the frame contents rather than the stream.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Json(_) | Self::NotAnObject | Self::InvalidId | Self::InvalidField(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
