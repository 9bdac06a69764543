use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot listen on {}: {source}", path.display())]
    Listen { path: PathBuf, source: io::Error },

    #[error("cannot reach {}: {source}", path.display())]
    Dial { path: PathBuf, source: io::Error },

    /// Something other than a socket already occupies the listen path.
    #[error("{} exists and is not a socket", path.display())]
    NotASocket { path: PathBuf },

    /// `sun_path` cannot hold the path.
    #[error("socket path is {len} bytes, limit is {max}: {}", path.display())]
    PathTooLong { path: PathBuf, len: usize, max: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
