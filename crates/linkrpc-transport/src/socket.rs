use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::link::LinkStream;

/// Room in `sockaddr_un.sun_path`, including the terminating NUL.
#[cfg(any(target_os = "linux", target_os = "android"))]
const SUN_PATH_LEN: usize = 108;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SUN_PATH_LEN: usize = 104;

/// Owner-only access for the socket file.
const SOCKET_MODE: u32 = 0o600;

/// A listening Unix domain socket.
///
/// A stale socket left at the path by a dead server is replaced; any other
/// file is refused. On drop the socket file is removed if it is still the
/// one this listener created.
#[derive(Debug)]
pub struct SocketListener {
    listener: UnixListener,
    path: PathBuf,
    /// `(dev, ino)` of the socket file we created.
    identity: (u64, u64),
}

impl SocketListener {
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        check_path_len(&path)?;
        clear_stale(&path)?;

        let listen_err = |source| TransportError::Listen {
            path: path.clone(),
            source,
        };
        let listener = UnixListener::bind(&path).map_err(listen_err)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(SOCKET_MODE)).map_err(listen_err)?;
        let meta = fs::symlink_metadata(&path).map_err(listen_err)?;
        // Accepts are polled; each accepted stream is switched back to blocking.
        listener.set_nonblocking(true).map_err(listen_err)?;

        info!(path = %path.display(), "listening");
        Ok(Self {
            listener,
            identity: (meta.dev(), meta.ino()),
            path,
        })
    }

    /// The next waiting connection, if any. Never blocks.
    pub fn try_accept(&self) -> Result<Option<LinkStream>> {
        match self.listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                debug!(path = %self.path.display(), "connection accepted");
                Ok(Some(stream.into()))
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        let ours = fs::symlink_metadata(&self.path).is_ok_and(|meta| {
            meta.file_type().is_socket() && (meta.dev(), meta.ino()) == self.identity
        });
        if ours {
            let _ = fs::remove_file(&self.path);
        } else {
            debug!(path = %self.path.display(), "socket file replaced, leaving it");
        }
    }
}

/// Connect to the socket at `path`.
pub fn dial(path: impl AsRef<Path>) -> Result<LinkStream> {
    let path = path.as_ref();
    check_path_len(path)?;
    let stream = UnixStream::connect(path).map_err(|source| TransportError::Dial {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "connected");
    Ok(stream.into())
}

fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len >= SUN_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: SUN_PATH_LEN - 1,
        });
    }
    Ok(())
}

fn clear_stale(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(TransportError::Listen {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if !meta.file_type().is_socket() {
        return Err(TransportError::NotASocket {
            path: path.to_path_buf(),
        });
    }
    debug!(path = %path.display(), "removing stale socket");
    fs::remove_file(path).map_err(|source| TransportError::Listen {
        path: path.to_path_buf(),
        source,
    })
}
