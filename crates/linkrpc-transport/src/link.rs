use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::error::Result;

/// Credentials of the process on the other end of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCred {
    pub pid: Option<u32>,
    pub uid: u32,
    pub gid: u32,
}

/// A connected, blocking byte stream between two local processes.
#[derive(Debug)]
pub struct LinkStream(UnixStream);

impl LinkStream {
    /// Two connected ends, for in-process links and tests.
    pub fn pair() -> Result<(Self, Self)> {
        let (a, b) = UnixStream::pair()?;
        Ok((Self(a), Self(b)))
    }

    /// A second handle on the same stream, so reads and writes can live on
    /// different threads.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self(self.0.try_clone()?))
    }

    /// Close both directions. A reader blocked on another handle sees EOF.
    pub fn shutdown(&self) -> Result<()> {
        match self.0.shutdown(Shutdown::Both) {
            Err(err) if err.kind() != io::ErrorKind::NotConnected => Err(err.into()),
            _ => Ok(()),
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.0.set_read_timeout(timeout)?)
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.0.set_write_timeout(timeout)?)
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn peer_cred(&self) -> Option<PeerCred> {
        use std::os::fd::AsRawFd;

        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
        // SAFETY: `cred` and `len` are valid for writes and sized for SO_PEERCRED.
        let rc = unsafe {
            libc::getsockopt(
                self.0.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast(),
                &mut len,
            )
        };
        (rc == 0).then(|| PeerCred {
            pid: u32::try_from(cred.pid).ok(),
            uid: cred.uid,
            gid: cred.gid,
        })
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    pub fn peer_cred(&self) -> Option<PeerCred> {
        use std::os::fd::AsRawFd;

        let mut uid: libc::uid_t = 0;
        let mut gid: libc::gid_t = 0;
        // SAFETY: both out-pointers are valid for the duration of the call.
        let rc = unsafe { libc::getpeereid(self.0.as_raw_fd(), &mut uid, &mut gid) };
        (rc == 0).then_some(PeerCred { pid: None, uid, gid })
    }

    /// Short peer description for channel info, e.g. `pid=42 uid=1000`.
    pub fn describe_peer(&self) -> String {
        match self.peer_cred() {
            Some(PeerCred { pid: Some(pid), uid, .. }) => format!("unix pid={pid} uid={uid}"),
            Some(PeerCred { pid: None, uid, .. }) => format!("unix uid={uid}"),
            None => "unix".to_string(),
        }
    }
}

impl From<UnixStream> for LinkStream {
    fn from(stream: UnixStream) -> Self {
        Self(stream)
    }
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}
