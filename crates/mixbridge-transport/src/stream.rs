use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

#[cfg(unix)]
use crate::error::Result;

/// A connected, duplex IPC stream between the host and a plugin process.
///
/// On Unix this wraps a Unix domain socket, which is what the host hands a
/// worker process through an inherited file descriptor.
pub struct IpcStream {
    inner: IpcStreamInner,
}

enum IpcStreamInner {
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
    /// No stream can be constructed on this platform.
    #[cfg(not(unix))]
    Unsupported(std::convert::Infallible),
}

impl IpcStream {
    #[cfg(unix)]
    pub(crate) fn from_std_unix(stream: std::os::unix::net::UnixStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        let stream = tokio::net::UnixStream::from_std(stream)?;
        Ok(Self {
            inner: IpcStreamInner::Unix(stream),
        })
    }

    /// Adopt an inherited channel file descriptor.
    ///
    /// Must be called from within a Tokio runtime. The descriptor is owned by
    /// the returned stream from this point on.
    #[cfg(unix)]
    pub fn from_inherited_fd(fd: std::os::fd::RawFd) -> Result<Self> {
        use std::os::fd::FromRawFd;

        // SAFETY: `fcntl(F_GETFD)` only queries descriptor flags.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        if flags == -1 {
            return Err(io::Error::last_os_error().into());
        }

        // SAFETY: the descriptor is open (checked above) and was handed to this
        // process for exclusive use as the IPC channel.
        let stream = unsafe { std::os::unix::net::UnixStream::from_raw_fd(fd) };
        tracing::debug!(fd, "adopted inherited channel fd");
        Self::from_std_unix(stream)
    }

    /// Connect to a listening Unix domain socket.
    #[cfg(unix)]
    pub async fn connect(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = tokio::net::UnixStream::connect(path).await.map_err(|source| {
            crate::error::TransportError::Connect {
                path: path.to_path_buf(),
                source,
            }
        })?;
        tracing::debug!(?path, "connected to channel socket");
        Ok(Self {
            inner: IpcStreamInner::Unix(stream),
        })
    }

    /// Create a connected pair of streams (host end, plugin end).
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = tokio::net::UnixStream::pair()?;
        Ok((
            Self {
                inner: IpcStreamInner::Unix(left),
            },
            Self {
                inner: IpcStreamInner::Unix(right),
            },
        ))
    }

    /// Get the credentials of the connected peer (Linux only).
    ///
    /// Returns `(uid, gid, pid)`, or `None` if unavailable.
    pub fn peer_credentials(&self) -> Option<(u32, u32, Option<i32>)> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => {
                let cred = stream.peer_cred().ok()?;
                Some((cred.uid(), cred.gid(), cred.pid()))
            }
            #[cfg(not(unix))]
            IpcStreamInner::Unsupported(never) => match *never {},
        }
    }
}

impl AsyncRead for IpcStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(not(unix))]
            IpcStreamInner::Unsupported(never) => match *never {},
        }
    }
}

impl AsyncWrite for IpcStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(not(unix))]
            IpcStreamInner::Unsupported(never) => match *never {},
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(not(unix))]
            IpcStreamInner::Unsupported(never) => match *never {},
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(not(unix))]
            IpcStreamInner::Unsupported(never) => match *never {},
        }
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(_) => f.debug_struct("IpcStream").field("type", &"unix").finish(),
            #[cfg(not(unix))]
            IpcStreamInner::Unsupported(never) => match *never {},
        }
    }
}
