//! Stream transport to an engine endpoint.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use console_core::{EndpointAddr, EngineError};

/// Timeout for establishing a backend connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected byte stream to an engine endpoint.
pub enum EngineStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl EngineStream {
    /// Connect to an endpoint, failing fast after [`CONNECT_TIMEOUT`].
    ///
    /// # Errors
    /// Returns `Unreachable` on connect failure or timeout.
    pub async fn connect(addr: &EndpointAddr) -> Result<Self, EngineError> {
        let connect = async {
            match addr {
                EndpointAddr::Tcp { host, port } => TcpStream::connect((host.as_str(), *port))
                    .await
                    .map(Self::Tcp),
                EndpointAddr::Unix { path } => {
                    #[cfg(unix)]
                    {
                        UnixStream::connect(path).await.map(Self::Unix)
                    }
                    #[cfg(not(unix))]
                    {
                        let _ = path;
                        Err(io::Error::new(
                            io::ErrorKind::Unsupported,
                            "stream sockets are not supported on this platform",
                        ))
                    }
                }
            }
        };
        match tokio::time::timeout(CONNECT_TIMEOUT, connect).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(EngineError::Unreachable(format!("{addr}: {e}"))),
            Err(_) => Err(EngineError::Unreachable(format!("{addr}: connect timed out"))),
        }
    }
}

impl AsyncRead for EngineStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for EngineStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
