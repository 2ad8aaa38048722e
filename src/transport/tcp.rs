//! Plain and TLS-wrapped TCP connections to a distributor.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{info, instrument};

use crate::error::Result;
use crate::transport::tls::{self, TlsClientConfig};

/// Any duplex byte stream the client can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Type-erased stream returned by [`connect`].
pub type BoxedStream = Box<dyn Transport>;

/// Open a TCP connection, upgrading it to TLS when `tls` is given.
#[instrument(skip(tls), fields(tls = tls.is_some()))]
pub async fn connect(host: &str, port: u16, tls: Option<&TlsClientConfig>) -> Result<BoxedStream> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    info!(peer = ?stream.peer_addr().ok(), "TCP connection established");

    match tls {
        Some(config) => Ok(Box::new(tls::wrap(stream, config).await?)),
        None => Ok(Box::new(stream)),
    }
}
