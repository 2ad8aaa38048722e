//! # Transport Layer
//!
//! Byte-stream connections to the distributor.
//!
//! ## Components
//! - **TCP**: plain connections and the type-erased [`BoxedStream`](tcp::BoxedStream)
//! - **TLS**: rustls client configuration and stream wrapping
//!
//! The client runs over any `AsyncRead + AsyncWrite` stream; these helpers
//! only cover the production TCP/TLS case.

pub mod tcp;
pub mod tls;

pub use tcp::{connect, BoxedStream, Transport};
pub use tls::TlsClientConfig;
