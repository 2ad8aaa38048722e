//! # messagebus-client
//!
//! Async client for a publish/subscribe message bus.
//!
//! A client holds one ordered byte stream to a distributor. Over it, it
//! subscribes to feed/topic pairs, publishes data packets (optionally tagged
//! with entitlements), answers authorization requests and receives data and
//! subscription notifications.
//!
//! ## Layers
//! - [`core`]: binary primitives, data packets and the frame codec
//! - [`protocol`]: the message catalog, authenticators, handler traits and dispatch
//! - [`service`]: the stream multiplexer and the client state machine
//! - [`transport`]: TCP and TLS connection setup
//! - [`config`]: TOML and environment configuration
//! - [`utils`]: logging bootstrap and connection metrics
//!
//! ## Quick Start
//! ```rust,no_run
//! use std::sync::Arc;
//! use messagebus_client::{Authenticator, BasicAuthenticator, CallbackHandler, Client, DataPacket};
//!
//! # async fn run() -> messagebus_client::Result<()> {
//! let auth: Arc<dyn Authenticator> = Arc::new(BasicAuthenticator::new("tom", "tomsPassword")?);
//! let client = Client::connect("localhost", 9001, Some(auth), None, false).await?;
//!
//! client.add_subscription("LSE", "SBRY")?;
//! client.publish(
//!     "LSE",
//!     "VOD",
//!     true,
//!     Some(vec![DataPacket::entitled([1, 2], &b"price=101.5"[..])]),
//! )?;
//!
//! let mut handler = CallbackHandler::new();
//! handler.add_data_handler(|data| async move {
//!     println!("{} sent {}/{}", data.user, data.feed, data.topic);
//!     Ok(())
//! });
//!
//! client.start(&mut handler).await
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::config::{ClientConfig, MessageBusConfig};
pub use crate::core::codec::MessageCodec;
pub use crate::core::packet::{DataPacket, Entitlements};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::handler::{CallbackHandler, ClientHandler, DataReceived};
pub use crate::protocol::handshake::{
    Authenticator, BasicAuthenticator, NullAuthenticator, TokenAuthenticator,
};
pub use crate::protocol::message::{Message, MessageType};
pub use crate::service::{Client, ClientHandle};
