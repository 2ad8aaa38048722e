//! # Protocol Layer
//!
//! Message catalog, authentication handshake and inbound dispatch.
//!
//! ## Components
//! - **Message**: the nine wire frames and their exact field order
//! - **Handshake**: authenticators writing the pre-protocol credential string
//! - **Handler**: application extension points (trait or callback lists)
//! - **Dispatcher**: routes client-bound frames to handler methods
//!
//! ## Flow
//! ```text
//! Authenticator -> [credential string] -> Distributor
//! Distributor   -> [frame] -> MessageCodec -> Dispatcher -> ClientHandler
//! ClientHandle  -> [frame] -> outbound queue -> MessageCodec -> Distributor
//! ```

pub mod dispatcher;
pub mod handler;
pub mod handshake;
pub mod message;
