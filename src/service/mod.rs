//! # Service Layer
//!
//! The running side of a connection.
//!
//! ## Components
//! - **Multiplexer**: merges inbound reads, outbound drains and cancellation
//!   into one ordered message sequence
//! - **Client**: handshake, heartbeat subscription, dispatch loop and close

pub mod client;
pub mod multiplexer;

pub use client::{Client, ClientHandle};
