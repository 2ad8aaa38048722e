//! # Core Wire Components
//!
//! Low-level binary encoding and frame handling.
//!
//! ## Components
//! - **Wire**: big-endian primitives (booleans, ints, strings, byte arrays, UUIDs, int sets)
//! - **Packet**: entitlement-tagged data packets and packet lists
//! - **Scan**: resumable frame-boundary scanner for partially received frames
//! - **Codec**: Tokio codec for message framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [Discriminant(1)] [Body(N) - self-describing, no outer length]
//! ```
//!
//! ## Safety
//! - Length prefixes are validated (non-negative, capped) before any payload is awaited
//! - Each field of a partial frame is measured once, however the bytes arrive
//! - Truncated frames at end-of-stream are fatal, never silently dropped

pub mod codec;
pub mod packet;
pub(crate) mod scan;
pub mod wire;
