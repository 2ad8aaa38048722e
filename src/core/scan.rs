//! # Frame Scanner
//!
//! Finds where a frame ends without materializing it.
//!
//! A frame has no outer length, so its end is only known by walking every
//! length prefix in wire order. [`FrameScan`] does that walk over a buffer that
//! grows between calls: it remembers the offset of the first field it has not
//! yet measured and the buffer length it needs before it can measure that
//! field. Each field is measured once per frame, however the bytes arrive.

use crate::error::{ProtocolError, Result};
use crate::protocol::message::MessageType;

/// Width of every length and count prefix.
const PREFIX: usize = 4;

/// Body field kinds, as laid out by [`MessageType::layout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Field {
    Bool,
    Uuid,
    Str,
    IntSet,
    Packets,
}

enum Shape {
    Fixed(usize),
    /// Prefix followed by `prefix * unit` bytes.
    Prefixed(usize),
    PacketCount,
}

impl Field {
    fn shape(self) -> Shape {
        match self {
            Field::Bool => Shape::Fixed(1),
            Field::Uuid => Shape::Fixed(16),
            Field::Str => Shape::Prefixed(1),
            Field::IntSet => Shape::Prefixed(4),
            Field::Packets => Shape::PacketCount,
        }
    }
}

/// Progress through one partially buffered frame.
#[derive(Debug, Clone)]
pub(crate) struct FrameScan {
    layout: &'static [Field],
    next_field: usize,
    /// Entitlement sets and payloads left in the current packet list.
    packet_parts: usize,
    offset: usize,
    needed: usize,
    #[cfg(test)]
    measured: usize,
}

impl FrameScan {
    pub(crate) fn start(header: u8) -> Result<Self> {
        Ok(Self {
            layout: MessageType::try_from(header)?.layout(),
            next_field: 0,
            packet_parts: 0,
            offset: 1,
            needed: 1,
            #[cfg(test)]
            measured: 0,
        })
    }

    /// Buffer length required before [`advance`](Self::advance) can progress.
    pub(crate) fn needed(&self) -> usize {
        self.needed
    }

    /// Measure every field that is fully buffered.
    ///
    /// Returns the frame length once the last field is in, `None` while more
    /// bytes are needed. Bad length prefixes fail as soon as they arrive.
    pub(crate) fn advance(&mut self, src: &[u8], max_field_length: usize) -> Result<Option<usize>> {
        loop {
            let shape = if self.packet_parts > 0 {
                // Each packet is an entitlement set, then a payload.
                if self.packet_parts % 2 == 0 {
                    Shape::Prefixed(4)
                } else {
                    Shape::Prefixed(1)
                }
            } else {
                match self.layout.get(self.next_field) {
                    Some(field) => field.shape(),
                    None => return Ok(Some(self.offset)),
                }
            };

            #[cfg(test)]
            {
                self.measured += 1;
            }

            let (size, packets) = match shape {
                Shape::Fixed(size) => (size, 0),
                Shape::Prefixed(unit) => match read_len(src, self.offset, max_field_length)? {
                    Some(len) => {
                        let body = len
                            .checked_mul(unit)
                            .ok_or(ProtocolError::OversizedField(len))?;
                        (PREFIX + body, 0)
                    }
                    None => return Ok(self.wait(self.offset + PREFIX)),
                },
                Shape::PacketCount => match read_len(src, self.offset, max_field_length)? {
                    Some(count) => (PREFIX, count),
                    None => return Ok(self.wait(self.offset + PREFIX)),
                },
            };

            let end = self.offset + size;
            if end > src.len() {
                return Ok(self.wait(end));
            }
            self.offset = end;
            if self.packet_parts > 0 {
                self.packet_parts -= 1;
            } else {
                self.next_field += 1;
                self.packet_parts = packets * 2;
            }
        }
    }

    fn wait(&mut self, needed: usize) -> Option<usize> {
        self.needed = needed;
        None
    }
}

/// Validated length prefix at `at`, or `None` if it is not buffered yet.
fn read_len(src: &[u8], at: usize, max_field_length: usize) -> Result<Option<usize>> {
    let Some(raw) = src.get(at..at + PREFIX) else {
        return Ok(None);
    };
    let len = i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
    if len < 0 {
        return Err(ProtocolError::InvalidLength(len));
    }
    let len = len as usize;
    if len > max_field_length {
        return Err(ProtocolError::OversizedField(len));
    }
    Ok(Some(len))
}
