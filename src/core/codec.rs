//! # Message Codec
//!
//! Tokio codec that frames [`Message`] values over a byte stream.
//!
//! Frames carry no outer length. While a frame is incomplete the codec keeps a
//! [`FrameScan`] that measures each field as it arrives, and builds the
//! [`Message`] once, when the last byte is in. A frame cut short by
//! end-of-stream is a fatal [`ProtocolError::Truncated`].

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::core::scan::FrameScan;
use crate::core::wire::{WireReader, WireWriter, DEFAULT_MAX_FIELD_LENGTH};
use crate::error::{ProtocolError, Result};
use crate::protocol::message::Message;

#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_field_length: usize,
    /// Frame currently being received, if any.
    scan: Option<FrameScan>,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::with_max_field_length(DEFAULT_MAX_FIELD_LENGTH)
    }

    /// Reject any length prefix above `max_field_length` bytes.
    pub fn with_max_field_length(max_field_length: usize) -> Self {
        Self {
            max_field_length,
            scan: None,
        }
    }

    pub fn max_field_length(&self) -> usize {
        self.max_field_length
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        let max_field_length = self.max_field_length;
        if self.scan.is_none() {
            let Some(&header) = src.first() else {
                return Ok(None);
            };
            self.scan = Some(FrameScan::start(header)?);
        }
        let Some(scan) = self.scan.as_mut() else {
            return Ok(None);
        };

        if src.len() < scan.needed() {
            return Ok(None);
        }
        let Some(len) = scan.advance(&src[..], max_field_length)? else {
            return Ok(None);
        };
        self.scan = None;

        let mut reader = WireReader::with_max_field_length(&src[..len], max_field_length);
        let message = Message::decode(&mut reader)?;
        debug_assert_eq!(reader.position(), len);
        trace!(bytes = len, kind = %message.message_type(), "Decoded frame");
        src.advance(len);
        Ok(Some(message))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(ProtocolError::Truncated(src.len())),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        let start = dst.len();
        if let Err(e) = item.encode(&mut WireWriter::new(dst)) {
            // Never leave half a frame in the send buffer.
            dst.truncate(start);
            return Err(e);
        }
        trace!(bytes = dst.len() - start, kind = %item.message_type(), "Encoded frame");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::core::packet::DataPacket;
    use crate::protocol::message::{MulticastData, NotificationRequest, SubscriptionRequest};

    fn subscription(topic: &str) -> Message {
        SubscriptionRequest {
            feed: "LSE".into(),
            topic: topic.into(),
            is_add: true,
        }
        .into()
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let mut codec = MessageCodec::new();
        let mut full = BytesMut::new();
        codec.encode(subscription("SBRY"), &mut full).unwrap();

        let mut src = BytesMut::new();
        for (i, byte) in full.iter().enumerate() {
            src.extend_from_slice(&[*byte]);
            let decoded = codec.decode(&mut src).unwrap();
            if i + 1 < full.len() {
                assert!(decoded.is_none());
            } else {
                assert_eq!(decoded, Some(subscription("SBRY")));
            }
        }
        assert!(src.is_empty());
    }

    #[test]
    fn large_frame_in_transport_sized_chunks() {
        let message: Message = MulticastData {
            feed: "LSE".into(),
            topic: "SBRY".into(),
            is_image: true,
            data_packets: Some(
                (0..4000)
                    .map(|i| DataPacket::entitled([i, i + 1], vec![i as u8; 9]))
                    .collect(),
            ),
        }
        .into();
        let mut codec = MessageCodec::new();
        let mut full = BytesMut::new();
        codec.encode(message.clone(), &mut full).unwrap();
        codec.encode(subscription("NEXT"), &mut full).unwrap();

        let mut src = BytesMut::new();
        let mut decoded = Vec::new();
        for chunk in full.chunks(4096) {
            src.extend_from_slice(chunk);
            while let Some(message) = codec.decode(&mut src).unwrap() {
                decoded.push(message);
            }
        }
        assert_eq!(decoded, vec![message, subscription("NEXT")]);
        assert!(src.is_empty());
    }

    #[test]
    fn back_to_back_frames_decode_in_order() {
        let mut codec = MessageCodec::new();
        let mut src = BytesMut::new();
        codec.encode(subscription("A"), &mut src).unwrap();
        codec
            .encode(
                NotificationRequest {
                    feed: "LSE".into(),
                    is_add: false,
                }
                .into(),
                &mut src,
            )
            .unwrap();
        codec.encode(subscription("B"), &mut src).unwrap();

        assert_eq!(codec.decode(&mut src).unwrap(), Some(subscription("A")));
        assert!(matches!(
            codec.decode(&mut src).unwrap(),
            Some(Message::NotificationRequest(_))
        ));
        assert_eq!(codec.decode(&mut src).unwrap(), Some(subscription("B")));
        assert_eq!(codec.decode(&mut src).unwrap(), None);
    }

    #[test]
    fn truncated_frame_at_eof_is_fatal() {
        let mut codec = MessageCodec::new();
        let mut src = BytesMut::new();
        codec.encode(subscription("SBRY"), &mut src).unwrap();
        src.truncate(src.len() - 2);
        let remaining = src.len();
        let err = codec.decode_eof(&mut src).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated(n) if n == remaining));
    }

    #[test]
    fn clean_eof_yields_none() {
        let mut codec = MessageCodec::new();
        assert_eq!(codec.decode_eof(&mut BytesMut::new()).unwrap(), None);
    }

    #[test]
    fn oversized_field_fails_without_waiting() {
        let mut codec = MessageCodec::with_max_field_length(8);
        let mut src = BytesMut::new();
        src.extend_from_slice(&[5]);
        src.extend_from_slice(&1000i32.to_be_bytes());
        let err = codec.decode(&mut src).unwrap_err();
        assert!(matches!(err, ProtocolError::OversizedField(1000)));
    }
}
