//! # Message Catalog
//!
//! The closed set of frames exchanged with the distributor. Every frame is a
//! one-byte discriminant followed by a self-describing body; there is no outer
//! length prefix.
//!
//! | Tag | Variant                        | Body (in wire order)                                      |
//! |-----|--------------------------------|-----------------------------------------------------------|
//! | 1   | `MulticastData`                | feed, topic, is_image, packets                            |
//! | 2   | `UnicastData`                  | client_id, feed, topic, is_image, packets                 |
//! | 3   | `ForwardedSubscriptionRequest` | user, host, client_id, feed, topic, is_add                |
//! | 4   | `NotificationRequest`          | feed, is_add                                              |
//! | 5   | `SubscriptionRequest`          | feed, topic, is_add                                       |
//! | 6   | `AuthorizationRequest`         | client_id, host, user, feed, topic                        |
//! | 7   | `AuthorizationResponse`        | client_id, feed, topic, is_authorization_required, set    |
//! | 8   | `ForwardedMulticastData`       | user, host, feed, topic, is_image, packets                |
//! | 9   | `ForwardedUnicastData`         | user, host, client_id, feed, topic, is_image, packets     |

use std::fmt;

use uuid::Uuid;

use crate::core::packet::{
    decode_packets, encode_packets, normalize_packets, packets_normalized, DataPacket, Entitlements,
};
use crate::core::scan::Field;
use crate::core::wire::{WireReader, WireWriter};
use crate::error::{ProtocolError, Result};

/// Frame discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    MulticastData = 1,
    UnicastData = 2,
    ForwardedSubscriptionRequest = 3,
    NotificationRequest = 4,
    SubscriptionRequest = 5,
    AuthorizationRequest = 6,
    AuthorizationResponse = 7,
    ForwardedMulticastData = 8,
    ForwardedUnicastData = 9,
}

impl MessageType {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageType::MulticastData => "MulticastData",
            MessageType::UnicastData => "UnicastData",
            MessageType::ForwardedSubscriptionRequest => "ForwardedSubscriptionRequest",
            MessageType::NotificationRequest => "NotificationRequest",
            MessageType::SubscriptionRequest => "SubscriptionRequest",
            MessageType::AuthorizationRequest => "AuthorizationRequest",
            MessageType::AuthorizationResponse => "AuthorizationResponse",
            MessageType::ForwardedMulticastData => "ForwardedMulticastData",
            MessageType::ForwardedUnicastData => "ForwardedUnicastData",
        }
    }

    /// Body fields in wire order; must agree with [`Message::decode`].
    pub(crate) fn layout(self) -> &'static [Field] {
        match self {
            MessageType::MulticastData => &[Field::Str, Field::Str, Field::Bool, Field::Packets],
            MessageType::UnicastData => &[
                Field::Uuid,
                Field::Str,
                Field::Str,
                Field::Bool,
                Field::Packets,
            ],
            MessageType::ForwardedSubscriptionRequest => &[
                Field::Str,
                Field::Str,
                Field::Uuid,
                Field::Str,
                Field::Str,
                Field::Bool,
            ],
            MessageType::NotificationRequest => &[Field::Str, Field::Bool],
            MessageType::SubscriptionRequest => &[Field::Str, Field::Str, Field::Bool],
            MessageType::AuthorizationRequest => &[
                Field::Uuid,
                Field::Str,
                Field::Str,
                Field::Str,
                Field::Str,
            ],
            MessageType::AuthorizationResponse => &[
                Field::Uuid,
                Field::Str,
                Field::Str,
                Field::Bool,
                Field::IntSet,
            ],
            MessageType::ForwardedMulticastData => &[
                Field::Str,
                Field::Str,
                Field::Str,
                Field::Str,
                Field::Bool,
                Field::Packets,
            ],
            MessageType::ForwardedUnicastData => &[
                Field::Str,
                Field::Str,
                Field::Uuid,
                Field::Str,
                Field::Str,
                Field::Bool,
                Field::Packets,
            ],
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(MessageType::MulticastData),
            2 => Ok(MessageType::UnicastData),
            3 => Ok(MessageType::ForwardedSubscriptionRequest),
            4 => Ok(MessageType::NotificationRequest),
            5 => Ok(MessageType::SubscriptionRequest),
            6 => Ok(MessageType::AuthorizationRequest),
            7 => Ok(MessageType::AuthorizationResponse),
            8 => Ok(MessageType::ForwardedMulticastData),
            9 => Ok(MessageType::ForwardedUnicastData),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.as_byte())
    }
}

/// Data published to every subscriber of a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastData {
    pub feed: String,
    pub topic: String,
    pub is_image: bool,
    pub data_packets: Option<Vec<DataPacket>>,
}

/// Data addressed to a single client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicastData {
    pub client_id: Uuid,
    pub feed: String,
    pub topic: String,
    pub is_image: bool,
    pub data_packets: Option<Vec<DataPacket>>,
}

/// Another client's subscription change, forwarded to notification listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedSubscriptionRequest {
    pub user: String,
    pub host: String,
    pub client_id: Uuid,
    pub feed: String,
    pub topic: String,
    pub is_add: bool,
}

/// Start or stop listening for subscription changes on a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub feed: String,
    pub is_add: bool,
}

/// Add or remove a subscription to a feed/topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub feed: String,
    pub topic: String,
    pub is_add: bool,
}

/// The distributor asking an authorizer whether a client may subscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub client_id: Uuid,
    pub host: String,
    pub user: String,
    pub feed: String,
    pub topic: String,
}

/// An authorizer's answer to an [`AuthorizationRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub client_id: Uuid,
    pub feed: String,
    pub topic: String,
    pub is_authorization_required: bool,
    pub entitlements: Option<Entitlements>,
}

/// Multicast data relayed by the distributor with its publisher's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedMulticastData {
    pub user: String,
    pub host: String,
    pub feed: String,
    pub topic: String,
    pub is_image: bool,
    pub data_packets: Option<Vec<DataPacket>>,
}

/// Unicast data relayed by the distributor with its publisher's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedUnicastData {
    pub user: String,
    pub host: String,
    pub client_id: Uuid,
    pub feed: String,
    pub topic: String,
    pub is_image: bool,
    pub data_packets: Option<Vec<DataPacket>>,
}

/// A complete wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    MulticastData(MulticastData),
    UnicastData(UnicastData),
    ForwardedSubscriptionRequest(ForwardedSubscriptionRequest),
    NotificationRequest(NotificationRequest),
    SubscriptionRequest(SubscriptionRequest),
    AuthorizationRequest(AuthorizationRequest),
    AuthorizationResponse(AuthorizationResponse),
    ForwardedMulticastData(ForwardedMulticastData),
    ForwardedUnicastData(ForwardedUnicastData),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::MulticastData(_) => MessageType::MulticastData,
            Message::UnicastData(_) => MessageType::UnicastData,
            Message::ForwardedSubscriptionRequest(_) => MessageType::ForwardedSubscriptionRequest,
            Message::NotificationRequest(_) => MessageType::NotificationRequest,
            Message::SubscriptionRequest(_) => MessageType::SubscriptionRequest,
            Message::AuthorizationRequest(_) => MessageType::AuthorizationRequest,
            Message::AuthorizationResponse(_) => MessageType::AuthorizationResponse,
            Message::ForwardedMulticastData(_) => MessageType::ForwardedMulticastData,
            Message::ForwardedUnicastData(_) => MessageType::ForwardedUnicastData,
        }
    }

    /// Apply the empty-means-absent rule to every collection in the frame.
    ///
    /// Empty packet lists, entitlement sets and payloads have no encoding of
    /// their own; they travel as absent and decode as `None`.
    pub fn normalized(self) -> Self {
        match self {
            Message::MulticastData(mut m) => {
                m.data_packets = normalize_packets(m.data_packets);
                Message::MulticastData(m)
            }
            Message::UnicastData(mut m) => {
                m.data_packets = normalize_packets(m.data_packets);
                Message::UnicastData(m)
            }
            Message::ForwardedMulticastData(mut m) => {
                m.data_packets = normalize_packets(m.data_packets);
                Message::ForwardedMulticastData(m)
            }
            Message::ForwardedUnicastData(mut m) => {
                m.data_packets = normalize_packets(m.data_packets);
                Message::ForwardedUnicastData(m)
            }
            Message::AuthorizationResponse(mut m) => {
                m.entitlements = m.entitlements.filter(|set| !set.is_empty());
                Message::AuthorizationResponse(m)
            }
            other => other,
        }
    }

    /// True if `decode(encode(self))` gives back `self`.
    pub fn is_normalized(&self) -> bool {
        match self {
            Message::MulticastData(m) => packets_normalized(m.data_packets.as_deref()),
            Message::UnicastData(m) => packets_normalized(m.data_packets.as_deref()),
            Message::ForwardedMulticastData(m) => packets_normalized(m.data_packets.as_deref()),
            Message::ForwardedUnicastData(m) => packets_normalized(m.data_packets.as_deref()),
            Message::AuthorizationResponse(m) => {
                m.entitlements.as_ref().map_or(true, |set| !set.is_empty())
            }
            _ => true,
        }
    }

    /// Decode one frame from the front of `reader`.
    ///
    /// Returns [`ProtocolError::Truncated`] if the buffer ends before the frame
    /// does; every other error means the stream is unsynchronized.
    pub fn decode(reader: &mut WireReader<'_>) -> Result<Self> {
        let header = reader.read_byte()? as u8;
        let message = match MessageType::try_from(header)? {
            MessageType::MulticastData => Message::MulticastData(MulticastData {
                feed: reader.read_string()?,
                topic: reader.read_string()?,
                is_image: reader.read_bool()?,
                data_packets: decode_packets(reader)?,
            }),
            MessageType::UnicastData => Message::UnicastData(UnicastData {
                client_id: reader.read_uuid()?,
                feed: reader.read_string()?,
                topic: reader.read_string()?,
                is_image: reader.read_bool()?,
                data_packets: decode_packets(reader)?,
            }),
            MessageType::ForwardedSubscriptionRequest => {
                Message::ForwardedSubscriptionRequest(ForwardedSubscriptionRequest {
                    user: reader.read_string()?,
                    host: reader.read_string()?,
                    client_id: reader.read_uuid()?,
                    feed: reader.read_string()?,
                    topic: reader.read_string()?,
                    is_add: reader.read_bool()?,
                })
            }
            MessageType::NotificationRequest => Message::NotificationRequest(NotificationRequest {
                feed: reader.read_string()?,
                is_add: reader.read_bool()?,
            }),
            MessageType::SubscriptionRequest => Message::SubscriptionRequest(SubscriptionRequest {
                feed: reader.read_string()?,
                topic: reader.read_string()?,
                is_add: reader.read_bool()?,
            }),
            MessageType::AuthorizationRequest => {
                Message::AuthorizationRequest(AuthorizationRequest {
                    client_id: reader.read_uuid()?,
                    host: reader.read_string()?,
                    user: reader.read_string()?,
                    feed: reader.read_string()?,
                    topic: reader.read_string()?,
                })
            }
            MessageType::AuthorizationResponse => {
                Message::AuthorizationResponse(AuthorizationResponse {
                    client_id: reader.read_uuid()?,
                    feed: reader.read_string()?,
                    topic: reader.read_string()?,
                    is_authorization_required: reader.read_bool()?,
                    entitlements: reader.read_int_set()?,
                })
            }
            MessageType::ForwardedMulticastData => {
                Message::ForwardedMulticastData(ForwardedMulticastData {
                    user: reader.read_string()?,
                    host: reader.read_string()?,
                    feed: reader.read_string()?,
                    topic: reader.read_string()?,
                    is_image: reader.read_bool()?,
                    data_packets: decode_packets(reader)?,
                })
            }
            MessageType::ForwardedUnicastData => {
                Message::ForwardedUnicastData(ForwardedUnicastData {
                    user: reader.read_string()?,
                    host: reader.read_string()?,
                    client_id: reader.read_uuid()?,
                    feed: reader.read_string()?,
                    topic: reader.read_string()?,
                    is_image: reader.read_bool()?,
                    data_packets: decode_packets(reader)?,
                })
            }
        };
        Ok(message)
    }

    /// Append the header byte and body to `writer`.
    ///
    /// Fails with [`ProtocolError::NotNormalized`] if the frame holds an empty
    /// collection, which would not decode back to the same value.
    pub fn encode(&self, writer: &mut WireWriter<'_>) -> Result<()> {
        if !self.is_normalized() {
            return Err(ProtocolError::NotNormalized(self.message_type()));
        }
        writer.put_byte(self.message_type().as_byte() as i8);
        match self {
            Message::MulticastData(m) => {
                writer.put_string(&m.feed)?;
                writer.put_string(&m.topic)?;
                writer.put_bool(m.is_image);
                encode_packets(writer, m.data_packets.as_deref())
            }
            Message::UnicastData(m) => {
                writer.put_uuid(&m.client_id);
                writer.put_string(&m.feed)?;
                writer.put_string(&m.topic)?;
                writer.put_bool(m.is_image);
                encode_packets(writer, m.data_packets.as_deref())
            }
            Message::ForwardedSubscriptionRequest(m) => {
                writer.put_string(&m.user)?;
                writer.put_string(&m.host)?;
                writer.put_uuid(&m.client_id);
                writer.put_string(&m.feed)?;
                writer.put_string(&m.topic)?;
                writer.put_bool(m.is_add);
                Ok(())
            }
            Message::NotificationRequest(m) => {
                writer.put_string(&m.feed)?;
                writer.put_bool(m.is_add);
                Ok(())
            }
            Message::SubscriptionRequest(m) => {
                writer.put_string(&m.feed)?;
                writer.put_string(&m.topic)?;
                writer.put_bool(m.is_add);
                Ok(())
            }
            Message::AuthorizationRequest(m) => {
                writer.put_uuid(&m.client_id);
                writer.put_string(&m.host)?;
                writer.put_string(&m.user)?;
                writer.put_string(&m.feed)?;
                writer.put_string(&m.topic)
            }
            Message::AuthorizationResponse(m) => {
                writer.put_uuid(&m.client_id);
                writer.put_string(&m.feed)?;
                writer.put_string(&m.topic)?;
                writer.put_bool(m.is_authorization_required);
                writer.put_int_set(m.entitlements.as_ref())
            }
            Message::ForwardedMulticastData(m) => {
                writer.put_string(&m.user)?;
                writer.put_string(&m.host)?;
                writer.put_string(&m.feed)?;
                writer.put_string(&m.topic)?;
                writer.put_bool(m.is_image);
                encode_packets(writer, m.data_packets.as_deref())
            }
            Message::ForwardedUnicastData(m) => {
                writer.put_string(&m.user)?;
                writer.put_string(&m.host)?;
                writer.put_uuid(&m.client_id);
                writer.put_string(&m.feed)?;
                writer.put_string(&m.topic)?;
                writer.put_bool(m.is_image);
                encode_packets(writer, m.data_packets.as_deref())
            }
        }
    }
}

macro_rules! impl_from_body {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Message {
                fn from(body: $variant) -> Self {
                    Message::$variant(body)
                }
            }
        )*
    };
}

impl_from_body!(
    MulticastData,
    UnicastData,
    ForwardedSubscriptionRequest,
    NotificationRequest,
    SubscriptionRequest,
    AuthorizationRequest,
    AuthorizationResponse,
    ForwardedMulticastData,
    ForwardedUnicastData,
);

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use bytes::BytesMut;

    fn client_id() -> Uuid {
        Uuid::parse_str("12345678123456781234567812345678").expect("valid uuid")
    }

    fn packets() -> Option<Vec<DataPacket>> {
        Some(vec![
            DataPacket::entitled([1, 2], &b"first"[..]),
            DataPacket::unrestricted(&b"second"[..]),
        ])
    }

    fn roundtrip(message: Message) {
        let mut buf = BytesMut::new();
        message.encode(&mut WireWriter::new(&mut buf)).unwrap();
        let mut reader = WireReader::new(&buf);
        let decoded = Message::decode(&mut reader).unwrap();
        assert_eq!(reader.remaining(), 0, "{message:?} left trailing bytes");
        assert_eq!(decoded, message);
    }

    #[test]
    fn every_variant_roundtrips() {
        let samples: Vec<Message> = vec![
            MulticastData {
                feed: "feed".into(),
                topic: "topic".into(),
                is_image: true,
                data_packets: packets(),
            }
            .into(),
            UnicastData {
                client_id: client_id(),
                feed: "feed".into(),
                topic: "topic".into(),
                is_image: false,
                data_packets: None,
            }
            .into(),
            ForwardedSubscriptionRequest {
                user: "user".into(),
                host: "host".into(),
                client_id: client_id(),
                feed: "feed".into(),
                topic: "topic".into(),
                is_add: true,
            }
            .into(),
            NotificationRequest {
                feed: "feed".into(),
                is_add: false,
            }
            .into(),
            SubscriptionRequest {
                feed: "feed".into(),
                topic: "topic".into(),
                is_add: true,
            }
            .into(),
            AuthorizationRequest {
                client_id: client_id(),
                host: "host".into(),
                user: "user".into(),
                feed: "feed".into(),
                topic: "topic".into(),
            }
            .into(),
            AuthorizationResponse {
                client_id: client_id(),
                feed: "feed".into(),
                topic: "topic".into(),
                is_authorization_required: true,
                entitlements: Some(Entitlements::from([1])),
            }
            .into(),
            ForwardedMulticastData {
                user: "user".into(),
                host: "host".into(),
                feed: "feed".into(),
                topic: "topic".into(),
                is_image: true,
                data_packets: packets(),
            }
            .into(),
            ForwardedUnicastData {
                user: "user".into(),
                host: "host".into(),
                client_id: client_id(),
                feed: "feed".into(),
                topic: "topic".into(),
                is_image: false,
                data_packets: packets(),
            }
            .into(),
        ];
        for message in samples {
            roundtrip(message);
        }
    }

    #[test]
    fn authorization_response_entitlement_shapes() {
        for entitlements in [
            None,
            Some(Entitlements::from([7])),
            Some((1..=50).collect::<Entitlements>()),
        ] {
            roundtrip(
                AuthorizationResponse {
                    client_id: client_id(),
                    feed: "LSE".into(),
                    topic: "VOD".into(),
                    is_authorization_required: entitlements.is_some(),
                    entitlements,
                }
                .into(),
            );
        }
    }

    #[test]
    fn empty_collections_are_refused_until_normalized() {
        let message: Message = ForwardedUnicastData {
            user: "user".into(),
            host: "host".into(),
            client_id: client_id(),
            feed: "feed".into(),
            topic: "topic".into(),
            is_image: true,
            data_packets: Some(vec![DataPacket {
                entitlements: Some(Entitlements::new()),
                data: Some(bytes::Bytes::new()),
            }]),
        }
        .into();

        let mut buf = BytesMut::new();
        let err = message.encode(&mut WireWriter::new(&mut buf)).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::NotNormalized(MessageType::ForwardedUnicastData)
        ));

        let message = message.normalized();
        assert!(message.is_normalized());
        roundtrip(message);
    }

    #[test]
    fn empty_entitlements_and_lists_normalize_to_absent() {
        let response = Message::from(AuthorizationResponse {
            client_id: client_id(),
            feed: "LSE".into(),
            topic: "VOD".into(),
            is_authorization_required: false,
            entitlements: Some(Entitlements::new()),
        });
        assert!(!response.is_normalized());
        match response.normalized() {
            Message::AuthorizationResponse(m) => assert_eq!(m.entitlements, None),
            other => panic!("unexpected {other:?}"),
        }

        let data = Message::from(MulticastData {
            feed: "LSE".into(),
            topic: "VOD".into(),
            is_image: false,
            data_packets: Some(Vec::new()),
        });
        assert!(!data.is_normalized());
        match data.normalized() {
            Message::MulticastData(m) => assert_eq!(m.data_packets, None),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn header_byte_matches_discriminant() {
        let mut buf = BytesMut::new();
        Message::from(NotificationRequest {
            feed: "F".into(),
            is_add: true,
        })
        .encode(&mut WireWriter::new(&mut buf))
        .unwrap();
        assert_eq!(buf[0], 4);
        assert_eq!(&buf[1..], &[0, 0, 0, 1, b'F', 1]);
    }

    #[test]
    fn unknown_discriminant_is_rejected() {
        for byte in [0u8, 10, 0xFF] {
            let buf = [byte, 0, 0, 0, 0];
            let err = Message::decode(&mut WireReader::new(&buf)).unwrap_err();
            assert!(matches!(err, ProtocolError::UnknownMessageType(b) if b == byte));
        }
    }

    #[test]
    fn every_discriminant_maps_back() {
        for byte in 1u8..=9 {
            assert_eq!(MessageType::try_from(byte).unwrap().as_byte(), byte);
        }
    }
}
