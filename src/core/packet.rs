//! # Data Packets
//!
//! A [`DataPacket`] is the unit of published data: an optional set of
//! entitlements restricting who may see it, and an optional opaque payload.
//!
//! ## Wire Format
//! ```text
//! [int set: entitlements] [byte array: data]
//! ```
//! A packet list is `[int count]` followed by `count` packets; a count of zero
//! means the list is absent.
//!
//! Empty collections and absent ones share one encoding, so the constructors
//! normalize empty values to `None`. Packets assembled from the public fields
//! can be brought into that form with [`DataPacket::normalized`].

use std::collections::BTreeSet;
use std::fmt;

use bytes::Bytes;

use crate::core::wire::{WireReader, WireWriter};
use crate::error::Result;

/// Integer permission tags attached to a packet.
pub type Entitlements = BTreeSet<i32>;

/// One entitlement-tagged payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataPacket {
    /// `None` means the payload is distributed unfiltered.
    pub entitlements: Option<Entitlements>,
    /// `None` means an empty (heartbeat) packet.
    pub data: Option<Bytes>,
}

impl DataPacket {
    pub fn new(entitlements: Option<Entitlements>, data: Option<Bytes>) -> Self {
        Self {
            entitlements: entitlements.filter(|set| !set.is_empty()),
            data: data.filter(|bytes| !bytes.is_empty()),
        }
    }

    /// Packet visible to every subscriber.
    pub fn unrestricted<B: Into<Bytes>>(data: B) -> Self {
        Self::new(None, Some(data.into()))
    }

    /// Packet restricted to holders of any of `entitlements`.
    pub fn entitled<I, B>(entitlements: I, data: B) -> Self
    where
        I: IntoIterator<Item = i32>,
        B: Into<Bytes>,
    {
        Self::new(Some(entitlements.into_iter().collect()), Some(data.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_none()
    }

    /// Apply the empty-means-absent rule to a packet built field by field.
    pub fn normalized(self) -> Self {
        Self::new(self.entitlements, self.data)
    }

    /// True if the packet encodes to exactly itself.
    pub fn is_normalized(&self) -> bool {
        self.entitlements.as_ref().map_or(true, |set| !set.is_empty())
            && self.data.as_ref().map_or(true, |data| !data.is_empty())
    }

    pub(crate) fn decode(reader: &mut WireReader<'_>) -> Result<Self> {
        let entitlements = reader.read_int_set()?;
        let data = reader.read_byte_array()?;
        Ok(Self { entitlements, data })
    }

    pub(crate) fn encode(&self, writer: &mut WireWriter<'_>) -> Result<()> {
        writer.put_int_set(self.entitlements.as_ref())?;
        writer.put_byte_array(self.data.as_deref())
    }
}

impl fmt::Display for DataPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entitlements {
            Some(set) => write!(f, "entitlements={set:?}")?,
            None => write!(f, "entitlements=None")?,
        }
        match &self.data {
            Some(data) => write!(f, ",data={} bytes", data.len()),
            None => write!(f, ",data=None"),
        }
    }
}

/// Read an optional packet list; a zero count decodes as `None`.
pub(crate) fn decode_packets(reader: &mut WireReader<'_>) -> Result<Option<Vec<DataPacket>>> {
    let count = reader.read_count()?;
    if count == 0 {
        return Ok(None);
    }
    // The count is attacker controlled; let the vector grow as records parse.
    let mut packets = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        packets.push(DataPacket::decode(reader)?);
    }
    Ok(Some(packets))
}

/// Empty lists become `None` and every packet is normalized.
pub(crate) fn normalize_packets(packets: Option<Vec<DataPacket>>) -> Option<Vec<DataPacket>> {
    packets
        .filter(|packets| !packets.is_empty())
        .map(|packets| packets.into_iter().map(DataPacket::normalized).collect())
}

pub(crate) fn packets_normalized(packets: Option<&[DataPacket]>) -> bool {
    packets.map_or(true, |packets| {
        !packets.is_empty() && packets.iter().all(DataPacket::is_normalized)
    })
}

pub(crate) fn encode_packets(
    writer: &mut WireWriter<'_>,
    packets: Option<&[DataPacket]>,
) -> Result<()> {
    match packets {
        Some(packets) => {
            writer.put_count(packets.len())?;
            for packet in packets {
                packet.encode(writer)?;
            }
            Ok(())
        }
        None => writer.put_count(0),
    }
}
