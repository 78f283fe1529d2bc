//!
//! Reads and writes query sessions to disk
//!
//! # Disk Format
//!
//! All in CBOR. The file is an array of CBOR lists. The array could be
//! definite or indefinite in length.
//!
//! // File
//! [
//!     packet,
//!     ...
//! ]
//!
//! // packet
//! [
//!     packet_type : integer,
//!     content1 : any,
//!     content2 : any,
//!     ...
//! ]
//!
//! # Packet Types
//!
//! Type 1:
//! Labelled timestamp w/ utf8 string identifier
//!     timestamp : integer, milliseconds from start,
//!     marker_name : string
//!
//! Type 2:
//! A request and the result the backend gave for it
//!     timestamp : integer, milliseconds from start,
//!     request : bytes, CBOR encoded query request,
//!     result : bytes, CBOR encoded result bundle,
//!
//! Type 3:
//! A request the backend refused
//!     timestamp : integer, milliseconds from start,
//!     request : bytes, CBOR encoded query request,
//!     message : string, reason given by the backend
//!

use std::mem;

use ciborium::value::Value;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::common::PacketIDs;
use crate::query::QueryRequest;
use crate::result::QueryResult;

#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Recording I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unable to encode packet content: {0}")]
    Encode(String),
    #[error("Unable to decode packet content: {0}")]
    Decode(String),
    #[error("Packet {0} is malformed")]
    BadPacket(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketStamp(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Marker(PacketStamp, String),
    Exchange(PacketStamp, Vec<u8>, Vec<u8>),
    Failure(PacketStamp, Vec<u8>, String),
}

impl Packet {
    pub fn message_stamp(&self) -> PacketIDs {
        match &self {
            Packet::Marker(_, _) => PacketIDs::Marker,
            Packet::Exchange(_, _, _) => PacketIDs::Exchange,
            Packet::Failure(_, _, _) => PacketIDs::Failure,
        }
    }

    /// Build an exchange packet from a request and its result
    pub fn exchange(
        stamp: PacketStamp,
        request: &QueryRequest,
        result: &QueryResult,
    ) -> Result<Self, RecordingError> {
        Ok(Packet::Exchange(stamp, encode(request)?, encode(result)?))
    }

    /// Build a failure packet from a request and the reason it failed
    pub fn failure(
        stamp: PacketStamp,
        request: &QueryRequest,
        message: impl Into<String>,
    ) -> Result<Self, RecordingError> {
        Ok(Packet::Failure(stamp, encode(request)?, message.into()))
    }
}

/// Encode a value to CBOR bytes
pub fn encode<T: Serialize>(t: &T) -> Result<Vec<u8>, RecordingError> {
    let mut buffer = Vec::<u8>::new();

    ciborium::ser::into_writer(t, &mut buffer)
        .map_err(|e| RecordingError::Encode(e.to_string()))?;

    Ok(buffer)
}

/// Decode a value from CBOR bytes
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, RecordingError> {
    ciborium::de::from_reader(data)
        .map_err(|e| RecordingError::Decode(e.to_string()))
}

pub fn parse_record(mut value: Value) -> Option<Packet> {
    let array = value.as_array_mut()?;
    let id: i128 = array.first()?.as_integer()?.into();
    let id: u8 = id.try_into().ok()?;

    fn value_to_int<T>(value: &Value) -> Option<T>
    where
        T: TryFrom<ciborium::value::Integer>,
    {
        value.as_integer()?.try_into().ok()
    }

    fn take_bytes(value: &mut Value) -> Option<Vec<u8>> {
        Some(mem::take(value.as_bytes_mut()?))
    }

    fn take_text(value: &mut Value) -> Option<String> {
        Some(mem::take(value.as_text_mut()?))
    }

    match PacketIDs::from_id(id) {
        PacketIDs::Marker => {
            let timestamp = value_to_int::<u32>(array.get(1)?)?;

            let name = take_text(array.get_mut(2)?)?;

            Some(Packet::Marker(PacketStamp(timestamp), name))
        }
        PacketIDs::Exchange => {
            let timestamp = value_to_int::<u32>(array.get(1)?)?;

            let request = take_bytes(array.get_mut(2)?)?;
            let result = take_bytes(array.get_mut(3)?)?;

            Some(Packet::Exchange(PacketStamp(timestamp), request, result))
        }
        PacketIDs::Failure => {
            let timestamp = value_to_int::<u32>(array.get(1)?)?;

            let request = take_bytes(array.get_mut(2)?)?;
            let message = take_text(array.get_mut(3)?)?;

            Some(Packet::Failure(PacketStamp(timestamp), request, message))
        }
        PacketIDs::Unknown => None,
    }
}

/// Read every packet of a recording.
///
/// Unlike a replay of a live stream, a recording that contains a packet we
/// cannot parse is rejected as a whole.
pub fn read_pack(
    source: impl std::io::Read,
) -> Result<Vec<Packet>, RecordingError> {
    let raw: Vec<Value> = ciborium::de::from_reader(source)
        .map_err(|e| RecordingError::Decode(e.to_string()))?;

    log::debug!("Recording holds {} packets", raw.len());

    raw.into_iter()
        .enumerate()
        .map(|(i, v)| {
            parse_record(v).ok_or_else(|| {
                log::warn!("Packet {i} of recording is malformed");
                RecordingError::BadPacket(i)
            })
        })
        .collect()
}

/// Starts a record array using an indefinite array byte. Be sure to call [end_pack] when done.
pub fn start_pack(
    sink: &mut impl std::io::Write,
) -> Result<(), RecordingError> {
    sink.write_all(&[0x9f])?;
    Ok(())
}

/// Ends a record array using an indefinite array stop byte. Be sure to have called [start_pack] beforehand at some point.
pub fn end_pack(sink: &mut impl std::io::Write) -> Result<(), RecordingError> {
    sink.write_all(&[0xff])?;
    sink.flush()?;
    Ok(())
}

/// Add a record to the pack
pub fn pack_record(
    record: Packet,
    sink: &mut impl std::io::Write,
) -> Result<(), RecordingError> {
    let id = record.message_stamp() as u8;

    let value: Vec<Value> = match record {
        Packet::Marker(t, v) => {
            vec![id.into(), t.0.into(), v.into()]
        }
        Packet::Exchange(t, req, res) => {
            vec![id.into(), t.0.into(), req.into(), res.into()]
        }
        Packet::Failure(t, req, msg) => {
            vec![id.into(), t.0.into(), req.into(), msg.into()]
        }
    };

    ciborium::ser::into_writer(&value, sink)
        .map_err(|e| RecordingError::Encode(e.to_string()))
}
