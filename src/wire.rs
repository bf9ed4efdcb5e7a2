//! Wire format for the UDP frame transport.
//!
//! Every datagram is a CBOR map with text keys, one of four shapes told
//! apart by which keys are present:
//!
//! | Shape | Discriminator | Carries |
//! |---|---|---|
//! | sync | `kind = "sync"` | stream identity, current sequence, liveness |
//! | fragment-start | `total_packets` | fragment count announcement for one frame |
//! | fragment-body | `packet_index` | one slice of a fragmented JPEG |
//! | whole-frame | `jpeg_data` | a complete JPEG in a single datagram |
//!
//! The encoding is deliberately self-describing rather than positional:
//! both endpoints tolerate unknown extra keys, so either side can be
//! upgraded independently as long as the discriminators and the fields
//! below keep their meaning. A datagram that matches no shape, or matches
//! a shape but is missing one of that shape's fields, is malformed; the
//! receiver counts it and drops it.
//!
//! The constants in this module travel on the wire in the sense that both
//! endpoints must agree on them for sequence arithmetic and fragmentation
//! to line up.

use crate::error::{Error, Result};
use crate::frame::FrameShape;
use ciborium::Value;
use std::time::Duration;

/// Frame sequence numbers live in `[0, MAX_SEQ)` and wrap to 0.
pub const MAX_SEQ: u32 = 5000;
/// Largest JPEG payload sent in a single datagram; larger frames fragment.
pub const MAX_PACKET: usize = 60_000;
/// Cadence of periodic sync datagrams.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(3);
/// Silence after the first sync before the stream is considered unstable.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(10);
/// Lifetime of incomplete fragment sets and of parked reorder entries.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(5);
/// Reorder buffer capacity; beyond this, gaps are skipped by force.
pub const MAX_REORDER: usize = 50;
/// Window below `MAX_SEQ` within which a backwards sequence jump is read
/// as a wrap rather than reordering.
pub const RESET_THRESHOLD: u32 = 1000;
/// Periodic-sync disagreement beyond which the receiver resynchronizes.
pub const DRIFT_THRESHOLD: i64 = 100;
/// Default delivery queue depth between the receiver and its consumer.
pub const QUEUE_SIZE: usize = 10;
/// A cold-starting receiver jumps forward only past this sequence number.
pub const COLD_START_JUMP: u32 = 10;
/// Pause between fragment datagrams to soften bursts at the socket buffer.
pub const FRAGMENT_PAUSE: Duration = Duration::from_micros(500);
/// Sender socket `SO_SNDBUF`.
pub const SEND_BUFFER_BYTES: usize = 65_536;
/// Receiver socket `SO_RCVBUF`.
pub const RECV_BUFFER_BYTES: usize = 4 * 1024 * 1024;
/// Receiver socket read timeout; sweeps run at least this often.
pub const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

/// One decoded datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
    Sync(SyncMessage),
    FragmentStart(FragmentStart),
    FragmentBody(FragmentBody),
    WholeFrame(WholeFrame),
}

/// Out-of-band stream advertisement.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncMessage {
    pub stream_id: u32,
    pub sync_seq: u64,
    pub current_seq: u32,
    pub frame_count: u64,
    pub timestamp: f64,
    pub is_new_stream: bool,
}

/// Announces that frame `seq` follows as `total_packets` bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentStart {
    pub total_packets: u32,
    pub seq: u32,
    pub frame_shape: FrameShape,
    pub frame_count: u64,
    pub stream_id: u32,
}

/// One slice of a fragmented JPEG payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentBody {
    pub packet_index: u32,
    pub seq: u32,
    pub jpeg_chunk: Vec<u8>,
}

/// A self-contained frame.
#[derive(Debug, Clone, PartialEq)]
pub struct WholeFrame {
    pub seq: u32,
    pub jpeg_data: Vec<u8>,
    pub timestamp: f64,
    pub frame_shape: FrameShape,
    pub frame_count: u64,
    pub stream_id: u32,
}

impl Datagram {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Datagram::Sync(_) => "sync",
            Datagram::FragmentStart(_) => "fragment_start",
            Datagram::FragmentBody(_) => "fragment_body",
            Datagram::WholeFrame(_) => "whole_frame",
        }
    }
}

fn entry(key: &str, value: Value) -> (Value, Value) {
    (Value::Text(key.to_string()), value)
}

fn uint(value: u64) -> Value {
    Value::Integer(value.into())
}

fn shape_value(shape: &FrameShape) -> Value {
    Value::Array(vec![uint(shape.height as u64), uint(shape.width as u64), uint(shape.channels as u64)])
}

/// Serializes a datagram to its on-wire CBOR bytes.
pub fn encode_datagram(datagram: &Datagram) -> Result<Vec<u8>> {
    let value = match datagram {
        Datagram::Sync(sync) => Value::Map(vec![
            entry("kind", Value::Text("sync".to_string())),
            entry("stream_id", uint(sync.stream_id as u64)),
            entry("sync_seq", uint(sync.sync_seq)),
            entry("current_seq", uint(sync.current_seq as u64)),
            entry("frame_count", uint(sync.frame_count)),
            entry("timestamp", Value::Float(sync.timestamp)),
            entry("is_new_stream", Value::Bool(sync.is_new_stream)),
        ]),
        Datagram::FragmentStart(start) => Value::Map(vec![
            entry("total_packets", uint(start.total_packets as u64)),
            entry("seq", uint(start.seq as u64)),
            entry("frame_shape", shape_value(&start.frame_shape)),
            entry("frame_count", uint(start.frame_count)),
            entry("stream_id", uint(start.stream_id as u64)),
        ]),
        Datagram::FragmentBody(body) => Value::Map(vec![
            entry("packet_index", uint(body.packet_index as u64)),
            entry("seq", uint(body.seq as u64)),
            entry("jpeg_chunk", Value::Bytes(body.jpeg_chunk.clone())),
        ]),
        Datagram::WholeFrame(frame) => Value::Map(vec![
            entry("seq", uint(frame.seq as u64)),
            entry("jpeg_data", Value::Bytes(frame.jpeg_data.clone())),
            entry("timestamp", Value::Float(frame.timestamp)),
            entry("frame_shape", shape_value(&frame.frame_shape)),
            entry("frame_count", uint(frame.frame_count)),
            entry("stream_id", uint(frame.stream_id as u64)),
        ]),
    };

    let mut buf = Vec::new();
    ciborium::into_writer(&value, &mut buf).map_err(|err| Error::Encode(err.to_string()))?;
    Ok(buf)
}

/// Text-keyed fields of a decoded map. Non-text keys and unrecognized
/// entries are ignored, which is what keeps the format schema-flexible.
struct FieldBag {
    entries: Vec<(String, Value)>,
}

impl FieldBag {
    fn from_value(value: Value) -> Result<Self> {
        let map = match value {
            Value::Map(map) => map,
            other => return Err(Error::Malformed(format!("datagram is not a map: {other:?}"))),
        };
        let entries = map
            .into_iter()
            .filter_map(|(key, value)| match key {
                Value::Text(text) => Some((text, value)),
                _ => None,
            })
            .collect();
        Ok(Self { entries })
    }

    fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    fn take(&mut self, key: &str) -> Option<Value> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.swap_remove(position).1)
    }

    fn take_u64(&mut self, key: &str) -> Result<u64> {
        match self.take(key) {
            Some(Value::Integer(i)) => {
                let n = i128::from(i);
                u64::try_from(n).map_err(|_| Error::Malformed(format!("field {key} out of range: {n}")))
            }
            Some(other) => Err(Error::Malformed(format!("field {key} is not an integer: {other:?}"))),
            None => Err(Error::Malformed(format!("missing field {key}"))),
        }
    }

    fn take_u32(&mut self, key: &str) -> Result<u32> {
        let n = self.take_u64(key)?;
        u32::try_from(n).map_err(|_| Error::Malformed(format!("field {key} out of range: {n}")))
    }

    fn take_f64(&mut self, key: &str) -> Result<f64> {
        match self.take(key) {
            Some(Value::Float(f)) => Ok(f),
            Some(Value::Integer(i)) => Ok(i128::from(i) as f64),
            Some(other) => Err(Error::Malformed(format!("field {key} is not a number: {other:?}"))),
            None => Err(Error::Malformed(format!("missing field {key}"))),
        }
    }

    fn take_bool(&mut self, key: &str) -> Result<bool> {
        match self.take(key) {
            Some(Value::Bool(b)) => Ok(b),
            Some(other) => Err(Error::Malformed(format!("field {key} is not a bool: {other:?}"))),
            None => Err(Error::Malformed(format!("missing field {key}"))),
        }
    }

    fn take_bytes(&mut self, key: &str) -> Result<Vec<u8>> {
        match self.take(key) {
            Some(Value::Bytes(bytes)) => Ok(bytes),
            Some(other) => Err(Error::Malformed(format!("field {key} is not a byte string: {other:?}"))),
            None => Err(Error::Malformed(format!("missing field {key}"))),
        }
    }

    fn take_shape(&mut self, key: &str) -> Result<FrameShape> {
        let items = match self.take(key) {
            Some(Value::Array(items)) => items,
            Some(other) => return Err(Error::Malformed(format!("field {key} is not an array: {other:?}"))),
            None => return Err(Error::Malformed(format!("missing field {key}"))),
        };
        if items.len() != 3 {
            return Err(Error::Malformed(format!("field {key} has {} elements, expected 3", items.len())));
        }
        let mut dims = [0u64; 3];
        for (slot, item) in dims.iter_mut().zip(items) {
            match item {
                Value::Integer(i) => {
                    let n = i128::from(i);
                    *slot = u64::try_from(n)
                        .map_err(|_| Error::Malformed(format!("field {key} dimension out of range: {n}")))?;
                }
                other => return Err(Error::Malformed(format!("field {key} dimension is not an integer: {other:?}"))),
            }
        }
        let height = u32::try_from(dims[0]).map_err(|_| Error::Malformed("frame height out of range".to_string()))?;
        let width = u32::try_from(dims[1]).map_err(|_| Error::Malformed("frame width out of range".to_string()))?;
        let channels = u8::try_from(dims[2]).map_err(|_| Error::Malformed("channel count out of range".to_string()))?;
        Ok(FrameShape { height, width, channels })
    }
}

/// Deserializes and classifies one datagram by field presence.
pub fn decode_datagram(bytes: &[u8]) -> Result<Datagram> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|err| Error::Malformed(format!("not a CBOR datagram: {err}")))?;
    let mut fields = FieldBag::from_value(value)?;

    if let Some(Value::Text(kind)) = fields.take("kind") {
        if kind != "sync" {
            return Err(Error::Malformed(format!("unknown datagram kind: {kind}")));
        }
        return Ok(Datagram::Sync(SyncMessage {
            stream_id: fields.take_u32("stream_id")?,
            sync_seq: fields.take_u64("sync_seq")?,
            current_seq: fields.take_u32("current_seq")?,
            frame_count: fields.take_u64("frame_count")?,
            timestamp: fields.take_f64("timestamp")?,
            is_new_stream: fields.take_bool("is_new_stream")?,
        }));
    }

    if fields.has("total_packets") {
        return Ok(Datagram::FragmentStart(FragmentStart {
            total_packets: fields.take_u32("total_packets")?,
            seq: fields.take_u32("seq")?,
            frame_shape: fields.take_shape("frame_shape")?,
            frame_count: fields.take_u64("frame_count")?,
            stream_id: fields.take_u32("stream_id")?,
        }));
    }

    if fields.has("packet_index") {
        return Ok(Datagram::FragmentBody(FragmentBody {
            packet_index: fields.take_u32("packet_index")?,
            seq: fields.take_u32("seq")?,
            jpeg_chunk: fields.take_bytes("jpeg_chunk")?,
        }));
    }

    if fields.has("jpeg_data") {
        return Ok(Datagram::WholeFrame(WholeFrame {
            seq: fields.take_u32("seq")?,
            jpeg_data: fields.take_bytes("jpeg_data")?,
            timestamp: fields.take_f64("timestamp")?,
            frame_shape: fields.take_shape("frame_shape")?,
            frame_count: fields.take_u64("frame_count")?,
            stream_id: fields.take_u32("stream_id")?,
        }));
    }

    Err(Error::Malformed("no recognized datagram shape".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_shape() -> FrameShape {
        FrameShape { height: 480, width: 640, channels: 3 }
    }

    #[test]
    fn sync_round_trip() {
        let datagram = Datagram::Sync(SyncMessage {
            stream_id: 0x7FFF_0001,
            sync_seq: 12,
            current_seq: 4999,
            frame_count: 60_012,
            timestamp: 1234.5,
            is_new_stream: true,
        });
        let bytes = encode_datagram(&datagram).expect("encode");
        assert_eq!(decode_datagram(&bytes).expect("decode"), datagram);
    }

    #[test]
    fn fragment_start_round_trip() {
        let datagram = Datagram::FragmentStart(FragmentStart {
            total_packets: 5,
            seq: 77,
            frame_shape: sample_shape(),
            frame_count: 100,
            stream_id: 9,
        });
        let bytes = encode_datagram(&datagram).expect("encode");
        assert_eq!(decode_datagram(&bytes).expect("decode"), datagram);
    }

    #[test]
    fn fragment_body_round_trip() {
        let datagram = Datagram::FragmentBody(FragmentBody {
            packet_index: 3,
            seq: 77,
            jpeg_chunk: vec![0xFF, 0xD8, 0x00, 0x42],
        });
        let bytes = encode_datagram(&datagram).expect("encode");
        assert_eq!(decode_datagram(&bytes).expect("decode"), datagram);
    }

    #[test]
    fn whole_frame_round_trip() {
        let datagram = Datagram::WholeFrame(WholeFrame {
            seq: 4999,
            jpeg_data: vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9],
            timestamp: 42.25,
            frame_shape: sample_shape(),
            frame_count: 7,
            stream_id: 3,
        });
        let bytes = encode_datagram(&datagram).expect("encode");
        assert_eq!(decode_datagram(&bytes).expect("decode"), datagram);
    }

    #[test]
    fn payload_bytes_stay_compact() {
        let chunk = vec![0xAB; MAX_PACKET];
        let bytes = encode_datagram(&Datagram::FragmentBody(FragmentBody {
            packet_index: 0,
            seq: 1,
            jpeg_chunk: chunk,
        }))
        .expect("encode");
        // Byte strings must not balloon into per-element integers; the
        // overhead budget is what keeps a fragment inside one datagram.
        assert!(bytes.len() < MAX_PACKET + 100, "fragment datagram is {} bytes", bytes.len());
    }

    #[test]
    fn unknown_extra_fields_are_ignored() {
        let value = Value::Map(vec![
            (Value::Text("packet_index".into()), Value::Integer(1.into())),
            (Value::Text("seq".into()), Value::Integer(9.into())),
            (Value::Text("jpeg_chunk".into()), Value::Bytes(vec![1, 2, 3])),
            (Value::Text("padding".into()), Value::Text("future".into())),
            (Value::Integer(7.into()), Value::Bool(true)),
        ]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes).expect("encode");
        match decode_datagram(&bytes).expect("decode") {
            Datagram::FragmentBody(body) => {
                assert_eq!(body.packet_index, 1);
                assert_eq!(body.seq, 9);
                assert_eq!(body.jpeg_chunk, vec![1, 2, 3]);
            }
            other => panic!("classified as {}", other.kind_str()),
        }
    }

    #[test]
    fn unrecognized_shapes_are_malformed() {
        assert!(decode_datagram(&[]).is_err());
        assert!(decode_datagram(&[0x00, 0x01, 0x02]).is_err());

        // A valid CBOR value that is not a map.
        let mut bytes = Vec::new();
        ciborium::into_writer(&Value::Integer(5.into()), &mut bytes).expect("encode");
        assert!(decode_datagram(&bytes).is_err());

        // A map with none of the discriminators.
        let value = Value::Map(vec![(Value::Text("hello".into()), Value::Text("world".into()))]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes).expect("encode");
        assert!(decode_datagram(&bytes).is_err());
    }

    #[test]
    fn shape_match_with_missing_field_is_malformed() {
        // Discriminator present, required field absent.
        let value = Value::Map(vec![
            (Value::Text("total_packets".into()), Value::Integer(4.into())),
            (Value::Text("seq".into()), Value::Integer(2.into())),
        ]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes).expect("encode");
        assert!(decode_datagram(&bytes).is_err());
    }
}
