//! Fragment planning for oversized JPEG payloads.

use crate::frame::FrameShape;
use crate::wire::{Datagram, FragmentBody, FragmentStart};

/// Splits `jpeg` into a start announcement followed by indexed bodies, all
/// sharing `seq`. Callers invoke this only for payloads whose single-
/// datagram encoding exceeds the packet budget.
pub fn fragment_frame(
    jpeg: &[u8],
    seq: u32,
    frame_shape: FrameShape,
    frame_count: u64,
    stream_id: u32,
    max_packet: usize,
) -> Vec<Datagram> {
    let total_packets = jpeg.len().div_ceil(max_packet);
    let mut datagrams = Vec::with_capacity(total_packets + 1);
    datagrams.push(Datagram::FragmentStart(FragmentStart {
        total_packets: total_packets as u32,
        seq,
        frame_shape,
        frame_count,
        stream_id,
    }));
    for (packet_index, chunk) in jpeg.chunks(max_packet).enumerate() {
        datagrams.push(Datagram::FragmentBody(FragmentBody {
            packet_index: packet_index as u32,
            seq,
            jpeg_chunk: chunk.to_vec(),
        }));
    }
    datagrams
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> FrameShape {
        FrameShape { height: 480, width: 640, channels: 3 }
    }

    fn bodies(datagrams: &[Datagram]) -> Vec<&FragmentBody> {
        datagrams
            .iter()
            .filter_map(|datagram| match datagram {
                Datagram::FragmentBody(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn splits_into_announced_count() {
        let jpeg = vec![7u8; 2500];
        let datagrams = fragment_frame(&jpeg, 42, shape(), 9, 1, 1000);
        match &datagrams[0] {
            Datagram::FragmentStart(start) => {
                assert_eq!(start.total_packets, 3);
                assert_eq!(start.seq, 42);
            }
            other => panic!("expected start, got {}", other.kind_str()),
        }
        let bodies = bodies(&datagrams);
        assert_eq!(bodies.len(), 3);
        assert_eq!(bodies[0].jpeg_chunk.len(), 1000);
        assert_eq!(bodies[1].jpeg_chunk.len(), 1000);
        assert_eq!(bodies[2].jpeg_chunk.len(), 500);
        for (index, body) in bodies.iter().enumerate() {
            assert_eq!(body.packet_index, index as u32);
            assert_eq!(body.seq, 42);
        }
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        let jpeg = vec![1u8; 3000];
        let datagrams = fragment_frame(&jpeg, 0, shape(), 0, 1, 1000);
        let bodies = bodies(&datagrams);
        assert_eq!(bodies.len(), 3);
        assert!(bodies.iter().all(|body| body.jpeg_chunk.len() == 1000));
    }

    #[test]
    fn concatenated_chunks_reproduce_the_payload() {
        let jpeg: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let datagrams = fragment_frame(&jpeg, 7, shape(), 0, 1, 1234);
        let mut rebuilt = Vec::new();
        for body in bodies(&datagrams) {
            rebuilt.extend_from_slice(&body.jpeg_chunk);
        }
        assert_eq!(rebuilt, jpeg);
    }
}
