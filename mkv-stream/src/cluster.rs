//! Cluster/Block/SimpleBlock framing and lacing (spec L6).
//!
//! Grounded in `read_simple_block_header`/`parse_block_group` from
//! `format/mkv/demux.rs`, extended to cover all four lacing modes — the
//! teacher only ever read `flags` and never branched on its lacing bits.

use bytes::Bytes;
use nom::bytes::streaming::take;
use nom::combinator::opt;
use nom::number::streaming::{be_i16, u8 as be_u8};
use nom::IResult;

use crate::element::{ebml_element_header, ebml_vint, EbmlError};
use crate::schema::{ebml_master_element_fold, ebml_uint, ebml_match, BLOCK, BLOCK_DURATION, BLOCK_GROUP};
use crate::vint::{self, VIntMode};

#[derive(Debug, thiserror::Error)]
pub enum LaceError {
    #[error("Xiph lacing is not supported")]
    XiphUnsupported,

    #[error("unrecognized lacing code {0:#04b}")]
    UnrecognizedCode(u8),

    #[error("laced frame count {0} implies more frames than the block has bytes for")]
    FrameCountOverflow(u8),

    #[error("{0}")]
    Vint(#[from] vint::VIntError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFlags {
    pub keyframe: bool,
    pub invisible: bool,
    pub lacing: Lacing,
    pub discardable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lacing {
    None,
    Xiph,
    FixedSize,
    Ebml,
}

fn parse_flags(byte: u8, is_simple_block: bool) -> BlockFlags {
    BlockFlags {
        keyframe: is_simple_block && (byte & 0b1000_0000) != 0,
        invisible: (byte & 0b0000_1000) != 0,
        lacing: match (byte & 0b0000_0110) >> 1 {
            0b00 => Lacing::None,
            0b01 => Lacing::Xiph,
            0b10 => Lacing::FixedSize,
            0b11 => Lacing::Ebml,
            _ => unreachable!("two bits only produce four values"),
        },
        discardable: is_simple_block && (byte & 0b0000_0001) != 0,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BlockHeader {
    pub track_number: u64,
    pub relative_timecode: i16,
    pub flags: BlockFlags,
}

fn read_block_header(input: &[u8], is_simple_block: bool) -> IResult<&[u8], BlockHeader, EbmlError> {
    let (input, track_number) = ebml_vint(input)?;
    let (input, relative_timecode) = be_i16(input)?;
    let (input, flags_byte) = be_u8(input)?;

    Ok((
        input,
        BlockHeader {
            track_number,
            relative_timecode,
            flags: parse_flags(flags_byte, is_simple_block),
        },
    ))
}

/// One laced (or unlaced) frame's payload, sized and sliced out of a
/// block's body.
#[derive(Debug, Clone)]
pub struct FrameDescriptor {
    pub track_number: u64,
    pub timecode_ticks: i64,
    pub keyframe: bool,
    pub discardable: bool,
    pub duration_ticks: Option<u64>,
    pub payload: Bytes,
}

fn split_laced_frames<'a>(
    body: &'a [u8],
    lacing: Lacing,
) -> Result<Vec<&'a [u8]>, LaceError> {
    match lacing {
        Lacing::None => Ok(vec![body]),
        Lacing::Xiph => Err(LaceError::XiphUnsupported),
        Lacing::FixedSize => {
            let (count_byte, rest) = body.split_first().ok_or(LaceError::FrameCountOverflow(0))?;
            let frame_count = *count_byte as usize + 1;
            if frame_count == 0 || rest.len() % frame_count != 0 {
                return Err(LaceError::FrameCountOverflow(*count_byte));
            }
            let frame_size = rest.len() / frame_count;
            Ok(rest.chunks(frame_size).collect())
        }
        Lacing::Ebml => {
            let (count_byte, mut cursor) =
                body.split_first().ok_or(LaceError::FrameCountOverflow(0))?;
            let frame_count = *count_byte as usize + 1;

            let mut sizes = Vec::with_capacity(frame_count);
            let (first, consumed) = vint::decode(cursor, VIntMode::Value)?;
            let first_size = first.value.as_u64().unwrap_or(0);
            sizes.push(first_size);
            cursor = &cursor[consumed..];

            let mut running = first_size as i64;
            for _ in 1..frame_count.saturating_sub(1) {
                let (delta, consumed) = vint::decode(cursor, VIntMode::Signed)?;
                let delta = match delta.value {
                    vint::VIntValue::Signed(d) => d,
                    _ => unreachable!("signed mode always yields Signed"),
                };
                running += delta;
                sizes.push(running.max(0) as u64);
                cursor = &cursor[consumed..];
            }

            let mut frames = Vec::with_capacity(frame_count);
            let mut declared_total = 0u64;
            for &size in &sizes {
                let size = size as usize;
                if size > cursor.len() {
                    return Err(LaceError::FrameCountOverflow(*count_byte));
                }
                frames.push(&cursor[..size]);
                cursor = &cursor[size..];
                declared_total += size as u64;
            }
            let _ = declared_total;
            // The last frame takes whatever remains, undeclared.
            frames.push(cursor);

            Ok(frames)
        }
    }
}

/// A bounded FIFO of [`FrameDescriptor`]s. Pathological laced blocks (or a
/// slow consumer) can't grow this without bound — once full, pushing is a
/// fatal error for the streaming controller rather than unbounded memory
/// growth.
pub struct FrameRing {
    capacity: usize,
    slots: std::collections::VecDeque<FrameDescriptor>,
}

#[derive(Debug, thiserror::Error)]
#[error("frame ring exceeded its {capacity}-slot capacity")]
pub struct RingCapacityExceeded {
    pub capacity: usize,
}

impl FrameRing {
    pub fn new(capacity: usize) -> Self {
        FrameRing {
            capacity,
            slots: std::collections::VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, frame: FrameDescriptor) -> Result<(), RingCapacityExceeded> {
        if self.slots.len() >= self.capacity {
            return Err(RingCapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.slots.push_back(frame);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<FrameDescriptor> {
        self.slots.pop_front()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("malformed block framing: {0:?}")]
    Framing(nom::Err<EbmlError>),

    #[error(transparent)]
    Lace(#[from] LaceError),
}

impl From<nom::Err<EbmlError>> for ClusterError {
    fn from(e: nom::Err<EbmlError>) -> Self {
        ClusterError::Framing(e)
    }
}

/// Reads a `SimpleBlock`'s body (header already framed by the caller, which
/// knows the element's total size) into frame descriptors relative to
/// `cluster_timecode_ticks`.
pub fn read_simple_block(
    input: &[u8],
    cluster_timecode_ticks: u64,
) -> Result<Vec<FrameDescriptor>, ClusterError> {
    let (rest, header) = read_block_header(input, true)?;
    let frames = split_laced_frames(rest, header.flags.lacing)?
        .into_iter()
        .map(|payload| FrameDescriptor {
            track_number: header.track_number,
            timecode_ticks: cluster_timecode_ticks as i64 + header.relative_timecode as i64,
            keyframe: header.flags.keyframe,
            discardable: header.flags.discardable,
            duration_ticks: None,
            payload: Bytes::copy_from_slice(payload),
        })
        .collect();
    Ok(frames)
}

/// A `BlockGroup`'s folded state: the `Block` payload plus whatever
/// sibling fields (`BlockDuration`) apply to every laced frame inside it.
#[derive(Default)]
struct RawBlockGroup<'a> {
    block: Option<&'a [u8]>,
    duration: Option<u64>,
}

/// Reads a `BlockGroup` element (header included) into frame descriptors.
pub fn read_block_group<'a>(
    input: &'a [u8],
    cluster_timecode_ticks: u64,
) -> IResult<&'a [u8], Result<Vec<FrameDescriptor>, LaceError>, EbmlError> {
    let (rest, group) = ebml_master_element_fold(BLOCK_GROUP, RawBlockGroup::default(), |acc, input| {
        if acc.block.is_none() {
            acc.block = opt(ebml_match(BLOCK))(input)?.1;
        }
        if acc.duration.is_none() {
            acc.duration = opt(ebml_uint(BLOCK_DURATION))(input)?.1;
        }
        Ok::<(), nom::Err<EbmlError>>(())
    })(input)?;

    let Some(block) = group.block else {
        return Ok((rest, Ok(Vec::new())));
    };

    let (body, header) = read_block_header(block, false)?;

    let frames = split_laced_frames(body, header.flags.lacing).map(|frames| {
        frames
            .into_iter()
            .map(|payload| FrameDescriptor {
                track_number: header.track_number,
                timecode_ticks: cluster_timecode_ticks as i64 + header.relative_timecode as i64,
                keyframe: header.flags.keyframe,
                discardable: header.flags.discardable,
                duration_ticks: group.duration,
                payload: Bytes::copy_from_slice(payload),
            })
            .collect()
    });

    Ok((rest, frames))
}

/// Peeks a cluster-level child's header without consuming it, used by the
/// streaming controller to decide whether it's a `Timestamp`, a block, or
/// the next `Cluster`/`Cues` boundary.
pub fn peek_element_header(input: &[u8]) -> IResult<&[u8], (crate::element::EbmlId, crate::element::ElementSize), EbmlError> {
    ebml_element_header()(input)
}

/// Reads a whole element's header+body as a single slice, for elements the
/// cluster reader wants to skip wholesale (an unrecognized cluster child).
pub fn take_whole_element(input: &[u8]) -> IResult<&[u8], &[u8], EbmlError> {
    let (rest, (_, size)) = ebml_element_header()(input)?;
    let size = size.require().map_err(nom::Err::Error)?;
    take(size)(rest)
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test]
    fn flags_decode_keyframe_and_lacing_bits() {
        let flags = parse_flags(0b1000_0110, true);
        assert!(flags.keyframe);
        assert_eq!(flags.lacing, Lacing::Ebml);
        assert!(!flags.discardable);
    }

    #[test_case(0b00_0000, Lacing::None; "no lacing")]
    #[test_case(0b00_0010, Lacing::Xiph; "xiph")]
    #[test_case(0b00_0100, Lacing::FixedSize; "fixed size")]
    #[test_case(0b00_0110, Lacing::Ebml; "ebml")]
    fn lacing_bits_map_to_the_four_modes(byte: u8, expected: Lacing) {
        assert_eq!(parse_flags(byte, false).lacing, expected);
    }

    #[test]
    fn unlaced_block_yields_one_frame() {
        // track 1, timecode 0, flags=no lacing, payload b"hi"
        let mut data = vec![0x81, 0x00, 0x00, 0x00];
        data.extend_from_slice(b"hi");
        let frames = read_simple_block(&data, 1000).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].payload[..], b"hi");
        assert_eq!(frames[0].timecode_ticks, 1000);
    }

    #[test]
    fn fixed_size_lacing_splits_equal_chunks() {
        // track 1, timecode 0, flags=0x04 (fixed-size lacing), 3 frames of 2 bytes each
        let mut data = vec![0x81, 0x00, 0x00, 0x04, 0x02]; // frame_count byte = 2 -> 3 frames
        data.extend_from_slice(b"aabbcc");
        let frames = read_simple_block(&data, 0).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0].payload[..], b"aa");
        assert_eq!(&frames[1].payload[..], b"bb");
        assert_eq!(&frames[2].payload[..], b"cc");
    }

    #[test]
    fn ebml_lacing_splits_by_declared_size_then_delta() {
        // track 1, timecode 0, flags=0x06 (EBML lacing); 3 frames: first size
        // VInt = 3, then a zero signed-delta VInt (0xBF: width-1 payload 0x3F
        // equals the width-1 bias, so unbiased delta is 0) -> second size 3,
        // third/last frame takes whatever remains.
        let mut data = vec![0x81, 0x00, 0x00, 0x06, 0x02, 0x83, 0xBF];
        data.extend_from_slice(b"AAABBBCCCC");
        let frames = read_simple_block(&data, 0).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0].payload[..], b"AAA");
        assert_eq!(&frames[1].payload[..], b"BBB");
        assert_eq!(&frames[2].payload[..], b"CCCC");
    }

    #[test]
    fn xiph_lacing_is_rejected() {
        let body = [0x01, 0x05, b'a', b'b', b'c', b'd', b'e'];
        assert!(matches!(
            split_laced_frames(&body, Lacing::Xiph),
            Err(LaceError::XiphUnsupported)
        ));
    }

    #[test]
    fn ring_rejects_pushes_past_capacity() {
        let mut ring = FrameRing::new(2);
        let frame = |n: u64| FrameDescriptor {
            track_number: n,
            timecode_ticks: 0,
            keyframe: false,
            discardable: false,
            duration_ticks: None,
            payload: Bytes::new(),
        };
        ring.push(frame(1)).unwrap();
        ring.push(frame(2)).unwrap();
        assert!(ring.push(frame(3)).is_err());
        assert_eq!(ring.pop().unwrap().track_number, 1);
    }
}
