//! The Matroska element table and the typed field readers built on top of
//! [`crate::element`] (spec L4).
//!
//! Each `ebml_*(id)` combinator reads one element, checks its id against
//! `id`, and on a match decodes the body according to that element's wire
//! type. On a mismatch it returns a non-incomplete `Err`, so wrapping it in
//! `nom::combinator::opt` backs off to the original input — the pattern
//! every `MASTER` fold below uses to probe for each of its known children.

use nom::bytes::streaming::take;
use nom::IResult;

use crate::element::{ebml_element_header, EbmlError, EbmlId};

pub const EBML_HEADER: EbmlId = 0x1A45_DFA3;
pub const EBML_VERSION: EbmlId = 0x4286;
pub const EBML_READ_VERSION: EbmlId = 0x42F7;
pub const EBML_DOC_MAX_ID_LENGTH: EbmlId = 0x42F2;
pub const EBML_DOC_MAX_SIZE_LENGTH: EbmlId = 0x42F3;
pub const EBML_DOC_TYPE: EbmlId = 0x4282;
pub const EBML_DOC_TYPE_VERSION: EbmlId = 0x4287;
pub const EBML_DOC_TYPE_READ_VERSION: EbmlId = 0x4285;

pub const SEGMENT: EbmlId = 0x1853_8067;

pub const SEEK_HEAD: EbmlId = 0x114D_9B74;
pub const SEEK: EbmlId = 0x4DBB;
pub const SEEK_ID: EbmlId = 0x53AB;
pub const SEEK_POSITION: EbmlId = 0x53AC;

pub const INFO: EbmlId = 0x1549_A966;
pub const TIMESTAMP_SCALE: EbmlId = 0x2AD7_B1;
pub const DURATION: EbmlId = 0x4489;
pub const DATE_UTC: EbmlId = 0x4461;
pub const SEGMENT_UID: EbmlId = 0x73A4;
pub const MUXING_APP: EbmlId = 0x4D80;
pub const WRITING_APP: EbmlId = 0x5741;

pub const TRACKS: EbmlId = 0x1654_AE6B;
pub const TRACK_ENTRY: EbmlId = 0xAE;
pub const TRACK_NUMBER: EbmlId = 0xD7;
pub const TRACK_UID: EbmlId = 0x73C5;
pub const TRACK_TYPE: EbmlId = 0x83;
pub const FLAG_ENABLED: EbmlId = 0xB9;
pub const FLAG_DEFAULT: EbmlId = 0x88;
pub const FLAG_LACING: EbmlId = 0x9C;
pub const DEFAULT_DURATION: EbmlId = 0x23E3_83;
pub const CODEC_ID: EbmlId = 0x86;
pub const CODEC_PRIVATE: EbmlId = 0x63A2;

pub const VIDEO: EbmlId = 0xE0;
pub const PIXEL_WIDTH: EbmlId = 0xB0;
pub const PIXEL_HEIGHT: EbmlId = 0xBA;
pub const FLAG_INTERLACED: EbmlId = 0x9A;

pub const AUDIO: EbmlId = 0xE1;
pub const SAMPLING_FREQUENCY: EbmlId = 0xB5;
pub const CHANNELS: EbmlId = 0x9F;
pub const BIT_DEPTH: EbmlId = 0x6264;

pub const CUES: EbmlId = 0x1C53_BB6B;
pub const CUE_POINT: EbmlId = 0xBB;
pub const CUE_TIME: EbmlId = 0xB3;
pub const CUE_TRACK_POSITIONS: EbmlId = 0xB7;
pub const CUE_TRACK: EbmlId = 0xF7;
pub const CUE_CLUSTER_POSITION: EbmlId = 0xF1;

pub const CLUSTER: EbmlId = 0x1F43_B675;
pub const TIMESTAMP: EbmlId = 0xE7;
pub const SIMPLE_BLOCK: EbmlId = 0xA3;
pub const BLOCK_GROUP: EbmlId = 0xA0;
pub const BLOCK: EbmlId = 0xA1;
pub const BLOCK_DURATION: EbmlId = 0x9B;
pub const REFERENCE_BLOCK: EbmlId = 0xFB;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("unsupported float width {0} (expected 0, 4 or 8 bytes)")]
    InvalidFloatWidth(usize),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

pub fn decode_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

pub fn decode_sint(bytes: &[u8]) -> i64 {
    if bytes.is_empty() {
        return 0;
    }
    let sign_extend = if bytes[0] & 0x80 != 0 { 0xFFu8 } else { 0 };
    let mut acc = i64::from(sign_extend as i8) as u64;
    for &b in bytes {
        acc = (acc << 8) | b as u64;
    }
    acc as i64
}

pub fn decode_float(bytes: &[u8]) -> Result<f64, DecodeError> {
    match bytes.len() {
        0 => Ok(0.0),
        4 => Ok(f32::from_be_bytes(bytes.try_into().unwrap()) as f64),
        8 => Ok(f64::from_be_bytes(bytes.try_into().unwrap())),
        n => Err(DecodeError::InvalidFloatWidth(n)),
    }
}

/// Date elements are a signed nanosecond offset from 2001-01-01T00:00:00 UTC.
pub fn decode_date(bytes: &[u8]) -> i64 {
    decode_sint(bytes)
}

pub fn decode_str_ascii(bytes: &[u8]) -> Result<&str, DecodeError> {
    std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)
}

pub fn decode_str_utf8(bytes: &[u8]) -> Result<&str, DecodeError> {
    std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)
}

fn element_body(
    id: EbmlId,
) -> impl Fn(&[u8]) -> IResult<&[u8], &[u8], EbmlError> {
    move |input: &[u8]| {
        let (rest, (found_id, size)) = ebml_element_header()(input)?;
        if found_id != id {
            return Err(nom::Err::Error(EbmlError::UnexpectedElement(
                id, found_id, size,
            )));
        }
        let size = size.require().map_err(nom::Err::Error)?;
        take(size)(rest)
    }
}

pub fn ebml_uint(id: EbmlId) -> impl Fn(&[u8]) -> IResult<&[u8], u64, EbmlError> {
    move |input: &[u8]| {
        let (rest, body) = element_body(id)(input)?;
        Ok((rest, decode_uint(body)))
    }
}

pub fn ebml_sint(id: EbmlId) -> impl Fn(&[u8]) -> IResult<&[u8], i64, EbmlError> {
    move |input: &[u8]| {
        let (rest, body) = element_body(id)(input)?;
        Ok((rest, decode_sint(body)))
    }
}

pub fn ebml_str(id: EbmlId) -> impl Fn(&[u8]) -> IResult<&[u8], &str, EbmlError> {
    move |input: &[u8]| {
        let (rest, body) = element_body(id)(input)?;
        // Malformed UTF-8 in a text element is a skip-this-field matter,
        // not a reason to abort the surrounding master fold.
        let text = decode_str_ascii(body).unwrap_or("");
        Ok((rest, text))
    }
}

pub fn ebml_bin(id: EbmlId) -> impl Fn(&[u8]) -> IResult<&[u8], &[u8], EbmlError> {
    element_body(id)
}

pub fn ebml_float(id: EbmlId) -> impl Fn(&[u8]) -> IResult<&[u8], f64, EbmlError> {
    move |input: &[u8]| {
        let (rest, body) = element_body(id)(input)?;
        let value = decode_float(body).unwrap_or(0.0);
        Ok((rest, value))
    }
}

/// Matches an element by id regardless of its semantic type, returning its
/// raw payload bytes. Used for `Block`, whose body is framed by
/// [`crate::cluster`] rather than by a primitive decoder.
pub fn ebml_match(id: EbmlId) -> impl Fn(&[u8]) -> IResult<&[u8], &[u8], EbmlError> {
    element_body(id)
}

/// Descends into a `MASTER` element, calling `fold_fn` once per direct
/// child with that child's full header+body slice. `fold_fn` is expected to
/// try each of its known fields with `nom::combinator::opt`, matching one
/// field and ignoring the rest — the same "probe every candidate" style
/// every typed reader here uses for mismatches.
pub fn ebml_master_element_fold<'a, T>(
    id: EbmlId,
    init: T,
    mut fold_fn: impl FnMut(&mut T, &'a [u8]) -> Result<(), nom::Err<EbmlError>>,
) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], T, EbmlError> {
    move |input: &'a [u8]| {
        let (after, (found_id, size)) = ebml_element_header()(input)?;
        if found_id != id {
            return Err(nom::Err::Error(EbmlError::UnexpectedElement(
                id, found_id, size,
            )));
        }
        let size = size.require().map_err(nom::Err::Error)?;
        let (after, body) = take(size)(after)?;

        let mut acc = init;
        let mut cursor = body;
        while !cursor.is_empty() {
            let Ok((child_rest, (_child_id, child_size))) = ebml_element_header()(cursor) else {
                break;
            };
            let header_len = crate::element::slice_dist(cursor, child_rest);
            let child_size = match child_size.require() {
                Ok(n) => n,
                // Unknown size inside a bounded master can't be trusted.
                Err(_) => break,
            };
            let child_total = header_len + child_size;
            if child_total > cursor.len() as u64 {
                break;
            }

            let child_slice = &cursor[..child_total as usize];
            fold_fn(&mut acc, child_slice)?;
            cursor = &cursor[child_total as usize..];
        }

        Ok((after, acc))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nom::combinator::opt;

    #[test]
    fn uint_reads_big_endian_value() {
        let data = [TRACK_NUMBER as u8, 0x82, 0x01, 0x02];
        let (rest, value) = ebml_uint(TRACK_NUMBER)(&data).unwrap();
        assert_eq!(value, 0x0102);
        assert!(rest.is_empty());
    }

    #[test]
    fn mismatched_id_errors_without_consuming() {
        let data = [0x73, 0xC5, 0x81, 0x09]; // TRACK_UID, not TRACK_NUMBER
        let err = ebml_uint(TRACK_NUMBER)(&data).unwrap_err();
        assert!(matches!(
            err,
            nom::Err::Error(EbmlError::UnexpectedElement(TRACK_NUMBER, TRACK_UID, _))
        ));
    }

    #[test]
    fn opt_backs_off_to_original_input_on_mismatch() {
        let data = [0x73, 0xC5, 0x81, 0x09]; // TRACK_UID, not TRACK_NUMBER
        let (rest, value) = opt(ebml_uint(TRACK_NUMBER))(&data[..]).unwrap();
        assert_eq!(value, None);
        assert_eq!(rest, &data[..]);
    }

    #[test]
    fn str_reads_ascii_body() {
        let mut data = vec![CODEC_ID as u8, 0x86];
        data.extend_from_slice(b"A_OPUS");
        let (rest, value) = ebml_str(CODEC_ID)(&data).unwrap();
        assert_eq!(value, "A_OPUS");
        assert!(rest.is_empty());
    }

    #[test]
    fn master_fold_collects_known_children_and_skips_strangers() {
        // TRACK_ENTRY containing TRACK_NUMBER=1, an unknown child, TRACK_UID=9
        let mut data = vec![TRACK_ENTRY as u8];
        let mut body = Vec::new();
        body.extend_from_slice(&[TRACK_NUMBER as u8, 0x81, 0x01]);
        body.extend_from_slice(&[0x9F, 0x81, 0xFF]); // reuse CHANNELS id as "a stranger" here
        body.extend_from_slice(&[0x73, 0xC5, 0x81, 0x09]); // TRACK_UID
        data.push(0x80 | body.len() as u8);
        data.extend_from_slice(&body);

        #[derive(Default)]
        struct Acc {
            number: Option<u64>,
            uid: Option<u64>,
        }

        let (rest, acc) = ebml_master_element_fold(TRACK_ENTRY, Acc::default(), |acc, input| {
            if acc.number.is_none() {
                acc.number = opt(ebml_uint(TRACK_NUMBER))(input)?.1;
            }
            if acc.uid.is_none() {
                acc.uid = opt(ebml_uint(TRACK_UID))(input)?.1;
            }
            Ok::<(), nom::Err<EbmlError>>(())
        })(&data)
        .unwrap();

        assert!(rest.is_empty());
        assert_eq!(acc.number, Some(1));
        assert_eq!(acc.uid, Some(9));
    }
}
