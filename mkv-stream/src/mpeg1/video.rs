//! MPEG-1 video sequence header (ISO/IEC 11172-2 §2.4.3.2), as carried in a
//! Matroska `V_MPEG1` track's `CodecPrivate` or at the start of its first
//! frame.

use super::BitReader;
use thiserror::Error;

const SEQUENCE_HEADER_CODE: u32 = 0x0000_01B3;
const QUANTIZER_MATRIX_BITS: u32 = 64 * 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VideoHeaderError {
    #[error("truncated MPEG-1 sequence header")]
    Truncated,
    #[error("missing 0x{SEQUENCE_HEADER_CODE:06x} sequence header start code")]
    MissingStartCode,
    #[error("sequence header marker bit was not set")]
    MissingMarkerBit,
}

/// One of the sixteen [`frame_rate_code`] table entries defined by the
/// standard; codes 0 and 9-15 are reserved and surface as `None` on the
/// header instead of a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

const FRAME_RATES: [Option<FrameRate>; 16] = [
    None,
    Some(FrameRate { numerator: 24000, denominator: 1001 }),
    Some(FrameRate { numerator: 24, denominator: 1 }),
    Some(FrameRate { numerator: 25, denominator: 1 }),
    Some(FrameRate { numerator: 30000, denominator: 1001 }),
    Some(FrameRate { numerator: 30, denominator: 1 }),
    Some(FrameRate { numerator: 50, denominator: 1 }),
    Some(FrameRate { numerator: 60000, denominator: 1001 }),
    Some(FrameRate { numerator: 60, denominator: 1 }),
    None,
    None,
    None,
    None,
    None,
    None,
    None,
];

#[derive(Debug, Clone)]
pub struct SequenceHeader {
    pub horizontal_size: u16,
    pub vertical_size: u16,
    pub aspect_ratio_code: u8,
    pub frame_rate_code: u8,
    pub frame_rate: Option<FrameRate>,
    pub bit_rate: u32,
    pub vbv_buffer_size: u16,
    pub constrained_parameters: bool,
    pub intra_quantizer_matrix: Option<[u8; 64]>,
    pub non_intra_quantizer_matrix: Option<[u8; 64]>,
}

fn read_quantizer_matrix(r: &mut BitReader<'_>) -> Result<[u8; 64], VideoHeaderError> {
    let mut matrix = [0u8; 64];
    for slot in matrix.iter_mut() {
        *slot = r.u(8).ok_or(VideoHeaderError::Truncated)? as u8;
    }
    Ok(matrix)
}

/// Parses a sequence header starting at `data[0]`, i.e. `data` must begin
/// with the 4-byte `00 00 01 B3` start code.
pub fn parse_sequence_header(data: &[u8]) -> Result<SequenceHeader, VideoHeaderError> {
    if data.len() < 4 {
        return Err(VideoHeaderError::Truncated);
    }
    let start_code = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    if start_code != SEQUENCE_HEADER_CODE {
        return Err(VideoHeaderError::MissingStartCode);
    }

    let mut r = BitReader::new(&data[4..]);
    let horizontal_size = r.u(12).ok_or(VideoHeaderError::Truncated)? as u16;
    let vertical_size = r.u(12).ok_or(VideoHeaderError::Truncated)? as u16;
    let aspect_ratio_code = r.u(4).ok_or(VideoHeaderError::Truncated)? as u8;
    let frame_rate_code = r.u(4).ok_or(VideoHeaderError::Truncated)? as u8;
    let bit_rate = r.u(18).ok_or(VideoHeaderError::Truncated)?;
    if r.u(1).ok_or(VideoHeaderError::Truncated)? != 1 {
        return Err(VideoHeaderError::MissingMarkerBit);
    }
    let vbv_buffer_size = r.u(10).ok_or(VideoHeaderError::Truncated)? as u16;
    let constrained_parameters = r.u(1).ok_or(VideoHeaderError::Truncated)? == 1;

    let intra_quantizer_matrix = if r.u(1).ok_or(VideoHeaderError::Truncated)? == 1 {
        Some(read_quantizer_matrix(&mut r)?)
    } else {
        None
    };
    let non_intra_quantizer_matrix = if r.u(1).ok_or(VideoHeaderError::Truncated)? == 1 {
        Some(read_quantizer_matrix(&mut r)?)
    } else {
        None
    };

    Ok(SequenceHeader {
        horizontal_size,
        vertical_size,
        aspect_ratio_code,
        frame_rate_code,
        frame_rate: FRAME_RATES[frame_rate_code as usize],
        bit_rate,
        vbv_buffer_size,
        constrained_parameters,
        intra_quantizer_matrix,
        non_intra_quantizer_matrix,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_header_bytes() -> Vec<u8> {
        // horizontal=352 (0001_0110_0000), vertical=240 (0000_1111_0000),
        // aspect=1, frame_rate_code=3 (25fps), bit_rate=104000/400=260,
        // marker=1, vbv=46, constrained=0, no quantizer matrices.
        let mut bits = bitvec_from_spec();
        bits.resize(bits.len().div_ceil(8) * 8, false);
        let mut bytes = vec![0x00, 0x00, 0x01, 0xB3];
        for chunk in bits.chunks(8) {
            let mut byte = 0u8;
            for (i, bit) in chunk.iter().enumerate() {
                byte |= (*bit as u8) << (7 - i);
            }
            bytes.push(byte);
        }
        bytes
    }

    fn bitvec_from_spec() -> Vec<bool> {
        let mut bits = Vec::new();
        push_bits(&mut bits, 352, 12);
        push_bits(&mut bits, 240, 12);
        push_bits(&mut bits, 1, 4);
        push_bits(&mut bits, 3, 4);
        push_bits(&mut bits, 260, 18);
        push_bits(&mut bits, 1, 1);
        push_bits(&mut bits, 46, 10);
        push_bits(&mut bits, 0, 1);
        push_bits(&mut bits, 0, 1);
        push_bits(&mut bits, 0, 1);
        bits
    }

    fn push_bits(bits: &mut Vec<bool>, value: u32, nbit: u32) {
        for i in (0..nbit).rev() {
            bits.push((value >> i) & 1 == 1);
        }
    }

    #[test]
    fn parses_a_well_formed_sequence_header() {
        let bytes = sample_header_bytes();
        let header = parse_sequence_header(&bytes).unwrap();
        assert_eq!(header.horizontal_size, 352);
        assert_eq!(header.vertical_size, 240);
        assert_eq!(header.aspect_ratio_code, 1);
        assert_eq!(header.frame_rate_code, 3);
        assert_eq!(header.frame_rate, Some(FrameRate { numerator: 25, denominator: 1 }));
        assert_eq!(header.bit_rate, 260);
        assert_eq!(header.vbv_buffer_size, 46);
        assert!(!header.constrained_parameters);
        assert!(header.intra_quantizer_matrix.is_none());
        assert!(header.non_intra_quantizer_matrix.is_none());
    }

    #[test]
    fn rejects_missing_start_code() {
        let mut bytes = sample_header_bytes();
        bytes[3] = 0xB4;
        assert_eq!(parse_sequence_header(&bytes), Err(VideoHeaderError::MissingStartCode));
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = sample_header_bytes();
        assert_eq!(
            parse_sequence_header(&bytes[..6]),
            Err(VideoHeaderError::Truncated)
        );
    }
}
