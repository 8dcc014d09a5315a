//! MPEG-1 Audio (Layer I/II/III) frame header, as carried at the start of
//! each frame on an `A_MPEG/L1`/`A_MPEG/L2`/`A_MPEG/L3` Matroska track.
//!
//! Field layout and the bitrate/sample-rate tables are grounded in the
//! `Version`/`Layer`/`Mode`/`BIT_RATES_KBPS`/`SAMPLE_RATES_HZ` tables from
//! the MPEG audio header example in the retrieval pack, trimmed to the
//! MPEG-1 row since this engine only ever sees `A_MPEG/*` (MPEG-1) tracks.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AudioHeaderError {
    #[error("truncated MPEG audio frame header")]
    Truncated,
    #[error("frame sync pattern not found")]
    NotSynced,
    #[error("header does not describe MPEG-1 audio")]
    NotMpeg1,
    #[error("reserved layer bits")]
    ReservedLayer,
    #[error("reserved bitrate bits")]
    ReservedBitrate,
    #[error("reserved sample rate bits")]
    ReservedSampleRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Mpeg1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Layer1,
    Layer2,
    Layer3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

fn layer_index(layer: Layer) -> usize {
    match layer {
        Layer::Layer1 => 0,
        Layer::Layer2 => 1,
        Layer::Layer3 => 2,
    }
}

// [layer][bitrate_bits], MPEG-1 only.
static BIT_RATES_KBPS: [[u32; 15]; 3] = [
    [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
];

const SAMPLE_RATES_HZ: [u16; 3] = [44100, 48000, 32000];

// Layer III side information size by mode, in bytes (MPEG-1 only; Layer I/II
// carry no side information block).
static LAYER3_SIDE_INFORMATION_SIZES: [u16; 4] = [32, 32, 32, 17];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFrameHeader {
    pub version: Version,
    pub layer: Layer,
    pub protected: bool,
    pub bitrate_bps: Option<u32>,
    pub sample_rate_hz: u16,
    pub padding: bool,
    pub mode: ChannelMode,
    pub frame_size: Option<u16>,
}

fn mode_from_bits(bits: u32) -> ChannelMode {
    match bits & 0b11 {
        0b00 => ChannelMode::Stereo,
        0b01 => ChannelMode::JointStereo,
        0b10 => ChannelMode::DualChannel,
        _ => ChannelMode::Mono,
    }
}

fn samples_per_frame(layer: Layer) -> u16 {
    match layer {
        Layer::Layer1 => 384,
        Layer::Layer2 | Layer::Layer3 => 1152,
    }
}

/// Parses the 4-byte frame header at `data[0..4]`. Only MPEG-1 headers are
/// accepted; MPEG-2/2.5 headers (this engine never produces `A_MPEG/*`
/// tracks for them) are rejected with [`AudioHeaderError::NotMpeg1`].
pub fn parse_frame_header(data: &[u8]) -> Result<AudioFrameHeader, AudioHeaderError> {
    if data.len() < 4 {
        return Err(AudioHeaderError::Truncated);
    }
    let word = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);

    if word & 0xFFE0_0000 != 0xFFE0_0000 {
        return Err(AudioHeaderError::NotSynced);
    }

    let version_bits = (word >> 19) & 0b11;
    if version_bits != 0b11 {
        return Err(AudioHeaderError::NotMpeg1);
    }
    let version = Version::Mpeg1;

    let layer = match (word >> 17) & 0b11 {
        0b01 => Layer::Layer3,
        0b10 => Layer::Layer2,
        0b11 => Layer::Layer1,
        _ => return Err(AudioHeaderError::ReservedLayer),
    };
    let protected = (word >> 16) & 1 == 0;

    let bitrate_bits = (word >> 12) & 0b1111;
    if bitrate_bits == 0b1111 {
        return Err(AudioHeaderError::ReservedBitrate);
    }
    let bitrate_bps = if bitrate_bits == 0 {
        None
    } else {
        Some(1000 * BIT_RATES_KBPS[layer_index(layer)][bitrate_bits as usize])
    };

    let sample_rate_bits = (word >> 10) & 0b11;
    if sample_rate_bits == 0b11 {
        return Err(AudioHeaderError::ReservedSampleRate);
    }
    let sample_rate_hz = SAMPLE_RATES_HZ[sample_rate_bits as usize];

    let padding = (word >> 9) & 1 == 1;
    let mode = mode_from_bits(word >> 6);

    let frame_size = bitrate_bps.map(|bps| {
        let samples = u32::from(samples_per_frame(layer));
        let pad = u32::from(padding);
        match layer {
            Layer::Layer1 => ((samples / 32 * bps / sample_rate_hz as u32) + pad * 4) as u16,
            Layer::Layer2 | Layer::Layer3 => {
                ((samples / 8 * bps / sample_rate_hz as u32) + pad) as u16
            }
        }
    });

    Ok(AudioFrameHeader {
        version,
        layer,
        protected,
        bitrate_bps,
        sample_rate_hz,
        padding,
        mode,
        frame_size,
    })
}

#[allow(dead_code)]
fn side_information_size(layer: Layer, mode: ChannelMode) -> Option<u16> {
    if layer != Layer::Layer3 {
        return None;
    }
    let mode_idx = match mode {
        ChannelMode::Stereo => 0,
        ChannelMode::JointStereo => 1,
        ChannelMode::DualChannel => 2,
        ChannelMode::Mono => 3,
    };
    Some(LAYER3_SIDE_INFORMATION_SIZES[mode_idx])
}

#[cfg(test)]
mod test {
    use super::*;

    // MPEG-1 Layer III, 128kbps, 44100Hz, no padding, stereo: a common
    // real-world frame header (0xFFFB9064).
    const MP3_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x64];

    #[test]
    fn parses_a_common_mp3_frame_header() {
        let header = parse_frame_header(&MP3_HEADER).unwrap();
        assert_eq!(header.version, Version::Mpeg1);
        assert_eq!(header.layer, Layer::Layer3);
        assert_eq!(header.sample_rate_hz, 44100);
        assert_eq!(header.bitrate_bps, Some(128_000));
        assert_eq!(header.mode, ChannelMode::Stereo);
        assert!(!header.padding);
        assert!(header.frame_size.is_some());
    }

    #[test]
    fn rejects_unsynced_words() {
        assert_eq!(parse_frame_header(&[0x00, 0x00, 0x00, 0x00]), Err(AudioHeaderError::NotSynced));
    }

    #[test]
    fn rejects_reserved_bitrate() {
        let bytes = [0xFF, 0xFF, 0x90, 0x64];
        assert_eq!(parse_frame_header(&bytes), Err(AudioHeaderError::ReservedBitrate));
    }

    #[test]
    fn rejects_truncated_input() {
        assert_eq!(parse_frame_header(&[0xFF, 0xFB]), Err(AudioHeaderError::Truncated));
    }
}
