//! The parsed-header data model (spec L5): `SegmentInfo`, `Track`,
//! `SeekEntry`, `CuePoint`, folded together into [`MasterData`] as the
//! segment's `Info`/`Tracks`/`SeekHead`/`Cues` masters are read.
//!
//! Grounded in the field layout `format/mkv/demux.rs`'s `parse_info` /
//! `parse_tracks` / `parse_track` build, extended to also cover `SeekHead`
//! and `Cues`, which that function never modeled.

use nom::combinator::opt;
use nom::IResult;

use crate::element::EbmlError;
use crate::schema::*;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("required element {0:#x} ({1}) was missing")]
    MissingElement(EbmlId, &'static str),

    #[error("track {0} has an unrecognized TrackType {1}")]
    UnrecognizedTrackType(u64, u64),

    #[error("{0}")]
    Ebml(#[from] EbmlError),
}

fn mand<T>(value: Option<T>, id: EbmlId, name: &'static str) -> Result<T, ModelError> {
    value.ok_or(ModelError::MissingElement(id, name))
}

/// Default `TimestampScale`, in nanoseconds per tick, when `Info` omits it.
pub const DEFAULT_TIMESTAMP_SCALE_NS: u64 = 1_000_000;

#[derive(Debug, Clone, Default)]
pub struct SegmentInfo {
    pub segment_uid: Option<Vec<u8>>,
    pub timecode_scale_ns: u64,
    pub duration_ticks: Option<f64>,
    pub muxing_app: String,
    pub writing_app: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
}

#[derive(Debug, Clone, Default)]
pub struct VideoParams {
    pub pixel_width: u64,
    pub pixel_height: u64,
    pub interlaced: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AudioParams {
    pub sampling_frequency: f64,
    pub channels: u64,
    pub bit_depth: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub track_number: u64,
    pub track_uid: u64,
    pub kind: TrackKind,
    pub codec_id: String,
    pub codec_private: Vec<u8>,
    pub default_duration_ns: Option<u64>,
    pub lacing: bool,
    pub enabled: bool,
    pub flag_default: bool,
    pub video: Option<VideoParams>,
    pub audio: Option<AudioParams>,
}

#[derive(Debug, Clone, Copy)]
pub struct SeekEntry {
    pub id: EbmlId,
    pub segment_relative_offset: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct CuePoint {
    pub cue_time_ticks: u64,
    pub track: u64,
    pub cluster_segment_relative_offset: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MasterData {
    pub info: Option<SegmentInfo>,
    pub tracks: Vec<Track>,
    pub seek_entries: Vec<SeekEntry>,
    pub cues: Vec<CuePoint>,
}

impl MasterData {
    /// Per the schema discovery invariant: streaming can begin once `Info`
    /// and `Tracks` are known. `Cues` is optional — its absence only rules
    /// out cue-based seeking, it never blocks playback.
    pub fn ready_for_streaming(&self) -> bool {
        self.info.is_some() && !self.tracks.is_empty()
    }
}

#[derive(Default)]
struct RawVideo {
    width: Option<u64>,
    height: Option<u64>,
    interlaced: Option<u64>,
}

#[derive(Default)]
struct RawAudio {
    sampling_frequency: Option<f64>,
    channels: Option<u64>,
    bit_depth: Option<u64>,
}

#[derive(Default)]
struct RawTrack<'a> {
    number: Option<u64>,
    uid: Option<u64>,
    ty: Option<u64>,
    codec_id: Option<&'a str>,
    codec_private: Option<&'a [u8]>,
    default_duration: Option<u64>,
    lacing: Option<u64>,
    enabled: Option<u64>,
    flag_default: Option<u64>,
    video: Option<RawVideo>,
    audio: Option<RawAudio>,
}

const TRACK_TYPE_VIDEO: u64 = 1;
const TRACK_TYPE_AUDIO: u64 = 2;
const TRACK_TYPE_SUBTITLE: u64 = 17;

fn convert_track(raw: RawTrack) -> Result<Track, ModelError> {
    let track_number = mand(raw.number, TRACK_NUMBER, "TrackNumber")?;
    let track_uid = mand(raw.uid, TRACK_UID, "TrackUID")?;
    let ty = mand(raw.ty, TRACK_TYPE, "TrackType")?;
    let codec_id = mand(raw.codec_id, CODEC_ID, "CodecID")?.to_owned();

    let kind = match ty {
        TRACK_TYPE_VIDEO => TrackKind::Video,
        TRACK_TYPE_AUDIO => TrackKind::Audio,
        TRACK_TYPE_SUBTITLE => TrackKind::Subtitle,
        other => return Err(ModelError::UnrecognizedTrackType(track_number, other)),
    };

    let video = raw.video.map(|v| VideoParams {
        pixel_width: v.width.unwrap_or(0),
        pixel_height: v.height.unwrap_or(0),
        interlaced: v.interlaced.unwrap_or(0) != 0,
    });
    let audio = raw.audio.map(|a| AudioParams {
        sampling_frequency: a.sampling_frequency.unwrap_or(8000.0),
        channels: a.channels.unwrap_or(1),
        bit_depth: a.bit_depth,
    });

    Ok(Track {
        track_number,
        track_uid,
        kind,
        codec_id,
        codec_private: raw.codec_private.map(|b| b.to_vec()).unwrap_or_default(),
        default_duration_ns: raw.default_duration,
        lacing: raw.lacing.map(|v| v != 0).unwrap_or(true),
        enabled: raw.enabled.map(|v| v != 0).unwrap_or(true),
        flag_default: raw.flag_default.map(|v| v != 0).unwrap_or(true),
        video,
        audio,
    })
}

/// Parses the body of an `Info` master. `input` starts at `Info`'s own
/// header.
pub fn parse_info(input: &[u8]) -> IResult<&[u8], SegmentInfo, EbmlError> {
    #[derive(Default)]
    struct Raw<'a> {
        segment_uid: Option<&'a [u8]>,
        scale: Option<u64>,
        duration: Option<f64>,
        muxing_app: Option<&'a str>,
        writing_app: Option<&'a str>,
    }

    let (rest, raw) = ebml_master_element_fold(INFO, Raw::default(), |acc, input| {
        if acc.segment_uid.is_none() {
            acc.segment_uid = opt(ebml_bin(SEGMENT_UID))(input)?.1;
        }
        if acc.scale.is_none() {
            acc.scale = opt(ebml_uint(TIMESTAMP_SCALE))(input)?.1;
        }
        if acc.duration.is_none() {
            acc.duration = opt(ebml_float(DURATION))(input)?.1;
        }
        if acc.muxing_app.is_none() {
            acc.muxing_app = opt(ebml_str(MUXING_APP))(input)?.1;
        }
        if acc.writing_app.is_none() {
            acc.writing_app = opt(ebml_str(WRITING_APP))(input)?.1;
        }
        Ok::<(), nom::Err<EbmlError>>(())
    })(input)?;

    Ok((
        rest,
        SegmentInfo {
            segment_uid: raw.segment_uid.map(|b| b.to_vec()),
            timecode_scale_ns: raw.scale.unwrap_or(DEFAULT_TIMESTAMP_SCALE_NS),
            duration_ticks: raw.duration,
            muxing_app: raw.muxing_app.unwrap_or_default().to_owned(),
            writing_app: raw.writing_app.unwrap_or_default().to_owned(),
        },
    ))
}

fn parse_video(input: &[u8]) -> IResult<&[u8], RawVideo, EbmlError> {
    ebml_master_element_fold(VIDEO, RawVideo::default(), |acc, input| {
        if acc.width.is_none() {
            acc.width = opt(ebml_uint(PIXEL_WIDTH))(input)?.1;
        }
        if acc.height.is_none() {
            acc.height = opt(ebml_uint(PIXEL_HEIGHT))(input)?.1;
        }
        if acc.interlaced.is_none() {
            acc.interlaced = opt(ebml_uint(FLAG_INTERLACED))(input)?.1;
        }
        Ok::<(), nom::Err<EbmlError>>(())
    })(input)
}

fn parse_audio(input: &[u8]) -> IResult<&[u8], RawAudio, EbmlError> {
    ebml_master_element_fold(AUDIO, RawAudio::default(), |acc, input| {
        if acc.sampling_frequency.is_none() {
            acc.sampling_frequency = opt(ebml_float(SAMPLING_FREQUENCY))(input)?.1;
        }
        if acc.channels.is_none() {
            acc.channels = opt(ebml_uint(CHANNELS))(input)?.1;
        }
        if acc.bit_depth.is_none() {
            acc.bit_depth = opt(ebml_uint(BIT_DEPTH))(input)?.1;
        }
        Ok::<(), nom::Err<EbmlError>>(())
    })(input)
}

fn parse_track_entry(input: &[u8]) -> IResult<&[u8], RawTrack<'_>, EbmlError> {
    ebml_master_element_fold(TRACK_ENTRY, RawTrack::default(), |acc, input| {
        if acc.number.is_none() {
            acc.number = opt(ebml_uint(TRACK_NUMBER))(input)?.1;
        }
        if acc.uid.is_none() {
            acc.uid = opt(ebml_uint(TRACK_UID))(input)?.1;
        }
        if acc.ty.is_none() {
            acc.ty = opt(ebml_uint(TRACK_TYPE))(input)?.1;
        }
        if acc.codec_id.is_none() {
            acc.codec_id = opt(ebml_str(CODEC_ID))(input)?.1;
        }
        if acc.codec_private.is_none() {
            acc.codec_private = opt(ebml_bin(CODEC_PRIVATE))(input)?.1;
        }
        if acc.default_duration.is_none() {
            acc.default_duration = opt(ebml_uint(DEFAULT_DURATION))(input)?.1;
        }
        if acc.lacing.is_none() {
            acc.lacing = opt(ebml_uint(FLAG_LACING))(input)?.1;
        }
        if acc.enabled.is_none() {
            acc.enabled = opt(ebml_uint(FLAG_ENABLED))(input)?.1;
        }
        if acc.flag_default.is_none() {
            acc.flag_default = opt(ebml_uint(FLAG_DEFAULT))(input)?.1;
        }
        if acc.video.is_none() {
            acc.video = opt(parse_video)(input)?.1;
        }
        if acc.audio.is_none() {
            acc.audio = opt(parse_audio)(input)?.1;
        }
        Ok::<(), nom::Err<EbmlError>>(())
    })(input)
}

/// Parses the body of a `Tracks` master, appending each well-formed
/// `TrackEntry` to `out`. A malformed individual entry is dropped with a
/// log line rather than failing the whole master, matching how the rest of
/// this layer treats per-child problems as non-fatal.
pub fn parse_tracks(input: &[u8], out: &mut Vec<Track>) -> IResult<&[u8], (), EbmlError> {
    let (rest, ()) = ebml_master_element_fold(TRACKS, (), |(), input| {
        if let Ok((_, raw)) = parse_track_entry(input) {
            match convert_track(raw) {
                Ok(track) => out.push(track),
                Err(e) => log::warn!("dropping track: {e}"),
            }
        }
        Ok::<(), nom::Err<EbmlError>>(())
    })(input)?;

    Ok((rest, ()))
}

fn parse_seek(input: &[u8]) -> IResult<&[u8], Option<SeekEntry>, EbmlError> {
    #[derive(Default)]
    struct Raw<'a> {
        id: Option<&'a [u8]>,
        position: Option<u64>,
    }

    let (rest, raw) = ebml_master_element_fold(SEEK, Raw::default(), |acc, input| {
        if acc.id.is_none() {
            acc.id = opt(ebml_bin(SEEK_ID))(input)?.1;
        }
        if acc.position.is_none() {
            acc.position = opt(ebml_uint(SEEK_POSITION))(input)?.1;
        }
        Ok::<(), nom::Err<EbmlError>>(())
    })(input)?;

    let entry = match (raw.id, raw.position) {
        (Some(id_bytes), Some(position)) => Some(SeekEntry {
            id: decode_uint(id_bytes) as u32,
            segment_relative_offset: position,
        }),
        _ => None,
    };

    Ok((rest, entry))
}

/// Parses the body of a `SeekHead` master, appending every entry it finds.
pub fn parse_seek_head(input: &[u8], out: &mut Vec<SeekEntry>) -> IResult<&[u8], (), EbmlError> {
    let (rest, ()) = ebml_master_element_fold(SEEK_HEAD, (), |(), input| {
        if let Ok((_, Some(entry))) = parse_seek(input) {
            out.push(entry);
        }
        Ok::<(), nom::Err<EbmlError>>(())
    })(input)?;

    Ok((rest, ()))
}

fn parse_cue_track_positions(input: &[u8]) -> IResult<&[u8], (Option<u64>, Option<u64>), EbmlError> {
    #[derive(Default)]
    struct Raw {
        track: Option<u64>,
        cluster_position: Option<u64>,
    }

    let (rest, raw) = ebml_master_element_fold(CUE_TRACK_POSITIONS, Raw::default(), |acc, input| {
        if acc.track.is_none() {
            acc.track = opt(ebml_uint(CUE_TRACK))(input)?.1;
        }
        if acc.cluster_position.is_none() {
            acc.cluster_position = opt(ebml_uint(CUE_CLUSTER_POSITION))(input)?.1;
        }
        Ok::<(), nom::Err<EbmlError>>(())
    })(input)?;

    Ok((rest, (raw.track, raw.cluster_position)))
}

fn parse_cue_point(input: &[u8]) -> IResult<&[u8], Option<CuePoint>, EbmlError> {
    #[derive(Default)]
    struct Raw {
        time: Option<u64>,
        positions: Option<(Option<u64>, Option<u64>)>,
    }

    let (rest, raw) = ebml_master_element_fold(CUE_POINT, Raw::default(), |acc, input| {
        if acc.time.is_none() {
            acc.time = opt(ebml_uint(CUE_TIME))(input)?.1;
        }
        if acc.positions.is_none() {
            acc.positions = opt(parse_cue_track_positions)(input)?.1;
        }
        Ok::<(), nom::Err<EbmlError>>(())
    })(input)?;

    let point = match (raw.time, raw.positions) {
        (Some(time), Some((Some(track), Some(cluster_position)))) => Some(CuePoint {
            cue_time_ticks: time,
            track,
            cluster_segment_relative_offset: cluster_position,
        }),
        _ => None,
    };

    Ok((rest, point))
}

/// Parses the body of a `Cues` master, appending every fully-formed
/// `CuePoint` it finds. Entries missing a track or cluster position are
/// dropped — they can't drive a seek.
pub fn parse_cues(input: &[u8], out: &mut Vec<CuePoint>) -> IResult<&[u8], (), EbmlError> {
    let (rest, ()) = ebml_master_element_fold(CUES, (), |(), input| {
        if let Ok((_, Some(point))) = parse_cue_point(input) {
            out.push(point);
        }
        Ok::<(), nom::Err<EbmlError>>(())
    })(input)?;

    Ok((rest, ()))
}
