//! The streaming controller (spec L7): owns the [`crate::buffer::ReadWindow`]
//! and a [`crate::io::ByteSource`], drives the Invalid/Opening/Stopped/
//! Started/Paused/ShutDown state machine, and turns `NeedMoreData`/`Seek`
//! signals from the synchronous parsing layers below into the only two
//! suspension points this engine has.
//!
//! Grounded in `DemuxerContext::{read_headers,read_packet}`'s
//! `NeedMore`/`Seek` pull loop in `format.rs`, generalized from a blocking
//! `std::io::Read` to the async [`crate::io::ByteSource`].

use tracing::{debug, warn};

use crate::buffer::ReadWindow;
use crate::cluster::{self, ClusterError, FrameDescriptor, FrameRing, RingCapacityExceeded};
use crate::element::{ebml_element_header, EbmlError, EbmlId, ElementSize};
use crate::io::{ByteSource, IoError};
use crate::model::{self, CuePoint, MasterData, SegmentInfo};
use crate::schema::{
    BLOCK_GROUP, CLUSTER, CUES, EBML_HEADER, INFO, SEEK_HEAD, SEGMENT, SIMPLE_BLOCK, TIMESTAMP,
    TRACKS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Invalid,
    Opening,
    Stopped,
    Started,
    Paused,
    ShutDown,
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    /// Minimum bytes requested per [`ByteSource::read`] call while waiting
    /// on more header data.
    pub read_size: usize,
    /// Capacity of the laced-frame ring.
    pub frame_ring_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            read_size: 32 * 1024,
            frame_ring_capacity: 30,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("controller is in state {0:?}, which doesn't allow this operation")]
    WrongState(State),

    #[error("segment header is malformed: {0}")]
    Format(EbmlError),

    #[error("{0}")]
    Lace(#[from] ClusterError),

    #[error(transparent)]
    Ring(#[from] RingCapacityExceeded),

    #[error("{0}")]
    Io(#[from] IoError),

    #[error("{0}")]
    Buffer(#[from] crate::buffer::BufferError),

    #[error("end of stream")]
    EndOfStream,

    #[error("the outstanding read was cancelled by a restart")]
    Cancelled,

    #[error("no cue points are available to seek with")]
    NoCues,
}

impl From<nom::Err<EbmlError>> for StreamError {
    fn from(e: nom::Err<EbmlError>) -> Self {
        match e {
            nom::Err::Incomplete(_) => {
                unreachable!("callers fill before converting a parse error to StreamError")
            }
            nom::Err::Error(err) | nom::Err::Failure(err) => StreamError::Format(err),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ClusterCursor {
    timecode_ticks: u64,
}

pub struct StreamingController<S: ByteSource> {
    source: S,
    window: ReadWindow,
    config: ControllerConfig,
    state: State,
    restart_counter: u64,
    segment_start: u64,
    master: MasterData,
    cluster: Option<ClusterCursor>,
    ring: FrameRing,
}

/// One parsed header plus how many bytes (header only) it occupied.
struct Header {
    id: EbmlId,
    size: ElementSize,
    header_len: usize,
}

impl<S: ByteSource> StreamingController<S> {
    pub fn new(source: S, config: ControllerConfig) -> Self {
        StreamingController {
            source,
            window: ReadWindow::new(),
            config,
            state: State::Invalid,
            restart_counter: 0,
            segment_start: 0,
            master: MasterData::default(),
            cluster: None,
            ring: FrameRing::new(config.frame_ring_capacity),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn master_data(&self) -> &MasterData {
        &self.master
    }

    /// Reads from the byte source until at least `additional` more bytes
    /// are buffered than are currently available, or the source reports
    /// end of stream.
    async fn fill(&mut self, additional: usize) -> Result<(), StreamError> {
        self.window.reserve(additional);
        let tag = self.restart_counter;
        let target = self.window.size() + additional;

        while self.window.size() < target {
            let (n, reply_tag) = self
                .source
                .read(self.window.spare_capacity_mut(), tag)
                .await?;
            if reply_tag != tag {
                return Err(StreamError::Cancelled);
            }
            if n == 0 {
                return Err(StreamError::EndOfStream);
            }
            self.window.move_end(n);
        }
        Ok(())
    }

    async fn seek_to(&mut self, offset: u64) -> Result<(), IoError> {
        self.restart_counter += 1;
        self.window.flush();
        self.source.seek(offset).await
    }

    /// Ensures a full element header is buffered at the front of the
    /// window, filling as needed, then returns it without consuming it.
    async fn peek_header(&mut self) -> Result<Header, StreamError> {
        loop {
            match ebml_element_header()(self.window.data()) {
                Ok((rest, (id, size))) => {
                    let header_len = self.window.data().len() - rest.len();
                    return Ok(Header { id, size, header_len });
                }
                Err(nom::Err::Incomplete(needed)) => {
                    let more = match needed {
                        nom::Needed::Size(n) => n.get(),
                        nom::Needed::Unknown => self.config.read_size,
                    };
                    self.fill(more).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Ensures `total` bytes (header + body) are buffered at the front of
    /// the window.
    async fn ensure_whole(&mut self, total: usize) -> Result<(), StreamError> {
        if self.window.size() < total {
            self.fill(total - self.window.size()).await?;
        }
        Ok(())
    }

    /// Opens the stream: reads the EBML header and the Segment header,
    /// then pulls segment-level children until `Info` and `Tracks` are
    /// both known (the schema discovery invariant) or a `Cluster` is
    /// reached — at which point any still-missing master is looked up via
    /// `SeekHead` and fetched with one jump-and-return detour.
    pub async fn open(&mut self) -> Result<(), StreamError> {
        if self.state != State::Invalid {
            return Err(StreamError::WrongState(self.state));
        }
        self.state = State::Opening;

        let ebml_header = self.peek_header().await?;
        if ebml_header.id != EBML_HEADER {
            return Err(StreamError::Format(EbmlError::UnexpectedElement(
                EBML_HEADER,
                ebml_header.id,
                ebml_header.size,
            )));
        }
        let ebml_total = ebml_header.header_len
            + ebml_header.size.require().map_err(StreamError::Format)?;
        self.ensure_whole(ebml_total).await?;
        self.window.move_start(ebml_total)?;

        let segment = self.peek_header().await?;
        if segment.id != SEGMENT {
            return Err(StreamError::Format(EbmlError::UnexpectedElement(
                SEGMENT,
                segment.id,
                segment.size,
            )));
        }
        self.window.move_start(segment.header_len)?;
        self.segment_start = self.buffered_absolute_offset();

        loop {
            if self.master.ready_for_streaming() {
                break;
            }

            let header = self.peek_header().await?;
            if header.id == CLUSTER {
                self.resolve_missing_masters_via_seek_head().await?;
                break;
            }

            let body_len = match header.size.require() {
                Ok(n) => n as usize,
                Err(_) => {
                    warn!("segment child {:#x} declared an unknown size, stopping header scan", header.id);
                    break;
                }
            };
            let total = header.header_len + body_len;
            self.ensure_whole(total).await?;
            self.consume_segment_child(header.id, total)?;
        }

        self.state = State::Stopped;
        Ok(())
    }

    /// Absolute offset of the first byte currently buffered in the window.
    fn buffered_absolute_offset(&self) -> u64 {
        self.source.current_position() - self.window.size() as u64
    }

    fn consume_segment_child(&mut self, id: EbmlId, total: usize) -> Result<(), StreamError> {
        match id {
            INFO => {
                let (_, info): (_, SegmentInfo) = model::parse_info(self.window.data())?;
                self.master.info = Some(info);
            }
            TRACKS => {
                model::parse_tracks(self.window.data(), &mut self.master.tracks)?;
            }
            SEEK_HEAD => {
                model::parse_seek_head(self.window.data(), &mut self.master.seek_entries)?;
            }
            CUES => {
                model::parse_cues(self.window.data(), &mut self.master.cues)?;
            }
            _ => debug!("skipping segment child {id:#x}"),
        }
        self.window.move_start(total)?;
        Ok(())
    }

    /// When `Info`/`Tracks` is still missing once a `Cluster` is reached,
    /// jump to each still-missing master via `SeekHead`, parse it, then
    /// return to the stream position where the detour started.
    async fn resolve_missing_masters_via_seek_head(&mut self) -> Result<(), StreamError> {
        let wanted: Vec<_> = [INFO, TRACKS]
            .into_iter()
            .filter(|&id| {
                (id == INFO && self.master.info.is_none())
                    || (id == TRACKS && self.master.tracks.is_empty())
            })
            .collect();

        for id in wanted {
            let Some(entry) = self.master.seek_entries.iter().find(|e| e.id == id).copied() else {
                continue;
            };

            let return_offset = self.buffered_absolute_offset();
            self.seek_to(self.segment_start + entry.segment_relative_offset).await?;

            let header = self.peek_header().await?;
            if header.id == id {
                if let Ok(body_len) = header.size.require() {
                    let total = header.header_len + body_len as usize;
                    self.ensure_whole(total).await?;
                    self.consume_segment_child(id, total)?;
                }
            }

            self.seek_to(return_offset).await?;
        }

        Ok(())
    }

    pub async fn start(&mut self) -> Result<(), StreamError> {
        if self.state != State::Stopped && self.state != State::Paused {
            return Err(StreamError::WrongState(self.state));
        }
        self.state = State::Started;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), StreamError> {
        if self.state != State::Started {
            return Err(StreamError::WrongState(self.state));
        }
        self.state = State::Paused;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), StreamError> {
        self.state = State::Stopped;
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.restart_counter += 1;
        self.state = State::ShutDown;
    }

    /// Seeks to the best cue point for `target_ticks`: the last cue with
    /// `cue_time_ticks <= target`, or the first cue if none qualify.
    pub async fn seek(&mut self, target_ticks: u64) -> Result<(), StreamError> {
        if self.master.cues.is_empty() {
            return Err(StreamError::NoCues);
        }

        let chosen = pick_cue(&self.master.cues, target_ticks);
        let absolute = self.segment_start + chosen.cluster_segment_relative_offset;
        self.seek_to(absolute).await?;
        self.cluster = Some(ClusterCursor {
            timecode_ticks: chosen.cue_time_ticks,
        });
        self.ring = FrameRing::new(self.config.frame_ring_capacity);
        self.state = State::Stopped;
        Ok(())
    }

    /// Pulls the next frame out of the cluster stream, entering new
    /// clusters and skipping unrecognized cluster children as needed.
    pub async fn next_frame(&mut self) -> Result<FrameDescriptor, StreamError> {
        if self.state != State::Started {
            return Err(StreamError::WrongState(self.state));
        }

        loop {
            if let Some(frame) = self.ring.pop() {
                return Ok(frame);
            }

            let header = self.peek_header().await?;

            match header.id {
                CLUSTER => {
                    self.window.move_start(header.header_len)?;
                }
                TIMESTAMP => {
                    let body_len = header.size.require().map_err(StreamError::Format)?;
                    let total = header.header_len + body_len as usize;
                    self.ensure_whole(total).await?;
                    let (_, ts) = crate::schema::ebml_uint(TIMESTAMP)(self.window.data())?;
                    self.cluster = Some(ClusterCursor { timecode_ticks: ts });
                    self.window.move_start(total)?;
                }
                SIMPLE_BLOCK => {
                    let body_len = header.size.require().map_err(StreamError::Format)?;
                    let total = header.header_len + body_len as usize;
                    self.ensure_whole(total).await?;
                    let ts = self.cluster.map(|c| c.timecode_ticks).unwrap_or(0);
                    let body = &self.window.data()[header.header_len..total];
                    let frames = cluster::read_simple_block(body, ts)?;
                    for f in frames {
                        self.ring.push(f)?;
                    }
                    self.window.move_start(total)?;
                }
                BLOCK_GROUP => {
                    // size unknown up front for a master; ensure a generous
                    // chunk is buffered and let the fold parser ask for
                    // more via Incomplete if it still isn't enough.
                    let body_len = header.size.require().map_err(StreamError::Format)?;
                    let total = header.header_len + body_len as usize;
                    self.ensure_whole(total).await?;
                    let ts = self.cluster.map(|c| c.timecode_ticks).unwrap_or(0);
                    let (rest, frames) = cluster::read_block_group(self.window.data(), ts)?;
                    let consumed = self.window.data().len() - rest.len();
                    let frames = frames.map_err(ClusterError::from)?;
                    for f in frames {
                        self.ring.push(f)?;
                    }
                    self.window.move_start(consumed)?;
                }
                CUES => return Err(StreamError::EndOfStream),
                _ => match header.size.require() {
                    Ok(body_len) => {
                        let total = header.header_len + body_len as usize;
                        self.ensure_whole(total).await?;
                        debug!("skipping cluster child {:#x}", header.id);
                        self.window.move_start(total)?;
                    }
                    Err(_) => {
                        warn!("unknown-size element {:#x} inside cluster stream, stopping", header.id);
                        return Err(StreamError::EndOfStream);
                    }
                },
            }
        }
    }
}

fn pick_cue(cues: &[CuePoint], target_ticks: u64) -> CuePoint {
    cues.iter()
        .filter(|c| c.cue_time_ticks <= target_ticks)
        .max_by_key(|c| c.cue_time_ticks)
        .copied()
        .unwrap_or(cues[0])
}

#[cfg(test)]
mod test {
    use super::*;

    fn cue(time: u64, offset: u64) -> CuePoint {
        CuePoint {
            cue_time_ticks: time,
            track: 1,
            cluster_segment_relative_offset: offset,
        }
    }

    #[test]
    fn pick_cue_prefers_last_at_or_before_target() {
        let cues = vec![cue(0, 100), cue(1000, 200), cue(2000, 300)];
        assert_eq!(pick_cue(&cues, 1500).cluster_segment_relative_offset, 200);
    }

    #[test]
    fn pick_cue_falls_back_to_first_when_target_precedes_everything() {
        let cues = vec![cue(1000, 200), cue(2000, 300)];
        assert_eq!(pick_cue(&cues, 0).cluster_segment_relative_offset, 200);
    }

    #[test]
    fn default_config_matches_the_documented_ring_capacity() {
        assert_eq!(ControllerConfig::default().frame_ring_capacity, 30);
    }

    /// Builds a minimal but real EBML-framed byte stream: an empty EBML
    /// header, a Segment (unknown size) holding an empty Info, a Tracks
    /// with one video TrackEntry, and a Cluster with one zero-timecode
    /// keyframe SimpleBlock.
    fn minimal_synthetic_file() -> Vec<u8> {
        let mut data = vec![0x1A, 0x45, 0xDF, 0xA3, 0x80]; // EBML header, empty body
        data.extend_from_slice(&[0x18, 0x53, 0x80, 0x67, 0xFF]); // Segment, unknown size

        data.extend_from_slice(&[0x15, 0x49, 0xA9, 0x66, 0x80]); // Info, empty body

        let mut track_entry_body = Vec::new();
        track_entry_body.extend_from_slice(&[0xD7, 0x81, 0x01]); // TrackNumber = 1
        track_entry_body.extend_from_slice(&[0x73, 0xC5, 0x81, 0x01]); // TrackUID = 1
        track_entry_body.extend_from_slice(&[0x83, 0x81, 0x01]); // TrackType = 1 (video)
        track_entry_body.push(0x86); // CodecID
        track_entry_body.push(0x80 | b"V_TEST".len() as u8);
        track_entry_body.extend_from_slice(b"V_TEST");

        let mut track_entry = vec![0xAE, 0x80 | track_entry_body.len() as u8];
        track_entry.extend_from_slice(&track_entry_body);

        let mut tracks = vec![0x16, 0x54, 0xAE, 0x6B, 0x80 | track_entry.len() as u8];
        tracks.extend_from_slice(&track_entry);
        data.extend_from_slice(&tracks);

        let mut cluster_body = vec![0xE7, 0x81, 0x00]; // Timestamp = 0

        let mut simple_block_body = vec![0x81, 0x00, 0x00, 0x80]; // track 1, reltc 0, keyframe, no lacing
        simple_block_body.extend_from_slice(b"DATA");
        cluster_body.push(0xA3); // SimpleBlock
        cluster_body.push(0x80 | simple_block_body.len() as u8);
        cluster_body.extend_from_slice(&simple_block_body);

        let mut cluster = vec![0x1F, 0x43, 0xB6, 0x75, 0x80 | cluster_body.len() as u8];
        cluster.extend_from_slice(&cluster_body);
        data.extend_from_slice(&cluster);

        data
    }

    #[tokio::test]
    async fn open_and_next_frame_drive_a_minimal_synthetic_file() {
        let source = crate::io::SliceByteSource::new(minimal_synthetic_file());
        let mut controller = StreamingController::new(source, ControllerConfig::default());

        controller.open().await.unwrap();
        assert_eq!(controller.master_data().tracks.len(), 1);
        assert_eq!(
            controller.master_data().tracks[0].kind,
            crate::model::TrackKind::Video
        );

        controller.start().await.unwrap();
        let frame = controller.next_frame().await.unwrap();
        assert_eq!(frame.track_number, 1);
        assert_eq!(frame.timecode_ticks, 0);
        assert!(frame.keyframe);
        assert_eq!(&frame.payload[..], b"DATA");
    }

    #[tokio::test]
    async fn open_rejects_a_stream_missing_a_genuine_ebml_header() {
        let mut data = vec![0x12, 0x34, 0x56, 0x78, 0x80]; // not EBML_HEADER
        data.extend_from_slice(&[0x18, 0x53, 0x80, 0x67, 0xFF]);

        let source = crate::io::SliceByteSource::new(data);
        let mut controller = StreamingController::new(source, ControllerConfig::default());

        let err = controller.open().await.unwrap_err();
        assert!(matches!(
            err,
            StreamError::Format(EbmlError::UnexpectedElement(EBML_HEADER, 0x1234_5678, _))
        ));
    }
}
