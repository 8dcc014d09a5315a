//! An EBML/Matroska (MKV/WebM) demultiplexing engine: decodes the
//! container's VINT/element framing, builds a `Track`/`SegmentInfo`/`Cues`
//! model from the segment headers, and streams frame-level packets out of
//! `Cluster`s through an async, cancellable controller.
//!
//! Layered bottom-up: [`vint`] (VINT codec) -> [`buffer`] (growable read
//! window) -> [`element`] (generic EBML framing) -> [`schema`] (Matroska's
//! element table and typed field readers) -> [`model`] (Info/Tracks/
//! SeekHead/Cues) -> [`cluster`] (Block/SimpleBlock framing and lacing) ->
//! [`controller`] (the streaming state machine). [`io`] sits underneath all
//! of it as the only place suspension actually happens.
//!
//! [`mpeg1`] holds two narrowly-scoped header parsers for elementary
//! streams this engine doesn't decode but whose container metadata it
//! still needs to report: an MPEG-1 video sequence header and an MPEG-1
//! audio frame header.

pub mod buffer;
pub mod cluster;
pub mod controller;
pub mod element;
pub mod io;
pub mod model;
pub mod mpeg1;
pub mod schema;
pub mod vint;

pub use controller::{ControllerConfig, State, StreamError, StreamingController};
pub use io::{ByteSource, SliceByteSource};
pub use model::{AudioParams, CuePoint, MasterData, SegmentInfo, SeekEntry, Track, TrackKind, VideoParams};

#[cfg(feature = "fs")]
pub use io::FileByteSource;

/// Scores how strongly `data` (the first several KiB of a stream) looks
/// like EBML/Matroska, for callers choosing among several container
/// probers. Grounded in `MatroskaDemuxer::probe`'s multi-pattern
/// `AhoCorasick` scan, extended to the "doctype" bytes Matroska/WebM
/// actually carry rather than just the Matroska class id.
pub fn probe(data: &[u8]) -> f32 {
    use aho_corasick::AhoCorasick;

    let patterns: &[&[u8]] = &[
        &schema::EBML_HEADER.to_be_bytes(),
        b"matroska",
        b"webm",
        &schema::SEGMENT.to_be_bytes(),
        &schema::CLUSTER.to_be_bytes(),
    ];
    let Ok(ac) = AhoCorasick::new(patterns) else {
        return 0.0;
    };

    let hits = ac.find_iter(data).count();
    (hits as f32 * 0.2).min(1.0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn probe_scores_zero_on_unrelated_data() {
        assert_eq!(probe(b"not a container at all"), 0.0);
    }

    #[test]
    fn probe_scores_highly_on_ebml_header_bytes() {
        let mut data = schema::EBML_HEADER.to_be_bytes().to_vec();
        data.extend_from_slice(b"matroska");
        assert!(probe(&data) > 0.0);
    }
}
