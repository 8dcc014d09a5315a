//! The growable read window (spec L1).
//!
//! [`ReadWindow`] is a `begin..end` slice over a `Vec<u8>` of capacity `>=
//! end - begin`. `reserve` grows the tail, compacting toward offset zero
//! first if there's unused room behind `begin`; `move_start`/`move_end`
//! slide the two edges. Any pointer obtained from `data()` is invalidated
//! by a subsequent `reserve`/`move_end` that triggers compaction or
//! reallocation — callers must refetch.

use std::cmp;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("attempted to advance the window start by {requested} bytes but only {available} are buffered")]
    ConsumedPastEnd { requested: usize, available: usize },
}

#[derive(Default)]
pub struct ReadWindow {
    buf: Vec<u8>,
    begin: usize,
    end: usize,
}

impl ReadWindow {
    pub fn new() -> Self {
        ReadWindow::default()
    }

    /// Ensures at least `additional` free bytes exist between `end` and the
    /// buffer's capacity, compacting or reallocating as needed.
    pub fn reserve(&mut self, additional: usize) {
        let tail_room = self.buf.len().saturating_sub(self.end);
        if tail_room >= additional {
            return;
        }

        if self.begin > 0 {
            self.buf.copy_within(self.begin..self.end, 0);
            self.end -= self.begin;
            self.begin = 0;

            if self.buf.len() - self.end >= additional {
                return;
            }
        }

        let target = self.end + additional;
        self.buf.resize(target, 0);
    }

    /// Advances `begin` by `n`, consuming that many bytes from the front of
    /// the window. Fails if `n` exceeds the currently buffered size.
    pub fn move_start(&mut self, n: usize) -> Result<(), BufferError> {
        let available = self.size();
        if n > available {
            return Err(BufferError::ConsumedPastEnd {
                requested: n,
                available,
            });
        }
        self.begin += n;
        Ok(())
    }

    /// Extends `end` by `n`, exposing `n` more freshly-written bytes.
    /// Implicitly reserves the space first.
    pub fn move_end(&mut self, n: usize) {
        self.reserve(n);
        self.end += n;
    }

    /// The currently buffered bytes.
    pub fn data(&self) -> &[u8] {
        &self.buf[self.begin..self.end]
    }

    /// The reserved-but-unwritten tail, for a [`crate::io::ByteSource`] to
    /// read directly into.
    pub fn spare_capacity_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.end..]
    }

    pub fn size(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Drops all buffered data and resets the window to empty, retaining
    /// the underlying allocation. Used after a seek invalidates the
    /// window's contents.
    pub fn flush(&mut self) {
        self.begin = 0;
        self.end = 0;
    }
}
