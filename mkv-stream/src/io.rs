//! The byte source contract (spec L0) and the two implementations the
//! engine ships: a file-backed source for real playback and an in-memory
//! one for tests and embedders that already hold the file in RAM.

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub readable: bool,
    pub seekable: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("byte source does not support seeking")]
    NotSeekable,

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// A seekable source of bytes driving the streaming controller.
///
/// Suspension happens only inside `read`/`seek`; everything else the
/// controller does is synchronous over the in-memory [`crate::buffer::ReadWindow`].
#[async_trait]
pub trait ByteSource: Send {
    fn capabilities(&self) -> Capabilities;

    /// Reads up to `dst.len()` bytes. Returns the number of bytes read and
    /// the `tag` unchanged, so callers can detect a stale reply after a
    /// cancelling seek. `0` bytes read signals end of stream.
    async fn read(&mut self, dst: &mut [u8], tag: u64) -> Result<(usize, u64), IoError>;

    /// Seeks to an absolute offset from the start of the stream.
    async fn seek(&mut self, abs_offset: u64) -> Result<(), IoError>;

    fn current_position(&self) -> u64;
}

/// An in-memory [`ByteSource`], for tests and for embedders that already
/// hold the whole file.
pub struct SliceByteSource {
    data: Vec<u8>,
    position: u64,
}

impl SliceByteSource {
    pub fn new(data: Vec<u8>) -> Self {
        SliceByteSource { data, position: 0 }
    }
}

#[async_trait]
impl ByteSource for SliceByteSource {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            readable: true,
            seekable: true,
        }
    }

    async fn read(&mut self, dst: &mut [u8], tag: u64) -> Result<(usize, u64), IoError> {
        let pos = self.position as usize;
        if pos >= self.data.len() {
            return Ok((0, tag));
        }

        let n = dst.len().min(self.data.len() - pos);
        dst[..n].copy_from_slice(&self.data[pos..pos + n]);
        self.position += n as u64;

        Ok((n, tag))
    }

    async fn seek(&mut self, abs_offset: u64) -> Result<(), IoError> {
        self.position = abs_offset;
        Ok(())
    }

    fn current_position(&self) -> u64 {
        self.position
    }
}

#[cfg(feature = "fs")]
pub struct FileByteSource {
    file: tokio::fs::File,
    position: u64,
}

#[cfg(feature = "fs")]
impl FileByteSource {
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self, IoError> {
        let file = tokio::fs::File::open(path).await?;
        Ok(FileByteSource { file, position: 0 })
    }
}

#[cfg(feature = "fs")]
#[async_trait]
impl ByteSource for FileByteSource {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            readable: true,
            seekable: true,
        }
    }

    async fn read(&mut self, dst: &mut [u8], tag: u64) -> Result<(usize, u64), IoError> {
        use tokio::io::AsyncReadExt;

        let n = self.file.read(dst).await?;
        self.position += n as u64;

        Ok((n, tag))
    }

    async fn seek(&mut self, abs_offset: u64) -> Result<(), IoError> {
        use tokio::io::AsyncSeekExt;

        self.file
            .seek(std::io::SeekFrom::Start(abs_offset))
            .await?;
        self.position = abs_offset;

        Ok(())
    }

    fn current_position(&self) -> u64 {
        self.position
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn slice_source_reports_eos_with_zero_bytes() {
        let mut source = SliceByteSource::new(vec![1, 2, 3]);
        let mut buf = [0u8; 8];

        let (n, tag) = source.read(&mut buf, 7).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(tag, 7);
        assert_eq!(&buf[..3], &[1, 2, 3]);

        let (n, _) = source.read(&mut buf, 7).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn slice_source_seek_repositions_reads() {
        let mut source = SliceByteSource::new(vec![10, 20, 30, 40]);
        source.seek(2).await.unwrap();

        let mut buf = [0u8; 2];
        let (n, _) = source.read(&mut buf, 0).await.unwrap();
        assert_eq!(n, 2);
        assert_eq!(buf, [30, 40]);
        assert_eq!(source.current_position(), 4);
    }
}
