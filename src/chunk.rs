//! The chunk container format: a 4-byte ASCII tag, a 4-byte big-endian length and exactly that
//! many body bytes.

use crate::prelude::*;

/// The tag of the header chunk.
pub const HEADER_TAG: [u8; 4] = *b"MThd";
/// The tag of a track chunk.
pub const TRACK_TAG: [u8; 4] = *b"MTrk";

/// A byte stream that keeps count of how many bytes were consumed, for error reporting.
pub(crate) struct Source<R> {
    inner: R,
    offset: u64,
}
impl<R: Read> Source<R> {
    pub fn new(inner: R) -> Source<R> {
        Source { inner, offset: 0 }
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Fill as much of `buf` as possible, stopping only at EOF.
    /// Returns how many bytes were read.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(Error::from(err).at(None, self.offset + filled as u64)),
            }
        }
        self.offset += filled as u64;
        Ok(filled)
    }

    /// Read exactly `buf.len()` bytes, treating EOF as a truncated chunk.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let start = self.offset;
        let filled = self.fill(buf)?;
        ensure!(
            filled == buf.len(),
            Error::new(err_format!("reached eof before chunk ended")).at(None, start)
        );
        Ok(())
    }

    /// Read `len` bytes into a freshly allocated buffer.
    ///
    /// The buffer grows as data arrives, so a bogus length cannot force a huge allocation.
    pub fn read_body(&mut self, len: u32) -> Result<Vec<u8>> {
        let start = self.offset;
        let mut body = Vec::with_capacity((len as usize).min(64 * 1024));
        let read = (&mut self.inner)
            .take(len as u64)
            .read_to_end(&mut body)
            .map_err(|err| Error::from(err).at(None, start))?;
        self.offset += read as u64;
        ensure!(
            body.len() == len as usize,
            Error::new(err_format!("reached eof before chunk ended")).at(None, start)
        );
        Ok(body)
    }

    /// Discard `len` bytes.
    pub fn skip(&mut self, len: u32) -> Result<()> {
        let start = self.offset;
        let skipped = io::copy(&mut (&mut self.inner).take(len as u64), &mut io::sink())
            .map_err(|err| Error::from(err).at(None, start))?;
        self.offset += skipped;
        ensure!(
            skipped == len as u64,
            Error::new(err_format!("reached eof before chunk ended")).at(None, start)
        );
        Ok(())
    }
}

/// The tag and length that precede every chunk body.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct ChunkHeader {
    pub tag: [u8; 4],
    pub len: u32,
    /// Offset of the first body byte.
    pub body_offset: u64,
}
impl ChunkHeader {
    /// Read the next chunk header.
    ///
    /// If we're *exactly* at EOF, returns `None` signalling no more chunks.
    pub fn read<R: Read>(src: &mut Source<R>) -> Result<Option<ChunkHeader>> {
        let start = src.offset();
        let mut raw = [0; 8];
        let filled = src.fill(&mut raw)?;
        if filled == 0 {
            return Ok(None);
        }
        ensure!(
            filled == raw.len(),
            Error::new(err_format!("truncated chunk header")).at(None, start)
        );
        let mut tag = [0; 4];
        tag.copy_from_slice(&raw[..4]);
        let len = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        Ok(Some(ChunkHeader {
            tag,
            len,
            body_offset: src.offset(),
        }))
    }
}

/// Write a full chunk: tag, body length and body.
pub(crate) fn write_chunk<W: Write>(tag: [u8; 4], body: &[u8], out: &mut W) -> Result<()> {
    let len = u32::try_from(body.len())
        .map_err(|_| err_range!("midi chunk size exceeds 32 bit range"))?;
    let mut head = [0; 8];
    head[..4].copy_from_slice(&tag);
    head[4..].copy_from_slice(&len.to_be_bytes());
    out.write_all(&head)?;
    out.write_all(body)?;
    Ok(())
}
