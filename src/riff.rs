//! There's an abomination called RMID, MIDI embedded in a RIFF file.
//! Support for these files is provided by skipping the RIFF wrapper and reading the raw SMF file
//! found inside the `data` chunk.

use crate::{
    chunk::{ChunkHeader, Source},
    prelude::*,
};

/// The tag of the outermost RIFF chunk.
pub(crate) const RIFF_TAG: [u8; 4] = *b"RIFF";

/// Skip the RIFF preamble, given that the `RIFF` chunk header was already consumed.
///
/// Returns the header of the first chunk of the embedded SMF file, or `None` if the `data` chunk
/// is empty and the stream ends there.
pub(crate) fn unwrap<R: Read>(src: &mut Source<R>) -> Result<Option<ChunkHeader>> {
    let formtype_offset = src.offset();
    let mut formtype = [0; 4];
    src.read_exact(&mut formtype)?;
    ensure!(
        &formtype == b"RMID",
        Error::new(err_format!("not an rmid riff file")).at(None, formtype_offset)
    );
    loop {
        let head = match ChunkHeader::read(src)? {
            Some(head) => head,
            None => bail!(Error::new(err_format!("no rmid data chunk")).at(None, src.offset())),
        };
        if &head.tag == b"data" {
            return ChunkHeader::read(src);
        }
        //RIFF lengths are little-endian, and odd-sized chunks are padded
        let len = head.len.swap_bytes();
        src.skip(len)?;
        if len % 2 == 1 {
            src.skip(1)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::HEADER_TAG;
    use pretty_assertions::assert_eq;

    fn riff_chunk(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = tag.to_vec();
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    #[test]
    fn finds_data_chunk() {
        let mut inner = b"RMID".to_vec();
        inner.extend(riff_chunk(b"INFO", b"odd"));
        inner.extend(riff_chunk(b"data", b"MThd\0\0\0\x06\0\0\0\x01\0\x60"));
        let file = riff_chunk(&RIFF_TAG, &inner);
        let mut src = Source::new(&file[..]);
        let riff = ChunkHeader::read(&mut src).unwrap().unwrap();
        assert_eq!(riff.tag, RIFF_TAG);
        let head = unwrap(&mut src).unwrap().unwrap();
        assert_eq!(head.tag, HEADER_TAG);
        assert_eq!(head.len, 6);
        assert_eq!(head.body_offset, 12 + 12 + 8 + 8);
    }

    #[test]
    fn rejects_other_formtypes() {
        let file = riff_chunk(&RIFF_TAG, b"WAVEfmt ");
        let mut src = Source::new(&file[..]);
        ChunkHeader::read(&mut src).unwrap();
        let err = unwrap(&mut src).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Format(_)));
        assert_eq!(err.offset(), Some(8));
    }

    #[test]
    fn missing_data_chunk() {
        let file = riff_chunk(&RIFF_TAG, b"RMID");
        let mut src = Source::new(&file[..]);
        ChunkHeader::read(&mut src).unwrap();
        assert!(unwrap(&mut src).is_err());
    }
}
