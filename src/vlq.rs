//! Variable-length quantities, referred to in the MIDI spec as "variable length ints".
//!
//! Each byte carries 7 bits of the value, most significant group first, with the top bit set on
//! every byte except the last. At most 4 bytes are allowed, limiting values to 28 bits.

use crate::prelude::*;

/// The largest value that fits in a variable-length quantity.
pub const MAX: u32 = 0x0FFF_FFFF;

/// Read a variable-length quantity, advancing the slice.
///
/// Fails with `ErrorKind::Format` if the input ends in the middle of the quantity or if the
/// quantity would need a 5th byte.
pub fn decode(raw: &mut &[u8]) -> Result<u32> {
    let mut int: u32 = 0;
    for _ in 0..4 {
        let byte = match raw.split_checked(1) {
            Some(slice) => slice[0],
            None => bail!(err_format!("unexpected eof while reading varlen int")),
        };
        int = int << 7 | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            return Ok(int);
        }
    }
    Err(err_format!("varlen integer larger than 4 bytes").into())
}

/// Encode a variable-length quantity into a fixed buffer.
///
/// Returns the buffer and the amount of bytes used, which is always between 1 and 4.
/// Fails with `ErrorKind::ValueOutOfRange` if the value does not fit in 28 bits.
pub fn encode(int: u32) -> StdResult<([u8; 4], usize), ErrorKind> {
    ensure!(int <= MAX, err_range!("varlen integer exceeds 28 bits"));
    let mut buf = [0; 4];
    let mut len = 0;
    let mut skipping = true;
    for i in (0..4).rev() {
        let byte = ((int >> (i * 7)) & 0x7F) as u8;
        if skipping && byte == 0 && i != 0 {
            //Skip these leading zeros
        } else {
            //Write down this u7, flagging every byte but the last one as a leading byte
            skipping = false;
            buf[len] = if i == 0 { byte } else { byte | 0x80 };
            len += 1;
        }
    }
    Ok((buf, len))
}

/// Append a variable-length quantity to the output buffer.
#[inline]
pub fn write(int: u32, out: &mut Vec<u8>) -> StdResult<(), ErrorKind> {
    let (buf, len) = encode(int)?;
    out.extend_from_slice(&buf[..len]);
    Ok(())
}

/// Reads a slice represented in the input as a varlen `len` followed by `len` bytes.
pub(crate) fn read_slice<'a>(raw: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = decode(raw)?;
    Ok(raw
        .split_checked(len as usize)
        .ok_or(err_format!("varlen slice extends past the end of the track"))?)
}

/// Write a slice represented as a varlen length and then the raw bytes.
pub(crate) fn write_slice(slice: &[u8], out: &mut Vec<u8>) -> StdResult<(), ErrorKind> {
    let len = u32::try_from(slice.len())
        .map_err(|_| err_range!("varlen slice exceeds 28 bits"))?;
    write(len, out).map_err(|_| err_range!("varlen slice exceeds 28 bits"))?;
    out.extend_from_slice(slice);
    Ok(())
}
