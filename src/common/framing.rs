// vim: tw=80

//! Length-prefixed framing for a variable-length payload inside one of the
//! label's fixed-size regions.  The property-list codec (§1, `proplist.rs`)
//! doesn't itself guarantee a self-terminating encoding against trailing
//! zero padding, so this subsystem frames its own payloads with a 4-byte
//! length header, the same role XDR's own length-prefixing plays for the
//! real nvlist encoding.

use crate::common::{ByteT, Error};
use byteorder::{ByteOrder, LittleEndian};

const HEADER_LEN: usize = 4;

/// Pack `payload` into a zero-padded, length-prefixed buffer of exactly
/// `region_size` bytes.
///
/// # Errors
///
/// Returns `ENAMETOOLONG` if `payload` (plus its length header) doesn't fit
/// (§7: *name-too-long*, the overflow condition named in §4.5 step 5).
pub fn frame(payload: &[u8], region_size: ByteT) -> Result<Vec<u8>, Error> {
    let region_size = region_size as usize;
    if payload.len() + HEADER_LEN > region_size {
        return Err(Error::ENAMETOOLONG);
    }
    let mut buf = vec![0u8; region_size];
    LittleEndian::write_u32(&mut buf[..HEADER_LEN], payload.len() as u32);
    buf[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);
    Ok(buf)
}

/// Recover the framed payload from a region previously produced by `frame`.
///
/// # Errors
///
/// Returns `EINVAL` if the embedded length is inconsistent with the
/// region's actual size (a corrupt or foreign region).
pub fn unframe(buf: &[u8]) -> Result<&[u8], Error> {
    if buf.len() < HEADER_LEN {
        return Err(Error::EINVAL);
    }
    let len = LittleEndian::read_u32(&buf[..HEADER_LEN]) as usize;
    if HEADER_LEN + len > buf.len() {
        return Err(Error::EINVAL);
    }
    Ok(&buf[HEADER_LEN..HEADER_LEN + len])
}
