//! In-memory models of the game's binary formats, with parsing and serialization.
//!
//! Parsers report problems as `eyre` reports whose context chain names the field (and, where
//! useful, the byte offset) that could not be read. The patching modules fold those reports into
//! [`crate::PatchError`] at their boundary.

pub mod ogg;
pub mod pap;
pub mod payload;
pub mod scd;
pub mod tmb;
pub mod wav;

use std::io::{Error, ErrorKind, Read, Write};

/// Rounds `value` up to the next multiple of `alignment`.
pub(crate) fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) / alignment * alignment
}

/// Skips the zero padding that follows `written` bytes of a block aligned to `alignment`.
pub(crate) fn skip_padding(
    reader: &mut impl Read,
    written: usize,
    alignment: usize,
) -> std::io::Result<()> {
    let padding = align_up(written, alignment) - written;
    let mut buf = [0u8; 16];

    reader.read_exact(&mut buf[..padding])
}

/// Writes the zero padding needed after `written` bytes to reach `alignment`.
pub(crate) fn write_padding(
    writer: &mut impl Write,
    written: usize,
    alignment: usize,
) -> std::io::Result<()> {
    let padding = align_up(written, alignment) - written;

    writer.write_all(&[0u8; 16][..padding])
}

/// Converts a length or offset into the 32-bit field the formats store it in.
pub(crate) fn to_u32(value: usize, field: &str) -> std::io::Result<u32> {
    u32::try_from(value).map_err(|_| {
        Error::new(
            ErrorKind::InvalidData,
            format!("{} of {} does not fit in 32 bits", field, value),
        )
    })
}

/// Converts a count into the 16-bit field the formats store it in.
pub(crate) fn to_u16(value: usize, field: &str) -> std::io::Result<u16> {
    u16::try_from(value).map_err(|_| {
        Error::new(
            ErrorKind::InvalidData,
            format!("{} of {} does not fit in 16 bits", field, value),
        )
    })
}
