//! The packed-audio container (`.scd`).
//!
//! Only the parts of the container that patching needs to understand are modelled: the file
//! header (for the total-size field), the offsets header (to find the audio table) and the audio
//! entries themselves. Everything else is carried through as opaque bytes: the tables between the
//! offsets header and the audio table, and whatever sits after the audio table or between two
//! entries (usually the layout and attribute tables). Table offsets that point into one of those
//! blocks follow it when an entry before it changes size.

use std::io::{Cursor, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use eyre::{ensure, eyre, Context, Result};

use super::{align_up, to_u16, to_u32, write_padding};

pub const MAGIC: &[u8; 8] = b"SEDBSSCF";

pub const FILE_HEADER_LEN: usize = 0x30;
pub const OFFSETS_HEADER_LEN: usize = 0x20;

/// Offset of the total file size within the file header.
pub const TOTAL_SIZE_OFFSET: usize = 0x10;

/// Offset of the audio table offset within the file.
pub const AUDIO_TABLE_FIELD_OFFSET: usize = FILE_HEADER_LEN + 0x10;
pub const LAYOUT_TABLE_FIELD_OFFSET: usize = FILE_HEADER_LEN + 0x14;
pub const ATTRIBUTE_TABLE_FIELD_OFFSET: usize = FILE_HEADER_LEN + 0x18;

pub const ENTRY_HEADER_LEN: usize = 0x20;

/// Offsets of fields within an audio entry sub-header.
pub const PAYLOAD_LENGTH_FIELD: usize = 0x00;
pub const LOOP_START_FIELD: usize = 0x10;
pub const LOOP_END_FIELD: usize = 0x14;

const ENTRY_ALIGNMENT: usize = 16;

/// Codec of an audio entry's payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AudioFormat {
    Empty,
    Pcm16,
    Vorbis,
    MsAdpcm,
    Other(i32),
}

impl AudioFormat {
    pub fn from_raw(raw: i32) -> AudioFormat {
        match raw {
            -1 => AudioFormat::Empty,
            0x01 => AudioFormat::Pcm16,
            0x06 => AudioFormat::Vorbis,
            0x0c => AudioFormat::MsAdpcm,
            other => AudioFormat::Other(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            AudioFormat::Empty => -1,
            AudioFormat::Pcm16 => 0x01,
            AudioFormat::Vorbis => 0x06,
            AudioFormat::MsAdpcm => 0x0c,
            AudioFormat::Other(raw) => raw,
        }
    }
}

/// A single audio stream within a container.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AudioEntry {
    pub channels: u32,
    pub sample_rate: u32,
    pub format: AudioFormat,

    /// Loop start, as a byte offset into `data`.
    pub loop_start: u32,

    /// Loop end, as a byte offset into `data`.
    pub loop_end: u32,

    pub aux_chunk_count: u16,
    reserved: u16,

    /// Codec-specific data between the sub-header and the payload.
    pub aux: Vec<u8>,

    /// The payload bytes.
    pub data: Vec<u8>,
}

impl AudioEntry {
    pub fn new(channels: u32, sample_rate: u32, format: AudioFormat, data: Vec<u8>) -> AudioEntry {
        AudioEntry {
            channels,
            sample_rate,
            format,
            loop_start: 0,
            loop_end: 0,
            aux_chunk_count: 0,
            reserved: 0,
            aux: vec![],
            data,
        }
    }

    fn read(reader: &mut Cursor<&[u8]>) -> Result<AudioEntry> {
        let data_len = reader.read_u32::<LE>().wrap_err("payload length")?;
        let channels = reader.read_u32::<LE>().wrap_err("channels")?;
        let sample_rate = reader.read_u32::<LE>().wrap_err("sample rate")?;
        let format = AudioFormat::from_raw(reader.read_i32::<LE>().wrap_err("format")?);
        let loop_start = reader.read_u32::<LE>().wrap_err("loop start")?;
        let loop_end = reader.read_u32::<LE>().wrap_err("loop end")?;
        let aux_len = reader.read_u32::<LE>().wrap_err("aux size")?;
        let aux_chunk_count = reader.read_u16::<LE>().wrap_err("aux chunk count")?;
        let reserved = reader.read_u16::<LE>()?;

        let remaining = (reader.get_ref().len() as u64).saturating_sub(reader.position());
        ensure!(
            aux_len as u64 + data_len as u64 <= remaining,
            "{} aux and {} payload bytes but only {} bytes remain",
            aux_len,
            data_len,
            remaining
        );

        let mut aux = vec![0u8; aux_len as usize];
        reader.read_exact(&mut aux).wrap_err("aux data")?;

        let mut data = vec![0u8; data_len as usize];
        reader
            .read_exact(&mut data)
            .wrap_err_with(|| format!("{} payload bytes", data_len))?;

        Ok(AudioEntry {
            channels,
            sample_rate,
            format,
            loop_start,
            loop_end,
            aux_chunk_count,
            reserved,
            aux,
            data,
        })
    }

    fn write(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writer.write_u32::<LE>(to_u32(self.data.len(), "payload length")?)?;
        writer.write_u32::<LE>(self.channels)?;
        writer.write_u32::<LE>(self.sample_rate)?;
        writer.write_i32::<LE>(self.format.raw())?;
        writer.write_u32::<LE>(self.loop_start)?;
        writer.write_u32::<LE>(self.loop_end)?;
        writer.write_u32::<LE>(to_u32(self.aux.len(), "aux size")?)?;
        writer.write_u16::<LE>(self.aux_chunk_count)?;
        writer.write_u16::<LE>(self.reserved)?;
        writer.write_all(&self.aux)?;
        writer.write_all(&self.data)
    }

    /// Size of the entry without trailing alignment.
    fn len(&self) -> usize {
        ENTRY_HEADER_LEN + self.aux.len() + self.data.len()
    }
}

/// Opaque bytes following the audio table or an audio entry.
#[derive(Clone, PartialEq, Eq, Debug)]
struct Gap {
    /// Whether the block opens with zero padding up to the entry alignment. The padding is
    /// recomputed on write, so it stays correct when the entry before it changes size.
    padded: bool,

    /// Everything after the padding.
    data: Vec<u8>,
}

static EMPTY_GAP: Gap = Gap {
    padded: true,
    data: Vec::new(),
};

impl Default for Gap {
    fn default() -> Gap {
        EMPTY_GAP.clone()
    }
}

impl Gap {
    /// Splits the bytes that start at `start` into padding and data. A block whose padding isn't
    /// all zeroes, or that one of `pointers` points into, is kept whole.
    fn split(content: &[u8], start: usize, pointers: &[usize]) -> Gap {
        let padding = align_up(start, ENTRY_ALIGNMENT) - start;

        let padded = content.len() >= padding
            && content[..padding].iter().all(|byte| *byte == 0)
            && !pointers
                .iter()
                .any(|pointer| (start..start + padding).contains(pointer));

        Gap {
            padded,
            data: content[if padded { padding } else { 0 }..].to_vec(),
        }
    }

    fn padding(&self, position: usize) -> usize {
        if self.padded {
            align_up(position, ENTRY_ALIGNMENT) - position
        } else {
            0
        }
    }
}

/// A table offset from the offsets header.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum TableOffset {
    /// Unset, or pointing before the audio table, where nothing moves.
    Fixed(u32),

    /// `delta` bytes into the data of gap `slot`. Slot 0 follows the audio table and slot `n + 1`
    /// follows audio entry `n`.
    InGap { slot: usize, delta: usize },
}

/// A parsed container.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Container {
    version: u32,
    sub_version: u8,
    header_reserved: [u8; FILE_HEADER_LEN - 0x14],

    sound_count: u16,
    track_count: u16,
    counts_reserved: u16,
    sound_table_offset: TableOffset,
    track_table_offset: TableOffset,
    layout_table_offset: TableOffset,
    attribute_table_offset: TableOffset,
    offsets_reserved: u32,

    /// Everything between the offsets header and the audio table.
    tables: Vec<u8>,

    /// What follows the audio table, then what follows each entry.
    gaps: Vec<Gap>,

    pub audio: Vec<AudioEntry>,
}

impl Container {
    /// Creates a container with no sound/track/layout tables around `audio`.
    pub fn new(audio: Vec<AudioEntry>) -> Container {
        Container {
            version: 3,
            sub_version: 4,
            header_reserved: [0; FILE_HEADER_LEN - 0x14],
            sound_count: 0,
            track_count: 0,
            counts_reserved: 0,
            sound_table_offset: TableOffset::Fixed(0),
            track_table_offset: TableOffset::Fixed(0),
            layout_table_offset: TableOffset::Fixed(0),
            attribute_table_offset: TableOffset::Fixed(0),
            offsets_reserved: 0,
            tables: vec![],
            gaps: vec![Gap::default(); audio.len() + 1],
            audio,
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Container> {
        let mut reader = Cursor::new(bytes);

        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic).wrap_err("magic")?;
        ensure!(&magic == MAGIC, "bad magic {:02x?}", magic);

        let version = reader.read_u32::<LE>().wrap_err("version")?;

        let endian = reader.read_u8().wrap_err("endian flag")?;
        ensure!(endian == 0, "big-endian containers are not supported");

        let sub_version = reader.read_u8().wrap_err("sub-version")?;

        let header_len = reader.read_u16::<LE>().wrap_err("header size")?;
        ensure!(
            header_len as usize == FILE_HEADER_LEN,
            "unexpected header size {:#x}",
            header_len
        );

        let total_size = reader.read_u32::<LE>().wrap_err("total size")?;
        ensure!(
            total_size as usize == bytes.len(),
            "total size field says {} bytes but the container is {} bytes",
            total_size,
            bytes.len()
        );

        let mut header_reserved = [0u8; FILE_HEADER_LEN - 0x14];
        reader.read_exact(&mut header_reserved)?;

        let sound_count = reader.read_u16::<LE>().wrap_err("sound count")?;
        let track_count = reader.read_u16::<LE>().wrap_err("track count")?;
        let audio_count = reader.read_u16::<LE>().wrap_err("audio count")?;
        let counts_reserved = reader.read_u16::<LE>()?;
        let sound_table_offset = reader.read_u32::<LE>().wrap_err("sound table offset")?;
        let track_table_offset = reader.read_u32::<LE>().wrap_err("track table offset")?;
        let audio_table_offset = reader.read_u32::<LE>().wrap_err("audio table offset")? as usize;
        let layout_table_offset = reader.read_u32::<LE>().wrap_err("layout table offset")?;
        let attribute_table_offset = reader.read_u32::<LE>().wrap_err("attribute table offset")?;
        let offsets_reserved = reader.read_u32::<LE>()?;

        let tables_start = FILE_HEADER_LEN + OFFSETS_HEADER_LEN;

        let tables = bytes
            .get(tables_start..audio_table_offset)
            .ok_or_else(|| eyre!("audio table offset {:#x} is out of range", audio_table_offset))?
            .to_vec();

        let entry_offsets = read_entry_offsets(bytes, audio_table_offset, audio_count as usize)?;

        // The bytes from `gap_start` up to each entry, and after the last one, are kept as gaps.
        let mut spans = Vec::with_capacity(entry_offsets.len() + 1);
        let mut audio = Vec::with_capacity(entry_offsets.len());
        let mut gap_start = audio_table_offset + entry_offsets.len() * 4;

        for (index, offset) in entry_offsets.into_iter().enumerate() {
            let offset = offset as usize;

            ensure!(
                offset >= gap_start,
                "audio entry {} at {:#x} overlaps the data before it, which ends at {:#x}",
                index,
                offset,
                gap_start
            );

            spans.push(gap_start..offset);

            reader.set_position(offset as u64);
            let entry = AudioEntry::read(&mut reader)
                .wrap_err_with(|| format!("audio entry {} at {:#x}", index, offset))?;

            audio.push(entry);
            gap_start = reader.position() as usize;
        }

        spans.push(gap_start..bytes.len());

        let pointers = [
            sound_table_offset,
            track_table_offset,
            layout_table_offset,
            attribute_table_offset,
        ]
        .map(|pointer| pointer as usize);

        let gaps = spans
            .iter()
            .map(|span| Gap::split(&bytes[span.clone()], span.start, &pointers))
            .collect::<Vec<_>>();

        let anchor = |field: &str, pointer: u32| -> Result<TableOffset> {
            if (pointer as usize) < audio_table_offset {
                return Ok(TableOffset::Fixed(pointer));
            }

            spans
                .iter()
                .zip(&gaps)
                .enumerate()
                .find(|(_, (span, _))| span.contains(&(pointer as usize)))
                .map(|(slot, (span, gap))| TableOffset::InGap {
                    slot,
                    delta: pointer as usize - span.start - gap.padding(span.start),
                })
                .ok_or_else(|| {
                    eyre!(
                        "{} {:#x} points into the audio table or an audio entry",
                        field,
                        pointer
                    )
                })
        };

        Ok(Container {
            version,
            sub_version,
            header_reserved,
            sound_count,
            track_count,
            counts_reserved,
            sound_table_offset: anchor("sound table offset", sound_table_offset)?,
            track_table_offset: anchor("track table offset", track_table_offset)?,
            layout_table_offset: anchor("layout table offset", layout_table_offset)?,
            attribute_table_offset: anchor("attribute table offset", attribute_table_offset)?,
            offsets_reserved,
            tables,
            gaps,
            audio,
        })
    }

    fn gap(&self, slot: usize) -> &Gap {
        self.gaps.get(slot).unwrap_or(&EMPTY_GAP)
    }

    /// Serializes the container, recomputing every offset and the total-size field.
    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let audio_table_offset = FILE_HEADER_LEN + OFFSETS_HEADER_LEN + self.tables.len();

        let mut entry_offsets = Vec::with_capacity(self.audio.len());
        let mut data_starts = Vec::with_capacity(self.audio.len() + 1);

        let mut place_gap = |slot: usize, position: usize| {
            let gap = self.gap(slot);
            let start = position + gap.padding(position);

            data_starts.push(start);
            start + gap.data.len()
        };

        let mut cursor = place_gap(0, audio_table_offset + self.audio.len() * 4);

        for (index, entry) in self.audio.iter().enumerate() {
            entry_offsets.push(to_u32(cursor, "audio entry offset")?);
            cursor = place_gap(index + 1, cursor + entry.len());
        }

        let resolve = |offset: TableOffset, field: &str| -> std::io::Result<u32> {
            match offset {
                TableOffset::Fixed(raw) => Ok(raw),

                TableOffset::InGap { slot, delta } => match data_starts.get(slot) {
                    Some(start) => to_u32(start + delta, field),
                    None => Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("{} follows audio entry {}, which was removed", field, slot - 1),
                    )),
                },
            }
        };

        let total_size = to_u32(cursor, "total size")?;

        let mut out = Vec::with_capacity(cursor);

        out.write_all(MAGIC)?;
        out.write_u32::<LE>(self.version)?;
        out.write_u8(0)?;
        out.write_u8(self.sub_version)?;
        out.write_u16::<LE>(FILE_HEADER_LEN as u16)?;
        out.write_u32::<LE>(total_size)?;
        out.write_all(&self.header_reserved)?;

        out.write_u16::<LE>(self.sound_count)?;
        out.write_u16::<LE>(self.track_count)?;
        out.write_u16::<LE>(to_u16(self.audio.len(), "audio count")?)?;
        out.write_u16::<LE>(self.counts_reserved)?;
        out.write_u32::<LE>(resolve(self.sound_table_offset, "sound table offset")?)?;
        out.write_u32::<LE>(resolve(self.track_table_offset, "track table offset")?)?;
        out.write_u32::<LE>(to_u32(audio_table_offset, "audio table offset")?)?;
        out.write_u32::<LE>(resolve(self.layout_table_offset, "layout table offset")?)?;
        out.write_u32::<LE>(resolve(self.attribute_table_offset, "attribute table offset")?)?;
        out.write_u32::<LE>(self.offsets_reserved)?;

        out.write_all(&self.tables)?;

        for offset in &entry_offsets {
            out.write_u32::<LE>(*offset)?;
        }

        self.write_gap(&mut out, 0)?;

        for (index, entry) in self.audio.iter().enumerate() {
            entry.write(&mut out)?;
            self.write_gap(&mut out, index + 1)?;
        }

        debug_assert_eq!(out.len(), cursor);

        Ok(out)
    }

    fn write_gap(&self, out: &mut Vec<u8>, slot: usize) -> std::io::Result<()> {
        let gap = self.gap(slot);

        if gap.padded {
            let written = out.len();
            write_padding(out, written, ENTRY_ALIGNMENT)?;
        }

        out.write_all(&gap.data)
    }

    /// Swaps the entry at `index` for `entry`, returning the old one.
    pub fn replace(&mut self, index: usize, entry: AudioEntry) -> Option<AudioEntry> {
        let slot = self.audio.get_mut(index)?;
        Some(std::mem::replace(slot, entry))
    }
}

fn read_entry_offsets(bytes: &[u8], table_offset: usize, count: usize) -> Result<Vec<u32>> {
    let mut reader = Cursor::new(bytes);
    reader.set_position(table_offset as u64);

    (0..count)
        .map(|index| {
            reader
                .read_u32::<LE>()
                .wrap_err_with(|| format!("offset of audio entry {}", index))
        })
        .collect()
}

/// Reads the absolute offsets of the audio entry sub-headers straight from the container headers,
/// without parsing the entries.
pub fn probe_entry_offsets(bytes: &[u8]) -> Result<Vec<u32>> {
    let mut reader = Cursor::new(bytes);

    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic).wrap_err("magic")?;
    ensure!(&magic == MAGIC, "bad magic {:02x?}", magic);

    reader.set_position((FILE_HEADER_LEN + 4) as u64);
    let audio_count = reader.read_u16::<LE>().wrap_err("audio count")?;

    reader.set_position(AUDIO_TABLE_FIELD_OFFSET as u64);
    let table_offset = reader.read_u32::<LE>().wrap_err("audio table offset")?;

    read_entry_offsets(bytes, table_offset as usize, audio_count as usize)
}

/// Reads a little-endian `u32` field at `offset`.
pub fn read_field(bytes: &[u8], offset: usize) -> Option<u32> {
    let mut field = bytes.get(offset..offset + 4)?;
    field.read_u32::<LE>().ok()
}

/// Overwrites the little-endian `u32` field at `offset`. Returns `false` if it is out of range.
pub fn write_field(bytes: &mut [u8], offset: usize, value: u32) -> bool {
    match bytes.get_mut(offset..offset + 4) {
        Some(mut field) => field.write_u32::<LE>(value).is_ok(),
        None => false,
    }
}
