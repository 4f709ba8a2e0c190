//! Ogg Vorbis payloads.
//!
//! The container stores the transcoder's Ogg stream verbatim, so the only things we need from it
//! are the stream parameters in the Vorbis identification header and the granule position of each
//! page. Granule positions are the number of decoded samples at the end of a page, which gives the
//! exact duration and a sample-to-byte index without decoding any audio.

use std::io::{Cursor, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use eyre::{ensure, eyre, Context, Result};

use super::{
    payload::{AudioPayload, PageMark, PayloadCodec, Timing},
    scd::AudioFormat,
};

const CAPTURE: &[u8; 4] = b"OggS";
const PAGE_HEADER_LEN: usize = 27;
const CRC_FIELD: usize = 22;

/// Granule value of a page on which no packet finishes.
const NO_GRANULE: u64 = u64::MAX;

/// Header type flag marking the first page of a logical stream.
pub const BEGIN_OF_STREAM: u8 = 0x02;

/// Header type flag marking the last page of a logical stream.
pub const END_OF_STREAM: u8 = 0x04;

/// A single page of an Ogg stream.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct OggPage {
    /// Offset of the capture pattern from the start of the stream.
    pub offset: usize,

    /// Length of the whole page, header included.
    pub len: usize,

    pub header_type: u8,
    pub granule: u64,
    pub serial: u32,
    pub sequence: u32,

    /// Offset of the page body from the start of the stream.
    pub body_offset: usize,
    pub body_len: usize,
}

impl OggPage {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    fn read(reader: &mut Cursor<&[u8]>) -> Result<OggPage> {
        let offset = reader.position() as usize;

        let mut capture = [0u8; 4];
        reader.read_exact(&mut capture).wrap_err("capture pattern")?;
        ensure!(&capture == CAPTURE, "bad capture pattern {:02x?}", capture);

        let version = reader.read_u8().wrap_err("stream structure version")?;
        ensure!(version == 0, "unsupported stream structure version {}", version);

        let header_type = reader.read_u8().wrap_err("header type")?;
        let granule = reader.read_u64::<LE>().wrap_err("granule position")?;
        let serial = reader.read_u32::<LE>().wrap_err("serial number")?;
        let sequence = reader.read_u32::<LE>().wrap_err("sequence number")?;
        let checksum = reader.read_u32::<LE>().wrap_err("checksum")?;

        let segment_count = reader.read_u8().wrap_err("segment count")?;
        let mut segments = vec![0u8; segment_count as usize];
        reader.read_exact(&mut segments).wrap_err("segment table")?;

        let body_offset = reader.position() as usize;
        let body_len = segments.iter().map(|&len| len as usize).sum::<usize>();
        let len = body_offset - offset + body_len;

        let stream = *reader.get_ref();
        let page = stream
            .get(offset..offset + len)
            .ok_or_else(|| eyre!("page body of {} bytes runs past the end of the stream", body_len))?;

        ensure!(
            page_checksum(page) == checksum,
            "checksum mismatch (stored {:#010x})",
            checksum
        );

        reader.set_position((offset + len) as u64);

        Ok(OggPage {
            offset,
            len,
            header_type,
            granule,
            serial,
            sequence,
            body_offset,
            body_len,
        })
    }
}

/// Reads the headers of every page in `stream`.
pub fn read_pages(stream: &[u8]) -> Result<Vec<OggPage>> {
    let mut reader = Cursor::new(stream);
    let mut pages: Vec<OggPage> = vec![];

    while (reader.position() as usize) < stream.len() {
        let offset = reader.position();

        let page = OggPage::read(&mut reader)
            .wrap_err_with(|| format!("page {} at {:#x}", pages.len(), offset))?;

        if let Some(first) = pages.first() {
            ensure!(
                page.serial == first.serial,
                "page {} belongs to stream {:#x}; multiplexed streams are not supported",
                pages.len(),
                page.serial
            );
        }

        pages.push(page);
    }

    ensure!(!pages.is_empty(), "stream is empty");

    Ok(pages)
}

/// Stream parameters from the Vorbis identification header.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct VorbisInfo {
    pub channels: u8,
    pub sample_rate: u32,
}

impl VorbisInfo {
    /// Reads the identification header, which must be the first packet of the stream.
    fn read(packet: &[u8]) -> Result<VorbisInfo> {
        let mut reader = Cursor::new(packet);

        let packet_type = reader.read_u8().wrap_err("packet type")?;
        let mut signature = [0u8; 6];
        reader.read_exact(&mut signature).wrap_err("codec signature")?;

        ensure!(
            packet_type == 1 && &signature == b"vorbis",
            "first packet is not a Vorbis identification header"
        );

        let version = reader.read_u32::<LE>().wrap_err("vorbis version")?;
        ensure!(version == 0, "unsupported vorbis version {}", version);

        let channels = reader.read_u8().wrap_err("channel count")?;
        let sample_rate = reader.read_u32::<LE>().wrap_err("sample rate")?;

        ensure!(channels > 0, "stream has no channels");
        ensure!(sample_rate > 0, "stream has a sample rate of zero");

        Ok(VorbisInfo {
            channels,
            sample_rate,
        })
    }
}

/// Imports Ogg Vorbis files as container payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct VorbisCodec;

impl PayloadCodec for VorbisCodec {
    fn format(&self) -> AudioFormat {
        AudioFormat::Vorbis
    }

    fn import(&self, bytes: &[u8]) -> Result<AudioPayload> {
        let pages = read_pages(bytes)?;

        let first = &pages[0];
        let info = VorbisInfo::read(&bytes[first.body_offset..first.body_offset + first.body_len])
            .wrap_err("identification header")?;

        let marks = pages
            .iter()
            .filter(|page| page.granule != NO_GRANULE)
            .map(|page| PageMark {
                end: page.end(),
                granule: page.granule,
            })
            .collect::<Vec<_>>();

        log::debug!(
            "Ogg stream: {} pages, {} channels at {} Hz, {} samples",
            pages.len(),
            info.channels,
            info.sample_rate,
            marks.last().map_or(0, |mark| mark.granule)
        );

        Ok(AudioPayload {
            format: AudioFormat::Vorbis,
            channels: info.channels as u32,
            sample_rate: info.sample_rate,
            aux: vec![],
            data: bytes.to_vec(),
            timing: Timing::Paged(marks),
        })
    }
}

/// Appends a page holding `body` to `out`.
///
/// `body` is laced as a single packet that ends on this page.
pub fn write_page(
    out: &mut Vec<u8>,
    header_type: u8,
    granule: u64,
    serial: u32,
    sequence: u32,
    body: &[u8],
) -> std::io::Result<()> {
    let full_segments = body.len() / 255;

    if full_segments >= 255 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("a {}-byte packet does not fit in one page", body.len()),
        ));
    }

    let start = out.len();

    out.write_all(CAPTURE)?;
    out.write_u8(0)?;
    out.write_u8(header_type)?;
    out.write_u64::<LE>(granule)?;
    out.write_u32::<LE>(serial)?;
    out.write_u32::<LE>(sequence)?;
    out.write_u32::<LE>(0)?;

    out.write_u8(full_segments as u8 + 1)?;
    out.extend(std::iter::repeat(255u8).take(full_segments));
    out.write_u8((body.len() % 255) as u8)?;
    out.write_all(body)?;

    let checksum = page_checksum(&out[start..]);
    (&mut out[start + CRC_FIELD..start + CRC_FIELD + 4]).write_u32::<LE>(checksum)?;

    Ok(())
}

/// Builds the Vorbis identification header packet for a stream.
pub fn identification_packet(channels: u8, sample_rate: u32) -> Vec<u8> {
    let mut packet = vec![1u8];
    packet.extend_from_slice(b"vorbis");
    packet.extend_from_slice(&0u32.to_le_bytes());
    packet.push(channels);
    packet.extend_from_slice(&sample_rate.to_le_bytes());

    // Maximum, nominal and minimum bitrates, then the two block size exponents and the framing bit.
    packet.extend_from_slice(&[0u8; 12]);
    packet.push(0xb8);
    packet.push(1);

    packet
}

/// CRC-32 of a page, computed with the checksum field treated as zero.
fn page_checksum(page: &[u8]) -> u32 {
    let mut crc = 0u32;

    for (index, &byte) in page.iter().enumerate() {
        let byte = if (CRC_FIELD..CRC_FIELD + 4).contains(&index) {
            0
        } else {
            byte
        };

        crc ^= (byte as u32) << 24;

        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04c1_1db7
            } else {
                crc << 1
            };
        }
    }

    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(granules: &[u64]) -> Vec<u8> {
        let mut out = vec![];
        write_page(&mut out, BEGIN_OF_STREAM, 0, 7, 0, &identification_packet(2, 44100)).unwrap();

        for (index, &granule) in granules.iter().enumerate() {
            let flags = if index + 1 == granules.len() { END_OF_STREAM } else { 0 };
            let body = vec![index as u8; 300 + index * 10];
            write_page(&mut out, flags, granule, 7, index as u32 + 1, &body).unwrap();
        }

        out
    }

    #[test]
    fn pages_cover_the_stream() {
        let bytes = stream(&[1024, NO_GRANULE, 44100]);
        let pages = read_pages(&bytes).unwrap();

        assert_eq!(pages.len(), 4);
        assert_eq!(pages[0].offset, 0);
        assert_eq!(pages.last().unwrap().end(), bytes.len());

        for pair in pages.windows(2) {
            assert_eq!(pair[0].end(), pair[1].offset);
        }
    }

    #[test]
    fn import_reads_duration_and_parameters() {
        let bytes = stream(&[1024, NO_GRANULE, 88200]);
        let payload = VorbisCodec.import(&bytes).unwrap();

        assert_eq!(payload.channels, 2);
        assert_eq!(payload.sample_rate, 44100);
        assert_eq!(payload.duration(), 2.0);
        assert_eq!(payload.time_to_bytes(payload.duration()), bytes.len() as u32);

        // Pages without a granule are never loop targets.
        let pages = read_pages(&bytes).unwrap();
        assert_eq!(payload.time_to_bytes(0.5), pages[3].end() as u32);
    }

    #[test]
    fn corrupted_page_is_rejected() {
        let mut bytes = stream(&[1024]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let err = format!("{:#}", VorbisCodec.import(&bytes).unwrap_err());
        assert!(err.contains("checksum"), "{}", err);
        assert!(err.contains("page 1"), "{}", err);
    }

    #[test]
    fn non_vorbis_first_packet_is_rejected() {
        let mut bytes = vec![];
        write_page(&mut bytes, BEGIN_OF_STREAM, 0, 1, 0, b"OpusHead and friends").unwrap();

        let err = format!("{:#}", VorbisCodec.import(&bytes).unwrap_err());
        assert!(err.contains("identification header"), "{}", err);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(VorbisCodec.import(b"RIFF....WAVE").is_err());
        assert!(VorbisCodec.import(&[]).is_err());
    }

    #[test]
    fn packets_that_fill_whole_segments_are_terminated() {
        let mut bytes = vec![];
        write_page(&mut bytes, 0, 5, 1, 0, &[9u8; 510]).unwrap();

        let pages = read_pages(&bytes).unwrap();
        assert_eq!(pages[0].body_len, 510);
        assert_eq!(bytes[26], 3);
    }
}
