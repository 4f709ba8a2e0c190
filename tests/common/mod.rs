//! Builders for the in-memory fixtures the integration tests share.

#![allow(dead_code)]

use soundpatch::codec::{
    ogg::{identification_packet, write_page, BEGIN_OF_STREAM, END_OF_STREAM},
    pap::{Animation, AnimationDocument},
    scd::{self, AudioEntry, AudioFormat, Container},
    tmb::{EntryBody, Timeline},
};

/// An Ogg Vorbis stream with one page per granule, each carrying `page_len` bytes of filler.
pub fn vorbis_stream(channels: u8, rate: u32, granules: &[u64], page_len: usize) -> Vec<u8> {
    let mut out = vec![];
    write_page(&mut out, BEGIN_OF_STREAM, 0, 0x5eed, 0, &identification_packet(channels, rate)).unwrap();

    for (index, granule) in granules.iter().enumerate() {
        let flags = if index + 1 == granules.len() { END_OF_STREAM } else { 0 };
        let body = vec![(index % 251) as u8; page_len];
        write_page(&mut out, flags, *granule, 0x5eed, index as u32 + 1, &body).unwrap();
    }

    out
}

/// A container holding one stereo 44.1 kHz entry of `format`.
pub fn container(format: AudioFormat, data: Vec<u8>) -> Container {
    Container::new(vec![AudioEntry::new(2, 44100, format, data)])
}

pub const LAYOUT_TABLE: [u8; 32] = [0xee; 32];
pub const ATTRIBUTE_TABLE: [u8; 16] = [0xdd; 16];

/// A container holding a stereo 44.1 kHz entry of `format` and then a mono MS-ADPCM entry, with
/// [`LAYOUT_TABLE`] between the audio table and the first entry and [`ATTRIBUTE_TABLE`] between
/// the entries. The offsets header points at both.
pub fn container_with_tables(format: AudioFormat, first: Vec<u8>, second: Vec<u8>) -> Vec<u8> {
    let plain = Container::new(vec![
        AudioEntry::new(2, 44100, format, first),
        AudioEntry::new(1, 22050, AudioFormat::MsAdpcm, second),
    ])
    .to_bytes()
    .unwrap();

    let offsets = scd::probe_entry_offsets(&plain).unwrap();
    let (first_at, second_at) = (offsets[0] as usize, offsets[1] as usize);

    let mut bytes = plain[..first_at].to_vec();
    bytes.extend_from_slice(&LAYOUT_TABLE);
    bytes.extend_from_slice(&plain[first_at..second_at]);
    bytes.extend_from_slice(&ATTRIBUTE_TABLE);
    bytes.extend_from_slice(&plain[second_at..]);

    let shift = LAYOUT_TABLE.len();
    let table = scd::read_field(&plain, scd::AUDIO_TABLE_FIELD_OFFSET).unwrap() as usize;

    scd::write_field(&mut bytes, table, (first_at + shift) as u32);
    scd::write_field(&mut bytes, table + 4, (second_at + shift + ATTRIBUTE_TABLE.len()) as u32);
    scd::write_field(&mut bytes, scd::LAYOUT_TABLE_FIELD_OFFSET, first_at as u32);
    scd::write_field(&mut bytes, scd::ATTRIBUTE_TABLE_FIELD_OFFSET, (second_at + shift) as u32);

    let len = bytes.len() as u32;
    scd::write_field(&mut bytes, scd::TOTAL_SIZE_OFFSET, len);

    bytes
}

/// Asserts that both tables written by [`container_with_tables`] are where the offsets header
/// says, and that the second entry kept `second`.
pub fn assert_tables_intact(bytes: &[u8], second: &[u8]) {
    let layout = scd::read_field(bytes, scd::LAYOUT_TABLE_FIELD_OFFSET).unwrap() as usize;
    assert_eq!(&bytes[layout..layout + LAYOUT_TABLE.len()], &LAYOUT_TABLE);

    let attributes = scd::read_field(bytes, scd::ATTRIBUTE_TABLE_FIELD_OFFSET).unwrap() as usize;
    assert_eq!(&bytes[attributes..attributes + ATTRIBUTE_TABLE.len()], &ATTRIBUTE_TABLE);

    assert_eq!(scd::read_field(bytes, scd::TOTAL_SIZE_OFFSET), Some(bytes.len() as u32));

    let container = Container::parse(bytes).unwrap();
    assert_eq!(container.audio.len(), 2);
    assert_eq!(container.audio[1].data, second);
}

/// A timeline whose single actor has one track with one unrelated entry.
pub fn timeline_with_actor() -> Timeline {
    let mut timeline = Timeline::new(120);
    let actor = timeline.add_actor(0, 0).unwrap();
    let track = timeline.add_track(actor, 0).unwrap();

    timeline
        .add_entry(
            track,
            2,
            EntryBody::Opaque {
                magic: *b"C010",
                body: vec![0, 1, 2, 3, 4, 5, 6, 7],
            },
        )
        .unwrap();

    timeline
}

pub fn animation_document(animations: Vec<(&str, Option<Timeline>)>) -> AnimationDocument {
    AnimationDocument::new(
        vec![0xa5; 0x40],
        animations
            .into_iter()
            .map(|(name, timeline)| Animation::new(name, timeline))
            .collect(),
    )
}
