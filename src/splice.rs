//! Raw payload replacement in a container, without parsing it.
//!
//! The old payload is located by byte search and swapped for the new one, and then three header
//! fields are patched in place: the container's total size, and the payload length and loop end
//! of the entry sub-header. Nothing else in the container is touched, so the offsets of any later
//! audio entries are not updated. Use [`crate::container::patch_audio`] when the template parses.

use std::path::Path;

use log::{debug, warn};

use crate::{
    codec::scd::{self, LOOP_END_FIELD, PAYLOAD_LENGTH_FIELD, TOTAL_SIZE_OFFSET},
    error::{PatchError, Result},
    files,
    locks::AssetLocks,
    settings::Settings,
};

/// Bytes kept between the loop end and the end of a spliced payload.
pub const LOOP_END_MARGIN: u32 = 4000;

/// Where the header fields the splicer patches live in the template.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SpliceLayout {
    /// Offset of the container's total-size field.
    pub size_offset: usize,

    /// Offset of the sub-header of the entry whose payload is replaced.
    pub entry_header_offset: usize,

    /// Trailing margin for the loop end; see [`SpliceLayout::loop_end`].
    pub loop_end_margin: u32,

    /// Whether the offsets were read from the template, and so move with the bytes after the
    /// replaced payload. Fixed offsets are applied to the output as they are.
    pub probed: bool,
}

impl Default for SpliceLayout {
    fn default() -> Self {
        SpliceLayout {
            size_offset: TOTAL_SIZE_OFFSET,
            entry_header_offset: 0x1e0,
            loop_end_margin: LOOP_END_MARGIN,
            probed: false,
        }
    }
}

impl SpliceLayout {
    /// The fixed layout configured in `settings`.
    pub fn from_settings(settings: &Settings) -> SpliceLayout {
        SpliceLayout {
            size_offset: TOTAL_SIZE_OFFSET,
            entry_header_offset: settings.entry_header_offset as usize,
            loop_end_margin: settings.loop_end_margin,
            probed: false,
        }
    }

    /// Reads the first entry's header offset from the template's own headers, falling back to the
    /// fixed layout from `settings` if they can't be read.
    pub fn probe(template: &[u8], settings: &Settings) -> SpliceLayout {
        let fixed = SpliceLayout::from_settings(settings);

        match scd::probe_entry_offsets(template) {
            Ok(offsets) if !offsets.is_empty() => SpliceLayout {
                entry_header_offset: offsets[0] as usize,
                probed: true,
                ..fixed
            },

            Ok(_) => {
                warn!(
                    "Container lists no audio entries; assuming the header is at {:#x}",
                    fixed.entry_header_offset
                );

                fixed
            }

            Err(err) => {
                warn!(
                    "Unable to read container headers ({:#}); assuming the header is at {:#x}",
                    err, fixed.entry_header_offset
                );

                fixed
            }
        }
    }

    /// Loop end for a payload of `payload_len` bytes.
    pub fn loop_end(&self, payload_len: u32) -> u32 {
        if payload_len >= self.loop_end_margin {
            payload_len - self.loop_end_margin
        } else {
            payload_len
        }
    }
}

/// What a splice did.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SpliceReport {
    /// Where the old payload started in the template (and the new one starts in the output).
    pub marker_offset: usize,
    pub total_size: u32,
    pub payload_len: u32,
    pub loop_end: u32,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }

    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Replaces the first occurrence of `old` in `template` with `new` and patches the header fields
/// described by `layout`.
pub fn splice(
    template: &[u8],
    old: &[u8],
    new: &[u8],
    layout: &SpliceLayout,
) -> Result<(Vec<u8>, SpliceReport)> {
    let marker_offset = find(template, old)
        .ok_or_else(|| PatchError::not_found("old payload", "container template"))?;

    let marker_end = marker_offset + old.len();

    // Probed header fields are in template coordinates, and anything after the replaced region
    // moves with it.
    let relocate = |field: &str, offset: usize| -> Result<usize> {
        if !layout.probed || offset + 4 <= marker_offset {
            Ok(offset)
        } else if offset >= marker_end {
            Ok(offset - old.len() + new.len())
        } else {
            Err(PatchError::schema(
                "container template",
                field,
                format!(
                    "field at {:#x} overlaps the replaced payload at {:#x}..{:#x}",
                    offset, marker_offset, marker_end
                ),
            ))
        }
    };

    let size_offset = relocate("total size", layout.size_offset)?;
    let length_offset = relocate(
        "payload length",
        layout.entry_header_offset + PAYLOAD_LENGTH_FIELD,
    )?;
    let loop_end_offset = relocate("loop end", layout.entry_header_offset + LOOP_END_FIELD)?;

    let mut output = Vec::with_capacity(template.len() - old.len() + new.len());
    output.extend_from_slice(&template[..marker_offset]);
    output.extend_from_slice(new);
    output.extend_from_slice(&template[marker_end..]);

    let total_size = u32::try_from(output.len()).map_err(|_| {
        PatchError::schema(
            "spliced container",
            "total size",
            format!("{} bytes does not fit in 32 bits", output.len()),
        )
    })?;

    // `new` is shorter than the output, so this can't overflow if the total size didn't.
    let payload_len = new.len() as u32;
    let loop_end = layout.loop_end(payload_len);

    for (field, offset, value) in [
        ("total size", size_offset, total_size),
        ("payload length", length_offset, payload_len),
        ("loop end", loop_end_offset, loop_end),
    ] {
        if !scd::write_field(&mut output, offset, value) {
            return Err(PatchError::schema(
                "spliced container",
                field,
                format!(
                    "field at {:#x} is outside the {}-byte output",
                    offset,
                    output.len()
                ),
            ));
        }
    }

    let report = SpliceReport {
        marker_offset,
        total_size,
        payload_len,
        loop_end,
    };

    debug!("Spliced payload: {:?}", report);

    Ok((output, report))
}

/// Splices the payload file `new_path` into the container at `template_path` in place of the
/// payload file `old_path`, writing the result to `destination`.
pub fn splice_file(
    template_path: impl AsRef<Path>,
    old_path: impl AsRef<Path>,
    new_path: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    settings: &Settings,
) -> Result<SpliceReport> {
    let destination = destination.as_ref();

    AssetLocks::shared().with_lock(destination, || {
        let template = files::read(template_path)?;
        let old = files::read(old_path)?;
        let new = files::read(new_path)?;

        let layout = SpliceLayout::probe(&template, settings);
        let (output, report) = splice(&template, &old, &new, &layout)?;

        files::write_atomic(destination, &output)?;

        Ok(report)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    /// A blob with a header at 0x20 and `marker` at `marker_offset`.
    fn template(len: usize, marker: &[u8], marker_offset: usize) -> Vec<u8> {
        let mut bytes = (0..len).map(|i| (i % 7) as u8 + 0x80).collect::<Vec<_>>();
        bytes[marker_offset..marker_offset + marker.len()].copy_from_slice(marker);
        bytes
    }

    fn layout() -> SpliceLayout {
        SpliceLayout {
            entry_header_offset: 0x20,
            ..SpliceLayout::default()
        }
    }

    fn field(bytes: &[u8], offset: usize) -> u32 {
        scd::read_field(bytes, offset).unwrap()
    }

    #[test]
    fn header_fields_follow_payload_size() {
        let marker = [0x11u8; 16];

        for len in [0usize, 1, 4000, 4001, 1_000_000] {
            let new = vec![0x22u8; len];
            let (output, report) = splice(&template(256, &marker, 100), &marker, &new, &layout()).unwrap();

            assert_eq!(field(&output, TOTAL_SIZE_OFFSET) as usize, output.len());
            assert_eq!(field(&output, 0x20 + PAYLOAD_LENGTH_FIELD) as usize, len);

            let expected_loop_end = if len >= 4000 { len - 4000 } else { len };
            assert_eq!(field(&output, 0x20 + LOOP_END_FIELD) as usize, expected_loop_end);
            assert_eq!(report.loop_end as usize, expected_loop_end);
            assert_eq!(&output[100..100 + len], &new[..]);
        }
    }

    #[test]
    fn thousand_byte_scenario() {
        let marker = (0..200).map(|i| i as u8).collect::<Vec<_>>();
        let template = template(1000, &marker, 300);

        let (output, report) = splice(&template, &marker, &[0x33; 50], &layout()).unwrap();

        assert_eq!(output.len(), 850);
        assert_eq!(report.marker_offset, 300);
        assert_eq!(field(&output, TOTAL_SIZE_OFFSET), 850);
        assert_eq!(field(&output, 0x20 + LOOP_END_FIELD), 50);
        assert_eq!(&output[350..], &template[500..]);
    }

    #[test]
    fn splicing_back_restores_header_fields() {
        let a = vec![0x44u8; 6000];
        let b = vec![0x55u8; 300];

        let mut original = template(7000, &a, 200);
        let len = original.len() as u32;
        scd::write_field(&mut original, TOTAL_SIZE_OFFSET, len);
        scd::write_field(&mut original, 0x20 + LOOP_END_FIELD, 2000);

        let (there, _) = splice(&original, &a, &b, &layout()).unwrap();
        let (back, _) = splice(&there, &b, &a, &layout()).unwrap();

        assert_eq!(field(&back, TOTAL_SIZE_OFFSET), field(&original, TOTAL_SIZE_OFFSET));
        assert_eq!(field(&back, 0x20 + LOOP_END_FIELD), field(&original, 0x20 + LOOP_END_FIELD));
    }

    #[test]
    fn fields_after_the_payload_move_with_it() {
        let marker = [0x11u8; 16];
        let layout = SpliceLayout {
            entry_header_offset: 0x80,
            probed: true,
            ..SpliceLayout::default()
        };

        let (output, _) = splice(&template(256, &marker, 0x40), &marker, &[0x22; 4], &layout).unwrap();

        assert_eq!(field(&output, 0x80 - 12 + LOOP_END_FIELD), 4);
    }

    #[test]
    fn missing_marker() {
        let err = splice(&template(64, &[1, 2], 40), &[9, 9, 9], &[1], &layout()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = splice(&template(64, &[1, 2], 40), &[], &[1], &layout()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn probed_header_inside_the_marker_is_a_schema_error() {
        let marker = [0x11u8; 64];
        let probed = SpliceLayout {
            probed: true,
            ..layout()
        };
        let err = splice(&template(256, &marker, 0x10), &marker, &[0; 8], &probed).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn fixed_header_is_written_in_output_coordinates() {
        let marker = [0x11u8; 16];
        let layout = SpliceLayout {
            entry_header_offset: 0x80,
            ..SpliceLayout::default()
        };

        let (output, _) = splice(&template(256, &marker, 0x40), &marker, &[0x22; 4], &layout).unwrap();

        assert_eq!(field(&output, 0x80 + LOOP_END_FIELD), 4);
        assert_eq!(field(&output, 0x80 + PAYLOAD_LENGTH_FIELD), 4);
    }

    #[test]
    fn margin_rule() {
        let layout = SpliceLayout::default();

        assert_eq!(layout.loop_end(0), 0);
        assert_eq!(layout.loop_end(3999), 3999);
        assert_eq!(layout.loop_end(4000), 0);
        assert_eq!(layout.loop_end(4001), 1);

        let no_margin = SpliceLayout {
            loop_end_margin: 0,
            ..layout
        };
        assert_eq!(no_margin.loop_end(4001), 4001);
    }

    #[test]
    fn probe_falls_back_to_settings() {
        let settings = Settings::default();
        let layout = SpliceLayout::probe(b"definitely not a container", &settings);

        assert_eq!(layout.entry_header_offset, 0x1e0);
        assert!(!layout.probed);
    }

    #[test]
    fn thousand_byte_file_with_default_settings() {
        let dir = tempfile::tempdir().unwrap();
        let template_path = dir.path().join("template.scd");
        let old_path = dir.path().join("old.ogg");
        let new_path = dir.path().join("new.ogg");
        let destination = dir.path().join("out.scd");

        let marker = (0..200).map(|i| i as u8).collect::<Vec<_>>();
        std::fs::write(&template_path, template(1000, &marker, 300)).unwrap();
        std::fs::write(&old_path, &marker).unwrap();
        std::fs::write(&new_path, [0x33u8; 50]).unwrap();

        let report = splice_file(&template_path, &old_path, &new_path, &destination, &Settings::default())
            .unwrap();

        let output = std::fs::read(&destination).unwrap();

        assert_eq!(output.len(), 850);
        assert_eq!(report.marker_offset, 300);
        assert_eq!(field(&output, TOTAL_SIZE_OFFSET), 850);
        assert_eq!(field(&output, 0x1e0 + PAYLOAD_LENGTH_FIELD), 50);
        assert_eq!(field(&output, 0x1e0 + LOOP_END_FIELD), 50);
    }

    #[test]
    fn failed_splice_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let template_path = dir.path().join("template.scd");
        let old_path = dir.path().join("old.ogg");
        let new_path = dir.path().join("new.ogg");
        let destination = dir.path().join("out.scd");

        std::fs::write(&template_path, template(64, &[1, 2], 40)).unwrap();
        std::fs::write(&old_path, [7u8, 7, 7]).unwrap();
        std::fs::write(&new_path, [1u8]).unwrap();

        let err = splice_file(&template_path, &old_path, &new_path, &destination, &Settings::default())
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!destination.exists());
    }
}
