//! Imported audio payloads and the mapping from playback time to payload byte offsets.

use super::{
    ogg::VorbisCodec,
    scd::{AudioEntry, AudioFormat},
    wav::Pcm16Codec,
};

/// A point in a paged stream: the byte offset at which a page ends and the number of samples
/// decoded by then.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PageMark {
    pub end: usize,
    pub granule: u64,
}

/// How sample positions map onto payload bytes.
#[derive(Clone, PartialEq, Debug)]
pub enum Timing {
    /// Variable-rate stream, indexed by page.
    Paged(Vec<PageMark>),

    /// Fixed-size frames.
    Linear { bytes_per_frame: usize },
}

/// A payload that a codec has understood well enough to know its true duration.
#[derive(Clone, PartialEq, Debug)]
pub struct AudioPayload {
    pub format: AudioFormat,
    pub channels: u32,
    pub sample_rate: u32,
    pub aux: Vec<u8>,
    pub data: Vec<u8>,
    pub timing: Timing,
}

impl AudioPayload {
    /// Number of samples per channel in the payload.
    pub fn total_samples(&self) -> u64 {
        match &self.timing {
            Timing::Paged(marks) => marks.last().map_or(0, |mark| mark.granule),
            Timing::Linear { bytes_per_frame } if *bytes_per_frame > 0 => {
                (self.data.len() / bytes_per_frame) as u64
            }
            Timing::Linear { .. } => 0,
        }
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }

        self.total_samples() as f64 / self.sample_rate as f64
    }

    /// Maps a playback time to a byte offset within the payload.
    ///
    /// Zero (or any non-positive time) maps to offset zero; the full duration maps to the payload
    /// length.
    pub fn time_to_bytes(&self, seconds: f64) -> u32 {
        if !(seconds > 0.0) {
            return 0;
        }

        let target = (seconds * self.sample_rate as f64).round() as u64;
        let len = self.data.len();

        let offset = match &self.timing {
            Timing::Paged(marks) => marks
                .iter()
                .find(|mark| mark.granule >= target)
                .map_or(len, |mark| mark.end),

            Timing::Linear { bytes_per_frame } => {
                usize::try_from(target).map_or(len, |frames| frames.saturating_mul(*bytes_per_frame))
            }
        };

        u32::try_from(offset.min(len)).unwrap_or(u32::MAX)
    }

    /// Builds a container entry holding this payload.
    pub fn into_entry(self, loop_start: u32, loop_end: u32) -> AudioEntry {
        let mut entry = AudioEntry::new(self.channels, self.sample_rate, self.format, self.data);
        entry.aux = self.aux;
        entry.loop_start = loop_start;
        entry.loop_end = loop_end;
        entry
    }
}

/// Something that can import payload bytes for one container entry format.
pub trait PayloadCodec: Send + Sync {
    /// The entry format this codec produces.
    fn format(&self) -> AudioFormat;

    /// Reads `bytes` (a complete file produced by the transcoder) into a payload.
    fn import(&self, bytes: &[u8]) -> eyre::Result<AudioPayload>;
}

/// The set of codecs available for structured container edits.
pub struct CodecRegistry {
    codecs: Vec<Box<dyn PayloadCodec>>,
}

impl CodecRegistry {
    /// A registry with no codecs, which forces every edit down the byte-splice path.
    pub fn empty() -> CodecRegistry {
        CodecRegistry { codecs: vec![] }
    }

    pub fn with(mut self, codec: impl PayloadCodec + 'static) -> CodecRegistry {
        self.codecs.push(Box::new(codec));
        self
    }

    /// Returns the codec for entries of `format`, if there is one.
    pub fn for_format(&self, format: AudioFormat) -> Option<&dyn PayloadCodec> {
        self.codecs
            .iter()
            .find(|codec| codec.format() == format)
            .map(|codec| &**codec)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        CodecRegistry::empty().with(VorbisCodec).with(Pcm16Codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paged() -> AudioPayload {
        AudioPayload {
            format: AudioFormat::Vorbis,
            channels: 2,
            sample_rate: 1000,
            aux: vec![],
            data: vec![0; 500],
            timing: Timing::Paged(vec![
                PageMark { end: 60, granule: 0 },
                PageMark { end: 200, granule: 400 },
                PageMark { end: 380, granule: 900 },
                PageMark { end: 500, granule: 1500 },
            ]),
        }
    }

    #[test]
    fn paged_time_mapping() {
        let payload = paged();

        assert_eq!(payload.duration(), 1.5);
        assert_eq!(payload.time_to_bytes(0.0), 0);
        assert_eq!(payload.time_to_bytes(-1.0), 0);
        assert_eq!(payload.time_to_bytes(0.4), 200);
        assert_eq!(payload.time_to_bytes(0.5), 380);
        assert_eq!(payload.time_to_bytes(payload.duration()), 500);
        assert_eq!(payload.time_to_bytes(10.0), 500);
    }

    #[test]
    fn linear_time_mapping() {
        let payload = AudioPayload {
            format: AudioFormat::Pcm16,
            channels: 2,
            sample_rate: 100,
            aux: vec![],
            data: vec![0; 4 * 250],
            timing: Timing::Linear { bytes_per_frame: 4 },
        };

        assert_eq!(payload.total_samples(), 250);
        assert_eq!(payload.time_to_bytes(1.0), 400);
        assert_eq!(payload.time_to_bytes(payload.duration()), 1000);
        assert_eq!(payload.time_to_bytes(f64::NAN), 0);
    }

    #[test]
    fn registry_lookup() {
        let registry = CodecRegistry::default();

        assert!(registry.for_format(AudioFormat::Vorbis).is_some());
        assert!(registry.for_format(AudioFormat::Pcm16).is_some());
        assert!(registry.for_format(AudioFormat::MsAdpcm).is_none());
        assert!(CodecRegistry::empty().for_format(AudioFormat::Vorbis).is_none());
    }

    #[test]
    fn entry_carries_loop_points() {
        let entry = paged().into_entry(0, 380);

        assert_eq!(entry.format, AudioFormat::Vorbis);
        assert_eq!(entry.data.len(), 500);
        assert_eq!((entry.loop_start, entry.loop_end), (0, 380));
    }
}
