//! Uncompressed PCM payloads, imported from WAV files.

use std::io::Cursor;

use byteorder::{WriteBytesExt, LE};
use eyre::{ensure, Context, Result};

use super::{
    payload::{AudioPayload, PayloadCodec, Timing},
    scd::AudioFormat,
};

/// Imports 16-bit integer WAV files as interleaved little-endian PCM payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct Pcm16Codec;

impl PayloadCodec for Pcm16Codec {
    fn format(&self) -> AudioFormat {
        AudioFormat::Pcm16
    }

    fn import(&self, bytes: &[u8]) -> Result<AudioPayload> {
        let reader = hound::WavReader::new(Cursor::new(bytes)).wrap_err("WAV header")?;
        let spec = reader.spec();

        ensure!(
            spec.sample_format == hound::SampleFormat::Int && spec.bits_per_sample == 16,
            "only 16-bit integer PCM is supported, found {}-bit {:?}",
            spec.bits_per_sample,
            spec.sample_format
        );

        ensure!(spec.channels > 0, "file has no channels");

        let mut data = Vec::with_capacity(reader.len() as usize * 2);

        for (index, sample) in reader.into_samples::<i16>().enumerate() {
            let sample = sample.wrap_err_with(|| format!("sample {}", index))?;
            data.write_i16::<LE>(sample)?;
        }

        Ok(AudioPayload {
            format: AudioFormat::Pcm16,
            channels: spec.channels as u32,
            sample_rate: spec.sample_rate,
            aux: vec![],
            data,
            timing: Timing::Linear {
                bytes_per_frame: spec.channels as usize * 2,
            },
        })
    }
}
