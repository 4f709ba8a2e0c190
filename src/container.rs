//! Replacing the audio of a container through its parsed model.
//!
//! [`patch_audio`] is the entry point callers should use. It edits the parsed container when a
//! codec can read the template's first entry, so the loop points come from the payload's real
//! duration. When none can, the payload is swapped in undecoded and the loop end follows the
//! splicer's margin rule ([`SpliceLayout::loop_end`]).

use std::path::Path;

use eyre::eyre;
use log::{info, warn};

use crate::{
    codec::{payload::CodecRegistry, scd::Container},
    error::{PatchError, Result},
    files,
    locks::AssetLocks,
    settings::Settings,
    splice::SpliceLayout,
};

const TEMPLATE: &str = "container template";

fn no_audio() -> PatchError {
    PatchError::schema(TEMPLATE, "audio", "container has no audio entries")
}

/// How [`patch_audio`] produced its output.
#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display)]
pub enum PatchStrategy {
    /// The container was parsed, edited and re-serialized.
    Structured,

    /// The payload bytes were swapped in without decoding them.
    Spliced,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PatchOutcome {
    pub bytes: Vec<u8>,
    pub strategy: PatchStrategy,
}

/// Returns a copy of `template` with its first audio entry replaced by the payload in
/// `payload_bytes`.
///
/// `location` names the payload in errors. The loop covers the whole payload if `loop_enabled`, and
/// is empty otherwise.
pub fn replace_audio(
    template: &Container,
    payload_bytes: &[u8],
    location: &str,
    loop_enabled: bool,
    registry: &CodecRegistry,
) -> Result<Container> {
    let existing = template.audio.first().ok_or_else(no_audio)?;

    let codec = registry.for_format(existing.format).ok_or_else(|| {
        PatchError::decode(
            location,
            eyre!("no codec for audio entries of format {:?}", existing.format),
        )
    })?;

    let payload = codec
        .import(payload_bytes)
        .map_err(|err| PatchError::decode(location, err))?;

    if payload.channels != existing.channels {
        return Err(PatchError::decode(
            location,
            eyre!(
                "channels: payload has {} but the container expects {}",
                payload.channels,
                existing.channels
            ),
        ));
    }

    if payload.sample_rate != existing.sample_rate {
        return Err(PatchError::decode(
            location,
            eyre!(
                "sample rate: payload is {} Hz but the container expects {} Hz",
                payload.sample_rate,
                existing.sample_rate
            ),
        ));
    }

    let duration = payload.duration();

    let loop_start = payload.time_to_bytes(0.0);
    let loop_end = payload.time_to_bytes(if loop_enabled { duration } else { 0.0 });

    info!(
        "Replacing {:?} entry with {:.3}s payload, loop {}..{}",
        existing.format, duration, loop_start, loop_end
    );

    let mut container = template.clone();
    container.replace(0, payload.into_entry(loop_start, loop_end));

    Ok(container)
}

fn parse_template(bytes: &[u8]) -> Result<Container> {
    Container::parse(bytes).map_err(|err| PatchError::decode(TEMPLATE, err))
}

fn serialize(container: &Container, destination: &Path) -> Result<Vec<u8>> {
    container
        .to_bytes()
        .map_err(|err| PatchError::serialize(destination, err))
}

/// Replaces the audio of the container at `template_path` with the payload file at
/// `payload_path`, writing the result to `destination`.
pub fn replace_audio_file(
    template_path: impl AsRef<Path>,
    payload_path: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    loop_enabled: bool,
    registry: &CodecRegistry,
) -> Result<()> {
    let destination = destination.as_ref();
    let payload_path = payload_path.as_ref();

    AssetLocks::shared().with_lock(destination, || {
        let template = parse_template(&files::read(template_path)?)?;
        let payload = files::read(payload_path)?;

        let location = payload_path.display().to_string();
        let container = replace_audio(&template, &payload, &location, loop_enabled, registry)?;

        let bytes = serialize(&container, destination)?;

        files::write_atomic(destination, &bytes)
    })
}

/// Replaces the first audio entry of `template_bytes` with `payload_bytes`.
///
/// If `registry` has no codec for the entry's format, the payload replaces the entry's current
/// payload undecoded. The loop then ends at the splicer's margin before the end of the payload
/// instead of at its duration, and is empty if `loop_enabled` is false.
pub fn patch_audio(
    template_bytes: &[u8],
    payload_bytes: &[u8],
    loop_enabled: bool,
    registry: &CodecRegistry,
    settings: &Settings,
) -> Result<PatchOutcome> {
    let mut template = parse_template(template_bytes)?;
    let format = template.audio.first().ok_or_else(no_audio)?.format;

    let (container, strategy) = if registry.for_format(format).is_some() {
        let container = replace_audio(&template, payload_bytes, "payload", loop_enabled, registry)?;
        (container, PatchStrategy::Structured)
    } else {
        warn!(
            "No codec for {:?} entries; swapping the payload in without decoding it",
            format
        );

        let payload_len = u32::try_from(payload_bytes.len()).map_err(|_| {
            PatchError::decode(
                "payload",
                eyre!("{} bytes does not fit in an audio entry", payload_bytes.len()),
            )
        })?;

        let loop_end = if loop_enabled {
            SpliceLayout::from_settings(settings).loop_end(payload_len)
        } else {
            0
        };

        let entry = template.audio.first_mut().ok_or_else(no_audio)?;
        entry.data = payload_bytes.to_vec();
        entry.loop_start = 0;
        entry.loop_end = loop_end;

        info!("Swapped in {} payload bytes, loop 0..{}", payload_len, loop_end);

        (template, PatchStrategy::Spliced)
    };

    let bytes = serialize(&container, Path::new("patched container"))?;

    Ok(PatchOutcome { bytes, strategy })
}

/// File-level [`patch_audio`]. Returns the strategy that was used.
pub fn patch_audio_file(
    template_path: impl AsRef<Path>,
    payload_path: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    loop_enabled: bool,
    registry: &CodecRegistry,
    settings: &Settings,
) -> Result<PatchStrategy> {
    let destination = destination.as_ref();

    AssetLocks::shared().with_lock(destination, || {
        let template = files::read(template_path)?;
        let payload = files::read(payload_path)?;

        let outcome = patch_audio(&template, &payload, loop_enabled, registry, settings)?;
        files::write_atomic(destination, &outcome.bytes)?;

        info!("Patched {:?} ({})", destination, outcome.strategy);

        Ok(outcome.strategy)
    })
}
