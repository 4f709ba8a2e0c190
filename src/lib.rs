//! Patches the audio containers and animation timelines of a game so that mods can swap in their
//! own sound.
//!
//! * [`splice`] swaps a payload inside a container by byte search, without parsing it.
//! * [`container`] replaces audio through the parsed container, with exact loop points.
//! * [`inject`] adds sound triggers to the timelines of an animation document.
//! * [`scan`] reads a mod directory's manifests and finds the triggers already in its animations.
//!
//! The binary formats themselves live in [`codec`].

pub mod codec;
pub mod container;
pub mod error;
pub mod files;
pub mod inject;
pub mod locks;
pub mod logging;
pub mod scan;
pub mod settings;
pub mod splice;

pub use container::{patch_audio, patch_audio_file, PatchOutcome, PatchStrategy};
pub use error::{ErrorKind, PatchError, Result};
pub use inject::{inject_into, inject_sound, InjectReport, SkipReason};
pub use scan::{plan_patches, scan_animation_sound_entries, scan_manifests, ManifestIndex, ResourceKind};
pub use settings::Settings;
pub use splice::{splice, splice_file, SpliceLayout, SpliceReport};
