//! Adding a sound trigger to every animation in an animation document.
//!
//! Each animation with a timeline and at least one actor gets a sound trigger on its first actor.
//! The trigger goes on a track that already holds one, or on a new track when no such track
//! exists, so injecting the same document twice updates the trigger instead of adding another.

use std::path::Path;

use log::{info, warn};

use crate::{
    codec::{
        pap::AnimationDocument,
        tmb::{EntryBody, SoundTrigger, SoundTriggerFields, Timeline},
    },
    error::{PatchError, Result},
    files,
    locks::AssetLocks,
};

/// Values written to injected sound triggers.
const LOOP_FOREVER: i32 = -1;
const SOUND_INDEX: i32 = 0;
const MIX_POSITION: i32 = 99;

/// Time of a created track, relative to its actor.
const TRACK_TIME: u16 = 0;

/// Time of a created trigger, relative to its track.
const TRIGGER_TIME: u16 = 1;

#[derive(Clone, Copy, PartialEq, Eq, Debug, strum::Display)]
pub enum SkipReason {
    #[strum(serialize = "no timeline")]
    NoTimeline,

    #[strum(serialize = "timeline has no actors")]
    NoActors,

    #[strum(serialize = "timeline has no free node ids")]
    IdsExhausted,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProcessedAnimation {
    pub index: usize,
    pub name: String,
    pub created_track: bool,
    pub created_entry: bool,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SkippedAnimation {
    pub index: usize,
    pub name: String,
    pub reason: SkipReason,
}

/// What an injection did to each animation.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct InjectReport {
    pub processed: Vec<ProcessedAnimation>,
    pub skipped: Vec<SkippedAnimation>,
}

impl InjectReport {
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Sets the fields of `trigger` to play `target` forever.
fn upsert(trigger: &mut SoundTrigger, target: &str) {
    trigger.set_loop_count(LOOP_FOREVER);
    trigger.set_interrupt(false);
    trigger.set_resource_path(target);
    trigger.set_sound_index(SOUND_INDEX);
    trigger.set_mix_position(MIX_POSITION);
}

/// Finds or creates the sound trigger of the first actor in `timeline`. Returns whether a track
/// and whether an entry had to be created.
fn inject_timeline(timeline: &mut Timeline, target: &str) -> Result<(bool, bool), SkipReason> {
    if timeline.actors().is_empty() {
        return Err(SkipReason::NoActors);
    }

    let usable = timeline
        .tracks_of(0)
        .find(|track| {
            track
                .entry_ids
                .iter()
                .any(|id| timeline.entry(*id).map_or(false, |entry| entry.is_sound_trigger()))
        })
        .map(|track| track.id);

    // A new track needs a new trigger too. Check both ids up front so that a failure leaves the
    // timeline untouched.
    if usable.is_none() && timeline.ids_left() < 2 {
        return Err(SkipReason::IdsExhausted);
    }

    let (track_id, created_track) = match usable {
        Some(id) => (id, false),
        None => (
            timeline
                .add_track(0, TRACK_TIME)
                .ok_or(SkipReason::IdsExhausted)?,
            true,
        ),
    };

    let existing = timeline
        .entries_of(track_id)
        .find(|entry| entry.is_sound_trigger())
        .map(|entry| entry.id);

    let (entry_id, created_entry) = match existing {
        Some(id) => (id, false),
        None => {
            let body = EntryBody::SoundTrigger(SoundTrigger::default());
            let id = timeline
                .add_entry(track_id, TRIGGER_TIME, body)
                .ok_or(SkipReason::IdsExhausted)?;

            (id, true)
        }
    };

    if let Some(trigger) = timeline
        .entry_mut(entry_id)
        .and_then(|entry| entry.as_sound_trigger_mut())
    {
        upsert(trigger, target);
    }

    Ok((created_track, created_entry))
}

/// Points every animation in `document` at the container `target`.
///
/// Animations that can't hold a trigger are skipped and listed in the report; they never fail the
/// whole document.
pub fn inject_into(document: &mut AnimationDocument, target: &str) -> InjectReport {
    let mut report = InjectReport::default();

    for (index, animation) in document.animations.iter_mut().enumerate() {
        let reason = match animation.timeline.as_mut() {
            None => SkipReason::NoTimeline,

            Some(timeline) => match inject_timeline(timeline, target) {
                Ok((created_track, created_entry)) => {
                    report.processed.push(ProcessedAnimation {
                        index,
                        name: animation.name.clone(),
                        created_track,
                        created_entry,
                    });

                    continue;
                }

                Err(reason) => reason,
            },
        };

        warn!("Skipping animation {} ({}): {}", index, animation.name, reason);

        report.skipped.push(SkippedAnimation {
            index,
            name: animation.name.clone(),
            reason,
        });
    }

    report
}

/// Reads the animation document at `source`, injects a trigger for `target` into it and writes it
/// to `destination`.
pub fn inject_sound(
    target: &str,
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
) -> Result<InjectReport> {
    let source = source.as_ref();
    let destination = destination.as_ref();

    AssetLocks::shared().with_lock(destination, || {
        let bytes = files::read(source)?;

        let mut document = AnimationDocument::parse(&bytes)
            .map_err(|err| PatchError::decode(source.display().to_string(), err))?;

        let report = inject_into(&mut document, target);

        let output = document
            .to_bytes()
            .map_err(|err| PatchError::serialize(destination, err))?;

        files::write_atomic(destination, &output)?;

        info!(
            "Injected {:?} into {} animations of {:?} ({} skipped)",
            target,
            report.processed_count(),
            source,
            report.skipped_count()
        );

        Ok(report)
    })
}
