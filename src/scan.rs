//! Read-only scans of a mod directory.
//!
//! [`scan_manifests`] finds which manifests and options point at animation documents or
//! containers, and [`scan_animation_sound_entries`] looks inside the referenced animation documents
//! for sound triggers that are already there. [`plan_patches`] combines the two into the decision
//! callers make for each animation: overwrite the containers it already plays, or inject a new
//! trigger.

pub mod manifest;

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use case_insensitive_hashmap::CaseInsensitiveHashMap;
use eyre::{Context, Result as EyreResult};
use itertools::Itertools;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::{
    codec::{pap::AnimationDocument, tmb::SoundTriggerFields},
    error::{PatchError, Result},
    settings::Settings,
};

use manifest::Manifest;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, strum::Display)]
pub enum ResourceKind {
    Animation,
    Container,
}

impl ResourceKind {
    fn extension<'s>(&self, settings: &'s Settings) -> &'s str {
        match self {
            ResourceKind::Animation => &settings.animation_extension,
            ResourceKind::Container => &settings.container_extension,
        }
    }
}

/// A manifest option that maps a game route to a file.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Reference {
    pub manifest_file: PathBuf,
    pub group_name: Option<String>,
    pub option_name: String,

    /// What the game requests.
    pub game_route: String,

    /// The file the manifest maps the route to, relative to the mod directory.
    pub resource_path: String,
}

/// Every reference to one path.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ReferenceGroup {
    pub path: String,
    pub references: Vec<Reference>,
}

/// References found by [`scan_manifests`], grouped by path without regard to case.
///
/// Animation references are grouped by the file they map to; container references by the game
/// route they replace.
pub struct ManifestIndex {
    kind: ResourceKind,
    groups: CaseInsensitiveHashMap<ReferenceGroup>,
}

impl ManifestIndex {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn get(&self, path: &str) -> Option<&ReferenceGroup> {
        self.groups.get(path)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// All groups, ordered by path.
    pub fn groups(&self) -> Vec<&ReferenceGroup> {
        self.groups
            .values()
            .sorted_by_key(|group| group.path.to_lowercase())
            .collect()
    }
}

/// Manifest files sit at the top level of the mod directory.
fn manifest_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|err| PatchError::read(dir, err))?;

    let mut paths = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file() && has_extension(path, "json"))
        .collect::<Vec<_>>();

    paths.sort();

    Ok(paths)
}

fn has_extension(path: impl AsRef<Path>, extension: &str) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case(extension))
}

/// Mods written on Windows use backslashes.
fn normalise(path: &str) -> String {
    path.replace('\\', "/")
}

/// Runs `load` for every path, on the rayon pool if `parallel`. Failures are logged and dropped.
fn load_all<T: Send>(
    paths: &[PathBuf],
    parallel: bool,
    load: impl Fn(&Path) -> EyreResult<T> + Sync + Send,
) -> Vec<T> {
    let load_one = |path: &PathBuf| load(path.as_path()).wrap_err_with(|| format!("{:?}", path));

    let results: Vec<EyreResult<T>> = if parallel {
        paths.par_iter().map(load_one).collect()
    } else {
        paths.iter().map(load_one).collect()
    };

    let (loaded, errors): (Vec<_>, Vec<_>) = results.into_iter().partition_result();

    for err in errors {
        warn!("Skipping unreadable file: {:#}", err);
    }

    loaded
}

/// Collects every reference to a resource of `kind` from the manifests in `dir`.
///
/// Manifests that can't be read or parsed are logged and skipped.
pub fn scan_manifests(dir: impl AsRef<Path>, kind: ResourceKind, settings: &Settings) -> Result<ManifestIndex> {
    let dir = dir.as_ref();
    let extension = kind.extension(settings);

    let paths = manifest_paths(dir)?;
    let manifests = load_all(&paths, settings.parallel_scan, |path| {
        Ok((path.to_path_buf(), Manifest::load(path)?))
    });

    let references = manifests
        .iter()
        .flat_map(|(manifest_file, manifest)| {
            manifest
                .mappings()
                .filter(|mapping| has_extension(mapping.game_route, extension))
                .map(move |mapping| Reference {
                    manifest_file: manifest_file.clone(),
                    group_name: manifest.group_name().map(str::to_string),
                    option_name: mapping.option_name.to_string(),
                    game_route: mapping.game_route.to_string(),
                    resource_path: normalise(mapping.file),
                })
        })
        .sorted();

    let grouped = references.into_group_map_by(|reference| match kind {
        ResourceKind::Animation => reference.resource_path.to_lowercase(),
        ResourceKind::Container => reference.game_route.to_lowercase(),
    });

    let mut groups = CaseInsensitiveHashMap::new();

    for (_, references) in grouped {
        let path = match kind {
            ResourceKind::Animation => references[0].resource_path.clone(),
            ResourceKind::Container => references[0].game_route.clone(),
        };

        groups.insert(path.clone(), ReferenceGroup { path, references });
    }

    info!(
        "Found {} {} paths in {} manifests under {:?}",
        groups.len(),
        kind,
        manifests.len(),
        dir
    );

    Ok(ManifestIndex { kind, groups })
}

/// A sound trigger found in an animation document.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct SoundEntryRecord {
    /// The animation path, as the manifests name it.
    pub resource_path: String,
    pub animation_file: PathBuf,
    pub animation_name: String,

    /// The container the trigger plays.
    pub sound_path: String,

    /// Id of the actor that owns the trigger.
    pub actor_id: u16,
}

fn sound_entries(resource_path: &str, file: &Path) -> EyreResult<Vec<SoundEntryRecord>> {
    let bytes = std::fs::read(file).wrap_err("reading animation document")?;
    let document = AnimationDocument::parse(&bytes)?;

    let records = document
        .animations
        .iter()
        .filter_map(|animation| animation.timeline.as_ref().map(|timeline| (animation, timeline)))
        .flat_map(|(animation, timeline)| {
            timeline
                .sound_triggers()
                .map(move |(actor, _, trigger)| SoundEntryRecord {
                    resource_path: resource_path.to_string(),
                    animation_file: file.to_path_buf(),
                    animation_name: animation.name.clone(),
                    sound_path: trigger.resource_path().to_string(),
                    actor_id: actor.id,
                })
        })
        .collect();

    Ok(records)
}

/// Lists the sound triggers in every animation document `index` refers to.
///
/// Documents that don't exist under `dir` are skipped, as are documents that can't be parsed
/// (with a warning).
pub fn scan_animation_sound_entries(
    dir: impl AsRef<Path>,
    index: &ManifestIndex,
    settings: &Settings,
) -> Result<Vec<SoundEntryRecord>> {
    if index.kind() != ResourceKind::Animation {
        return Err(PatchError::schema(
            "manifest index",
            "kind",
            format!("expected animation references, found {} references", index.kind()),
        ));
    }

    let dir = dir.as_ref();

    let targets = index
        .groups()
        .into_iter()
        .map(|group| (group.path.clone(), dir.join(&group.path)))
        .filter(|(path, file)| {
            let exists = file.is_file();

            if !exists {
                debug!("Referenced animation {:?} is not in the mod directory", path);
            }

            exists
        })
        .collect::<Vec<_>>();

    let files = targets.iter().map(|(_, file)| file.clone()).collect::<Vec<_>>();

    let records = load_all(&files, settings.parallel_scan, |file| {
        let resource_path = targets
            .iter()
            .find(|(_, target)| target == file)
            .map_or("", |(path, _)| path.as_str());

        sound_entries(resource_path, file)
    });

    let mut records = records.into_iter().flatten().collect::<Vec<_>>();
    records.sort();

    Ok(records)
}

/// What to do with one animation.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PatchPlan {
    /// The animation already plays these containers; replace their audio.
    Overwrite {
        animation: String,
        sound_paths: Vec<String>,
    },

    /// The animation plays nothing yet; inject a trigger.
    Inject { animation: String },
}

/// Decides, for every animation in `index`, whether to overwrite existing containers or inject a
/// trigger.
pub fn plan_patches(index: &ManifestIndex, records: &[SoundEntryRecord]) -> Vec<PatchPlan> {
    index
        .groups()
        .into_iter()
        .map(|group| {
            let sound_paths = records
                .iter()
                .filter(|record| record.resource_path.eq_ignore_ascii_case(&group.path))
                .map(|record| record.sound_path.clone())
                .collect::<BTreeSet<_>>();

            if sound_paths.is_empty() {
                PatchPlan::Inject {
                    animation: group.path.clone(),
                }
            } else {
                PatchPlan::Overwrite {
                    animation: group.path.clone(),
                    sound_paths: sound_paths.into_iter().collect(),
                }
            }
        })
        .collect()
}
