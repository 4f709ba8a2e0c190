//! The JSON manifests a mod directory carries, as far as the scanner needs them.
//!
//! A manifest maps game routes (what the game asks for) to files inside the mod, either for the
//! mod as a whole or per selectable option:
//!
//! ```json
//! {
//!   "Name": "Battle music",
//!   "Files": { "sound/bgm/battle.scd": "music\\battle.scd" },
//!   "Options": [
//!     { "Name": "Loud", "Files": { "chara/attack.pap": "anim\\attack.pap" } }
//!   ]
//! }
//! ```
//!
//! Every key is optional and unknown keys are ignored.

use std::{collections::BTreeMap, path::Path};

use eyre::Context;
use serde::Deserialize;

/// Option name given to files the manifest maps outside of any option.
pub const ROOT_OPTION: &str = "(root)";

/// Option name given to options without a name.
pub const UNNAMED_OPTION: &str = "(no name)";

#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ManifestOption {
    pub name: Option<String>,
    pub files: Option<BTreeMap<String, String>>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Manifest {
    pub name: Option<String>,
    pub files: Option<BTreeMap<String, String>>,
    pub options: Option<Vec<ManifestOption>>,
}

/// One route → file mapping and the option it belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Mapping<'a> {
    pub option_name: &'a str,
    pub game_route: &'a str,
    pub file: &'a str,
}

impl Manifest {
    pub fn load(path: &Path) -> eyre::Result<Manifest> {
        let text = std::fs::read_to_string(path).wrap_err("reading manifest")?;
        serde_json::from_str(&text).wrap_err("parsing manifest")
    }

    /// The manifest's name, if it has a non-empty one.
    pub fn group_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }

    /// Every mapping in the manifest: root files first, then each option's files in order.
    pub fn mappings(&self) -> impl Iterator<Item = Mapping<'_>> + '_ {
        let root = self
            .files
            .iter()
            .flatten()
            .map(|(route, file)| (ROOT_OPTION, route, file));

        let options = self.options.iter().flatten().flat_map(|option| {
            let option_name = option.name.as_deref().unwrap_or(UNNAMED_OPTION);

            option
                .files
                .iter()
                .flatten()
                .map(move |(route, file)| (option_name, route, file))
        });

        root.chain(options)
            .map(|(option_name, game_route, file)| Mapping {
                option_name,
                game_route,
                file,
            })
    }
}
