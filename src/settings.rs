//! Tunables for patching, persisted as JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::files;

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bytes the byte splicer keeps between the loop end and the end of the payload.
    pub loop_end_margin: u32,

    /// Where the splicer expects the first audio entry header when it can't read the container's
    /// own offsets.
    pub entry_header_offset: u32,

    pub animation_extension: String,
    pub container_extension: String,

    /// Scan manifests and animation files on the rayon pool.
    pub parallel_scan: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            loop_end_margin: 4000,
            entry_header_offset: 0x1e0,
            animation_extension: "pap".to_string(),
            container_extension: "scd".to_string(),
            parallel_scan: true,
        }
    }
}

impl Settings {
    fn load_path(path: &Path) -> eyre::Result<Settings> {
        let settings: Settings = serde_json::from_reader(std::fs::File::open(path)?)?;
        Ok(settings)
    }

    /// Loads settings from `path`, using the defaults if the file is missing or unreadable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Settings {
        let path = path.as_ref();

        Self::load_path(path).unwrap_or_else(|err| {
            log::error!("Failed to load settings from {:?}: {:?}", path, err);
            log::info!("Using default values instead.");
            Settings::default()
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|err| {
            crate::PatchError::serialize(path.as_ref(), std::io::Error::from(err))
        })?;

        files::write_atomic(path, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "loop_end_margin": 0, "parallel_scan": false, "loop_by_default": false }"#)
                .unwrap();

        assert_eq!(settings.loop_end_margin, 0);
        assert!(!settings.parallel_scan);
        assert_eq!(settings.entry_header_offset, 0x1e0);
        assert_eq!(settings.container_extension, "scd");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = Settings {
            animation_extension: "tmb".to_string(),
            ..Settings::default()
        };

        settings.save(&path).unwrap();
        assert_eq!(Settings::load_or_default(&path), settings);
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(Settings::load_or_default(&path), Settings::default());
        assert_eq!(
            Settings::load_or_default(dir.path().join("absent.json")),
            Settings::default()
        );
    }
}
