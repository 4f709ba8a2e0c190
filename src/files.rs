//! Reading inputs and writing outputs.
//!
//! Every output is serialized in full before anything touches the destination, then written to a
//! temporary file next to it and moved over it in one step. A failed write never leaves a partial
//! file at the destination.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::error::{PatchError, Result};

pub fn read(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();

    let bytes = std::fs::read(path).map_err(|err| PatchError::read(path, err))?;
    debug!("Read {} bytes from {:?}", bytes.len(), path);

    Ok(bytes)
}

/// Writes `bytes` to `path` atomically.
pub fn write_atomic(path: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();

    // The temporary file has to live on the same filesystem as the destination for the final
    // rename to be atomic.
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut temp =
        tempfile::NamedTempFile::new_in(&parent).map_err(|err| PatchError::serialize(path, err))?;

    temp.write_all(bytes)
        .and_then(|_| temp.flush())
        .map_err(|err| PatchError::serialize(path, err))?;

    temp.persist(path)
        .map_err(|err| PatchError::serialize(path, err.error))?;

    info!("Wrote {} bytes to {:?}", bytes.len(), path);

    Ok(())
}
