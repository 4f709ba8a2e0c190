//! Error taxonomy shared by every patching operation.

use std::{io, path::PathBuf};

use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Broad cause of a [`PatchError`], for callers that branch on the category rather than the
/// details.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    NotFound,
    Decode,
    Schema,
    Serialize,
    Read,
}

#[derive(Debug, Error)]
pub enum PatchError {
    /// Marker bytes or an expected sub-structure are absent.
    #[error("{what} not found in {location}")]
    NotFound { what: String, location: String },

    /// A payload or document could not be understood.
    #[error("could not decode {location}: {detail}")]
    Decode { location: String, detail: String },

    /// A document parsed, but lacks a node or field that the operation requires.
    #[error("{location} has unusable `{field}`: {detail}")]
    Schema {
        location: String,
        field: String,
        detail: String,
    },

    /// The output could not be produced or written. Nothing is left at `path`.
    #[error("could not write {}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An input file could not be read at all.
    #[error("could not read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PatchError::NotFound { .. } => ErrorKind::NotFound,
            PatchError::Decode { .. } => ErrorKind::Decode,
            PatchError::Schema { .. } => ErrorKind::Schema,
            PatchError::Serialize { .. } => ErrorKind::Serialize,
            PatchError::Read { .. } => ErrorKind::Read,
        }
    }

    pub(crate) fn not_found(what: impl Into<String>, location: impl Into<String>) -> PatchError {
        PatchError::NotFound {
            what: what.into(),
            location: location.into(),
        }
    }

    /// Folds a codec-level report into a `Decode` error, keeping the whole context chain.
    pub(crate) fn decode(location: impl Into<String>, report: eyre::Report) -> PatchError {
        PatchError::Decode {
            location: location.into(),
            detail: format!("{:#}", report),
        }
    }

    pub(crate) fn schema(
        location: impl Into<String>,
        field: impl Into<String>,
        detail: impl Into<String>,
    ) -> PatchError {
        PatchError::Schema {
            location: location.into(),
            field: field.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: io::Error) -> PatchError {
        PatchError::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn serialize(path: impl Into<PathBuf>, source: io::Error) -> PatchError {
        PatchError::Serialize {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = PatchError> = std::result::Result<T, E>;
