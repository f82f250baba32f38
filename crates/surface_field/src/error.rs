use std::path::PathBuf;
use thiserror::Error;

use crate::depth::DepthError;
use crate::frequency::SamplerError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error in {} (id {id:?}): {reason}", file.display())]
    Parse {
        id: Option<String>,
        file: PathBuf,
        reason: String,
    },

    #[error("missing file {} (id {id:?})", path.display())]
    MissingFile { id: Option<String>, path: PathBuf },

    #[error("shape mismatch for {id:?}: color is {color_width}x{color_height}, depth is {depth_width}x{depth_height}")]
    ShapeMismatch {
        id: Option<String>,
        color_width: usize,
        color_height: usize,
        depth_width: usize,
        depth_height: usize,
    },

    #[error("sample limit must be positive")]
    InvalidLimit,

    #[error("intrinsic matrix is singular (id {id:?})")]
    SingularIntrinsic { id: Option<String> },

    #[error("depth rendering failed for {id}")]
    Depth {
        id: String,
        #[source]
        source: DepthError,
    },

    #[error("failed to decode image {} (id {id})", path.display())]
    Image {
        id: String,
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("io error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("frequency sampler failed")]
    Sampler(#[from] SamplerError),

    #[error("frequency basis has {rows} rows after {attempts} re-draws of degenerate rows")]
    DegenerateBasis { rows: usize, attempts: usize },

    #[error("invalid frequency basis: {0}")]
    InvalidBasis(String),

    #[error("checkpoint {} holds a {found:?} basis, {expected:?} was requested", path.display())]
    CheckpointKind {
        path: PathBuf,
        expected: slfc::BasisKind,
        found: slfc::BasisKind,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::MissingFile {
                id: None,
                path: path.into(),
            }
        } else {
            Error::Io {
                path: path.into(),
                source,
            }
        }
    }

    /// Attach an identifier to errors that were raised before it was known.
    pub(crate) fn for_id(self, id: &str) -> Self {
        match self {
            Error::Parse { id: None, file, reason } => Error::Parse {
                id: Some(id.to_owned()),
                file,
                reason,
            },
            Error::MissingFile { id: None, path } => Error::MissingFile {
                id: Some(id.to_owned()),
                path,
            },
            Error::ShapeMismatch {
                id: None,
                color_width,
                color_height,
                depth_width,
                depth_height,
            } => Error::ShapeMismatch {
                id: Some(id.to_owned()),
                color_width,
                color_height,
                depth_width,
                depth_height,
            },
            Error::SingularIntrinsic { id: None } => Error::SingularIntrinsic {
                id: Some(id.to_owned()),
            },
            other => other,
        }
    }
}
