//! Table compile and load errors.
use std::path::PathBuf;

use smol_str::SmolStr;

use crate::contraction::layout::LayoutError;

/// Errors that end a compile or a load.
///
/// Problems confined to a single directive line are not errors: they are
/// reported as [`Diagnostic`](crate::datafile::Diagnostic)s and the compile
/// carries on.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TableError {
    /// The table file is missing or could not be read
    #[error("Failed to load table '{}'", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Growing the table arena failed, or the configured size limit was hit
    #[error("Out of memory while compiling table ({requested} bytes requested)")]
    OutOfMemory { requested: usize },

    /// A compiled table blob is malformed
    #[error("Malformed compiled table")]
    Layout(#[from] LayoutError),

    /// No backend accepts this table name
    #[error("Unsupported table: {}", .0.display())]
    UnsupportedTable(PathBuf),

    /// Configuration file could not be read or parsed
    #[error("Failed to read configuration '{}'", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Errors of a single translation call.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TranslateError {
    #[error("Failed to start contraction helper '{}'", .path.display())]
    HelperSpawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Contraction helper i/o failed")]
    HelperIo(#[source] std::io::Error),

    #[error("Contraction helper protocol error: {0}")]
    HelperProtocol(String),

    /// An earlier failure took the helper down; this table is unusable
    #[error("Contraction helper is no longer available")]
    HelperFailed,

    #[error("Contraction engine '{engine}' failed")]
    Engine {
        engine: SmolStr,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl TableError {
    pub(crate) fn load(path: impl Into<PathBuf>, source: std::io::Error) -> TableError {
        TableError::Load {
            path: path.into(),
            source,
        }
    }

    /// Wrap into i/o error.
    pub fn into_io_error(self) -> std::io::Error {
        match self {
            TableError::Load { source, .. } => source,
            other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
        }
    }
}
