use std::io;

use thiserror::Error;

use crate::record::KeyPath;

/// Errors surfaced by the runtime.
///
/// Entry validation failures never show up here: the entry screens handle
/// them locally by re-presenting the dialog.
#[derive(Debug, Error)]
pub enum Error {
    #[error("structural conflict at {path}: {reason}")]
    StructuralConflict { path: KeyPath, reason: &'static str },

    #[error("stimulus is not in the implicit draw set")]
    NotDrawn,

    #[error("{0} screen needs at least one control")]
    NoControls(&'static str),

    #[error("run aborted by the subject")]
    UserAbort,

    #[error("trigger worker is gone")]
    DispatcherChannel,

    #[error("debug log write failed: {0}")]
    DebugLog(#[source] io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
