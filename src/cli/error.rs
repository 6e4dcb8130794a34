//! CLI error types

use archival_import_sdk::convert::ConvertError;
use archival_import_sdk::{IdError, ImportError, StorageError};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to read {0}: {1}")]
    FileReadError(PathBuf, String),

    #[error("{}", .0.user_message())]
    Import(#[from] ImportError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Id(#[from] IdError),

    #[error("Failed to format output: {0}")]
    Output(#[from] serde_json::Error),
}
