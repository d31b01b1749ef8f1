use std::path::PathBuf;
use std::process::ExitStatus;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no image paths provided to read")]
    NoImagePaths,

    #[error("no metadata fields requested")]
    NoFieldsRequested,

    #[error("no image metadata provided to write")]
    NoMetadataToWrite,

    #[error("image path does not exist: {}", .0.display())]
    ImagePathNotFound(PathBuf),

    #[error("image path is not a file: {}", .0.display())]
    ImagePathNotFile(PathBuf),

    #[error("failed to launch exiftool at {}: {source}", .exe.display())]
    ToolSpawn {
        exe: PathBuf,
        source: std::io::Error,
    },

    #[error("exiftool exited with {status}: {stderr}")]
    ToolFailed { status: ExitStatus, stderr: String },

    #[error("unexpected exiftool output: {0}")]
    ToolOutput(String),

    #[error("a rough date cannot have a valid day without a valid month")]
    InvalidRoughDate,

    #[error("invalid rough location: {0}")]
    InvalidLocation(String),

    #[error("image not found: {0}")]
    ImageNotFound(i64),
}

pub type Result<T> = std::result::Result<T, Error>;
