/// Error types shared across the crate
///
/// Missing or corrupt persisted data is never an error: the store recovers
/// with defaults and logs it. Deleting an absent photo is not an error
/// either. What remains is bad input to the engine, failed durable writes,
/// and capture payloads we cannot encode.
use thiserror::Error;

/// Malformed input to the calibration engine
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("invalid argument: unknown archetype `{0}` (expected classic, editorial or natural)")]
    UnknownArchetype(String),

    #[error("invalid argument: iteration count must be non-negative, got {0}")]
    InvalidIterationCount(i64),
}

/// Failure inside a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by store mutations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The durable write failed. In-memory state keeps the mutation and the
    /// store is marked dirty until a later write succeeds.
    #[error("persistence error: {0}")]
    Persistence(#[from] StorageError),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("iteration count cannot go back from {current} to {requested} within a calibration session")]
    IterationRegression { current: u32, requested: u32 },
}

/// Errors from turning a raw capture into a stored payload
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to process captured image: {0}")]
    Image(#[from] image::ImageError),

    #[error("captured image is empty")]
    Empty,
}

/// A persisted record that cannot be read back
///
/// Never surfaced to callers; the store logs it and falls back to defaults.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record schema version {0} is newer than this build supports")]
    UnsupportedVersion(u64),

    #[error("record schema version is not a number")]
    MalformedVersion,

    #[error("record has an unexpected shape")]
    Shape,
}
