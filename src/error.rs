//! Error type for index construction.

/// Errors from building the address index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Backing row store failure.
    #[error("Store error: {0}")]
    Store(#[from] sled::Error),

    /// Row (de)serialization failure.
    #[error("Row codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// I/O error while writing the binary index.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The binary index addresses objects with 31-bit offsets.
    #[error("File offset > 2 GB: {0}")]
    OffsetOverflow(u64),

    /// A street id known to the cache has no persisted row.
    #[error("Street {0} not found in store")]
    MissingStreet(i64),

    /// OSM PBF decoding error.
    #[error("OSM error: {0}")]
    Osm(#[from] osmpbfreader::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;
