//! Error types for the mapping side of DrishtiMap
//!
//! The session client keeps its own `ClientError` next to the client code,
//! mirroring the split between protocol failures and mapping failures.

/// Result type alias for mapping operations
pub type Result<T> = std::result::Result<T, MapError>;

/// Mapping error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// Scan batch with mismatched ranges/angles lengths; the grid is untouched
    #[error("Malformed scan: {ranges} ranges vs {angles} angles")]
    MalformedScan { ranges: usize, angles: usize },

    /// I/O error while saving or loading a map file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Map file with a bad magic, version, or truncated body
    #[error("Bad map file: {0}")]
    BadMapFile(String),
}
