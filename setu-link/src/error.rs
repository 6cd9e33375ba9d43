//! Error types for the link layer

/// Result type alias
pub type Result<T> = std::result::Result<T, LinkError>;

/// Link layer error types
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// I/O error on the underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Frame length exceeds the protocol maximum
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Peer violated the handshake sequence
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Protocol version the peer offered is not supported
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Peer closed the connection
    #[error("Connection closed by peer")]
    Disconnected,
}
