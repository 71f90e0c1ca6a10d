//! Unified error type.

/// The error type returned by reqlog's fallible operations.
///
/// Byte-level writes report plain [`std::io::Error`]s, exactly as the
/// underlying transport produced them. This type covers the rest: binding the
/// server, and optional writer capabilities that are missing or spent.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    /// The wrapped response writer does not offer the named capability.
    #[error("{0} is not supported by the underlying response writer")]
    Unsupported(&'static str),

    /// The connection was already taken over by an earlier hijack.
    #[error("connection already hijacked")]
    Hijacked,
}
