//! Canonical error and result types for the crate.
//!
//! Each layer has its own error enum. [`Error`] collects them for callers
//! that drive several layers and want a single `?`-compatible type.

use thiserror::Error;

use crate::{
    codec::CodecError,
    compress::CompressError,
    config::ConfigError,
    correlation::CorrelationError,
    protocol::ProtocolError,
    rpc::RpcError,
    service::RegistryError,
};

/// Top-level error type exposed by `lrpc`.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// A handler could not be registered.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    /// A call could not be registered.
    #[error("correlation error: {0}")]
    Correlation(#[from] CorrelationError),
    /// A body could not be compressed or decompressed.
    #[error("compression error: {0}")]
    Compress(#[from] CompressError),
    /// Framing failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// A protocol operation failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// The remote call failed.
    #[error("call failed: {0}")]
    Rpc(#[from] RpcError),
}

impl Error {
    /// Returns true if the connection this error came from should be closed.
    #[must_use]
    pub fn should_disconnect(&self) -> bool {
        match self {
            Self::Codec(err) => err.should_disconnect(),
            Self::Protocol(err) => err.should_disconnect(),
            Self::Compress(err) => err.is_fatal(),
            Self::Config(_) | Self::Registry(_) | Self::Correlation(_) | Self::Rpc(_) => false,
        }
    }
}

/// Result type alias used throughout the crate's public API.
pub type Result<T, E = Error> = std::result::Result<T, E>;
