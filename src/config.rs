//! Client and server configuration.
//!
//! Options are plain values with builder-style setters. Names from
//! configuration files or the command line are parsed up front, so a typo in
//! a protocol or compress name is reported before any connection is made.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    codec::resolve_max_frame_length,
    compress::{CompressType, UnknownCompressName},
    protocol::{Protocol, ProtocolRegistry, ProtocolType, UnknownProtocolName},
};

/// Errors raised while building or applying configuration.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The protocol name is not recognised.
    #[error(transparent)]
    UnknownProtocol(#[from] UnknownProtocolName),

    /// The compress type name is not recognised.
    #[error(transparent)]
    UnknownCompress(#[from] UnknownCompressName),

    /// The protocol is known but no implementation is registered for it.
    #[error("protocol {0} is not registered")]
    ProtocolNotRegistered(ProtocolType),
}

fn lookup_protocol(
    registry: &ProtocolRegistry,
    protocol: ProtocolType,
) -> Result<Arc<dyn Protocol>, ConfigError> {
    registry
        .get(protocol)
        .ok_or(ConfigError::ProtocolNotRegistered(protocol))
}

/// Client options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientConfig {
    protocol: ProtocolType,
    compress_type: CompressType,
    max_frame_length: usize,
}

impl ClientConfig {
    /// Defaults: `lite_rpc`, `lz4`, default maximum frame length.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Build from configuration names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if either name is unknown.
    pub fn from_names(protocol: &str, compress_type: &str) -> Result<Self, ConfigError> {
        Ok(Self::new()
            .protocol(protocol.parse()?)
            .compress_type(compress_type.parse()?))
    }

    /// Select the wire protocol.
    #[must_use]
    pub fn protocol(mut self, protocol: ProtocolType) -> Self {
        self.protocol = protocol;
        self
    }

    /// Select the compression for outgoing arguments.
    #[must_use]
    pub fn compress_type(mut self, compress_type: CompressType) -> Self {
        self.compress_type = compress_type;
        self
    }

    /// Set the largest accepted response body. Zero selects the default.
    #[must_use]
    pub fn max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length;
        self
    }

    /// Configured protocol.
    #[must_use]
    pub fn protocol_type(&self) -> ProtocolType { self.protocol }

    /// Configured compression.
    #[must_use]
    pub fn compress(&self) -> CompressType { self.compress_type }

    /// Effective maximum frame length.
    #[must_use]
    pub fn frame_limit(&self) -> usize { resolve_max_frame_length(self.max_frame_length) }

    /// Resolve the configured protocol.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ProtocolNotRegistered`] if `registry` lacks it.
    pub fn resolve(&self, registry: &ProtocolRegistry) -> Result<Arc<dyn Protocol>, ConfigError> {
        lookup_protocol(registry, self.protocol)
    }
}

/// Server options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServerConfig {
    protocol: ProtocolType,
    max_frame_length: usize,
}

impl ServerConfig {
    /// Defaults: `lite_rpc`, default maximum frame length.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Build from a configuration name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownProtocol`] if the name is unknown.
    pub fn from_name(protocol: &str) -> Result<Self, ConfigError> {
        Ok(Self::new().protocol(protocol.parse()?))
    }

    /// Select the wire protocol.
    #[must_use]
    pub fn protocol(mut self, protocol: ProtocolType) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the largest accepted request body. Zero selects the default.
    #[must_use]
    pub fn max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length;
        self
    }

    /// Configured protocol.
    #[must_use]
    pub fn protocol_type(&self) -> ProtocolType { self.protocol }

    /// Effective maximum frame length.
    #[must_use]
    pub fn frame_limit(&self) -> usize { resolve_max_frame_length(self.max_frame_length) }

    /// Resolve the configured protocol.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ProtocolNotRegistered`] if `registry` lacks it.
    pub fn resolve(&self, registry: &ProtocolRegistry) -> Result<Arc<dyn Protocol>, ConfigError> {
        lookup_protocol(registry, self.protocol)
    }
}
