//! Server side of a connection.
//!
//! [`RpcServer`] decodes requests, runs their handlers and encodes the
//! responses. Each connection gets its own decoder from
//! [`RpcServer::new_decoder`]; the server itself is shared.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::{
    config::{ConfigError, ServerConfig},
    protocol::{PacketDecoder, Protocol, ProtocolError, ProtocolRegistry},
    rpc::{RpcError, RpcResponse},
    service::ServiceRegistry,
};

/// Request processor shared by every connection.
#[derive(Debug)]
pub struct RpcServer {
    config: ServerConfig,
    protocol: Arc<dyn Protocol>,
    services: ServiceRegistry,
}

impl RpcServer {
    /// Create a server using the protocol named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ProtocolNotRegistered`] if `registry` lacks the
    /// configured protocol.
    pub fn new(
        config: ServerConfig,
        registry: &ProtocolRegistry,
        services: ServiceRegistry,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            protocol: config.resolve(registry)?,
            config,
            services,
        })
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig { &self.config }

    /// Registered services.
    #[must_use]
    pub fn services(&self) -> &ServiceRegistry { &self.services }

    /// Decoder for one connection's inbound bytes.
    #[must_use]
    pub fn new_decoder(&self) -> Box<dyn PacketDecoder> {
        self.protocol.new_decoder(self.config.frame_limit())
    }

    /// Handle every complete request in `src`, returning encoded responses in
    /// request order.
    ///
    /// Unknown methods, handler failures and results that cannot be encoded
    /// become error responses.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] when the stream is corrupt or an error
    /// response cannot be framed. Check [`ProtocolError::should_disconnect`].
    pub fn process(
        &self,
        decoder: &mut dyn PacketDecoder,
        src: &mut BytesMut,
    ) -> Result<Vec<Bytes>, ProtocolError> {
        let mut responses = Vec::new();
        while let Some(request) = self.protocol.decode_request(decoder, src, &self.services)? {
            debug!(
                call_id = request.call_id(),
                service = %request.target().service_name,
                method = %request.target().method_name,
                "dispatching request"
            );
            let response = request.invoke();
            responses.push(self.encode_or_fail(&response)?);
        }
        Ok(responses)
    }

    /// Encode `response`, answering with [`RpcError::INTERNAL`] when its
    /// result cannot be encoded.
    fn encode_or_fail(&self, response: &RpcResponse) -> Result<Bytes, ProtocolError> {
        match self.protocol.encode_response(response) {
            Err(ProtocolError::Encode { call_id, source }) => {
                warn!(call_id, error = %source, "failed to encode result; replying with error");
                let failure = RpcResponse::failure(
                    call_id,
                    response.compress_type,
                    RpcError::internal(format!("failed to encode result: {source}")),
                );
                self.protocol.encode_response(&failure)
            }
            other => other,
        }
    }
}
