//! Client side of a connection.
//!
//! [`RpcClient`] ties the configured protocol to a pending-call registry. It
//! turns calls into wire bytes and feeds received bytes back into the
//! registry. Moving the bytes is left to the transport.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::{
    config::{ClientConfig, ConfigError},
    correlation::{PendingCalls, PendingHandle},
    message::Message,
    protocol::{PacketDecoder, Protocol, ProtocolError, ProtocolRegistry, ResponseDisposition},
    rpc::{MethodDescriptor, RpcError, RpcRequest},
};

/// Encodes calls and resolves their responses for one connection.
///
/// # Examples
///
/// ```
/// use bincode::{Decode, Encode};
/// use lrpc::{
///     client::RpcClient,
///     config::ClientConfig,
///     protocol::ProtocolRegistry,
///     rpc::MethodDescriptor,
/// };
///
/// #[derive(Encode, Decode)]
/// struct Ping {}
///
/// let client = RpcClient::new(ClientConfig::new(), &ProtocolRegistry::with_defaults())
///     .expect("lite_rpc is registered");
/// let (handle, frame) = client
///     .prepare_call::<_, Ping>(&MethodDescriptor::new("Echo", "Ping"), &Ping {})
///     .expect("encode request");
/// assert_eq!(&frame[..4], b"LRPC");
/// assert!(client.pending().contains(handle.call_id()));
/// ```
#[derive(Debug)]
pub struct RpcClient {
    config: ClientConfig,
    protocol: Arc<dyn Protocol>,
    pending: Arc<PendingCalls>,
}

impl RpcClient {
    /// Create a client using the protocol named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ProtocolNotRegistered`] if `registry` lacks the
    /// configured protocol.
    pub fn new(config: ClientConfig, registry: &ProtocolRegistry) -> Result<Self, ConfigError> {
        Ok(Self {
            protocol: config.resolve(registry)?,
            config,
            pending: Arc::new(PendingCalls::new()),
        })
    }

    /// Client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig { &self.config }

    /// Pending-call registry, shared with timeout and teardown paths.
    #[must_use]
    pub fn pending(&self) -> &Arc<PendingCalls> { &self.pending }

    /// Decoder for this connection's inbound bytes.
    #[must_use]
    pub fn new_decoder(&self) -> Box<dyn PacketDecoder> {
        self.protocol.new_decoder(self.config.frame_limit())
    }

    /// Register a call under a fresh id and encode its request.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the request cannot be encoded. The call
    /// is unregistered again before returning.
    pub fn prepare_call<A, R>(
        &self,
        method: &MethodDescriptor,
        args: &A,
    ) -> Result<(PendingHandle<R>, Bytes), ProtocolError>
    where
        A: Message + Send + Sync,
        R: Message + Send + 'static,
    {
        let handle = self.pending.register_next::<R>();
        self.encode_call(handle, method, args)
    }

    /// Register a call under `call_id` and encode its request.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Correlation`] if `call_id` is already pending
    /// and [`ProtocolError`] if the request cannot be encoded.
    pub fn prepare_call_with_id<A, R>(
        &self,
        call_id: u64,
        method: &MethodDescriptor,
        args: &A,
    ) -> Result<(PendingHandle<R>, Bytes), ProtocolError>
    where
        A: Message + Send + Sync,
        R: Message + Send + 'static,
    {
        let handle = self.pending.register::<R>(call_id)?;
        self.encode_call(handle, method, args)
    }

    fn encode_call<A, R>(
        &self,
        handle: PendingHandle<R>,
        method: &MethodDescriptor,
        args: &A,
    ) -> Result<(PendingHandle<R>, Bytes), ProtocolError>
    where
        A: Message + Send + Sync,
    {
        let request = RpcRequest {
            call_id: handle.call_id(),
            method,
            args,
            compress_type: self.config.compress(),
        };
        match self.protocol.encode_request(&request) {
            Ok(frame) => Ok((handle, frame)),
            Err(err) => {
                self.pending.remove(handle.call_id());
                Err(err)
            }
        }
    }

    /// Decode every complete response in `src` and complete its call.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] when the stream is corrupt. Responses decoded
    /// before the error have already been delivered.
    pub fn handle_incoming(
        &self,
        decoder: &mut dyn PacketDecoder,
        src: &mut BytesMut,
    ) -> Result<Vec<ResponseDisposition>, ProtocolError> {
        let mut handled = Vec::new();
        while let Some(disposition) = self.protocol.decode_response(decoder, src, &self.pending)? {
            handled.push(disposition);
        }
        Ok(handled)
    }

    /// Fail every pending call because the connection closed. Returns the
    /// number of calls failed.
    pub fn close(&self) -> usize { self.pending.fail_all(&RpcError::connection_closed()) }
}
