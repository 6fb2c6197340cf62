//! Protocol dispatch.
//!
//! A [`Protocol`] owns the wire format. Transport and correlation code only
//! see its four operations (encode/decode for requests and responses), so a
//! different format can be slotted in by registering another implementation
//! in a [`ProtocolRegistry`] under its [`ProtocolType`] tag.
//!
//! The registry is an ordinary value built at startup and passed to whoever
//! needs it; there are no process-wide protocol singletons.

use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tracing::warn;

use crate::{
    codec::{CodecError, FrameDecoder, FrameEncoder},
    compress::CompressError,
    correlation::{Completion, CorrelationError, PendingCalls},
    metrics,
    packet::{Meta, MetaPayload, Packet, ResponseMeta},
    rpc::{InboundRequest, RpcError, RpcRequest, RpcResponse},
    service::ServiceRegistry,
};

/// Errors raised by protocol operations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Framing failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Arguments or result could not be compressed.
    #[error("failed to encode body of call {call_id}: {source}")]
    Encode {
        /// Call being encoded.
        call_id: u64,
        /// Underlying failure.
        source: CompressError,
    },

    /// A size-consistent frame carried a body that does not decode.
    #[error("failed to decode body of call {call_id}: {source}")]
    Body {
        /// Call being decoded.
        call_id: u64,
        /// Underlying failure.
        source: CompressError,
    },

    /// The frame names a compress type this build does not know.
    #[error("call {call_id}: {source}")]
    UnknownCompress {
        /// Call being decoded.
        call_id: u64,
        /// Underlying failure.
        source: CompressError,
    },

    /// A request frame carried response meta or vice versa.
    #[error("expected {expected} meta in frame for call {call_id}")]
    UnexpectedDirection {
        /// Call being decoded.
        call_id: u64,
        /// Direction the decoder was expecting.
        expected: &'static str,
    },

    /// The call could not be registered.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),
}

impl ProtocolError {
    /// Returns true if the connection can no longer be trusted.
    #[must_use]
    pub fn should_disconnect(&self) -> bool {
        match self {
            Self::Codec(err) => err.should_disconnect(),
            Self::Encode { source, .. } => source.is_fatal(),
            Self::Body { .. } | Self::UnknownCompress { .. } | Self::UnexpectedDirection { .. } => {
                true
            }
            Self::Correlation(_) => false,
        }
    }
}

/// Tag selecting a wire protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ProtocolType {
    /// The `LRPC` framed format.
    #[default]
    LiteRpc,
}

impl ProtocolType {
    /// Configuration name of this protocol.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::LiteRpc => "lite_rpc",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// Error returned when parsing an unknown protocol name.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unsupported protocol: {0}")]
pub struct UnknownProtocolName(pub String);

impl FromStr for ProtocolType {
    type Err = UnknownProtocolName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lite_rpc" => Ok(Self::LiteRpc),
            other => Err(UnknownProtocolName(other.to_owned())),
        }
    }
}

/// Per-connection streaming decoder produced by a [`Protocol`].
pub trait PacketDecoder: Send + fmt::Debug {
    /// Decode the next packet, or `Ok(None)` if more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the stream is corrupt.
    fn decode_packet(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, CodecError>;

    /// Decode at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when a partial frame remains.
    fn decode_packet_eof(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, CodecError>;
}

impl PacketDecoder for FrameDecoder {
    fn decode_packet(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, CodecError> {
        FrameDecoder::decode_packet(self, src)
    }

    fn decode_packet_eof(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, CodecError> {
        FrameDecoder::decode_packet_eof(self, src)
    }
}

/// Outcome of decoding one response frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseDisposition {
    /// The pending call was completed.
    Resolved {
        /// Completed call.
        call_id: u64,
    },
    /// No call was pending under this id; the response was dropped.
    Dropped {
        /// Id carried by the response.
        call_id: u64,
    },
}

/// A wire protocol.
///
/// Implementors supply framing; the request and response operations have
/// default implementations expressed in terms of it.
pub trait Protocol: Send + Sync + fmt::Debug {
    /// Tag this protocol is registered under.
    fn protocol_type(&self) -> ProtocolType;

    /// Create a decoder for one connection. Zero selects the default maximum.
    fn new_decoder(&self, max_frame_length: usize) -> Box<dyn PacketDecoder>;

    /// Encode one packet.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the packet cannot be framed.
    fn encode_packet(&self, packet: &Packet) -> Result<Bytes, CodecError>;

    /// Encode a client request.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if the arguments cannot be compressed
    /// and [`ProtocolError::Codec`] if the frame cannot be built.
    fn encode_request(&self, request: &RpcRequest<'_>) -> Result<Bytes, ProtocolError> {
        let call_id = request.call_id;
        let body = request
            .compress_type
            .compress(request.args)
            .map_err(|source| ProtocolError::Encode { call_id, source })?;
        let meta = Meta::request(
            call_id,
            request.compress_type,
            request.method.to_request_meta(),
        );
        Ok(self.encode_packet(&Packet::new(meta, Some(body)))?)
    }

    /// Decode the next request and bind it to its handler.
    ///
    /// An unregistered target still yields a request; invoking it produces a
    /// [`RpcError::METHOD_NOT_FOUND`] response.
    ///
    /// # Errors
    ///
    /// Every error means the connection should be closed: corrupt framing,
    /// an unknown compress type, response meta on a request stream, or
    /// arguments that do not decode.
    fn decode_request(
        &self,
        decoder: &mut dyn PacketDecoder,
        src: &mut BytesMut,
        services: &ServiceRegistry,
    ) -> Result<Option<InboundRequest>, ProtocolError> {
        let Some(packet) = decoder.decode_packet(src)? else {
            return Ok(None);
        };
        let (meta, body) = packet.into_parts();
        let call_id = meta.call_id;
        let compress_type = meta
            .compress()
            .map_err(|source| ProtocolError::UnknownCompress { call_id, source })?;
        let MetaPayload::Request(target) = meta.payload else {
            return Err(ProtocolError::UnexpectedDirection {
                call_id,
                expected: "request",
            });
        };
        services
            .bind(
                call_id,
                compress_type,
                target,
                body.as_deref().unwrap_or_default(),
            )
            .map(Some)
            .map_err(|source| ProtocolError::Body { call_id, source })
    }

    /// Encode a server response.
    ///
    /// Success carries code 0, reason `"ok"` and the compressed result.
    /// Failure carries the error's code and reason and no body.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if the result cannot be compressed
    /// and [`ProtocolError::Codec`] if the frame cannot be built.
    fn encode_response(&self, response: &RpcResponse) -> Result<Bytes, ProtocolError> {
        let call_id = response.call_id;
        let packet = match &response.outcome {
            Ok(result) => {
                let body = response
                    .compress_type
                    .compress(&**result)
                    .map_err(|source| ProtocolError::Encode { call_id, source })?;
                let meta = Meta::response(call_id, response.compress_type, ResponseMeta::ok());
                Packet::new(meta, Some(body))
            }
            Err(error) => Packet::meta_only(Meta::response(
                call_id,
                response.compress_type,
                ResponseMeta {
                    code: error.code(),
                    reason: error.reason().to_owned(),
                },
            )),
        };
        Ok(self.encode_packet(&packet)?)
    }

    /// Decode the next response and complete its pending call.
    ///
    /// A response whose call is no longer pending is logged and dropped.
    ///
    /// # Errors
    ///
    /// Every error means the connection should be closed: corrupt framing,
    /// an unknown compress type, request meta on a response stream, or a
    /// result body that does not decode. In the last case the pending call
    /// has already been failed with [`RpcError::BAD_RESPONSE`].
    fn decode_response(
        &self,
        decoder: &mut dyn PacketDecoder,
        src: &mut BytesMut,
        pending: &PendingCalls,
    ) -> Result<Option<ResponseDisposition>, ProtocolError> {
        let Some(packet) = decoder.decode_packet(src)? else {
            return Ok(None);
        };
        let (meta, body) = packet.into_parts();
        let call_id = meta.call_id;
        let compress_type = meta
            .compress()
            .map_err(|source| ProtocolError::UnknownCompress { call_id, source })?;
        let MetaPayload::Response(response) = meta.payload else {
            return Err(ProtocolError::UnexpectedDirection {
                call_id,
                expected: "response",
            });
        };
        let completion = if response.is_ok() {
            Completion::Success {
                compress_type,
                body,
            }
        } else {
            Completion::Failure(RpcError::new(response.code, response.reason))
        };
        let resolved = pending
            .resolve(call_id, completion)
            .map_err(|source| ProtocolError::Body { call_id, source })?;
        if resolved {
            Ok(Some(ResponseDisposition::Resolved { call_id }))
        } else {
            warn!(call_id, "response for call that is no longer pending; dropping");
            metrics::inc_dropped_responses();
            Ok(Some(ResponseDisposition::Dropped { call_id }))
        }
    }
}

/// The `LRPC` framed protocol.
#[derive(Clone, Copy, Debug, Default)]
pub struct LrpcProtocol;

impl Protocol for LrpcProtocol {
    fn protocol_type(&self) -> ProtocolType { ProtocolType::LiteRpc }

    fn new_decoder(&self, max_frame_length: usize) -> Box<dyn PacketDecoder> {
        Box::new(FrameDecoder::new(max_frame_length))
    }

    fn encode_packet(&self, packet: &Packet) -> Result<Bytes, CodecError> {
        FrameEncoder.encode_to_bytes(packet)
    }
}

/// Table of protocol implementations keyed by tag.
#[derive(Clone, Debug, Default)]
pub struct ProtocolRegistry {
    protocols: HashMap<ProtocolType, Arc<dyn Protocol>>,
}

impl ProtocolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create a registry holding every built-in protocol.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LrpcProtocol));
        registry
    }

    /// Add `protocol` under its own tag, returning any implementation it
    /// replaced.
    pub fn register(&mut self, protocol: Arc<dyn Protocol>) -> Option<Arc<dyn Protocol>> {
        self.protocols.insert(protocol.protocol_type(), protocol)
    }

    /// Look up the implementation for `protocol_type`.
    #[must_use]
    pub fn get(&self, protocol_type: ProtocolType) -> Option<Arc<dyn Protocol>> {
        self.protocols.get(&protocol_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use bincode::{Decode, Encode};
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        compress::CompressType,
        packet::{RequestMeta, ResponseMeta},
        rpc::MethodDescriptor,
    };

    #[derive(Debug, PartialEq, Encode, Decode)]
    struct Ping {}

    #[derive(Debug, PartialEq, Encode, Decode)]
    struct Pong {
        message: String,
    }

    const PING: MethodDescriptor = MethodDescriptor::new("Echo", "Ping");

    #[fixture]
    fn protocol() -> Arc<dyn Protocol> {
        ProtocolRegistry::with_defaults()
            .get(ProtocolType::LiteRpc)
            .expect("built-in protocol")
    }

    #[test]
    fn protocol_names_parse() {
        assert_eq!("lite_rpc".parse::<ProtocolType>(), Ok(ProtocolType::LiteRpc));
        assert_eq!(ProtocolType::LiteRpc.to_string(), "lite_rpc");
        assert_eq!(
            "grpc".parse::<ProtocolType>(),
            Err(UnknownProtocolName("grpc".into()))
        );
    }

    #[test]
    fn empty_registry_has_no_protocols() {
        assert!(ProtocolRegistry::new().get(ProtocolType::LiteRpc).is_none());
    }

    #[test]
    fn registering_again_replaces() {
        let mut registry = ProtocolRegistry::with_defaults();
        assert!(registry.register(Arc::new(LrpcProtocol)).is_some());
    }

    #[rstest]
    fn request_stream_rejects_response_meta(protocol: Arc<dyn Protocol>) {
        let response = RpcResponse::failure(8, CompressType::None, RpcError::internal("x"));
        let mut src = BytesMut::from(&protocol.encode_response(&response).expect("encode")[..]);
        let mut decoder = protocol.new_decoder(0);
        let err = protocol
            .decode_request(decoder.as_mut(), &mut src, &ServiceRegistry::new())
            .expect_err("wrong direction");
        assert!(matches!(
            err,
            ProtocolError::UnexpectedDirection {
                call_id: 8,
                expected: "request"
            }
        ));
        assert!(err.should_disconnect());
    }

    #[rstest]
    fn unknown_compress_code_is_fatal(protocol: Arc<dyn Protocol>) {
        let mut meta = Meta::request(5, CompressType::None, PING.to_request_meta());
        meta.compress_type = 9;
        let bytes = protocol
            .encode_packet(&Packet::meta_only(meta))
            .expect("encode");
        let mut src = BytesMut::from(&bytes[..]);
        let mut decoder = protocol.new_decoder(0);
        let err = protocol
            .decode_request(decoder.as_mut(), &mut src, &ServiceRegistry::new())
            .expect_err("unknown compress");
        assert!(matches!(
            err,
            ProtocolError::UnknownCompress {
                call_id: 5,
                source: CompressError::UnknownType(9)
            }
        ));
        assert!(err.should_disconnect());
    }

    #[rstest]
    fn error_response_has_no_body(protocol: Arc<dyn Protocol>) {
        let response = RpcResponse::failure(3, CompressType::Lz4, RpcError::timeout(3));
        let bytes = protocol.encode_response(&response).expect("encode");
        let mut src = BytesMut::from(&bytes[..]);
        let packet = protocol
            .new_decoder(0)
            .decode_packet(&mut src)
            .expect("decode")
            .expect("packet");
        assert!(packet.body().is_none());
        let meta = packet.meta().as_response().expect("response meta");
        assert_eq!(meta.code, RpcError::TIMEOUT);
        assert_eq!(meta.reason, "call 3 timed out");
    }

    #[rstest]
    fn success_response_is_ok_with_body(protocol: Arc<dyn Protocol>) {
        let pong = Pong {
            message: "pong".into(),
        };
        let response = RpcResponse::success(
            42,
            CompressType::None,
            Box::new(Pong {
                message: "pong".into(),
            }),
        );
        let bytes = protocol.encode_response(&response).expect("encode");
        let mut src = BytesMut::from(&bytes[..]);
        let packet = protocol
            .new_decoder(0)
            .decode_packet(&mut src)
            .expect("decode")
            .expect("packet");

        assert_eq!(packet.meta().call_id, 42);
        assert_eq!(
            packet.meta().as_response(),
            Some(&ResponseMeta {
                code: 0,
                reason: "ok".into(),
            })
        );
        let body = packet.body().expect("success carries a body");
        assert_eq!(
            CompressType::None.decompress::<Pong>(body).expect("result body"),
            pong
        );
    }

    #[rstest]
    fn request_meta_names_method(protocol: Arc<dyn Protocol>) {
        let request = RpcRequest {
            call_id: 42,
            method: &PING,
            args: &Ping {},
            compress_type: CompressType::Gzip,
        };
        let bytes = protocol.encode_request(&request).expect("encode");
        let mut src = BytesMut::from(&bytes[..]);
        let packet = protocol
            .new_decoder(0)
            .decode_packet(&mut src)
            .expect("decode")
            .expect("packet");
        assert_eq!(packet.meta().call_id, 42);
        assert_eq!(
            packet.meta().compress().expect("known code"),
            CompressType::Gzip
        );
        assert_eq!(
            packet.meta().as_request(),
            Some(&RequestMeta {
                service_name: "Echo".into(),
                method_name: "Ping".into(),
            })
        );
    }
}
