//! Logical content of a single frame.
//!
//! A [`Packet`] is the decoded form of one frame: its [`Meta`] plus the
//! opaque, already-compressed body bytes. Packets are built fresh for each
//! encode or decode and carry no identity beyond that frame.

use bincode::{Decode, Encode};
use bytes::Bytes;

use crate::compress::{CompressError, CompressType};

/// Target of a request: the fully qualified service and method names.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct RequestMeta {
    /// Name of the service the request addresses.
    pub service_name: String,
    /// Method within the service.
    pub method_name: String,
}

/// Outcome of a call. `code == 0` means success.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ResponseMeta {
    /// Zero on success, an application error code otherwise.
    pub code: i32,
    /// Human-readable outcome.
    pub reason: String,
}

impl ResponseMeta {
    /// Reason sent with successful responses.
    pub const OK_REASON: &'static str = "ok";

    /// Meta for a successful call.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            code: 0,
            reason: Self::OK_REASON.to_owned(),
        }
    }

    /// Returns true when the call succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool { self.code == 0 }
}

/// Direction-specific part of [`Meta`].
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum MetaPayload {
    /// Carried by frames travelling client to server.
    Request(RequestMeta),
    /// Carried by frames travelling server to client.
    Response(ResponseMeta),
}

/// Per-frame metadata.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Meta {
    /// Correlation key chosen by the client.
    pub call_id: u64,
    /// Wire code of the body's [`CompressType`].
    pub compress_type: i32,
    /// Request or response details.
    pub payload: MetaPayload,
}

impl Meta {
    /// Build request meta.
    #[must_use]
    pub fn request(call_id: u64, compress_type: CompressType, request: RequestMeta) -> Self {
        Self {
            call_id,
            compress_type: compress_type.code(),
            payload: MetaPayload::Request(request),
        }
    }

    /// Build response meta.
    #[must_use]
    pub fn response(call_id: u64, compress_type: CompressType, response: ResponseMeta) -> Self {
        Self {
            call_id,
            compress_type: compress_type.code(),
            payload: MetaPayload::Response(response),
        }
    }

    /// Resolve the body's compress type.
    ///
    /// # Errors
    ///
    /// Returns [`CompressError::UnknownType`] when the code is not supported.
    pub fn compress(&self) -> Result<CompressType, CompressError> {
        CompressType::from_code(self.compress_type)
    }

    /// Request details, if this is request meta.
    #[must_use]
    pub fn as_request(&self) -> Option<&RequestMeta> {
        match &self.payload {
            MetaPayload::Request(request) => Some(request),
            MetaPayload::Response(_) => None,
        }
    }

    /// Response details, if this is response meta.
    #[must_use]
    pub fn as_response(&self) -> Option<&ResponseMeta> {
        match &self.payload {
            MetaPayload::Response(response) => Some(response),
            MetaPayload::Request(_) => None,
        }
    }
}

/// One frame's meta and body.
///
/// An empty body is stored as absent, since the wire format cannot tell the
/// two apart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    meta: Meta,
    body: Option<Bytes>,
}

impl Packet {
    /// Create a packet, normalising an empty body to `None`.
    #[must_use]
    pub fn new(meta: Meta, body: Option<Bytes>) -> Self {
        Self {
            meta,
            body: body.filter(|b| !b.is_empty()),
        }
    }

    /// Create a packet with no body.
    #[must_use]
    pub fn meta_only(meta: Meta) -> Self { Self { meta, body: None } }

    /// Frame metadata.
    #[must_use]
    pub fn meta(&self) -> &Meta { &self.meta }

    /// Body bytes, if present.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> { self.body.as_ref() }

    /// Length of the body in bytes.
    #[must_use]
    pub fn body_len(&self) -> usize { self.body.as_ref().map_or(0, Bytes::len) }

    /// Consume the packet, returning its parts.
    #[must_use]
    pub fn into_parts(self) -> (Meta, Option<Bytes>) { (self.meta, self.body) }
}
