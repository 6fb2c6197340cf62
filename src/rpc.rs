//! Logical request and response types.
//!
//! These are the pre-wire forms a caller or handler works with. The protocol
//! layer turns them into packets and back.

use std::{any::Any, borrow::Cow, fmt, sync::Arc};

use thiserror::Error;

use crate::{
    compress::{CompressError, CompressType},
    message::EncodeMessage,
    packet::RequestMeta,
    service::MethodTarget,
};

/// Application-level call failure carried in response meta.
///
/// The code is never zero; zero is reserved for success on the wire.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("rpc error {code}: {reason}")]
pub struct RpcError {
    code: i32,
    reason: String,
}

impl RpcError {
    /// Unexpected failure inside a handler.
    pub const INTERNAL: i32 = 1;
    /// No handler is registered for the requested service and method.
    pub const METHOD_NOT_FOUND: i32 = 2;
    /// The handler rejected its arguments.
    pub const BAD_REQUEST: i32 = 3;
    /// The call timed out before a response arrived.
    pub const TIMEOUT: i32 = 4;
    /// The connection closed while the call was pending.
    pub const CONNECTION_CLOSED: i32 = 5;
    /// The pending call was removed without a result.
    pub const CANCELLED: i32 = 6;
    /// The response body could not be decoded as the expected result type.
    pub const BAD_RESPONSE: i32 = 7;

    /// Create an error. A zero `code` is replaced with [`RpcError::INTERNAL`].
    #[must_use]
    pub fn new(code: i32, reason: impl Into<String>) -> Self {
        Self {
            code: if code == 0 { Self::INTERNAL } else { code },
            reason: reason.into(),
        }
    }

    /// Error for a handler failure.
    #[must_use]
    pub fn internal(reason: impl Into<String>) -> Self { Self::new(Self::INTERNAL, reason) }

    /// Error for arguments a handler cannot accept.
    #[must_use]
    pub fn bad_request(reason: impl Into<String>) -> Self { Self::new(Self::BAD_REQUEST, reason) }

    /// Error for an unregistered service or method.
    #[must_use]
    pub fn method_not_found(service_name: &str, method_name: &str) -> Self {
        Self::new(
            Self::METHOD_NOT_FOUND,
            format!("no method {method_name} on service {service_name}"),
        )
    }

    /// Error delivered by a timeout.
    #[must_use]
    pub fn timeout(call_id: u64) -> Self {
        Self::new(Self::TIMEOUT, format!("call {call_id} timed out"))
    }

    /// Error delivered when the connection goes away.
    #[must_use]
    pub fn connection_closed() -> Self { Self::new(Self::CONNECTION_CLOSED, "connection closed") }

    /// Error seen when a pending call was removed without a result.
    #[must_use]
    pub fn cancelled(call_id: u64) -> Self {
        Self::new(Self::CANCELLED, format!("call {call_id} was cancelled"))
    }

    /// Error for an undecodable response body.
    #[must_use]
    pub fn bad_response(err: &CompressError) -> Self {
        Self::new(Self::BAD_RESPONSE, format!("malformed response body: {err}"))
    }

    /// Non-zero error code.
    #[must_use]
    pub fn code(&self) -> i32 { self.code }

    /// Human-readable reason.
    #[must_use]
    pub fn reason(&self) -> &str { &self.reason }
}

/// Names a remote method.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    service_name: Cow<'static, str>,
    method_name: Cow<'static, str>,
}

impl MethodDescriptor {
    /// Descriptor from static names, usable in constants.
    #[must_use]
    pub const fn new(service_name: &'static str, method_name: &'static str) -> Self {
        Self {
            service_name: Cow::Borrowed(service_name),
            method_name: Cow::Borrowed(method_name),
        }
    }

    /// Descriptor from owned names.
    #[must_use]
    pub fn owned(service_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            service_name: Cow::Owned(service_name.into()),
            method_name: Cow::Owned(method_name.into()),
        }
    }

    /// Service name.
    #[must_use]
    pub fn service_name(&self) -> &str { &self.service_name }

    /// Method name.
    #[must_use]
    pub fn method_name(&self) -> &str { &self.method_name }

    /// Request meta naming this method.
    #[must_use]
    pub fn to_request_meta(&self) -> RequestMeta {
        RequestMeta {
            service_name: self.service_name().to_owned(),
            method_name: self.method_name().to_owned(),
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service_name, self.method_name)
    }
}

/// Outbound request built by a client.
#[derive(Clone, Copy)]
pub struct RpcRequest<'a> {
    /// Correlation key, unique among this client's pending calls.
    pub call_id: u64,
    /// Target method.
    pub method: &'a MethodDescriptor,
    /// Arguments.
    pub args: &'a dyn EncodeMessage,
    /// Compression for the arguments.
    pub compress_type: CompressType,
}

impl fmt::Debug for RpcRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcRequest")
            .field("call_id", &self.call_id)
            .field("method", &self.method)
            .field("compress_type", &self.compress_type)
            .finish_non_exhaustive()
    }
}

/// Response built by a server.
#[derive(Debug)]
pub struct RpcResponse {
    /// Call the response answers.
    pub call_id: u64,
    /// Compression for the result.
    pub compress_type: CompressType,
    /// Result message or failure.
    pub outcome: Result<Box<dyn EncodeMessage>, RpcError>,
}

impl RpcResponse {
    /// Successful response.
    #[must_use]
    pub fn success(call_id: u64, compress_type: CompressType, result: Box<dyn EncodeMessage>) -> Self {
        Self {
            call_id,
            compress_type,
            outcome: Ok(result),
        }
    }

    /// Failed response.
    #[must_use]
    pub fn failure(call_id: u64, compress_type: CompressType, error: RpcError) -> Self {
        Self {
            call_id,
            compress_type,
            outcome: Err(error),
        }
    }
}

/// Request decoded on the server, bound to its handler when one exists.
pub struct InboundRequest {
    call_id: u64,
    compress_type: CompressType,
    target: RequestMeta,
    binding: Result<BoundCall, RpcError>,
}

pub(crate) struct BoundCall {
    pub(crate) method: Arc<MethodTarget>,
    pub(crate) args: Box<dyn Any + Send>,
}

impl InboundRequest {
    pub(crate) fn new(
        call_id: u64,
        compress_type: CompressType,
        target: RequestMeta,
        binding: Result<BoundCall, RpcError>,
    ) -> Self {
        Self {
            call_id,
            compress_type,
            target,
            binding,
        }
    }

    /// Correlation key to echo in the response.
    #[must_use]
    pub fn call_id(&self) -> u64 { self.call_id }

    /// Compression used by the request, reused for the response.
    #[must_use]
    pub fn compress_type(&self) -> CompressType { self.compress_type }

    /// Service and method named by the request.
    #[must_use]
    pub fn target(&self) -> &RequestMeta { &self.target }

    /// Returns true when a handler was found for the target.
    #[must_use]
    pub fn is_bound(&self) -> bool { self.binding.is_ok() }

    /// Decoded arguments, if bound and of type `A`.
    #[must_use]
    pub fn args<A: Any>(&self) -> Option<&A> {
        self.binding
            .as_ref()
            .ok()
            .and_then(|bound| bound.args.downcast_ref::<A>())
    }

    /// Run the handler and build the response.
    ///
    /// A missing handler yields a failed response rather than an error, so the
    /// client learns about it and the connection stays up.
    #[must_use]
    pub fn invoke(self) -> RpcResponse {
        let outcome = self
            .binding
            .and_then(|bound| bound.method.invoke(bound.args));
        RpcResponse {
            call_id: self.call_id,
            compress_type: self.compress_type,
            outcome,
        }
    }
}

impl fmt::Debug for InboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundRequest")
            .field("call_id", &self.call_id)
            .field("compress_type", &self.compress_type)
            .field("target", &self.target)
            .field("bound", &self.is_bound())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_code_is_not_success() {
        let err = RpcError::new(0, "oops");
        assert_eq!(err.code(), RpcError::INTERNAL);
        assert_eq!(err.reason(), "oops");
    }

    #[test]
    fn method_not_found_names_target() {
        let err = RpcError::method_not_found("Echo", "Pong");
        assert_eq!(err.code(), RpcError::METHOD_NOT_FOUND);
        assert!(err.reason().contains("Echo") && err.reason().contains("Pong"));
    }

    #[test]
    fn descriptor_builds_request_meta() {
        const PING: MethodDescriptor = MethodDescriptor::new("Echo", "Ping");
        assert_eq!(PING.to_string(), "Echo.Ping");
        assert_eq!(PING, MethodDescriptor::owned("Echo", "Ping"));
        let meta = PING.to_request_meta();
        assert_eq!(meta.service_name, "Echo");
        assert_eq!(meta.method_name, "Ping");
    }
}
