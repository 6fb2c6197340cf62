//! Server-side table of invocable methods.
//!
//! Handlers are registered explicitly at startup against a
//! [`MethodDescriptor`]. Each registration records how to decode the
//! arguments and how to call the handler, so inbound requests are dispatched
//! without any runtime type introspection.

use std::{any::Any, collections::HashMap, fmt, sync::Arc};

use thiserror::Error;
use tracing::warn;

use crate::{
    compress::{CompressError, CompressType},
    message::{EncodeMessage, Message},
    packet::RequestMeta,
    rpc::{BoundCall, InboundRequest, MethodDescriptor, RpcError},
};

/// Errors raised while building a [`ServiceRegistry`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A handler for this method has already been registered.
    #[error("method {0} is already registered")]
    DuplicateMethod(MethodDescriptor),
}

type ArgDecoder =
    Box<dyn Fn(CompressType, &[u8]) -> Result<Box<dyn Any + Send>, CompressError> + Send + Sync>;
type Invoker =
    Box<dyn Fn(Box<dyn Any + Send>) -> Result<Box<dyn EncodeMessage>, RpcError> + Send + Sync>;

/// A registered handler with its argument and result types.
pub struct MethodTarget {
    descriptor: MethodDescriptor,
    arg_type: &'static str,
    result_type: &'static str,
    decode_args: ArgDecoder,
    invoke: Invoker,
}

impl MethodTarget {
    fn new<A, R, F>(descriptor: MethodDescriptor, handler: F) -> Self
    where
        A: Message + Send + 'static,
        R: Message + Send + Sync + 'static,
        F: Fn(A) -> Result<R, RpcError> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            arg_type: std::any::type_name::<A>(),
            result_type: std::any::type_name::<R>(),
            decode_args: Box::new(
                |compress_type: CompressType,
                 body: &[u8]|
                 -> Result<Box<dyn Any + Send>, CompressError> {
                    let args: A = compress_type.decompress(body)?;
                    Ok(Box::new(args))
                },
            ),
            invoke: Box::new(
                move |args: Box<dyn Any + Send>| -> Result<Box<dyn EncodeMessage>, RpcError> {
                    let args = args.downcast::<A>().map_err(|_| {
                        RpcError::internal(format!(
                            "arguments are not {}",
                            std::any::type_name::<A>()
                        ))
                    })?;
                    let result = handler(*args)?;
                    Ok(Box::new(result))
                },
            ),
        }
    }

    /// Method this target serves.
    #[must_use]
    pub fn descriptor(&self) -> &MethodDescriptor { &self.descriptor }

    /// Declared argument type name.
    #[must_use]
    pub fn arg_type(&self) -> &'static str { self.arg_type }

    /// Declared result type name.
    #[must_use]
    pub fn result_type(&self) -> &'static str { self.result_type }

    pub(crate) fn invoke(
        &self,
        args: Box<dyn Any + Send>,
    ) -> Result<Box<dyn EncodeMessage>, RpcError> {
        (self.invoke)(args)
    }
}

impl fmt::Debug for MethodTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTarget")
            .field("descriptor", &self.descriptor)
            .field("arg_type", &self.arg_type)
            .field("result_type", &self.result_type)
            .finish_non_exhaustive()
    }
}

/// Lookup table from `(service_name, method_name)` to [`MethodTarget`].
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, HashMap<String, Arc<MethodTarget>>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register `handler` for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateMethod`] if the method already has a
    /// handler.
    pub fn register<A, R, F>(
        mut self,
        descriptor: MethodDescriptor,
        handler: F,
    ) -> Result<Self, RegistryError>
    where
        A: Message + Send + 'static,
        R: Message + Send + Sync + 'static,
        F: Fn(A) -> Result<R, RpcError> + Send + Sync + 'static,
    {
        let methods = self
            .services
            .entry(descriptor.service_name().to_owned())
            .or_default();
        if methods.contains_key(descriptor.method_name()) {
            return Err(RegistryError::DuplicateMethod(descriptor));
        }
        methods.insert(
            descriptor.method_name().to_owned(),
            Arc::new(MethodTarget::new(descriptor, handler)),
        );
        Ok(self)
    }

    /// Find the target for a service and method.
    #[must_use]
    pub fn lookup(&self, service_name: &str, method_name: &str) -> Option<&Arc<MethodTarget>> {
        self.services.get(service_name)?.get(method_name)
    }

    /// Number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize { self.services.values().map(HashMap::len).sum() }

    /// Returns true when no methods are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Descriptors of every registered method.
    pub fn methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.services
            .values()
            .flat_map(HashMap::values)
            .map(|target| target.descriptor())
    }

    /// Resolve a decoded request against the table.
    ///
    /// A miss is not an error: the returned request is unbound and invoking it
    /// produces a [`RpcError::METHOD_NOT_FOUND`] response.
    ///
    /// # Errors
    ///
    /// Returns [`CompressError`] if the body cannot be decoded as the target's
    /// argument type.
    pub fn bind(
        &self,
        call_id: u64,
        compress_type: CompressType,
        target: RequestMeta,
        body: &[u8],
    ) -> Result<InboundRequest, CompressError> {
        let Some(method) = self.lookup(&target.service_name, &target.method_name) else {
            warn!(
                call_id,
                service = %target.service_name,
                method = %target.method_name,
                "no handler registered for request"
            );
            let error = RpcError::method_not_found(&target.service_name, &target.method_name);
            return Ok(InboundRequest::new(call_id, compress_type, target, Err(error)));
        };
        let args = (method.decode_args)(compress_type, body)?;
        let bound = BoundCall {
            method: Arc::clone(method),
            args,
        };
        Ok(InboundRequest::new(call_id, compress_type, target, Ok(bound)))
    }
}

#[cfg(test)]
mod tests {
    use bincode::{Decode, Encode};
    use rstest::{fixture, rstest};

    use super::*;

    #[derive(Debug, PartialEq, Encode, Decode)]
    struct Ping {}

    #[derive(Debug, PartialEq, Encode, Decode)]
    struct Pong {
        greeting: String,
    }

    const PING: MethodDescriptor = MethodDescriptor::new("Echo", "Ping");

    #[fixture]
    fn registry() -> ServiceRegistry {
        ServiceRegistry::new()
            .register(PING, |_: Ping| {
                Ok(Pong {
                    greeting: "pong".into(),
                })
            })
            .expect("register")
    }

    fn target(service: &str, method: &str) -> RequestMeta {
        RequestMeta {
            service_name: service.into(),
            method_name: method.into(),
        }
    }

    #[rstest]
    fn lookup_exposes_declared_types(registry: ServiceRegistry) {
        let method = registry.lookup("Echo", "Ping").expect("registered");
        assert!(method.arg_type().ends_with("Ping"));
        assert!(method.result_type().ends_with("Pong"));
        assert_eq!(method.descriptor(), &PING);
        assert!(registry.lookup("Echo", "Pong").is_none());
        assert!(registry.lookup("Other", "Ping").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[rstest]
    fn duplicate_method_is_rejected(registry: ServiceRegistry) {
        let err = registry
            .register(PING, |_: Ping| Ok(Ping {}))
            .expect_err("duplicate");
        assert_eq!(err, RegistryError::DuplicateMethod(PING));
    }

    #[rstest]
    fn same_method_name_on_other_service_is_allowed(registry: ServiceRegistry) {
        let registry = registry
            .register(MethodDescriptor::new("Health", "Ping"), |_: Ping| Ok(Ping {}))
            .expect("different service");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.methods().count(), 2);
    }

    #[rstest]
    fn bound_request_invokes_handler(registry: ServiceRegistry) {
        let request = registry
            .bind(1, CompressType::None, target("Echo", "Ping"), &[])
            .expect("bind");
        assert!(request.is_bound());
        assert_eq!(request.args::<Ping>(), Some(&Ping {}));
        let response = request.invoke();
        let bytes = response
            .outcome
            .expect("handler succeeds")
            .encode_message()
            .expect("encode");
        let pong = Pong::from_exact_bytes(&bytes).expect("decode");
        assert_eq!(pong.greeting, "pong");
    }

    #[rstest]
    fn unknown_method_yields_error_response(registry: ServiceRegistry) {
        let request = registry
            .bind(2, CompressType::Gzip, target("Echo", "Pong"), &[])
            .expect("a miss is not a bind error");
        assert!(!request.is_bound());
        let response = request.invoke();
        assert_eq!(response.call_id, 2);
        assert_eq!(response.compress_type, CompressType::Gzip);
        let err = response.outcome.expect_err("method not found");
        assert_eq!(err.code(), RpcError::METHOD_NOT_FOUND);
    }

    #[rstest]
    fn undecodable_args_fail_binding(registry: ServiceRegistry) {
        let err = registry
            .bind(3, CompressType::Lz4, target("Echo", "Ping"), &[0x10, 0, 0, 0, 0xff])
            .expect_err("corrupt args");
        assert!(!err.is_fatal());
    }

    #[test]
    fn handler_errors_reach_the_response() {
        let registry = ServiceRegistry::new()
            .register(PING, |_: Ping| -> Result<Ping, RpcError> {
                Err(RpcError::bad_request("no pings today"))
            })
            .expect("register");
        let response = registry
            .bind(4, CompressType::None, target("Echo", "Ping"), &[])
            .expect("bind")
            .invoke();
        let err = response.outcome.expect_err("handler error");
        assert_eq!(err.code(), RpcError::BAD_REQUEST);
        assert_eq!(err.reason(), "no pings today");
    }
}
