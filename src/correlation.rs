//! Client-side registry of outstanding calls.
//!
//! [`PendingCalls`] maps a call id to the sender half of a one-shot channel.
//! Three paths touch it concurrently: the request path inserts, the response
//! path removes and resolves, and a timeout or teardown path removes and
//! fails. Every completion starts with an atomic [`DashMap::remove`], so for
//! any call id exactly one of them wins and the others observe a no-op.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicU64, Ordering},
    task::{Context, Poll},
};

use bytes::Bytes;
use dashmap::{DashMap, mapref::entry::Entry};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use crate::{
    compress::{CompressError, CompressType},
    message::Message,
    rpc::RpcError,
};

/// Errors raised when registering a call.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum CorrelationError {
    /// A call with this id is already awaiting a response.
    #[error("call id {0} is already pending")]
    DuplicateCallId(u64),
}

/// Result delivered to a pending call.
#[derive(Clone, Debug)]
pub enum Completion {
    /// Successful response with a possibly compressed body.
    Success {
        /// Compression applied to `body`.
        compress_type: CompressType,
        /// Encoded result. `None` decodes as a zero-length message.
        body: Option<Bytes>,
    },
    /// The call failed.
    Failure(RpcError),
}

type Completer = Box<dyn FnOnce(Completion) -> Result<(), CompressError> + Send + Sync>;

/// Concurrent map from call id to pending result.
pub struct PendingCalls {
    calls: DashMap<u64, Completer>,
    next_id: AtomicU64,
}

impl Default for PendingCalls {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for PendingCalls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCalls")
            .field("pending", &self.calls.len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl PendingCalls {
    /// Create an empty registry. Generated call ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate the next call id.
    #[must_use]
    pub fn next_call_id(&self) -> u64 { self.next_id.fetch_add(1, Ordering::Relaxed) }

    /// Register a pending call whose result decodes as `R`.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::DuplicateCallId`] if `call_id` is already
    /// pending. The existing entry is left untouched.
    pub fn register<R>(&self, call_id: u64) -> Result<PendingHandle<R>, CorrelationError>
    where
        R: Message + Send + 'static,
    {
        match self.calls.entry(call_id) {
            Entry::Occupied(_) => Err(CorrelationError::DuplicateCallId(call_id)),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(completer::<R>(call_id, tx));
                debug!(call_id, "registered pending call");
                Ok(PendingHandle { call_id, rx })
            }
        }
    }

    /// Register a pending call under a freshly allocated id.
    #[must_use]
    pub fn register_next<R>(&self) -> PendingHandle<R>
    where
        R: Message + Send + 'static,
    {
        loop {
            if let Ok(handle) = self.register(self.next_call_id()) {
                return handle;
            }
        }
    }

    /// Complete `call_id` with `completion`.
    ///
    /// Returns `Ok(false)` when no call with this id is pending, because it
    /// already completed, timed out or was never registered.
    ///
    /// # Errors
    ///
    /// Returns [`CompressError`] if a successful body cannot be decoded as the
    /// registered result type. The waiter still completes, with
    /// [`RpcError::BAD_RESPONSE`].
    pub fn resolve(&self, call_id: u64, completion: Completion) -> Result<bool, CompressError> {
        let Some((_, complete)) = self.calls.remove(&call_id) else {
            return Ok(false);
        };
        complete(completion)?;
        Ok(true)
    }

    /// Fail `call_id` with `error`. Returns false if the call was not pending.
    pub fn fail(&self, call_id: u64, error: RpcError) -> bool {
        self.calls
            .remove(&call_id)
            .map(|(_, complete)| complete(Completion::Failure(error)))
            .is_some()
    }

    /// Forget `call_id` without a result. Its handle resolves to
    /// [`RpcError::CANCELLED`]. Returns false if the call was not pending.
    pub fn remove(&self, call_id: u64) -> bool { self.calls.remove(&call_id).is_some() }

    /// Fail every pending call, typically on connection teardown. Returns the
    /// number of calls failed by this invocation.
    pub fn fail_all(&self, error: &RpcError) -> usize {
        let ids: Vec<u64> = self.calls.iter().map(|entry| *entry.key()).collect();
        let failed = ids
            .into_iter()
            .filter(|id| self.fail(*id, error.clone()))
            .count();
        if failed > 0 {
            debug!(failed, code = error.code(), "failed pending calls");
        }
        failed
    }

    /// Returns true if `call_id` is awaiting a response.
    #[must_use]
    pub fn contains(&self, call_id: u64) -> bool { self.calls.contains_key(&call_id) }

    /// Number of pending calls.
    #[must_use]
    pub fn len(&self) -> usize { self.calls.len() }

    /// Returns true when no calls are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.calls.is_empty() }
}

fn completer<R>(call_id: u64, tx: oneshot::Sender<Result<R, RpcError>>) -> Completer
where
    R: Message + Send + 'static,
{
    Box::new(move |completion: Completion| -> Result<(), CompressError> {
        let (outcome, status) = match completion {
            Completion::Success {
                compress_type,
                body,
            } => match compress_type.decompress::<R>(body.as_deref().unwrap_or_default()) {
                Ok(result) => (Ok(result), Ok(())),
                Err(e) => (Err(RpcError::bad_response(&e)), Err(e)),
            },
            Completion::Failure(error) => (Err(error), Ok(())),
        };
        if tx.send(outcome).is_err() {
            debug!(call_id, "pending handle dropped before completion");
        }
        status
    })
}

/// Awaitable result of a registered call.
///
/// Resolves once the call completes. If the call is removed without a result,
/// it resolves to [`RpcError::CANCELLED`].
#[must_use = "dropping the handle discards the call result"]
pub struct PendingHandle<R> {
    call_id: u64,
    rx: oneshot::Receiver<Result<R, RpcError>>,
}

impl<R> PendingHandle<R> {
    /// Call id this handle waits on.
    #[must_use]
    pub fn call_id(&self) -> u64 { self.call_id }

    /// Take the result if the call has already completed.
    pub fn try_result(&mut self) -> Option<Result<R, RpcError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(RpcError::cancelled(self.call_id))),
        }
    }
}

impl<R> fmt::Debug for PendingHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingHandle")
            .field("call_id", &self.call_id)
            .finish_non_exhaustive()
    }
}

impl<R> Future for PendingHandle<R> {
    type Output = Result<R, RpcError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(RpcError::cancelled(this.call_id))))
    }
}

#[cfg(test)]
mod tests {
    use bincode::{Decode, Encode};
    use rstest::{fixture, rstest};

    use super::*;

    #[derive(Debug, PartialEq, Encode, Decode)]
    struct Pong {
        seq: u32,
    }

    #[fixture]
    fn calls() -> PendingCalls { PendingCalls::new() }

    fn success(seq: u32, compress_type: CompressType) -> Completion {
        Completion::Success {
            compress_type,
            body: Some(compress_type.compress(&Pong { seq }).expect("compress")),
        }
    }

    #[rstest]
    fn ids_start_at_one_and_increase(calls: PendingCalls) {
        assert_eq!(calls.next_call_id(), 1);
        assert_eq!(calls.next_call_id(), 2);
        let handle = calls.register_next::<Pong>();
        assert_eq!(handle.call_id(), 3);
    }

    #[rstest]
    fn duplicate_registration_is_rejected(calls: PendingCalls) {
        let _first = calls.register::<Pong>(7).expect("first");
        let err = calls.register::<Pong>(7).expect_err("duplicate");
        assert_eq!(err, CorrelationError::DuplicateCallId(7));
        assert_eq!(calls.len(), 1);
    }

    #[rstest]
    #[case::none(CompressType::None)]
    #[case::gzip(CompressType::Gzip)]
    #[case::lz4(CompressType::Lz4)]
    fn resolve_delivers_decoded_result(calls: PendingCalls, #[case] ty: CompressType) {
        let mut handle = calls.register::<Pong>(1).expect("register");
        assert!(handle.try_result().is_none());
        assert!(calls.resolve(1, success(9, ty)).expect("resolve"));
        assert_eq!(handle.try_result(), Some(Ok(Pong { seq: 9 })));
        assert!(calls.is_empty());
    }

    #[rstest]
    fn second_completion_is_a_no_op(calls: PendingCalls) {
        let mut handle = calls.register::<Pong>(5).expect("register");
        assert!(calls.fail(5, RpcError::timeout(5)));
        assert!(!calls.resolve(5, success(1, CompressType::None)).expect("resolve"));
        assert!(!calls.fail(5, RpcError::timeout(5)));
        assert!(!calls.remove(5));
        let err = handle.try_result().expect("completed").expect_err("timed out");
        assert_eq!(err.code(), RpcError::TIMEOUT);
    }

    #[rstest]
    fn undecodable_body_fails_the_waiter(calls: PendingCalls) {
        let mut handle = calls.register::<Pong>(3).expect("register");
        let completion = Completion::Success {
            compress_type: CompressType::Lz4,
            body: Some(Bytes::from_static(&[0x10, 0, 0, 0, 0xff])),
        };
        assert!(calls.resolve(3, completion).is_err());
        let err = handle.try_result().expect("completed").expect_err("bad body");
        assert_eq!(err.code(), RpcError::BAD_RESPONSE);
        assert!(!calls.contains(3));
    }

    #[rstest]
    fn removed_call_resolves_to_cancelled(calls: PendingCalls) {
        let mut handle = calls.register::<Pong>(4).expect("register");
        assert!(calls.remove(4));
        let err = handle.try_result().expect("closed").expect_err("cancelled");
        assert_eq!(err.code(), RpcError::CANCELLED);
    }

    #[rstest]
    fn dropped_handle_does_not_break_resolution(calls: PendingCalls) {
        drop(calls.register::<Pong>(6).expect("register"));
        assert!(calls.resolve(6, success(1, CompressType::None)).expect("resolve"));
    }

    #[rstest]
    fn fail_all_drains_registry(calls: PendingCalls) {
        let handles: Vec<_> = (1..=3)
            .map(|id| calls.register::<Pong>(id).expect("register"))
            .collect();
        assert_eq!(calls.fail_all(&RpcError::connection_closed()), 3);
        assert!(calls.is_empty());
        for mut handle in handles {
            let err = handle.try_result().expect("failed").expect_err("closed");
            assert_eq!(err.code(), RpcError::CONNECTION_CLOSED);
        }
        assert_eq!(calls.fail_all(&RpcError::connection_closed()), 0);
    }

    #[tokio::test]
    async fn handle_awaits_completion() {
        let calls = std::sync::Arc::new(PendingCalls::new());
        let handle = calls.register::<Pong>(11).expect("register");
        let resolver = std::sync::Arc::clone(&calls);
        tokio::spawn(async move {
            resolver
                .resolve(11, success(2, CompressType::Gzip))
                .expect("resolve")
        });
        assert_eq!(handle.await, Ok(Pong { seq: 2 }));
    }
}
