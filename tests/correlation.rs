//! Concurrency of the pending-call registry.
//!
//! A late response and a timeout can fire for the same call at the same
//! instant. Whichever removes the entry first wins; the other must see a
//! no-op and the waiter must complete exactly once.

use std::{
    sync::{Arc, Barrier},
    thread,
};

use bincode::{Decode, Encode};
use lrpc::{
    compress::CompressType,
    correlation::{Completion, PendingCalls},
    rpc::RpcError,
};
use rstest::rstest;

#[derive(Debug, PartialEq, Encode, Decode)]
struct Pong {
    seq: u64,
}

fn success(seq: u64) -> Completion {
    Completion::Success {
        compress_type: CompressType::None,
        body: Some(CompressType::None.compress(&Pong { seq }).expect("compress")),
    }
}

#[test]
fn response_and_timeout_race_has_one_winner() {
    for round in 0..200 {
        let calls = Arc::new(PendingCalls::new());
        let call_id = calls.next_call_id();
        let mut handle = calls.register::<Pong>(call_id).expect("register");
        let barrier = Arc::new(Barrier::new(2));

        let responder = {
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                calls.resolve(call_id, success(round)).expect("resolve")
            })
        };
        let timer = {
            let calls = Arc::clone(&calls);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                calls.fail(call_id, RpcError::timeout(call_id))
            })
        };

        let responded = responder.join().expect("responder thread");
        let timed_out = timer.join().expect("timer thread");
        assert!(responded ^ timed_out, "round {round}: exactly one path must win");
        assert!(calls.is_empty());

        match handle.try_result().expect("handle completed") {
            Ok(pong) => {
                assert!(responded);
                assert_eq!(pong, Pong { seq: round });
            }
            Err(err) => {
                assert!(timed_out);
                assert_eq!(err.code(), RpcError::TIMEOUT);
            }
        }
    }
}

#[rstest]
#[case::calls(1)]
#[case::many_calls(64)]
fn concurrent_registrations_get_distinct_ids(#[case] per_thread: usize) {
    let calls = Arc::new(PendingCalls::new());
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let calls = Arc::clone(&calls);
            thread::spawn(move || {
                (0..per_thread)
                    .map(|_| calls.register_next::<Pong>())
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let handles: Vec<_> = workers
        .into_iter()
        .flat_map(|worker| worker.join().expect("worker thread"))
        .collect();

    let mut ids: Vec<u64> = handles.iter().map(|handle| handle.call_id()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4 * per_thread);
    assert_eq!(calls.len(), 4 * per_thread);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_fails_waiters_across_tasks() {
    let calls = Arc::new(PendingCalls::new());
    let handles: Vec<_> = (0..8).map(|_| calls.register_next::<Pong>()).collect();
    let waiters: Vec<_> = handles.into_iter().map(tokio::spawn).collect();

    assert_eq!(calls.fail_all(&RpcError::connection_closed()), 8);

    let outcomes = futures::future::join_all(waiters).await;
    for outcome in outcomes {
        let err = outcome.expect("task").expect_err("connection closed");
        assert_eq!(err.code(), RpcError::CONNECTION_CLOSED);
    }
    assert!(calls.is_empty());
}
