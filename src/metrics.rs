//! Metric helpers for `lrpc`.
//!
//! Names and thin wrappers around the [`metrics`](https://docs.rs/metrics)
//! crate. Without the `metrics` feature the helpers compile to no-ops.

#[cfg(feature = "metrics")]
use metrics::counter;

/// Name of the counter tracking encoded and decoded frames.
pub const FRAMES_PROCESSED: &str = "lrpc_frames_processed_total";
/// Name of the counter tracking overlong frames dropped by decoders.
pub const FRAMES_DISCARDED: &str = "lrpc_frames_discarded_total";
/// Name of the counter tracking responses with no pending call.
pub const RESPONSES_DROPPED: &str = "lrpc_responses_dropped_total";
/// Name of the counter tracking fatal decode errors.
pub const ERRORS_TOTAL: &str = "lrpc_errors_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames decoded from the wire.
    Inbound,
    /// Frames encoded for the wire.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Record a processed frame for the given direction.
#[cfg(feature = "metrics")]
pub fn inc_frames(direction: Direction) {
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
}

/// Record an overlong frame being dropped.
#[cfg(feature = "metrics")]
pub fn inc_discarded_frames() { counter!(FRAMES_DISCARDED).increment(1); }

/// Record a response arriving after its call was removed.
#[cfg(feature = "metrics")]
pub fn inc_dropped_responses() { counter!(RESPONSES_DROPPED).increment(1); }

/// Record a fatal decode error, labelled with its category.
#[cfg(feature = "metrics")]
pub fn inc_errors(error_type: &'static str) {
    counter!(ERRORS_TOTAL, "error_type" => error_type).increment(1);
}

#[cfg(not(feature = "metrics"))]
pub fn inc_frames(_direction: Direction) {}

#[cfg(not(feature = "metrics"))]
pub fn inc_discarded_frames() {}

#[cfg(not(feature = "metrics"))]
pub fn inc_dropped_responses() {}

#[cfg(not(feature = "metrics"))]
pub fn inc_errors(_error_type: &'static str) {}
