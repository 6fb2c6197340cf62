//! Command line interface for the `lrpc` demo binary.

use clap::Parser;
use lrpc::{CompressType, ProtocolType};

/// Command line arguments for the `lrpc` binary.
#[derive(Debug, Parser)]
#[command(name = "lrpc", version, about = "Run an in-memory LRPC round trip")]
pub struct Cli {
    /// Wire protocol to use.
    #[arg(long, default_value = "lite_rpc")]
    pub protocol: ProtocolType,

    /// Compression applied to call bodies.
    #[arg(long, default_value = "lz4")]
    pub compress: CompressType,

    /// Largest accepted frame body in bytes; 0 selects the default.
    #[arg(long, default_value_t = 0)]
    pub max_frame_length: usize,

    /// Text sent in the ping.
    #[arg(short, long, default_value = "hello")]
    pub message: String,
}
