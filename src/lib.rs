#![doc(html_root_url = "https://docs.rs/lrpc/latest")]
//! Public API for the `lrpc` library.
//!
//! `lrpc` implements a length-prefixed binary RPC wire protocol: a streaming
//! frame codec with overlong-frame discard, pluggable body compression,
//! client-side call correlation and a protocol dispatcher. Sockets, retries
//! and timeouts belong to the caller; this crate only turns calls into bytes
//! and bytes back into results.

pub mod byte_order;
pub mod client;
pub mod codec;
pub mod compress;
pub mod config;
pub mod correlation;
pub mod error;
pub mod message;
pub mod metrics;
pub mod packet;
pub mod protocol;
pub mod rpc;
pub mod server;
pub mod service;

pub use client::RpcClient;
pub use codec::{CodecError, FrameCodec, FrameDecoder, FrameEncoder};
pub use compress::CompressType;
pub use config::{ClientConfig, ServerConfig};
pub use correlation::{PendingCalls, PendingHandle};
pub use error::{Error, Result};
pub use message::Message;
pub use metrics::{ERRORS_TOTAL, FRAMES_DISCARDED, FRAMES_PROCESSED, RESPONSES_DROPPED};
pub use packet::{Meta, Packet};
pub use protocol::{LrpcProtocol, Protocol, ProtocolRegistry, ProtocolType};
pub use rpc::{MethodDescriptor, RpcError};
pub use server::RpcServer;
pub use service::ServiceRegistry;
