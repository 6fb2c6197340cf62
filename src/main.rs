//! Demo binary for `lrpc`.
//!
//! Builds a client and a server from the command line options, passes one
//! Echo/Ping call between them through in-memory buffers and logs the result.

mod cli;

use std::process::ExitCode;

use bincode::{Decode, Encode};
use bytes::BytesMut;
use clap::Parser;
use lrpc::{
    ClientConfig,
    MethodDescriptor,
    ProtocolRegistry,
    RpcClient,
    RpcServer,
    ServerConfig,
    ServiceRegistry,
};
use tracing::{error, info};

const PING: MethodDescriptor = MethodDescriptor::new("Echo", "Ping");

#[derive(Debug, Encode, Decode)]
struct Ping {
    message: String,
}

#[derive(Debug, Encode, Decode)]
struct Pong {
    message: String,
}

async fn round_trip(cli: cli::Cli) -> lrpc::Result<Pong> {
    let protocols = ProtocolRegistry::with_defaults();
    let services = ServiceRegistry::new().register(PING, |ping: Ping| {
        Ok(Pong {
            message: ping.message,
        })
    })?;
    let server = RpcServer::new(
        ServerConfig::new()
            .protocol(cli.protocol)
            .max_frame_length(cli.max_frame_length),
        &protocols,
        services,
    )?;
    let client = RpcClient::new(
        ClientConfig::new()
            .protocol(cli.protocol)
            .compress_type(cli.compress)
            .max_frame_length(cli.max_frame_length),
        &protocols,
    )?;

    let (handle, request) = client.prepare_call::<_, Pong>(
        &PING,
        &Ping {
            message: cli.message,
        },
    )?;
    info!(call_id = handle.call_id(), bytes = request.len(), "request encoded");

    let mut inbound = BytesMut::from(&request[..]);
    let mut server_decoder = server.new_decoder();
    let mut outbound = BytesMut::new();
    for response in server.process(server_decoder.as_mut(), &mut inbound)? {
        outbound.extend_from_slice(&response);
    }

    let mut client_decoder = client.new_decoder();
    client.handle_incoming(client_decoder.as_mut(), &mut outbound)?;
    Ok(handle.await?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Enable structured logging for the demo.
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    match round_trip(cli).await {
        Ok(pong) => {
            info!(message = %pong.message, "round trip complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "round trip failed");
            ExitCode::FAILURE
        }
    }
}
