mod chat;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use vsock::VMADDR_CID_ANY;
use xlink::{Acceptor, ChannelConfig, Driver, Listener, ServerConfig};

use crate::chat::ChatRoom;

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "Chat room hosted on a round-robin xlink server")]
struct Args {
    /// TCP port to listen on (all IPv4 interfaces)
    #[arg(short, long, default_value_t = 1234)]
    port: u16,

    /// Listen on a Unix domain socket instead
    #[arg(long, conflicts_with = "vsock_port")]
    unix: Option<PathBuf>,

    /// Listen on a vsock port (any CID) instead
    #[arg(long)]
    vsock_port: Option<u32>,

    /// Sleep between ticks, in milliseconds
    #[arg(long)]
    idle_sleep_ms: Option<u64>,

    /// Drop clients that take longer than this to send their token
    #[arg(long)]
    handshake_timeout_ms: Option<u64>,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let channel = ChannelConfig::default()
            .with_handshake_timeout(self.handshake_timeout_ms.map(Duration::from_millis));
        ServerConfig::default()
            .with_channel(channel)
            .with_idle_sleep(self.idle_sleep_ms.map(Duration::from_millis))
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.server_config();

    if let Some(path) = &args.unix {
        serve(Listener::bind_unix(path, config))
    } else if let Some(port) = args.vsock_port {
        serve(Listener::bind_vsock(VMADDR_CID_ANY, port, config))
    } else {
        serve(Listener::bind_tcp(
            ([0, 0, 0, 0], args.port).into(),
            config,
        ))
    }
}

fn serve<A: Acceptor>(listener: Listener<A>) -> ExitCode {
    if let Some(reason) = listener.fail_reason() {
        error!("Server failed to initialize. Reason: {}", reason);
        return ExitCode::FAILURE;
    }

    let mut room = ChatRoom::new();
    let mut driver = Driver::new(listener);
    match driver.run(&mut room) {
        Some(reason) => {
            error!("Server stopped. Reason: {}", reason);
            ExitCode::FAILURE
        }
        None => {
            info!("Server stopped");
            ExitCode::SUCCESS
        }
    }
}
