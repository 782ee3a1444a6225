use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use xlink::{handshake, Channel, ChannelConfig, Target, Transport};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Line client for the xlink chat server")]
struct Args {
    /// Server endpoint: IP:PORT, tcp:IP:PORT, unix:PATH or vsock:CID:PORT
    target: Target,

    /// Give up if the server does not answer the handshake in time
    #[arg(long)]
    handshake_timeout_ms: Option<u64>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ChannelConfig::default()
        .with_handshake_timeout(args.handshake_timeout_ms.map(Duration::from_millis));

    info!("Connecting to server at {}...", args.target);
    let mut channel = handshake::connect_target(&args.target, config);
    if let Some(reason) = channel.fail_reason() {
        error!("Client connection failed to initialize. Reason: {}", reason);
        return ExitCode::FAILURE;
    }
    info!("Connected!");

    let lines = spawn_stdin_reader();
    let mut out = io::stdout().lock();

    // Interleave typed lines with whatever the server pushes.
    while channel.is_alive() {
        match lines.try_recv() {
            Ok(line) => {
                channel.send(line.as_bytes());
            }
            Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        match channel.poll_non_blocking() {
            Some(frame) => print_frame(&mut out, &frame),
            None => thread::sleep(POLL_INTERVAL),
        }
    }

    // Stdin is done; keep printing until the server hangs up.
    while channel.is_alive() {
        let frame = channel.receive_blocking();
        if channel.is_alive() {
            print_frame(&mut out, &frame);
        }
    }

    report(&channel)
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_frame(out: &mut impl Write, frame: &[u8]) {
    let _ = writeln!(out, "{}", String::from_utf8_lossy(frame));
    let _ = out.flush();
}

fn report<T: Transport>(channel: &Channel<T>) -> ExitCode {
    match channel.fail_reason() {
        Some(reason) => info!("Disconnected: {}", reason),
        None => info!("Disconnected"),
    }
    ExitCode::SUCCESS
}
