//! Raw token exchange that turns a fresh stream into a usable [`Channel`].
//!
//! ```text
//! Client -> Server: "i-am-a-dwarf"
//! Server -> Client: "and-i-am-digging-a-hole"
//! ```
//!
//! Both tokens are written raw, before any framing. A mismatch on either side
//! leaves a dead channel; there is no retry.

use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::Duration;

use log::{debug, warn};

use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::error::{FailReason, Result};
use crate::transport::{Target, Transport};

/// Token a client sends to introduce itself.
pub const CLIENT_TOKEN: &[u8] = b"i-am-a-dwarf";

/// Token a server answers with once the client token checked out.
pub const SERVER_TOKEN: &[u8] = b"and-i-am-digging-a-hole";

/// Connects to `address:port` over TCP and verifies the server.
pub fn connect(address: &str, port: u16) -> Channel<TcpStream> {
    connect_with_config(address, port, ChannelConfig::default())
}

pub fn connect_with_config(address: &str, port: u16, config: ChannelConfig) -> Channel<TcpStream> {
    let Ok(ip) = address.parse::<IpAddr>() else {
        warn!("Invalid address '{}'", address);
        return Channel::failed(None, None, FailReason::InvalidAddress, config);
    };

    match TcpStream::connect(SocketAddr::new(ip, port)) {
        Ok(stream) => as_client(stream, config),
        Err(e) => {
            warn!("Connection to {}:{} failed: {}", ip, port, e);
            Channel::failed(None, None, FailReason::ConnectionFailed, config)
        }
    }
}

/// Connects to any supported endpoint and verifies the server.
pub fn connect_target(target: &Target, config: ChannelConfig) -> Channel<Box<dyn Transport>> {
    match target.connect() {
        Ok(stream) => as_client(stream, config),
        Err(e) => {
            warn!("Connection to {} failed: {}", target, e);
            Channel::failed(None, None, FailReason::ConnectionFailed, config)
        }
    }
}

/// Runs the client side of the exchange on an already connected stream.
pub fn as_client<T: Transport>(mut transport: T, config: ChannelConfig) -> Channel<T> {
    match with_timeout(&mut transport, config.handshake_timeout, client_exchange) {
        Ok(()) => {
            debug!("Server verified");
            Channel::established(transport, None, config)
        }
        Err(reason) => {
            warn!("Handshake with server failed: {}", reason);
            Channel::failed(Some(transport), None, reason, config)
        }
    }
}

/// Runs the server side of the exchange on an accepted stream.
///
/// Blocks until the peer has sent its token, the read times out or the peer
/// goes away. On mismatch no response is sent.
pub fn as_server<T: Transport>(mut transport: T, name: String, config: ChannelConfig) -> Channel<T> {
    match with_timeout(&mut transport, config.handshake_timeout, server_exchange) {
        Ok(()) => {
            debug!("{} verified", name);
            Channel::established(transport, Some(name), config)
        }
        Err(reason) => {
            warn!("{}: {}", name, reason);
            Channel::failed(Some(transport), Some(name), reason, config)
        }
    }
}

fn client_exchange<T: Transport>(transport: &mut T) -> Result<()> {
    transport
        .write_all(CLIENT_TOKEN)
        .and_then(|()| transport.flush())
        .map_err(|_| FailReason::VerificationSend)?;

    let response = read_token(transport, SERVER_TOKEN.len()).map_err(|e| {
        debug!("Reading verification response: {}", e);
        FailReason::VerificationResponse
    })?;

    if response != SERVER_TOKEN {
        debug!("Unexpected server token {:?}", String::from_utf8_lossy(&response));
        return Err(FailReason::InvalidVerification);
    }
    Ok(())
}

fn server_exchange<T: Transport>(transport: &mut T) -> Result<()> {
    match read_token(transport, CLIENT_TOKEN.len()) {
        Ok(token) if token == CLIENT_TOKEN => {}
        Ok(token) => {
            debug!("Unexpected client token {:?}", String::from_utf8_lossy(&token));
            return Err(FailReason::ClientVerification);
        }
        Err(e) => {
            debug!("Reading client token: {}", e);
            return Err(FailReason::ClientVerification);
        }
    }

    transport
        .write_all(SERVER_TOKEN)
        .and_then(|()| transport.flush())
        .map_err(|_| FailReason::ConnectionBroken)
}

/// One blocking read of at most `len` bytes.
///
/// A short read is returned as is and fails the comparison, so a peer holding
/// back part of its token is rejected instead of waited on. Capping the read
/// at `len` keeps a frame sent right behind the token in the stream.
fn read_token<T: Transport>(transport: &mut T, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let n = loop {
        match transport.read(&mut buf) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => break n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    };
    buf.truncate(n);
    Ok(buf)
}

fn with_timeout<T, F>(transport: &mut T, timeout: Option<Duration>, exchange: F) -> Result<()>
where
    T: Transport,
    F: FnOnce(&mut T) -> Result<()>,
{
    if timeout.is_none() {
        return exchange(transport);
    }

    transport
        .set_read_timeout(timeout)
        .map_err(|_| FailReason::ConnectionBroken)?;
    let outcome = exchange(transport);
    if transport.set_read_timeout(None).is_err() {
        return Err(FailReason::ConnectionBroken);
    }
    outcome
}
