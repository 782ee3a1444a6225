//! # XLink - Framed Channels over Stream Sockets
//!
//! XLink turns a byte stream (TCP, Unix domain or vsock) into a channel of
//! discrete messages and provides a single-threaded server that polls all of
//! its clients in turn:
//!
//! - **Framing**: every message is a 4-byte big-endian length followed by the payload
//! - **Handshake**: a fixed token exchange before the first frame
//! - **Failure latching**: the first error kills a channel for good
//! - **Round-robin server**: accept at most one client per tick, then visit everyone
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Application Layer                     │
//! │                      (TickHandler)                       │
//! ├─────────────────────────────────────────────────────────┤
//! │                      Server Layer                        │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────┐   │
//! │  │   Driver    │ │  Listener   │ │    Registry     │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────┘   │
//! ├─────────────────────────────────────────────────────────┤
//! │                     Channel Layer                        │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────┐   │
//! │  │  Handshake  │ │   Channel   │ │   FrameReader   │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────┘   │
//! ├─────────────────────────────────────────────────────────┤
//! │                    Transport Layer                       │
//! │  ┌─────────────────────────────────────────────────┐   │
//! │  │        TcpStream / UnixStream / VsockStream      │   │
//! │  └─────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use xlink::handshake;
//!
//! let mut channel = handshake::connect("127.0.0.1", 1234);
//! if !channel.is_alive() {
//!     panic!("{}", channel.fail_reason().unwrap());
//! }
//!
//! channel.send(b"hello");
//! let reply = channel.receive_blocking();
//! ```

#![deny(unsafe_code)]

pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod listener;
pub mod registry;
pub mod transport;

// Re-export commonly used types
pub use channel::Channel;
pub use config::{ChannelConfig, ServerConfig};
pub use driver::{Driver, TickHandler, TickReport};
pub use error::{FailReason, TargetParseError};
pub use frame::{encode_frame, FrameError, FrameReader, LENGTH_PREFIX_SIZE};
pub use handshake::{CLIENT_TOKEN, SERVER_TOKEN};
pub use listener::{Accepted, Listener};
pub use registry::Registry;
pub use transport::{Acceptor, Target, Transport};
