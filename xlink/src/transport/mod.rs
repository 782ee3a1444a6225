//! Transport layer abstraction.
//!
//! Channels and listeners are generic over the stream sockets they drive, so
//! the same framing and hosting code runs over TCP, Unix domain sockets and
//! vsock.
//!
//! # Implementations
//!
//! - `TcpStream` / `TcpListener`
//! - `UnixStream` / `UnixListener`
//! - `VsockStream` / `VsockListener`
//! - `Box<dyn Transport>`, for callers choosing the endpoint at runtime

mod target;

pub use target::Target;

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::os::unix::net::{UnixListener, UnixStream};
use std::time::Duration;

use vsock::{VsockListener, VsockStream};

/// A bidirectional byte stream a [`Channel`](crate::Channel) can own.
///
/// Besides plain reads and writes the stream has to support switching between
/// blocking and non-blocking mode, an optional read timeout and an explicit
/// shutdown.
pub trait Transport: Read + Write {
    /// Switches the stream in or out of non-blocking mode.
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;

    /// Bounds blocking reads. `None` blocks indefinitely.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Shuts down both halves of the stream.
    fn shutdown(&self) -> io::Result<()>;
}

/// A listening endpoint producing [`Transport`] streams.
pub trait Acceptor {
    type Stream: Transport;

    /// Accepts one pending connection.
    ///
    /// Returns the stream together with a printable peer address. Fails with
    /// `ErrorKind::WouldBlock` when the acceptor is non-blocking and nobody is
    /// waiting.
    fn accept_stream(&self) -> io::Result<(Self::Stream, String)>;

    /// Switches the acceptor in or out of non-blocking mode.
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

impl Transport for UnixStream {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        UnixStream::set_nonblocking(self, nonblocking)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        UnixStream::shutdown(self, Shutdown::Both)
    }
}

impl Transport for VsockStream {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        VsockStream::set_nonblocking(self, nonblocking)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        VsockStream::set_read_timeout(self, timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        VsockStream::shutdown(self, Shutdown::Both)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        (**self).set_nonblocking(nonblocking)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_read_timeout(timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        (**self).shutdown()
    }
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    fn accept_stream(&self) -> io::Result<(TcpStream, String)> {
        let (stream, peer) = self.accept()?;
        Ok((stream, peer.to_string()))
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        TcpListener::set_nonblocking(self, nonblocking)
    }
}

impl Acceptor for UnixListener {
    type Stream = UnixStream;

    fn accept_stream(&self) -> io::Result<(UnixStream, String)> {
        let (stream, peer) = self.accept()?;
        Ok((stream, format!("{:?}", peer)))
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        UnixListener::set_nonblocking(self, nonblocking)
    }
}

impl Acceptor for VsockListener {
    type Stream = VsockStream;

    fn accept_stream(&self) -> io::Result<(VsockStream, String)> {
        let (stream, peer) = self.accept()?;
        Ok((stream, format!("{:?}", peer)))
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        VsockListener::set_nonblocking(self, nonblocking)
    }
}
