use core::fmt;
use core::str::FromStr;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

use vsock::{VsockAddr, VsockStream};

use super::Transport;
use crate::error::TargetParseError;

/// A stream endpoint to connect to or listen on.
///
/// Textual form: `tcp:IP:PORT` (or bare `IP:PORT`), `unix:PATH`,
/// `vsock:CID:PORT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Tcp(SocketAddr),
    Unix(PathBuf),
    Vsock { cid: u32, port: u32 },
}

impl Target {
    /// Opens a blocking stream to the endpoint.
    pub fn connect(&self) -> io::Result<Box<dyn Transport>> {
        let stream: Box<dyn Transport> = match self {
            Target::Tcp(addr) => Box::new(TcpStream::connect(addr)?),
            Target::Unix(path) => Box::new(UnixStream::connect(path)?),
            Target::Vsock { cid, port } => {
                Box::new(VsockStream::connect(&VsockAddr::new(*cid, *port))?)
            }
        };
        Ok(stream)
    }
}

impl FromStr for Target {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Target::Tcp(addr));
        }

        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| TargetParseError::MissingScheme(s.to_string()))?;

        match scheme {
            "tcp" => rest
                .parse()
                .map(Target::Tcp)
                .map_err(|_| TargetParseError::InvalidSocketAddr(rest.to_string())),
            "unix" if rest.is_empty() => Err(TargetParseError::EmptyPath),
            "unix" => Ok(Target::Unix(PathBuf::from(rest))),
            "vsock" => {
                let invalid = || TargetParseError::InvalidVsock(rest.to_string());
                let (cid, port) = rest.split_once(':').ok_or_else(invalid)?;
                Ok(Target::Vsock {
                    cid: cid.parse().map_err(|_| invalid())?,
                    port: port.parse().map_err(|_| invalid())?,
                })
            }
            other => Err(TargetParseError::UnknownScheme(other.to_string())),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Tcp(addr) => write!(f, "tcp:{}", addr),
            Target::Unix(path) => write!(f, "unix:{}", path.display()),
            Target::Vsock { cid, port } => write!(f, "vsock:{}:{}", cid, port),
        }
    }
}
