//! Non-blocking listener owning the registry of verified clients.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::unix::net::UnixListener;
use std::path::Path;

use log::{debug, error, info, warn};
use vsock::{VsockAddr, VsockListener};

use crate::channel::Channel;
use crate::config::ServerConfig;
use crate::error::FailReason;
use crate::handshake;
use crate::registry::Registry;
use crate::transport::{Acceptor, Transport};

/// Outcome of one [`Listener::accept_one`] attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepted {
    /// Nobody was waiting, or the listener is dead.
    Idle,
    /// A client passed the handshake and was registered.
    Joined(String),
    /// A client connected but never made it into the registry.
    Rejected { name: String, reason: FailReason },
}

/// Listening endpoint plus the registry of clients it accepted.
///
/// Construction never fails outright: a listener that could not be set up
/// carries a fail reason and ignores every accept attempt.
pub struct Listener<A: Acceptor> {
    acceptor: Option<A>,
    fail_reason: Option<FailReason>,
    registry: Registry<A::Stream>,
    accepted: u64,
    config: ServerConfig,
}

impl Listener<TcpListener> {
    /// Listens on `port` on all IPv4 interfaces with default settings.
    pub fn bind(port: u16) -> Self {
        Self::bind_tcp(SocketAddr::from(([0, 0, 0, 0], port)), ServerConfig::default())
    }

    pub fn bind_tcp(addr: SocketAddr, config: ServerConfig) -> Self {
        let bound = TcpListener::bind(addr);
        if bound.is_ok() {
            info!("Server listening on TCP {}", addr);
        }
        Self::from_bind(bound, config)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.acceptor.as_ref()?.local_addr().ok()
    }
}

impl Listener<UnixListener> {
    /// Listens on a Unix domain socket, replacing a stale socket file.
    pub fn bind_unix(path: impl AsRef<Path>, config: ServerConfig) -> Self {
        let path = path.as_ref();
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
        let bound = UnixListener::bind(path);
        if bound.is_ok() {
            info!("Server listening on Unix Socket {:?}", path);
        }
        Self::from_bind(bound, config)
    }
}

impl Listener<VsockListener> {
    pub fn bind_vsock(cid: u32, port: u32, config: ServerConfig) -> Self {
        let bound = VsockListener::bind(&VsockAddr::new(cid, port));
        if bound.is_ok() {
            info!("Server listening on Vsock CID:{} Port:{}", cid, port);
        }
        Self::from_bind(bound, config)
    }
}

impl<A: Acceptor> Listener<A> {
    /// Wraps an already bound acceptor and switches it to non-blocking mode.
    pub fn from_acceptor(acceptor: A, config: ServerConfig) -> Self {
        let mut listener = Self {
            acceptor: None,
            fail_reason: None,
            registry: Registry::new(),
            accepted: 0,
            config,
        };

        match acceptor.set_nonblocking(true) {
            Ok(()) => listener.acceptor = Some(acceptor),
            Err(e) => {
                error!("Failed to make the listener non-blocking: {}", e);
                listener.fail_reason = Some(FailReason::NonBlocking);
            }
        }
        listener
    }

    fn from_bind(bound: io::Result<A>, config: ServerConfig) -> Self {
        match bound {
            Ok(acceptor) => Self::from_acceptor(acceptor, config),
            Err(e) => {
                error!("Bind failed: {}", e);
                Self {
                    acceptor: None,
                    fail_reason: Some(FailReason::BindFailed),
                    registry: Registry::new(),
                    accepted: 0,
                    config,
                }
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        self.fail_reason.is_none()
    }

    pub fn fail_reason(&self) -> Option<FailReason> {
        self.fail_reason
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry<A::Stream> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry<A::Stream> {
        &mut self.registry
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn client(&self, name: &str) -> Option<&Channel<A::Stream>> {
        self.registry.get(name)
    }

    pub fn client_mut(&mut self, name: &str) -> Option<&mut Channel<A::Stream>> {
        self.registry.get_mut(name)
    }

    /// Removes a client from the registry and hands it to the caller.
    pub fn take_client(&mut self, name: &str) -> Option<Channel<A::Stream>> {
        self.registry.take(name)
    }

    pub fn client_names(&self) -> Vec<String> {
        self.registry.names().map(str::to_string).collect()
    }

    /// Accepts at most one pending connection.
    ///
    /// A new connection gets the next name from this listener's counter and
    /// goes through the server handshake, which blocks until the peer
    /// answers. `on_connect` sees the verified channel before it is
    /// registered; a channel that is dead afterwards is dropped.
    pub fn accept_one<F>(&mut self, on_connect: F) -> Accepted
    where
        F: FnOnce(&mut Channel<A::Stream>),
    {
        let Some(acceptor) = self.acceptor.as_ref() else {
            return Accepted::Idle;
        };

        let (stream, peer) = match acceptor.accept_stream() {
            Ok(accepted) => accepted,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                return Accepted::Idle;
            }
            Err(e) => {
                error!("Accept failed: {}", e);
                self.acceptor = None;
                self.fail_reason = Some(FailReason::AcceptFailed);
                return Accepted::Idle;
            }
        };

        self.accepted += 1;
        let name = format!("{}{}", self.config.name_prefix, self.accepted);
        debug!("Accepted connection from {} as {}", peer, name);

        if let Err(e) = stream.set_nonblocking(false) {
            warn!("{}: cannot switch to blocking mode: {}", name, e);
            return Accepted::Rejected {
                name,
                reason: FailReason::ConnectionBroken,
            };
        }

        let mut channel = handshake::as_server(stream, name.clone(), self.config.channel);
        if let Some(reason) = channel.fail_reason() {
            warn!(
                "Failed to establish connection with a new client. Reason: {}",
                reason
            );
            return Accepted::Rejected { name, reason };
        }

        on_connect(&mut channel);
        if let Some(reason) = channel.fail_reason() {
            warn!(
                "Failed to maintain connection with {} after initialization. Reason: {}",
                name, reason
            );
            return Accepted::Rejected { name, reason };
        }

        if let Err(channel) = self.registry.insert(channel) {
            return Accepted::Rejected {
                name,
                reason: channel.fail_reason().unwrap_or(FailReason::ClientVerification),
            };
        }
        info!("{} joined from {}", name, peer);
        Accepted::Joined(name)
    }

    /// Runs `f` once on every registered client, then prunes the dead ones.
    ///
    /// Returns how many clients were removed.
    pub fn for_each_client<F>(&mut self, f: F) -> usize
    where
        F: FnMut(&mut Channel<A::Stream>),
    {
        self.registry.for_each(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::thread::{self, JoinHandle};
    use std::time::{Duration, Instant};

    fn local_listener() -> (Listener<TcpListener>, u16) {
        let listener = Listener::bind_tcp("127.0.0.1:0".parse().unwrap(), ServerConfig::default());
        assert!(listener.is_alive());
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    fn spawn_client(port: u16) -> JoinHandle<Channel<TcpStream>> {
        thread::spawn(move || handshake::connect("127.0.0.1", port))
    }

    fn accept_next(listener: &mut Listener<TcpListener>) -> Accepted {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match listener.accept_one(|_| {}) {
                Accepted::Idle => {
                    assert!(Instant::now() < deadline, "nobody connected");
                    thread::sleep(Duration::from_millis(1));
                }
                outcome => return outcome,
            }
        }
    }

    #[test]
    fn test_idle_without_clients() {
        let (mut listener, _) = local_listener();
        assert_eq!(listener.accept_one(|_| {}), Accepted::Idle);
        assert!(listener.is_alive());
        assert!(listener.is_empty());
    }

    #[test]
    fn test_names_never_reused() {
        let (mut listener, port) = local_listener();

        let mut clients = Vec::new();
        for expected in ["Client1", "Client2", "Client3"] {
            let handle = spawn_client(port);
            assert_eq!(accept_next(&mut listener), Accepted::Joined(expected.to_string()));
            let client = handle.join().unwrap();
            assert!(client.is_alive());
            clients.push(client);
        }
        assert_eq!(listener.client_names(), ["Client1", "Client2", "Client3"]);

        drop(clients);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !listener.is_empty() {
            assert!(Instant::now() < deadline, "disconnects never observed");
            listener.for_each_client(|client| {
                client.poll_non_blocking();
            });
            thread::sleep(Duration::from_millis(1));
        }

        let handle = spawn_client(port);
        assert_eq!(accept_next(&mut listener), Accepted::Joined("Client4".to_string()));
        assert!(handle.join().unwrap().is_alive());
    }

    #[test]
    fn test_rejected_client_not_registered() {
        let (mut listener, port) = local_listener();

        let mut raw = TcpStream::connect(("127.0.0.1", port)).unwrap();
        raw.write_all(b"i-am-an-orc!").unwrap();

        assert_eq!(
            accept_next(&mut listener),
            Accepted::Rejected {
                name: "Client1".to_string(),
                reason: FailReason::ClientVerification,
            }
        );
        assert!(listener.is_empty());

        let handle = spawn_client(port);
        assert_eq!(accept_next(&mut listener), Accepted::Joined("Client2".to_string()));
        handle.join().unwrap();
    }

    #[test]
    fn test_on_connect_can_veto() {
        let (mut listener, port) = local_listener();
        let handle = spawn_client(port);

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = None;
        loop {
            let outcome = listener.accept_one(|client| {
                seen = client.name().map(str::to_string);
                client.shutdown();
            });
            if outcome != Accepted::Idle {
                assert_eq!(
                    outcome,
                    Accepted::Rejected {
                        name: "Client1".to_string(),
                        reason: FailReason::ShutDown,
                    }
                );
                break;
            }
            assert!(Instant::now() < deadline, "nobody connected");
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(seen.as_deref(), Some("Client1"));
        assert!(listener.is_empty());
        handle.join().unwrap();
    }

    #[test]
    fn test_on_connect_greeting_reaches_client() {
        let (mut listener, port) = local_listener();
        let handle = thread::spawn(move || {
            let mut client = handshake::connect("127.0.0.1", port);
            client.receive_blocking()
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while listener.accept_one(|client| {
            assert!(client.send(b"welcome"));
        }) == Accepted::Idle
        {
            assert!(Instant::now() < deadline, "nobody connected");
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(handle.join().unwrap(), b"welcome");
        assert!(listener.client("Client1").is_some());
    }

    #[test]
    fn test_accepted_stream_is_blocking() {
        let (mut listener, port) = local_listener();
        let handle = thread::spawn(move || {
            let mut client = handshake::connect("127.0.0.1", port);
            thread::sleep(Duration::from_millis(50));
            assert!(client.send(b"slow"));
            client
        });
        assert!(matches!(accept_next(&mut listener), Accepted::Joined(_)));

        let client = listener.client_mut("Client1").unwrap();
        assert_eq!(client.receive_blocking(), b"slow");
        handle.join().unwrap();
    }

    #[test]
    fn test_bind_failure_is_latched() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut listener = Listener::bind_tcp(taken.local_addr().unwrap(), ServerConfig::default());

        assert_eq!(listener.fail_reason(), Some(FailReason::BindFailed));
        assert_eq!(listener.accept_one(|_| {}), Accepted::Idle);
        assert!(listener.local_addr().is_none());
    }

    #[test]
    fn test_unix_listener() {
        let path = std::env::temp_dir().join(format!("xlink-test-{}.sock", std::process::id()));
        let mut listener = Listener::bind_unix(&path, ServerConfig::default());
        assert!(listener.is_alive());

        let client_path = path.clone();
        let handle = thread::spawn(move || {
            let stream = std::os::unix::net::UnixStream::connect(client_path).unwrap();
            let mut client = handshake::as_client(stream, Default::default());
            assert!(client.is_alive());
            client.send(b"over unix")
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while listener.accept_one(|_| {}) == Accepted::Idle {
            assert!(Instant::now() < deadline, "nobody connected");
            thread::sleep(Duration::from_millis(1));
        }
        assert!(handle.join().unwrap());

        let client = listener.client_mut("Client1").unwrap();
        assert!(client.transport().is_some());
        assert_eq!(client.receive_blocking(), b"over unix");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_raw_peer_sees_response_token() {
        let (mut listener, port) = local_listener();
        let mut raw = TcpStream::connect(("127.0.0.1", port)).unwrap();
        raw.write_all(handshake::CLIENT_TOKEN).unwrap();

        assert_eq!(accept_next(&mut listener), Accepted::Joined("Client1".to_string()));

        let mut response = vec![0u8; handshake::SERVER_TOKEN.len()];
        raw.read_exact(&mut response).unwrap();
        assert_eq!(response, handshake::SERVER_TOKEN);

        let client = listener.client("Client1").unwrap();
        assert!(client.transport().unwrap().set_nonblocking(false).is_ok());
    }
}
