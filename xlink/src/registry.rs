use log::{info, warn};

use crate::channel::Channel;
use crate::transport::Transport;

/// Name-keyed collection of live server-side channels.
///
/// Iteration follows insertion order. Dead channels are removed at the end
/// of every [`for_each`](Registry::for_each) pass, never during it.
pub struct Registry<T> {
    clients: Vec<Channel<T>>,
}

impl<T: Transport> Registry<T> {
    pub fn new() -> Self {
        Self {
            clients: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Channel<T>> {
        self.position(name).map(|i| &self.clients[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Channel<T>> {
        self.position(name).map(move |i| &mut self.clients[i])
    }

    /// Removes a channel and hands ownership to the caller.
    pub fn take(&mut self, name: &str) -> Option<Channel<T>> {
        self.position(name).map(|i| self.clients.remove(i))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.clients.iter().filter_map(|c| c.name())
    }

    /// Adds a named channel.
    ///
    /// Unnamed channels and names already present are refused and returned.
    pub fn insert(&mut self, channel: Channel<T>) -> Result<(), Channel<T>> {
        let fresh = matches!(channel.name(), Some(name) if !self.contains(name));
        if !fresh {
            warn!("Refusing to register {:?}", channel);
            return Err(channel);
        }

        self.clients.push(channel);
        Ok(())
    }

    /// Calls `f` once on every registered channel, then drops the dead ones.
    ///
    /// Returns how many channels were removed.
    pub fn for_each<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&mut Channel<T>),
    {
        for client in self.clients.iter_mut() {
            f(client);
        }

        let before = self.clients.len();
        self.clients.retain(|client| {
            if let Some(reason) = client.fail_reason() {
                info!("{} disconnected: {}", client, reason);
                return false;
            }
            true
        });
        before - self.clients.len()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.clients.iter().position(|c| c.name() == Some(name))
    }
}

impl<T: Transport> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use std::net::{TcpListener, TcpStream};

    struct Peers {
        _listener: TcpListener,
        remote: Vec<TcpStream>,
    }

    fn registry_with(names: &[&str]) -> (Registry<TcpStream>, Peers) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut registry = Registry::new();
        let mut remote = Vec::new();

        for name in names {
            remote.push(TcpStream::connect(listener.local_addr().unwrap()).unwrap());
            let (stream, _) = listener.accept().unwrap();
            let channel =
                Channel::established(stream, Some(name.to_string()), ChannelConfig::default());
            registry.insert(channel).unwrap();
        }

        (
            registry,
            Peers {
                _listener: listener,
                remote,
            },
        )
    }

    #[test]
    fn test_pass_then_prune() {
        let (mut registry, _peers) = registry_with(&["A", "B"]);

        let mut visited = Vec::new();
        let removed = registry.for_each(|client| {
            visited.push(client.name().unwrap().to_string());
            if client.name() == Some("B") {
                client.shutdown();
            }
        });

        assert_eq!(visited, ["A", "B"]);
        assert_eq!(removed, 1);
        assert!(registry.contains("A"));
        assert!(!registry.contains("B"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_insertion_order() {
        let (mut registry, _peers) = registry_with(&["Client1", "Client2", "Client10", "Client3"]);

        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            ["Client1", "Client2", "Client10", "Client3"]
        );

        let mut visited = Vec::new();
        registry.for_each(|client| visited.push(client.to_string()));
        assert_eq!(visited, ["Client1", "Client2", "Client10", "Client3"]);
    }

    #[test]
    fn test_duplicate_and_unnamed_refused() {
        let (mut registry, mut peers) = registry_with(&["A"]);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();

        for name in [Some("A".to_string()), None] {
            peers
                .remote
                .push(TcpStream::connect(listener.local_addr().unwrap()).unwrap());
            let (stream, _) = listener.accept().unwrap();
            let channel = Channel::established(stream, name, ChannelConfig::default());
            assert!(registry.insert(channel).is_err());
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_take_and_get() {
        let (mut registry, _peers) = registry_with(&["A", "B"]);

        assert!(registry.get("A").unwrap().is_alive());
        registry.get_mut("B").unwrap().shutdown();

        let b = registry.take("B").unwrap();
        assert!(!b.is_alive());
        assert!(registry.take("B").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), ["A"]);
    }
}
