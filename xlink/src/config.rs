use std::time::Duration;

/// Largest payload accepted by default (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Prefix used to synthesize client names (`Client1`, `Client2`, ...).
pub const DEFAULT_NAME_PREFIX: &str = "Client";

/// Per-channel settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Frames announcing a longer payload kill the channel; longer sends are refused.
    pub max_payload_size: usize,
    /// Bound on the blocking handshake read. `None` waits forever.
    pub handshake_timeout: Option<Duration>,
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            handshake_timeout: None,
        }
    }

    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size.min(u32::MAX as usize);
        self
    }

    /// A zero timeout means none; sockets refuse a zero read timeout.
    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout.filter(|t| !t.is_zero());
        self
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings for the listener and the tick loop driving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub channel: ChannelConfig,
    pub name_prefix: String,
    /// Sleep after every tick. `None` busy-polls.
    pub idle_sleep: Option<Duration>,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            channel: ChannelConfig::default(),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            idle_sleep: None,
        }
    }

    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn with_idle_sleep(mut self, sleep: Option<Duration>) -> Self {
        self.idle_sleep = sleep;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
