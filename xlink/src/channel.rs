//! Framed, failure-latching channel over one stream transport.

use core::fmt;
use core::ops::{Deref, DerefMut};
use std::io;

use log::{trace, warn};

use crate::config::ChannelConfig;
use crate::error::FailReason;
use crate::frame::{encode_frame, FrameError, FrameReader};
use crate::transport::Transport;

/// One established, bidirectional framed connection.
///
/// A channel owns its transport exclusively. The first fatal error is
/// latched as its fail reason; from then on every operation is a cheap no-op
/// returning a failure or empty value. Channels are produced by the
/// [`handshake`](crate::handshake) functions.
pub struct Channel<T> {
    transport: Option<T>,
    fail_reason: Option<FailReason>,
    name: Option<String>,
    reader: FrameReader,
    config: ChannelConfig,
}

impl<T: Transport> Channel<T> {
    pub(crate) fn established(transport: T, name: Option<String>, config: ChannelConfig) -> Self {
        Self {
            transport: Some(transport),
            fail_reason: None,
            name,
            reader: FrameReader::new(config.max_payload_size),
            config,
        }
    }

    pub(crate) fn failed(
        transport: Option<T>,
        name: Option<String>,
        reason: FailReason,
        config: ChannelConfig,
    ) -> Self {
        Self {
            transport,
            fail_reason: Some(reason),
            name,
            reader: FrameReader::new(config.max_payload_size),
            config,
        }
    }

    /// Returns true if no fail reason has been recorded.
    pub fn is_alive(&self) -> bool {
        self.fail_reason.is_none()
    }

    pub fn fail_reason(&self) -> Option<FailReason> {
        self.fail_reason
    }

    /// Name assigned by the listener. Client-side channels have none.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The underlying transport, until the channel is shut down.
    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Sends `payload` as one frame.
    ///
    /// Returns false without side effects if the channel is dead or the
    /// payload is larger than the configured limit. A write error other than
    /// would-block kills the channel.
    pub fn send(&mut self, payload: &[u8]) -> bool {
        if !self.is_alive() {
            return false;
        }
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };

        if payload.len() > self.config.max_payload_size {
            warn!(
                "Refusing to send {} bytes, limit is {}",
                payload.len(),
                self.config.max_payload_size
            );
            return false;
        }
        let Some(frame) = encode_frame(payload) else {
            return false;
        };

        match write_frame(transport, &frame) {
            Ok(()) => {
                trace!("Sent frame of {} bytes", payload.len());
                true
            }
            Err(e) => {
                self.fail(FailReason::ConnectionBroken, &e);
                false
            }
        }
    }

    /// Blocks until one complete frame has been read and returns its payload.
    ///
    /// Returns an empty payload if the channel is dead or the read fails;
    /// check [`is_alive`](Self::is_alive) to tell that apart from an empty
    /// frame.
    pub fn receive_blocking(&mut self) -> Vec<u8> {
        if !self.is_alive() {
            return Vec::new();
        }
        let Some(transport) = self.transport.as_mut() else {
            return Vec::new();
        };

        match self.reader.read_frame(transport) {
            Ok(Some(payload)) => payload,
            Ok(None) => Vec::new(),
            Err(e) => {
                self.fail_frame(e);
                Vec::new()
            }
        }
    }

    /// Returns the next frame if one is fully available without blocking.
    ///
    /// The transport is switched to non-blocking mode for the duration of the
    /// call and always switched back before returning. A frame that has only
    /// partially arrived is kept and completed on a later call. `Some` of an
    /// empty vector is a genuine zero-length frame.
    pub fn poll_non_blocking(&mut self) -> Option<Vec<u8>> {
        if !self.is_alive() {
            return None;
        }
        let transport = self.transport.as_mut()?;

        let result = match NonBlocking::enter(transport) {
            Ok(mut guard) => self.reader.read_frame(&mut *guard),
            Err(e) => Err(FrameError::Io(e)),
        };

        match result {
            Ok(frame) => frame,
            Err(e) => {
                self.fail_frame(e);
                None
            }
        }
    }

    /// Kills the channel and releases the transport right away.
    ///
    /// Calling it again is a no-op apart from keeping the reason.
    pub fn shutdown(&mut self) {
        self.fail_reason = Some(FailReason::ShutDown);
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.shutdown() {
                trace!("Shutdown of {} reported: {}", self, e);
            }
        }
    }

    fn fail_frame(&mut self, err: FrameError) {
        match err {
            FrameError::TooLarge { .. } => {
                warn!("{}: {}", self, err);
                self.fail_reason.get_or_insert(FailReason::FrameTooLarge);
            }
            FrameError::Io(e) => self.fail(FailReason::ConnectionBroken, &e),
        }
    }

    fn fail(&mut self, reason: FailReason, err: &io::Error) {
        if self.fail_reason.is_none() {
            warn!("{}: {} ({})", self, reason, err);
            self.fail_reason = Some(reason);
        }
    }
}

impl<T> fmt::Display for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_deref().unwrap_or("channel"))
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("fail_reason", &self.fail_reason)
            .field("has_transport", &self.transport.is_some())
            .field("partial_frame", &self.reader.is_partial())
            .finish()
    }
}

/// Keeps a transport in non-blocking mode while alive.
struct NonBlocking<'a, T: Transport> {
    transport: &'a mut T,
}

impl<'a, T: Transport> NonBlocking<'a, T> {
    fn enter(transport: &'a mut T) -> io::Result<Self> {
        transport.set_nonblocking(true)?;
        Ok(Self { transport })
    }
}

impl<T: Transport> Deref for NonBlocking<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.transport
    }
}

impl<T: Transport> DerefMut for NonBlocking<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.transport
    }
}

impl<T: Transport> Drop for NonBlocking<'_, T> {
    fn drop(&mut self) {
        if let Err(e) = self.transport.set_nonblocking(false) {
            warn!("Failed to restore blocking mode: {}", e);
        }
    }
}

/// Writes the whole buffer, retrying transient would-block conditions.
fn write_frame<T: Transport>(transport: &mut T, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match transport.write(buf) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::yield_now(),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    transport.flush()
}
