//! Round-robin tick loop over a [`Listener`].
//!
//! One tick:
//!
//! 1. accept at most one new client,
//! 2. run every pass of the handler over all registered clients, pruning
//!    clients that died after each pass,
//! 3. let the handler reset its per-tick state.
//!
//! Everything happens on the calling thread. Waiting for data is done by
//! polling; a client with nothing to say costs one would-block read per pass.

use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::channel::Channel;
use crate::error::FailReason;
use crate::listener::{Accepted, Listener};
use crate::transport::{Acceptor, Transport};

/// Application logic driven once per tick.
pub trait TickHandler<T: Transport> {
    /// Called with every freshly verified client before it is registered.
    /// Killing the channel here keeps it out of the registry.
    fn on_connect(&mut self, _client: &mut Channel<T>) {}

    /// Number of passes over the registry per tick.
    fn passes(&self) -> usize {
        1
    }

    /// Called once per live client in every pass.
    fn visit(&mut self, pass: usize, client: &mut Channel<T>);

    /// Called after the last pass of a tick.
    fn end_tick(&mut self) {}

    /// Checked before every tick by [`Driver::run`].
    fn should_stop(&self) -> bool {
        false
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub accepted: Accepted,
    pub pruned: usize,
}

pub struct Driver<A: Acceptor> {
    listener: Listener<A>,
    ticks: u64,
    idle_sleep: Option<Duration>,
}

impl<A: Acceptor> Driver<A> {
    pub fn new(listener: Listener<A>) -> Self {
        let idle_sleep = listener.config().idle_sleep;
        Self {
            listener,
            ticks: 0,
            idle_sleep,
        }
    }

    pub fn listener(&self) -> &Listener<A> {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut Listener<A> {
        &mut self.listener
    }

    pub fn into_listener(self) -> Listener<A> {
        self.listener
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn tick<H>(&mut self, handler: &mut H) -> TickReport
    where
        H: TickHandler<A::Stream>,
    {
        let accepted = self.listener.accept_one(|client| handler.on_connect(client));

        let mut pruned = 0;
        for pass in 0..handler.passes() {
            pruned += self
                .listener
                .for_each_client(|client| handler.visit(pass, client));
        }

        handler.end_tick();
        self.ticks += 1;

        if pruned > 0 {
            debug!("Tick {}: pruned {} client(s)", self.ticks, pruned);
        }
        TickReport { accepted, pruned }
    }

    /// Runs ticks until the handler asks to stop or the listener dies.
    ///
    /// Returns the listener's fail reason, if that is what ended the loop.
    pub fn run<H>(&mut self, handler: &mut H) -> Option<FailReason>
    where
        H: TickHandler<A::Stream>,
    {
        info!("Driver started");
        while self.listener.is_alive() && !handler.should_stop() {
            self.tick(handler);
            if let Some(sleep) = self.idle_sleep {
                thread::sleep(sleep);
            }
        }
        info!("Driver stopped after {} ticks", self.ticks);
        self.listener.fail_reason()
    }
}
