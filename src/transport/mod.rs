//! Message transport between numbered participants.
//!
//! A transport gives each participant reliable, ordered, point-to-point
//! delivery to every other participant, with blocking send and blocking
//! receive. A receive can be narrowed to one sender and/or one message kind;
//! messages that arrive but do not match are held back for a later receive.
//!
//! Two implementations exist:
//!
//! - [`channel`]: every participant is a thread in this process
//! - [`process`]: the coordinator spawns worker subprocesses and exchanges
//!   JSON lines over their stdin/stdout
//!
//! Both surface a peer that goes away before it was sent `Shutdown` as
//! [`DknapError::PeerLost`], so a dead worker aborts the job instead of
//! stalling the coordinator.

pub mod channel;
pub mod ipc;
pub mod process;

use crate::error::{DknapError, Result};
use crate::protocol::{Message, MessageKind, Rank};
use std::collections::VecDeque;

pub use channel::{ChannelEndpoint, mesh};
pub use process::{ProcessHub, StdioEndpoint, WorkerSpawn};

/// A received message and its sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub source: Rank,
    pub message: Message,
}

/// Which messages a receive accepts. `None` fields are wildcards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filter {
    pub source: Option<Rank>,
    pub kind: Option<MessageKind>,
}

impl Filter {
    /// Accept anything from anyone.
    pub fn any() -> Self {
        Self::default()
    }

    /// Accept only messages from `rank`.
    pub fn from(rank: Rank) -> Self {
        Self {
            source: Some(rank),
            kind: None,
        }
    }

    /// Further narrow to one message kind.
    pub fn kind(mut self, kind: MessageKind) -> Self {
        self.kind = Some(kind);
        self
    }

    fn accepts_source(&self, rank: Rank) -> bool {
        self.source.is_none_or(|source| source == rank)
    }

    pub fn matches(&self, envelope: &Envelope) -> bool {
        self.accepts_source(envelope.source)
            && self.kind.is_none_or(|kind| kind == envelope.message.kind())
    }
}

/// What an endpoint's inbox yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Delivery {
    Message(Envelope),
    /// The peer's end of the link went away.
    Closed(Rank),
    /// The peer's link produced something that is not a message.
    Failed(Rank, String),
}

/// One participant's view of the transport.
pub trait Transport {
    /// This participant's rank.
    fn rank(&self) -> Rank;

    /// Number of participants, including this one.
    fn world_size(&self) -> usize;

    /// Send `message` to `to`, blocking until the transport has taken it.
    fn send(&mut self, to: Rank, message: Message) -> Result<()>;

    /// Block until a message matching `filter` arrives.
    fn recv(&mut self, filter: Filter) -> Result<Envelope>;

    /// Whether `rank` can still be sent to: not this participant, not sent
    /// `Shutdown`, and not disconnected.
    fn is_live(&self, rank: Rank) -> bool;

    /// Send `message` to every live peer. Returns the number of recipients.
    fn broadcast(&mut self, message: Message) -> Result<usize> {
        let mut sent = 0;
        for rank in 0..self.world_size() {
            if self.is_live(rank) {
                self.send(rank, message)?;
                sent += 1;
            }
        }
        Ok(sent)
    }
}

/// Matching and peer bookkeeping shared by the transports.
#[derive(Debug)]
pub(crate) struct Mailbox {
    rank: Rank,
    held: VecDeque<Envelope>,
    retired: Vec<bool>,
    closed: Vec<bool>,
}

impl Mailbox {
    pub(crate) fn new(rank: Rank, world_size: usize) -> Self {
        Self {
            rank,
            held: VecDeque::new(),
            retired: vec![false; world_size],
            closed: vec![false; world_size],
        }
    }

    pub(crate) fn world_size(&self) -> usize {
        self.retired.len()
    }

    pub(crate) fn check_peer(&self, to: Rank) -> Result<()> {
        if to >= self.world_size() {
            return Err(DknapError::Transport(format!(
                "rank {} is outside a world of {}",
                to,
                self.world_size()
            )));
        }
        if to == self.rank {
            return Err(DknapError::Transport(format!(
                "rank {} cannot send to itself",
                to
            )));
        }
        if self.closed[to] {
            return Err(DknapError::PeerLost(to));
        }
        Ok(())
    }

    /// Note an outgoing message; a peer sent `Shutdown` may disconnect freely.
    pub(crate) fn sent(&mut self, to: Rank, message: &Message) {
        if matches!(message, Message::Shutdown) {
            self.retired[to] = true;
        }
    }

    pub(crate) fn is_live(&self, rank: Rank) -> bool {
        rank != self.rank
            && rank < self.world_size()
            && !self.retired[rank]
            && !self.closed[rank]
    }

    /// A closed peer this receive could have been waiting on.
    fn lost_peer(&self, filter: &Filter) -> Option<Rank> {
        (0..self.world_size())
            .find(|&rank| self.closed[rank] && !self.retired[rank] && filter.accepts_source(rank))
    }

    /// Receive the next message matching `filter`, pulling deliveries from
    /// `pull` and holding back anything that does not match.
    pub(crate) fn recv_with<F>(&mut self, filter: Filter, mut pull: F) -> Result<Envelope>
    where
        F: FnMut() -> Result<Delivery>,
    {
        if let Some(pos) = self.held.iter().position(|env| filter.matches(env)) {
            if let Some(envelope) = self.held.remove(pos) {
                return Ok(envelope);
            }
        }

        loop {
            if let Some(rank) = self.lost_peer(&filter) {
                return Err(DknapError::PeerLost(rank));
            }

            match pull()? {
                Delivery::Message(envelope) if filter.matches(&envelope) => return Ok(envelope),
                Delivery::Message(envelope) => {
                    tracing::trace!(
                        rank = self.rank,
                        source = envelope.source,
                        kind = %envelope.message.kind(),
                        "Holding back unmatched message"
                    );
                    self.held.push_back(envelope);
                }
                Delivery::Closed(peer) => {
                    if let Some(flag) = self.closed.get_mut(peer) {
                        *flag = true;
                    }
                    tracing::trace!(rank = self.rank, peer, "Peer disconnected");
                }
                Delivery::Failed(peer, reason) => {
                    return Err(DknapError::Transport(format!(
                        "link to rank {} failed: {}",
                        peer, reason
                    )));
                }
            }
        }
    }
}
