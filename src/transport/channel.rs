//! In-process transport: one endpoint per thread, wired as a full mesh of
//! unbounded channels.

use super::{Delivery, Envelope, Filter, Mailbox, Transport};
use crate::error::{DknapError, Result};
use crate::protocol::{Message, Rank};
use crossbeam_channel::{Receiver, Sender, unbounded};

/// A participant's end of a channel mesh.
///
/// Dropping an endpoint tells every peer it is gone.
pub struct ChannelEndpoint {
    rank: Rank,
    peers: Vec<Sender<Delivery>>,
    inbox: Receiver<Delivery>,
    mailbox: Mailbox,
}

/// Build connected endpoints for ranks `0..world_size`, in rank order.
pub fn mesh(world_size: usize) -> Vec<ChannelEndpoint> {
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..world_size).map(|_| unbounded()).unzip();

    receivers
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| ChannelEndpoint {
            rank,
            peers: senders.clone(),
            inbox,
            mailbox: Mailbox::new(rank, world_size),
        })
        .collect()
}

impl Transport for ChannelEndpoint {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.peers.len()
    }

    fn send(&mut self, to: Rank, message: Message) -> Result<()> {
        self.mailbox.check_peer(to)?;
        let envelope = Envelope {
            source: self.rank,
            message,
        };
        self.peers[to]
            .send(Delivery::Message(envelope))
            .map_err(|_| DknapError::PeerLost(to))?;
        self.mailbox.sent(to, &message);
        Ok(())
    }

    fn recv(&mut self, filter: Filter) -> Result<Envelope> {
        let inbox = &self.inbox;
        self.mailbox.recv_with(filter, || {
            inbox
                .recv()
                .map_err(|_| DknapError::Transport("every peer has disconnected".into()))
        })
    }

    fn is_live(&self, rank: Rank) -> bool {
        self.mailbox.is_live(rank)
    }
}

impl Drop for ChannelEndpoint {
    fn drop(&mut self) {
        for (rank, peer) in self.peers.iter().enumerate() {
            if rank != self.rank {
                let _ = peer.send(Delivery::Closed(self.rank));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageKind;

    #[test]
    fn test_point_to_point() {
        let mut endpoints = mesh(3);
        let mut two = endpoints.pop().unwrap();
        let mut one = endpoints.pop().unwrap();
        let mut zero = endpoints.pop().unwrap();

        one.send(0, Message::query(4)).unwrap();
        two.send(0, Message::completion(9)).unwrap();

        let first = zero.recv(Filter::from(2)).unwrap();
        assert_eq!(first.message, Message::completion(9));
        let second = zero.recv(Filter::any()).unwrap();
        assert_eq!(second.source, 1);
        assert_eq!(second.message, Message::query(4));

        zero.send(1, Message::value(4, 2)).unwrap();
        assert_eq!(
            one.recv(Filter::from(0).kind(MessageKind::Value)).unwrap().message,
            Message::value(4, 2)
        );
    }

    #[test]
    fn test_send_to_self_is_rejected() {
        let mut endpoints = mesh(2);
        assert!(endpoints[0].send(0, Message::Shutdown).is_err());
        assert!(endpoints[0].send(5, Message::Shutdown).is_err());
    }

    #[test]
    fn test_dropped_worker_is_lost() {
        let mut endpoints = mesh(2);
        let worker = endpoints.pop().unwrap();
        let mut coordinator = endpoints.pop().unwrap();

        coordinator.send(1, Message::task(1)).unwrap();
        drop(worker);

        let err = coordinator.recv(Filter::any()).unwrap_err();
        assert!(matches!(err, DknapError::PeerLost(1)));
        assert!(matches!(
            coordinator.send(1, Message::Shutdown),
            Err(DknapError::PeerLost(1))
        ));
    }

    #[test]
    fn test_dropped_worker_after_shutdown_is_fine() {
        let mut endpoints = mesh(3);
        let mut two = endpoints.pop().unwrap();
        let one = endpoints.pop().unwrap();
        let mut zero = endpoints.pop().unwrap();

        zero.send(1, Message::Shutdown).unwrap();
        drop(one);
        two.send(0, Message::completion(1)).unwrap();

        assert_eq!(zero.recv(Filter::any()).unwrap().source, 2);
    }

    #[test]
    fn test_broadcast_skips_retired_peers() {
        let mut endpoints = mesh(4);
        endpoints[0].send(2, Message::Shutdown).unwrap();
        assert_eq!(endpoints[0].broadcast(Message::Shutdown).unwrap(), 2);

        for rank in 1..4 {
            let got = endpoints[rank].recv(Filter::from(0)).unwrap();
            assert_eq!(got.message, Message::Shutdown);
        }
        assert_eq!(endpoints[0].broadcast(Message::Shutdown).unwrap(), 0);
    }

    #[test]
    fn test_threads_exchange_messages() {
        let mut endpoints = mesh(2);
        let mut worker = endpoints.pop().unwrap();
        let mut coordinator = endpoints.pop().unwrap();

        let handle = std::thread::spawn(move || {
            let task = worker.recv(Filter::from(0)).unwrap();
            let Message::Task { capacity } = task.message else {
                panic!("expected task");
            };
            worker.send(0, Message::completion(capacity as u64 * 2)).unwrap();
        });

        coordinator.send(1, Message::task(21)).unwrap();
        let done = coordinator.recv(Filter::any()).unwrap();
        assert_eq!(done.message, Message::completion(42));
        handle.join().unwrap();
    }
}
