//! Workers compute one capacity at a time, asking the coordinator for every
//! smaller subproblem they need.

use crate::catalog::ItemCatalog;
use crate::error::{DknapError, Result};
use crate::protocol::{COORDINATOR, Capacity, Message, Rank, Value};
use crate::transport::{Filter, Transport};
use serde::Serialize;
use tracing::{debug, trace};

/// Where a worker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for a task or shutdown.
    Idle,
    /// Working on the given capacity.
    Computing(Capacity),
    /// Told to stop.
    Terminated,
}

/// What a worker did before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub rank: Rank,
    pub tasks_completed: u64,
    pub queries_sent: u64,
    /// Queries repeated after a `Pending` reply.
    pub pending_retries: u64,
}

/// A non-zero rank of a solve.
pub struct Worker<T: Transport> {
    transport: T,
    catalog: ItemCatalog,
    target: Capacity,
    state: WorkerState,
    summary: WorkerSummary,
}

impl<T: Transport> Worker<T> {
    /// `catalog` is this worker's own copy of the items.
    pub fn new(transport: T, catalog: ItemCatalog, target: Capacity) -> Self {
        let summary = WorkerSummary {
            rank: transport.rank(),
            ..Default::default()
        };
        Self {
            transport,
            catalog,
            target,
            state: WorkerState::Idle,
            summary,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn summary(&self) -> &WorkerSummary {
        &self.summary
    }

    /// Serve tasks until the coordinator sends `Shutdown`.
    pub fn serve(&mut self) -> Result<WorkerSummary> {
        let rank = self.transport.rank();
        loop {
            let envelope = self.transport.recv(Filter::from(COORDINATOR))?;
            match envelope.message {
                Message::Task { capacity } if capacity <= self.target => {
                    self.state = WorkerState::Computing(capacity);
                    let value = self.compute(capacity)?;
                    self.transport.send(COORDINATOR, Message::completion(value))?;
                    self.summary.tasks_completed += 1;
                    self.state = WorkerState::Idle;
                    trace!(rank, capacity, value, "Completed task");
                }
                Message::Shutdown => {
                    self.state = WorkerState::Terminated;
                    debug!(
                        rank,
                        tasks = self.summary.tasks_completed,
                        queries = self.summary.queries_sent,
                        "Worker stopping"
                    );
                    return Ok(self.summary.clone());
                }
                other => {
                    return Err(DknapError::protocol(
                        rank,
                        format!("received {:?} while idle", other),
                    ));
                }
            }
        }
    }

    /// Optimal value at `capacity`.
    ///
    /// Items are sorted by weight, so the scan stops at the first item that no
    /// longer fits. Zero-weight items are never queried; their values are
    /// added once.
    fn compute(&mut self, capacity: Capacity) -> Result<Value> {
        let overflow = || DknapError::ValueOverflow { capacity };
        let mut best: Value = 0;
        let mut free: Value = 0;

        // Indexing keeps the borrow of the catalog short while querying.
        for index in 0..self.catalog.len() {
            let item = self.catalog.items()[index];
            if item.weight > capacity {
                break;
            }
            if item.weight == 0 {
                free = free.checked_add(item.value).ok_or_else(overflow)?;
                continue;
            }
            let rest = self.fetch(capacity - item.weight)?;
            let candidate = rest.checked_add(item.value).ok_or_else(overflow)?;
            best = best.max(candidate);
        }

        best.checked_add(free).ok_or_else(overflow)
    }

    /// Ask the coordinator for `capacity`, repeating while it is pending.
    fn fetch(&mut self, capacity: Capacity) -> Result<Value> {
        loop {
            self.transport.send(COORDINATOR, Message::query(capacity))?;
            self.summary.queries_sent += 1;

            let reply = self.transport.recv(Filter::from(COORDINATOR))?;
            match reply.message {
                Message::Value { capacity: c, value } if c == capacity => return Ok(value),
                Message::Pending { capacity: c } if c == capacity => {
                    self.summary.pending_retries += 1;
                    std::thread::yield_now();
                }
                other => {
                    return Err(DknapError::protocol(
                        self.transport.rank(),
                        format!("received {:?} while waiting for capacity {}", other, capacity),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Item;
    use crate::transport::{ChannelEndpoint, mesh};
    use std::thread::JoinHandle;

    fn catalog(pairs: &[(usize, u64)]) -> ItemCatalog {
        ItemCatalog::new(pairs.iter().map(|&(w, v)| Item::new(w, v)).collect())
    }

    /// Run a worker on rank 1 in a thread; the test plays the coordinator.
    fn spawn_worker(
        items: &[(usize, u64)],
        target: Capacity,
    ) -> (ChannelEndpoint, JoinHandle<Result<WorkerSummary>>) {
        let mut endpoints = mesh(2);
        let endpoint = endpoints.pop().unwrap();
        let coordinator = endpoints.pop().unwrap();
        let catalog = catalog(items);
        let handle = std::thread::spawn(move || Worker::new(endpoint, catalog, target).serve());
        (coordinator, handle)
    }

    fn expect(coordinator: &mut ChannelEndpoint, message: Message) {
        assert_eq!(coordinator.recv(Filter::from(1)).unwrap().message, message);
    }

    #[test]
    fn test_queries_each_fitting_item_in_weight_order() {
        let (mut coordinator, handle) = spawn_worker(&[(3, 4), (1, 1), (5, 9)], 10);

        coordinator.send(1, Message::task(4)).unwrap();
        expect(&mut coordinator, Message::query(3));
        coordinator.send(1, Message::value(3, 4)).unwrap();
        expect(&mut coordinator, Message::query(1));
        coordinator.send(1, Message::value(1, 1)).unwrap();
        // Weight 5 does not fit capacity 4.
        expect(&mut coordinator, Message::completion(5));

        coordinator.send(1, Message::Shutdown).unwrap();
        let summary = handle.join().unwrap().unwrap();
        assert_eq!(summary.rank, 1);
        assert_eq!(summary.tasks_completed, 1);
        assert_eq!(summary.queries_sent, 2);
    }

    #[test]
    fn test_pending_is_retried() {
        let (mut coordinator, handle) = spawn_worker(&[(1, 2)], 5);

        coordinator.send(1, Message::task(2)).unwrap();
        expect(&mut coordinator, Message::query(1));
        coordinator.send(1, Message::pending(1)).unwrap();
        expect(&mut coordinator, Message::query(1));
        coordinator.send(1, Message::pending(1)).unwrap();
        expect(&mut coordinator, Message::query(1));
        coordinator.send(1, Message::value(1, 2)).unwrap();
        expect(&mut coordinator, Message::completion(4));

        coordinator.send(1, Message::Shutdown).unwrap();
        let summary = handle.join().unwrap().unwrap();
        assert_eq!(summary.pending_retries, 2);
        assert_eq!(summary.queries_sent, 3);
    }

    #[test]
    fn test_zero_weight_items_are_not_queried() {
        let (mut coordinator, handle) = spawn_worker(&[(0, 3), (2, 5)], 4);

        coordinator.send(1, Message::task(1)).unwrap();
        expect(&mut coordinator, Message::completion(3));

        coordinator.send(1, Message::task(2)).unwrap();
        expect(&mut coordinator, Message::query(0));
        coordinator.send(1, Message::value(0, 3)).unwrap();
        expect(&mut coordinator, Message::completion(11));

        coordinator.send(1, Message::Shutdown).unwrap();
        assert_eq!(handle.join().unwrap().unwrap().queries_sent, 1);
    }

    #[test]
    fn test_immediate_shutdown() {
        let (mut coordinator, handle) = spawn_worker(&[(1, 1)], 3);
        coordinator.send(1, Message::Shutdown).unwrap();
        let summary = handle.join().unwrap().unwrap();
        assert_eq!(summary.tasks_completed, 0);
        assert_eq!(summary.queries_sent, 0);
    }

    #[test]
    fn test_overflow_is_reported() {
        let (mut coordinator, handle) = spawn_worker(&[(1, u64::MAX)], 3);

        coordinator.send(1, Message::task(2)).unwrap();
        expect(&mut coordinator, Message::query(1));
        coordinator.send(1, Message::value(1, 1)).unwrap();

        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, DknapError::ValueOverflow { capacity: 2 }));
    }

    #[test]
    fn test_task_while_computing_is_violation() {
        let (mut coordinator, handle) = spawn_worker(&[(1, 1)], 5);

        coordinator.send(1, Message::task(2)).unwrap();
        expect(&mut coordinator, Message::query(1));
        coordinator.send(1, Message::task(3)).unwrap();

        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, DknapError::ProtocolViolation { rank: 1, .. }));
    }

    #[test]
    fn test_reply_for_wrong_capacity_is_violation() {
        let (mut coordinator, handle) = spawn_worker(&[(1, 1)], 5);

        coordinator.send(1, Message::task(2)).unwrap();
        expect(&mut coordinator, Message::query(1));
        coordinator.send(1, Message::value(0, 0)).unwrap();

        assert!(handle.join().unwrap().is_err());
    }

    #[test]
    fn test_value_while_idle_is_violation() {
        let (mut coordinator, handle) = spawn_worker(&[(1, 1)], 5);
        coordinator.send(1, Message::value(1, 1)).unwrap();
        let err = handle.join().unwrap().unwrap_err();
        assert!(err.to_string().contains("while idle"));
    }

    #[test]
    fn test_task_beyond_target_is_violation() {
        let (mut coordinator, handle) = spawn_worker(&[(1, 1)], 5);
        coordinator.send(1, Message::task(6)).unwrap();
        assert!(handle.join().unwrap().is_err());
    }

    #[test]
    fn test_lost_coordinator() {
        let (coordinator, handle) = spawn_worker(&[(1, 1)], 5);
        drop(coordinator);
        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, DknapError::PeerLost(0)));
    }

    #[test]
    fn test_state_transitions() {
        let mut endpoints = mesh(2);
        let endpoint = endpoints.pop().unwrap();
        let mut coordinator = endpoints.pop().unwrap();
        let mut worker = Worker::new(endpoint, catalog(&[(2, 1)]), 3);
        assert_eq!(worker.state(), WorkerState::Idle);

        coordinator.send(1, Message::task(1)).unwrap();
        coordinator.send(1, Message::Shutdown).unwrap();
        worker.serve().unwrap();
        assert_eq!(worker.state(), WorkerState::Terminated);
        expect(&mut coordinator, Message::completion(0));
    }
}
