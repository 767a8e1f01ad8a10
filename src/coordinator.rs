//! The coordinator: owns the subproblem cache and drives the workers.
//!
//! Capacities are handed out in increasing order, so every capacity a worker
//! asks about has already been assigned to somebody and will eventually be
//! recorded. That ordering is what keeps the query/retry exchange live.

use crate::cache::SubproblemCache;
use crate::catalog::ItemCatalog;
use crate::config::{MIN_WORLD_SIZE, QueryMode};
use crate::error::{DknapError, Result};
use crate::protocol::{Capacity, Message, Rank, Value};
use crate::transport::{Filter, Transport};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, instrument, trace};

/// Counters describing one run of the serve loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    /// Queries received.
    pub queries: u64,
    /// `Pending` replies sent.
    pub pending_replies: u64,
    /// Queries parked until their capacity resolved.
    pub deferred_queries: u64,
    /// Completions recorded.
    pub completions: u64,
    /// Tasks sent, indexed by rank.
    pub tasks_by_rank: Vec<u64>,
    /// Workers stopped before receiving any task.
    pub surplus_workers: Vec<Rank>,
}

/// Outcome of a distributed solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub target: Capacity,
    /// Optimal value at `target`.
    pub value: Value,
    /// Optimal value for every capacity in `0..=target`.
    pub table: Vec<Value>,
    pub stats: CoordinatorStats,
}

/// Rank 0 of a solve.
pub struct Coordinator<T: Transport> {
    transport: T,
    target: Capacity,
    mode: QueryMode,
    cache: SubproblemCache,
    assignments: HashMap<Rank, Capacity>,
    /// Every capacity below this has been assigned or is a base case.
    cursor: Capacity,
    waiting: HashMap<Capacity, Vec<Rank>>,
    stats: CoordinatorStats,
}

impl<T: Transport> Coordinator<T> {
    /// Allocate the cache and mark base cases.
    pub fn new(transport: T, target: Capacity, catalog: &ItemCatalog, mode: QueryMode) -> Result<Self> {
        let world_size = transport.world_size();
        if world_size < MIN_WORLD_SIZE {
            return Err(DknapError::InvalidWorldSize(world_size));
        }

        let cache = SubproblemCache::new(target, catalog)?;
        debug!(
            capacity = target,
            cells = cache.len(),
            base_cells = cache.cached_count(),
            "Initialized subproblem cache"
        );

        Ok(Self {
            transport,
            target,
            mode,
            cache,
            assignments: HashMap::new(),
            cursor: 0,
            waiting: HashMap::new(),
            stats: CoordinatorStats {
                tasks_by_rank: vec![0; world_size],
                ..Default::default()
            },
        })
    }

    /// Give every worker its first capacity; stop workers there is no work for.
    pub fn distribute_initial_tasks(&mut self) -> Result<()> {
        for worker in 1..self.transport.world_size() {
            match self.next_capacity() {
                Some(capacity) => self.assign(worker, capacity)?,
                None => {
                    trace!(worker, "No capacity left for worker, stopping it");
                    self.transport.send(worker, Message::Shutdown)?;
                    self.stats.surplus_workers.push(worker);
                }
            }
        }
        Ok(())
    }

    /// Answer queries and record completions until every cell is resolved.
    pub fn serve(&mut self) -> Result<()> {
        while !self.cache.is_full() {
            let envelope = self.transport.recv(Filter::any())?;
            match envelope.message {
                Message::Query { capacity } => self.handle_query(envelope.source, capacity)?,
                Message::Completion { value } => self.handle_completion(envelope.source, value)?,
                other => {
                    return Err(DknapError::protocol(
                        envelope.source,
                        format!("sent {} to the coordinator", other.kind()),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Stop any worker still listening and read the answer out of the cache.
    pub fn finish(&mut self) -> Result<Solution> {
        let stopped = self.transport.broadcast(Message::Shutdown)?;
        if stopped > 0 {
            debug!(stopped, "Sent final shutdown");
        }

        let table = self.cache.values().ok_or_else(|| {
            DknapError::protocol(self.transport.rank(), "finished with unresolved capacities")
        })?;
        let value = table[self.target];
        Ok(Solution {
            target: self.target,
            value,
            table,
            stats: self.stats.clone(),
        })
    }

    /// Run the whole protocol.
    #[instrument(level = "debug", skip(self), fields(capacity = self.target, mode = %self.mode))]
    pub fn solve(&mut self) -> Result<Solution> {
        info!(
            capacity = self.target,
            workers = self.transport.world_size() - 1,
            "Coordinator starting"
        );
        self.distribute_initial_tasks()?;
        self.serve()?;
        let solution = self.finish()?;
        info!(
            value = solution.value,
            completions = solution.stats.completions,
            queries = solution.stats.queries,
            pending = solution.stats.pending_replies,
            "Coordinator finished"
        );
        Ok(solution)
    }

    /// Give back the transport, e.g. to reap worker processes.
    pub fn into_transport(self) -> T {
        self.transport
    }

    fn next_capacity(&mut self) -> Option<Capacity> {
        let capacity = self.cache.next_unknown(self.cursor)?;
        self.cursor = capacity + 1;
        Some(capacity)
    }

    fn assign(&mut self, worker: Rank, capacity: Capacity) -> Result<()> {
        self.assignments.insert(worker, capacity);
        self.transport.send(worker, Message::task(capacity))?;
        self.stats.tasks_by_rank[worker] += 1;
        trace!(worker, capacity, "Assigned capacity");
        Ok(())
    }

    fn handle_query(&mut self, worker: Rank, capacity: Capacity) -> Result<()> {
        self.stats.queries += 1;
        let assigned = self.assignments.get(&worker).copied().ok_or_else(|| {
            DknapError::protocol(worker, format!("queried capacity {} without a task", capacity))
        })?;
        if capacity >= assigned {
            return Err(DknapError::protocol(
                worker,
                format!(
                    "queried capacity {} while computing capacity {}",
                    capacity, assigned
                ),
            ));
        }

        match self.cache.get(capacity).and_then(|cell| cell.value()) {
            Some(value) => self.transport.send(worker, Message::value(capacity, value)),
            None => match self.mode {
                QueryMode::Retry => {
                    self.stats.pending_replies += 1;
                    self.transport.send(worker, Message::pending(capacity))
                }
                QueryMode::Deferred => {
                    self.stats.deferred_queries += 1;
                    self.waiting.entry(capacity).or_default().push(worker);
                    Ok(())
                }
            },
        }
    }

    fn handle_completion(&mut self, worker: Rank, value: Value) -> Result<()> {
        let capacity = self.assignments.remove(&worker).ok_or_else(|| {
            DknapError::protocol(worker, "sent a completion without a task")
        })?;
        if !self.cache.record(capacity, value)? {
            return Err(DknapError::protocol(
                worker,
                format!("capacity {} was already resolved", capacity),
            ));
        }
        self.stats.completions += 1;
        debug!(
            worker,
            capacity,
            value,
            cached = self.cache.cached_count(),
            "Recorded completion"
        );

        for parked in self.waiting.remove(&capacity).unwrap_or_default() {
            self.transport.send(parked, Message::value(capacity, value))?;
        }

        match self.next_capacity() {
            Some(next) => self.assign(worker, next),
            None => self.transport.send(worker, Message::Shutdown),
        }
    }

    /// Current state of one cell.
    #[cfg(test)]
    fn cell(&self, capacity: Capacity) -> Option<crate::cache::Cell> {
        self.cache.get(capacity)
    }
}
