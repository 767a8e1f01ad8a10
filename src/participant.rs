//! Role selection: a participant is either the coordinator or a worker,
//! decided once from its rank.

use crate::catalog::ItemCatalog;
use crate::config::{MIN_WORLD_SIZE, QueryMode};
use crate::coordinator::{Coordinator, Solution};
use crate::error::{DknapError, Result};
use crate::protocol::{COORDINATOR, Capacity, Rank};
use crate::transport::Transport;
use crate::worker::{Worker, WorkerSummary};

/// What a participant produced when it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Coordinator(Solution),
    Worker(WorkerSummary),
}

impl Report {
    /// The solution, if this report came from the coordinator.
    pub fn into_solution(self) -> Option<Solution> {
        match self {
            Self::Coordinator(solution) => Some(solution),
            Self::Worker(_) => None,
        }
    }
}

/// One rank of a solve.
pub trait Participant: Send {
    fn rank(&self) -> Rank;

    /// Run the role to completion.
    fn run(self: Box<Self>) -> Result<Report>;
}

impl<T: Transport + Send> Participant for Coordinator<T> {
    fn rank(&self) -> Rank {
        COORDINATOR
    }

    fn run(mut self: Box<Self>) -> Result<Report> {
        self.solve().map(Report::Coordinator)
    }
}

impl<T: Transport + Send> Participant for Worker<T> {
    fn rank(&self) -> Rank {
        self.summary().rank
    }

    fn run(mut self: Box<Self>) -> Result<Report> {
        self.serve().map(Report::Worker)
    }
}

/// Build the participant for `transport`'s rank.
pub fn for_rank<T>(
    transport: T,
    catalog: ItemCatalog,
    target: Capacity,
    mode: QueryMode,
) -> Result<Box<dyn Participant>>
where
    T: Transport + Send + 'static,
{
    let world_size = transport.world_size();
    if world_size < MIN_WORLD_SIZE {
        return Err(DknapError::InvalidWorldSize(world_size));
    }

    if transport.rank() == COORDINATOR {
        Ok(Box::new(Coordinator::new(transport, target, &catalog, mode)?))
    } else {
        Ok(Box::new(Worker::new(transport, catalog, target)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Item;
    use crate::transport::mesh;

    fn catalog() -> ItemCatalog {
        ItemCatalog::new(vec![Item::new(2, 3), Item::new(3, 4)])
    }

    #[test]
    fn test_roles_follow_rank() {
        let participants: Vec<_> = mesh(3)
            .into_iter()
            .map(|endpoint| for_rank(endpoint, catalog(), 6, QueryMode::Retry).unwrap())
            .collect();
        let ranks: Vec<_> = participants.iter().map(|p| p.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
    }

    #[test]
    fn test_world_of_one_is_rejected() {
        let endpoint = mesh(1).pop().unwrap();
        let result = for_rank(endpoint, catalog(), 6, QueryMode::Retry);
        assert!(matches!(result, Err(DknapError::InvalidWorldSize(1))));
    }

    #[test]
    fn test_reports_from_threads() {
        let handles: Vec<_> = mesh(3)
            .into_iter()
            .map(|endpoint| {
                let participant = for_rank(endpoint, catalog(), 7, QueryMode::Retry).unwrap();
                std::thread::spawn(move || participant.run())
            })
            .collect();

        let reports: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect();

        let solution = reports[0].clone().into_solution().unwrap();
        assert_eq!(solution.value, 10);
        assert!(matches!(&reports[1], Report::Worker(summary) if summary.rank == 1));
        assert!(reports[2].clone().into_solution().is_none());
    }
}
