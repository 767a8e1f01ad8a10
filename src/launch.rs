//! Starting participants and collecting their results.
//!
//! With the thread launcher every worker runs on a named scoped thread and
//! the coordinator runs on the calling thread. With the process launcher the
//! coordinator stays in this process and each worker is a `dknap worker`
//! subprocess that loads the item file for itself.

use crate::catalog::ItemCatalog;
use crate::config::{Launcher, QueryMode, SolveConfig};
use crate::coordinator::{Coordinator, Solution};
use crate::error::{DknapError, Result};
use crate::participant::{Report, for_rank};
use crate::protocol::{Capacity, Rank};
use crate::transport::process::EXIT_GRACE;
use crate::transport::{ProcessHub, StdioEndpoint, WorkerSpawn, mesh};
use crate::worker::WorkerSummary;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Solve with the configured launcher.
///
/// `items` is only read by worker subprocesses; `catalog` must be its
/// decoded contents.
pub fn solve(
    catalog: &ItemCatalog,
    items: &Path,
    target: Capacity,
    config: &SolveConfig,
    verbose: u8,
) -> Result<Solution> {
    match config.launcher {
        Launcher::Threads => solve_in_threads(catalog, target, config),
        Launcher::Processes => {
            let spawn = WorkerSpawn::current_exe(items.to_path_buf(), target)?.with_verbose(verbose);
            solve_in_processes(catalog, &spawn, config)
        }
    }
}

/// Run every participant as a thread of this process.
#[instrument(level = "debug", skip_all, fields(capacity = target, world_size = config.world_size))]
pub fn solve_in_threads(catalog: &ItemCatalog, target: Capacity, config: &SolveConfig) -> Result<Solution> {
    config.validate()?;

    let mut participants = mesh(config.world_size)
        .into_iter()
        .map(|endpoint| for_rank(endpoint, catalog.clone(), target, config.query_mode))
        .collect::<Result<Vec<_>>>()?;
    let coordinator = participants.remove(0);

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(participants.len());
        for participant in participants {
            let rank = participant.rank();
            let handle = std::thread::Builder::new()
                .name(format!("dknap-worker-{}", rank))
                .spawn_scoped(scope, move || participant.run())
                .map_err(|e| DknapError::Spawn(format!("rank {}: {}", rank, e)))?;
            handles.push((rank, handle));
        }
        info!(workers = config.worker_count(), "Worker threads started");

        let outcome = coordinator.run();

        let mut failures = Vec::new();
        for (rank, handle) in handles {
            match handle.join() {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => failures.push((rank, e)),
                Err(_) => failures.push((
                    rank,
                    DknapError::Transport(format!("worker thread {} panicked", rank)),
                )),
            }
        }
        settle(outcome, failures)
    })
}

/// Prefer a worker's own error over the coordinator noticing it vanished.
fn settle(outcome: Result<Report>, failures: Vec<(Rank, DknapError)>) -> Result<Solution> {
    let outcome = outcome.and_then(|report| {
        report
            .into_solution()
            .ok_or_else(|| DknapError::Transport("rank 0 did not run the coordinator".into()))
    });

    match outcome {
        Ok(solution) => match failures.into_iter().next() {
            Some((_, e)) => Err(e),
            None => Ok(solution),
        },
        Err(DknapError::PeerLost(lost)) => {
            let mut cause = None;
            for (rank, e) in failures {
                if rank == lost && cause.is_none() {
                    cause = Some(e);
                } else {
                    debug!(rank, error = %e, "Worker stopped after the abort");
                }
            }
            Err(cause.unwrap_or(DknapError::PeerLost(lost)))
        }
        Err(e) => {
            for (rank, failure) in failures {
                debug!(rank, error = %failure, "Worker stopped after the abort");
            }
            Err(e)
        }
    }
}

/// Run the coordinator here and every worker as a subprocess.
#[instrument(level = "debug", skip_all, fields(capacity = spawn.capacity, world_size = config.world_size))]
pub fn solve_in_processes(
    catalog: &ItemCatalog,
    spawn: &WorkerSpawn,
    config: &SolveConfig,
) -> Result<Solution> {
    config.validate()?;

    let hub = ProcessHub::spawn(spawn, config.world_size)?;
    info!(workers = config.worker_count(), "Worker processes started");
    let mut coordinator = Coordinator::new(hub, spawn.capacity, catalog, config.query_mode)?;
    let outcome = coordinator.solve();
    let hub = coordinator.into_transport();

    // On failure the hub is dropped, which kills any remaining children.
    if outcome.is_ok() {
        hub.finish(EXIT_GRACE);
    }
    outcome
}

/// Entry point of a `dknap worker` subprocess.
pub fn run_worker_process(
    rank: Rank,
    world_size: usize,
    items: &Path,
    target: Capacity,
) -> Result<WorkerSummary> {
    let catalog = ItemCatalog::load(items)?;
    let endpoint = StdioEndpoint::from_stdio(rank, world_size)?;
    debug!(rank, world_size, "Worker process attached to coordinator");

    // The query mode only affects the coordinator.
    match for_rank(endpoint, catalog, target, QueryMode::default())?.run()? {
        Report::Worker(summary) => Ok(summary),
        Report::Coordinator(_) => Err(DknapError::Transport(format!(
            "rank {} ran the coordinator in a worker process",
            rank
        ))),
    }
}
