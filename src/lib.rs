//! dknap: an unbounded-knapsack solver split between a coordinator and a
//! pool of workers that talk only through messages.
//!
//! The coordinator owns a table of subproblem values for every capacity up
//! to the target and hands capacities out in increasing order. A worker
//! computes its capacity by querying the coordinator for each smaller
//! capacity it depends on, then reports the result back.
//!
//! ```no_run
//! use dknap::catalog::{Item, ItemCatalog};
//! use dknap::config::SolveConfig;
//! use dknap::launch::solve_in_threads;
//!
//! let catalog = ItemCatalog::new(vec![Item::new(2, 3)]);
//! let solution = solve_in_threads(&catalog, 5, &SolveConfig::new(4)).unwrap();
//! assert_eq!(solution.value, 6);
//! ```

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod launch;
pub mod logging;
pub mod output;
pub mod participant;
pub mod protocol;
pub mod reference;
pub mod transport;
pub mod version;
pub mod worker;

pub use error::{DknapError, Result};
