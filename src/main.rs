//! dknap - distributed unbounded-knapsack solver

use std::io::IsTerminal;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};
use tracing::info;

use dknap::catalog::{Item, ItemCatalog};
use dknap::cli::{self, Cli, Commands, Verbosity};
use dknap::logging::{self, LogConfig};
use dknap::output::{self, SolveReport};
use dknap::{launch, reference};

/// Parse arguments, run the selected command, and report errors with their
/// cause chain before exiting with status 1.
fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        owo_colors::set_override(false);
    }
    init_logging(&cli);

    let result = match &cli.command {
        Commands::Solve(args) => cmd_solve(&cli, args),
        Commands::Reference(args) => cmd_reference(args),
        Commands::Pack(args) => cmd_pack(&cli, args),
        Commands::Worker(args) => cmd_worker(args),
    };

    if let Err(e) = result {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

/// Map `-q`/`-v` onto a filter; without either, the environment decides.
fn init_logging(cli: &Cli) {
    let base = match cli.command {
        Commands::Worker(_) => LogConfig::for_worker(),
        _ => LogConfig::for_cli(),
    };
    let mut config = base.with_ansi(!cli.no_color && std::io::stderr().is_terminal());

    let filter = match cli.verbosity() {
        Verbosity::Quiet => Some("error"),
        Verbosity::Normal => None,
        Verbosity::Info => Some("dknap=info"),
        Verbosity::Debug => Some("dknap=debug"),
        Verbosity::Trace => Some("dknap=trace"),
    };
    if let Some(filter) = filter {
        config = config.with_filter(filter.to_string());
    }
    // -vvv also reports how long each span (solve, launch) was busy.
    if matches!(cli.verbosity(), Verbosity::Trace) {
        config = config.with_span_events(true);
    }

    config = config.with_env_overrides();
    if let Some(format) = cli.log_format {
        config = config.with_format(format.into());
    }
    logging::init(config);
}

fn load_items(path: &std::path::Path) -> Result<ItemCatalog> {
    ItemCatalog::load(path).with_context(|| format!("Failed to load items from {}", path.display()))
}

fn cmd_solve(cli: &Cli, args: &cli::SolveArgs) -> Result<()> {
    let catalog = load_items(&args.items)?;
    let config = args.config();

    let solution = launch::solve(&catalog, &args.items, args.capacity, &config, cli.verbose)
        .context("Distributed solve failed")?;

    if args.verify {
        reference::verify(&catalog, &solution.table)
            .context("Result does not match the reference solver")?;
        info!(capacities = solution.table.len(), "Verified against the reference solver");
    }

    let report = SolveReport::new(solution, config.world_size, config.launcher, config.query_mode)
        .verified(args.verify);
    output::print_solution(&report, args.format.into());
    Ok(())
}

fn cmd_reference(args: &cli::ReferenceArgs) -> Result<()> {
    let catalog = load_items(&args.items)?;
    let value = reference::solve(&catalog, args.capacity)?;
    output::print_reference(args.capacity, value, args.format.into());
    Ok(())
}

fn cmd_pack(cli: &Cli, args: &cli::PackArgs) -> Result<()> {
    let items = args
        .items
        .iter()
        .map(|spec| spec.parse::<Item>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Invalid item")?;
    let catalog = ItemCatalog::new(items);

    catalog
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    if !cli.quiet {
        eprintln!(
            "{} {} items to {}",
            "Wrote".if_supports_color(Stderr, |text| text.green()),
            catalog.len(),
            args.output.display()
        );
    }
    Ok(())
}

fn cmd_worker(args: &cli::WorkerArgs) -> Result<()> {
    launch::run_worker_process(args.rank, args.world_size, &args.items, args.capacity)
        .with_context(|| format!("Worker {} failed", args.rank))?;
    Ok(())
}
