//! Command-line interface definitions using clap.

use crate::config::{Launcher, QueryMode, SolveConfig};
use crate::logging::LogFormat;
use crate::output::OutputFormat;
use crate::protocol::{Capacity, Rank};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Distributed unbounded-knapsack solver.
#[derive(Parser, Debug)]
#[command(name = "dknap")]
#[command(author, version = crate::version::PKG_VERSION, long_version = crate::version::long_version(), about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors and results.
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    /// Disable colored output. Any non-empty NO_COLOR also disables it.
    #[arg(
        long,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new(),
        global = true
    )]
    pub no_color: bool,

    /// Log output format (overrides DKNAP_LOG_FORMAT).
    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Solve with a coordinator and workers.
    Solve(SolveArgs),

    /// Solve in a single process with the reference dynamic program.
    Reference(ReferenceArgs),

    /// Write an item file from WEIGHT:VALUE pairs.
    Pack(PackArgs),

    /// Run one worker over stdin/stdout (used by the process launcher).
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// Arguments for the solve command.
#[derive(Parser, Debug)]
pub struct SolveArgs {
    /// Target capacity (positive).
    #[arg(value_parser = parse_capacity)]
    pub capacity: Capacity,

    /// Item file: little-endian i32 (weight, value) pairs.
    #[arg(value_parser = parse_existing_file)]
    pub items: PathBuf,

    /// Participants including the coordinator.
    #[arg(short = 'n', long, env = "DKNAP_WORLD_SIZE", default_value_t = SolveConfig::default().world_size)]
    pub world_size: usize,

    /// Where workers run.
    #[arg(long, value_enum, env = "DKNAP_LAUNCHER", default_value_t = LauncherArg::Threads)]
    pub launcher: LauncherArg,

    /// How queries for unresolved capacities are answered.
    #[arg(long, value_enum, env = "DKNAP_QUERY_MODE", default_value_t = QueryModeArg::Retry)]
    pub query_mode: QueryModeArg,

    /// Check every capacity against the reference dynamic program.
    #[arg(long)]
    pub verify: bool,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormatArg::Plain)]
    pub format: OutputFormatArg,
}

impl SolveArgs {
    pub fn config(&self) -> SolveConfig {
        SolveConfig::new(self.world_size)
            .with_launcher(self.launcher.into())
            .with_query_mode(self.query_mode.into())
    }
}

/// Arguments for the reference command.
#[derive(Parser, Debug)]
pub struct ReferenceArgs {
    /// Target capacity (positive).
    #[arg(value_parser = parse_capacity)]
    pub capacity: Capacity,

    /// Item file.
    #[arg(value_parser = parse_existing_file)]
    pub items: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormatArg::Plain)]
    pub format: OutputFormatArg,
}

/// Arguments for the pack command.
#[derive(Parser, Debug)]
pub struct PackArgs {
    /// File to write.
    pub output: PathBuf,

    /// Items as WEIGHT:VALUE.
    #[arg(required = true)]
    pub items: Vec<String>,
}

/// Arguments for the hidden worker command.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    #[arg(long)]
    pub rank: Rank,

    #[arg(long)]
    pub world_size: usize,

    #[arg(long)]
    pub items: PathBuf,

    #[arg(long)]
    pub capacity: Capacity,
}

fn parse_capacity(s: &str) -> Result<Capacity, String> {
    let capacity: Capacity = s
        .parse()
        .map_err(|_| format!("'{}' is not a non-negative integer", s))?;
    if capacity == 0 {
        return Err("capacity must be positive".to_string());
    }
    Ok(capacity)
}

fn parse_existing_file(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("no such item file: {}", s))
    }
}

/// Output format argument.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormatArg {
    /// The value alone.
    #[default]
    Plain,
    /// JSON with run statistics.
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Plain => OutputFormat::Plain,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

/// Launcher argument.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LauncherArg {
    /// Threads in this process.
    #[default]
    Threads,
    /// One subprocess per worker.
    Processes,
}

impl From<LauncherArg> for Launcher {
    fn from(arg: LauncherArg) -> Self {
        match arg {
            LauncherArg::Threads => Launcher::Threads,
            LauncherArg::Processes => Launcher::Processes,
        }
    }
}

/// Query mode argument.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueryModeArg {
    /// Reply pending; the worker asks again.
    #[default]
    Retry,
    /// Hold the query until the value is known.
    Deferred,
}

impl From<QueryModeArg> for QueryMode {
    fn from(arg: QueryModeArg) -> Self {
        match arg {
            QueryModeArg::Retry => QueryMode::Retry,
            QueryModeArg::Deferred => QueryMode::Deferred,
        }
    }
}

/// Log format argument.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Verbosity level for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// -q: errors only.
    Quiet,
    /// Default: warnings, errors and results.
    Normal,
    /// -v: lifecycle events.
    Info,
    /// -vv: protocol events.
    Debug,
    /// -vvv: every message.
    Trace,
}

impl Cli {
    /// Get the verbosity level based on -v and -q flags.
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            return Verbosity::Quiet;
        }
        match self.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Info,
            2 => Verbosity::Debug,
            _ => Verbosity::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::NamedTempFile;

    fn items_file() -> NamedTempFile {
        NamedTempFile::new().unwrap()
    }

    #[test]
    fn test_cli_parsing() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_solve_command() {
        let items = items_file();
        let path = items.path().to_str().unwrap();
        let args = Cli::try_parse_from(["dknap", "solve", "10", path]).unwrap();
        match args.command {
            Commands::Solve(solve) => {
                assert_eq!(solve.capacity, 10);
                assert_eq!(solve.items, items.path());
                assert_eq!(solve.launcher, LauncherArg::Threads);
                assert_eq!(solve.query_mode, QueryModeArg::Retry);
                assert!(!solve.verify);
                assert_eq!(solve.format, OutputFormatArg::Plain);
            }
            _ => panic!("Expected Solve command"),
        }
    }

    #[test]
    fn test_solve_with_options() {
        let items = items_file();
        let path = items.path().to_str().unwrap();
        let args = Cli::try_parse_from([
            "dknap",
            "solve",
            "7",
            path,
            "-n",
            "6",
            "--launcher",
            "processes",
            "--query-mode",
            "deferred",
            "--verify",
            "--format",
            "json",
        ])
        .unwrap();
        match args.command {
            Commands::Solve(solve) => {
                let config = solve.config();
                assert_eq!(config.world_size, 6);
                assert_eq!(config.launcher, Launcher::Processes);
                assert_eq!(config.query_mode, QueryMode::Deferred);
                assert!(solve.verify);
                assert_eq!(solve.format, OutputFormatArg::Json);
            }
            _ => panic!("Expected Solve command"),
        }
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let items = items_file();
        let path = items.path().to_str().unwrap();
        assert!(Cli::try_parse_from(["dknap", "solve", "0", path]).is_err());
        assert!(Cli::try_parse_from(["dknap", "solve", "-3", path]).is_err());
        assert!(Cli::try_parse_from(["dknap", "reference", "0", path]).is_err());
    }

    #[test]
    fn test_missing_items_file_is_rejected() {
        let result = Cli::try_parse_from(["dknap", "solve", "5", "/nonexistent/items.bin"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_pack_command() {
        let args = Cli::try_parse_from(["dknap", "pack", "out.bin", "2:3", "1:1"]).unwrap();
        match args.command {
            Commands::Pack(pack) => {
                assert_eq!(pack.output, PathBuf::from("out.bin"));
                assert_eq!(pack.items, vec!["2:3", "1:1"]);
            }
            _ => panic!("Expected Pack command"),
        }
        assert!(Cli::try_parse_from(["dknap", "pack", "out.bin"]).is_err());
    }

    #[test]
    fn test_worker_command() {
        let args = Cli::try_parse_from([
            "dknap",
            "worker",
            "--rank",
            "2",
            "--world-size",
            "4",
            "--items",
            "items.bin",
            "--capacity",
            "9",
        ])
        .unwrap();
        match args.command {
            Commands::Worker(worker) => {
                assert_eq!(worker.rank, 2);
                assert_eq!(worker.world_size, 4);
                assert_eq!(worker.capacity, 9);
            }
            _ => panic!("Expected Worker command"),
        }
    }

    #[test]
    fn test_no_color_follows_env_convention() {
        use clap::builder::TypedValueParser;
        use std::ffi::OsStr;

        let cmd = Cli::command();
        let arg = cmd
            .get_arguments()
            .find(|arg| arg.get_id() == "no_color")
            .unwrap();
        assert_eq!(arg.get_env(), Some(OsStr::new("NO_COLOR")));

        let parser = clap::builder::FalseyValueParser::new();
        for (raw, expected) in [("1", true), ("yes", true), ("", false), ("0", false)] {
            assert_eq!(parser.parse_ref(&cmd, Some(arg), OsStr::new(raw)).unwrap(), expected);
        }

        let args = Cli::try_parse_from(["dknap", "--no-color", "pack", "o", "1:1"]).unwrap();
        assert!(args.no_color);
    }

    #[test]
    fn test_global_options() {
        let args =
            Cli::try_parse_from(["dknap", "-vv", "--no-color", "--log-format", "json", "pack", "o", "1:1"])
                .unwrap();
        assert_eq!(args.verbose, 2);
        assert!(args.no_color);
        assert_eq!(args.log_format, Some(LogFormatArg::Json));
        assert_eq!(args.verbosity(), Verbosity::Debug);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["dknap", "-v", "-q", "pack", "o", "1:1"]);
        assert!(result.is_err());
        let args = Cli::try_parse_from(["dknap", "-q", "pack", "o", "1:1"]).unwrap();
        assert_eq!(args.verbosity(), Verbosity::Quiet);
    }
}
