//! Subprocess transport.
//!
//! The coordinator re-executes the current binary once per worker
//! (`dknap worker --rank R ...`) and talks to each child over its stdin and
//! stdout. A collector thread per child turns the child's output into
//! deliveries on one shared inbox, so the coordinator can receive from any
//! worker with a single blocking call. Worker diagnostics go to the inherited
//! stderr.
//!
//! ```text
//!                 ┌──────────────────────┐
//!                 │ Coordinator (rank 0) │
//!                 └──────────┬───────────┘
//!            stdin/stdout    │    one collector thread per child
//!          ┌─────────────────┼─────────────────┐
//!    ┌─────▼─────┐     ┌─────▼─────┐     ┌─────▼─────┐
//!    │  rank 1   │     │  rank 2   │     │  rank N   │
//!    └───────────┘     └───────────┘     └───────────┘
//! ```

use super::ipc::{Incoming, MessageReader, MessageWriter, PipeFd};
use super::{Delivery, Envelope, Filter, Mailbox, Transport};
use crate::error::{DknapError, Result};
use crate::protocol::{COORDINATOR, Capacity, Message, Rank};
use crossbeam_channel::{Receiver, Sender, unbounded};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::os::fd::{AsFd, OwnedFd};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Once;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// How long a worker gets to exit on its own before it is signalled.
pub const EXIT_GRACE: Duration = Duration::from_secs(5);

static IGNORE_SIGPIPE: Once = Once::new();

/// Writing to a pipe whose reader died must surface as `EPIPE`, not kill us.
fn ignore_sigpipe() {
    IGNORE_SIGPIPE.call_once(|| {
        // Safety: SIG_IGN installs no handler code.
        unsafe {
            signal::signal(Signal::SIGPIPE, SigHandler::SigIgn).ok();
        }
    });
}

/// How to start worker subprocesses.
#[derive(Debug, Clone)]
pub struct WorkerSpawn {
    /// Binary to run; must provide the `worker` subcommand.
    pub exe: PathBuf,
    /// Item file every worker loads for itself.
    pub items: PathBuf,
    /// Target capacity of the solve.
    pub capacity: Capacity,
    /// Verbosity forwarded as `-v` flags.
    pub verbose: u8,
}

impl WorkerSpawn {
    /// Spawn copies of the running binary.
    pub fn current_exe(items: PathBuf, capacity: Capacity) -> Result<Self> {
        let exe = std::env::current_exe()
            .map_err(|e| DknapError::Spawn(format!("cannot locate current executable: {}", e)))?;
        Ok(Self::new(exe, items, capacity))
    }

    /// Spawn copies of `exe`.
    pub fn new(exe: PathBuf, items: PathBuf, capacity: Capacity) -> Self {
        Self {
            exe,
            items,
            capacity,
            verbose: 0,
        }
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    fn command(&self, rank: Rank, world_size: usize) -> Command {
        let mut cmd = Command::new(&self.exe);
        for _ in 0..self.verbose {
            cmd.arg("-v");
        }
        cmd.arg("worker")
            .arg("--rank")
            .arg(rank.to_string())
            .arg("--world-size")
            .arg(world_size.to_string())
            .arg("--items")
            .arg(&self.items)
            .arg("--capacity")
            .arg(self.capacity.to_string());
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }
}

/// Human-readable account of how a child ended.
fn describe_exit(status: WaitStatus) -> (bool, String) {
    match status {
        WaitStatus::Exited(_, 0) => (true, "exited cleanly".to_string()),
        WaitStatus::Exited(_, code) => (false, format!("exited with code {}", code)),
        WaitStatus::Signaled(_, Signal::SIGKILL, _) => {
            (false, "killed by SIGKILL (possibly the OOM killer)".to_string())
        }
        WaitStatus::Signaled(_, sig, _) => (false, format!("killed by signal {:?}", sig)),
        other => (false, format!("stopped in state {:?}", other)),
    }
}

/// A worker subprocess as seen from the coordinator.
struct ChildProc {
    rank: Rank,
    pid: Pid,
    writer: MessageWriter,
    collector: Option<JoinHandle<()>>,
    reaped: bool,
}

impl ChildProc {
    fn spawn(
        spawn: &WorkerSpawn,
        rank: Rank,
        world_size: usize,
        inbox: Sender<Delivery>,
    ) -> Result<Self> {
        let mut child = spawn
            .command(rank, world_size)
            .spawn()
            .map_err(|e| DknapError::Spawn(format!("rank {}: {}", rank, e)))?;
        let pid = Pid::from_raw(child.id() as i32);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DknapError::Spawn(format!("rank {}: stdin not captured", rank)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DknapError::Spawn(format!("rank {}: stdout not captured", rank)))?;

        let writer = MessageWriter::new(PipeFd::new(OwnedFd::from(stdin)));
        let reader = MessageReader::new(PipeFd::new(OwnedFd::from(stdout)));

        let collector = std::thread::Builder::new()
            .name(format!("dknap-collector-{}", rank))
            .spawn(move || collect(rank, reader, inbox))
            .map_err(|e| DknapError::Spawn(format!("rank {}: collector thread: {}", rank, e)))?;

        debug!(rank, pid = pid.as_raw(), "Spawned worker process");
        Ok(Self {
            rank,
            pid,
            writer,
            collector: Some(collector),
            reaped: false,
        })
    }

    fn try_wait(&mut self) -> Option<WaitStatus> {
        if self.reaped {
            return None;
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => None,
            Ok(status) => {
                self.reaped = true;
                Some(status)
            }
            Err(_) => {
                self.reaped = true;
                None
            }
        }
    }

    /// Wait up to `grace` for the child to exit, then SIGTERM, then SIGKILL.
    fn stop(&mut self, grace: Duration) -> Option<WaitStatus> {
        let start = Instant::now();
        while start.elapsed() < grace {
            if let Some(status) = self.try_wait() {
                return Some(status);
            }
            if self.reaped {
                return None;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        warn!(rank = self.rank, "Worker did not exit in time, terminating");
        let _ = signal::kill(self.pid, Signal::SIGTERM);
        std::thread::sleep(Duration::from_millis(100));
        if let Some(status) = self.try_wait() {
            return Some(status);
        }

        let _ = signal::kill(self.pid, Signal::SIGKILL);
        self.reaped = true;
        waitpid(self.pid, None).ok()
    }
}

impl Drop for ChildProc {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = signal::kill(self.pid, Signal::SIGKILL);
            let _ = waitpid(self.pid, None);
            self.reaped = true;
        }
    }
}

/// Forward a child's output to the shared inbox until EOF.
fn collect(rank: Rank, mut reader: MessageReader, inbox: Sender<Delivery>) {
    loop {
        let delivery = match reader.read() {
            Ok(Incoming::Message(message)) => Delivery::Message(Envelope {
                source: rank,
                message,
            }),
            Ok(Incoming::Malformed(detail)) => Delivery::Failed(rank, detail),
            Ok(Incoming::Eof) => Delivery::Closed(rank),
            Err(e) => Delivery::Failed(rank, e.to_string()),
        };
        let last = !matches!(delivery, Delivery::Message(_));
        if inbox.send(delivery).is_err() || last {
            return;
        }
    }
}

/// The coordinator's end of the subprocess transport.
pub struct ProcessHub {
    children: Vec<ChildProc>,
    inbox: Receiver<Delivery>,
    mailbox: Mailbox,
}

impl ProcessHub {
    /// Spawn ranks `1..world_size` as worker subprocesses.
    pub fn spawn(spawn: &WorkerSpawn, world_size: usize) -> Result<Self> {
        if world_size < 2 {
            return Err(DknapError::InvalidWorldSize(world_size));
        }
        ignore_sigpipe();

        let (sender, inbox) = unbounded();
        let children = (1..world_size)
            .map(|rank| ChildProc::spawn(spawn, rank, world_size, sender.clone()))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            workers = children.len(),
            exe = %spawn.exe.display(),
            "Worker processes started"
        );
        Ok(Self {
            children,
            inbox,
            mailbox: Mailbox::new(COORDINATOR, world_size),
        })
    }

    /// Reap every child. Children that outlive the grace period are killed.
    pub fn finish(mut self, grace: Duration) {
        for child in &mut self.children {
            match child.stop(grace) {
                Some(status) => {
                    let (clean, description) = describe_exit(status);
                    if clean {
                        trace!(rank = child.rank, "Worker {}", description);
                    } else {
                        warn!(rank = child.rank, "Worker {}", description);
                    }
                }
                None => trace!(rank = child.rank, "Worker already reaped"),
            }
            if let Some(collector) = child.collector.take() {
                let _ = collector.join();
            }
        }
    }
}

impl Transport for ProcessHub {
    fn rank(&self) -> Rank {
        COORDINATOR
    }

    fn world_size(&self) -> usize {
        self.mailbox.world_size()
    }

    fn send(&mut self, to: Rank, message: Message) -> Result<()> {
        self.mailbox.check_peer(to)?;
        let child = &mut self.children[to - 1];
        child.writer.write(&message).map_err(|e| {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                DknapError::PeerLost(to)
            } else {
                DknapError::Transport(format!("send to rank {} failed: {}", to, e))
            }
        })?;
        self.mailbox.sent(to, &message);
        Ok(())
    }

    fn recv(&mut self, filter: Filter) -> Result<Envelope> {
        let inbox = &self.inbox;
        self.mailbox.recv_with(filter, || {
            inbox
                .recv()
                .map_err(|_| DknapError::Transport("every worker link has closed".into()))
        })
    }

    fn is_live(&self, rank: Rank) -> bool {
        self.mailbox.is_live(rank)
    }
}

/// A worker subprocess's end: the coordinator is on stdin/stdout.
pub struct StdioEndpoint {
    rank: Rank,
    reader: MessageReader,
    writer: MessageWriter,
    mailbox: Mailbox,
}

impl StdioEndpoint {
    /// Attach to this process's stdin and stdout.
    pub fn from_stdio(rank: Rank, world_size: usize) -> Result<Self> {
        if world_size < 2 {
            return Err(DknapError::InvalidWorldSize(world_size));
        }
        if rank == COORDINATOR || rank >= world_size {
            return Err(DknapError::Transport(format!(
                "worker rank {} is outside 1..{}",
                rank, world_size
            )));
        }
        ignore_sigpipe();

        let stdin = std::io::stdin().as_fd().try_clone_to_owned()?;
        let stdout = std::io::stdout().as_fd().try_clone_to_owned()?;
        Ok(Self {
            rank,
            reader: MessageReader::new(PipeFd::new(stdin)),
            writer: MessageWriter::new(PipeFd::new(stdout)),
            mailbox: Mailbox::new(rank, world_size),
        })
    }
}

impl Transport for StdioEndpoint {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.mailbox.world_size()
    }

    fn send(&mut self, to: Rank, message: Message) -> Result<()> {
        self.mailbox.check_peer(to)?;
        if to != COORDINATOR {
            return Err(DknapError::Transport(format!(
                "worker processes only reach the coordinator, not rank {}",
                to
            )));
        }
        self.writer.write(&message).map_err(|e| {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                DknapError::PeerLost(COORDINATOR)
            } else {
                DknapError::Io(e)
            }
        })?;
        self.mailbox.sent(to, &message);
        Ok(())
    }

    fn recv(&mut self, filter: Filter) -> Result<Envelope> {
        let reader = &mut self.reader;
        self.mailbox.recv_with(filter, || {
            Ok(match reader.read()? {
                Incoming::Message(message) => Delivery::Message(Envelope {
                    source: COORDINATOR,
                    message,
                }),
                Incoming::Malformed(detail) => Delivery::Failed(COORDINATOR, detail),
                Incoming::Eof => Delivery::Closed(COORDINATOR),
            })
        })
    }

    fn is_live(&self, rank: Rank) -> bool {
        rank == COORDINATOR && self.mailbox.is_live(rank)
    }
}
