//! Line-framed message I/O over pipes.
//!
//! Each [`Message`] travels as one JSON line. Reads and writes retry on
//! `EINTR`.

use crate::protocol::Message;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

/// Messages are tiny; a small buffer holds many of them.
const BUFFER_SIZE: usize = 8 * 1024;

/// An owned pipe end with EINTR-safe `Read`/`Write`.
pub struct PipeFd {
    fd: OwnedFd,
}

impl PipeFd {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Create a connected `(read, write)` pair.
    pub fn pair() -> io::Result<(Self, Self)> {
        let (read, write) = nix::unistd::pipe().map_err(io::Error::from)?;
        Ok((Self::new(read), Self::new(write)))
    }
}

impl AsFd for PipeFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl Read for PipeFd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::read(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from(e)),
            }
        }
    }
}

impl Write for PipeFd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::write(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from(e)),
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// What a [`MessageReader`] produced.
#[derive(Debug, PartialEq, Eq)]
pub enum Incoming {
    Message(Message),
    /// The line was not a valid message.
    Malformed(String),
    /// The writer closed its end.
    Eof,
}

/// Reads one message per line.
pub struct MessageReader {
    reader: BufReader<PipeFd>,
    line: String,
}

impl MessageReader {
    pub fn new(fd: PipeFd) -> Self {
        Self {
            reader: BufReader::with_capacity(BUFFER_SIZE, fd),
            line: String::with_capacity(128),
        }
    }

    /// Block for the next line. Blank lines are skipped.
    pub fn read(&mut self) -> io::Result<Incoming> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(Incoming::Eof);
            }
            let line = self.line.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }
            return Ok(match Message::from_line(line) {
                Ok(message) => Incoming::Message(message),
                Err(e) => Incoming::Malformed(format!("{}: {:?}", e, line)),
            });
        }
    }
}

/// Writes one message per line, flushing after each.
pub struct MessageWriter {
    writer: BufWriter<PipeFd>,
}

impl MessageWriter {
    pub fn new(fd: PipeFd) -> Self {
        Self {
            writer: BufWriter::with_capacity(BUFFER_SIZE, fd),
        }
    }

    pub fn write(&mut self, message: &Message) -> io::Result<()> {
        self.writer.write_all(message.to_line().as_bytes())?;
        self.writer.flush()
    }

    /// Write raw bytes and flush.
    #[cfg(test)]
    fn write_raw(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()
    }
}
