//! Mock socket implementation for testing.
//!
//! The mock pre-loads response frames and records everything written to it, so tests can
//! exercise connections without a real socket. Descriptor passing can be simulated per
//! direction.

use std::{
    os::fd::{BorrowedFd, OwnedFd},
    sync::{Arc, Mutex},
};

use crate::connection::socket::{ReadHalf, Socket, WriteHalf};

/// What a [`MockSocket`]'s write half has seen so far.
#[derive(Debug, Default)]
pub struct WrittenLog {
    /// All bytes written, concatenated.
    pub bytes: Vec<u8>,
    /// The number of write operations.
    pub writes: usize,
    /// The number of descriptors attached to each write.
    pub fd_counts: Vec<usize>,
}

/// Mock socket with canned responses and a write log.
#[derive(Debug)]
pub struct MockSocket {
    read_data: Vec<u8>,
    read_fds: Vec<OwnedFd>,
    fd_passing: bool,
    written: Arc<Mutex<WrittenLog>>,
}

impl MockSocket {
    /// Create a mock whose read side yields the given frames, each `\0`-terminated.
    pub fn new(responses: &[&str]) -> Self {
        let mut data = Vec::new();
        for response in responses {
            data.extend_from_slice(response.as_bytes());
            data.push(b'\0');
        }
        Self::new_raw(data)
    }

    /// Create a mock whose read side yields exactly the given bytes.
    pub fn new_raw(data: Vec<u8>) -> Self {
        Self {
            read_data: data,
            read_fds: Vec::new(),
            fd_passing: false,
            written: Arc::new(Mutex::new(WrittenLog::default())),
        }
    }

    /// Advertise descriptor passing on both halves.
    pub fn with_fd_passing(mut self) -> Self {
        self.fd_passing = true;
        self
    }

    /// Deliver `fds` alongside the first read.
    pub fn with_incoming_fds(mut self, fds: Vec<OwnedFd>) -> Self {
        self.read_fds = fds;
        self
    }

    /// A handle to the write log, usable after the socket has been consumed.
    pub fn written_log(&self) -> Arc<Mutex<WrittenLog>> {
        self.written.clone()
    }
}

impl Socket for MockSocket {
    type ReadHalf = MockReadHalf;
    type WriteHalf = MockWriteHalf;

    fn split(self) -> (Self::ReadHalf, Self::WriteHalf) {
        (
            MockReadHalf {
                data: self.read_data,
                fds: self.read_fds,
                pos: 0,
                fd_passing: self.fd_passing,
            },
            MockWriteHalf {
                written: self.written,
                fd_passing: self.fd_passing,
            },
        )
    }
}

/// Read half of a [`MockSocket`].
#[derive(Debug)]
pub struct MockReadHalf {
    data: Vec<u8>,
    fds: Vec<OwnedFd>,
    pos: usize,
    fd_passing: bool,
}

impl ReadHalf for MockReadHalf {
    async fn read(&mut self, buf: &mut [u8], fds: &mut Vec<OwnedFd>) -> crate::Result<usize> {
        let remaining = self.data.len().saturating_sub(self.pos);
        if remaining == 0 {
            return Ok(0);
        }

        let to_read = remaining.min(buf.len());
        buf[..to_read].copy_from_slice(&self.data[self.pos..self.pos + to_read]);
        self.pos += to_read;
        fds.append(&mut self.fds);
        Ok(to_read)
    }

    fn supports_fd_passing(&self) -> bool {
        self.fd_passing
    }
}

/// Write half of a [`MockSocket`].
#[derive(Debug)]
pub struct MockWriteHalf {
    written: Arc<Mutex<WrittenLog>>,
    fd_passing: bool,
}

impl WriteHalf for MockWriteHalf {
    async fn write(&mut self, buf: &[u8], fds: &[BorrowedFd<'_>]) -> crate::Result<()> {
        assert!(fds.is_empty() || self.fd_passing);
        let mut log = self.written.lock().unwrap();
        log.bytes.extend_from_slice(buf);
        log.writes += 1;
        log.fd_counts.push(fds.len());
        Ok(())
    }

    fn supports_fd_passing(&self) -> bool {
        self.fd_passing
    }
}
