//! The writer's ring buffer (spec.md §4.1, §9 design notes).
//!
//! A simple `offset, length` pair over a `Vec<u8>` of fixed capacity.
//! `commit` copies the tail down instead of rotating indices; if tail
//! copies ever become a hotspot this can be swapped for a true ring
//! with wrap-around indexing without changing the semantic contract.

use crate::error::{Error, Result};

/// Default capacity of the writer's unacknowledged-byte buffer (4 MiB).
pub const DEFAULT_WRITE_BUFFER: usize = 4 * 1024 * 1024;

pub struct WriteBuffer {
    data: Vec<u8>,
    capacity: usize,
    /// Total bytes ever committed (acknowledged) so far.
    committed: u64,
}

impl WriteBuffer {
    pub fn new(capacity: usize) -> Self {
        WriteBuffer {
            data: Vec::with_capacity(capacity),
            capacity,
            committed: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn committed(&self) -> u64 {
        self.committed
    }

    /// Bytes currently buffered, i.e. written but not yet committed.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns `true` if `extra` more bytes would still fit.
    pub fn can_hold(&self, extra: usize) -> bool {
        self.data.len() + extra <= self.capacity
    }

    /// Appends bytes already confirmed written to the wire.
    pub fn push(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.can_hold(bytes.len()) {
            return Err(Error::unexpected("write buffer overflow"));
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Drops bytes up to the newly-acknowledged absolute offset, advancing
    /// `committed`. `total_offset` must be within
    /// `[committed, committed + len]`.
    pub fn commit(&mut self, total_offset: u64) -> Result<()> {
        if total_offset < self.committed {
            return Err(Error::unexpected(format!(
                "ack offset {} precedes committed offset {}",
                total_offset, self.committed
            )));
        }
        let advance = total_offset - self.committed;
        if advance > self.data.len() as u64 {
            return Err(Error::unexpected(format!(
                "ack offset {} is ahead of buffered data (committed {}, len {})",
                total_offset,
                self.committed,
                self.data.len()
            )));
        }
        self.data.drain(0..advance as usize);
        self.committed = total_offset;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_commit_drains_prefix() {
        let mut buf = WriteBuffer::new(16);
        buf.push(b"hello world").unwrap();
        assert_eq!(buf.len(), 11);
        buf.commit(5).unwrap();
        assert_eq!(buf.data(), b" world");
        assert_eq!(buf.committed(), 5);
    }

    #[test]
    fn rejects_overflow() {
        let mut buf = WriteBuffer::new(4);
        assert!(buf.push(b"12345").is_err());
    }

    #[test]
    fn rejects_commit_behind_committed() {
        let mut buf = WriteBuffer::new(16);
        buf.push(b"abcdef").unwrap();
        buf.commit(3).unwrap();
        assert!(buf.commit(1).is_err());
    }

    #[test]
    fn rejects_commit_past_buffered_data() {
        let mut buf = WriteBuffer::new(16);
        buf.push(b"abc").unwrap();
        assert!(buf.commit(100).is_err());
    }

    #[test]
    fn can_hold_respects_capacity() {
        let buf = WriteBuffer::new(8);
        assert!(buf.can_hold(8));
        assert!(!buf.can_hold(9));
    }
}
