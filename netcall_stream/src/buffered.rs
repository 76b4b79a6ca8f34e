//! Buffering helpers shared by the stream layers.
//!
//! [`BufferedInput`] keeps a fixed-capacity receive buffer that serves logical reads of any
//! size, so a stream of small framed messages costs one receive per buffer-full instead of
//! one per field. [`BufferedOutput`] queues outgoing bytes and keeps whatever a timed-out
//! flush could not send. Neither owns the connection; it is passed to each call.

use bytes::{Buf, BytesMut};
use netcall_types::prelude::*;
use netcall_wire::connection::{Connection, ReadMode};

pub const DEFAULT_INPUT_CAPACITY: usize = 32 * 1024;

#[derive(Debug)]
pub struct BufferedInput {
    buf: Box<[u8]>,
    start: usize,
    end: usize,
}

impl Default for BufferedInput {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_CAPACITY)
    }
}

impl BufferedInput {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(1)].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of received bytes not yet handed out
    pub fn pending(&self) -> usize {
        self.end - self.start
    }

    /// Fills `out` completely. `timeout` bounds only the first receive; once that has
    /// produced data, further receives wait as long as needed. A timeout consumes nothing, so
    /// the read can simply be repeated
    pub fn read_exact<C: Connection + ?Sized>(&mut self, conn: &mut C, timeout: Timeout, out: &mut [u8]) -> NetResult<()> {
        let wanted = out.len();
        if wanted == 0 {
            return Ok(());
        }

        if wanted <= self.capacity() {
            self.fill_to(conn, timeout, wanted)?;
            out.copy_from_slice(&self.buf[self.start..self.start + wanted]);
            self.consume(wanted);
            return Ok(());
        }

        // too large to stage: hand out what is buffered, read the rest straight into `out`
        let buffered = self.pending();
        out[..buffered].copy_from_slice(&self.buf[self.start..self.end]);
        conn.read(timeout, ReadMode::Exact, &mut out[buffered..])?;
        self.consume(buffered);
        Ok(())
    }

    fn fill_to<C: Connection + ?Sized>(&mut self, conn: &mut C, timeout: Timeout, wanted: usize) -> NetResult<()> {
        if self.pending() >= wanted {
            return Ok(());
        }

        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }

        let mut timeout = timeout;
        while self.pending() < wanted {
            let received = conn.read(timeout, ReadMode::FirstChunk, &mut self.buf[self.end..])?;
            log::trace!(target: "netcall", "[Buffered] ({}) refilled {received} bytes", conn.name());
            self.end += received;
            timeout = Timeout::Forever;
        }

        Ok(())
    }

    fn consume(&mut self, count: usize) {
        self.start += count;
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }
}

/// Outgoing bytes waiting to be sent
#[derive(Debug, Default)]
pub struct BufferedOutput {
    buf: BytesMut,
}

impl BufferedOutput {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn queue(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Sends everything queued. On expiry the bytes that did go out are dropped from the
    /// queue, the rest stay for the next flush
    pub fn flush<C: Connection + ?Sized>(&mut self, conn: &mut C, timeout: Timeout) -> NetResult<usize> {
        if self.buf.is_empty() {
            return Ok(0);
        }

        match conn.write(timeout, &self.buf) {
            Ok(sent) => {
                self.buf.clear();
                Ok(sent)
            }

            Err(err) => {
                let sent = err.transferred();
                if sent > 0 {
                    self.buf.advance(sent);
                }

                log::trace!(target: "netcall", "[Buffered] ({}) flush stopped after {sent} bytes, {} left", conn.name(), self.buf.len());
                Err(err)
            }
        }
    }
}
