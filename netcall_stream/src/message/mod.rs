//! Framed binary messages with a 12-byte GIOP header.
//!
//! Reading is two-phase: the header is read against the caller's timeout, then the body is
//! read with an unbounded wait. A header read that times out consumes nothing, so it can be
//! retried. The body and output buffers grow to the largest message seen and are never
//! shrunk.

mod header;

pub use header::{MessageHeader, MessageType, FLAG_LITTLE_ENDIAN, GIOP_MAGIC, HEADER_SIZE};

use crate::buffered::{BufferedInput, BufferedOutput};
use netcall_types::prelude::*;
use netcall_wire::connection::Connection;
use netcall_wire::tcp::TcpEndpoint;

/// Body bytes read (and allocated) per step
const BODY_STEP: usize = 64 * 1024;

pub struct MessageStream<C: Connection = TcpEndpoint> {
    conn: C,
    input: BufferedInput,
    body: Vec<u8>,
    output: BufferedOutput,
    request_id: u32,
    max_message_size: usize,
}

impl<C: Connection> MessageStream<C> {
    pub fn new(conn: C) -> Self {
        Self::with_input_capacity(conn, crate::buffered::DEFAULT_INPUT_CAPACITY)
    }

    pub fn with_input_capacity(conn: C, capacity: usize) -> Self {
        log::debug!(target: "netcall", "[Message] ({}) created", conn.name());
        Self {
            conn,
            input: BufferedInput::new(capacity),
            body: Vec::new(),
            output: BufferedOutput::default(),
            request_id: 0,
            max_message_size: u32::MAX as usize,
        }
    }

    /// Rejects incoming messages whose announced body exceeds `limit` bytes with
    /// [`NetError::MessageTooLarge`]. The unread body is left on the connection, so the
    /// stream should be closed afterwards
    pub fn with_max_message_size(mut self, limit: usize) -> Self {
        self.max_message_size = limit;
        self
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Reads one message. The returned body borrows the stream's buffer and is valid until
    /// the next read
    pub fn read_message(&mut self, timeout: Timeout) -> NetResult<(MessageHeader, &[u8])> {
        let mut raw = [0u8; HEADER_SIZE];
        self.input.read_exact(&mut self.conn, timeout, &mut raw)?;
        let header = MessageHeader::decode(&raw).map_err(|err| {
            log::warn!(target: "netcall", "[Message] ({}) {err}", self.conn.name());
            err
        })?;

        let size = header.size as usize;
        if size > self.max_message_size {
            log::warn!(target: "netcall", "[Message] ({}) peer announced {size} body bytes, limit is {}", self.conn.name(), self.max_message_size);
            return Err(NetError::MessageTooLarge(size));
        }

        // the body buffer grows only as far as bytes actually arrive
        let mut filled = 0;
        while filled < size {
            let end = size.min(filled + BODY_STEP);
            if self.body.len() < end {
                self.body
                    .try_reserve_exact(end - self.body.len())
                    .map_err(|_| NetError::MessageTooLarge(size))?;
                self.body.resize(end, 0);
            }

            self.input
                .read_exact(&mut self.conn, Timeout::Forever, &mut self.body[filled..end])?;
            filled = end;
        }

        log::trace!(target: "netcall", "[Message] ({}) input: {:?} with {size} body bytes", self.conn.name(), header.message_type);
        Ok((header, &self.body[..size]))
    }

    /// Sends `header` and `body` as one transmission. The byte-order bit and size are
    /// stamped from this host and `body`. Each call counts as one request, even one that
    /// times out; unsent bytes stay queued for [`flush`](Self::flush)
    pub fn write_message(&mut self, timeout: Timeout, header: &MessageHeader, body: &[u8]) -> NetResult<usize> {
        let size = u32::try_from(body.len()).map_err(|_| NetError::MessageTooLarge(body.len()))?;
        let header = MessageHeader { size, ..header.with_host_order() };

        self.request_id = self.request_id.wrapping_add(1);
        self.output.queue(&header.encode());
        self.output.queue(body);
        log::trace!(target: "netcall", "[Message] ({}) output #{}: {:?} with {size} body bytes", self.conn.name(), self.request_id, header.message_type);
        self.output.flush(&mut self.conn, timeout)
    }

    /// Sends whatever an earlier timed-out write left queued
    pub fn flush(&mut self, timeout: Timeout) -> NetResult<usize> {
        self.output.flush(&mut self.conn, timeout)
    }

    pub fn pending_output(&self) -> usize {
        self.output.pending()
    }

    /// Number of messages written so far
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    pub fn get_ref(&self) -> &C {
        &self.conn
    }

    pub fn name(&self) -> &str {
        self.conn.name()
    }

    pub fn is_readable(&self) -> bool {
        self.input.pending() > 0 || self.conn.is_readable()
    }

    pub fn is_up(&self) -> bool {
        self.conn.is_up()
    }

    pub fn is_writeable(&self) -> bool {
        self.conn.is_writeable()
    }

    pub fn close(&mut self) {
        self.conn.close()
    }
}

impl<C: Connection> Drop for MessageStream<C> {
    fn drop(&mut self) {
        self.conn.close()
    }
}
