use crate::tcp::TcpEndpoint;
use netcall_types::prelude::*;

/// How many bytes a read must gather before returning
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReadMode {
    /// Fill the whole buffer. The timeout bounds only the arrival of the first byte; once
    /// anything has arrived the read waits as long as it takes for the rest
    Exact,
    /// Return after the first successful receive, with at most `buf.len()` bytes
    FirstChunk,
}

/// A reliable, ordered byte connection with timeout-bounded I/O. The line and message streams
/// are layered on top of this
pub trait Connection {
    fn read(&mut self, timeout: Timeout, mode: ReadMode, buf: &mut [u8]) -> NetResult<usize>;
    /// Sends all of `buf`. On expiry the error carries the number of bytes already sent
    fn write(&mut self, timeout: Timeout, buf: &[u8]) -> NetResult<usize>;
    fn is_readable(&self) -> bool;
    fn is_up(&self) -> bool;
    fn is_writeable(&self) -> bool;
    fn name(&self) -> &str;
    /// Sizing hint for the kernel send buffer. Connections without one ignore it
    fn set_send_buffer_size(&self, _size: usize) -> NetResult<()> {
        Ok(())
    }
    /// Idempotent
    fn close(&mut self);
}

impl Connection for TcpEndpoint {
    fn read(&mut self, timeout: Timeout, mode: ReadMode, buf: &mut [u8]) -> NetResult<usize> {
        TcpEndpoint::read(self, timeout, mode, buf)
    }

    fn write(&mut self, timeout: Timeout, buf: &[u8]) -> NetResult<usize> {
        TcpEndpoint::write(self, timeout, buf)
    }

    fn is_readable(&self) -> bool {
        TcpEndpoint::is_readable(self)
    }

    fn is_up(&self) -> bool {
        TcpEndpoint::is_up(self)
    }

    fn is_writeable(&self) -> bool {
        TcpEndpoint::is_writeable(self)
    }

    fn name(&self) -> &str {
        TcpEndpoint::name(self)
    }

    fn set_send_buffer_size(&self, size: usize) -> NetResult<()> {
        self.set_buffer_sizes(None, Some(size))
    }

    fn close(&mut self) {
        TcpEndpoint::close(self)
    }
}

impl<T: Connection + ?Sized> Connection for Box<T> {
    fn read(&mut self, timeout: Timeout, mode: ReadMode, buf: &mut [u8]) -> NetResult<usize> {
        (**self).read(timeout, mode, buf)
    }

    fn write(&mut self, timeout: Timeout, buf: &[u8]) -> NetResult<usize> {
        (**self).write(timeout, buf)
    }

    fn is_readable(&self) -> bool {
        (**self).is_readable()
    }

    fn is_up(&self) -> bool {
        (**self).is_up()
    }

    fn is_writeable(&self) -> bool {
        (**self).is_writeable()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn set_send_buffer_size(&self, size: usize) -> NetResult<()> {
        (**self).set_send_buffer_size(size)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
