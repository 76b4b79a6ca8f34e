//! Readiness primitives shared by the TCP and UDP managers.
//!
//! Every bounded wait in the crate funnels through [`wait_ready`], which polls the socket
//! against an absolute [`Deadline`]. A poll interrupted by a signal is re-armed with the time
//! remaining until that deadline, never with the original timeout.
//!
//! A readable stream socket is ambiguous: it either has data queued or its peer has shut
//! down. [`is_readable`] and [`is_up`] peek one byte to tell the two apart.

use netcall_types::prelude::*;
use socket2::SockRef;
use std::io;
use std::mem::MaybeUninit;
use std::net::TcpStream;
use std::os::fd::{AsFd, AsRawFd};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

impl Interest {
    fn events(self) -> libc::c_short {
        match self {
            Interest::Readable => libc::POLLIN,
            Interest::Writable => libc::POLLOUT,
        }
    }
}

/// What a zero-timeout poll plus a one byte peek found on a stream socket
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamProbe {
    /// Nothing queued, peer still there
    Idle,
    /// At least one byte queued
    Pending,
    /// Readable with nothing to read: the peer performed an orderly close
    Closed,
    /// The peek itself failed (reset, aborted, ...)
    Failed,
}

#[allow(unsafe_code)]
fn poll_once(fd: libc::c_int, events: libc::c_short, timeout_ms: libc::c_int) -> io::Result<libc::c_short> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };

    // SAFETY: `pfd` is a valid, exclusively borrowed pollfd and the count passed is 1
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(if rc == 0 { 0 } else { pfd.revents })
}

/// Waits until `socket` is ready for `interest` or `deadline` passes. Returns `Ok(false)` on
/// expiry. Error and hang-up conditions report as ready so the following call surfaces them
pub fn wait_ready<S: AsRawFd>(socket: &S, interest: Interest, deadline: &Deadline) -> io::Result<bool> {
    let fd = socket.as_raw_fd();
    loop {
        let timeout_ms = deadline.poll_millis();
        match poll_once(fd, interest.events(), timeout_ms) {
            Ok(0) => {
                if deadline.is_unbounded() {
                    continue;
                }

                if deadline.is_expired() {
                    return Ok(false);
                }
            }

            Ok(revents) => {
                if revents & libc::POLLNVAL != 0 {
                    return Err(io::Error::from_raw_os_error(libc::EBADF));
                }

                return Ok(true);
            }

            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                log::trace!(target: "netcall", "[Readiness] poll on fd {fd} interrupted, re-arming with {:?} left", deadline.remaining());
            }

            Err(err) => return Err(err),
        }
    }
}

/// Zero-timeout variant of [`wait_ready`]
pub fn poll_ready<S: AsRawFd>(socket: &S, interest: Interest) -> io::Result<bool> {
    wait_ready(socket, interest, &Timeout::IMMEDIATE.deadline())
}

pub fn probe_stream(stream: &TcpStream) -> StreamProbe {
    match poll_ready(stream, Interest::Readable) {
        Ok(false) => return StreamProbe::Idle,
        Ok(true) => {}
        Err(_) => return StreamProbe::Failed,
    }

    let mut byte = [MaybeUninit::<u8>::uninit(); 1];
    match SockRef::from(stream).peek(&mut byte) {
        Ok(0) => StreamProbe::Closed,
        Ok(_) => StreamProbe::Pending,
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => StreamProbe::Idle,
        Err(err) => {
            log::trace!(target: "netcall", "[Readiness] peek failed: {err}");
            StreamProbe::Failed
        }
    }
}

/// True when at least one byte can be read without blocking. A peer that has closed the
/// connection is not readable
pub fn is_readable(stream: &TcpStream) -> bool {
    match probe_stream(stream) {
        StreamProbe::Pending => true,
        StreamProbe::Closed => {
            log::trace!(target: "netcall", "[Readiness] connection closed by peer");
            false
        }
        _ => false,
    }
}

/// True unless the peer has closed the connection or the socket reports an error
pub fn is_up(stream: &TcpStream) -> bool {
    matches!(probe_stream(stream), StreamProbe::Idle | StreamProbe::Pending)
}

/// True when a send would not block
pub fn is_writeable<S: AsRawFd>(socket: &S) -> bool {
    poll_ready(socket, Interest::Writable).unwrap_or(false)
}

/// Toggles blocking mode
pub fn set_blocking<S: AsFd>(socket: &S, blocking: bool) -> io::Result<()> {
    SockRef::from(socket).set_nonblocking(!blocking)
}

/// Sets the kernel receive and/or send buffer sizes
pub fn set_buffer_sizes<S: AsFd>(socket: &S, receive: Option<usize>, send: Option<usize>) -> io::Result<()> {
    let sock = SockRef::from(socket);
    if let Some(size) = receive {
        sock.set_recv_buffer_size(size)?;
    }

    if let Some(size) = send {
        sock.set_send_buffer_size(size)?;
    }

    Ok(())
}

/// The port the socket is bound to
pub fn local_port<S: AsFd>(socket: &S) -> io::Result<u16> {
    SockRef::from(socket)
        .local_addr()?
        .as_socket()
        .map(|addr| addr.port())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Socket is not an inet socket"))
}
