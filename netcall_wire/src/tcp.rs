//! TCP endpoint management.
//!
//! A [`TcpManager`] creates endpoints: [`TcpManager::listen`] yields a listening endpoint,
//! [`TcpEndpoint::accept`] and [`TcpManager::connect`] yield data endpoints. Every bounded
//! operation takes a [`Timeout`] and reports expiry as [`NetError::WouldBlock`], carrying the
//! number of bytes moved before the deadline passed.
//!
//! # Deferred connects
//! `connect` with [`ConnectMode::Deferred`] only initiates the connection and returns an
//! endpoint in the [`ConnectState::Pending`] state. [`TcpEndpoint::complete_connect`] is then
//! polled until it reports success, a failure, or runs out of time:
//!
//! ```no_run
//! use netcall_types::prelude::*;
//! use netcall_wire::tcp::{ConnectMode, TcpManager};
//!
//! let manager = TcpManager::default();
//! let mut endpoint = manager.connect("http@example.com", ConnectMode::Deferred).unwrap();
//! loop {
//!     match endpoint.complete_connect(Timeout::from(0.1), false) {
//!         Ok(()) => break,
//!         Err(err) if err.is_would_block() => continue, // do other work here
//!         Err(err) => panic!("{err}"),
//!     }
//! }
//! ```

use crate::config::WireConfig;
use crate::connection::ReadMode;
use crate::readiness::{self, Interest};
use crate::resolve::{self, Protocol, ServiceTarget};
use crate::socket_helpers;
use netcall_types::prelude::*;
use socket2::{SockAddr, SockRef};
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EndpointKind {
    Listening,
    Data,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectState {
    /// A deferred connect has been initiated but not completed
    Pending,
    Established,
    /// The connection attempt failed. The endpoint is only good for closing
    Failed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectMode {
    /// Connect before returning
    Blocking,
    /// Initiate the connect and return immediately. See [`TcpEndpoint::complete_connect`]
    Deferred,
}

#[derive(Debug)]
enum TcpSocket {
    Listener(TcpListener),
    Stream(TcpStream),
}

impl AsRawFd for TcpSocket {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            TcpSocket::Listener(listener) => listener.as_raw_fd(),
            TcpSocket::Stream(stream) => stream.as_raw_fd(),
        }
    }
}

/// Creates TCP endpoints that share one [`WireConfig`]
#[derive(Clone, Debug, Default)]
pub struct TcpManager {
    config: Arc<WireConfig>,
}

impl TcpManager {
    pub fn new(config: WireConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &WireConfig {
        &self.config
    }

    /// Listens at `service` (a service name or numeric port; `None` means "0", an ephemeral
    /// port). A negative backlog or one larger than the configured maximum is replaced by the
    /// maximum. For port 0 the endpoint is named after the port actually bound
    pub fn listen(&self, service: Option<&str>, backlog: i32) -> NetResult<TcpEndpoint> {
        let service = service.unwrap_or("0");
        let backlog = if backlog < 0 || backlog > self.config.max_backlog {
            self.config.max_backlog
        } else {
            backlog.max(1)
        };

        let port = resolve::port_of(service, Protocol::Tcp, &self.config.services_path())?;
        let addr = socket_helpers::wildcard_addr(port, self.config.dual_stack);
        let listener = socket_helpers::get_tcp_listener(addr, backlog)?;
        let bound_port = listener.local_addr()?.port();

        let name = if port == 0 {
            bound_port.to_string()
        } else {
            service.to_string()
        };

        log::info!(target: "netcall", "[TCP] Listening on {name}, port {bound_port} (backlog {backlog})");

        Ok(TcpEndpoint {
            name,
            kind: EndpointKind::Listening,
            state: ConnectState::Established,
            socket: Some(TcpSocket::Listener(listener)),
            config: self.config.clone(),
        })
    }

    /// Connects to `target`, given as `service[@host]`. The host defaults to this machine
    pub fn connect(&self, target: &str, mode: ConnectMode) -> NetResult<TcpEndpoint> {
        let target: ServiceTarget = target.parse()?;
        let host = target.host_or_local();
        let port = resolve::port_of(&target.service, Protocol::Tcp, &self.config.services_path())?;
        let ip = resolve::addr_of(target.host.as_deref())?;
        let addr = SocketAddr::new(ip, port);
        let name = format!("{}@{}", target.service, host);

        let socket = socket_helpers::get_tcp_connect_socket(addr)?;
        let state = match mode {
            ConnectMode::Blocking => {
                match socket.connect(&SockAddr::from(addr)) {
                    Ok(()) => {}
                    // the connect carries on in the background; wait it out
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                        readiness::wait_ready(&socket, Interest::Writable, &Deadline::never())?;
                        if let Some(err) = socket.take_error()? {
                            return Err(err.into());
                        }
                    }
                    Err(err) => return Err(NetError::Io(err)),
                }

                socket.set_keepalive(true)?;
                log::info!(target: "netcall", "[TCP] Connected to {name} ({addr})");
                ConnectState::Established
            }

            ConnectMode::Deferred => {
                socket.set_nonblocking(true)?;
                match socket.connect(&SockAddr::from(addr)) {
                    Ok(()) => {}
                    Err(err)
                        if err.raw_os_error() == Some(libc::EINPROGRESS)
                            || err.kind() == io::ErrorKind::WouldBlock => {}
                    Err(err) => return Err(NetError::Io(err)),
                }

                log::debug!(target: "netcall", "[TCP] Initiated connect to {name} ({addr})");
                ConnectState::Pending
            }
        };

        Ok(TcpEndpoint {
            name,
            kind: EndpointKind::Data,
            state,
            socket: Some(TcpSocket::Stream(socket.into())),
            config: self.config.clone(),
        })
    }
}

/// One end of a TCP connection, or a listening socket. Closed on drop
#[derive(Debug)]
pub struct TcpEndpoint {
    name: String,
    kind: EndpointKind,
    state: ConnectState,
    socket: Option<TcpSocket>,
    config: Arc<WireConfig>,
}

impl TcpEndpoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    pub fn state(&self) -> ConnectState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    pub fn config(&self) -> &WireConfig {
        &self.config
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.socket.as_ref().map(|socket| socket.as_raw_fd())
    }

    pub fn local_addr(&self) -> NetResult<SocketAddr> {
        match self.socket.as_ref() {
            Some(TcpSocket::Listener(listener)) => Ok(listener.local_addr()?),
            Some(TcpSocket::Stream(stream)) => Ok(stream.local_addr()?),
            None => Err(NetError::InvalidState("endpoint is closed")),
        }
    }

    pub fn peer_addr(&self) -> NetResult<SocketAddr> {
        Ok(self.stream()?.peer_addr()?)
    }

    /// Whether `SO_KEEPALIVE` is set on a data endpoint
    pub fn keepalive(&self) -> NetResult<bool> {
        Ok(SockRef::from(self.stream()?).keepalive()?)
    }

    fn listener(&self) -> NetResult<&TcpListener> {
        match self.socket.as_ref() {
            Some(TcpSocket::Listener(listener)) => Ok(listener),
            Some(TcpSocket::Stream(_)) => Err(NetError::InvalidState("not a listening endpoint")),
            None => Err(NetError::InvalidState("endpoint is closed")),
        }
    }

    fn stream(&self) -> NetResult<&TcpStream> {
        match self.socket.as_ref() {
            Some(TcpSocket::Stream(stream)) => Ok(stream),
            Some(TcpSocket::Listener(_)) => Err(NetError::InvalidState("not a data endpoint")),
            None => Err(NetError::InvalidState("endpoint is closed")),
        }
    }

    fn established(&self) -> NetResult<&TcpStream> {
        match self.state {
            ConnectState::Established => self.stream(),
            ConnectState::Pending => Err(NetError::InvalidState("connect has not completed")),
            ConnectState::Failed => Err(NetError::InvalidState("connect failed")),
        }
    }

    /// Waits for a connection request and accepts it. Keep-alive is enabled on the new
    /// endpoint, which is named `<peer port>#<peer host>`
    pub fn accept(&self, timeout: Timeout) -> NetResult<TcpEndpoint> {
        let listener = self.listener()?;
        let deadline = timeout.deadline();
        if !readiness::wait_ready(listener, Interest::Readable, &deadline)? {
            log::trace!(target: "netcall", "[TCP] ({}) no connection request within {:?}", self.name, timeout);
            return Err(NetError::would_block(0));
        }

        let (stream, peer) = loop {
            match listener.accept() {
                Ok(accepted) => break accepted,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        };

        SockRef::from(&stream).set_keepalive(true)?;
        readiness::set_blocking(&stream, true)?;

        let peer = socket_helpers::normalize_addr(peer);
        let host = resolve::host_of(peer.ip(), !self.config.reverse_lookup);
        let name = format!("{}#{}", peer.port(), host);
        log::info!(target: "netcall", "[TCP] ({}) accepted connection from {name}", self.name);

        Ok(TcpEndpoint {
            name,
            kind: EndpointKind::Data,
            state: ConnectState::Established,
            socket: Some(TcpSocket::Stream(stream)),
            config: self.config.clone(),
        })
    }

    /// True if a connection request is waiting to be accepted
    pub fn request_pending(&self) -> bool {
        self.listener()
            .map(|listener| readiness::poll_ready(listener, Interest::Readable).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Finishes a deferred connect. On success keep-alive is enabled and the socket returns
    /// to blocking mode. On expiry or failure the endpoint is closed only when
    /// `destroy_on_error` is set; a timed-out endpoint that is kept stays pending and may be
    /// completed again later
    pub fn complete_connect(&mut self, timeout: Timeout, destroy_on_error: bool) -> NetResult<()> {
        match self.state {
            ConnectState::Established => return Ok(()),
            ConnectState::Failed => return Err(NetError::InvalidState("connect failed")),
            ConnectState::Pending => {}
        }

        match self.finish_connect(timeout.deadline()) {
            Ok(()) => {
                self.state = ConnectState::Established;
                log::info!(target: "netcall", "[TCP] Connected to {}", self.name);
                Ok(())
            }

            Err(err) => {
                if !err.is_would_block() {
                    self.state = ConnectState::Failed;
                    log::debug!(target: "netcall", "[TCP] Connect to {} failed: {err}", self.name);
                }

                if destroy_on_error {
                    self.state = ConnectState::Failed;
                    self.close();
                }

                Err(err)
            }
        }
    }

    fn finish_connect(&self, deadline: Deadline) -> NetResult<()> {
        let stream = self.stream()?;
        if !readiness::wait_ready(stream, Interest::Writable, &deadline)? {
            return Err(NetError::would_block(0));
        }

        if let Some(err) = stream.take_error()? {
            return Err(NetError::Io(err));
        }

        SockRef::from(stream).set_keepalive(true)?;
        readiness::set_blocking(stream, true)?;
        Ok(())
    }

    /// Reads into `buf`. With [`ReadMode::Exact`] the timeout bounds only the first byte: a
    /// peer that sends one byte and stalls can block this call indefinitely. With
    /// [`ReadMode::FirstChunk`] the timeout bounds the single receive. A peer that has
    /// closed the connection yields [`NetError::ConnectionClosed`]
    pub fn read(&mut self, timeout: Timeout, mode: ReadMode, buf: &mut [u8]) -> NetResult<usize> {
        let mut stream = self.established()?;
        if buf.is_empty() {
            return Ok(0);
        }

        if !timeout.is_forever() {
            let deadline = timeout.deadline();
            if !readiness::wait_ready(stream, Interest::Readable, &deadline)? {
                return Err(NetError::would_block(0));
            }
        }

        let mut total = 0;
        while total < buf.len() {
            match stream.read(&mut buf[total..]) {
                Ok(0) => {
                    log::debug!(target: "netcall", "[TCP] ({}) connection closed by peer after {total} bytes", self.name);
                    return Err(NetError::ConnectionClosed);
                }

                Ok(n) => {
                    self.config.dump("read", &self.name, &buf[total..total + n]);
                    total += n;
                    if mode == ReadMode::FirstChunk {
                        break;
                    }
                }

                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(NetError::Io(err)),
            }
        }

        log::trace!(target: "netcall", "[TCP] ({}) read {total} of {} bytes", self.name, buf.len());
        Ok(total)
    }

    /// Sends all of `buf`, polling for writability before every partial send. On expiry the
    /// error carries the number of bytes sent so far
    pub fn write(&mut self, timeout: Timeout, buf: &[u8]) -> NetResult<usize> {
        let stream = self.established()?;
        let sock = SockRef::from(stream);
        let deadline = timeout.deadline();
        let flags = if deadline.is_unbounded() {
            SEND_FLAGS
        } else {
            SEND_FLAGS | libc::MSG_DONTWAIT
        };

        let mut sent = 0;
        while sent < buf.len() {
            if !deadline.is_unbounded()
                && !readiness::wait_ready(stream, Interest::Writable, &deadline)?
            {
                log::trace!(target: "netcall", "[TCP] ({}) write timed out after {sent} of {} bytes", self.name, buf.len());
                return Err(NetError::would_block(sent));
            }

            match sock.send_with_flags(&buf[sent..], flags) {
                Ok(n) => {
                    self.config.dump("wrote", &self.name, &buf[sent..sent + n]);
                    sent += n;
                }

                Err(err)
                    if err.kind() == io::ErrorKind::Interrupted
                        || err.kind() == io::ErrorKind::WouldBlock =>
                {
                    continue
                }

                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                    return Err(NetError::ConnectionClosed)
                }

                Err(err) => return Err(NetError::Io(err)),
            }
        }

        log::trace!(target: "netcall", "[TCP] ({}) wrote {sent} bytes", self.name);
        Ok(sent)
    }

    /// Shuts the connection down and releases the socket. Safe to call more than once
    pub fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            log::debug!(target: "netcall", "[TCP] Closing {}", self.name);
            if let TcpSocket::Stream(stream) = &socket {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }

    pub fn is_readable(&self) -> bool {
        match self.socket.as_ref() {
            Some(TcpSocket::Stream(stream)) => readiness::is_readable(stream),
            Some(TcpSocket::Listener(_)) => self.request_pending(),
            None => false,
        }
    }

    pub fn is_up(&self) -> bool {
        match self.socket.as_ref() {
            Some(TcpSocket::Stream(stream)) => {
                self.state == ConnectState::Established && readiness::is_up(stream)
            }
            Some(TcpSocket::Listener(_)) => true,
            None => false,
        }
    }

    pub fn is_writeable(&self) -> bool {
        match self.socket.as_ref() {
            Some(socket) => readiness::is_writeable(socket),
            None => false,
        }
    }

    pub fn set_buffer_sizes(&self, receive: Option<usize>, send: Option<usize>) -> NetResult<()> {
        match self.socket.as_ref() {
            Some(TcpSocket::Listener(listener)) => {
                readiness::set_buffer_sizes(listener, receive, send)?
            }
            Some(TcpSocket::Stream(stream)) => readiness::set_buffer_sizes(stream, receive, send)?,
            None => return Err(NetError::InvalidState("endpoint is closed")),
        }

        Ok(())
    }
}

impl Drop for TcpEndpoint {
    fn drop(&mut self) {
        self.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::io::Write;
    use std::time::{Duration, Instant};

    const TIMEOUT: f64 = 2.0;

    fn manager() -> TcpManager {
        netcall_logging::setup_log();
        TcpManager::new(WireConfig::default().with_reverse_lookup(false))
    }

    fn connected_pair(manager: &TcpManager) -> (TcpEndpoint, TcpEndpoint) {
        let listener = manager.listen(None, 5).unwrap();
        let client = manager
            .connect(&format!("{}@localhost", listener.name()), ConnectMode::Blocking)
            .unwrap();
        let server = listener.accept(Timeout::from(TIMEOUT)).unwrap();
        (client, server)
    }

    #[test]
    fn listen_connect_accept() {
        let manager = manager();
        let listener = manager.listen(Some("0"), 5).unwrap();
        assert_eq!(listener.kind(), EndpointKind::Listening);
        let port: u16 = listener.name().parse().unwrap();
        assert_ne!(port, 0);

        let client = manager
            .connect(&format!("{port}@localhost"), ConnectMode::Blocking)
            .unwrap();
        assert_eq!(client.state(), ConnectState::Established);
        assert_eq!(client.name(), format!("{port}@localhost"));

        let start = Instant::now();
        let server = listener.accept(Timeout::from(TIMEOUT)).unwrap();
        assert!(start.elapsed() < Duration::from_secs_f64(TIMEOUT));
        assert_eq!(server.kind(), EndpointKind::Data);

        let peer_port = client.local_addr().unwrap().port();
        assert!(server.name().starts_with(&format!("{peer_port}#")));
        assert!(client.keepalive().unwrap());
        assert!(server.keepalive().unwrap());
        assert!(server.is_up());
        assert!(client.is_writeable());
    }

    #[test]
    fn accept_without_request_would_block() {
        let manager = manager();
        let listener = manager.listen(None, 5).unwrap();
        assert!(!listener.request_pending());

        let start = Instant::now();
        let err = listener.accept(Timeout::IMMEDIATE).unwrap_err();
        assert!(err.is_would_block());
        assert_eq!(err.transferred(), 0);
        assert!(start.elapsed() < Duration::from_millis(500));

        let err = listener.accept(Timeout::from(0.05)).unwrap_err();
        assert!(err.is_would_block());
    }

    #[test]
    fn read_with_nothing_pending_would_block() {
        let manager = manager();
        let (mut client, _server) = connected_pair(&manager);
        let mut buf = [0u8; 8];

        let start = Instant::now();
        let err = client
            .read(Timeout::IMMEDIATE, ReadMode::Exact, &mut buf)
            .unwrap_err();
        assert!(err.is_would_block());
        assert_eq!(err.transferred(), 0);
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(!client.is_readable());
    }

    #[test]
    fn chunked_writes_reassemble_exactly() {
        let manager = manager();
        let (mut client, server) = connected_pair(&manager);
        let payload: Vec<u8> = (0..4096).map(|_| rand::random::<u8>()).collect();
        let expected = payload.clone();

        let writer = std::thread::spawn(move || {
            let mut server = server;
            let mut rng = rand::thread_rng();
            let mut offset = 0;
            while offset < payload.len() {
                let len = rng.gen_range(1..=7).min(payload.len() - offset);
                server
                    .write(Timeout::Forever, &payload[offset..offset + len])
                    .unwrap();
                offset += len;
            }
            server
        });

        let mut buf = vec![0u8; expected.len()];
        let read = client
            .read(Timeout::from(TIMEOUT), ReadMode::Exact, &mut buf)
            .unwrap();
        assert_eq!(read, expected.len());
        assert_eq!(buf, expected);
        let _server = writer.join().unwrap();
    }

    #[test]
    fn first_chunk_read_returns_early() {
        let manager = manager();
        let (mut client, mut server) = connected_pair(&manager);
        server.write(Timeout::from(TIMEOUT), b"hello").unwrap();

        let mut buf = [0u8; 64];
        let read = client
            .read(Timeout::from(TIMEOUT), ReadMode::FirstChunk, &mut buf)
            .unwrap();
        assert!(read >= 1 && read <= 5);
        assert_eq!(&buf[..read], &b"hello"[..read]);
    }

    #[test]
    fn forever_read_waits_for_the_peer() {
        let manager = manager();
        let (mut client, server) = connected_pair(&manager);
        let writer = std::thread::spawn(move || {
            let mut server = server;
            std::thread::sleep(Duration::from_millis(50));
            server.write(Timeout::Forever, b"late").unwrap();
            server
        });

        let mut buf = [0u8; 4];
        client.read(Timeout::Forever, ReadMode::Exact, &mut buf).unwrap();
        assert_eq!(&buf, b"late");
        let _server = writer.join().unwrap();
    }

    #[test]
    fn peer_close_is_detected() {
        let manager = manager();
        let (mut client, mut server) = connected_pair(&manager);
        server.close();

        let deadline = Instant::now() + Duration::from_secs(2);
        while client.is_up() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(!client.is_up());
        assert!(!client.is_readable());
        let mut buf = [0u8; 4];
        let err = client
            .read(Timeout::from(TIMEOUT), ReadMode::Exact, &mut buf)
            .unwrap_err();
        assert!(matches!(err, NetError::ConnectionClosed));
    }

    #[test]
    fn close_is_idempotent() {
        let manager = manager();
        let (mut client, _server) = connected_pair(&manager);
        client.close();
        assert!(client.is_closed());
        client.close();
        assert!(client.is_closed());
        assert!(!client.is_up());
        assert!(!client.is_writeable());
        assert!(matches!(
            client.write(Timeout::IMMEDIATE, b"x"),
            Err(NetError::InvalidState(_))
        ));
    }

    #[test]
    fn deferred_connect_completes() {
        let manager = manager();
        let listener = manager.listen(None, 5).unwrap();
        let mut client = manager
            .connect(&format!("{}@127.0.0.1", listener.name()), ConnectMode::Deferred)
            .unwrap();
        assert_eq!(client.state(), ConnectState::Pending);
        assert!(matches!(
            client.write(Timeout::IMMEDIATE, b"x"),
            Err(NetError::InvalidState(_))
        ));

        client.complete_connect(Timeout::from(TIMEOUT), true).unwrap();
        assert_eq!(client.state(), ConnectState::Established);
        assert!(client.keepalive().unwrap());
        // completing twice is harmless
        client.complete_connect(Timeout::IMMEDIATE, true).unwrap();

        let mut server = listener.accept(Timeout::from(TIMEOUT)).unwrap();
        assert!(server.keepalive().unwrap());
        client.write(Timeout::from(TIMEOUT), b"ping").unwrap();
        let mut buf = [0u8; 4];
        server
            .read(Timeout::from(TIMEOUT), ReadMode::Exact, &mut buf)
            .unwrap();
        assert_eq!(&buf, b"ping");
    }

    fn closed_port() -> u16 {
        let spare = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        spare.local_addr().unwrap().port()
    }

    #[test]
    fn refused_deferred_connect_destroys_on_request() {
        let manager = manager();
        let port = closed_port();
        let mut client = match manager.connect(&format!("{port}@127.0.0.1"), ConnectMode::Deferred) {
            Ok(client) => client,
            // some stacks refuse a loopback connect before it can be deferred
            Err(err) => {
                assert_eq!(err.tier(), ErrorTier::Transport);
                return;
            }
        };

        let err = client
            .complete_connect(Timeout::from(TIMEOUT), true)
            .unwrap_err();
        assert_eq!(err.tier(), ErrorTier::Transport);
        assert_eq!(client.state(), ConnectState::Failed);
        assert!(client.is_closed());
    }

    #[test]
    fn refused_deferred_connect_is_kept_without_destroy() {
        let manager = manager();
        let port = closed_port();
        let Ok(mut client) = manager.connect(&format!("{port}@127.0.0.1"), ConnectMode::Deferred)
        else {
            return;
        };

        assert!(client.complete_connect(Timeout::from(TIMEOUT), false).is_err());
        assert_eq!(client.state(), ConnectState::Failed);
        assert!(!client.is_closed());
        client.close();
        assert!(client.is_closed());
    }

    #[test]
    fn blocking_connect_to_closed_port_fails() {
        let manager = manager();
        let port = closed_port();
        let err = manager
            .connect(&format!("{port}@127.0.0.1"), ConnectMode::Blocking)
            .unwrap_err();
        assert_eq!(err.tier(), ErrorTier::Transport);
    }

    #[test]
    fn bad_targets_are_protocol_errors() {
        let manager = manager();
        for target in ["", "@localhost", "80@", "-5@localhost"] {
            let err = manager.connect(target, ConnectMode::Blocking).unwrap_err();
            assert_eq!(err.tier(), ErrorTier::Protocol, "{target}");
        }
    }

    #[test]
    fn stalled_peer_yields_partial_write() {
        let manager = manager();
        let (mut client, server) = connected_pair(&manager);
        client.set_buffer_sizes(None, Some(16 * 1024)).unwrap();
        server.set_buffer_sizes(Some(16 * 1024), None).unwrap();

        let payload = vec![0x5au8; 32 * 1024 * 1024];
        let err = client.write(Timeout::from(0.2), &payload).unwrap_err();
        assert!(err.is_would_block());
        assert!(err.transferred() > 0);
        assert!(err.transferred() < payload.len());
    }

    #[test]
    fn std_client_interoperates() {
        let manager = manager();
        let listener = manager.listen(None, 5).unwrap();
        let port: u16 = listener.name().parse().unwrap();
        let mut raw = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
        raw.write_all(b"abc").unwrap();

        let mut server = listener.accept(Timeout::from(TIMEOUT)).unwrap();
        assert!(server.name().ends_with("#127.0.0.1"));
        let mut buf = [0u8; 3];
        server
            .read(Timeout::from(TIMEOUT), ReadMode::Exact, &mut buf)
            .unwrap();
        assert_eq!(&buf, b"abc");
    }
}
