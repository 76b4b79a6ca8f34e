//! # Netcall Wire
//!
//! Synchronous, timeout-bounded TCP and UDP endpoints for Unix-like platforms.
//!
//! ## Features
//! - **TCP**: listen, accept, blocking and deferred connect, exact-count and first-chunk
//!   reads, partial-progress writes, idempotent close
//! - **UDP**: owning endpoints and socket-less reply-to proxies kept in a handle arena
//! - **Readiness**: `poll(2)`-driven waits against absolute deadlines, with signal
//!   interruptions retried transparently
//! - **Resolution**: host names, `/etc/services`-style service names, `service[@host]`
//!   connection targets
//!
//! ## Timeouts
//! Every bounded call takes a [`Timeout`](netcall_types::timeout::Timeout): `Forever`, or a
//! bounded wait where zero means "poll once". Expiry is reported as
//! [`NetError::WouldBlock`](netcall_types::errors::NetError::WouldBlock) with the number of
//! bytes moved so far, never as a hard error.
//!
//! ## Example
//! ```no_run
//! use netcall_types::prelude::*;
//! use netcall_wire::prelude::*;
//!
//! let manager = TcpManager::default();
//! let listener = manager.listen(None, 5)?;
//! let mut client = manager.connect(&format!("{}@localhost", listener.name()), ConnectMode::Blocking)?;
//! let mut server = listener.accept(Timeout::from(2.0))?;
//!
//! client.write(Timeout::Forever, b"hello")?;
//! let mut buf = [0u8; 5];
//! server.read(Timeout::from(2.0), ReadMode::Exact, &mut buf)?;
//! # Ok::<(), NetError>(())
//! ```
//!
//! ## Important Notes
//! - Handles are single-owner and not internally synchronized
//! - An exact-count read bounds only the arrival of its first byte

#![deny(unsafe_code)]

pub mod prelude {
    pub use crate::config::WireConfig;
    pub use crate::connection::{Connection, ReadMode};
    pub use crate::tcp::{ConnectMode, ConnectState, EndpointKind, TcpEndpoint, TcpManager};
    pub use crate::udp::{UdpHandle, UdpManager};
}

pub mod config;
pub mod connection;
pub mod readiness;
pub mod resolve;
pub mod socket_helpers;
pub mod tcp;
pub mod udp;
