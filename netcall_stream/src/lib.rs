//! # Netcall Stream
//!
//! Two framings layered over a single [`Connection`](netcall_wire::connection::Connection):
//!
//! - [`LineStream`](line::LineStream): LF-separated text with an optional LF or CRLF
//!   terminator on output. Lines of any length are reassembled across receives
//! - [`MessageStream`](message::MessageStream): binary messages behind a 12-byte `GIOP`
//!   header whose length field follows the byte order the sender declares
//!
//! Both streams own their connection and close it when closed or dropped. Timeouts follow
//! the wire layer: expiry is a retryable `WouldBlock` carrying the number of bytes moved.
//!
//! ## Example
//! ```no_run
//! use netcall_types::prelude::*;
//! use netcall_stream::prelude::*;
//! use netcall_wire::prelude::*;
//!
//! let manager = TcpManager::default();
//! let conn = manager.connect("smtp@mail.example.com", ConnectMode::Blocking)?;
//! let mut lines = LineStream::new(conn, "-crlf".parse()?);
//! let greeting = lines.get_line(Timeout::from(5.0))?;
//! lines.put_line(Timeout::from(5.0), "QUIT")?;
//! # Ok::<(), NetError>(())
//! ```

#![forbid(unsafe_code)]

pub mod prelude {
    pub use crate::line::{LineOptions, LineStream, Terminator};
    pub use crate::message::{MessageHeader, MessageStream, MessageType};
}

pub mod buffered;
pub mod line;
pub mod message;

#[cfg(test)]
mod testing;
