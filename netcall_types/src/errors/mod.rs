use std::fmt::{Display, Formatter};
use std::io;

pub type NetResult<T> = Result<T, NetError>;

/// The error type returned by every fallible netcall operation
#[derive(Debug)]
pub enum NetError {
    /// The deadline passed before the operation could finish. `transferred` holds the number
    /// of bytes moved before expiry so the caller can resume
    WouldBlock { transferred: usize },
    /// The peer performed an orderly close
    ConnectionClosed,
    /// A binary message header did not start with the expected magic bytes
    BadMagic([u8; 4]),
    /// A connection target or port string could not be parsed
    InvalidTarget(String),
    /// A stream option string contained an unknown or malformed option
    InvalidOption(String),
    /// The service name is neither numeric nor registered for the protocol
    UnknownService(String),
    /// The host name could not be resolved
    UnknownHost(String),
    /// The handle does not refer to a live endpoint
    InvalidHandle(u64),
    /// The operation does not apply to the endpoint in its current state
    InvalidState(&'static str),
    /// The message body does not fit the 32-bit length field
    MessageTooLarge(usize),
    /// Any other socket-layer failure, surfaced as reported by the platform
    Io(io::Error),
}

/// The three classes of failure a caller has to tell apart
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorTier {
    /// A bounded wait expired. Always retryable
    Timeout,
    /// Malformed input or misuse. Retrying with the same arguments fails again
    Protocol,
    /// Socket-layer failure. Generally fatal to the endpoint
    Transport,
}

impl NetError {
    pub fn tier(&self) -> ErrorTier {
        match self {
            NetError::WouldBlock { .. } => ErrorTier::Timeout,
            NetError::BadMagic(_)
            | NetError::InvalidTarget(_)
            | NetError::InvalidOption(_)
            | NetError::UnknownService(_)
            | NetError::UnknownHost(_)
            | NetError::InvalidHandle(_)
            | NetError::InvalidState(_)
            | NetError::MessageTooLarge(_) => ErrorTier::Protocol,
            NetError::ConnectionClosed | NetError::Io(_) => ErrorTier::Transport,
        }
    }

    pub fn is_would_block(&self) -> bool {
        matches!(self, NetError::WouldBlock { .. })
    }

    /// Bytes moved before a timeout. Zero for every other error
    pub fn transferred(&self) -> usize {
        match self {
            NetError::WouldBlock { transferred } => *transferred,
            _ => 0,
        }
    }

    pub fn would_block(transferred: usize) -> Self {
        NetError::WouldBlock { transferred }
    }

    pub fn std(self) -> io::Error {
        self.into()
    }
}

impl Display for NetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NetError::WouldBlock { transferred } => {
                write!(f, "Operation timed out after {transferred} bytes")
            }
            NetError::ConnectionClosed => write!(f, "Connection closed by peer"),
            NetError::BadMagic(magic) => write!(f, "Bad message magic {magic:02x?}"),
            NetError::InvalidTarget(target) => write!(f, "Invalid target \"{target}\""),
            NetError::InvalidOption(option) => write!(f, "Invalid option \"{option}\""),
            NetError::UnknownService(service) => write!(f, "Unknown service \"{service}\""),
            NetError::UnknownHost(host) => write!(f, "Unknown host \"{host}\""),
            NetError::InvalidHandle(handle) => write!(f, "Invalid endpoint handle {handle}"),
            NetError::InvalidState(reason) => write!(f, "Invalid endpoint state: {reason}"),
            NetError::MessageTooLarge(len) => write!(f, "Message of {len} bytes is too large"),
            NetError::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for NetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for NetError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                NetError::WouldBlock { transferred: 0 }
            }
            io::ErrorKind::UnexpectedEof => NetError::ConnectionClosed,
            _ => NetError::Io(err),
        }
    }
}

impl From<NetError> for io::Error {
    fn from(err: NetError) -> Self {
        let kind = match &err {
            NetError::WouldBlock { .. } => io::ErrorKind::WouldBlock,
            NetError::ConnectionClosed => io::ErrorKind::BrokenPipe,
            NetError::Io(inner) => inner.kind(),
            _ => io::ErrorKind::InvalidInput,
        };

        match err {
            NetError::Io(inner) => inner,
            other => io::Error::new(kind, other.to_string()),
        }
    }
}
