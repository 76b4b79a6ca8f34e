//! Types shared by every netcall layer: the timeout contract and the error taxonomy.
#![forbid(unsafe_code)]

pub mod prelude {
    pub use crate::errors::{ErrorTier, NetError, NetResult};
    pub use crate::timeout::{Deadline, Timeout};
}

pub mod errors;
pub mod timeout;
