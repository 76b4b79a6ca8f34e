//! Per-manager configuration.
//!
//! Every [`TcpManager`](crate::tcp::TcpManager) and [`UdpManager`](crate::udp::UdpManager)
//! owns its own [`WireConfig`]. Endpoints created by a manager share it through an `Arc`, so
//! two managers in one process can run with different diagnostics or service databases.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable naming an alternate services database
pub const SERVICES_FILE_ENV: &str = "SERVICES_FILE";
pub const DEFAULT_SERVICES_FILE: &str = "/etc/services";
pub const DEFAULT_MAX_BACKLOG: i32 = 128;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireConfig {
    /// Upper bound applied to the backlog requested by `listen`
    pub max_backlog: i32,
    /// Name accepted peers and UDP sources by reverse lookup instead of the dotted address
    pub reverse_lookup: bool,
    /// Hex-dump every transferred buffer at trace level
    pub dump_payloads: bool,
    /// Services database consulted for non-numeric service names
    pub services_file: Option<PathBuf>,
    /// Bind listening and owning UDP sockets to `[::]` (accepting IPv4 too) when IPv6 is up
    pub dual_stack: bool,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            max_backlog: DEFAULT_MAX_BACKLOG,
            reverse_lookup: true,
            dump_payloads: false,
            services_file: std::env::var_os(SERVICES_FILE_ENV).map(PathBuf::from),
            dual_stack: true,
        }
    }
}

impl WireConfig {
    pub fn with_max_backlog(mut self, max_backlog: i32) -> Self {
        self.max_backlog = max_backlog.max(1);
        self
    }

    pub fn with_reverse_lookup(mut self, reverse_lookup: bool) -> Self {
        self.reverse_lookup = reverse_lookup;
        self
    }

    pub fn with_payload_dumps(mut self, dump_payloads: bool) -> Self {
        self.dump_payloads = dump_payloads;
        self
    }

    pub fn with_services_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.services_file = Some(path.into());
        self
    }

    pub fn with_dual_stack(mut self, dual_stack: bool) -> Self {
        self.dual_stack = dual_stack;
        self
    }

    pub fn services_path(&self) -> PathBuf {
        self.services_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SERVICES_FILE))
    }

    pub(crate) fn dump(&self, direction: &str, name: &str, bytes: &[u8]) {
        if !self.dump_payloads || !log::log_enabled!(target: "netcall", log::Level::Trace) {
            return;
        }

        log::trace!(target: "netcall", "({name}) {direction} {} bytes", bytes.len());
        for (idx, row) in bytes.chunks(16).enumerate() {
            log::trace!(target: "netcall", "  {}", dump_row(idx * 16, row));
        }
    }
}

/// One line of a payload dump: offset, hex digits and printable text
fn dump_row(offset: usize, row: &[u8]) -> String {
    let text = row
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect::<String>();

    format!("{offset:06x}: {:<32}  {text}", hex::encode(row))
}
