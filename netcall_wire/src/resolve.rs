//! Host-name/address and service-name/port translation.
//!
//! Service names are looked up in a services database in the `/etc/services` format. A
//! numeric string is always accepted in place of a registered name, in decimal, `0x` hex or
//! leading-zero octal.

use netcall_types::prelude::*;
use std::fmt::{Display, Formatter};
use std::io::BufRead;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::str::FromStr;

const MAX_HOST_NAME: usize = 1025;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceEntry {
    pub name: String,
    pub port: u16,
    pub protocol: String,
    pub aliases: Vec<String>,
}

/// An in-memory copy of a services database
#[derive(Clone, Debug, Default)]
pub struct ServiceTable {
    entries: Vec<ServiceEntry>,
}

impl ServiceTable {
    /// Parses `name port/protocol [aliases...] [# comment]` lines. Malformed lines are skipped
    pub fn parse<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.split('#').next().unwrap_or_default();
            let mut fields = line.split_whitespace();
            let (Some(name), Some(port_proto)) = (fields.next(), fields.next()) else {
                continue;
            };

            let Some((port, protocol)) = port_proto.split_once('/') else {
                continue;
            };

            let Ok(port) = port.parse::<u16>() else {
                continue;
            };

            entries.push(ServiceEntry {
                name: name.to_string(),
                port,
                protocol: protocol.to_ascii_lowercase(),
                aliases: fields.map(str::to_string).collect(),
            });
        }

        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::parse(std::io::BufReader::new(file))
    }

    pub fn lookup(&self, name: &str, protocol: Protocol) -> Option<&ServiceEntry> {
        self.entries.iter().find(|entry| {
            entry.protocol == protocol.as_str()
                && (entry.name == name || entry.aliases.iter().any(|alias| alias == name))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Interprets `text` as a port number. `None` if it is not numeric at all
pub fn parse_port(text: &str) -> Option<NetResult<u16>> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let parsed = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };

    if negative && parsed != 0 {
        return Some(Err(NetError::InvalidTarget(text.to_string())));
    }

    Some(u16::try_from(parsed).map_err(|_| NetError::InvalidTarget(text.to_string())))
}

/// Resolves a service name or numeric string to a port
pub fn port_of(name: &str, protocol: Protocol, services_file: &Path) -> NetResult<u16> {
    if let Some(port) = parse_port(name) {
        return port;
    }

    let table = ServiceTable::load(services_file).map_err(|err| {
        log::warn!(target: "netcall", "[Resolve] unable to read {services_file:?}: {err}");
        NetError::UnknownService(name.to_string())
    })?;

    table
        .lookup(name, protocol)
        .map(|entry| entry.port)
        .ok_or_else(|| NetError::UnknownService(name.to_string()))
}

/// Resolves a host name or address literal. `None` means the local host. IPv4 addresses are
/// preferred when a name maps to both families
pub fn addr_of(host: Option<&str>) -> NetResult<IpAddr> {
    let Some(host) = host else {
        let local = local_host_name();
        return resolve_host(&local).or_else(|_| {
            log::debug!(target: "netcall", "[Resolve] local host name {local} does not resolve, using loopback");
            Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))
        });
    };

    resolve_host(host)
}

fn resolve_host(host: &str) -> NetResult<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addrs: Vec<SocketAddr> = (host, 0)
        .to_socket_addrs()
        .map_err(|_| NetError::UnknownHost(host.to_string()))?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .map(|addr| addr.ip())
        .ok_or_else(|| NetError::UnknownHost(host.to_string()))
}

/// The host name for `ip`. With `dotted`, or when reverse lookup fails, the address literal
pub fn host_of(ip: IpAddr, dotted: bool) -> String {
    if dotted {
        return ip.to_string();
    }

    reverse_lookup(ip).unwrap_or_else(|| ip.to_string())
}

#[allow(unsafe_code)]
fn reverse_lookup(ip: IpAddr) -> Option<String> {
    let mut host = [0 as libc::c_char; MAX_HOST_NAME];

    // SAFETY: the sockaddr structures are zero-initialized plain C structs filled in below,
    // their sizes are passed alongside the pointers, and `host` outlives the call
    let rc = unsafe {
        match ip {
            IpAddr::V4(v4) => {
                let mut sin: libc::sockaddr_in = std::mem::zeroed();
                sin.sin_family = libc::AF_INET as libc::sa_family_t;
                sin.sin_addr = libc::in_addr {
                    s_addr: u32::from_ne_bytes(v4.octets()),
                };
                #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd", target_os = "dragonfly"))]
                {
                    sin.sin_len = std::mem::size_of::<libc::sockaddr_in>() as u8;
                }

                libc::getnameinfo(
                    &sin as *const libc::sockaddr_in as *const libc::sockaddr,
                    std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                    host.as_mut_ptr(),
                    host.len() as libc::socklen_t,
                    std::ptr::null_mut(),
                    0,
                    libc::NI_NAMEREQD,
                )
            }

            IpAddr::V6(v6) => {
                let mut sin6: libc::sockaddr_in6 = std::mem::zeroed();
                sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sin6.sin6_addr = libc::in6_addr {
                    s6_addr: v6.octets(),
                };
                #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd", target_os = "dragonfly"))]
                {
                    sin6.sin6_len = std::mem::size_of::<libc::sockaddr_in6>() as u8;
                }

                libc::getnameinfo(
                    &sin6 as *const libc::sockaddr_in6 as *const libc::sockaddr,
                    std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t,
                    host.as_mut_ptr(),
                    host.len() as libc::socklen_t,
                    std::ptr::null_mut(),
                    0,
                    libc::NI_NAMEREQD,
                )
            }
        }
    };

    if rc != 0 {
        return None;
    }

    let bytes: Vec<u8> = host
        .iter()
        .take_while(|c| **c != 0)
        .map(|c| *c as u8)
        .collect();

    String::from_utf8(bytes).ok().filter(|name| !name.is_empty())
}

/// This machine's host name, or `"localhost"` when it cannot be determined
#[allow(unsafe_code)]
pub fn local_host_name() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer is valid for `buf.len()` bytes for the duration of the call
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "localhost".to_string();
    }

    let len = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    match std::str::from_utf8(&buf[..len]) {
        Ok(name) if !name.is_empty() => name.to_string(),
        _ => "localhost".to_string(),
    }
}

/// A connection target in `service[@host]` form
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceTarget {
    pub service: String,
    pub host: Option<String>,
}

impl ServiceTarget {
    /// The host part, defaulting to this machine's name
    pub fn host_or_local(&self) -> String {
        self.host.clone().unwrap_or_else(local_host_name)
    }
}

impl FromStr for ServiceTarget {
    type Err = NetError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (service, host) = match text.split_once('@') {
            Some((service, host)) => (service.trim(), Some(host.trim())),
            None => (text.trim(), None),
        };

        if service.is_empty() || matches!(host, Some(h) if h.is_empty()) {
            return Err(NetError::InvalidTarget(text.to_string()));
        }

        Ok(Self {
            service: service.to_string(),
            host: host.map(str::to_string),
        })
    }
}

impl Display for ServiceTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.host {
            Some(host) => write!(f, "{}@{}", self.service, host),
            None => write!(f, "{}", self.service),
        }
    }
}
