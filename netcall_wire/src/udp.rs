//! UDP endpoints and reply-to proxies.
//!
//! A [`UdpManager`] is an arena of endpoints addressed by [`UdpHandle`]. An *owning* endpoint
//! holds a bound socket. A *proxy* endpoint holds only a remote address and is registered
//! with the owning endpoint it sends through. [`UdpManager::read`] hands back the proxy for
//! the datagram's sender, creating it on first contact, so replies need no further
//! resolution. Destroying an owning endpoint destroys its proxies with it.

use crate::config::WireConfig;
use crate::readiness::{self, Interest};
use crate::resolve::{self, Protocol, ServiceTarget};
use crate::socket_helpers;
use netcall_types::prelude::*;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UdpHandle(u64);

impl UdpHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Display for UdpHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "udp#{}", self.0)
    }
}

#[derive(Debug)]
struct UdpEndpoint {
    name: String,
    address: SocketAddr,
    socket: Option<UdpSocket>,
    parent: Option<UdpHandle>,
    children: HashMap<SocketAddr, UdpHandle>,
}

#[derive(Debug, Default)]
pub struct UdpManager {
    config: Arc<WireConfig>,
    endpoints: HashMap<UdpHandle, UdpEndpoint>,
    next_handle: u64,
}

impl UdpManager {
    pub fn new(config: WireConfig) -> Self {
        Self {
            config: Arc::new(config),
            endpoints: HashMap::new(),
            next_handle: 0,
        }
    }

    pub fn config(&self) -> &WireConfig {
        &self.config
    }

    /// Creates an endpoint.
    /// - `(None, None)`: owning endpoint bound to an ephemeral port
    /// - `(Some(service), None)`: owning endpoint bound to the named port
    /// - `(Some("service@host"), Some(parent))`: proxy for that address, sending through
    ///   `parent` (or through `parent`'s owner if `parent` is itself a proxy)
    ///
    /// Owning endpoints are named `port#host`, proxies `port@host`
    pub fn create(&mut self, name: Option<&str>, parent: Option<UdpHandle>) -> NetResult<UdpHandle> {
        match (name, parent) {
            (_, None) => self.create_owning(name),
            (Some(name), Some(parent)) => self.create_proxy(name, parent),
            (None, Some(_)) => Err(NetError::InvalidTarget(String::new())),
        }
    }

    fn create_owning(&mut self, name: Option<&str>) -> NetResult<UdpHandle> {
        let port = match name {
            Some(name) => {
                let target: ServiceTarget = name.parse()?;
                resolve::port_of(&target.service, Protocol::Udp, &self.config.services_path())?
            }
            None => 0,
        };

        let socket = socket_helpers::get_udp_socket(socket_helpers::wildcard_addr(port, self.config.dual_stack))?;
        let address = socket.local_addr()?;
        let name = format!("{}#{}", address.port(), resolve::local_host_name());
        log::debug!(target: "netcall", "[UDP] Created {name} ({address})");

        Ok(self.insert(UdpEndpoint {
            name,
            address,
            socket: Some(socket),
            parent: None,
            children: HashMap::new(),
        }))
    }

    fn create_proxy(&mut self, name: &str, parent: UdpHandle) -> NetResult<UdpHandle> {
        let owner = self.owner_of(parent)?;
        let target: ServiceTarget = name.parse()?;
        let port = resolve::port_of(&target.service, Protocol::Udp, &self.config.services_path())?;
        let ip = resolve::addr_of(target.host.as_deref())?;
        let address = socket_helpers::normalize_addr(SocketAddr::new(ip, port));

        if let Some(existing) = self.entry(owner)?.children.get(&address) {
            return Ok(*existing);
        }

        let name = format!("{}@{}", port, target.host_or_local());
        Ok(self.link_proxy(owner, name, address))
    }

    fn link_proxy(&mut self, owner: UdpHandle, name: String, address: SocketAddr) -> UdpHandle {
        log::debug!(target: "netcall", "[UDP] Created proxy {name} ({address}) under {owner}");
        let handle = self.insert(UdpEndpoint {
            name,
            address,
            socket: None,
            parent: Some(owner),
            children: HashMap::new(),
        });

        if let Some(parent) = self.endpoints.get_mut(&owner) {
            parent.children.insert(address, handle);
        }

        handle
    }

    fn insert(&mut self, endpoint: UdpEndpoint) -> UdpHandle {
        let handle = UdpHandle(self.next_handle);
        self.next_handle += 1;
        self.endpoints.insert(handle, endpoint);
        handle
    }

    fn entry(&self, handle: UdpHandle) -> NetResult<&UdpEndpoint> {
        self.endpoints
            .get(&handle)
            .ok_or(NetError::InvalidHandle(handle.0))
    }

    /// The owning endpoint whose socket `handle` sends and receives through
    fn owner_of(&self, handle: UdpHandle) -> NetResult<UdpHandle> {
        Ok(self.entry(handle)?.parent.unwrap_or(handle))
    }

    fn socket_of(&self, handle: UdpHandle) -> NetResult<&UdpSocket> {
        let owner = self.owner_of(handle)?;
        self.entry(owner)?
            .socket
            .as_ref()
            .ok_or(NetError::InvalidState("owning endpoint has no socket"))
    }

    /// Receives one datagram into `buf` (truncating it if `buf` is too small). Returns the
    /// datagram length and the proxy for the sender
    pub fn read(&mut self, handle: UdpHandle, timeout: Timeout, buf: &mut [u8]) -> NetResult<(usize, UdpHandle)> {
        let owner = self.owner_of(handle)?;
        let socket = self.socket_of(owner)?;

        if !timeout.is_forever() {
            let deadline = timeout.deadline();
            if !readiness::wait_ready(socket, Interest::Readable, &deadline)? {
                return Err(NetError::would_block(0));
            }
        }

        let (len, from) = loop {
            match socket.recv_from(buf) {
                Ok(received) => break received,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(NetError::Io(err)),
            }
        };

        let source = socket_helpers::normalize_addr(from);
        let owner_entry = self.entry(owner)?;
        self.config.dump("received", &owner_entry.name, &buf[..len]);
        log::trace!(target: "netcall", "[UDP] ({}) received {len} bytes from {source}", owner_entry.name);

        if let Some(proxy) = owner_entry.children.get(&source) {
            return Ok((len, *proxy));
        }

        let host = resolve::host_of(source.ip(), !self.config.reverse_lookup);
        let name = format!("{}@{}", source.port(), host);
        Ok((len, self.link_proxy(owner, name, source)))
    }

    /// Sends `data` to the destination's address, through its own socket if it owns one and
    /// through its parent's otherwise
    pub fn write(&self, destination: UdpHandle, timeout: Timeout, data: &[u8]) -> NetResult<usize> {
        let endpoint = self.entry(destination)?;
        let socket = self.socket_of(destination)?;
        let target = socket_helpers::match_family(endpoint.address, socket.local_addr()?);

        if !timeout.is_forever() {
            let deadline = timeout.deadline();
            if !readiness::wait_ready(socket, Interest::Writable, &deadline)? {
                return Err(NetError::would_block(0));
            }
        }

        let sent = loop {
            match socket.send_to(data, target) {
                Ok(sent) => break sent,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(NetError::Io(err)),
            }
        };

        self.config.dump("sent", &endpoint.name, &data[..sent]);
        log::trace!(target: "netcall", "[UDP] ({}) sent {sent} bytes", endpoint.name);
        Ok(sent)
    }

    /// Destroys an endpoint. An owning endpoint takes all of its proxies with it; a proxy
    /// unlinks itself from its parent. Unknown handles are ignored
    pub fn destroy(&mut self, handle: UdpHandle) {
        let Some(endpoint) = self.endpoints.remove(&handle) else {
            return;
        };

        match endpoint.parent {
            Some(parent) => {
                if let Some(parent) = self.endpoints.get_mut(&parent) {
                    if parent.children.get(&endpoint.address) == Some(&handle) {
                        parent.children.remove(&endpoint.address);
                    }
                }
            }

            None => {
                for child in endpoint.children.values() {
                    self.destroy(*child);
                }
            }
        }

        log::debug!(target: "netcall", "[UDP] Destroyed {} ({handle})", endpoint.name);
    }

    pub fn name(&self, handle: UdpHandle) -> NetResult<&str> {
        Ok(&self.entry(handle)?.name)
    }

    pub fn address(&self, handle: UdpHandle) -> NetResult<SocketAddr> {
        Ok(self.entry(handle)?.address)
    }

    pub fn parent(&self, handle: UdpHandle) -> NetResult<Option<UdpHandle>> {
        Ok(self.entry(handle)?.parent)
    }

    pub fn is_proxy(&self, handle: UdpHandle) -> bool {
        self.endpoints
            .get(&handle)
            .map(|endpoint| endpoint.parent.is_some())
            .unwrap_or(false)
    }

    pub fn contains(&self, handle: UdpHandle) -> bool {
        self.endpoints.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// True if a datagram is waiting on the socket `handle` receives through
    pub fn is_readable(&self, handle: UdpHandle) -> bool {
        self.socket_of(handle)
            .map(|socket| readiness::poll_ready(socket, Interest::Readable).unwrap_or(false))
            .unwrap_or(false)
    }

    /// True while the endpoint is live and its socket reports no pending error
    pub fn is_up(&self, handle: UdpHandle) -> bool {
        self.socket_of(handle)
            .map(|socket| matches!(socket.take_error(), Ok(None)))
            .unwrap_or(false)
    }

    pub fn is_writeable(&self, handle: UdpHandle) -> bool {
        self.socket_of(handle)
            .map(readiness::is_writeable)
            .unwrap_or(false)
    }

    pub fn set_buffer_sizes(&self, handle: UdpHandle, receive: Option<usize>, send: Option<usize>) -> NetResult<()> {
        Ok(readiness::set_buffer_sizes(self.socket_of(handle)?, receive, send)?)
    }
}
