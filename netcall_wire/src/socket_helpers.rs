use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6};

fn get_udp_socket_builder(domain: Domain) -> std::io::Result<Socket> {
    Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
}

fn get_tcp_socket_builder(domain: Domain) -> std::io::Result<Socket> {
    Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
}

fn setup_base_socket(addr: SocketAddr, socket: &Socket, reuse: bool) -> std::io::Result<()> {
    if reuse {
        socket.set_reuse_address(true)?;
    }

    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }

    Ok(())
}

fn setup_bind(addr: SocketAddr, socket: &Socket, reuse: bool) -> std::io::Result<()> {
    setup_base_socket(addr, socket, reuse)?;
    socket.bind(&SockAddr::from(addr))
}

pub fn domain_of(addr: SocketAddr) -> Domain {
    if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    }
}

/// The address a server-side socket binds to. With `dual_stack` and a usable IPv6 stack this
/// is `[::]`, which also accepts IPv4 peers; otherwise `0.0.0.0`
pub fn wildcard_addr(port: u16, dual_stack: bool) -> SocketAddr {
    if dual_stack && is_ipv6_enabled() {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port)
    } else {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
    }
}

/// `backlog`: the max number of unprocessed TCP connections
pub fn get_tcp_listener(addr: SocketAddr, backlog: i32) -> std::io::Result<std::net::TcpListener> {
    log::trace!(target: "netcall", "[Socket helper] Getting TCP listener (backlog={}) socket @ {:?} ...", backlog, &addr);
    let socket = get_tcp_socket_builder(domain_of(addr))?;
    setup_bind(addr, &socket, true)?;
    socket.listen(backlog)?;
    Ok(socket.into())
}

pub fn get_udp_socket(addr: SocketAddr) -> std::io::Result<std::net::UdpSocket> {
    log::trace!(target: "netcall", "[Socket helper] Getting UDP socket @ {:?} ...", &addr);
    let socket = get_udp_socket_builder(domain_of(addr))?;
    setup_bind(addr, &socket, true)?;
    Ok(socket.into())
}

/// An unconnected stream socket of the right family for `addr`, with address reuse enabled
pub fn get_tcp_connect_socket(addr: SocketAddr) -> std::io::Result<Socket> {
    log::trace!(target: "netcall", "[Socket helper] Getting TCP connect socket for {:?} ...", &addr);
    let socket = get_tcp_socket_builder(domain_of(addr))?;
    setup_base_socket(addr, &socket, true)?;
    Ok(socket)
}

pub fn is_ipv6_enabled() -> bool {
    if let Ok(sck) = std::net::TcpListener::bind("[::]:0") {
        sck.local_addr().map(|r| r.is_ipv6()).unwrap_or(false)
    } else {
        false
    }
}

// ensures ipv4 addresses are in terms of v6
pub fn ensure_ipv6(x: SocketAddr) -> SocketAddrV6 {
    match x {
        SocketAddr::V6(x) => x,
        SocketAddr::V4(x) => SocketAddrV6::new(x.ip().to_ipv6_mapped(), x.port(), 0, 0),
    }
}

/// Collapses IPv4-mapped IPv6 addresses (as reported by dual-stack sockets) to plain IPv4
pub fn normalize_addr(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), v6.port()),
            None => addr,
        },
        v4 => v4,
    }
}

/// Rewrites `dest` so a socket bound to `local` can send to it
pub fn match_family(dest: SocketAddr, local: SocketAddr) -> SocketAddr {
    if local.is_ipv6() && dest.is_ipv4() {
        SocketAddr::V6(ensure_ipv6(dest))
    } else {
        dest
    }
}
