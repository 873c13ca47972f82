use crate::{enums::errors::ResolveError, globals::statics::ROUTE_PROBE_PORT};
use if_addrs::IfAddr;
use local_ip_address::local_ip;
use log::debug;
use std::net::{IpAddr, SocketAddr, UdpSocket};

/// `get_local_addr_for` - the local address of the interface that routes to `target`.
/// No datagram is sent: connecting a UDP socket only selects the route.
pub fn get_local_addr_for(target: IpAddr) -> Result<IpAddr, ResolveError> {
    let no_route = |source| ResolveError::NoRoute {
        host: target.to_string(),
        source,
    };
    let bind_addr: SocketAddr = match target {
        IpAddr::V4(_) => ([0, 0, 0, 0], 0).into(),
        IpAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(bind_addr).map_err(no_route)?;
    socket
        .connect(SocketAddr::new(target, ROUTE_PROBE_PORT))
        .map_err(no_route)?;
    let local = socket.local_addr().map_err(no_route)?.ip();
    debug!("local address towards {target} is {local}");
    Ok(local)
}

/// `get_local_addr` - the address of the default interface, used when the renderer is not an ip literal
pub fn get_local_addr() -> Result<IpAddr, local_ip_address::Error> {
    local_ip()
}

pub fn get_interfaces() -> Vec<String> {
    match if_addrs::get_if_addrs() {
        Ok(ifaces) => ifaces
            .iter()
            .filter(|iface| matches!(iface.addr, IfAddr::V4(..)))
            .map(|iface| iface.addr.ip().to_string())
            .collect(),
        Err(e) => {
            debug!("could not get interfaces: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_routes_to_loopback() {
        let local = get_local_addr_for("127.0.0.1".parse().unwrap()).unwrap();
        assert!(local.is_loopback());
    }
}
