use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::server::ServerError;

/// Parses `host:port` or `:port` into a socket address.
///
/// An empty host listens on every interface. The host must be an IP literal
/// (IPv6 in brackets) or `localhost`.
pub fn parse_addr(addr: &str) -> Result<SocketAddr, ServerError> {
    let (host, port) = addr.rsplit_once(':').ok_or_else(|| ServerError::invalid_address(addr, "missing port"))?;
    let port = port.parse::<u16>().map_err(|e| ServerError::invalid_address(addr, format!("invalid port: {e}")))?;

    let ip = match host {
        "" => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        "localhost" => IpAddr::V4(Ipv4Addr::LOCALHOST),
        _ => {
            let literal = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
            literal.parse::<IpAddr>().map_err(|e| ServerError::invalid_address(addr, format!("invalid host: {e}")))?
        }
    };

    Ok(SocketAddr::new(ip, port))
}
