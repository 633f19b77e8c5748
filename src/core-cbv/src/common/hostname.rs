use std::net::{AddrParseError, SocketAddr};
use std::num::ParseIntError;

/// Port used when PORT is not set.
pub const DEFAULT_PORT: u16 = 3001;

/// Gets the host:port from the env vars HOST and PORT.
/// Uses defaults `127.0.0.1:3001` if env vars are empty.
pub fn get_api_base_url() -> Result<SocketAddr, HostPortError> {
    let host = std::env::var("HOST").ok();
    let port = std::env::var("PORT").ok();
    parse_host_port(host.as_deref(), port.as_deref())
}

fn parse_host_port(host: Option<&str>, port: Option<&str>) -> Result<SocketAddr, HostPortError> {
    let host = host.map(str::trim).filter(|h| !h.is_empty()).unwrap_or("127.0.0.1");
    let port = match port.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => p.parse::<u16>()?,
        None => DEFAULT_PORT,
    };
    let address = format!("{}:{}", host, port).parse::<SocketAddr>()?;
    Ok(address)
}

#[derive(Debug, thiserror::Error)]
pub enum HostPortError {
    #[error("Invalid port: {0}")]
    InvalidPort(#[from] ParseIntError),
    #[error("Invalid hostname: {0}")]
    InvalidHostname(#[from] AddrParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let address = parse_host_port(None, None).unwrap();
        assert_eq!(address.to_string(), "127.0.0.1:3001");

        let address = parse_host_port(Some(" "), Some("")).unwrap();
        assert_eq!(address.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_explicit_values() {
        let address = parse_host_port(Some("0.0.0.0"), Some("8080")).unwrap();
        assert_eq!(address.to_string(), "0.0.0.0:8080");

        assert!(matches!(parse_host_port(None, Some("http")), Err(HostPortError::InvalidPort(_))));
        assert!(matches!(
            parse_host_port(Some("not a host"), None),
            Err(HostPortError::InvalidHostname(_))
        ));
    }
}
