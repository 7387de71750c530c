//! Host and port extraction for OAuth endpoints

use url::Url;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    pub host: String,
    /// Empty for schemes without a default port
    pub port: String,
}

/// Split an endpoint URL into hostname and port.
///
/// `https` defaults to 443 and `http` to 80. Anything that does not start with
/// an http(s) scheme is returned unchanged as the host with an empty port.
/// An explicit non-numeric port is an error.
pub fn extract_host_and_port(endpoint: &str) -> Result<HostPort> {
    let default_port = if endpoint.starts_with("https://") {
        443
    } else if endpoint.starts_with("http://") {
        80
    } else {
        return Ok(HostPort {
            host: endpoint.to_string(),
            port: String::new(),
        });
    };

    check_explicit_port(endpoint)?;

    let url = Url::parse(endpoint).map_err(|e| CoreError::InvalidUrl {
        url: endpoint.to_string(),
        message: e.to_string(),
    })?;
    let host = url.host_str().ok_or_else(|| CoreError::InvalidUrl {
        url: endpoint.to_string(),
        message: "missing host".to_string(),
    })?;
    let port = url.port().unwrap_or(default_port);

    Ok(HostPort {
        host: host.to_string(),
        port: port.to_string(),
    })
}

/// `Url::parse` reports a bad port as a generic parse failure; surface it as
/// its own error instead.
fn check_explicit_port(endpoint: &str) -> Result<()> {
    let rest = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or(authority);

    // IPv6 literals carry colons inside brackets
    let after_host = match host_port.rfind(']') {
        Some(idx) => &host_port[idx + 1..],
        None => host_port,
    };

    if let Some((_, port)) = after_host.rsplit_once(':') {
        if port.is_empty() || port.parse::<u16>().is_err() {
            return Err(CoreError::InvalidPort {
                port: port.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_default_port() {
        let hp = extract_host_and_port("https://issuer.example.com/oidc").unwrap();
        assert_eq!(hp.host, "issuer.example.com");
        assert_eq!(hp.port, "443");
    }

    #[test]
    fn test_http_explicit_port() {
        let hp = extract_host_and_port("http://issuer.example.com:8080/x").unwrap();
        assert_eq!(hp.host, "issuer.example.com");
        assert_eq!(hp.port, "8080");
    }

    #[test]
    fn test_http_default_port() {
        let hp = extract_host_and_port("http://issuer.example.com").unwrap();
        assert_eq!(hp.port, "80");
    }

    #[test]
    fn test_non_numeric_port_rejected() {
        let err = extract_host_and_port("https://issuer.example.com:abc/oidc").unwrap_err();
        assert!(matches!(err, CoreError::InvalidPort { ref port } if port == "abc"));
    }

    #[test]
    fn test_non_http_passthrough() {
        let hp = extract_host_and_port("issuer.example.com").unwrap();
        assert_eq!(hp.host, "issuer.example.com");
        assert_eq!(hp.port, "");
    }
}
