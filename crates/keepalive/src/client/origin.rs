use std::fmt;

use http::Uri;
use http::uri::Scheme;

use crate::client::ClientError;

/// Where a connection goes: `(scheme, host, port)`. The key connections are pooled under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Origin {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        let mut host = host.into();
        host.make_ascii_lowercase();
        Self { scheme, host, port }
    }

    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self::new(Scheme::HTTP, host, port)
    }

    /// Extracts the origin of an absolute URI, filling in the scheme's default port.
    pub fn from_uri(uri: &Uri) -> Result<Self, ClientError> {
        let scheme = uri.scheme().cloned().ok_or_else(|| ClientError::invalid_request(format!("uri {uri} has no scheme")))?;
        let host = uri.host().ok_or_else(|| ClientError::invalid_request(format!("uri {uri} has no host")))?;

        let port = match uri.port_u16() {
            Some(port) => port,
            None if scheme == Scheme::HTTP => 80,
            None if scheme == Scheme::HTTPS => 443,
            None => return Err(ClientError::invalid_request(format!("no default port for scheme {scheme}"))),
        };

        Ok(Self::new(scheme, host, port))
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the port is the scheme's default one.
    fn has_default_port(&self) -> bool {
        (self.scheme == Scheme::HTTP && self.port == 80) || (self.scheme == Scheme::HTTPS && self.port == 443)
    }

    /// Value of the `Host` header for requests to this origin.
    pub fn authority(&self) -> String {
        if self.has_default_port() { self.host.clone() } else { format!("{}:{}", self.host, self.port) }
    }

    /// Host and port in the form `TcpStream::connect` accepts; IPv6 brackets are dropped.
    pub(crate) fn socket_target(&self) -> (&str, u16) {
        let host = self.host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(&self.host);
        (host, self.port)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl TryFrom<&Uri> for Origin {
    type Error = ClientError;

    fn try_from(uri: &Uri) -> Result<Self, Self::Error> {
        Origin::from_uri(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_uri_fills_default_port() {
        let origin = Origin::from_uri(&"http://Example.com/hello".parse().unwrap()).unwrap();
        assert_eq!(origin, Origin::http("example.com", 80));
        assert_eq!(origin.authority(), "example.com");

        let origin = Origin::from_uri(&"http://127.0.0.1:3003/hello".parse().unwrap()).unwrap();
        assert_eq!(origin.port(), 3003);
        assert_eq!(origin.authority(), "127.0.0.1:3003");
        assert_eq!(origin.to_string(), "http://127.0.0.1:3003");

        let origin = Origin::from_uri(&"https://example.com".parse().unwrap()).unwrap();
        assert_eq!(origin.port(), 443);
    }

    #[test]
    fn relative_uri_has_no_origin() {
        assert!(matches!(Origin::from_uri(&"/hello".parse().unwrap()), Err(ClientError::InvalidRequest { .. })));
    }

    #[test]
    fn ipv6_target() {
        let origin = Origin::from_uri(&"http://[::1]:8080/".parse().unwrap()).unwrap();
        assert_eq!(origin.socket_target(), ("::1", 8080));
    }

    #[test]
    fn same_origin_different_paths() {
        let a = Origin::from_uri(&"http://127.0.0.1:3003/a".parse().unwrap()).unwrap();
        let b = Origin::from_uri(&"http://127.0.0.1:3003/b?x=1".parse().unwrap()).unwrap();
        let c = Origin::from_uri(&"http://127.0.0.1:3004/a".parse().unwrap()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
