#![forbid(unsafe_code)]

pub mod endpoint {
	use std::fmt;
	use std::net::SocketAddr;
	use std::str::FromStr;

	use thiserror::Error;

	/// URL scheme accepted for endpoints.
	pub const WS_SCHEME: &str = "ws://";

	const WSS_SCHEME: &str = "wss://";

	/// Why a `ws://host:port` string was rejected.
	#[derive(Debug, Error, Clone, PartialEq, Eq)]
	pub enum EndpointError {
		#[error("endpoint must be non-empty (expected ws://host:port)")]
		Empty,

		#[error("wss:// is not supported; chat runs over plain ws:// (got {0})")]
		TlsUnsupported(String),

		#[error("endpoint must start with ws:// (got {0})")]
		MissingScheme(String),

		/// Only the root resource is served; a request path would be ignored by the server.
		#[error("endpoint must not carry a path, query or fragment beyond `/` (got {0})")]
		UnexpectedResource(String),

		#[error("endpoint host is empty (got {0})")]
		EmptyHost(String),

		#[error("IPv6 hosts must be bracketed like ws://[::1]:8080 (got {0})")]
		UnbracketedIpv6(String),

		#[error("endpoint needs an explicit port (got {0})")]
		MissingPort(String),

		#[error("endpoint port must be in 1..=65535 (got {0})")]
		InvalidPort(String),

		#[error("host must be an IP literal to bind (DNS names need resolving first): {0}")]
		NotIpLiteral(String),
	}

	/// Parsed `ws://host:port` endpoint. IPv6 hosts keep their brackets.
	#[derive(Debug, Clone, PartialEq, Eq, Hash)]
	pub struct WsEndpoint {
		pub host: String,
		pub port: u16,
	}

	impl WsEndpoint {
		pub fn hostport(&self) -> String {
			format!("{}:{}", self.host, self.port)
		}

		/// Connectable URL for a WebSocket client (`ws://host:port/`).
		pub fn url(&self) -> String {
			format!("{WS_SCHEME}{}/", self.hostport())
		}

		/// Convert to `SocketAddr` only if the host is an IP literal.
		pub fn to_socket_addr_if_ip_literal(&self) -> Result<SocketAddr, EndpointError> {
			self.hostport()
				.parse()
				.map_err(|_| EndpointError::NotIpLiteral(self.host.clone()))
		}

		/// Parse `ws://host:port`, optionally followed by a bare `/`. The scheme is matched case-insensitively.
		pub fn parse(s: &str) -> Result<Self, EndpointError> {
			let s = s.trim();
			if s.is_empty() {
				return Err(EndpointError::Empty);
			}

			let authority = match strip_scheme(s, WS_SCHEME) {
				Some(rest) => rest,
				None if strip_scheme(s, WSS_SCHEME).is_some() => {
					return Err(EndpointError::TlsUnsupported(s.to_string()));
				}
				None => return Err(EndpointError::MissingScheme(s.to_string())),
			};

			let authority = authority.strip_suffix('/').unwrap_or(authority);
			if authority.contains(['/', '?', '#']) {
				return Err(EndpointError::UnexpectedResource(s.to_string()));
			}

			let (host, port) = split_authority(authority, s)?;

			let port: u16 = port
				.parse()
				.ok()
				.filter(|p| *p != 0)
				.ok_or_else(|| EndpointError::InvalidPort(s.to_string()))?;

			Ok(Self {
				host: host.to_string(),
				port,
			})
		}
	}

	fn strip_scheme<'a>(s: &'a str, scheme: &str) -> Option<&'a str> {
		let head = s.get(..scheme.len())?;
		head.eq_ignore_ascii_case(scheme).then(|| &s[scheme.len()..])
	}

	/// Split `host:port` / `[v6]:port`; `original` is only used for error messages.
	fn split_authority<'a>(authority: &'a str, original: &str) -> Result<(&'a str, &'a str), EndpointError> {
		let owned = || original.to_string();

		if authority.starts_with('[') {
			let close = authority.find(']').ok_or_else(|| EndpointError::UnbracketedIpv6(owned()))?;
			let host = &authority[..=close];
			if host == "[]" {
				return Err(EndpointError::EmptyHost(owned()));
			}
			let port = authority[close + 1..]
				.strip_prefix(':')
				.ok_or_else(|| EndpointError::MissingPort(owned()))?;
			return Ok((host, port));
		}

		let (host, port) = authority.rsplit_once(':').ok_or_else(|| EndpointError::MissingPort(owned()))?;
		if host.is_empty() {
			return Err(EndpointError::EmptyHost(owned()));
		}
		if host.contains(':') {
			return Err(EndpointError::UnbracketedIpv6(owned()));
		}
		Ok((host, port))
	}

	impl fmt::Display for WsEndpoint {
		fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
			write!(f, "{WS_SCHEME}{}", self.hostport())
		}
	}

	impl FromStr for WsEndpoint {
		type Err = EndpointError;

		fn from_str(s: &str) -> Result<Self, Self::Err> {
			Self::parse(s)
		}
	}

}
