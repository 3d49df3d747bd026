#![forbid(unsafe_code)]

use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use roomchat_protocol::{
	ClientEnvelope, DEFAULT_MAX_ENVELOPE_SIZE, ProtocolError, ServerEnvelope, decode_server_envelope,
	encode_client_envelope,
};
use roomchat_util::endpoint::{EndpointError, WsEndpoint};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

pub mod prompt;
pub mod render;

/// Server endpoint used when none is given.
pub const DEFAULT_SERVER_ENDPOINT: &str = "ws://127.0.0.1:8080";

/// Client session configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Server endpoint.
	pub endpoint: WsEndpoint,

	/// Inbound envelopes above this size are skipped.
	pub max_envelope_bytes: usize,

	/// Timeout for TCP connect + WebSocket handshake.
	pub connect_timeout: Duration,
}

impl ClientConfig {
	/// Convenience: create a config from `ws://host:port`.
	pub fn from_ws_endpoint(endpoint: &str) -> Result<Self, ClientError> {
		let endpoint = WsEndpoint::parse(endpoint).map_err(ClientError::Endpoint)?;
		Ok(Self {
			endpoint,
			..Self::default()
		})
	}
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			endpoint: WsEndpoint {
				host: "127.0.0.1".to_string(),
				port: 8080,
			},
			max_envelope_bytes: DEFAULT_MAX_ENVELOPE_SIZE,
			connect_timeout: Duration::from_secs(10),
		}
	}
}

/// Errors for client session operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
	/// Endpoint string did not parse.
	#[error("invalid endpoint: {0}")]
	Endpoint(#[from] EndpointError),

	/// Connection establishment failed.
	#[error("failed to connect: {0}")]
	Connect(String),

	/// Envelope encoding failed.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),

	/// WebSocket IO error.
	#[error("io error: {0}")]
	Io(String),

	/// The server closed the connection.
	#[error("connection closed by server")]
	Closed,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One WebSocket connection to the chat server.
pub struct Session {
	ws: WsStream,
	max_envelope_bytes: usize,
}

impl Session {
	/// Connect and complete the WebSocket handshake.
	pub async fn connect(cfg: ClientConfig) -> Result<Self, ClientError> {
		let url = cfg.endpoint.url();
		let connect_timeout = cfg.connect_timeout;

		let (ws, _response) = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url.as_str()))
			.await
			.map_err(|_| ClientError::Connect(format!("connect timeout after {connect_timeout:?} ({url})")))?
			.map_err(|e| ClientError::Connect(format!("{url}: {e}")))?;

		info!(%url, "connected");

		Ok(Self {
			ws,
			max_envelope_bytes: cfg.max_envelope_bytes,
		})
	}

	/// Send one envelope as a text frame.
	pub async fn send(&mut self, envelope: &ClientEnvelope) -> Result<(), ClientError> {
		let text = encode_client_envelope(envelope)?;
		debug!(kind = envelope.kind(), "sending envelope");
		self.ws
			.send(Message::Text(text.into()))
			.await
			.map_err(|e| ClientError::Io(format!("send {} failed: {e}", envelope.kind())))
	}

	/// Wait for the next server envelope.
	///
	/// Returns `Ok(None)` once the server closes the connection. Frames that do not decode are skipped.
	/// Cancel-safe: dropping the future never loses a decoded envelope.
	pub async fn next_event(&mut self) -> Result<Option<ServerEnvelope>, ClientError> {
		while let Some(frame) = self.ws.next().await {
			let frame = frame.map_err(|e| ClientError::Io(format!("websocket read failed: {e}")))?;
			let text = match &frame {
				Message::Text(text) => text.as_str(),
				Message::Binary(bytes) => match std::str::from_utf8(bytes) {
					Ok(text) => text,
					Err(e) => {
						warn!(error = %e, "skipping non-utf8 binary frame");
						continue;
					}
				},
				Message::Close(close) => {
					debug!(?close, "server sent close");
					return Ok(None);
				}
				_ => continue,
			};

			match decode_server_envelope(text, self.max_envelope_bytes) {
				Ok(envelope) => return Ok(Some(envelope)),
				Err(e) => warn!(error = %e, "skipping undecodable server frame"),
			}
		}

		Ok(None)
	}

	/// Like [`Session::next_event`], but a server close is an error too.
	pub async fn recv(&mut self) -> Result<ServerEnvelope, ClientError> {
		self.next_event().await?.ok_or(ClientError::Closed)
	}

	/// Close the connection gracefully.
	pub async fn close(mut self) -> Result<(), ClientError> {
		self.ws
			.close(None)
			.await
			.map_err(|e| ClientError::Io(format!("close failed: {e}")))
	}
}
