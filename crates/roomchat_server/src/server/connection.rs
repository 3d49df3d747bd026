#![forbid(unsafe_code)]

use std::future::Future;
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use futures::{SinkExt as _, StreamExt as _};
use roomchat_domain::ConnId;
use roomchat_protocol::{ServerEnvelope, encode_server_envelope};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::server::router::MessageRouter;

/// Per-connection transport settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
	/// Grace period for the writer to flush queued envelopes after the read side ends.
	pub writer_drain_timeout: Duration,
}

impl Default for ConnectionSettings {
	fn default() -> Self {
		Self {
			writer_drain_timeout: Duration::from_secs(2),
		}
	}
}

/// Removes the connection from the registry when the connection task ends, however it ends.
struct RegistrationGuard {
	conn_id: ConnId,
	router: MessageRouter,
}

impl Drop for RegistrationGuard {
	fn drop(&mut self) {
		self.router.handle_disconnect(self.conn_id);
	}
}

/// Accept TCP connections until `shutdown` resolves, running one task per connection.
pub async fn serve(
	listener: TcpListener,
	router: MessageRouter,
	settings: ConnectionSettings,
	shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
	let local_addr = listener.local_addr().context("listener local_addr")?;
	info!(%local_addr, "accepting websocket connections");

	tokio::pin!(shutdown);
	let mut next_conn_id: u64 = 1;

	loop {
		let (stream, remote) = tokio::select! {
			_ = &mut shutdown => {
				info!("shutdown requested; accept loop exiting");
				break;
			}
			accepted = listener.accept() => match accepted {
				Ok(v) => v,
				Err(e) => {
					warn!(error = %e, "failed to accept tcp connection");
					continue;
				}
			},
		};

		let conn_id = ConnId::new(next_conn_id);
		next_conn_id += 1;
		metrics::counter!("roomchat_server_connections_total").increment(1);

		let router = router.clone();
		let settings = settings.clone();
		tokio::spawn(async move {
			debug!(%conn_id, %remote, "accepted tcp connection");
			if let Err(e) = handle_connection(conn_id, stream, router, settings).await {
				warn!(%conn_id, error = %format!("{e:#}"), "connection handler exited with error");
			}
		});
	}

	Ok(())
}

/// Drive one WebSocket connection from handshake to close.
pub async fn handle_connection(
	conn_id: ConnId,
	stream: TcpStream,
	router: MessageRouter,
	settings: ConnectionSettings,
) -> anyhow::Result<()> {
	let ws = tokio_tungstenite::accept_async(stream)
		.await
		.context("websocket handshake")?;
	let (mut sink, mut source) = ws.split();

	// The writer absorbs backpressure from this socket; fanout never waits on it.
	let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerEnvelope>();
	router
		.handle_connect(conn_id, outbound_tx)
		.context("register connection")?;
	let registration = RegistrationGuard {
		conn_id,
		router: router.clone(),
	};
	info!(%conn_id, "client connected");

	let mut writer = tokio::spawn(async move {
		while let Some(envelope) = outbound_rx.recv().await {
			let text = match encode_server_envelope(&envelope) {
				Ok(text) => text,
				Err(e) => {
					warn!(%conn_id, error = %e, "failed to encode outbound envelope");
					continue;
				}
			};

			if let Err(e) = sink.send(Message::Text(text.into())).await {
				debug!(%conn_id, error = %e, "websocket write failed; writer exiting");
				return;
			}
		}

		let _ = sink.close().await;
	});

	let result = loop {
		let Some(frame) = source.next().await else {
			break Ok(());
		};

		match frame {
			Ok(Message::Text(text)) => {
				router.handle_text(conn_id, text.as_str());
			}
			Ok(Message::Binary(bytes)) => {
				router.handle_binary(conn_id, &bytes);
			}
			Ok(Message::Close(close)) => {
				debug!(%conn_id, ?close, "client sent close");
				break Ok(());
			}
			// Ping/pong is answered by tungstenite itself.
			Ok(_) => {}
			Err(e) => break Err(anyhow!(e).context("websocket read failed")),
		}
	};

	// Deregister first so the writer's queue loses its last sender and drains out.
	drop(registration);
	info!(%conn_id, "client disconnected");

	if tokio::time::timeout(settings.writer_drain_timeout, &mut writer).await.is_err() {
		writer.abort();
	}

	result
}
