#![forbid(unsafe_code)]

use std::sync::OnceLock;
use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use roomchat_client::{ClientConfig, Session};
use roomchat_domain::{ConnId, RoomKey};
use roomchat_protocol::{ClientEnvelope, ServerEnvelope, decode_server_envelope, errors};
use roomchat_util::endpoint::WsEndpoint;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use crate::server::connection::{ConnectionSettings, serve};
use crate::server::registry::ConnectionRegistry;
use crate::server::router::{MessageRouter, RouterConfig};

const STEP: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

static LOG_INIT: OnceLock<()> = OnceLock::new();

fn init_test_logging() {
	LOG_INIT.get_or_init(|| {
		if std::env::var_os("ROOMCHAT_TEST_LOG").is_none() {
			return;
		}

		let _ = tracing_subscriber::fmt()
			.with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
			.with_target(false)
			.try_init();
	});
}

struct TestServer {
	endpoint: WsEndpoint,
	router: MessageRouter,
	shutdown: oneshot::Sender<()>,
	task: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
	async fn start() -> Self {
		init_test_logging();

		let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
		let addr = listener.local_addr().expect("local_addr");
		let router = MessageRouter::new(ConnectionRegistry::new(), RouterConfig::default());
		let (shutdown, stop) = oneshot::channel::<()>();

		let task = tokio::spawn(serve(listener, router.clone(), ConnectionSettings::default(), async move {
			let _ = stop.await;
		}));

		Self {
			endpoint: WsEndpoint::parse(&format!("ws://{addr}")).expect("endpoint"),
			router,
			shutdown,
			task,
		}
	}

	async fn client(&self) -> Session {
		let cfg = ClientConfig {
			endpoint: self.endpoint.clone(),
			..ClientConfig::default()
		};
		timeout(STEP, Session::connect(cfg))
			.await
			.expect("connect timeout")
			.expect("connect")
	}

	fn members(&self, room_key: &RoomKey) -> usize {
		// Accepted connections are numbered from 1, so 0 excludes nobody.
		self.router.registry().find_room_members(room_key, ConnId::new(0)).len()
	}

	async fn wait_until(&self, what: &str, cond: impl Fn(&Self) -> bool) {
		timeout(STEP, async {
			while !cond(self) {
				tokio::time::sleep(Duration::from_millis(10)).await;
			}
		})
		.await
		.unwrap_or_else(|_| panic!("timed out waiting for {what}"));
	}

	async fn stop(self) {
		let _ = self.shutdown.send(());
		timeout(STEP, self.task)
			.await
			.expect("serve did not stop")
			.expect("serve task panicked")
			.expect("serve returned error");
	}
}

async fn next(session: &mut Session) -> ServerEnvelope {
	timeout(STEP, session.next_event())
		.await
		.expect("timed out waiting for server envelope")
		.expect("read")
		.expect("server closed connection")
}

async fn assert_silent(session: &mut Session) {
	if let Ok(event) = timeout(QUIET, session.next_event()).await {
		panic!("expected no server traffic, got {event:?}");
	}
}

async fn create(session: &mut Session, name: &str) -> RoomKey {
	session
		.send(&ClientEnvelope::CreateRoom { name: name.to_string() })
		.await
		.expect("send createRoom");
	match next(session).await {
		ServerEnvelope::RoomKey { room_key } => room_key,
		other => panic!("expected roomKey, got {other:?}"),
	}
}

async fn join(session: &mut Session, name: &str, room_key: &str) {
	session
		.send(&ClientEnvelope::JoinRoom {
			name: name.to_string(),
			room_key: room_key.to_string(),
		})
		.await
		.expect("send joinRoom");
}

#[tokio::test]
async fn create_join_and_relay_between_two_clients() {
	let server = TestServer::start().await;
	let mut a = server.client().await;
	let mut b = server.client().await;

	let key = create(&mut a, "A").await;
	assert!(!key.as_str().is_empty());

	join(&mut b, "B", key.as_str()).await;
	server.wait_until("B to join", |s| s.members(&key) == 2).await;

	a.send(&ClientEnvelope::Message { data: "hi".to_string() })
		.await
		.unwrap();
	assert_eq!(next(&mut b).await, ServerEnvelope::Message {
		data: "hi".to_string(),
		name: "A".to_string(),
	});
	assert_silent(&mut a).await;

	b.send(&ClientEnvelope::Message { data: "hey".to_string() })
		.await
		.unwrap();
	assert_eq!(next(&mut a).await, ServerEnvelope::Message {
		data: "hey".to_string(),
		name: "B".to_string(),
	});

	a.close().await.unwrap();
	b.close().await.unwrap();
	server.stop().await;
}

#[tokio::test]
async fn joining_unknown_room_is_reported() {
	let server = TestServer::start().await;
	let mut c = server.client().await;

	join(&mut c, "C", &RoomKey::generate().into_string()).await;
	assert_eq!(next(&mut c).await, ServerEnvelope::error(errors::ROOM_NOT_FOUND));

	// The connection stays usable and unjoined.
	let key = create(&mut c, "C").await;
	server.wait_until("C to own the room", |s| s.members(&key) == 1).await;

	server.stop().await;
}

#[tokio::test]
async fn room_disappears_once_its_last_member_leaves() {
	let server = TestServer::start().await;
	let mut a = server.client().await;
	let key = create(&mut a, "A").await;

	a.close().await.unwrap();
	server
		.wait_until("A's room to be removed", |s| !s.router.registry().room_exists(&key))
		.await;

	let mut d = server.client().await;
	join(&mut d, "D", key.as_str()).await;
	assert_eq!(next(&mut d).await, ServerEnvelope::error(errors::ROOM_NOT_FOUND));

	server.stop().await;
}

#[tokio::test]
async fn departed_member_is_not_a_target_and_nobody_is_told() {
	let server = TestServer::start().await;
	let mut a = server.client().await;
	let mut b = server.client().await;
	let mut c = server.client().await;

	let key = create(&mut a, "A").await;
	join(&mut b, "B", key.as_str()).await;
	join(&mut c, "C", key.as_str()).await;
	server.wait_until("B and C to join", |s| s.members(&key) == 3).await;

	// Dropping without a close frame still tears the entry down.
	drop(b);
	server.wait_until("B to be removed", |s| s.members(&key) == 2).await;
	assert_silent(&mut a).await;

	a.send(&ClientEnvelope::Message { data: "still here".to_string() })
		.await
		.unwrap();
	assert_eq!(next(&mut c).await, ServerEnvelope::Message {
		data: "still here".to_string(),
		name: "A".to_string(),
	});

	server.stop().await;
}

#[tokio::test]
async fn slow_reader_still_receives_every_message_in_order() {
	let server = TestServer::start().await;
	let mut a = server.client().await;
	let mut b = server.client().await;

	let key = create(&mut a, "A").await;
	join(&mut b, "B", key.as_str()).await;
	server.wait_until("B to join", |s| s.members(&key) == 2).await;

	// Far more than the socket buffers hold, so most of it queues server-side while B is not reading.
	let total = 2_000usize;
	let pad = "x".repeat(4 * 1024);
	for i in 0..total {
		a.send(&ClientEnvelope::Message {
			data: format!("{i}:{pad}"),
		})
		.await
		.expect("send message");
	}

	for i in 0..total {
		match next(&mut b).await {
			ServerEnvelope::Message { data, name } => {
				assert_eq!(name, "A");
				let (seq, _) = data.split_once(':').expect("sequence prefix");
				assert_eq!(seq, i.to_string(), "message {i} arrived out of order or was lost");
			}
			other => panic!("expected message, got {other:?}"),
		}
	}
	assert_silent(&mut b).await;
	assert_eq!(server.members(&key), 2, "B stays a member throughout");

	server.stop().await;
}

#[tokio::test]
async fn malformed_frames_are_ignored_and_binary_json_is_accepted() {
	let server = TestServer::start().await;
	let (mut ws, _) = tokio_tungstenite::connect_async(server.endpoint.url().as_str())
		.await
		.expect("raw connect");

	ws.send(Message::Text("definitely not json".into())).await.unwrap();
	ws.send(Message::Text(r#"{"type":"teleport"}"#.into())).await.unwrap();
	ws.send(Message::Binary(br#"{"type":"createRoom","name":"raw"}"#.to_vec().into()))
		.await
		.unwrap();

	let reply = timeout(STEP, async {
		loop {
			match ws.next().await {
				Some(Ok(Message::Text(text))) => break text,
				Some(Ok(_)) => continue,
				other => panic!("connection ended early: {other:?}"),
			}
		}
	})
	.await
	.expect("reply timeout");

	match decode_server_envelope(reply.as_str(), usize::MAX).unwrap() {
		ServerEnvelope::RoomKey { room_key } => assert!(server.router.registry().room_exists(&room_key)),
		other => panic!("expected roomKey, got {other:?}"),
	}

	server.stop().await;
}

#[tokio::test]
async fn shutdown_stops_accepting() {
	let server = TestServer::start().await;
	let endpoint = server.endpoint.clone();
	server.stop().await;

	let cfg = ClientConfig {
		endpoint,
		connect_timeout: Duration::from_secs(2),
		..ClientConfig::default()
	};
	assert!(Session::connect(cfg).await.is_err());
}
