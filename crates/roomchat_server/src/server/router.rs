#![forbid(unsafe_code)]

use std::sync::Arc;

use roomchat_domain::{ConnId, RoomKey};
use roomchat_protocol::{
	ClientEnvelope, DEFAULT_MAX_ENVELOPE_SIZE, ProtocolError, ServerEnvelope, decode_client_envelope,
	decode_client_envelope_bytes, errors,
};
use tracing::{debug, info};

use crate::server::registry::{ClientConnection, ConnectionRegistry, ConnectionState, Outbound, RegistryError};
use crate::server::room_key::{RoomKeyGenerator, UuidRoomKeyGenerator};

/// Settings for the message router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
	/// Inbound envelopes above this size are dropped as malformed.
	pub max_envelope_bytes: usize,

	pub debug_log_events: bool,
}

impl Default for RouterConfig {
	fn default() -> Self {
		Self {
			max_envelope_bytes: DEFAULT_MAX_ENVELOPE_SIZE,
			debug_log_events: false,
		}
	}
}

/// Why an inbound envelope produced no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
	/// Not JSON, unknown/missing `type`, missing fields or oversized.
	Malformed,
	/// `message` before createRoom/joinRoom succeeded.
	NotJoined,
	/// The handle is not (or no longer) in the registry.
	UnknownConnection,
}

/// Result of routing one inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
	RoomCreated(RoomKey),
	Joined(RoomKey),
	RoomNotFound,
	AlreadyJoined,
	Relayed { delivered: usize, skipped: usize },
	Dropped(DropReason),
}


/// Interprets inbound envelopes, mutates the registry and fans out chat.
#[derive(Debug, Clone)]
pub struct MessageRouter {
	cfg: RouterConfig,
	registry: ConnectionRegistry,
	keys: Arc<dyn RoomKeyGenerator>,
}

impl MessageRouter {
	pub fn new(registry: ConnectionRegistry, cfg: RouterConfig) -> Self {
		Self::with_key_generator(registry, Arc::new(UuidRoomKeyGenerator), cfg)
	}

	pub fn with_key_generator(registry: ConnectionRegistry, keys: Arc<dyn RoomKeyGenerator>, cfg: RouterConfig) -> Self {
		Self { cfg, registry, keys }
	}

	#[allow(dead_code)]
	pub fn registry(&self) -> &ConnectionRegistry {
		&self.registry
	}

	/// Transport reported a new connection.
	pub fn handle_connect(&self, id: ConnId, outbound: Outbound) -> Result<ClientConnection, RegistryError> {
		let entry = self.registry.register(id, outbound)?;
		metrics::gauge!("roomchat_server_active_connections").increment(1.0);
		Ok(entry)
	}

	/// Transport reported close or a fatal error. Safe to call more than once.
	pub fn handle_disconnect(&self, id: ConnId) -> Option<ClientConnection> {
		let removed = self.registry.remove(id)?;
		metrics::gauge!("roomchat_server_active_connections").decrement(1.0);

		info!(
			conn_id = %id,
			room = ?removed.room_key.as_ref().map(RoomKey::as_str),
			"connection removed from registry"
		);
		Some(removed)
	}

	/// Route a text frame.
	pub fn handle_text(&self, id: ConnId, text: &str) -> RouteOutcome {
		let decoded = decode_client_envelope(text, self.cfg.max_envelope_bytes);
		self.handle_decoded(id, decoded)
	}

	/// Route a binary frame carrying UTF-8 JSON.
	pub fn handle_binary(&self, id: ConnId, bytes: &[u8]) -> RouteOutcome {
		let decoded = decode_client_envelope_bytes(bytes, self.cfg.max_envelope_bytes);
		self.handle_decoded(id, decoded)
	}

	fn handle_decoded(&self, id: ConnId, decoded: Result<ClientEnvelope, ProtocolError>) -> RouteOutcome {
		match decoded {
			Ok(envelope) => self.handle_envelope(id, envelope),
			Err(e) => {
				metrics::counter!("roomchat_server_envelopes_dropped_total", "reason" => "malformed").increment(1);
				debug!(conn_id = %id, error = %e, "dropping malformed envelope");
				RouteOutcome::Dropped(DropReason::Malformed)
			}
		}
	}

	/// Route a decoded envelope.
	pub fn handle_envelope(&self, id: ConnId, envelope: ClientEnvelope) -> RouteOutcome {
		if self.cfg.debug_log_events {
			debug!(conn_id = %id, kind = envelope.kind(), "routing envelope");
		}

		match envelope {
			ClientEnvelope::CreateRoom { name } => self.create_room(id, name),
			ClientEnvelope::JoinRoom { name, room_key } => self.join_room(id, name, room_key),
			ClientEnvelope::Message { data } => self.relay(id, data),
		}
	}

	fn create_room(&self, id: ConnId, name: String) -> RouteOutcome {
		let room_key = self.keys.generate();

		match self.registry.attach(id, name, room_key.clone()) {
			Ok(entry) => {
				metrics::counter!("roomchat_server_rooms_created_total").increment(1);
				info!(conn_id = %id, room = %room_key, "room created");
				deliver(&entry, ServerEnvelope::RoomKey {
					room_key: room_key.clone(),
				});
				RouteOutcome::RoomCreated(room_key)
			}
			Err(e) => self.reject(id, e),
		}
	}

	fn join_room(&self, id: ConnId, name: String, room_key: String) -> RouteOutcome {
		// A blank key can never name a live room.
		let Ok(room_key) = RoomKey::new(room_key) else {
			return self.reject_unknown_room(id);
		};

		match self.registry.join_existing(id, name, room_key.clone()) {
			Ok(_) => {
				metrics::counter!("roomchat_server_joins_total").increment(1);
				info!(conn_id = %id, room = %room_key, "joined room");
				RouteOutcome::Joined(room_key)
			}
			Err(e) => self.reject(id, e),
		}
	}

	fn relay(&self, id: ConnId, data: String) -> RouteOutcome {
		let Some(sender) = self.registry.find_by_handle(id) else {
			return drop_envelope(id, DropReason::UnknownConnection);
		};

		let (Some(room_key), Some(name), ConnectionState::Joined) = (sender.room_key, sender.name, sender.state) else {
			return drop_envelope(id, DropReason::NotJoined);
		};

		let targets = self.registry.find_room_members(&room_key, id);

		let mut delivered = 0usize;
		let mut skipped = 0usize;
		for target in &targets {
			let envelope = ServerEnvelope::Message {
				data: data.clone(),
				name: name.clone(),
			};

			if deliver(target, envelope) {
				delivered += 1;
			} else {
				skipped += 1;
				debug!(conn_id = %target.id, room = %room_key, "target writer gone; skipped");
			}
		}

		metrics::counter!("roomchat_server_messages_relayed_total").increment(delivered as u64);

		if self.cfg.debug_log_events {
			debug!(conn_id = %id, room = %room_key, delivered, skipped, "relayed message");
		}

		RouteOutcome::Relayed { delivered, skipped }
	}

	fn reject(&self, id: ConnId, err: RegistryError) -> RouteOutcome {
		match err {
			RegistryError::RoomNotFound(_) => self.reject_unknown_room(id),
			RegistryError::AlreadyJoined(_) => {
				debug!(conn_id = %id, "rejecting room change for joined connection");
				self.reply(id, ServerEnvelope::error(errors::ALREADY_IN_ROOM));
				RouteOutcome::AlreadyJoined
			}
			RegistryError::NotRegistered(_) | RegistryError::Conflict(_) => {
				drop_envelope(id, DropReason::UnknownConnection)
			}
		}
	}

	fn reject_unknown_room(&self, id: ConnId) -> RouteOutcome {
		metrics::counter!("roomchat_server_join_failures_total").increment(1);
		debug!(conn_id = %id, "join rejected: room not found");
		self.reply(id, ServerEnvelope::error(errors::ROOM_NOT_FOUND));
		RouteOutcome::RoomNotFound
	}

	/// Send to the originator, if it is still registered.
	fn reply(&self, id: ConnId, envelope: ServerEnvelope) {
		if let Some(entry) = self.registry.find_by_handle(id) {
			deliver(&entry, envelope);
		}
	}
}

fn drop_envelope(id: ConnId, reason: DropReason) -> RouteOutcome {
	let label = match reason {
		DropReason::Malformed => "malformed",
		DropReason::NotJoined => "not_joined",
		DropReason::UnknownConnection => "unknown_connection",
	};
	metrics::counter!("roomchat_server_envelopes_dropped_total", "reason" => label).increment(1);
	debug!(conn_id = %id, reason = label, "dropping envelope");
	RouteOutcome::Dropped(reason)
}

/// Non-blocking enqueue onto a connection's outbound queue. False once the writer has gone away.
fn deliver(target: &ClientConnection, envelope: ServerEnvelope) -> bool {
	target.outbound().send(envelope).is_ok()
}
