#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use roomchat_domain::{ConnId, RoomKey};
use roomchat_protocol::ServerEnvelope;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Sending half of a connection's outbound queue, drained by its writer task.
///
/// Unbounded: a slow reader grows its own backlog instead of losing messages or stalling fanout.
pub type Outbound = mpsc::UnboundedSender<ServerEnvelope>;

/// Lifecycle of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	/// Transport is up, no room yet.
	Pending,
	Joined,
	/// Only ever observed on the value returned by `ConnectionRegistry::remove`.
	Terminated,
}

/// Snapshot of one registry entry.
#[derive(Debug, Clone)]
pub struct ClientConnection {
	pub id: ConnId,
	pub name: Option<String>,
	pub room_key: Option<RoomKey>,
	pub state: ConnectionState,
	outbound: Outbound,
}

impl ClientConnection {
	/// Whether the connection's writer is still draining its queue.
	#[allow(dead_code)]
	pub fn is_open(&self) -> bool {
		!self.outbound.is_closed()
	}

	pub fn outbound(&self) -> &Outbound {
		&self.outbound
	}
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
	#[error("{0} is already registered")]
	Conflict(ConnId),

	#[error("{0} is not registered")]
	NotRegistered(ConnId),

	#[error("{0} already joined a room")]
	AlreadyJoined(ConnId),

	#[error("no connection holds room key {0}")]
	RoomNotFound(RoomKey),
}

/// Point-in-time counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
	pub connections: usize,
	pub rooms: usize,
}

/// Live mapping from connection handle to name, room key and state.
///
/// Every operation runs under a single lock and never performs I/O while holding it.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
	inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
	entries: HashMap<ConnId, ClientConnection>,

	/// room key -> members. A key is present iff at least one entry holds it.
	rooms: HashMap<RoomKey, HashSet<ConnId>>,
}

impl ConnectionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert a `Pending` entry for a freshly accepted connection.
	pub fn register(&self, id: ConnId, outbound: Outbound) -> Result<ClientConnection, RegistryError> {
		let mut inner = self.inner.lock();
		if inner.entries.contains_key(&id) {
			return Err(RegistryError::Conflict(id));
		}

		let entry = ClientConnection {
			id,
			name: None,
			room_key: None,
			state: ConnectionState::Pending,
			outbound,
		};
		inner.entries.insert(id, entry.clone());

		debug!(conn_id = %id, conns = inner.entries.len(), "registry: registered");
		Ok(entry)
	}

	/// Bind a `Pending` entry to `room_key` under `name`.
	///
	/// The key is stored as given; uniqueness is the caller's concern.
	pub fn attach(&self, id: ConnId, name: String, room_key: RoomKey) -> Result<ClientConnection, RegistryError> {
		let mut inner = self.inner.lock();
		inner.attach(id, name, room_key)
	}

	/// Like `attach`, but only if some live entry already holds `room_key`.
	///
	/// The existence check and the attach share one critical section.
	pub fn join_existing(&self, id: ConnId, name: String, room_key: RoomKey) -> Result<ClientConnection, RegistryError> {
		let mut inner = self.inner.lock();

		match inner.entries.get(&id) {
			None => return Err(RegistryError::NotRegistered(id)),
			Some(entry) if entry.state == ConnectionState::Joined => return Err(RegistryError::AlreadyJoined(id)),
			Some(_) => {}
		}

		if !inner.rooms.contains_key(&room_key) {
			return Err(RegistryError::RoomNotFound(room_key));
		}

		inner.attach(id, name, room_key)
	}

	pub fn find_by_handle(&self, id: ConnId) -> Option<ClientConnection> {
		self.inner.lock().entries.get(&id).cloned()
	}

	/// Snapshot of every member of `room_key` except `exclude`. Order is unspecified.
	pub fn find_room_members(&self, room_key: &RoomKey, exclude: ConnId) -> Vec<ClientConnection> {
		let inner = self.inner.lock();
		let Some(members) = inner.rooms.get(room_key) else {
			return Vec::new();
		};

		members
			.iter()
			.filter(|id| **id != exclude)
			.filter_map(|id| inner.entries.get(id).cloned())
			.collect()
	}

	#[allow(dead_code)]
	pub fn room_exists(&self, room_key: &RoomKey) -> bool {
		self.inner.lock().rooms.contains_key(room_key)
	}

	/// Drop the entry for `id`. Idempotent: later calls return `None`.
	pub fn remove(&self, id: ConnId) -> Option<ClientConnection> {
		let mut inner = self.inner.lock();
		let mut entry = inner.entries.remove(&id)?;

		if let Some(room_key) = entry.room_key.as_ref()
			&& let Some(members) = inner.rooms.get_mut(room_key)
		{
			members.remove(&id);
			if members.is_empty() {
				inner.rooms.remove(room_key);
				debug!(conn_id = %id, room = %room_key, "registry: room emptied");
			}
		}

		debug!(conn_id = %id, conns = inner.entries.len(), "registry: removed");

		entry.state = ConnectionState::Terminated;
		Some(entry)
	}

	#[allow(dead_code)]
	pub fn len(&self) -> usize {
		self.inner.lock().entries.len()
	}

	#[allow(dead_code)]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn stats(&self) -> RegistryStats {
		let inner = self.inner.lock();
		RegistryStats {
			connections: inner.entries.len(),
			rooms: inner.rooms.len(),
		}
	}
}

impl Inner {
	fn attach(&mut self, id: ConnId, name: String, room_key: RoomKey) -> Result<ClientConnection, RegistryError> {
		let entry = self.entries.get_mut(&id).ok_or(RegistryError::NotRegistered(id))?;
		if entry.state == ConnectionState::Joined {
			return Err(RegistryError::AlreadyJoined(id));
		}

		entry.name = Some(name);
		entry.room_key = Some(room_key.clone());
		entry.state = ConnectionState::Joined;
		let snapshot = entry.clone();

		let members = self.rooms.entry(room_key.clone()).or_default();
		members.insert(id);

		debug!(conn_id = %id, room = %room_key, members = members.len(), "registry: attached");
		Ok(snapshot)
	}
}
