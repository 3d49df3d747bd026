#![forbid(unsafe_code)]

use roomchat_domain::RoomKey;
use serde::{Deserialize, Serialize};

/// Envelopes sent by clients.
///
/// Wire form is a JSON object discriminated by `type`:
/// `{"type":"createRoom","name":..}`, `{"type":"joinRoom","name":..,"roomKey":..}`,
/// `{"type":"message","data":..}`. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEnvelope {
	CreateRoom {
		name: String,
	},

	/// `room_key` stays a raw string: a blank key is a lookup miss, not a malformed envelope.
	JoinRoom {
		name: String,
		#[serde(rename = "roomKey")]
		room_key: String,
	},

	Message {
		data: String,
	},
}

impl ClientEnvelope {
	/// Stable wire name of the variant, for logs and metrics labels.
	pub const fn kind(&self) -> &'static str {
		match self {
			ClientEnvelope::CreateRoom { .. } => "createRoom",
			ClientEnvelope::JoinRoom { .. } => "joinRoom",
			ClientEnvelope::Message { .. } => "message",
		}
	}
}

/// Envelopes sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEnvelope {
	/// Reply to `createRoom`.
	RoomKey {
		#[serde(rename = "roomKey")]
		room_key: RoomKey,
	},

	Error {
		data: String,
	},

	/// Chat relayed from another member of the recipient's room.
	Message {
		data: String,
		name: String,
	},
}

impl ServerEnvelope {
	pub fn error(data: impl Into<String>) -> Self {
		ServerEnvelope::Error { data: data.into() }
	}

	pub const fn kind(&self) -> &'static str {
		match self {
			ServerEnvelope::RoomKey { .. } => "roomKey",
			ServerEnvelope::Error { .. } => "error",
			ServerEnvelope::Message { .. } => "message",
		}
	}
}
