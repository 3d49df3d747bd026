#![forbid(unsafe_code)]

pub mod codec;
pub mod envelope;

pub use codec::{
	DEFAULT_MAX_ENVELOPE_SIZE, ProtocolError, decode_client_envelope, decode_client_envelope_bytes,
	decode_server_envelope, encode_client_envelope, encode_server_envelope,
};
pub use envelope::{ClientEnvelope, ServerEnvelope};

/// Well-known `error` envelope payloads.
pub mod errors {
	/// `joinRoom` named a key no live connection holds.
	pub const ROOM_NOT_FOUND: &str = "room not found";

	/// `createRoom`/`joinRoom` from a connection that already belongs to a room.
	pub const ALREADY_IN_ROOM: &str = "already in a room";
}
