#![forbid(unsafe_code)]

use roomchat_protocol::ServerEnvelope;

/// Carriage return + erase-to-end-of-line: wipes a half-drawn prompt before server output.
pub const CLEAR_LINE: &str = "\r\x1b[K";

/// One line of terminal output for a server envelope.
pub fn server_event(envelope: &ServerEnvelope) -> String {
	match envelope {
		ServerEnvelope::RoomKey { room_key } => {
			format!("{CLEAR_LINE}room created, key: {room_key}\n(share this key so others can join)")
		}
		ServerEnvelope::Error { data } => format!("{CLEAR_LINE}error: {data}"),
		ServerEnvelope::Message { data, name } => format!("{CLEAR_LINE}[{name}]: {data}"),
	}
}

pub fn notice(text: &str) -> String {
	format!("{CLEAR_LINE}{text}")
}

pub fn connection_lost() -> String {
	format!("{CLEAR_LINE}connection to server lost")
}
