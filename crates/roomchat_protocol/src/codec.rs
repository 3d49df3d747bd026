#![forbid(unsafe_code)]

use thiserror::Error;

use crate::envelope::{ClientEnvelope, ServerEnvelope};

/// Default maximum size of a single inbound envelope.
pub const DEFAULT_MAX_ENVELOPE_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug, Error)]
pub enum ProtocolError {
	#[error("envelope exceeds maximum size: len={len} max={max}")]
	EnvelopeTooLarge {
		len: usize,
		max: usize,
	},

	#[error("envelope is not valid utf-8")]
	InvalidUtf8(#[from] std::str::Utf8Error),

	#[error("json error: {0}")]
	Json(#[from] serde_json::Error),
}

fn check_len(len: usize, max: usize) -> Result<(), ProtocolError> {
	if len > max {
		return Err(ProtocolError::EnvelopeTooLarge { len, max });
	}
	Ok(())
}

/// Decode a client envelope from a text frame.
///
/// Missing or unknown `type`, missing fields and non-object JSON all surface as `ProtocolError::Json`.
pub fn decode_client_envelope(text: &str, max_size: usize) -> Result<ClientEnvelope, ProtocolError> {
	check_len(text.len(), max_size)?;
	Ok(serde_json::from_str(text)?)
}

/// Decode a client envelope carried in a binary frame (UTF-8 JSON).
pub fn decode_client_envelope_bytes(bytes: &[u8], max_size: usize) -> Result<ClientEnvelope, ProtocolError> {
	check_len(bytes.len(), max_size)?;
	let text = std::str::from_utf8(bytes)?;
	Ok(serde_json::from_str(text)?)
}

pub fn encode_server_envelope(env: &ServerEnvelope) -> Result<String, ProtocolError> {
	Ok(serde_json::to_string(env)?)
}

pub fn encode_client_envelope(env: &ClientEnvelope) -> Result<String, ProtocolError> {
	Ok(serde_json::to_string(env)?)
}

pub fn decode_server_envelope(text: &str, max_size: usize) -> Result<ServerEnvelope, ProtocolError> {
	check_len(text.len(), max_size)?;
	Ok(serde_json::from_str(text)?)
}
