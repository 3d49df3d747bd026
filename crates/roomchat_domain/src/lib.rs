#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
}

/// Server-side identity of one transport connection.
///
/// Minted by the accept loop; never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnId(u64);

impl ConnId {
	pub const fn new(id: u64) -> Self {
		Self(id)
	}

	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for ConnId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "conn-{}", self.0)
	}
}

impl From<u64> for ConnId {
	fn from(id: u64) -> Self {
		Self(id)
	}
}

/// Opaque room identifier handed out by the server when a room is created.
///
/// Clients echo it back verbatim to join; the server never interprets its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RoomKey(String);

impl RoomKey {
	/// Create a non-empty `RoomKey`.
	pub fn new(key: impl Into<String>) -> Result<Self, ParseIdError> {
		let key = key.into();
		if key.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(key))
	}

	/// Mint a fresh key backed by 128 bits of randomness (UUID v4, hyphenated).
	pub fn generate() -> Self {
		Self(uuid::Uuid::new_v4().to_string())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for RoomKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for RoomKey {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		RoomKey::new(s.to_string())
	}
}

impl TryFrom<String> for RoomKey {
	type Error = ParseIdError;

	fn try_from(key: String) -> Result<Self, Self::Error> {
		RoomKey::new(key)
	}
}

impl From<RoomKey> for String {
	fn from(key: RoomKey) -> Self {
		key.0
	}
}

impl AsRef<str> for RoomKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
