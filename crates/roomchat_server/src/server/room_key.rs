#![forbid(unsafe_code)]

use roomchat_domain::RoomKey;

/// Source of keys for newly created rooms.
///
/// Implementations must not consult the registry; collisions are ruled out by key space alone.
pub trait RoomKeyGenerator: Send + Sync + std::fmt::Debug {
	fn generate(&self) -> RoomKey;
}

/// Random UUID v4 keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRoomKeyGenerator;

impl RoomKeyGenerator for UuidRoomKeyGenerator {
	fn generate(&self) -> RoomKey {
		RoomKey::generate()
	}
}
