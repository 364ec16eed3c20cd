//! UUID utilities

use uuid::{Uuid, Version};

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse UUID from string
pub fn parse(s: &str) -> Result<Uuid, uuid::Error> {
    Uuid::parse_str(s)
}

/// Parse a string only if it is a well-formed version-4 UUID
pub fn parse_v4(s: &str) -> Option<Uuid> {
    parse(s.trim())
        .ok()
        .filter(|id| id.get_version() == Some(Version::Random))
}
