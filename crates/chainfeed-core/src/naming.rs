//! Human-readable names for identities.

use crate::address::Address;

const ADJECTIVES: [&str; 32] = [
    "autumn", "hidden", "bitter", "misty", "silent", "empty", "dry", "dark",
    "summer", "icy", "delicate", "quiet", "white", "cool", "spring", "winter",
    "patient", "twilight", "dawn", "crimson", "wispy", "weathered", "blue", "billowing",
    "broken", "cold", "damp", "falling", "frosty", "green", "long", "late",
];

const NOUNS: [&str; 32] = [
    "waterfall", "river", "breeze", "moon", "rain", "wind", "sea", "morning",
    "snow", "lake", "sunset", "pine", "shadow", "leaf", "dawn", "glitter",
    "forest", "hill", "cloud", "meadow", "sun", "glade", "bird", "brook",
    "butterfly", "bush", "dew", "dust", "field", "fire", "flower", "firefly",
];

/// Deterministic display name for `identity`, e.g. `misty-river-4821`.
pub fn display_name(identity: &Address) -> String {
    let hash = blake3::hash(identity.as_bytes());
    let bytes = hash.as_bytes();
    let adjective = ADJECTIVES[bytes[0] as usize % ADJECTIVES.len()];
    let noun = NOUNS[bytes[1] as usize % NOUNS.len()];
    let token = u16::from_le_bytes([bytes[2], bytes[3]]) % 10_000;
    format!("{adjective}-{noun}-{token:04}")
}
