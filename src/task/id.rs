//! Human-sortable task identifiers.

use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;

/// Generates an id of the form `YYYYMMDD-HHMMSS-xxxxxx`: a UTC timestamp
/// with second precision plus 3 random bytes in lowercase hex from the OS
/// CSPRNG. Ids sort chronologically across seconds and collide within one
/// second with probability ~1 in 16.7 million. Not a security identifier.
pub fn new_task_id() -> String {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let mut suffix = [0u8; 3];
    OsRng.fill_bytes(&mut suffix);
    format!(
        "{stamp}-{:02x}{:02x}{:02x}",
        suffix[0], suffix[1], suffix[2]
    )
}
