//! Deduplication key and telemetry event-id derivation.
//!
//! A key is a short SHA-256 digest over `(label, class, sequence)` where
//! the sequence comes from the durable property store, so two events of
//! the same class occurring back to back never collide. The telemetry
//! event id is an independent deterministic digest of the class string.

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::constants::{EVENT_ID_LEN, KEY_LEN};
use crate::properties::PropertyStore;

/// Derive a fresh deduplication key for one event instance.
pub fn new_key(props: &mut PropertyStore, label: &str, class: &str) -> Result<String> {
    let seq = props.next_event_seq()?;
    let digest = Sha256::digest(format!("{}/{}/{}", label, class, seq).as_bytes());
    Ok(hex_prefix(&digest, KEY_LEN))
}

/// Deterministic fixed-length digest of a class string, used as the
/// telemetry event identifier.
pub fn digest(class: &str) -> String {
    let digest = Sha256::digest(class.as_bytes());
    hex_prefix(&digest, EVENT_ID_LEN)
}

fn hex_prefix(bytes: &[u8], len: usize) -> String {
    let mut out = String::with_capacity(len);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
        if out.len() >= len {
            break;
        }
    }
    out.truncate(len);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn keys_are_unique_for_identical_inputs() {
        let dir = TempDir::new().unwrap();
        let mut props = PropertyStore::open(&dir.path().join("state.json")).unwrap();

        let k1 = new_key(&mut props, "CRASH", "HVCRASH").unwrap();
        let k2 = new_key(&mut props, "CRASH", "HVCRASH").unwrap();
        assert_eq!(k1.len(), KEY_LEN);
        assert_eq!(k2.len(), KEY_LEN);
        assert_ne!(k1, k2);
    }

    #[test]
    fn digest_is_deterministic_and_fixed_length() {
        let a = digest("vm0/CRASH/JAVACRASH");
        let b = digest("vm0/CRASH/JAVACRASH");
        assert_eq!(a, b);
        assert_eq!(a.len(), EVENT_ID_LEN);
        assert_ne!(a, digest("vm0/CRASH/OTHER"));
    }
}
