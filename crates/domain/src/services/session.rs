//! Pseudonymous guest sessions used to scope likes and comments.

use hex::encode as hex_encode;
use sha3::{Digest, Sha3_256};

/// Returns the caller-supplied session id when present, otherwise a
/// SHA3-256 fingerprint of `"{ip}-{user_agent}"`.
pub fn derive_session_id(supplied: Option<&str>, ip: &str, user_agent: &str) -> String {
    if let Some(existing) = supplied.map(str::trim).filter(|value| !value.is_empty()) {
        return existing.to_string();
    }

    let mut hasher = Sha3_256::new();
    hasher.update(ip.as_bytes());
    hasher.update(b"-");
    hasher.update(user_agent.as_bytes());
    hex_encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = derive_session_id(None, "10.0.0.1", "Mozilla/5.0");
        let b = derive_session_id(None, "10.0.0.1", "Mozilla/5.0");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_depends_on_ip_and_agent() {
        let base = derive_session_id(None, "10.0.0.1", "Mozilla/5.0");
        assert_ne!(base, derive_session_id(None, "10.0.0.2", "Mozilla/5.0"));
        assert_ne!(base, derive_session_id(None, "10.0.0.1", "curl/8.0"));
    }

    #[test]
    fn supplied_session_wins_unless_blank() {
        assert_eq!(
            derive_session_id(Some(" guest-42 "), "10.0.0.1", "ua"),
            "guest-42"
        );
        assert_eq!(
            derive_session_id(Some("  "), "10.0.0.1", "ua"),
            derive_session_id(None, "10.0.0.1", "ua")
        );
    }
}
