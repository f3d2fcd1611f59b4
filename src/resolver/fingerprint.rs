//! Stable cache keys

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// SHA-256 of a resolver name and its arguments, URL-safe base64 encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new<I, S>(resolver: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hasher = Sha256::new();
        hasher.update(resolver.as_bytes());
        for arg in args {
            // NUL separator keeps ("ab", "c") apart from ("a", "bc")
            hasher.update([0u8]);
            hasher.update(arg.as_ref().as_bytes());
        }
        Self(URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_and_distinct() {
        let a = Fingerprint::new("component", ["root", "card"]);
        assert_eq!(a, Fingerprint::new("component", ["root", "card"]));
        assert_ne!(a, Fingerprint::new("layout", ["root", "card"]));
        assert_ne!(
            Fingerprint::new("data", ["ab", "c"]),
            Fingerprint::new("data", ["a", "bc"])
        );
    }

    #[test]
    fn test_url_safe_encoding() {
        let key = Fingerprint::new("component", ["x"]);
        // 32 bytes -> 43 base64 chars without padding
        assert_eq!(key.as_str().len(), 43);
        assert!(key
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
