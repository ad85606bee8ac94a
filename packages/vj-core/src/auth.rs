//! Auth store (C2).
//!
//! Loads DJ/operator credential records from a JSON file shaped
//! `{"djs": {...}, "vj_operators": {...}}` (grounded in
//! `vj_server/auth.py`). `key_hash` must begin with a recognized
//! hash-algorithm prefix — any entry without one is a plaintext secret and
//! is *fatal* when `require_auth` is set.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{VjError, VjResult};

/// A single credential record (DJ or operator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRecord {
    pub display_name: String,
    pub key_hash: String,
    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AuthFile {
    #[serde(default)]
    djs: HashMap<String, AuthRecord>,
    #[serde(default)]
    vj_operators: HashMap<String, AuthRecord>,
}

/// In-memory auth store.
#[derive(Debug, Default)]
pub struct AuthStore {
    djs: HashMap<String, AuthRecord>,
    vj_operators: HashMap<String, AuthRecord>,
}

impl AuthStore {
    /// Loads the auth store from `path`. If `require_auth` is set and any
    /// record's `key_hash` has no recognized prefix, returns an error
    /// (the caller should treat this as fatal at startup).
    pub fn load(path: &Path, require_auth: bool) -> VjResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VjError::AuthConfig(format!("{}: {}", path.display(), e)))?;
        let file: AuthFile = serde_json::from_str(&content)
            .map_err(|e| VjError::AuthConfig(format!("{}: {}", path.display(), e)))?;

        let store = Self {
            djs: file.djs,
            vj_operators: file.vj_operators,
        };
        if let Some(bad) = store.first_plaintext_entry() {
            if require_auth {
                return Err(VjError::PlaintextSecret(bad));
            }
            log::warn!(
                "[Auth] Plaintext secret detected for '{}' — server started with require_auth=false",
                bad
            );
        }
        Ok(store)
    }

    /// Returns an empty store (used when no auth file is configured).
    pub fn empty() -> Self {
        Self::default()
    }

    fn first_plaintext_entry(&self) -> Option<String> {
        self.djs
            .iter()
            .chain(self.vj_operators.iter())
            .find(|(_, rec)| !has_recognized_prefix(&rec.key_hash))
            .map(|(id, _)| id.clone())
    }

    /// Returns `true` if any stored credential lacks a recognized hash prefix.
    pub fn has_plaintext_passwords(&self) -> bool {
        self.first_plaintext_entry().is_some()
    }

    /// Verifies a DJ's id/key pair, returning the matching record on success.
    pub fn verify_dj(&self, dj_id: &str, key: &str) -> Option<&AuthRecord> {
        let record = self.djs.get(dj_id)?;
        verify_password(key, &record.key_hash).then_some(record)
    }

    /// Verifies an operator's id/key pair, returning the matching record on success.
    pub fn verify_vj(&self, operator_id: &str, key: &str) -> Option<&AuthRecord> {
        let record = self.vj_operators.get(operator_id)?;
        verify_password(key, &record.key_hash).then_some(record)
    }
}

/// Returns `true` iff `hash` begins with a hash-algorithm prefix this
/// store recognizes (`bcrypt:` or `sha256:`).
fn has_recognized_prefix(hash: &str) -> bool {
    hash.starts_with("bcrypt:") || hash.starts_with("sha256:")
}

/// Verifies `password` against a prefixed hash string.
///
/// Supports `bcrypt:<hash>`, salted `sha256:<salt>:<hash>`, and legacy
/// unsalted `sha256:<hash>` (2-part, logged as a warning). Any other
/// (unrecognized-prefix / plaintext) value is rejected.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if let Some(hash) = stored.strip_prefix("bcrypt:") {
        return bcrypt::verify(password, hash).unwrap_or(false);
    }
    if let Some(rest) = stored.strip_prefix("sha256:") {
        let parts: Vec<&str> = rest.splitn(2, ':').collect();
        return match parts.as_slice() {
            [salt, hash] => {
                let mut hasher = Sha256::new();
                hasher.update(salt.as_bytes());
                hasher.update(password.as_bytes());
                let digest = hex_encode(&hasher.finalize());
                constant_time_eq(&digest, hash)
            }
            [hash] => {
                log::warn!("[Auth] Verifying against legacy unsalted sha256 hash");
                let mut hasher = Sha256::new();
                hasher.update(password.as_bytes());
                let digest = hex_encode(&hasher.finalize());
                constant_time_eq(&digest, hash)
            }
            _ => false,
        };
    }
    false
}

/// Hashes `password` using bcrypt, producing a `bcrypt:<hash>` record value.
pub fn hash_password(password: &str) -> VjResult<String> {
    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| VjError::Internal(format!("bcrypt: {e}")))?;
    Ok(format!("bcrypt:{hash}"))
}

/// Generates a URL-safe random API key, analogous to `secrets.token_urlsafe(32)`.
pub fn generate_api_key() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::thread_rng().gen();
    base64_url_encode(&bytes)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn base64_url_encode(bytes: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
    let mut out = String::with_capacity((bytes.len() * 4).div_ceil(3));
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = *chunk.get(1).unwrap_or(&0);
        let b2 = *chunk.get(2).unwrap_or(&0);
        let n = ((b0 as u32) << 16) | ((b1 as u32) << 8) | (b2 as u32);
        out.push(ALPHABET[(n >> 18 & 0x3f) as usize] as char);
        out.push(ALPHABET[(n >> 12 & 0x3f) as usize] as char);
        if chunk.len() > 1 {
            out.push(ALPHABET[(n >> 6 & 0x3f) as usize] as char);
        }
        if chunk.len() > 2 {
            out.push(ALPHABET[(n & 0x3f) as usize] as char);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bcrypt_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("bcrypt:"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn salted_sha256_round_trip() {
        let mut hasher = Sha256::new();
        hasher.update(b"somesalt");
        hasher.update(b"hunter2");
        let digest = hex_encode(&hasher.finalize());
        let stored = format!("sha256:somesalt:{digest}");
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
    }

    #[test]
    fn legacy_unsalted_sha256_round_trip() {
        let mut hasher = Sha256::new();
        hasher.update(b"hunter2");
        let digest = hex_encode(&hasher.finalize());
        let stored = format!("sha256:{digest}");
        assert!(verify_password("hunter2", &stored));
    }

    #[test]
    fn plaintext_is_rejected() {
        assert!(!verify_password("hunter2", "hunter2"));
    }

    #[test]
    fn unrecognized_prefix_is_not_recognized() {
        assert!(!has_recognized_prefix("plaintext-secret"));
        assert!(has_recognized_prefix("bcrypt:abc"));
        assert!(has_recognized_prefix("sha256:abc:def"));
    }

    #[test]
    fn api_key_is_32_bytes_worth_of_base64url() {
        let key = generate_api_key();
        assert!(key.len() >= 40);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
