//! Connect-code registry (C3).
//!
//! Issues single-use, TTL-bounded, human-memorable codes shaped
//! `WORD-XXXX` and validates/retires them atomically under one lock, so
//! two concurrent `code_auth` attempts cannot both succeed on the same
//! code (spec invariant 2).

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;

use crate::protocol_constants::CONNECT_CODE_DEFAULT_TTL_MINUTES;
use crate::utils::now_secs;

/// Word list drawn from a confusable-free vocabulary (no look-alike words).
const WORDS: &[&str] = &[
    "BEAT", "NOVA", "ECHO", "DRIP", "GLOW", "WAVE", "RIFF", "BASS", "TONE", "FLUX",
];

/// Suffix alphabet excluding O/0/I/1/L to avoid visual confusables.
const SUFFIX_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// A single-use, TTL-bounded connect code.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectCode {
    pub code: String,
    pub created_at: f64,
    pub expires_at: f64,
    pub used: bool,
}

impl ConnectCode {
    /// A code is valid iff it has not been used and has not expired.
    pub fn is_valid(&self) -> bool {
        !self.used && now_secs() < self.expires_at
    }

    fn generate(ttl_minutes: i64) -> Self {
        let mut rng = rand::thread_rng();
        let word = WORDS[rng.gen_range(0..WORDS.len())];
        let suffix: String = (0..4)
            .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();
        let created_at = now_secs();
        Self {
            code: format!("{word}-{suffix}"),
            created_at,
            expires_at: created_at + (ttl_minutes.max(1) as f64) * 60.0,
            used: false,
        }
    }
}

/// Thread-safe registry of outstanding connect codes.
#[derive(Default)]
pub struct ConnectCodeRegistry {
    codes: Mutex<HashMap<String, ConnectCode>>,
}

impl ConnectCodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a new code with the given TTL (minutes) and registers it.
    pub fn generate(&self, ttl_minutes: Option<i64>) -> ConnectCode {
        let mut codes = self.codes.lock();
        self.gc_locked(&mut codes);
        loop {
            let code = ConnectCode::generate(ttl_minutes.unwrap_or(CONNECT_CODE_DEFAULT_TTL_MINUTES));
            if !codes.contains_key(&code.code) {
                codes.insert(code.code.clone(), code.clone());
                return code;
            }
        }
    }

    /// Atomically validates and consumes a code: fails if absent, expired,
    /// or already used; otherwise marks it used and returns `true`.
    pub fn validate_and_consume(&self, code: &str) -> bool {
        let mut codes = self.codes.lock();
        match codes.get_mut(code) {
            Some(entry) if entry.is_valid() => {
                entry.used = true;
                true
            }
            _ => false,
        }
    }

    /// Removes entries whose `is_valid()` is false.
    pub fn gc(&self) {
        let mut codes = self.codes.lock();
        self.gc_locked(&mut codes);
    }

    fn gc_locked(&self, codes: &mut HashMap<String, ConnectCode>) {
        codes.retain(|_, c| c.is_valid());
    }

    /// Removes a single code regardless of validity (operator `revoke_connect_code`).
    pub fn revoke(&self, code: &str) -> bool {
        self.codes.lock().remove(code).is_some()
    }

    /// Returns a snapshot of all currently valid codes.
    pub fn list_valid(&self) -> Vec<ConnectCode> {
        let mut codes = self.codes.lock();
        self.gc_locked(&mut codes);
        codes.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_code_has_word_suffix_shape() {
        let registry = ConnectCodeRegistry::new();
        let code = registry.generate(Some(30));
        let parts: Vec<&str> = code.code.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert!(WORDS.contains(&parts[0]));
        assert_eq!(parts[1].len(), 4);
        assert!(!parts[1].contains(['O', '0', 'I', '1', 'L']));
    }

    #[test]
    fn single_use_race_s1() {
        let registry = ConnectCodeRegistry::new();
        let issued = registry.generate(Some(30));

        let first = registry.validate_and_consume(&issued.code);
        let second = registry.validate_and_consume(&issued.code);

        assert!(first);
        assert!(!second);
    }

    #[test]
    fn concurrent_validate_and_consume_succeeds_exactly_once() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(ConnectCodeRegistry::new());
        let issued = registry.generate(Some(30));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let code = issued.code.clone();
                thread::spawn(move || registry.validate_and_consume(&code))
            })
            .collect();

        let successes: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[test]
    fn unknown_code_is_rejected() {
        let registry = ConnectCodeRegistry::new();
        assert!(!registry.validate_and_consume("NOVA-9999"));
    }

    #[test]
    fn revoke_removes_code() {
        let registry = ConnectCodeRegistry::new();
        let issued = registry.generate(Some(30));
        assert!(registry.revoke(&issued.code));
        assert!(!registry.validate_and_consume(&issued.code));
    }
}
