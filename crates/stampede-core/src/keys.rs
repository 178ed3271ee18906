//! Idempotency-key pool.
//!
//! Keys are generated once at setup and shared read-only for the run's
//! duration; the per-key first-use claim is the only mutation and is atomic,
//! so exactly one call per key carries `expect_repeat = false` no matter how
//! many workers race on it.

use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use crate::scenario::KeyPolicy;

/// One selected key plus the scripted repeat expectation
#[derive(Clone, Debug)]
pub struct KeySelection {
    pub key: Option<String>,

    /// True when the run has already issued a call for this key (or, for the
    /// keyless baseline, this payload identity)
    pub expect_repeat: bool,
}

struct PoolKey {
    value: String,
    used: AtomicBool,
}

/// Fixed key set shared across workers
pub struct KeyPool {
    policy: KeyPolicy,
    keys: Vec<PoolKey>,

    // first-use claim for the keyless baseline, where identity is the payload
    bare_used: AtomicBool,
}

impl KeyPool {
    pub fn generate(policy: KeyPolicy) -> Self {
        let count = match policy {
            KeyPolicy::Bare | KeyPolicy::PerCall => 0,
            KeyPolicy::Single => 1,
            KeyPolicy::Pooled { count } => count,
        };
        let keys = (0..count)
            .map(|_| PoolKey {
                value: Uuid::new_v4().to_string(),
                used: AtomicBool::new(false),
            })
            .collect();
        Self {
            policy,
            keys,
            bare_used: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Pick a key for a new iteration
    pub fn pick(&self) -> KeySelection {
        match self.policy {
            KeyPolicy::Bare => KeySelection {
                key: None,
                expect_repeat: self.bare_used.swap(true, Ordering::AcqRel),
            },
            KeyPolicy::PerCall => KeySelection {
                key: Some(Uuid::new_v4().to_string()),
                expect_repeat: false,
            },
            KeyPolicy::Single => self.claim(0),
            KeyPolicy::Pooled { .. } => self.claim(rand::random::<usize>() % self.keys.len()),
        }
    }

    fn claim(&self, index: usize) -> KeySelection {
        let entry = &self.keys[index];
        KeySelection {
            key: Some(entry.value.clone()),
            expect_repeat: entry.used.swap(true, Ordering::AcqRel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_sizes_follow_policy() {
        assert!(KeyPool::generate(KeyPolicy::Bare).is_empty());
        assert!(KeyPool::generate(KeyPolicy::PerCall).is_empty());
        assert_eq!(KeyPool::generate(KeyPolicy::Single).len(), 1);
        assert_eq!(KeyPool::generate(KeyPolicy::Pooled { count: 10 }).len(), 10);
    }

    #[test]
    fn test_single_key_claims_first_use_once() {
        let pool = KeyPool::generate(KeyPolicy::Single);

        let first = pool.pick();
        assert!(!first.expect_repeat);

        let second = pool.pick();
        assert!(second.expect_repeat);
        assert_eq!(first.key, second.key);
    }

    #[test]
    fn test_pooled_keys_each_claim_once() {
        let pool = KeyPool::generate(KeyPolicy::Pooled { count: 5 });

        let mut first_uses = 0;
        for _ in 0..500 {
            if !pool.pick().expect_repeat {
                first_uses += 1;
            }
        }
        // random picks over 500 draws touch every key; each key yields
        // exactly one non-repeat selection
        assert_eq!(first_uses, 5);
    }

    #[test]
    fn test_per_call_keys_are_always_fresh() {
        let pool = KeyPool::generate(KeyPolicy::PerCall);

        let a = pool.pick();
        let b = pool.pick();
        assert!(!a.expect_repeat);
        assert!(!b.expect_repeat);
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn test_bare_policy_claims_payload_identity_once() {
        let pool = KeyPool::generate(KeyPolicy::Bare);

        let first = pool.pick();
        assert!(first.key.is_none());
        assert!(!first.expect_repeat);

        let second = pool.pick();
        assert!(second.expect_repeat);
    }
}
