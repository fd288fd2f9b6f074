// src/services/security.rs
//
// Process-wide security registries. Both structs are owned by AppState and
// injected into handlers; the Mutexes are never held across an await point.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::{LOCKOUT_DURATION_SECS, MAX_LOGIN_ATTEMPTS};

/// Tracks consecutive failed login attempts per email.
///
/// Reaching the threshold blocks further attempts for that email until the
/// lockout window elapses, at which point the counter resets.
pub struct LoginGuard {
    max_attempts: u32,
    lockout: Duration,
    attempts: Mutex<HashMap<String, (u32, Instant)>>,
}

impl Default for LoginGuard {
    fn default() -> Self {
        Self::new(MAX_LOGIN_ATTEMPTS, Duration::from_secs(LOCKOUT_DURATION_SECS))
    }
}

impl LoginGuard {
    pub fn new(max_attempts: u32, lockout: Duration) -> Self {
        Self {
            max_attempts,
            lockout,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Whether login attempts for this email are currently refused.
    /// An expired window resets the counter as a side effect.
    pub fn is_locked(&self, email: &str) -> bool {
        let mut attempts = self.attempts.lock().unwrap();

        match attempts.get(email) {
            Some((count, last_failure)) if *count >= self.max_attempts => {
                if last_failure.elapsed() < self.lockout {
                    true
                } else {
                    attempts.remove(email);
                    false
                }
            }
            _ => false,
        }
    }

    pub fn record_failure(&self, email: &str) {
        let mut attempts = self.attempts.lock().unwrap();
        let entry = attempts.entry(email.to_owned()).or_insert((0, Instant::now()));
        entry.0 += 1;
        entry.1 = Instant::now();
    }

    /// A successful login clears the counter.
    pub fn clear(&self, email: &str) {
        self.attempts.lock().unwrap().remove(email);
    }
}

/// Access tokens invalidated by logout. Entries live until process restart,
/// which outlasts every token's expiry.
#[derive(Default)]
pub struct TokenBlocklist {
    tokens: Mutex<HashSet<String>>,
}

impl TokenBlocklist {
    pub fn block(&self, token: &str) {
        self.tokens.lock().unwrap().insert(token.to_owned());
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.lock().unwrap().contains(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_after_max_failures() {
        let guard = LoginGuard::new(5, Duration::from_secs(60));

        for _ in 0..4 {
            guard.record_failure("a@b.com");
        }
        assert!(!guard.is_locked("a@b.com"));

        guard.record_failure("a@b.com");
        assert!(guard.is_locked("a@b.com"));

        // Other emails are unaffected.
        assert!(!guard.is_locked("c@d.com"));
    }

    #[test]
    fn lockout_expires_and_resets_counter() {
        let guard = LoginGuard::new(5, Duration::ZERO);

        for _ in 0..5 {
            guard.record_failure("a@b.com");
        }
        // Zero-length window: expired immediately, counter reset.
        assert!(!guard.is_locked("a@b.com"));

        // A single new failure starts from zero again.
        guard.record_failure("a@b.com");
        assert!(!guard.is_locked("a@b.com"));
    }

    #[test]
    fn success_clears_counter() {
        let guard = LoginGuard::new(5, Duration::from_secs(60));

        for _ in 0..5 {
            guard.record_failure("a@b.com");
        }
        assert!(guard.is_locked("a@b.com"));

        guard.clear("a@b.com");
        assert!(!guard.is_locked("a@b.com"));
    }

    #[test]
    fn blocklist_remembers_tokens() {
        let blocklist = TokenBlocklist::default();
        assert!(!blocklist.contains("abc"));
        blocklist.block("abc");
        assert!(blocklist.contains("abc"));
    }
}
