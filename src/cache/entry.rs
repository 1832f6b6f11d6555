//! Cache entry envelope and key pattern matching

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cached JSON value with its own TTL.
///
/// This is also the envelope stored in the persistent tier, so an entry read
/// back from Redis can be TTL-checked against the injected clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn new(value: serde_json::Value, created_at: DateTime<Utc>, ttl: Duration) -> Self {
        CacheEntry {
            value,
            created_at,
            ttl_secs: ttl.as_secs(),
        }
    }

    /// Logically absent once `now - created_at > ttl`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age_ms = (now - self.created_at).num_milliseconds();
        age_ms > (self.ttl_secs as i64).saturating_mul(1000)
    }

    /// Time left before expiry, zero if already expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let age_ms = (now - self.created_at).num_milliseconds().max(0) as u64;
        Duration::from_millis(self.ttl_secs.saturating_mul(1000).saturating_sub(age_ms))
    }
}

/// Redis-style glob match supporting `*`, `?` and `\` escapes
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '\\' if pi + 1 < p.len() => {
                    if p[pi + 1] == t[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c if c == t[ti] => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                _ => {}
            }
        }

        match star {
            Some((sp, st)) => {
                pi = sp + 1;
                ti = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Escape glob metacharacters so user-supplied text matches literally
pub fn escape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
