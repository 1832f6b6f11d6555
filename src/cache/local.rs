//! In-process persistent tier
//!
//! Stand-in for Redis when none is configured. Keys expire against the
//! injected clock; nothing survives a restart.

use super::entry::glob_match;
use crate::core::{Clock, KeyValueStore};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug)]
struct Slot {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Key-value store living in process memory
#[derive(Debug)]
pub struct LocalKeyValueStore {
    slots: Mutex<HashMap<String, Slot>>,
    clock: Arc<dyn Clock>,
}

impl LocalKeyValueStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        LocalKeyValueStore {
            slots: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn with_slots<T>(&self, f: impl FnOnce(&mut HashMap<String, Slot>, DateTime<Utc>) -> T) -> T {
        let now = self.clock.now();
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.retain(|_, slot| slot.expires_at > now);
        f(&mut slots, now)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.with_slots(|slots, _| slots.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for LocalKeyValueStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.with_slots(|slots, _| slots.get(key).map(|slot| slot.value.clone())))
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        self.with_slots(|slots, now| {
            slots.insert(
                key.to_string(),
                Slot {
                    value,
                    expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
                },
            );
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.with_slots(|slots, _| slots.remove(key).is_some()))
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        Ok(self.with_slots(|slots, _| {
            slots
                .keys()
                .filter(|key| glob_match(pattern, key))
                .cloned()
                .collect()
        }))
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize> {
        Ok(self.with_slots(|slots, _| {
            keys.iter().filter(|key| slots.remove(key.as_str()).is_some()).count()
        }))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
