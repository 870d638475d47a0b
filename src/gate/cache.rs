//! Short-lived memory of resolved endpoints, bounded by DNS TTLs.

use crate::record::ResolvedEndpoint;
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc, time::Instant};

/// Resolved endpoints keyed by the host they were resolved for.
///
/// Reads never lock; writers replace the whole map, so concurrent
/// resolutions never wait on each other.
#[derive(Debug, Default)]
pub(crate) struct Cache {
    entries: ArcSwap<HashMap<String, Entry>>,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    endpoint: ResolvedEndpoint,
    valid_until: Instant,
}

impl Entry {
    fn valid(&self, now: Instant) -> bool {
        now < self.valid_until
    }
}

impl Cache {
    /// Gets the endpoint cached for `host` if it has not expired.
    pub fn get(&self, host: &str) -> Option<ResolvedEndpoint> {
        let now = Instant::now();
        self.entries
            .load()
            .get(host)
            .filter(|entry| entry.valid(now))
            .map(|entry| entry.endpoint)
    }

    /// Caches `endpoint` for `host` until `valid_until`, dropping any other
    /// entries that have expired.
    pub fn insert(&self, host: &str, endpoint: ResolvedEndpoint, valid_until: Instant) {
        let now = Instant::now();
        if valid_until <= now {
            return;
        }
        let entry = Entry {
            endpoint,
            valid_until,
        };
        self.entries.rcu(|entries| {
            let mut entries: HashMap<_, _> = entries
                .iter()
                .filter(|(_, entry)| entry.valid(now))
                .map(|(host, entry)| (host.clone(), *entry))
                .collect();
            entries.insert(host.to_owned(), entry);
            Arc::new(entries)
        });
    }

    /// Number of entries, expired ones included.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    /// Whether the cache holds no entries.
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
