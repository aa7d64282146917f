//! Online presence counting.
//!
//! The tally is maintained incrementally on every join, leave and location
//! change, so reading a snapshot never rescans the registry.

use std::collections::BTreeMap;

/// Aggregate online counts pushed to clients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub online: usize,
    pub by_country: BTreeMap<String, usize>,
}

/// Incrementally maintained presence counters.
#[derive(Debug, Clone, Default)]
pub struct PresenceTally {
    online: usize,
    by_country: BTreeMap<String, usize>,
}

impl PresenceTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, country: Option<&str>) {
        self.online += 1;
        self.add_country(country);
    }

    pub fn leave(&mut self, country: Option<&str>) {
        self.online = self.online.saturating_sub(1);
        self.remove_country(country);
    }

    /// A connected client reported a new location.
    ///
    /// Returns `true` if the client moved to another country bucket.
    pub fn relocate(&mut self, from: Option<&str>, to: Option<&str>) -> bool {
        if from == to {
            return false;
        }
        self.remove_country(from);
        self.add_country(to);
        true
    }

    pub fn online(&self) -> usize {
        self.online
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        PresenceSnapshot {
            online: self.online,
            by_country: self.by_country.clone(),
        }
    }

    fn add_country(&mut self, country: Option<&str>) {
        if let Some(country) = country {
            *self.by_country.entry(country.to_string()).or_insert(0) += 1;
        }
    }

    fn remove_country(&mut self, country: Option<&str>) {
        let Some(country) = country else {
            return;
        };
        if let Some(count) = self.by_country.get_mut(country) {
            *count -= 1;
            if *count == 0 {
                self.by_country.remove(country);
            }
        }
    }
}
