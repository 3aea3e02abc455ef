use std::collections::HashMap;

use crate::log::{Cursor, StreamKey};

/// Subscription change requested by the control path. Applied only by the
/// task that owns the [`SubscriptionSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionIntent {
    Subscribe { key: StreamKey, cursor: Cursor },
}

/// The `StreamKey -> Cursor` pairs one session currently polls.
///
/// Not shared: the multiplexer task owns it and is its sole mutator, so no
/// lock guards it.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subs: HashMap<StreamKey, Cursor>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the subscription for `key`. A missing cursor
    /// starts from the beginning of the log.
    pub fn add(&mut self, key: StreamKey, cursor: Option<Cursor>) {
        self.subs.insert(key, cursor.unwrap_or_default());
    }

    pub fn remove(&mut self, key: &StreamKey) -> Option<Cursor> {
        self.subs.remove(key)
    }

    pub fn apply(&mut self, intent: SubscriptionIntent) {
        match intent {
            SubscriptionIntent::Subscribe { key, cursor } => self.add(key, Some(cursor)),
        }
    }

    /// Moves the cursor of a live subscription forward. Positions never move
    /// backwards here; only an explicit `add` can rewind.
    pub fn advance(&mut self, key: &StreamKey, next: Cursor) {
        let Some(current) = self.subs.get_mut(key) else {
            return;
        };
        let forward = match (current.position(), next.position()) {
            (Some(from), Some(to)) => to >= from,
            _ => true,
        };
        if forward {
            *current = next;
        }
    }

    pub fn cursor(&self, key: &StreamKey) -> Option<Cursor> {
        self.subs.get(key).copied()
    }

    pub fn contains(&self, key: &StreamKey) -> bool {
        self.subs.contains_key(key)
    }

    /// Owned copy to iterate while the set keeps changing. Sorted by key so
    /// poll order is stable.
    pub fn snapshot(&self) -> Vec<(StreamKey, Cursor)> {
        let mut pairs: Vec<_> = self.subs.iter().map(|(k, c)| (k.clone(), *c)).collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }
}
