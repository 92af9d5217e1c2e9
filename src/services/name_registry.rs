//! Display-name selection for merged entities.
//!
//! Several spellings can resolve to one canonical key (`シュウエイシャ` and
//! `しゅうえいしゃ`, `ＯＮＥ` and `one`). The registry picks which spelling is
//! shown, preferring the most specific script, and remembers which stored
//! node a key writes to when that node predates canonical ids.

use std::collections::HashMap;

/// Ranks a spelling: kanji 4, Latin letters 3, katakana 2, anything else 1.
#[must_use]
pub fn display_priority(name: &str) -> u8 {
    if name.chars().any(|c| ('\u{4E00}'..='\u{9FFF}').contains(&c)) {
        4
    } else if name.chars().any(|c| c.is_ascii_alphabetic()) {
        3
    } else if name.chars().any(|c| ('\u{30A0}'..='\u{30FF}').contains(&c)) {
        2
    } else {
        1
    }
}

#[derive(Debug)]
struct Slot {
    target: Option<String>,
    name: String,
}

/// Canonical key to chosen display name and write target, scoped to one
/// ingestion session.
#[derive(Debug, Default)]
pub struct NameRegistry {
    slots: HashMap<String, Slot>,
}

impl NameRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the key has been seen in this session.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Records the node already stored for a key.
    ///
    /// `target` is the stored node's id when it differs from the key.
    /// Has no effect if the key is already known.
    pub fn seed(&mut self, key: &str, target: Option<&str>, stored_name: &str) {
        self.slots.entry(key.to_string()).or_insert_with(|| Slot {
            target: target.filter(|t| *t != key).map(str::to_string),
            name: stored_name.to_string(),
        });
    }

    /// Offers a candidate spelling and returns the chosen display name.
    ///
    /// The candidate replaces the current choice only when it ranks strictly
    /// higher, so ties keep the first spelling seen.
    pub fn offer(&mut self, key: &str, candidate: &str) -> &str {
        let slot = self.slots.entry(key.to_string()).or_insert_with(|| Slot {
            target: None,
            name: candidate.to_string(),
        });
        if display_priority(candidate) > display_priority(&slot.name) {
            candidate.clone_into(&mut slot.name);
        }
        &slot.name
    }

    /// Returns the chosen display name for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.slots.get(key).map(|slot| slot.name.as_str())
    }

    /// Returns the stored node a key writes to, if not the key itself.
    #[must_use]
    pub fn target(&self, key: &str) -> Option<&str> {
        self.slots.get(key).and_then(|slot| slot.target.as_deref())
    }

    /// Number of keys seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no key has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
