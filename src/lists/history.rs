use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;

use super::Snapshot;
use crate::models::{DiscoveryMethod, HistoryEntry, Title};

/// Result of a single `record_visit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedVisit {
    pub entry: HistoryEntry,
    pub evicted: Option<HistoryEntry>,
}

/// Stored entries that `HistoryList::hydrate` left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationDrops {
    /// Rows superseded by a newer row for the same title, or whose sequence
    /// clashed with a row already loaded.
    pub duplicates: Vec<HistoryEntry>,
    /// The oldest entries, trimmed to fit the capacity.
    pub trimmed: Vec<HistoryEntry>,
}

/// Bounded, deduplicated visit log ordered by recency.
///
/// `by_sequence` holds the recency order (largest sequence is the most recent
/// visit); `by_title` maps each title to its current sequence. Both always
/// describe the same set of entries.
#[derive(Debug, Clone)]
pub struct HistoryList {
    capacity: NonZeroUsize,
    by_sequence: BTreeMap<u64, HistoryEntry>,
    by_title: HashMap<Title, u64>,
    next_sequence: u64,
}

impl HistoryList {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            by_sequence: BTreeMap::new(),
            by_title: HashMap::new(),
            next_sequence: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn len(&self) -> usize {
        self.by_sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_sequence.is_empty()
    }

    pub fn contains(&self, title: &Title) -> bool {
        self.by_title.contains_key(title)
    }

    pub fn get(&self, title: &Title) -> Option<&HistoryEntry> {
        self.by_title
            .get(title)
            .and_then(|sequence| self.by_sequence.get(sequence))
    }

    /// Inserts `title` as the most recent visit, replacing any earlier entry
    /// for the same title, and evicts the oldest entry if the list overflows.
    pub fn record_visit(
        &mut self,
        title: Title,
        discovery_method: DiscoveryMethod,
        now: DateTime<Utc>,
    ) -> RecordedVisit {
        if let Some(previous) = self.by_title.remove(&title) {
            self.by_sequence.remove(&previous);
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let entry = HistoryEntry {
            title: title.clone(),
            discovery_method,
            visited_at: now,
            sequence,
        };
        self.by_title.insert(title, sequence);
        self.by_sequence.insert(sequence, entry.clone());

        let evicted = if self.len() > self.capacity() {
            self.evict_oldest()
        } else {
            None
        };

        RecordedVisit { entry, evicted }
    }

    /// Most recent first.
    pub fn entries(&self) -> Snapshot<HistoryEntry> {
        Snapshot::new(self.by_sequence.values().rev().cloned().collect())
    }

    pub fn remove(&mut self, title: &Title) -> bool {
        match self.by_title.remove(title) {
            Some(sequence) => {
                self.by_sequence.remove(&sequence);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.by_sequence.clear();
        self.by_title.clear();
    }

    /// Replaces the contents with stored entries.
    ///
    /// Duplicate titles keep the entry with the highest sequence. Entries
    /// beyond capacity (the oldest ones) are trimmed. Both kinds of dropped
    /// rows are returned separately: a duplicate may share its title with an
    /// entry that was kept, a trimmed entry never does.
    pub fn hydrate(&mut self, entries: Vec<HistoryEntry>) -> HydrationDrops {
        self.clear();

        let mut drops = HydrationDrops::default();
        for entry in entries {
            // sequences are unique across titles; a clash means a corrupt row
            if self.by_sequence.contains_key(&entry.sequence) {
                drops.duplicates.push(entry);
                continue;
            }
            if let Some(existing) = self.by_title.get(&entry.title).copied() {
                if existing >= entry.sequence {
                    drops.duplicates.push(entry);
                    continue;
                }
                if let Some(older) = self.by_sequence.remove(&existing) {
                    drops.duplicates.push(older);
                }
            }
            self.by_title.insert(entry.title.clone(), entry.sequence);
            self.by_sequence.insert(entry.sequence, entry);
        }

        while self.len() > self.capacity() {
            if let Some(evicted) = self.evict_oldest() {
                drops.trimmed.push(evicted);
            }
        }

        self.next_sequence = self
            .by_sequence
            .keys()
            .next_back()
            .map_or(1, |last| last + 1)
            .max(self.next_sequence);

        drops
    }

    fn evict_oldest(&mut self) -> Option<HistoryEntry> {
        let (_, oldest) = self.by_sequence.pop_first()?;
        self.by_title.remove(&oldest.title);
        Some(oldest)
    }
}
