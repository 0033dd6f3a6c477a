use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

use super::Snapshot;
use crate::error::TrackingError;
use crate::models::{SaveStatus, SavedPageEntry, Title};

/// Titles the user chose to keep offline, in the order they were saved.
#[derive(Debug, Clone, Default)]
pub struct SavedPageList {
    by_position: BTreeMap<u64, SavedPageEntry>,
    by_title: HashMap<Title, u64>,
    next_position: u64,
}

impl SavedPageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_position.is_empty()
    }

    pub fn contains(&self, title: &Title) -> bool {
        self.by_title.contains_key(title)
    }

    pub fn get(&self, title: &Title) -> Option<&SavedPageEntry> {
        self.by_title
            .get(title)
            .and_then(|position| self.by_position.get(position))
    }

    /// Adds `title` in `Queued` state. Returns the new entry, or `None` when
    /// the title was already saved, in which case nothing changes.
    pub fn save(&mut self, title: Title, now: DateTime<Utc>) -> Option<SavedPageEntry> {
        if self.contains(&title) {
            return None;
        }
        let entry = SavedPageEntry {
            title,
            status: SaveStatus::Queued,
            saved_at: now,
        };
        self.push(entry.clone());
        Some(entry)
    }

    /// Moves a saved page to `status`. Setting the current status again is a
    /// no-op that still returns the entry.
    pub fn update_status(
        &mut self,
        title: &Title,
        status: SaveStatus,
    ) -> Result<SavedPageEntry, TrackingError> {
        let entry = self
            .by_title
            .get(title)
            .and_then(|position| self.by_position.get_mut(position))
            .ok_or_else(|| TrackingError::NotFound(title.clone()))?;

        if entry.status != status {
            if !entry.status.can_transition_to(status) {
                return Err(TrackingError::InvalidTransition {
                    title: title.clone(),
                    from: entry.status,
                    to: status,
                });
            }
            entry.status = status;
        }
        Ok(entry.clone())
    }

    pub fn unsave(&mut self, title: &Title) -> bool {
        match self.by_title.remove(title) {
            Some(position) => {
                self.by_position.remove(&position);
                true
            }
            None => false,
        }
    }

    /// Insertion order.
    pub fn entries(&self) -> Snapshot<SavedPageEntry> {
        Snapshot::new(self.by_position.values().cloned().collect())
    }

    /// Replaces the contents with stored entries, keeping their order. A title
    /// stored twice keeps its first occurrence; later duplicates are returned.
    pub fn hydrate(&mut self, entries: Vec<SavedPageEntry>) -> Vec<SavedPageEntry> {
        self.by_position.clear();
        self.by_title.clear();

        let mut duplicates = Vec::new();
        for entry in entries {
            if self.contains(&entry.title) {
                duplicates.push(entry);
            } else {
                self.push(entry);
            }
        }
        duplicates
    }

    fn push(&mut self, entry: SavedPageEntry) {
        let position = self.next_position;
        self.next_position += 1;
        self.by_title.insert(entry.title.clone(), position);
        self.by_position.insert(position, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn title(name: &str) -> Title {
        Title::new("en.wikipedia.org", name).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn save_is_a_noop_when_present() {
        let mut saved = SavedPageList::new();
        assert!(saved.save(title("Moon"), now()).is_some());
        saved.update_status(&title("Moon"), SaveStatus::Downloading).unwrap();

        let later = now() + chrono::Duration::hours(1);
        assert!(saved.save(title("moon"), later).is_none());

        let entry = saved.get(&title("Moon")).unwrap();
        assert_eq!(entry.status, SaveStatus::Downloading);
        assert_eq!(entry.saved_at, now());
        assert_eq!(saved.len(), 1);
    }

    #[test]
    fn update_status_on_absent_title_is_not_found() {
        let mut saved = SavedPageList::new();
        let err = saved
            .update_status(&title("Mars"), SaveStatus::Saved)
            .unwrap_err();
        assert!(matches!(err, TrackingError::NotFound(t) if t == title("Mars")));
    }

    #[test]
    fn update_status_rejects_skipping_download() {
        let mut saved = SavedPageList::new();
        saved.save(title("Mars"), now());
        let err = saved
            .update_status(&title("Mars"), SaveStatus::Saved)
            .unwrap_err();
        assert!(matches!(err, TrackingError::InvalidTransition { .. }));
        assert_eq!(saved.get(&title("Mars")).unwrap().status, SaveStatus::Queued);

        saved.update_status(&title("Mars"), SaveStatus::Downloading).unwrap();
        let entry = saved.update_status(&title("Mars"), SaveStatus::Saved).unwrap();
        assert_eq!(entry.status, SaveStatus::Saved);
    }

    #[test]
    fn unsave_absent_title_changes_nothing() {
        let mut saved = SavedPageList::new();
        saved.save(title("Venus"), now());
        let before = saved.entries();

        assert!(!saved.unsave(&title("Pluto")));
        assert_eq!(saved.entries().as_slice(), before.as_slice());
        assert!(saved.unsave(&title("Venus")));
        assert!(saved.is_empty());
    }

    #[test]
    fn entries_keep_insertion_order_across_resave() {
        let mut saved = SavedPageList::new();
        for name in ["A", "B", "C"] {
            saved.save(title(name), now());
        }
        saved.unsave(&title("A"));
        saved.save(title("A"), now());
        saved.update_status(&title("B"), SaveStatus::Downloading).unwrap();

        let order: Vec<String> = saved
            .entries()
            .iter()
            .map(|e| e.title.text().to_string())
            .collect();
        assert_eq!(order, vec!["B", "C", "A"]);
    }

    #[test]
    fn hydrate_keeps_stored_order_and_first_duplicate() {
        let entry = |name: &str, status| SavedPageEntry {
            title: title(name),
            status,
            saved_at: now(),
        };
        let mut saved = SavedPageList::new();
        let duplicates = saved.hydrate(vec![
            entry("Z", SaveStatus::Saved),
            entry("Y", SaveStatus::Failed),
            entry("z", SaveStatus::Queued),
        ]);

        assert_eq!(duplicates.len(), 1);
        assert_eq!(
            saved.entries().as_slice(),
            &[entry("Z", SaveStatus::Saved), entry("Y", SaveStatus::Failed)]
        );
    }
}
