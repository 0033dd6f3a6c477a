use std::sync::Arc;

mod history;
mod saved;

pub use history::{HistoryList, HydrationDrops, RecordedVisit};
pub use saved::SavedPageList;

/// Immutable point-in-time copy of a list.
///
/// Iteration can be restarted any number of times and never observes
/// mutations made after the snapshot was taken.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    items: Arc<[T]>,
}

impl<T> Snapshot<T> {
    fn new(items: Vec<T>) -> Self {
        Self { items: items.into() }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<'a, T> IntoIterator for &'a Snapshot<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
