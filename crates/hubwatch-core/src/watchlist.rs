//! The watch-list: a multiset of values and field names still being
//! searched for in one record.
//!
//! Entries are consumed, not just inspected. Each decoded leaf removes at
//! most one occurrence of its value and at most one occurrence of its
//! field name, always the first equal occurrence.

use crate::value::RecordValue;
use serde::{Deserialize, Serialize};

/// Ordered multiset of watched strings. Duplicates are independent entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchList(Vec<String>);

impl WatchList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(entries.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Remove the first entry equal to `candidate`. Returns whether one was removed.
    pub fn remove_first(&mut self, candidate: &str) -> bool {
        match self.0.iter().position(|e| e == candidate) {
            Some(idx) => {
                self.0.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Consume the entries matched by one decoded leaf: first its value,
    /// then, independently, its field name.
    pub fn reduce(mut self, key: &str, value: &RecordValue) -> Self {
        if let Some(v) = value.match_key() {
            self.remove_first(&v);
        }
        self.remove_first(key);
        self
    }
}

impl<S: Into<String>> FromIterator<S> for WatchList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl From<Vec<String>> for WatchList {
    fn from(entries: Vec<String>) -> Self {
        Self(entries)
    }
}
