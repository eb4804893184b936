// ── FilterList: id-keyed entries with per-entry actions ──

use serde::{Deserialize, Serialize};

use super::Payload;

/// Action attached to a filter entry.
///
/// `Set` replaces the target wholesale, `Update` overlays only the fields
/// present in the entry, `Clear` empties it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, Default,
)]
pub enum FilterAction {
    #[default]
    Set,
    Update,
    Clear,
}

/// One entry of a [`FilterList`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterEntry {
    pub id: u8,
    pub action: FilterAction,
    pub payload: Payload,
}

/// A list of filter entries. Duplicate ids are permitted; the directory
/// domain uses repeated entries for group states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FilterList {
    entries: Vec<FilterEntry>,
}

impl FilterList {
    pub fn builder() -> FilterListBuilder {
        FilterListBuilder {
            entries: Vec::new(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FilterEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry with the given id, if any.
    pub fn find(&self, id: u8) -> Option<&FilterEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

impl<'a> IntoIterator for &'a FilterList {
    type Item = &'a FilterEntry;
    type IntoIter = std::slice::Iter<'a, FilterEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Chaining encoder for [`FilterList`].
#[derive(Debug, Default)]
pub struct FilterListBuilder {
    entries: Vec<FilterEntry>,
}

impl FilterListBuilder {
    pub fn entry(mut self, id: u8, action: FilterAction, payload: Payload) -> Self {
        self.entries.push(FilterEntry {
            id,
            action,
            payload,
        });
        self
    }

    pub fn complete(self) -> FilterList {
        FilterList {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ElementList;
    use pretty_assertions::assert_eq;

    #[test]
    fn find_returns_first_match() {
        let fl = FilterList::builder()
            .entry(3, FilterAction::Set, Payload::None)
            .entry(
                3,
                FilterAction::Update,
                Payload::ElementList(ElementList::builder().complete()),
            )
            .complete();

        assert_eq!(fl.len(), 2);
        let first = fl.find(3).expect("entry present");
        assert_eq!(first.action, FilterAction::Set);
    }

    #[test]
    fn missing_id_is_none() {
        let fl = FilterList::builder().complete();
        assert!(fl.find(1).is_none());
        assert!(fl.is_empty());
    }
}
