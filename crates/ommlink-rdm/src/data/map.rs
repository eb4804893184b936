// ── Map: keyed entries with add/update/delete actions ──

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{DataType, Payload};
use crate::error::RdmError;

/// Action attached to a map entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, Default,
)]
pub enum MapAction {
    #[default]
    Add,
    Update,
    Delete,
}

/// Primitive key of a map entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapKey {
    UInt(u64),
    Ascii(String),
    Buffer(Bytes),
}

impl MapKey {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::UInt(_) => DataType::UInt,
            Self::Ascii(_) => DataType::Ascii,
            Self::Buffer(_) => DataType::Buffer,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_ascii(&self) -> Option<&str> {
        match self {
            Self::Ascii(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// One entry of a [`Map`]. Delete entries carry no payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: MapKey,
    pub action: MapAction,
    pub payload: Payload,
}

/// A keyed container with homogeneous key and payload types.
///
/// Homogeneity is checked as entries arrive and surfaced at `complete()`,
/// matching the array builder's deferred-error convention. Delete entries
/// are exempt from the payload check since they carry none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Map {
    entries: Vec<MapEntry>,
}

impl Map {
    pub fn builder() -> MapBuilder {
        MapBuilder::default()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MapEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Key type, or `None` for an empty map.
    pub fn key_type(&self) -> Option<DataType> {
        self.entries.first().map(|e| e.key.data_type())
    }

    /// Payload container type of the first non-delete entry.
    pub fn container_type(&self) -> Option<DataType> {
        self.entries
            .iter()
            .find(|e| e.action != MapAction::Delete)
            .map(|e| e.payload.data_type())
    }

    pub fn find(&self, key: &MapKey) -> Option<&MapEntry> {
        self.entries.iter().find(|e| &e.key == key)
    }
}

impl<'a> IntoIterator for &'a Map {
    type Item = &'a MapEntry;
    type IntoIter = std::slice::Iter<'a, MapEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ── Builder ─────────────────────────────────────────────────────────

/// Chaining encoder for [`Map`].
#[derive(Debug, Default)]
pub struct MapBuilder {
    entries: Vec<MapEntry>,
    defect: Option<RdmError>,
}

impl MapBuilder {
    pub fn entry(mut self, key: MapKey, action: MapAction, payload: Payload) -> Self {
        if self.defect.is_some() {
            return self;
        }

        if let Some(first) = self.entries.first() {
            if first.key.data_type() != key.data_type() {
                self.defect = Some(RdmError::MixedMapKeys {
                    holds: first.key.data_type(),
                    got: key.data_type(),
                });
                return self;
            }
        }

        if action != MapAction::Delete {
            if let Some(container) = self
                .entries
                .iter()
                .find(|e| e.action != MapAction::Delete)
                .map(|e| e.payload.data_type())
            {
                if container != payload.data_type() {
                    self.defect = Some(RdmError::MixedMapPayloads {
                        holds: container,
                        got: payload.data_type(),
                    });
                    return self;
                }
            }
        }

        self.entries.push(MapEntry {
            key,
            action,
            payload,
        });
        self
    }

    pub fn add(self, key: MapKey, payload: Payload) -> Self {
        self.entry(key, MapAction::Add, payload)
    }

    pub fn update(self, key: MapKey, payload: Payload) -> Self {
        self.entry(key, MapAction::Update, payload)
    }

    pub fn delete(self, key: MapKey) -> Self {
        self.entry(key, MapAction::Delete, Payload::None)
    }

    pub fn complete(self) -> Result<Map, RdmError> {
        match self.defect {
            Some(err) => Err(err),
            None => Ok(Map {
                entries: self.entries,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::data::{ElementList, FilterAction, FilterList};
    use pretty_assertions::assert_eq;

    fn filter_payload() -> Payload {
        Payload::FilterList(
            FilterList::builder()
                .entry(
                    1,
                    FilterAction::Set,
                    Payload::ElementList(ElementList::builder().ascii("Name", "FEED").complete()),
                )
                .complete(),
        )
    }

    #[test]
    fn uint_keyed_map_of_filter_lists() {
        let map = Map::builder()
            .add(MapKey::UInt(10), filter_payload())
            .update(MapKey::UInt(11), filter_payload())
            .delete(MapKey::UInt(12))
            .complete()
            .unwrap();

        assert_eq!(map.len(), 3);
        assert_eq!(map.key_type(), Some(DataType::UInt));
        assert_eq!(map.container_type(), Some(DataType::FilterList));
        assert_eq!(
            map.find(&MapKey::UInt(12)).map(|e| e.action),
            Some(MapAction::Delete)
        );
    }

    #[test]
    fn mixed_keys_rejected() {
        let err = Map::builder()
            .add(MapKey::UInt(1), Payload::None)
            .add(MapKey::Ascii("x".into()), Payload::None)
            .complete()
            .unwrap_err();
        assert_eq!(
            err,
            RdmError::MixedMapKeys {
                holds: DataType::UInt,
                got: DataType::Ascii,
            }
        );
    }

    #[test]
    fn mixed_payloads_rejected_but_deletes_exempt() {
        let err = Map::builder()
            .add(MapKey::UInt(1), filter_payload())
            .add(
                MapKey::UInt(2),
                Payload::ElementList(ElementList::builder().complete()),
            )
            .complete()
            .unwrap_err();
        assert!(matches!(err, RdmError::MixedMapPayloads { .. }));

        let ok = Map::builder()
            .add(MapKey::UInt(1), filter_payload())
            .delete(MapKey::UInt(2))
            .add(MapKey::UInt(3), filter_payload())
            .complete();
        assert!(ok.is_ok());
    }
}
