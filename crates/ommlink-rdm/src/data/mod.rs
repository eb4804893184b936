//! The OMM container family.
//!
//! Builders seal containers by construction: a `complete()` call consumes
//! the builder and yields an immutable container, so late mutation is
//! unrepresentable rather than a runtime error. Shape errors that types
//! cannot rule out (mixed array entry types, mixed map keys) are deferred
//! to `complete()` so call sites chain without a `?` per entry.

mod array;
mod element_list;
mod filter_list;
mod map;

pub use array::{OmmArray, OmmArrayBuilder};
pub use element_list::{ElementEntry, ElementList, ElementListBuilder};
pub use filter_list::{FilterAction, FilterEntry, FilterList, FilterListBuilder};
pub use map::{Map, MapAction, MapBuilder, MapEntry, MapKey};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::state::{Qos, State};

/// Type tag for primitive values and containers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
pub enum DataType {
    Int,
    UInt,
    Float,
    Double,
    Ascii,
    Buffer,
    Enum,
    State,
    Qos,
    Array,
    ElementList,
    FilterList,
    Map,
    Opaque,
    NoData,
}

/// A primitive value as it appears inside element lists and arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Ascii(String),
    Buffer(Bytes),
    Enum(u16),
    State(State),
    Qos(Qos),
    Array(OmmArray),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int(_) => DataType::Int,
            Self::UInt(_) => DataType::UInt,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::Ascii(_) => DataType::Ascii,
            Self::Buffer(_) => DataType::Buffer,
            Self::Enum(_) => DataType::Enum,
            Self::State(_) => DataType::State,
            Self::Qos(_) => DataType::Qos,
            Self::Array(_) => DataType::Array,
        }
    }
}

/// Payload attached to a message, map entry, or filter entry.
///
/// Recursive through the containers' own entry vectors, so nesting such as
/// Map → FilterList → ElementList needs no indirection here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Payload {
    #[default]
    None,
    ElementList(ElementList),
    Array(OmmArray),
    FilterList(FilterList),
    Map(Map),
    Opaque(Bytes),
}

impl Payload {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::None => DataType::NoData,
            Self::ElementList(_) => DataType::ElementList,
            Self::Array(_) => DataType::Array,
            Self::FilterList(_) => DataType::FilterList,
            Self::Map(_) => DataType::Map,
            Self::Opaque(_) => DataType::Opaque,
        }
    }

    pub fn as_element_list(&self) -> Option<&ElementList> {
        match self {
            Self::ElementList(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_filter_list(&self) -> Option<&FilterList> {
        match self {
            Self::FilterList(fl) => Some(fl),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&Bytes> {
        match self {
            Self::Opaque(buf) => Some(buf),
            _ => None,
        }
    }
}
