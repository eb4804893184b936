// ── ElementList: named value container ──

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{DataType, OmmArray, Value};
use crate::error::RdmError;
use crate::state::{Qos, State};

/// One named entry in an [`ElementList`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementEntry {
    pub name: String,
    pub value: Value,
}

/// An ordered list of name → value entries.
///
/// Built with [`ElementList::builder`]; read with the typed getters, which
/// report missing entries and type mismatches as [`RdmError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ElementList {
    entries: Vec<ElementEntry>,
}

impl ElementList {
    pub fn builder() -> ElementListBuilder {
        ElementListBuilder {
            entries: Vec::new(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ElementEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry with the given name, if any.
    pub fn find(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    // ── Typed getters ────────────────────────────────────────────────

    pub fn uint(&self, name: &str) -> Result<u64, RdmError> {
        match self.require(name)? {
            Value::UInt(v) => Ok(*v),
            other => Err(mismatch(name, DataType::UInt, other)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, RdmError> {
        match self.require(name)? {
            Value::Int(v) => Ok(*v),
            other => Err(mismatch(name, DataType::Int, other)),
        }
    }

    pub fn ascii(&self, name: &str) -> Result<&str, RdmError> {
        match self.require(name)? {
            Value::Ascii(v) => Ok(v.as_str()),
            other => Err(mismatch(name, DataType::Ascii, other)),
        }
    }

    pub fn buffer(&self, name: &str) -> Result<&Bytes, RdmError> {
        match self.require(name)? {
            Value::Buffer(v) => Ok(v),
            other => Err(mismatch(name, DataType::Buffer, other)),
        }
    }

    pub fn state(&self, name: &str) -> Result<&State, RdmError> {
        match self.require(name)? {
            Value::State(v) => Ok(v),
            other => Err(mismatch(name, DataType::State, other)),
        }
    }

    pub fn array(&self, name: &str) -> Result<&OmmArray, RdmError> {
        match self.require(name)? {
            Value::Array(v) => Ok(v),
            other => Err(mismatch(name, DataType::Array, other)),
        }
    }

    fn require(&self, name: &str) -> Result<&Value, RdmError> {
        self.find(name).ok_or_else(|| RdmError::EntryNotFound {
            name: name.to_owned(),
        })
    }
}

impl<'a> IntoIterator for &'a ElementList {
    type Item = &'a ElementEntry;
    type IntoIter = std::slice::Iter<'a, ElementEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn mismatch(name: &str, expected: DataType, actual: &Value) -> RdmError {
    RdmError::TypeMismatch {
        name: name.to_owned(),
        expected,
        actual: actual.data_type(),
    }
}

// ── Builder ─────────────────────────────────────────────────────────

/// Chaining encoder for [`ElementList`].
#[derive(Debug, Default)]
pub struct ElementListBuilder {
    entries: Vec<ElementEntry>,
}

impl ElementListBuilder {
    pub fn entry(mut self, name: impl Into<String>, value: Value) -> Self {
        self.entries.push(ElementEntry {
            name: name.into(),
            value,
        });
        self
    }

    pub fn int(self, name: impl Into<String>, v: i64) -> Self {
        self.entry(name, Value::Int(v))
    }

    pub fn uint(self, name: impl Into<String>, v: u64) -> Self {
        self.entry(name, Value::UInt(v))
    }

    pub fn ascii(self, name: impl Into<String>, v: impl Into<String>) -> Self {
        self.entry(name, Value::Ascii(v.into()))
    }

    pub fn buffer(self, name: impl Into<String>, v: Bytes) -> Self {
        self.entry(name, Value::Buffer(v))
    }

    pub fn state(self, name: impl Into<String>, v: State) -> Self {
        self.entry(name, Value::State(v))
    }

    pub fn qos(self, name: impl Into<String>, v: Qos) -> Self {
        self.entry(name, Value::Qos(v))
    }

    pub fn array(self, name: impl Into<String>, v: OmmArray) -> Self {
        self.entry(name, Value::Array(v))
    }

    /// Add the entry only when the value is present.
    pub fn opt(self, name: impl Into<String>, value: Option<Value>) -> Self {
        match value {
            Some(v) => self.entry(name, v),
            None => self,
        }
    }

    pub fn complete(self) -> ElementList {
        ElementList {
            entries: self.entries,
        }
    }
}
