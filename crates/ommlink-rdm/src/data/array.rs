// ── OmmArray: homogeneous primitive array ──

use serde::{Deserialize, Serialize};

use super::{DataType, Value};
use crate::error::RdmError;
use crate::state::Qos;

/// A homogeneous array of primitive values, optionally fixed-width.
///
/// Entry-type mixing cannot be ruled out by the builder's signature, so it
/// is checked as entries arrive and surfaced once at `complete()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OmmArray {
    values: Vec<Value>,
    fixed_width: Option<u16>,
}

impl OmmArray {
    pub fn builder() -> OmmArrayBuilder {
        OmmArrayBuilder::default()
    }

    /// Entry type, or `None` for an empty array.
    pub fn item_type(&self) -> Option<DataType> {
        self.values.first().map(Value::data_type)
    }

    pub fn fixed_width(&self) -> Option<u16> {
        self.fixed_width
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All entries as u64, or a mismatch error naming the offending type.
    pub fn uints(&self) -> Result<Vec<u64>, RdmError> {
        self.values
            .iter()
            .map(|v| match v {
                Value::UInt(u) => Ok(*u),
                other => Err(RdmError::TypeMismatch {
                    name: "<array entry>".into(),
                    expected: DataType::UInt,
                    actual: other.data_type(),
                }),
            })
            .collect()
    }

    /// All entries as strings.
    pub fn asciis(&self) -> Result<Vec<String>, RdmError> {
        self.values
            .iter()
            .map(|v| match v {
                Value::Ascii(s) => Ok(s.clone()),
                other => Err(RdmError::TypeMismatch {
                    name: "<array entry>".into(),
                    expected: DataType::Ascii,
                    actual: other.data_type(),
                }),
            })
            .collect()
    }

    /// All entries as Qos values.
    pub fn qos_entries(&self) -> Result<Vec<Qos>, RdmError> {
        self.values
            .iter()
            .map(|v| match v {
                Value::Qos(q) => Ok(*q),
                other => Err(RdmError::TypeMismatch {
                    name: "<array entry>".into(),
                    expected: DataType::Qos,
                    actual: other.data_type(),
                }),
            })
            .collect()
    }

    pub fn from_uints<I: IntoIterator<Item = u64>>(values: I) -> Self {
        Self {
            values: values.into_iter().map(Value::UInt).collect(),
            fixed_width: None,
        }
    }

    pub fn from_asciis<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(|s| Value::Ascii(s.into())).collect(),
            fixed_width: None,
        }
    }

    pub fn from_qos<I: IntoIterator<Item = Qos>>(values: I) -> Self {
        Self {
            values: values.into_iter().map(Value::Qos).collect(),
            fixed_width: None,
        }
    }
}

impl<'a> IntoIterator for &'a OmmArray {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

// ── Builder ─────────────────────────────────────────────────────────

/// Chaining encoder for [`OmmArray`]. The first entry fixes the type;
/// later entries of another type poison the builder and `complete()`
/// reports the defect.
#[derive(Debug, Default)]
pub struct OmmArrayBuilder {
    values: Vec<Value>,
    fixed_width: Option<u16>,
    defect: Option<RdmError>,
}

impl OmmArrayBuilder {
    /// Declare a fixed entry width (wire concern, recorded verbatim).
    pub fn fixed_width(mut self, width: u16) -> Self {
        self.fixed_width = Some(width);
        self
    }

    pub fn value(mut self, value: Value) -> Self {
        if self.defect.is_none() {
            if let Some(first) = self.values.first() {
                if first.data_type() != value.data_type() {
                    self.defect = Some(RdmError::MixedArrayTypes {
                        holds: first.data_type(),
                        got: value.data_type(),
                    });
                    return self;
                }
            }
            self.values.push(value);
        }
        self
    }

    pub fn uint(self, v: u64) -> Self {
        self.value(Value::UInt(v))
    }

    pub fn int(self, v: i64) -> Self {
        self.value(Value::Int(v))
    }

    pub fn ascii(self, v: impl Into<String>) -> Self {
        self.value(Value::Ascii(v.into()))
    }

    pub fn qos(self, v: Qos) -> Self {
        self.value(Value::Qos(v))
    }

    pub fn complete(self) -> Result<OmmArray, RdmError> {
        match self.defect {
            Some(err) => Err(err),
            None => Ok(OmmArray {
                values: self.values,
                fixed_width: self.fixed_width,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn homogeneous_array_builds() {
        let arr = OmmArray::builder().uint(6).uint(7).uint(8).complete().unwrap();
        assert_eq!(arr.item_type(), Some(DataType::UInt));
        assert_eq!(arr.uints().unwrap(), vec![6, 7, 8]);
    }

    #[test]
    fn mixed_types_rejected_at_complete() {
        let err = OmmArray::builder()
            .uint(6)
            .ascii("oops")
            .uint(7)
            .complete()
            .unwrap_err();
        assert_eq!(
            err,
            RdmError::MixedArrayTypes {
                holds: DataType::UInt,
                got: DataType::Ascii,
            }
        );
    }

    #[test]
    fn empty_array_is_legal() {
        let arr = OmmArray::builder().complete().unwrap();
        assert!(arr.is_empty());
        assert_eq!(arr.item_type(), None);
    }

    #[test]
    fn fixed_width_recorded() {
        let arr = OmmArray::builder()
            .fixed_width(8)
            .uint(1)
            .complete()
            .unwrap();
        assert_eq!(arr.fixed_width(), Some(8));
    }

    #[test]
    fn typed_view_rejects_wrong_type() {
        let arr = OmmArray::from_asciis(["RWFFld"]);
        assert!(arr.uints().is_err());
        assert_eq!(arr.asciis().unwrap(), vec!["RWFFld".to_owned()]);
    }
}
