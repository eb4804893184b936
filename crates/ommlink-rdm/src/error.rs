use thiserror::Error;

use crate::data::DataType;

/// Errors raised while building or reading the container model.
///
/// These are data-shape errors only. Transport and usage errors belong to
/// the layers above; this crate never sees a channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RdmError {
    /// A typed getter did not find the named entry.
    #[error("entry '{name}' not found")]
    EntryNotFound { name: String },

    /// A typed getter found the entry, but it holds a different type.
    #[error("entry '{name}' holds {actual}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: DataType,
        actual: DataType,
    },

    /// An array was fed entries of more than one primitive type.
    #[error("array entries must share one type: holds {holds}, got {got}")]
    MixedArrayTypes { holds: DataType, got: DataType },

    /// A map was fed keys of more than one primitive type.
    #[error("map keys must share one type: holds {holds}, got {got}")]
    MixedMapKeys { holds: DataType, got: DataType },

    /// A map was fed entry payloads of more than one container type.
    #[error("map entries must share one container type: holds {holds}, got {got}")]
    MixedMapPayloads { holds: DataType, got: DataType },

    /// A message or container did not have the shape a decoder expected.
    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),

    /// A required field was absent from a decoded payload.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A field carried a value outside its legal range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
