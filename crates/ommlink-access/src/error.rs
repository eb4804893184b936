// ── Access-layer error types ──
//
// User-facing errors from the access layer. These are NOT reactor errors —
// callers never see transport internals directly. The `From` impls
// translate lower-layer failures into the two shapes the API contract
// promises: invalid usage (with a numeric code) and invalid handle.

use thiserror::Error;

use ommlink_rdm::RdmError;
use ommlink_reactor::ReactorError;

/// Numeric error codes carried on invalid-usage errors, matching the
/// wrapped runtime's convention so mixed deployments log the same values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    None,
    Failure,
    NoBuffers,
    InvalidArgument,
    IncompleteData,
    InvalidOperation,
    InvalidHandle,
}

impl ErrorCode {
    pub fn value(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Failure => -1,
            Self::NoBuffers => -4,
            Self::InvalidArgument => -22,
            Self::IncompleteData => -25,
            Self::InvalidOperation => -4048,
            Self::InvalidHandle => -4049,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Unified error type for the access layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The call violated the API contract or was rejected downstream.
    #[error("invalid usage (code {code}): {message}")]
    InvalidUsage { code: ErrorCode, message: String },

    /// The call referenced a handle this instance never issued or has
    /// already destroyed.
    #[error("invalid handle {handle}: {message}")]
    InvalidHandle { handle: u64, message: String },
}

impl AccessError {
    pub(crate) fn usage(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::InvalidUsage {
            code,
            message: message.into(),
        }
    }

    pub(crate) fn handle(handle: u64, message: impl Into<String>) -> Self {
        Self::InvalidHandle {
            handle,
            message: message.into(),
        }
    }
}

impl From<ReactorError> for AccessError {
    fn from(err: ReactorError) -> Self {
        Self::InvalidUsage {
            code: ErrorCode::Failure,
            message: err.to_string(),
        }
    }
}

impl From<RdmError> for AccessError {
    fn from(err: RdmError) -> Self {
        Self::InvalidUsage {
            code: ErrorCode::InvalidArgument,
            message: err.to_string(),
        }
    }
}

// ── Error client ────────────────────────────────────────────────────

/// Alternative error delivery: when a client is registered, fallible calls
/// route their failure here instead of returning it, and asynchronous
/// dispatch-side failures have somewhere to land.
pub trait ErrorClient: Send + Sync {
    fn on_invalid_usage(&self, _code: ErrorCode, _message: &str) {}
    fn on_invalid_handle(&self, _handle: u64, _message: &str) {}
}

/// Route `err` to the error client when one is registered, otherwise
/// return it to the caller.
pub(crate) fn route_error(
    error_client: Option<&dyn ErrorClient>,
    err: AccessError,
) -> Result<(), AccessError> {
    match error_client {
        Some(client) => {
            deliver_error(client, &err);
            Ok(())
        }
        None => Err(err),
    }
}

/// Deliver `err` to the error client unconditionally (dispatch-side path,
/// where there is no caller to return to).
pub(crate) fn deliver_error(client: &dyn ErrorClient, err: &AccessError) {
    match err {
        AccessError::InvalidUsage { code, message } => client.on_invalid_usage(*code, message),
        AccessError::InvalidHandle { handle, message } => {
            client.on_invalid_handle(*handle, message);
        }
    }
}
