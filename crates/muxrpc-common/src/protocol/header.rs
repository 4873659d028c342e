use serde::{Deserialize, Serialize};

/// Message header, one per request and one per response.
///
/// Sequence numbers are assigned by the client that owns the connection,
/// monotonically, and are unique within that connection. A response's
/// sequence echoes the request it answers; the error field is empty on
/// requests and on successful responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Header {
    /// Addressing string, `"ServiceName.MethodName"`, split on the first `.`
    pub service_method: String,
    /// Per-connection request identifier
    pub seq: u64,
    /// Error text, empty when there is none
    pub error: String,
}

impl Header {
    /// Creates a header with no error (a request, or a successful response).
    pub fn new(service_method: impl Into<String>, seq: u64) -> Self {
        Header {
            service_method: service_method.into(),
            seq,
            error: String::new(),
        }
    }

    /// Creates an error response header echoing a request.
    pub fn with_error(service_method: impl Into<String>, seq: u64, error: impl Into<String>) -> Self {
        Header {
            service_method: service_method.into(),
            seq,
            error: error.into(),
        }
    }

    /// Whether this header carries an error.
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}
