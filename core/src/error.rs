use serde::Serialize;

/// Structured error response for gateway callers. Carries enough for the
/// caller to understand what went wrong and how to fix it.
#[derive(Debug, Serialize)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "not_found")
    pub error: String,
    /// Readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the gateway surfaces
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const EXECUTION_FAILED: &str = "execution_failed";
    pub const INTERNAL_ERROR: &str = "internal_error";
}
