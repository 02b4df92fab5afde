//! Status objects embedded in admission responses.
use serde::{Deserialize, Serialize};

/// Machine-readable reasons surfaced with rejected requests.
pub mod reason {
    /// Field-level validation failure, paired with HTTP 422.
    pub const INVALID: &str = "Invalid";
    /// Malformed request, paired with HTTP 400.
    pub const BAD_REQUEST: &str = "BadRequest";
    /// Permission failure, paired with HTTP 403.
    pub const FORBIDDEN: &str = "Forbidden";
    /// Missing authority over a protected field, paired with HTTP 403.
    pub const UNAUTHORIZED: &str = "Unauthorized";
    /// Clashing object, paired with HTTP 409.
    pub const CONFLICT: &str = "Conflict";
    /// Engine-side failure, paired with HTTP 500.
    pub const INTERNAL_ERROR: &str = "InternalError";
}

/// A simplified Kubernetes status object.
///
/// Equivalent to the apimachinery `Status` minus the list metadata and
/// details blocks, which admission responses never populate.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Status {
    /// Suggested HTTP return code (0 if unset)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub code: u16,

    /// One of `Success` or `Failure`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,

    /// A human-readable description of this operation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// A machine-readable description of why this operation failed
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

fn is_zero(code: &u16) -> bool {
    *code == 0
}

impl Status {
    /// A failure status with the given message, reason, and HTTP code.
    pub fn failure(message: &str, reason: &str, code: u16) -> Self {
        Self {
            code,
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Status;

    #[test]
    fn unset_fields_are_skipped() {
        let s = serde_json::to_value(Status::default()).unwrap();
        assert_eq!(s, serde_json::json!({}));

        let s = serde_json::to_value(Status::failure("no", "Forbidden", 403)).unwrap();
        assert_eq!(
            s,
            serde_json::json!({"code": 403, "status": "Failure", "message": "no", "reason": "Forbidden"})
        );
    }
}
