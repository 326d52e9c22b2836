//! Response envelope
//!
//! Every endpoint answers `{ "success", "data", "error" }`.

use serde::{Deserialize, Serialize};

/// Machine-readable failure detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

impl ApiResponse<()> {
    /// Success with `data: null`
    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_envelope_serializes_null_data() {
        let value = serde_json::to_value(ApiResponse::empty()).unwrap();
        assert_eq!(value, json!({ "success": true, "data": null, "error": null }));
    }

    #[test]
    fn test_failure_envelope() {
        let value = serde_json::to_value(ApiResponse::<()>::failure("SUB_001", "missing")).unwrap();
        assert_eq!(
            value,
            json!({
                "success": false,
                "data": null,
                "error": { "code": "SUB_001", "message": "missing" }
            })
        );
    }

    #[test]
    fn test_ok_envelope() {
        let value = serde_json::to_value(ApiResponse::ok(vec![1, 2])).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["data"], json!([1, 2]));
    }
}
