//! Tagged responses returned by the API client.

use serde::de::DeserializeOwned;

use catalog_core::{HarnessError, Result};

/// Outcome of one REST call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse<T> {
    /// HTTP status code, exactly as received
    pub status: u16,
    /// Decoded body of a 2xx answer
    pub body: Option<T>,
    /// Raw text of an error answer, or the decode failure of a 2xx body
    pub raw_error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Borrows the decoded body.
    ///
    /// # Errors
    /// `ProtocolViolation` when the answer carries no usable body.
    pub fn require_body(&self, operation: &str) -> Result<&T> {
        self.body.as_ref().ok_or_else(|| self.missing_body(operation))
    }

    /// Takes the decoded body.
    pub fn into_body(self, operation: &str) -> Result<T> {
        let err = self.missing_body(operation);
        self.body.ok_or(err)
    }

    fn missing_body(&self, operation: &str) -> HarnessError {
        match &self.raw_error {
            Some(raw) => HarnessError::ProtocolViolation(format!(
                "{} answered {} without a usable body: {}",
                operation, self.status, raw
            )),
            None => HarnessError::ProtocolViolation(format!(
                "{} answered {} without a body",
                operation, self.status
            )),
        }
    }
}

/// Decodes a raw answer.
pub(crate) fn decode<T: DeserializeOwned>(status: u16, bytes: &[u8]) -> ApiResponse<T> {
    let text = String::from_utf8_lossy(bytes);
    let is_blank = text.trim().is_empty();

    if !(200..300).contains(&status) {
        return ApiResponse {
            status,
            body: None,
            raw_error: (!is_blank).then(|| text.into_owned()),
        };
    }
    if is_blank {
        return ApiResponse {
            status,
            body: None,
            raw_error: None,
        };
    }
    match serde_json::from_slice(bytes) {
        Ok(body) => ApiResponse {
            status,
            body: Some(body),
            raw_error: None,
        },
        Err(e) => ApiResponse {
            status,
            body: None,
            raw_error: Some(format!("Failed to decode body ({}): {}", e, text)),
        },
    }
}
