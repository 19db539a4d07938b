//! Primitives and essential dependencies

use std::{
    fmt::{Display, Formatter},
    time::SystemTime,
};

// Reexport or redefine types.

/// UTC DateTime
pub type DateTime = chrono::DateTime<chrono::Utc>;

/// Anyhow error
pub use anyhow;

/// Tracing
pub use tracing;

/// Attempt to convert a [`SystemTime`] (returned on file statistics calls)
/// to the DateTime type.
pub fn systime2datetime(t: SystemTime) -> Option<DateTime> {
    use chrono::TimeZone;

    t.duration_since(std::time::UNIX_EPOCH)
        .ok()
        .and_then(|d| {
            chrono::Utc
                .timestamp_opt(d.as_secs() as i64, d.subsec_nanos())
                .single()
        })
}

/// Format as used in Last-Modified (IMF-fixdate, always GMT).
pub fn httpdate(t: &DateTime) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Unified error type.
///
/// Every handler returns this type. The wrapped errors inside are
/// strictly internal: they get logged, and the client only sees the
/// status code and a short machine-readable kind.
#[derive(Debug, thiserror::Error)]
pub enum UnifiedError {
    /// 500 Internal Server Error
    InternalServerError(
        #[from]
        #[source]
        anyhow::Error,
    ),
    /// 404 Not Found
    NotFound(#[source] anyhow::Error),
    /// 415 Unsupported Media Type
    UnsupportedMediaType(#[source] anyhow::Error),
    /// 422 Unprocessable Entity
    Unprocessable(#[source] anyhow::Error),
}

impl UnifiedError {
    /// The status code and the short kind sent to the client.
    pub fn status(&self) -> (axum::http::StatusCode, &'static str) {
        use axum::http::StatusCode;

        match self {
            UnifiedError::NotFound(_) => (StatusCode::NOT_FOUND, "missing_input"),
            UnifiedError::UnsupportedMediaType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_format")
            }
            UnifiedError::Unprocessable(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "decode_failed")
            }
            UnifiedError::InternalServerError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        }
    }
}

impl Display for UnifiedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UnifiedError::NotFound(e) => write!(f, "Not found: {}", e),
            UnifiedError::UnsupportedMediaType(e) => {
                write!(f, "Unsupported media type: {}", e)
            }
            UnifiedError::Unprocessable(e) => {
                write!(f, "Unprocessable: {}", e)
            }
            UnifiedError::InternalServerError(e) => {
                write!(f, "Internal server error: {}", e)
            }
        }
    }
}

impl axum::response::IntoResponse for UnifiedError {
    /// Render as a small JSON document. The diagnostic stays on our side.
    fn into_response(self) -> axum::response::Response {
        let (code, kind) = self.status();
        tracing::warn!("request failed: {self:#}");
        let body = serde_json::json!({
            "status": code.as_u16(),
            "error": kind,
        });
        (code, axum::Json(body)).into_response()
    }
}

/// Unified Result. You can return this type directly in an
/// Axum endpoint handler. It will return valid JSON responses
/// when there is an error with the correct status code.
pub type Result<T> = std::result::Result<T, UnifiedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn httpdate_is_imf_fixdate() {
        use chrono::TimeZone;

        let t = chrono::Utc.with_ymd_and_hms(2023, 4, 9, 7, 5, 3).unwrap();
        assert_eq!(httpdate(&t), "Sun, 09 Apr 2023 07:05:03 GMT");
    }

    #[test]
    fn systime_roundtrips_to_the_second() {
        let t = std::time::UNIX_EPOCH + std::time::Duration::from_secs(86_400);
        let dt = systime2datetime(t).unwrap();
        assert_eq!(dt.timestamp(), 86_400);
    }

    #[test]
    fn statuses() {
        use axum::http::StatusCode;

        let e = UnifiedError::NotFound(anyhow::anyhow!("x"));
        assert_eq!(e.status().0, StatusCode::NOT_FOUND);
        let e = UnifiedError::from(anyhow::anyhow!("x"));
        assert_eq!(e.status().0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
