//! Shared helpers for the domain tools

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use voice_turn_core::{Error, ToolError};

/// Source of "now" for tools that reason about the calendar
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Keyset cursor: base64url of `"{rent}:{unit_id}"`
pub fn encode_cursor(rent: i64, unit_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}:{}", rent, unit_id))
}

pub fn decode_cursor(cursor: &str) -> Result<(i64, String), ToolError> {
    let invalid = || ToolError::invalid_params("cursor is not valid");

    let bytes = URL_SAFE_NO_PAD.decode(cursor.trim_end_matches('=')).map_err(|_| invalid())?;
    let raw = String::from_utf8(bytes).map_err(|_| invalid())?;
    let (rent, unit_id) = raw.split_once(':').ok_or_else(invalid)?;
    let rent = rent.parse::<i64>().map_err(|_| invalid())?;
    if unit_id.is_empty() {
        return Err(invalid());
    }
    Ok((rent, unit_id.to_string()))
}

pub(crate) fn str_arg<'a>(input: &'a Value, name: &str) -> Result<&'a str, ToolError> {
    input
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::invalid_params(format!("{} is required", name)))
}

pub(crate) fn parse_instant(name: &str, raw: &str) -> Result<DateTime<Utc>, ToolError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ToolError::invalid_params(format!("{} must be an ISO-8601 date-time", name)))
}

/// Map a store or arbiter error onto a tool error code
pub(crate) fn tool_error(err: Error) -> ToolError {
    match err {
        Error::Validation(message) => ToolError::invalid_params(message),
        Error::NotFound(message) => ToolError::missing_record(message),
        Error::Conflict(message) => ToolError::conflict(message),
        Error::UpstreamTimeout(message) | Error::UpstreamDisconnect(message) => {
            ToolError::upstream(message)
        },
        other => ToolError::internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_turn_core::ErrorCode;

    #[test]
    fn test_cursor_round_trip() {
        let cursor = encode_cursor(120_000, "unit-clifton-2br");
        assert!(!cursor.contains('+') && !cursor.contains('/'));
        assert_eq!(decode_cursor(&cursor).unwrap(), (120_000, "unit-clifton-2br".to_string()));
    }

    #[test]
    fn test_bad_cursor_is_invalid_params() {
        for bad in ["%%%", "bm8tY29sb24", &URL_SAFE_NO_PAD.encode("abc:unit")] {
            let err = decode_cursor(bad).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidParams);
        }
    }

    #[test]
    fn test_error_mapping() {
        let err = tool_error(Error::Conflict("Slot no longer available".into()));
        assert_eq!(err.code, ErrorCode::Conflict);
        let err = tool_error(Error::NotFound("lead".into()));
        assert_eq!(err.code, ErrorCode::RecordNotFound);
    }
}
