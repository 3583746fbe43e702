//! Tool trait and schema types
//!
//! Every tool validates its arguments against a fixed JSON-Schema-style
//! description before it runs. Validation never coerces: a string where an
//! integer is expected is rejected, not parsed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::Error;

/// The five grounded-data tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    SearchListings,
    QuoteTotal,
    ListSlots,
    BookViewing,
    SendFollowup,
}

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        ToolName::SearchListings,
        ToolName::QuoteTotal,
        ToolName::ListSlots,
        ToolName::BookViewing,
        ToolName::SendFollowup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::SearchListings => "search_listings",
            ToolName::QuoteTotal => "quote_total",
            ToolName::ListSlots => "list_slots",
            ToolName::BookViewing => "book_viewing",
            ToolName::SendFollowup => "send_followup",
        }
    }
}

impl FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ToolError::not_found(format!("Unknown tool: {}", s)))
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated-by-name tool invocation bound to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: ToolName,
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ToolCall {
    pub fn new(name: ToolName, arguments: Value) -> Self {
        Self {
            name,
            arguments,
            session_id: None,
        }
    }

    pub fn for_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Resolve a planner-supplied name
    pub fn parse(name: &str, arguments: Value) -> Result<Self, ToolError> {
        Ok(Self::new(name.parse()?, arguments))
    }
}

/// Tool error with JSON-RPC style codes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolError {
    fn with_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an invalid parameters error
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::InvalidParams, message)
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::InternalError, message)
    }

    /// Unknown tool name
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::MethodNotFound, message)
    }

    /// Referenced unit, lead or reservation does not exist
    pub fn missing_record(message: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::RecordNotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::Conflict, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::with_code(ErrorCode::Upstream, message)
    }

    /// Create a timeout error
    pub fn timeout(tool_name: &str, timeout_ms: u64) -> Self {
        Self::with_code(
            ErrorCode::Timeout,
            format!("Tool '{}' timed out after {}ms", tool_name, timeout_ms),
        )
    }

    /// Create an error with custom data
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ToolError {}

impl From<ToolError> for Error {
    fn from(err: ToolError) -> Self {
        match err.code {
            ErrorCode::InvalidParams | ErrorCode::MethodNotFound | ErrorCode::ParseError => {
                Error::Validation(err.message)
            },
            ErrorCode::RecordNotFound => Error::NotFound(err.message),
            ErrorCode::Conflict => Error::Conflict(err.message),
            ErrorCode::Timeout => Error::UpstreamTimeout(err.message),
            ErrorCode::Upstream => Error::UpstreamDisconnect(err.message),
            ErrorCode::InternalError | ErrorCode::Custom(_) => Error::Internal(err.message),
        }
    }
}

/// Error codes (JSON-RPC 2.0 compatible, plus server-defined range)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", from = "i32")]
pub enum ErrorCode {
    ParseError,
    MethodNotFound,
    InvalidParams,
    InternalError,
    RecordNotFound,
    Timeout,
    Conflict,
    Upstream,
    Custom(i32),
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::ParseError => -32700,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::RecordNotFound => -32004,
            ErrorCode::Timeout => -32008,
            ErrorCode::Conflict => -32009,
            ErrorCode::Upstream => -32010,
            ErrorCode::Custom(c) => c,
        }
    }
}

impl From<i32> for ErrorCode {
    fn from(value: i32) -> Self {
        match value {
            -32700 => ErrorCode::ParseError,
            -32601 => ErrorCode::MethodNotFound,
            -32602 => ErrorCode::InvalidParams,
            -32603 => ErrorCode::InternalError,
            -32004 => ErrorCode::RecordNotFound,
            -32008 => ErrorCode::Timeout,
            -32009 => ErrorCode::Conflict,
            -32010 => ErrorCode::Upstream,
            c => ErrorCode::Custom(c),
        }
    }
}

/// Content block types for tool output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Json { data: Value },
}

/// Tool output with content blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Structured output; serialization failures become an error output
    pub fn json(value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(data) => Self {
                content: vec![ContentBlock::Json { data }],
                is_error: false,
            },
            Err(e) => Self::error(format!("Failed to serialize tool output: {}", e)),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: message.into() }],
            is_error: true,
        }
    }

    /// First structured block, if any
    pub fn data(&self) -> Option<&Value> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Json { data } => Some(data),
            ContentBlock::Text { .. } => None,
        })
    }

    /// Structured data, or the text blocks joined as a JSON string
    pub fn to_value(&self) -> Value {
        if let Some(data) = self.data() {
            return data.clone();
        }
        let text: Vec<&str> = self
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Json { .. } => None,
            })
            .collect();
        Value::String(text.join("\n"))
    }
}

/// Tool schema (JSON Schema format)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

/// Input schema for tool parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: HashMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl InputSchema {
    /// Create an empty object schema
    pub fn object() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: Vec::new(),
        }
    }

    /// Add a property to the schema
    pub fn property(mut self, name: &str, schema: PropertySchema, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }
}

/// Property schema for input parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub prop_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Item type for arrays
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    /// Nested schema for objects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<Box<InputSchema>>,
    /// `format` hint such as `date` or `date-time`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl PropertySchema {
    fn typed(prop_type: &str, description: impl Into<String>) -> Self {
        Self {
            prop_type: prop_type.to_string(),
            description: Some(description.into()),
            default: None,
            enum_values: None,
            minimum: None,
            maximum: None,
            items: None,
            object: None,
            format: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::typed("string", description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::typed("integer", description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::typed("boolean", description)
    }

    pub fn array(description: impl Into<String>, items: PropertySchema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::typed("array", description)
        }
    }

    pub fn object(description: impl Into<String>, schema: InputSchema) -> Self {
        Self {
            object: Some(Box::new(schema)),
            ..Self::typed("object", description)
        }
    }

    pub fn enum_type(description: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            enum_values: Some(values),
            ..Self::typed("string", description)
        }
    }

    /// Calendar date, `YYYY-MM-DD`
    pub fn date(description: impl Into<String>) -> Self {
        Self {
            format: Some("date".to_string()),
            ..Self::typed("string", description)
        }
    }

    /// RFC 3339 timestamp
    pub fn date_time(description: impl Into<String>) -> Self {
        Self {
            format: Some("date-time".to_string()),
            ..Self::typed("string", description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.minimum = Some(min);
        self.maximum = Some(max);
        self
    }

    pub fn with_minimum(mut self, min: f64) -> Self {
        self.minimum = Some(min);
        self
    }
}

/// Tool trait for grounded-data tools
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    fn description(&self) -> &str;

    fn schema(&self) -> ToolSchema;

    async fn execute(&self, input: Value) -> Result<ToolOutput, ToolError>;

    /// Validate input against schema
    ///
    /// Checks required fields, types, enum values, numeric ranges, formats,
    /// and recurses into nested objects and arrays.
    fn validate(&self, input: &Value) -> Result<(), ToolError> {
        validate_object("", input, &self.schema().input_schema)
    }

    /// Per-tool timeout in milliseconds
    fn timeout_ms(&self) -> u64 {
        3_000
    }
}

/// Validate a JSON object against an input schema
pub fn validate_object(path: &str, input: &Value, schema: &InputSchema) -> Result<(), ToolError> {
    let Value::Object(obj) = input else {
        return Err(ToolError::invalid_params(format!(
            "{} must be an object",
            if path.is_empty() { "Input" } else { path }
        )));
    };

    for required in &schema.required {
        match obj.get(required) {
            None | Some(Value::Null) => {
                return Err(ToolError::invalid_params(format!(
                    "Missing required field: {}",
                    join_path(path, required)
                )));
            },
            Some(_) => {},
        }
    }

    for (name, value) in obj {
        if let Some(prop_schema) = schema.properties.get(name) {
            validate_property(&join_path(path, name), value, prop_schema)?;
        }
    }

    Ok(())
}

fn join_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

/// Validate a property value against its schema
pub fn validate_property(name: &str, value: &Value, schema: &PropertySchema) -> Result<(), ToolError> {
    // Optional fields may be sent as explicit null
    if value.is_null() {
        return Ok(());
    }

    let type_valid = match schema.prop_type.as_str() {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    };

    if !type_valid {
        return Err(ToolError::invalid_params(format!(
            "Field '{}' must be of type '{}', got '{}'",
            name,
            schema.prop_type,
            json_type_name(value)
        )));
    }

    if let (Some(enum_values), Some(s)) = (&schema.enum_values, value.as_str()) {
        if !enum_values.iter().any(|v| v == s) {
            return Err(ToolError::invalid_params(format!(
                "Field '{}' must be one of: [{}], got '{}'",
                name,
                enum_values.join(", "),
                s
            )));
        }
    }

    if let Some(num) = value.as_f64() {
        if let Some(min) = schema.minimum {
            if num < min {
                return Err(ToolError::invalid_params(format!(
                    "Field '{}' must be >= {}, got {}",
                    name, min, num
                )));
            }
        }
        if let Some(max) = schema.maximum {
            if num > max {
                return Err(ToolError::invalid_params(format!(
                    "Field '{}' must be <= {}, got {}",
                    name, max, num
                )));
            }
        }
    }

    if let (Some(format), Some(s)) = (&schema.format, value.as_str()) {
        let ok = match format.as_str() {
            "date" => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
            "date-time" => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
            _ => true,
        };
        if !ok {
            return Err(ToolError::invalid_params(format!(
                "Field '{}' must be a valid {}, got '{}'",
                name, format, s
            )));
        }
    }

    if let (Some(items), Some(array)) = (&schema.items, value.as_array()) {
        for (i, item) in array.iter().enumerate() {
            validate_property(&format!("{}[{}]", name, i), item, items)?;
        }
    }

    if let Some(nested) = &schema.object {
        validate_object(name, value, nested)?;
    }

    Ok(())
}

/// Get a human-readable type name for a JSON value
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn visitor_schema() -> InputSchema {
        InputSchema::object()
            .property("unit_id", PropertySchema::string("Unit"), true)
            .property(
                "limit",
                PropertySchema::integer("Limit").with_range(1.0, 50.0),
                false,
            )
            .property("when", PropertySchema::date_time("Slot start"), false)
            .property(
                "visitor",
                PropertySchema::object(
                    "Visitor",
                    InputSchema::object().property("name", PropertySchema::string("Name"), true),
                ),
                false,
            )
            .property(
                "tags",
                PropertySchema::array("Tags", PropertySchema::string("Tag")),
                false,
            )
    }

    #[test]
    fn test_tool_name_round_trip() {
        for name in ToolName::ALL {
            assert_eq!(name.as_str().parse::<ToolName>().unwrap(), name);
        }
        let err = "delete_everything".parse::<ToolName>().unwrap_err();
        assert_eq!(err.code, ErrorCode::MethodNotFound);
    }

    #[test]
    fn test_validation_rejects_wrong_types() {
        let schema = visitor_schema();
        assert!(validate_object("", &json!({"unit_id": "u1"}), &schema).is_ok());

        // no coercion from string to integer
        let err = validate_object("", &json!({"unit_id": "u1", "limit": "5"}), &schema).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);

        assert!(validate_object("", &json!({"unit_id": "u1", "limit": 99}), &schema).is_err());
        assert!(validate_object("", &json!({"limit": 5}), &schema).is_err());
        assert!(validate_object("", &json!({"unit_id": null}), &schema).is_err());
        assert!(validate_object("", &json!("u1"), &schema).is_err());
    }

    #[test]
    fn test_validation_recurses() {
        let schema = visitor_schema();
        let err = validate_object("", &json!({"unit_id": "u1", "visitor": {}}), &schema).unwrap_err();
        assert!(err.message.contains("visitor.name"));

        assert!(validate_object("", &json!({"unit_id": "u1", "tags": ["a", 1]}), &schema).is_err());
        assert!(validate_object("", &json!({"unit_id": "u1", "when": "tomorrow"}), &schema).is_err());
        assert!(validate_object(
            "",
            &json!({"unit_id": "u1", "when": "2030-01-01T10:00:00Z"}),
            &schema
        )
        .is_ok());
    }

    #[test]
    fn test_tool_error_maps_to_taxonomy() {
        use crate::error::ErrorKind;

        let e: Error = ToolError::invalid_params("bad").into();
        assert_eq!(e.kind(), ErrorKind::Validation);
        let e: Error = ToolError::conflict("taken").into();
        assert_eq!(e.kind(), ErrorKind::Conflict);
        let e: Error = ToolError::timeout("quote_total", 3000).into();
        assert_eq!(e.kind(), ErrorKind::UpstreamTimeout);
        let e: Error = ToolError::missing_record("no unit").into();
        assert_eq!(e.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_tool_output_data() {
        let out = ToolOutput::json(json!({"rent": 120000}));
        assert_eq!(out.data().and_then(|d| d["rent"].as_i64()), Some(120000));

        let text = ToolOutput::text("queued");
        assert!(text.data().is_none());
        assert_eq!(text.to_value(), json!("queued"));
    }
}
