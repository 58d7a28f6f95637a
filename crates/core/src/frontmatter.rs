//! Front-matter YAML helpers.
//!
//! The transformer only extracts the raw `---` block; hosts that want the
//! configuration inside it parse it here.

use serde_json::Value as JsonValue;
use thiserror::Error;

/// Errors emitted while parsing an extracted front-matter block.
#[derive(Debug, Error)]
pub enum FrontMatterError {
    /// YAML failed to parse.
    #[error("front matter parse error: {0}")]
    Parse(String),
    /// Top-level YAML node was not a mapping.
    #[error("front matter must be a YAML mapping at the top level")]
    InvalidRootType,
}

/// Parses the front-matter string extracted by the transformer (including its
/// `---` fence lines) into a JSON object. An empty or absent body yields an
/// empty object.
pub fn parse_front_matter(front: &str) -> Result<JsonValue, FrontMatterError> {
    let body = strip_fences(front);
    if body.trim().is_empty() {
        return Ok(JsonValue::Object(Default::default()));
    }

    let yaml: serde_yaml::Value =
        serde_yaml::from_str(body).map_err(|err| FrontMatterError::Parse(err.to_string()))?;
    let json =
        serde_json::to_value(yaml).map_err(|err| FrontMatterError::Parse(err.to_string()))?;

    match json {
        JsonValue::Null => Ok(JsonValue::Object(Default::default())),
        JsonValue::Object(_) => Ok(json),
        _ => Err(FrontMatterError::InvalidRootType),
    }
}

/// Drops the leading and trailing `---` fence lines, leaving the YAML body.
fn strip_fences(front: &str) -> &str {
    let mut body = front;
    if let Some(rest) = body.strip_prefix("---") {
        body = rest.strip_prefix('\n').unwrap_or(rest);
    }
    if let Some(pos) = body.rfind("\n---") {
        body = &body[..pos];
    }
    body
}
