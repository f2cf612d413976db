//! Response shape descriptors checked by the selector before a candidate's
//! answer is accepted.

use serde_json::Value;

/// JSON type a required top-level field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// JSON object
    Object,
    /// JSON array
    Array,
    /// JSON string
    String,
    /// JSON number
    Number,
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Object => "object",
            FieldKind::Array => "array",
            FieldKind::String => "string",
            FieldKind::Number => "number",
        }
    }
}

/// A required top-level field of a JSON response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    /// Field name
    pub name: String,
    /// Required type
    pub kind: FieldKind,
}

/// Expected shape of a model response.
///
/// This is the structural gate only: it decides whether a candidate answered
/// at all. Semantic checks (ranges, counts) belong to the caller's parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSchema {
    /// Free prose; must contain something other than whitespace.
    Text,
    /// A JSON object carrying the listed fields.
    Json {
        /// Label used in validation messages.
        name: String,
        /// Required top-level fields.
        fields: Vec<SchemaField>,
    },
}

impl ResponseSchema {
    /// Start a JSON object schema.
    pub fn json(name: impl Into<String>) -> Self {
        ResponseSchema::Json {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Require a top-level field. No-op on [`ResponseSchema::Text`].
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        if let ResponseSchema::Json { fields, .. } = &mut self {
            fields.push(SchemaField {
                name: name.into(),
                kind,
            });
        }
        self
    }

    /// Whether the backend should ask the model for JSON output.
    pub fn expects_json(&self) -> bool {
        matches!(self, ResponseSchema::Json { .. })
    }

    /// Check a raw completion against this schema.
    pub fn validate(&self, raw: &str) -> Result<(), String> {
        match self {
            ResponseSchema::Text => {
                if raw.trim().is_empty() {
                    Err("Empty text response".to_string())
                } else {
                    Ok(())
                }
            }
            ResponseSchema::Json { name, fields } => {
                let json_str = extract_json_from_completion(raw)?;
                let value: Value = serde_json::from_str(json_str)
                    .map_err(|e| format!("{} response is not valid JSON: {}", name, e))?;
                let object = value
                    .as_object()
                    .ok_or_else(|| format!("{} response is not a JSON object", name))?;

                for field in fields {
                    match object.get(&field.name) {
                        None => {
                            return Err(format!(
                                "{} response is missing field '{}'",
                                name, field.name
                            ))
                        }
                        Some(v) if !field.kind.matches(v) => {
                            return Err(format!(
                                "{} response field '{}' should be {}",
                                name,
                                field.name,
                                field.kind.as_str()
                            ))
                        }
                        Some(_) => {}
                    }
                }
                Ok(())
            }
        }
    }
}

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Attempts extraction in this order:
/// 1. Raw JSON, cut at the brace closing a leading object so trailing
///    commentary is ignored
/// 2. ```json ... ``` code blocks
/// 3. ``` ... ``` code blocks
/// 4. The span from the first `{` to its matching `}` in surrounding prose
pub fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') {
        return Ok(balanced_object(trimmed).unwrap_or(trimmed));
    }
    if trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    if let Some(span) = balanced_object(completion) {
        return Ok(span);
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

/// Slice from the first `{` to the brace that closes it, skipping braces inside strings.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
