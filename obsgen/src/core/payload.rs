//! Coercion of agent output payloads into plain text.

use serde_json::{Map, Value};

/// Fields probed, in order, when an agent returns a structured object.
pub const TEXT_FIELDS: [&str; 5] = [
    "final_implementation",
    "text",
    "content",
    "output",
    "implementation",
];

/// Raw output as handed over by an agent runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    Text(String),
    NamedFields(Map<String, Value>),
    Opaque(Value),
}

impl RawOutput {
    /// Classify a decoded JSON value.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => RawOutput::Text(text),
            Value::Object(map) => RawOutput::NamedFields(map),
            other => RawOutput::Opaque(other),
        }
    }

    /// Interpret file contents. JSON strings and objects carrying one of the
    /// text fields are unwrapped; anything else (including a bare JSON
    /// artifact) is taken verbatim.
    pub fn from_file_contents(contents: String) -> Self {
        let trimmed = contents.trim_start();
        if (trimmed.starts_with('{') || trimmed.starts_with('"'))
            && let Ok(value) = serde_json::from_str::<Value>(&contents)
        {
            let envelope = match &value {
                Value::String(_) => true,
                Value::Object(map) => TEXT_FIELDS.iter().any(|f| map.contains_key(*f)),
                _ => false,
            };
            if envelope {
                return Self::from_value(value);
            }
        }
        RawOutput::Text(contents)
    }

    /// Resolve to the text that will be scanned. `None` means nothing to
    /// extract (JSON null or blank text).
    pub fn into_text(self) -> Option<String> {
        let text = match self {
            RawOutput::Text(text) => text,
            RawOutput::NamedFields(map) => {
                let preferred = TEXT_FIELDS
                    .iter()
                    .find_map(|field| map.get(*field).and_then(Value::as_str))
                    .map(str::to_string);
                match preferred {
                    Some(text) => text,
                    None => pretty(&Value::Object(map)),
                }
            }
            RawOutput::Opaque(Value::Null) => return None,
            RawOutput::Opaque(value) => pretty(&value),
        };
        (!text.trim().is_empty()).then_some(text)
    }
}

impl From<String> for RawOutput {
    fn from(text: String) -> Self {
        RawOutput::Text(text)
    }
}

impl From<&str> for RawOutput {
    fn from(text: &str) -> Self {
        RawOutput::Text(text.to_string())
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
