use serde_json::{Map, Value};

use super::ParseError;

/// Turn `name:value` entries into a field map.
///
/// Only the first colon separates name and value; values stay strings.
pub fn resolve_fields<S: AsRef<str>>(entries: &[S]) -> Result<Map<String, Value>, ParseError> {
    let mut fields = Map::new();
    for entry in entries {
        let entry = entry.as_ref();
        let (name, value) = entry.split_once(':').ok_or_else(|| {
            ParseError::Invalid(format!(
                "Error parsing fields: '{entry}' is not in 'name:value' form"
            ))
        })?;
        fields.insert(name.trim().to_string(), Value::String(value.to_string()));
    }
    Ok(fields)
}
