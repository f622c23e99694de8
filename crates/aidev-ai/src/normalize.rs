//! Coercion of pipeline results into a flat string map for display.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Flat `key -> text` view of a result, ordered for stable output.
pub type SectionMap = BTreeMap<String, String>;

pub const NO_CODE: &str = "// No code was generated for this intent";
pub const NO_AST: &str = "// No AST representation was generated";
pub const NO_SEMANTICS: &str = "// No semantic model was generated";

/// Best-effort conversion of any serializable value into a [`SectionMap`].
///
/// The value goes through `serde_json::Value` first, so typed records,
/// string maps and mixed maps all take the same path. Returns `None` when the
/// value is not an object or cannot be serialized at all.
pub fn normalize<T: Serialize + ?Sized>(value: &T) -> Option<SectionMap> {
    let value = serde_json::to_value(value).ok()?;
    normalize_value(&value)
}

/// Strings pass through unchanged; every other value is JSON-encoded.
pub fn normalize_value(value: &Value) -> Option<SectionMap> {
    let object = value.as_object()?;
    Some(
        object
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), text)
            })
            .collect(),
    )
}

/// Rendering used when [`normalize`] gives up: pretty JSON, else `Debug`.
pub fn render_fallback<T: Serialize + Debug + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| format!("{:?}", value))
}

/// The three display fields, with placeholders for absent keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplaySections {
    pub code: String,
    pub ast: String,
    pub semantics: String,
}

impl DisplaySections {
    pub fn from_map(map: &SectionMap) -> Self {
        let field = |key: &str, placeholder: &str| {
            map.get(key)
                .filter(|s| !s.is_empty())
                .cloned()
                .unwrap_or_else(|| placeholder.to_string())
        };
        Self {
            code: field("code", NO_CODE),
            ast: field("ast", NO_AST),
            semantics: field("semantics", NO_SEMANTICS),
        }
    }
}
