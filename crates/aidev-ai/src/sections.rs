//! Recovery of the code, AST and semantics sections from a completion.
//!
//! Matching is literal substring search for the markers defined in
//! [`crate::prompt`]. There is no escaping: a marker that appears inside the
//! generated code itself (in a comment or a string literal) ends the section
//! early and starts the next one at that point. Callers that need robustness
//! against that must validate the sections themselves.

use crate::normalize::SectionMap;
use crate::prompt::{AST_MARKER, CODE_MARKER, SEMANTICS_MARKER};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const AST_UNAVAILABLE: &str = "// AST representation not available";
pub const SEMANTICS_UNAVAILABLE: &str = "// Semantic model not available";

/// Sections found in a completion. `None` means the key is absent, which is
/// different from a present but empty section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sections {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ast: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantics: Option<String>,
}

impl Sections {
    fn is_blank(&self) -> bool {
        [&self.code, &self.ast, &self.semantics]
            .iter()
            .all(|s| s.as_deref().map_or(true, str::is_empty))
    }

    pub fn to_map(&self) -> SectionMap {
        let mut map = SectionMap::new();
        for (key, value) in [
            ("code", &self.code),
            ("ast", &self.ast),
            ("semantics", &self.semantics),
        ] {
            if let Some(value) = value {
                map.insert(key.to_string(), value.clone());
            }
        }
        map
    }

    /// Rebuild from a flat map; unknown keys are ignored.
    pub fn from_map(map: &SectionMap) -> Self {
        Self {
            code: map.get("code").cloned(),
            ast: map.get("ast").cloned(),
            semantics: map.get("semantics").cloned(),
        }
    }
}

/// The trimmed text after `start`, up to the first `end` that follows it, or
/// to the end of the text when `end` is absent or not given.
fn slice_after<'a>(text: &'a str, start: &str, end: Option<&str>) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let rest = &text[from..];
    let section = match end.and_then(|end| rest.find(end)) {
        Some(to) => &rest[..to],
        None => rest,
    };
    Some(section.trim())
}

/// Split a completion into its sections.
///
/// Each marker is located independently from the start of the text, so the
/// AST section is found even when the code marker is missing. When every
/// section comes out empty (in particular when no marker is present), the
/// whole response becomes the code section and the other two get placeholder
/// text.
pub fn extract_sections(text: &str) -> Sections {
    let mut sections = Sections {
        code: slice_after(text, CODE_MARKER, Some(AST_MARKER)).map(str::to_string),
        ast: slice_after(text, AST_MARKER, Some(SEMANTICS_MARKER)).map(str::to_string),
        semantics: slice_after(text, SEMANTICS_MARKER, None).map(str::to_string),
    };

    debug!(
        code = sections.code.as_deref().map_or(0, str::len),
        ast = sections.ast.as_deref().map_or(0, str::len),
        semantics = sections.semantics.as_deref().map_or(0, str::len),
        "extracted sections"
    );

    if sections.is_blank() {
        warn!("response did not contain section markers, using entire response as code");
        sections = Sections {
            code: Some(text.trim().to_string()),
            ast: Some(AST_UNAVAILABLE.to_string()),
            semantics: Some(SEMANTICS_UNAVAILABLE.to_string()),
        };
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_markers_in_order() {
        let s = extract_sections("===CODE===\nfoo()\n===AST===\n{}\n===SEMANTICS===\n{}");
        assert_eq!(s.code.as_deref(), Some("foo()"));
        assert_eq!(s.ast.as_deref(), Some("{}"));
        assert_eq!(s.semantics.as_deref(), Some("{}"));
    }

    #[test]
    fn test_preamble_before_markers_is_dropped() {
        let text = "Sure! Here you go.\n===CODE===\nfunc Login() bool { return true }\n===AST===\n{\"type\":\"File\"}\n===SEMANTICS===\n{\"entities\":[]}\n";
        let s = extract_sections(text);
        assert_eq!(s.code.as_deref(), Some("func Login() bool { return true }"));
        assert_eq!(s.ast.as_deref(), Some("{\"type\":\"File\"}"));
        assert_eq!(s.semantics.as_deref(), Some("{\"entities\":[]}"));
    }

    #[test]
    fn test_no_markers_falls_back_to_whole_text() {
        let s = extract_sections("  package main\n\nfunc main() {}\n");
        assert_eq!(s.code.as_deref(), Some("package main\n\nfunc main() {}"));
        assert_eq!(s.ast.as_deref(), Some(AST_UNAVAILABLE));
        assert_eq!(s.semantics.as_deref(), Some(SEMANTICS_UNAVAILABLE));
    }

    #[test]
    fn test_code_marker_alone_leaves_other_keys_absent() {
        let s = extract_sections("===CODE===\nfunc f() {}\n");
        assert_eq!(s.code.as_deref(), Some("func f() {}"));
        assert_eq!(s.ast, None);
        assert_eq!(s.semantics, None);

        let map = s.to_map();
        assert_eq!(map.len(), 1);
        assert!(!map.contains_key("ast"));
    }

    #[test]
    fn test_ast_found_without_code_marker() {
        let s = extract_sections("preamble\n===AST===\n{\"a\":1}\n===SEMANTICS===\n[]");
        assert_eq!(s.code, None);
        assert_eq!(s.ast.as_deref(), Some("{\"a\":1}"));
        assert_eq!(s.semantics.as_deref(), Some("[]"));
    }

    #[test]
    fn test_missing_semantics_runs_ast_to_end() {
        let s = extract_sections("===CODE===\nx\n===AST===\n{\"tail\":true}\n");
        assert_eq!(s.ast.as_deref(), Some("{\"tail\":true}"));
        assert_eq!(s.semantics, None);
    }

    #[test]
    fn test_marker_inside_code_truncates_section() {
        let text = "===CODE===\n// emits ===AST=== later\nfunc f() {}\n===AST===\n{}\n===SEMANTICS===\n{}";
        let s = extract_sections(text);
        assert_eq!(s.code.as_deref(), Some("// emits"));
        assert_eq!(s.ast.as_deref(), Some("later\nfunc f() {}\n===AST===\n{}"));
    }

    #[test]
    fn test_markers_are_case_sensitive() {
        let s = extract_sections("===code===\nfoo()");
        assert_eq!(s.code.as_deref(), Some("===code===\nfoo()"));
        assert_eq!(s.ast.as_deref(), Some(AST_UNAVAILABLE));
    }

    #[test]
    fn test_markers_with_empty_sections_fall_back() {
        let s = extract_sections("===CODE===\n===AST===\n===SEMANTICS===\n");
        assert_eq!(s.code.as_deref(), Some("===CODE===\n===AST===\n===SEMANTICS==="));
        assert_eq!(s.ast.as_deref(), Some(AST_UNAVAILABLE));
    }

    #[test]
    fn test_rerun_on_code_is_noop() {
        let first = extract_sections("===CODE===\n  func login() {}  \n===AST===\n{}");
        let code = first.code.unwrap();
        let second = extract_sections(&code);
        assert_eq!(second.code.as_deref(), Some(code.as_str()));
    }

    #[test]
    fn test_map_conversion_preserves_present_keys() {
        let s = Sections {
            code: Some("c".into()),
            ast: None,
            semantics: Some("".into()),
        };
        let back = Sections::from_map(&s.to_map());
        assert_eq!(back, s);
    }
}
