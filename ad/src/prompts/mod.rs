//! Embedded prompts
//!
//! Compiled into the binary from .pmt files. Rendering is plain
//! `{{placeholder}}` substitution; unknown placeholders render empty so
//! a template never leaks braces into a live prompt.

use tracing::debug;

/// Reflection prompt
pub const REFLECTION: &str = include_str!("../../prompts/reflection.pmt");

/// Planning prompt
pub const PLAN: &str = include_str!("../../prompts/plan.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "reflection" => Some(REFLECTION),
        "plan" => Some(PLAN),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}

/// Render a template by `{{key}}` substitution
///
/// Placeholders with no supplied value are replaced with an empty
/// string.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    debug!(value_count = values.len(), "render: called");
    let mut result = template.to_string();
    for (key, value) in values {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }
    // Scrub any placeholder that was not supplied
    while let (Some(start), Some(end)) = (result.find("{{"), result.find("}}")) {
        if end <= start {
            break;
        }
        result.replace_range(start..end + 2, "");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_prompts_exist() {
        assert!(get_embedded("reflection").is_some());
        assert!(get_embedded("plan").is_some());
        assert!(get_embedded("mystery").is_none());
        assert!(REFLECTION.contains("{{task}}"));
        assert!(PLAN.contains("{{tools}}"));
    }

    #[test]
    fn test_render_substitutes() {
        let rendered = render("do {{thing}} in {{place}}", &[("thing", "tests"), ("place", "ci")]);
        assert_eq!(rendered, "do tests in ci");
    }

    #[test]
    fn test_render_scrubs_unknown_placeholders() {
        let rendered = render("known {{a}} unknown {{b}}", &[("a", "x")]);
        assert_eq!(rendered, "known x unknown ");
    }
}
