//! Query templates with `{name}` placeholders.
//!
//! A template is compiled once: every `{name}` token is replaced with a `?`
//! positional marker and the placeholder names are recorded in left-to-right
//! order. A name that appears more than once produces one entry (and one `?`)
//! per occurrence, so the same bound value is sent at every position.
//!
//! Compilation never fails. Text that does not match the placeholder grammar,
//! including unbalanced braces, passes through to the engine untouched.

use std::sync::OnceLock;

use regex::Regex;

/// Placeholder grammar: letters, digits, spaces, hyphens and underscores
/// between braces. Names are trimmed after extraction.
fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{[A-Za-z0-9 _\-]+\}").unwrap_or_else(|_| unreachable!("pattern is valid"))
    })
}

/// A compiled query template: positional SQL plus the ordered placeholder
/// names it was derived from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryTemplate {
    text: String,
    param_names: Vec<String>,
}

impl QueryTemplate {
    /// Compile a template, rewriting `{name}` tokens to `?` markers.
    pub fn compile(template: &str) -> Self {
        let pattern = placeholder_pattern();
        let mut text = String::with_capacity(template.len());
        let mut param_names = Vec::new();
        let mut last = 0;

        for found in pattern.find_iter(template) {
            text.push_str(&template[last..found.start()]);
            text.push('?');
            // Strip the braces, then surrounding whitespace.
            let name = &template[found.start() + 1..found.end() - 1];
            param_names.push(name.trim().to_string());
            last = found.end();
        }
        text.push_str(&template[last..]);

        Self { text, param_names }
    }

    /// The rewritten SQL with `?` positional markers.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Placeholder names in left-to-right order, duplicates preserved.
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }
}
