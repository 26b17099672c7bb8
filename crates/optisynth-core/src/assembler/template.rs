//! Templates and their reserved insertion markers.
//!
//! A placeholder is written `{{INSERT_<NAME>}}`. When the marker is the only
//! thing on its line (optionally behind a `#` comment lead) it is a *block*
//! site and receives a reindented statement body; anywhere else it is an
//! *inline* site and receives a single expression.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{OptisynthError, Result};

const OPTIMIZATION_TEMPLATE: &str = include_str!("../../templates/optimization.py");

pub(crate) fn placeholder_regex() -> Result<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{INSERT_([A-Za-z0-9_]+)\}\}").ok())
        .as_ref()
        .ok_or_else(|| OptisynthError::AssemblyFailure("placeholder pattern unavailable".into()))
}

/// Where a placeholder sits in the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaceholderSite {
    /// Marker alone on its line; `indent` is that line's leading whitespace.
    Block { indent: String },
    /// Marker embedded in other text on the line.
    Inline { indent: String },
}

impl PlaceholderSite {
    pub fn indent(&self) -> &str {
        match self {
            PlaceholderSite::Block { indent } | PlaceholderSite::Inline { indent } => indent,
        }
    }
}

/// One named insertion point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub name: String,
    /// Zero-based line index in the template.
    pub line: usize,
    pub site: PlaceholderSite,
}

/// Immutable program skeleton. Each placeholder name appears exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    placeholders: Vec<Placeholder>,
}

impl Template {
    /// Parse a template, rejecting duplicate placeholder names.
    pub fn parse(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let re = placeholder_regex()?;
        let mut placeholders: Vec<Placeholder> = Vec::new();

        for (line_no, line) in source.split('\n').enumerate() {
            let matches: Vec<_> = re.captures_iter(line).collect();
            let alone = matches.len() == 1;
            for caps in matches {
                let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let name = name.as_str().to_string();
                if placeholders.iter().any(|p| p.name == name) {
                    return Err(OptisynthError::AssemblyFailure(format!(
                        "placeholder {name} appears more than once in template"
                    )));
                }

                let indent: String = line
                    .chars()
                    .take_while(|c| *c == ' ' || *c == '\t')
                    .collect();
                let lead = line[..whole.start()].trim().trim_start_matches('#').trim();
                let tail = line[whole.end()..].trim();
                let site = if alone && lead.is_empty() && tail.is_empty() {
                    PlaceholderSite::Block { indent }
                } else {
                    PlaceholderSite::Inline { indent }
                };

                placeholders.push(Placeholder {
                    name,
                    line: line_no,
                    site,
                });
            }
        }

        Ok(Self {
            source,
            placeholders,
        })
    }

    /// Read and parse a template file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::parse(source)
    }

    /// The bundled optimization skeleton with `OBJECTIVE_FUNCTION` and
    /// `OPTIMIZATION_ALGORITHM` insertion points.
    pub fn optimization_default() -> Result<Self> {
        Self::parse(OPTIMIZATION_TEMPLATE)
    }

    /// The literal marker for `name`.
    pub fn marker(name: &str) -> String {
        format!("{{{{INSERT_{name}}}}}")
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholders in order of appearance.
    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    pub fn placeholder(&self, name: &str) -> Option<&Placeholder> {
        self.placeholders.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.placeholder(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_format() {
        assert_eq!(Template::marker("A"), "{{INSERT_A}}");
    }

    #[test]
    fn test_block_site_with_comment_lead() {
        let t = Template::parse("def f():\n    # {{INSERT_BODY}}\n    pass\n").unwrap();
        let p = t.placeholder("BODY").unwrap();
        assert_eq!(p.line, 1);
        assert_eq!(
            p.site,
            PlaceholderSite::Block {
                indent: "    ".to_string()
            }
        );
    }

    #[test]
    fn test_inline_site() {
        let t = Template::parse("result = {{INSERT_A}}").unwrap();
        let p = t.placeholder("A").unwrap();
        assert!(matches!(p.site, PlaceholderSite::Inline { .. }));
    }

    #[test]
    fn test_two_markers_on_one_line_are_inline() {
        let t = Template::parse("{{INSERT_A}}{{INSERT_B}}").unwrap();
        assert_eq!(t.placeholders().len(), 2);
        assert!(t
            .placeholders()
            .iter()
            .all(|p| matches!(p.site, PlaceholderSite::Inline { .. })));
    }

    #[test]
    fn test_duplicate_placeholder_rejected() {
        let err = Template::parse("{{INSERT_A}}\nx = {{INSERT_A}}").unwrap_err();
        assert!(matches!(err, OptisynthError::AssemblyFailure(_)));
    }

    #[test]
    fn test_default_template_has_both_insertion_points() {
        let t = Template::optimization_default().unwrap();
        assert!(t.contains("OBJECTIVE_FUNCTION"));
        assert!(t.contains("OPTIMIZATION_ALGORITHM"));
        assert_eq!(t.placeholders()[0].name, "OBJECTIVE_FUNCTION");
        assert_eq!(t.placeholders()[0].site.indent(), "        ");
    }
}
