//! Fragment assembly: merge generated code fragments into a template.
//!
//! Each fragment is normalized, split into a statement body plus class
//! declarations, and inserted at its placeholder. Declarations are hoisted
//! to module level ahead of the first top-level definition after the
//! imports. Assembly never fails on fragment content: when the syntax tree
//! is unusable the line heuristic takes over and a warning is recorded.

pub mod heuristic;
pub mod hoist;
pub mod normalize;
pub mod structural;
pub mod template;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::AssembledProgram;

pub use structural::syntax_check;
pub use template::{Placeholder, PlaceholderSite, Template};

/// Non-fatal conditions observed during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssemblyWarning {
    /// A fragment named a placeholder the template does not contain.
    UnknownPlaceholder { name: String },
    /// The fragment did not parse; the line heuristic was used.
    StructuralFallback { name: String },
    /// A multi-line body was forced into an inline site.
    MultilineInline { name: String },
}

impl fmt::Display for AssemblyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPlaceholder { name } => {
                write!(f, "fragment for unknown placeholder {name} was ignored")
            }
            Self::StructuralFallback { name } => {
                write!(f, "fragment {name} did not parse; used line heuristic")
            }
            Self::MultilineInline { name } => {
                write!(f, "multi-line fragment {name} inserted at inline site")
            }
        }
    }
}

/// A fragment split into its insertable body and hoistable declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentSplit {
    Parsed {
        body: String,
        declarations: Vec<String>,
    },
    Fallback {
        body: String,
        declarations: Vec<String>,
    },
}

impl FragmentSplit {
    /// Normalize and split raw fragment text. Placeholder markers inside
    /// the fragment are removed first.
    pub fn split(raw: &str) -> Self {
        let cleaned = match template::placeholder_regex() {
            Ok(re) => re.replace_all(raw, "").into_owned(),
            Err(_) => raw.to_string(),
        };
        let normalized =
            normalize::pin_docstrings(&normalize::normalize_indentation(&cleaned));
        if normalized.trim().is_empty() {
            return Self::Parsed {
                body: String::new(),
                declarations: Vec::new(),
            };
        }
        match structural::split_structural(&normalized) {
            Some((body, declarations)) => Self::Parsed { body, declarations },
            None => {
                let (body, declarations) = heuristic::split_heuristic(&normalized);
                Self::Fallback { body, declarations }
            }
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Self::Parsed { body, .. } | Self::Fallback { body, .. } => body,
        }
    }

    pub fn declarations(&self) -> &[String] {
        match self {
            Self::Parsed { declarations, .. } | Self::Fallback { declarations, .. } => {
                declarations
            }
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Result of one assembly.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub program: AssembledProgram,
    pub warnings: Vec<AssemblyWarning>,
    /// Number of declarations hoisted to module level.
    pub hoisted: usize,
}

/// Collapse a statement body into something that fits on one line.
fn inline_text(name: &str, body: &str, indent: &str, warnings: &mut Vec<AssemblyWarning>) -> String {
    let lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
    match lines.as_slice() {
        [] => String::new(),
        [single] => {
            let single = single.trim();
            match single.strip_prefix("return") {
                Some("") => "None".to_string(),
                Some(rest) if rest.starts_with([' ', '(']) => rest.trim().to_string(),
                _ => single.to_string(),
            }
        }
        _ => {
            warnings.push(AssemblyWarning::MultilineInline {
                name: name.to_string(),
            });
            normalize::reindent(body, indent)
                .trim_start()
                .to_string()
        }
    }
}

/// Stateless template/fragment merger.
#[derive(Debug, Default, Clone, Copy)]
pub struct FragmentAssembler;

impl FragmentAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Merge `fragments` (placeholder name to raw text) into `template`.
    ///
    /// Placeholders without a fragment, or with a blank one, are removed.
    /// Fragments for unknown placeholders are reported and dropped.
    pub fn assemble(&self, template: &Template, fragments: &BTreeMap<String, String>) -> Assembly {
        let mut warnings = Vec::new();

        for name in fragments.keys() {
            if !template.contains(name) {
                warnings.push(AssemblyWarning::UnknownPlaceholder { name: name.clone() });
            }
        }

        let mut declarations: Vec<String> = Vec::new();
        let mut block_bodies: BTreeMap<usize, Option<String>> = BTreeMap::new();
        let mut inline_texts: BTreeMap<String, String> = BTreeMap::new();

        for placeholder in template.placeholders() {
            let raw = fragments
                .get(&placeholder.name)
                .map(String::as_str)
                .unwrap_or("");
            let split = FragmentSplit::split(raw);
            if split.is_fallback() {
                warnings.push(AssemblyWarning::StructuralFallback {
                    name: placeholder.name.clone(),
                });
            }
            declarations.extend(
                split
                    .declarations()
                    .iter()
                    .filter(|d| !d.trim().is_empty())
                    .cloned(),
            );

            match &placeholder.site {
                PlaceholderSite::Block { indent } => {
                    let body = split.body();
                    let replacement =
                        (!body.trim().is_empty()).then(|| normalize::reindent(body, indent));
                    block_bodies.insert(placeholder.line, replacement);
                }
                PlaceholderSite::Inline { indent } => {
                    let text = inline_text(&placeholder.name, split.body(), indent, &mut warnings);
                    inline_texts.insert(placeholder.name.clone(), text);
                }
            }
        }

        let lines: Vec<&str> = template.source().split('\n').collect();
        let placeholder_rows: Vec<usize> = template.placeholders().iter().map(|p| p.line).collect();
        let hoist_at = hoist::hoist_index(&lines, &placeholder_rows);

        let hoisted_block: Vec<String> = if declarations.is_empty() {
            Vec::new()
        } else {
            let mut block = Vec::new();
            if hoist_at > 0 && !lines[hoist_at - 1].trim().is_empty() {
                block.push(String::new());
            }
            block.push(declarations.join("\n\n\n"));
            block.push(String::new());
            block.push(String::new());
            block
        };

        let mut out: Vec<String> = Vec::with_capacity(lines.len() + hoisted_block.len());
        for (row, line) in lines.iter().enumerate() {
            if row == hoist_at {
                out.extend(hoisted_block.iter().cloned());
            }
            if let Some(replacement) = block_bodies.get(&row) {
                if let Some(text) = replacement {
                    out.push(text.clone());
                }
                continue;
            }
            if placeholder_rows.contains(&row) {
                let mut rendered = line.to_string();
                for p in template.placeholders().iter().filter(|p| p.line == row) {
                    let text = inline_texts.get(&p.name).map(String::as_str).unwrap_or("");
                    rendered = rendered.replace(&Template::marker(&p.name), text);
                }
                out.push(rendered);
                continue;
            }
            out.push(line.to_string());
        }
        if hoist_at >= lines.len() {
            out.extend(hoisted_block);
        }

        Assembly {
            program: AssembledProgram::new(out.join("\n")),
            warnings,
            hoisted: declarations.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_inline_return_becomes_expression() {
        let t = Template::parse("result = {{INSERT_A}}\nprint(result)").unwrap();
        let a = FragmentAssembler::new().assemble(&t, &fragments(&[("A", "def a():\n    return 42")]));
        assert_eq!(a.program.source(), "result = 42\nprint(result)");
        assert!(a.warnings.is_empty());
    }

    #[test]
    fn test_block_body_indented_at_site() {
        let t = Template::parse("class S:\n    def f(self, x):\n        # {{INSERT_OBJ}}\n        pass\n").unwrap();
        let a = FragmentAssembler::new().assemble(
            &t,
            &fragments(&[("OBJ", "def objective(x):\n  y = x * x\n  return y")]),
        );
        assert_eq!(
            a.program.source(),
            "class S:\n    def f(self, x):\n        y = x * x\n        return y\n        pass\n"
        );
    }

    #[test]
    fn test_missing_fragment_removes_placeholder_line() {
        let t = Template::parse("def f():\n    # {{INSERT_A}}\n    pass").unwrap();
        let a = FragmentAssembler::new().assemble(&t, &BTreeMap::new());
        assert_eq!(a.program.source(), "def f():\n    pass");
    }

    #[test]
    fn test_unknown_fragment_reported() {
        let t = Template::parse("x = 1").unwrap();
        let a = FragmentAssembler::new().assemble(&t, &fragments(&[("NOPE", "y = 2")]));
        assert_eq!(a.program.source(), "x = 1");
        assert_eq!(
            a.warnings,
            vec![AssemblyWarning::UnknownPlaceholder {
                name: "NOPE".into()
            }]
        );
    }

    #[test]
    fn test_class_hoisted_before_first_definition() {
        let t = Template::parse("import os\n\ndef main():\n    # {{INSERT_A}}\n    pass\n").unwrap();
        let a = FragmentAssembler::new().assemble(
            &t,
            &fragments(&[("A", "class Helper:\n    k = 3\n\ndef a():\n    return Helper.k")]),
        );
        assert_eq!(a.hoisted, 1);
        assert_eq!(
            a.program.source(),
            "import os\n\nclass Helper:\n    k = 3\n\n\ndef main():\n    return Helper.k\n    pass\n"
        );
    }

    #[test]
    fn test_unparseable_fragment_falls_back() {
        let t = Template::parse("def f():\n    # {{INSERT_A}}\n    pass").unwrap();
        let a = FragmentAssembler::new().assemble(&t, &fragments(&[("A", "def a(:\n    return 1 +")]));
        assert!(a
            .warnings
            .contains(&AssemblyWarning::StructuralFallback { name: "A".into() }));
        assert!(a.program.source().contains("    return 1 +"));
    }

    #[test]
    fn test_markers_in_fragment_stripped() {
        let split = FragmentSplit::split("x = 1  # {{INSERT_B}}");
        assert!(!split.body().contains("INSERT_B"));
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let t = Template::optimization_default().unwrap();
        let f = fragments(&[
            ("OBJECTIVE_FUNCTION", "def f(x):\n    return sum(v * v for v in x)"),
            ("OPTIMIZATION_ALGORITHM", "class Solver:\n    pass\n\ndef solve():\n    return {'a': {'objective': 0.0}}"),
        ]);
        let first = FragmentAssembler::new().assemble(&t, &f);
        let second = FragmentAssembler::new().assemble(&t, &f);
        assert_eq!(first.program, second.program);
        assert!(!first.program.source().contains("{{INSERT_"));
    }
}
