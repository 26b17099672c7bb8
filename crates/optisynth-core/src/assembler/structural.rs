//! Syntax-tree fragment splitting backed by tree-sitter's Python grammar.

use tree_sitter::{Node, Parser, Tree};

use super::normalize::{dedent, dedent_by};

fn parse(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .ok()?;
    parser.parse(source, None)
}

/// Last source row a node actually occupies. tree-sitter reports the end of
/// a trailing newline as column 0 of the following row.
fn last_row(node: &Node) -> usize {
    let end = node.end_position();
    if end.column == 0 && end.row > node.start_position().row {
        end.row - 1
    } else {
        end.row
    }
}

fn rows(lines: &[&str], from: usize, to: usize) -> String {
    let to = to.min(lines.len().saturating_sub(1));
    if from > to {
        return String::new();
    }
    lines[from..=to].join("\n").trim_end().to_string()
}

fn colon_row(def: &Node) -> Option<usize> {
    (0..def.child_count())
        .filter_map(|i| def.child(i))
        .find(|c| c.kind() == ":")
        .map(|c| c.end_position().row)
}

/// Body statements of a function definition, dedented to column zero.
fn function_body(lines: &[&str], source: &str, def: &Node) -> String {
    let Some(body) = def.child_by_field_name("body") else {
        return String::new();
    };
    let colon = colon_row(def).unwrap_or_else(|| def.start_position().row);

    let mut cursor = body.walk();
    let leads_with_comment = body
        .named_children(&mut cursor)
        .next()
        .is_some_and(|n| n.kind() == "comment");
    // Statement column, not the minimum over all rows: string content may
    // sit further left than the code around it.
    let column = body
        .named_children(&mut cursor)
        .find(|n| n.kind() != "comment")
        .map_or(body.start_position().column, |n| n.start_position().column);

    if body.start_position().row == colon && !leads_with_comment {
        return body
            .utf8_text(source.as_bytes())
            .unwrap_or("")
            .trim()
            .to_string();
    }
    dedent_by(&rows(lines, colon + 1, last_row(def)), column)
}

/// Split a normalized fragment into its statement body and the class
/// declarations that must be hoisted to module level.
///
/// Returns `None` when the grammar cannot be loaded or the fragment does not
/// parse cleanly; callers fall back to the line heuristic.
pub fn split_structural(code: &str) -> Option<(String, Vec<String>)> {
    let tree = parse(code)?;
    let root = tree.root_node();
    if root.has_error() {
        return None;
    }

    let lines: Vec<&str> = code.split('\n').collect();
    let mut body_parts: Vec<String> = Vec::new();
    let mut declarations = Vec::new();
    // First row not yet consumed; trailing comments share a row with the
    // statement before them.
    let mut next_row = 0usize;

    let mut cursor = root.walk();
    for node in root.named_children(&mut cursor) {
        let start = node.start_position().row.max(next_row);
        let end = last_row(&node);
        if start > end {
            continue;
        }
        next_row = end + 1;

        let definition = match node.kind() {
            "decorated_definition" => node.child_by_field_name("definition"),
            "class_definition" | "function_definition" => Some(node),
            _ => None,
        };

        match definition.map(|d| (d.kind(), d)) {
            Some(("class_definition", _)) => declarations.push(rows(&lines, start, end)),
            Some(("function_definition", def)) => {
                let body = function_body(&lines, code, &def);
                if !body.trim().is_empty() {
                    body_parts.push(body);
                }
            }
            _ => body_parts.push(dedent(&rows(&lines, start, end))),
        }
    }

    Some((body_parts.join("\n"), declarations))
}

/// Report the first syntax problem in an assembled program, if any.
///
/// Returns `None` for clean programs and when no grammar is available.
pub fn syntax_check(source: &str) -> Option<String> {
    let tree = parse(source)?;
    let root = tree.root_node();
    if !root.has_error() {
        return None;
    }

    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            let line = source.split('\n').nth(pos.row).unwrap_or("").trim();
            let what = if node.is_missing() {
                format!("missing {}", node.kind())
            } else {
                "unexpected input".to_string()
            };
            return Some(format!("syntax error near line {}: {what}: {line}", pos.row + 1));
        }
        for i in (0..node.child_count()).rev() {
            if let Some(child) = node.child(i) {
                if child.has_error() || child.is_missing() {
                    stack.push(child);
                }
            }
        }
    }
    Some(format!(
        "syntax error near line {}",
        root.start_position().row + 1
    ))
}
