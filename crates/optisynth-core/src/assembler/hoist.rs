//! Where hoisted declarations land in a template.

use super::normalize::string_continuation_rows;

fn is_import(line: &str) -> bool {
    let top = !line.starts_with([' ', '\t']);
    top && (line.starts_with("import ") || (line.starts_with("from ") && line.contains(" import ")))
}

fn is_top_level_declaration(line: &str) -> bool {
    line.starts_with("def ")
        || line.starts_with("async def ")
        || line.starts_with("class ")
        || line.starts_with('@')
}

/// Row of the last line belonging to the import block, following
/// parenthesized and backslash continuations.
fn import_block_end(lines: &[&str]) -> Option<usize> {
    let mut end = None;
    let mut row = 0;
    while row < lines.len() {
        if is_import(lines[row]) {
            let mut last = row;
            if lines[row].contains('(') && !lines[row].contains(')') {
                while last + 1 < lines.len() && !lines[last].contains(')') {
                    last += 1;
                }
            }
            while last + 1 < lines.len() && lines[last].trim_end().ends_with('\\') {
                last += 1;
            }
            end = Some(last);
            row = last + 1;
        } else {
            row += 1;
        }
    }
    end
}

/// Top-level statement that encloses `row`: the nearest earlier column-0
/// code line, widened upward over its decorators.
fn enclosing_top_level(lines: &[&str], in_string: &[bool], row: usize) -> usize {
    let Some(mut top) = (0..row).rev().find(|r| {
        let line = lines[*r];
        !in_string[*r]
            && !line.trim().is_empty()
            && !line.starts_with([' ', '\t', '#'])
    }) else {
        return 0;
    };
    while top > 0 && lines[top - 1].starts_with('@') {
        top -= 1;
    }
    top
}

/// Index of the template line before which hoisted declarations are
/// inserted: the first top-level declaration or placeholder anchor after the
/// imports, else directly after the imports, else the start of the file.
///
/// A placeholder nested in a block anchors on the top-level statement that
/// opens the block, so declarations never land inside it.
pub fn hoist_index(lines: &[&str], placeholder_rows: &[usize]) -> usize {
    let in_string = string_continuation_rows(&lines.join("\n"));
    let start = import_block_end(lines).map_or(0, |end| end + 1);
    let anchors: Vec<usize> = placeholder_rows
        .iter()
        .map(|&row| {
            if lines[row].starts_with([' ', '\t']) {
                enclosing_top_level(lines, &in_string, row)
            } else {
                row
            }
        })
        .collect();
    (start..lines.len())
        .find(|row| {
            (!in_string[*row] && is_top_level_declaration(lines[*row])) || anchors.contains(row)
        })
        .unwrap_or(start)
}
