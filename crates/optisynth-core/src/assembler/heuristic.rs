//! Line-based fragment splitting used when the syntax tree is unusable.
//!
//! Never fails: column-zero class blocks are lifted out as declarations,
//! top-level function headers (and their decorators) are dropped, and the
//! remaining lines are dedented.

use super::normalize::{dedent, indent_width, is_declaration_header, string_continuation_rows};

fn at_top_level(line: &str) -> bool {
    !line.trim().is_empty() && indent_width(line) == 0
}

fn ends_header(line: &str) -> bool {
    line.trim_end().ends_with(':') || line.trim_end().ends_with('{')
}

pub fn split_heuristic(code: &str) -> (String, Vec<String>) {
    let mut body: Vec<&str> = Vec::new();
    let mut declarations: Vec<String> = Vec::new();
    let mut class_block: Option<Vec<&str>> = None;
    let mut decorators: Vec<&str> = Vec::new();
    let mut skipping_header = false;

    for (line, in_string) in code.split('\n').zip(string_continuation_rows(code)) {
        let stripped = line.trim();
        // String content never starts a statement, whatever its column.
        let top = !in_string && at_top_level(line);

        if skipping_header {
            if ends_header(line) {
                skipping_header = false;
            }
            continue;
        }

        if let Some(block) = class_block.as_mut() {
            if !top {
                block.push(line);
                continue;
            }
            if let Some(done) = class_block.take() {
                declarations.push(done.join("\n").trim_end().to_string());
            }
        }

        if !top {
            body.append(&mut decorators);
            body.push(line);
            continue;
        }

        if stripped.starts_with('@') {
            decorators.push(line);
            continue;
        }

        if stripped.starts_with("class ") {
            let mut block = std::mem::take(&mut decorators);
            block.push(line);
            class_block = Some(block);
            continue;
        }

        if is_declaration_header(stripped) {
            decorators.clear();
            skipping_header = !ends_header(line);
            continue;
        }

        body.append(&mut decorators);
        body.push(line);
    }

    if let Some(done) = class_block {
        declarations.push(done.join("\n").trim_end().to_string());
    }
    body.append(&mut decorators);

    let body = dedent(&body.join("\n")).trim_matches('\n').to_string();
    (body, declarations)
}
