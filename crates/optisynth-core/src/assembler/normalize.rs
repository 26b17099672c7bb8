//! Indentation normalization for generated fragments.

/// Canonical indentation unit, in spaces.
pub const INDENT_UNIT: usize = 4;

/// Expand leading tabs to the canonical unit and strip trailing whitespace.
pub fn expand_tabs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            '\t' => out.push_str(&" ".repeat(INDENT_UNIT)),
            ' ' => out.push(' '),
            _ => break,
        }
        chars.next();
    }
    out.extend(chars);
    out.truncate(out.trim_end().len());
    out
}

/// Number of leading spaces.
pub fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Advance the triple-quote state across one line. Comments and
/// single-line strings are skipped so their quotes do not count.
fn scan_line(line: &str, mut open: Option<&'static [u8]>) -> Option<&'static [u8]> {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if let Some(quote) = open {
            if bytes[i] == b'\\' {
                i += 2;
            } else if bytes[i..].starts_with(quote) {
                open = None;
                i += quote.len();
            } else {
                i += 1;
            }
            continue;
        }
        match bytes[i] {
            b'#' => break,
            q @ (b'"' | b'\'') => {
                let triple: &'static [u8] = if q == b'"' { b"\"\"\"" } else { b"'''" };
                if bytes[i..].starts_with(triple) {
                    open = Some(triple);
                    i += triple.len();
                    continue;
                }
                i += 1;
                while i < bytes.len() && bytes[i] != q {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    open
}

/// For each line of `code`, whether it starts inside a triple-quoted
/// string. Such lines are string content and keep their exact text.
pub fn string_continuation_rows(code: &str) -> Vec<bool> {
    let mut open = None;
    code.split('\n')
        .map(|line| {
            let inside = open.is_some();
            open = scan_line(line, open);
            inside
        })
        .collect()
}

/// True when `stripped` opens a function or class declaration.
pub fn is_declaration_header(stripped: &str) -> bool {
    stripped.starts_with("def ")
        || stripped.starts_with("async def ")
        || stripped.starts_with("class ")
        || stripped.starts_with("function ")
}

fn opens_block(stripped: &str) -> bool {
    let code = match stripped.find(" #") {
        Some(pos) if !stripped[..pos].contains(['"', '\'']) => &stripped[..pos],
        _ => stripped,
    };
    code.trim_end().ends_with(':')
}

/// Rewrite a fragment so its first non-blank line sits at column zero and
/// each nesting level uses [`INDENT_UNIT`] spaces.
///
/// The source unit is taken from the first indentation increase after a
/// block opener, falling back to the smallest positive indentation.
pub fn normalize_indentation(code: &str) -> String {
    let inside = string_continuation_rows(code);
    let all: Vec<(String, bool)> = code
        .split('\n')
        .zip(inside)
        .map(|(line, s)| if s { (line.to_string(), true) } else { (expand_tabs(line), false) })
        .collect();
    let Some(first) = all.iter().position(|(l, _)| !is_blank(l)) else {
        return String::new();
    };
    let last = all.iter().rposition(|(l, _)| !is_blank(l)).unwrap_or(first);
    let lines = &all[first..=last];

    let base = indent_width(&lines[0].0);
    let relative = |l: &str| indent_width(l).saturating_sub(base);
    let code_lines = move || lines.iter().filter(|(l, s)| !s && !is_blank(l)).map(|(l, _)| l.as_str());

    let mut unit = None;
    let mut prev: Option<&str> = None;
    for line in code_lines() {
        if let Some(p) = prev {
            let (a, b) = (relative(p), relative(line));
            if opens_block(p.trim()) && b > a {
                unit = Some(b - a);
                break;
            }
        }
        prev = Some(line);
    }
    let unit = unit
        .or_else(|| code_lines().map(relative).filter(|w| *w > 0).min())
        .unwrap_or(INDENT_UNIT);

    lines
        .iter()
        .map(|(line, in_string)| {
            if *in_string {
                line.clone()
            } else if is_blank(line) {
                String::new()
            } else {
                let level = relative(line) / unit;
                format!("{}{}", " ".repeat(level * INDENT_UNIT), line.trim_start())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Clone, Copy)]
enum DocState {
    Idle,
    InHeader(usize),
    AfterHeader(usize),
    InDocstring { indent: usize, quote: &'static str },
}

fn docstring_opening(stripped: &str) -> Option<(&'static str, usize)> {
    let prefix = stripped
        .chars()
        .take_while(|c| matches!(c, 'r' | 'R' | 'u' | 'U' | 'b' | 'B'))
        .count();
    let rest = &stripped[prefix..];
    ["\"\"\"", "'''"]
        .into_iter()
        .find(|q| rest.starts_with(q))
        .map(|q| (q, prefix + q.len()))
}

/// Pin docstrings that directly follow a `def`/`class` header to one level
/// deeper than the header, so they cannot break the enclosing block.
pub fn pin_docstrings(code: &str) -> String {
    let mut out = Vec::new();
    let mut state = DocState::Idle;

    for (line, in_string) in code.split('\n').zip(string_continuation_rows(code)) {
        let stripped = line.trim();
        if in_string && !matches!(state, DocState::InDocstring { .. }) {
            out.push(line.to_string());
            continue;
        }
        match state {
            DocState::InDocstring { indent, quote } => {
                if stripped.is_empty() {
                    out.push(String::new());
                } else {
                    out.push(format!("{}{}", " ".repeat(indent), stripped));
                }
                if stripped.contains(quote) {
                    state = DocState::Idle;
                }
                continue;
            }
            _ if stripped.is_empty() => {
                out.push(line.to_string());
                continue;
            }
            DocState::AfterHeader(header) => {
                if let Some((quote, open_len)) = docstring_opening(stripped) {
                    let indent = header + INDENT_UNIT;
                    out.push(format!("{}{}", " ".repeat(indent), stripped));
                    state = if stripped[open_len..].contains(quote) {
                        DocState::Idle
                    } else {
                        DocState::InDocstring { indent, quote }
                    };
                    continue;
                }
                state = DocState::Idle;
            }
            DocState::InHeader(header) => {
                out.push(line.to_string());
                if opens_block(stripped) {
                    state = DocState::AfterHeader(header);
                }
                continue;
            }
            DocState::Idle => {}
        }

        out.push(line.to_string());
        if is_declaration_header(stripped) {
            let header = indent_width(line);
            state = if opens_block(stripped) {
                DocState::AfterHeader(header)
            } else {
                DocState::InHeader(header)
            };
        }
    }

    out.join("\n")
}

/// Remove the common leading indentation of all non-blank code lines.
/// String content lines are left as they are.
pub fn dedent(code: &str) -> String {
    let min = code
        .split('\n')
        .zip(string_continuation_rows(code))
        .filter(|(l, s)| !s && !is_blank(l))
        .map(|(l, _)| indent_width(l))
        .min()
        .unwrap_or(0);
    dedent_by(code, min)
}

/// Strip up to `width` leading spaces from every code line.
pub fn dedent_by(code: &str, width: usize) -> String {
    code.split('\n')
        .zip(string_continuation_rows(code))
        .map(|(l, in_string)| {
            if in_string {
                l
            } else if is_blank(l) {
                ""
            } else {
                &l[indent_width(l).min(width)..]
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Dedent `code`, then prefix every non-blank code line with `indent`.
pub fn reindent(code: &str, indent: &str) -> String {
    let code = dedent(code);
    code.split('\n')
        .zip(string_continuation_rows(&code))
        .map(|(l, in_string)| {
            if in_string || l.is_empty() {
                l.to_string()
            } else {
                format!("{indent}{l}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
