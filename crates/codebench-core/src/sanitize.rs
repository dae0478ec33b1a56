//! Completion sanitizer.
//!
//! Turns raw backend text into a function-body fragment that can be appended
//! to a problem prompt (signature + docstring). The prompt's docstring fixes
//! the function block at one indent level, so every sanitized body starts at
//! exactly four spaces.
//!
//! Steps, in order:
//! 1. strip code fences
//! 2. remove an echoed signature
//! 3. re-indent to one level
//! 4. drop trailing prose
//! 5. guarantee one trailing newline
//!
//! Each step is idempotent, so `sanitize(sanitize(x)) == sanitize(x)`.

use std::sync::LazyLock;

use regex::Regex;

const INDENT: &str = "    ";
const BODY_LEVEL: usize = INDENT.len();

static DEF_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("valid regex")
});

const PY_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "case", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "match", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "type", "while", "with", "yield",
];

/// Why a completion could not be turned into a function body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Unsanitizable {
    #[error("completion contains no code")]
    Empty,

    #[error("line {line} mixes tabs and spaces in its indentation")]
    MixedIndentation { line: usize },

    #[error("unexpected indent at line {line}")]
    UnexpectedIndent { line: usize },

    #[error("line {line} dedents to an unknown indentation level")]
    InconsistentDedent { line: usize },
}

/// Sanitize `raw` into a body for the function declared by `signature`.
///
/// `signature` is the `def name(...):` header of the problem; only the
/// function name is used, to recognise echoed headers. Pass an empty string
/// to skip echo removal.
pub fn sanitize(raw: &str, signature: &str) -> Result<String, Unsanitizable> {
    let text = raw.replace("\r\n", "\n");
    let lines = strip_code_fences(&text);
    let lines = strip_signature_echo(lines, function_name(signature));
    let lines = reindent(lines)?;
    let lines = drop_trailing_prose(lines);
    finish(lines)
}

/// Name of the function declared by a `def` header, if any.
pub fn function_name(signature: &str) -> Option<&str> {
    DEF_HEADER
        .captures(signature)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

fn is_code(line: &str) -> bool {
    !is_blank(line) && !is_comment(line)
}

fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

fn trim_blank_edges(mut lines: Vec<String>) -> Vec<String> {
    while lines.last().is_some_and(|l| is_blank(l)) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|l| is_blank(l)).count();
    lines.drain(..leading);
    lines
}

/// Step 1. Keep the first fenced block, or what surrounds a lone fence.
fn strip_code_fences(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let fences: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| is_fence(l))
        .map(|(i, _)| i)
        .collect();

    let kept: &[&str] = match fences.as_slice() {
        [] => &lines,
        [only] if lines[..*only].iter().all(|l| is_blank(l)) => &lines[only + 1..],
        [only] => &lines[..*only],
        [open, close, ..] => &lines[open + 1..*close],
    };
    trim_blank_edges(kept.iter().map(|l| l.to_string()).collect())
}

/// Step 2. Remove everything through the last echoed header that precedes
/// the first indented line.
fn strip_signature_echo(lines: Vec<String>, name: Option<&str>) -> Vec<String> {
    let Some(name) = name else {
        return lines;
    };

    let mut cut = None;
    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        if is_blank(line) {
            i += 1;
            continue;
        }
        if indent_width(line) > 0 {
            break;
        }
        if function_name(line) == Some(name) {
            let end = header_end(&lines, i);
            cut = Some(end);
            i = end + 1;
            continue;
        }
        i += 1;
    }

    match cut {
        Some(end) => trim_blank_edges(lines[end + 1..].to_vec()),
        None => lines,
    }
}

/// Index of the line that closes a (possibly multi-line) `def` header.
fn header_end(lines: &[String], start: usize) -> usize {
    let mut scanner = Scanner::default();
    for (offset, line) in lines[start..].iter().enumerate() {
        scanner.feed(line);
        if scanner.depth == 0 {
            return start + offset;
        }
    }
    lines.len() - 1
}

/// Step 3. Normalize tabs and move the body to one indent level.
fn reindent(lines: Vec<String>) -> Result<Vec<String>, Unsanitizable> {
    let mut out = Vec::with_capacity(lines.len());
    for (n, line) in lines.into_iter().enumerate() {
        if is_blank(&line) {
            out.push(String::new());
            continue;
        }
        let width = indent_width(&line);
        let lead = &line[..width];
        if lead.contains('\t') {
            if lead.contains(' ') {
                return Err(Unsanitizable::MixedIndentation { line: n + 1 });
            }
            out.push(format!("{}{}", INDENT.repeat(width), &line[width..]));
        } else {
            out.push(line);
        }
    }

    let code: Vec<usize> = (0..out.len()).filter(|&i| is_code(&out[i])).collect();
    let Some(&first) = code.first() else {
        return Ok(out);
    };
    let base = indent_width(&out[first]);

    if base == 0 {
        let only_first_flush = code.len() > 1
            && !strip_comment(&out[first]).trim_end().ends_with(':')
            && code[1..]
                .iter()
                .all(|&i| indent_width(&out[i]) >= BODY_LEVEL);
        for (i, line) in out.iter_mut().enumerate() {
            if line.is_empty() || (only_first_flush && i != first) {
                continue;
            }
            line.insert_str(0, INDENT);
        }
    } else if base != BODY_LEVEL {
        for line in out.iter_mut() {
            let width = indent_width(line);
            if line.is_empty() || width < base {
                continue;
            }
            *line = format!("{}{}", " ".repeat(width - base + BODY_LEVEL), &line[width..]);
        }
    }
    Ok(out)
}

/// Step 4. Cut at the first line that closes the body: a dedent below the
/// body level or natural-language text after a completed statement.
fn drop_trailing_prose(lines: Vec<String>) -> Vec<String> {
    let mut scanner = Scanner::default();
    let mut seen_code = false;
    let mut statement_open = false;

    for (i, line) in lines.iter().enumerate() {
        if !is_code(line) && scanner.at_statement_start() {
            continue;
        }
        if scanner.at_statement_start() {
            let indent = indent_width(line);
            if seen_code && indent < BODY_LEVEL {
                return lines[..i].to_vec();
            }
            if seen_code
                && indent == BODY_LEVEL
                && !statement_open
                && looks_like_prose(line.trim())
            {
                return lines[..i].to_vec();
            }
            seen_code = true;
        }
        scanner.feed(line);
        let code = strip_comment(line).trim_end();
        scanner.continued = code.ends_with('\\');
        if scanner.depth == 0 && scanner.triple.is_none() {
            statement_open = code.ends_with(':') || code.ends_with('\\');
        }
    }
    lines
}

/// Step 5 plus structural validation.
fn finish(lines: Vec<String>) -> Result<String, Unsanitizable> {
    let lines = trim_blank_edges(lines);
    if !lines.iter().any(|l| is_code(l)) {
        return Err(Unsanitizable::Empty);
    }
    validate_indentation(&lines)?;

    let mut body = lines.join("\n");
    body.push('\n');
    Ok(body)
}

/// Indents must follow a block opener; dedents must land on an enclosing level.
fn validate_indentation(lines: &[String]) -> Result<(), Unsanitizable> {
    let mut scanner = Scanner::default();
    let mut stack: Vec<usize> = Vec::new();
    let mut opens_block = false;

    for (n, line) in lines.iter().enumerate() {
        let at_start = scanner.at_statement_start();
        if at_start && !is_code(line) {
            continue;
        }
        if at_start {
            let indent = indent_width(line);
            match stack.last().copied() {
                None => stack.push(indent),
                Some(top) if indent > top => {
                    if !opens_block {
                        return Err(Unsanitizable::UnexpectedIndent { line: n + 1 });
                    }
                    stack.push(indent);
                }
                Some(top) if indent < top => {
                    while stack.last().is_some_and(|&t| t > indent) {
                        stack.pop();
                    }
                    if stack.last() != Some(&indent) {
                        return Err(Unsanitizable::InconsistentDedent { line: n + 1 });
                    }
                }
                Some(_) => {}
            }
        }
        scanner.feed(line);
        let code = strip_comment(line).trim_end();
        scanner.continued = code.ends_with('\\');
        if scanner.depth == 0 && scanner.triple.is_none() {
            opens_block = code.ends_with(':');
        }
    }
    Ok(())
}

fn looks_like_prose(text: &str) -> bool {
    if text.starts_with("- ") || text.starts_with("* ") || text.starts_with("**") {
        return true;
    }
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 && text[digits..].starts_with(". ") {
        return true;
    }

    let end = text
        .find(|c: char| !c.is_alphabetic())
        .unwrap_or(text.len());
    let word = &text[..end];
    if word.is_empty() || PY_KEYWORDS.contains(&word) {
        return false;
    }
    let rest = &text[end..];
    if rest == ":" {
        return word.chars().next().is_some_and(char::is_uppercase);
    }
    let mut chars = rest.chars();
    chars.next() == Some(' ') && chars.next().is_some_and(char::is_alphabetic)
}

/// The part of a line before a `#` comment that is not inside a string.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        match (quote, bytes[i]) {
            (Some(_), b'\\') => i += 1,
            (Some(q), b) if b == q => quote = None,
            (None, b'"') | (None, b'\'') => quote = Some(bytes[i]),
            (None, b'#') => return &line[..i],
            _ => {}
        }
        i += 1;
    }
    line
}

/// Tracks bracket depth and triple-quoted strings across lines.
#[derive(Debug, Default)]
struct Scanner {
    depth: i32,
    triple: Option<&'static [u8]>,
    continued: bool,
}

impl Scanner {
    fn at_statement_start(&self) -> bool {
        self.depth == 0 && self.triple.is_none() && !self.continued
    }

    fn feed(&mut self, line: &str) {
        let bytes = line.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if let Some(close) = self.triple {
                if bytes[i..].starts_with(close) {
                    self.triple = None;
                    i += close.len();
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
                        self.triple = Some(triple);
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
                b'(' | b'[' | b'{' => {
                    self.depth += 1;
                    i += 1;
                }
                b')' | b']' | b'}' => {
                    self.depth = (self.depth - 1).max(0);
                    i += 1;
                }
                _ => i += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIG: &str = "def add(x: int, y: int) -> int:";

    fn ok(raw: &str) -> String {
        sanitize(raw, SIG).unwrap_or_else(|e| panic!("unsanitizable: {e}\n{raw}"))
    }

    #[test]
    fn test_fenced_body_with_language_tag() {
        assert_eq!(ok("```python\n    return x + 1\n```"), "    return x + 1\n");
    }

    #[test]
    fn test_fence_round_trip_matches_bare_body() {
        let body = "    total = x + y\n    if total > 10:\n        return 10\n    return total\n";
        let fenced = format!("```python\n{}```", body);
        assert_eq!(ok(&fenced), ok(body));
        assert_eq!(ok(body), body);
    }

    #[test]
    fn test_prose_around_fenced_block_is_ignored() {
        let raw = "Here is the implementation:\n\n```py\n    return x + y\n```\n\nThis adds both numbers.";
        assert_eq!(ok(raw), "    return x + y\n");
    }

    #[test]
    fn test_unterminated_fence_keeps_following_text() {
        assert_eq!(ok("```python\n    return x + y\n"), "    return x + y\n");
    }

    #[test]
    fn test_stray_closing_fence_is_dropped() {
        assert_eq!(ok("    return x + y\n```"), "    return x + y\n");
    }

    #[test]
    fn test_echoed_signature_is_removed() {
        let raw = "def add(x: int, y: int) -> int:\n    return x + y\n";
        assert_eq!(ok(raw), "    return x + y\n");
    }

    #[test]
    fn test_echoed_signature_with_imports_and_docstring() {
        let raw = "from typing import List\n\ndef add(x, y):\n    \"\"\"Add two numbers.\"\"\"\n    return x + y\n";
        assert_eq!(ok(raw), "    \"\"\"Add two numbers.\"\"\"\n    return x + y\n");
    }

    #[test]
    fn test_multi_line_echoed_signature() {
        let raw = "def add(\n    x: int,\n    y: int,\n) -> int:\n    return x + y\n";
        assert_eq!(ok(raw), "    return x + y\n");
    }

    #[test]
    fn test_partial_name_match_is_not_an_echo() {
        let raw = "def add_one(v):\n    return v + 1\n";
        assert_eq!(
            ok(raw),
            "    def add_one(v):\n        return v + 1\n"
        );
    }

    #[test]
    fn test_last_echo_before_body_wins() {
        let raw = "def add(x, y):\n\ndef add(x: int, y: int) -> int:\n    return x + y\n";
        assert_eq!(ok(raw), "    return x + y\n");
    }

    #[test]
    fn test_second_full_definition_is_cut() {
        let raw = "def add(x, y):\n    return x + y\n\ndef add(x, y):\n    return y + x\n";
        assert_eq!(ok(raw), "    return x + y\n");
    }

    #[test]
    fn test_flat_body_is_indented() {
        let raw = "total = x + y\nif total > 10:\n    return 10\nreturn total";
        assert_eq!(
            ok(raw),
            "    total = x + y\n    if total > 10:\n        return 10\n    return total\n"
        );
    }

    #[test]
    fn test_stripped_first_line_is_reindented_alone() {
        let raw = "total = x + y\n    return total";
        assert_eq!(ok(raw), "    total = x + y\n    return total\n");
    }

    #[test]
    fn test_over_indented_body_is_rebased() {
        let raw = "        if x:\n            return y\n        return x";
        assert_eq!(ok(raw), "    if x:\n        return y\n    return x\n");
    }

    #[test]
    fn test_tabs_are_expanded() {
        assert_eq!(
            ok("\tif x:\n\t\treturn y\n\treturn x"),
            "    if x:\n        return y\n    return x\n"
        );
    }

    #[test]
    fn test_mixed_tabs_and_spaces_is_unsanitizable() {
        assert_eq!(
            sanitize("    if x:\n \treturn y", SIG),
            Err(Unsanitizable::MixedIndentation { line: 2 })
        );
    }

    #[test]
    fn test_trailing_prose_after_body_is_dropped() {
        let raw = "    return x + y\n\nThis function returns the sum of x and y.";
        assert_eq!(ok(raw), "    return x + y\n");
    }

    #[test]
    fn test_trailing_prose_after_flat_body_is_dropped() {
        let raw = "return x + y\n\nExplanation:\nWe add the numbers.";
        assert_eq!(ok(raw), "    return x + y\n");
    }

    #[test]
    fn test_markdown_list_after_body_is_dropped() {
        let raw = "    return x + y\n- adds x\n- adds y";
        assert_eq!(ok(raw), "    return x + y\n");
    }

    #[test]
    fn test_docstring_prose_is_kept() {
        let raw = "    \"\"\"\n    This text is inside a docstring.\nIt keeps going here.\n    \"\"\"\n    return x + y";
        assert_eq!(
            ok(raw),
            "    \"\"\"\n    This text is inside a docstring.\nIt keeps going here.\n    \"\"\"\n    return x + y\n"
        );
    }

    #[test]
    fn test_code_lines_are_not_prose() {
        let raw = "    result = x + y\n    print(result)\n    yield result\n    return result";
        assert_eq!(ok(raw), format!("{}\n", raw));
    }

    #[test]
    fn test_bracket_continuation_is_not_a_boundary() {
        let raw = "    values = [\n1,\n2,\n    ]\n    return sum(values)";
        assert_eq!(ok(raw), format!("{}\n", raw));
    }

    #[test]
    fn test_comment_at_column_zero_does_not_cut_body() {
        let raw = "    total = x + y\n# clamp\n    return total";
        assert_eq!(ok(raw), format!("{}\n", raw));
    }

    #[test]
    fn test_trailing_whitespace_collapses_to_one_newline() {
        assert_eq!(ok("    return x\n\n\n   \n"), "    return x\n");
    }

    #[test]
    fn test_crlf_is_normalized() {
        assert_eq!(ok("```python\r\n    return x\r\n```\r\n"), "    return x\n");
    }

    #[test]
    fn test_empty_completion_is_unsanitizable() {
        assert_eq!(sanitize("", SIG), Err(Unsanitizable::Empty));
        assert_eq!(sanitize("```python\n```", SIG), Err(Unsanitizable::Empty));
        assert_eq!(sanitize("   \n\n", SIG), Err(Unsanitizable::Empty));
    }

    #[test]
    fn test_comment_only_completion_is_unsanitizable() {
        assert_eq!(sanitize("    # TODO", SIG), Err(Unsanitizable::Empty));
    }

    #[test]
    fn test_signature_only_completion_is_unsanitizable() {
        assert_eq!(sanitize("def add(x, y):", SIG), Err(Unsanitizable::Empty));
    }

    #[test]
    fn test_unexpected_indent_is_unsanitizable() {
        assert_eq!(
            sanitize("    x = 1\n        return x", SIG),
            Err(Unsanitizable::UnexpectedIndent { line: 2 })
        );
    }

    #[test]
    fn test_inconsistent_dedent_is_unsanitizable() {
        assert_eq!(
            sanitize("    if x:\n            y = 1\n        return y", SIG),
            Err(Unsanitizable::InconsistentDedent { line: 3 })
        );
    }

    #[test]
    fn test_block_opener_with_trailing_comment() {
        let raw = "    if x:  # positive\n        return y\n    return x";
        assert_eq!(ok(raw), format!("{}\n", raw));
    }

    #[test]
    fn test_empty_signature_skips_echo_removal() {
        let out = sanitize("def add(x, y):\n    return x + y", "").expect("sanitize");
        assert_eq!(out, "    def add(x, y):\n        return x + y\n");
    }

    #[test]
    fn test_function_name_parsing() {
        assert_eq!(function_name(SIG), Some("add"));
        assert_eq!(function_name("async def fetch(url):"), Some("fetch"));
        assert_eq!(function_name("class Foo:"), None);
    }

    #[test]
    fn test_idempotence_over_fixtures() {
        let fixtures = [
            "```python\n    return x + 1\n```",
            "def add(x, y):\n    \"\"\"doc\"\"\"\n    return x + y\n",
            "total = x + y\nif total > 10:\n    return 10\nreturn total",
            "total = x + y\n    return total",
            "        if x:\n            return y\n        return x",
            "\tif x:\n\t\treturn y\n\treturn x",
            "    return x + y\n\nThis function returns the sum.",
            "Sure! Here you go:\n```\nreturn x\n```\nHope it helps.",
            "    values = [\n1,\n2,\n    ]\n    return sum(values)",
            "    total = x + y\n# clamp\n    return total",
            "def add_one(v):\n    return v + 1\n",
            "def add(x, y):\n    return x + y\n\ndef add(x, y):\n    return y + x\n",
        ];
        for raw in fixtures {
            let once = ok(raw);
            let twice = ok(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }

    /// Lines seen in real completions: fences, echoed headers, tab and flat
    /// bodies, prose, comments, open brackets and strings.
    const FRAGMENTS: &[&str] = &[
        "```python",
        "```",
        "def add(x, y):",
        "def add(x: int,",
        "        y: int) -> int:",
        "    return x + y",
        "return x + y",
        "\treturn x",
        "\tif x:",
        "\t\treturn y",
        "if x:",
        "    if x:",
        "        return y",
        "        y = 1",
        "total = x + y",
        "    total = x + y",
        "# note",
        "    # note",
        "",
        "Here is the code:",
        "This returns the sum.",
        "1. first step",
        "- bullet",
        "    s = \"\"\"",
        "    text",
        "    \"\"\"",
        "    values = [",
        "1,",
        "    ]",
        "    return total \\",
        "        + 1",
        "  x = 2",
    ];

    #[test]
    fn test_idempotence_over_generated_completions() {
        use rand::rngs::StdRng;
        use rand::seq::SliceRandom;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut sanitized = 0;
        for _ in 0..500 {
            let count = rng.gen_range(1..=8);
            let raw = (0..count)
                .filter_map(|_| FRAGMENTS.choose(&mut rng).copied())
                .collect::<Vec<_>>()
                .join("\n");
            let Ok(once) = sanitize(&raw, SIG) else {
                continue;
            };
            sanitized += 1;
            assert_eq!(
                sanitize(&once, SIG).as_ref(),
                Ok(&once),
                "not idempotent for {:?}",
                raw
            );
        }
        assert!(sanitized > 100, "only {sanitized} inputs sanitized");
    }
}
