//! Plain-text story normalization.
//!
//! The generation service is told to return a bare title line followed by
//! paragraphs, but routinely decorates its output with Markdown anyway.
//! [`normalize`] removes that decoration so every stored story has the same
//! shape: one clean title line, then the body, no emphasis or heading markers.

/// Normalizes raw service output into a title line plus body.
///
/// The result never contains `*`, backticks, `__`, leading `#` markers or a
/// `Title:` label on its first line, and `normalize(normalize(t)) ==
/// normalize(t)` for any `t`.
pub fn normalize(raw: &str) -> String {
    let stripped = strip_inline_markers(raw);

    let mut lines: Vec<String> = Vec::new();
    let mut has_title = false;
    for line in stripped.lines() {
        if !has_title {
            let title = clean_title(line);
            if title.is_empty() {
                continue;
            }
            lines.push(title);
            has_title = true;
            continue;
        }
        lines.push(strip_heading_marker(line).trim_end().to_owned());
    }

    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

fn strip_inline_markers(text: &str) -> String {
    let mut out: String = text.chars().filter(|c| !matches!(c, '*' | '`')).collect();
    while out.contains("__") {
        out = out.replace("__", "");
    }
    out
}

fn strip_heading_marker(line: &str) -> &str {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return line;
    }
    trimmed
        .trim_start_matches(|c: char| c == '#' || c.is_whitespace())
        .trim_end_matches(|c: char| c == '#' || c.is_whitespace())
}

fn clean_title(line: &str) -> String {
    let mut title = trim_residue(line).to_owned();
    loop {
        let next = trim_residue(strip_title_label(&title));
        if next == title {
            return title;
        }
        title = next.to_owned();
    }
}

/// Drops punctuation and symbols (including heading markers and quotes)
/// around a title.
fn trim_residue(text: &str) -> &str {
    text.trim_matches(|c: char| !c.is_alphanumeric())
}

/// Strips a leading `Title`, `Title:` or `Title -` label, case-insensitively.
fn strip_title_label(text: &str) -> &str {
    const LABEL: &str = "title";

    let Some(head) = text.get(..LABEL.len()) else {
        return text;
    };
    if !head.eq_ignore_ascii_case(LABEL) {
        return text;
    }

    let rest = &text[LABEL.len()..];
    match rest.chars().next() {
        None => rest,
        Some(c) if c.is_whitespace() || matches!(c, ':' | '-' | '–' | '—' | '.') => rest,
        Some(_) => text,
    }
}
