//! Unified diff: render, parse, apply.
//!
//! Rendering goes through `similar`. Parsing and applying are line based and
//! strict: every context and removed line must match the base text exactly,
//! otherwise the patch does not apply.

use similar::TextDiff;
use thiserror::Error;

/// Context lines around each change in rendered diffs.
const CONTEXT_RADIUS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("diff is empty")]
    Empty,

    #[error("malformed hunk header at line {line}: {header}")]
    MalformedHeader { line: usize, header: String },

    #[error("unexpected line {line} outside any hunk: {text}")]
    OutsideHunk { line: usize, text: String },

    #[error("hunk at line {line} declares -{old_len}/+{new_len} but has -{old_seen}/+{new_seen}")]
    CountMismatch {
        line: usize,
        old_len: usize,
        new_len: usize,
        old_seen: usize,
        new_seen: usize,
    },

    #[error("hunks overlap or are out of order near base line {base_line}")]
    Overlap { base_line: usize },

    #[error("base line {base_line} does not match: expected {expected:?}, found {found:?}")]
    ContextMismatch {
        base_line: usize,
        expected: String,
        found: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// 1-based; for a pure insertion this is the line *after which* to insert.
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<HunkLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnifiedDiff {
    pub hunks: Vec<Hunk>,
}

impl UnifiedDiff {
    pub fn parse(text: &str) -> Result<Self, PatchError> {
        if text.trim().is_empty() {
            return Err(PatchError::Empty);
        }

        let mut hunks: Vec<Hunk> = Vec::new();
        let mut header_line = 0;
        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            if raw.starts_with("@@") {
                if let Some(prev) = hunks.last() {
                    check_counts(prev, header_line)?;
                }
                hunks.push(parse_header(raw, line_no)?);
                header_line = line_no;
                continue;
            }

            let Some(hunk) = hunks.last_mut() else {
                // file headers before the first hunk
                if raw.starts_with("---")
                    || raw.starts_with("+++")
                    || raw.starts_with("diff ")
                    || raw.starts_with("index ")
                {
                    continue;
                }
                return Err(PatchError::OutsideHunk {
                    line: line_no,
                    text: raw.to_string(),
                });
            };

            match raw.chars().next() {
                Some(' ') => hunk.lines.push(HunkLine::Context(raw[1..].to_string())),
                Some('-') => hunk.lines.push(HunkLine::Remove(raw[1..].to_string())),
                Some('+') => hunk.lines.push(HunkLine::Add(raw[1..].to_string())),
                // "\ No newline at end of file"
                Some('\\') => {}
                // some generators strip the space from empty context lines
                None => hunk.lines.push(HunkLine::Context(String::new())),
                Some(_) => {
                    return Err(PatchError::OutsideHunk {
                        line: line_no,
                        text: raw.to_string(),
                    });
                }
            }
        }

        match hunks.last() {
            Some(last) => check_counts(last, header_line)?,
            None => return Err(PatchError::Empty),
        }
        Ok(Self { hunks })
    }

    /// Lines added plus lines removed.
    pub fn changed_lines(&self) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| &h.lines)
            .filter(|l| !matches!(l, HunkLine::Context(_)))
            .count()
    }

    /// Apply to `base`, verifying every context and removed line.
    ///
    /// The result keeps the base's line ending (`\r\n` if its first line
    /// break is one) and its trailing newline.
    pub fn apply(&self, base: &str) -> Result<String, PatchError> {
        let eol = line_ending(base);
        let lines: Vec<&str> = base.lines().collect();
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        let mut cursor = 0usize;

        for hunk in &self.hunks {
            let start = if hunk.old_len == 0 {
                hunk.old_start
            } else {
                hunk.old_start.saturating_sub(1)
            };
            if start < cursor || start > lines.len() {
                return Err(PatchError::Overlap {
                    base_line: hunk.old_start,
                });
            }
            out.extend(lines[cursor..start].iter().map(|l| l.to_string()));

            let mut idx = start;
            for line in &hunk.lines {
                match line {
                    HunkLine::Context(expected) | HunkLine::Remove(expected) => {
                        let found = lines.get(idx).copied();
                        if found != Some(expected.as_str()) {
                            return Err(PatchError::ContextMismatch {
                                base_line: idx + 1,
                                expected: expected.clone(),
                                found: found.map(str::to_string),
                            });
                        }
                        if let HunkLine::Context(text) = line {
                            out.push(text.clone());
                        }
                        idx += 1;
                    }
                    HunkLine::Add(text) => out.push(text.clone()),
                }
            }
            cursor = idx;
        }
        out.extend(lines[cursor..].iter().map(|l| l.to_string()));

        let mut result = out.join(eol);
        if base.ends_with('\n') && !result.is_empty() {
            result.push_str(eol);
        }
        Ok(result)
    }
}

fn line_ending(text: &str) -> &'static str {
    match text.find('\n') {
        Some(i) if text[..i].ends_with('\r') => "\r\n",
        _ => "\n",
    }
}

fn check_counts(hunk: &Hunk, header_line: usize) -> Result<(), PatchError> {
    let old_seen = hunk
        .lines
        .iter()
        .filter(|l| !matches!(l, HunkLine::Add(_)))
        .count();
    let new_seen = hunk
        .lines
        .iter()
        .filter(|l| !matches!(l, HunkLine::Remove(_)))
        .count();
    if old_seen != hunk.old_len || new_seen != hunk.new_len {
        return Err(PatchError::CountMismatch {
            line: header_line,
            old_len: hunk.old_len,
            new_len: hunk.new_len,
            old_seen,
            new_seen,
        });
    }
    Ok(())
}

/// `@@ -a[,b] +c[,d] @@ optional section`
fn parse_header(raw: &str, line: usize) -> Result<Hunk, PatchError> {
    let malformed = || PatchError::MalformedHeader {
        line,
        header: raw.to_string(),
    };
    let inner = raw
        .strip_prefix("@@ ")
        .and_then(|rest| rest.split(" @@").next())
        .ok_or_else(malformed)?;
    let mut parts = inner.split_whitespace();
    let old = parts.next().and_then(|p| p.strip_prefix('-')).ok_or_else(malformed)?;
    let new = parts.next().and_then(|p| p.strip_prefix('+')).ok_or_else(malformed)?;
    let (old_start, old_len) = parse_range(old).ok_or_else(malformed)?;
    let (new_start, new_len) = parse_range(new).ok_or_else(malformed)?;
    Ok(Hunk {
        old_start,
        old_len,
        new_start,
        new_len,
        lines: Vec::new(),
    })
}

fn parse_range(range: &str) -> Option<(usize, usize)> {
    match range.split_once(',') {
        Some((start, len)) => Some((start.parse().ok()?, len.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}

/// Render a unified diff turning `original` into `updated`.
///
/// Returns an empty string when nothing changed.
pub fn render_diff(doc_id: &str, original: &str, updated: &str) -> String {
    if original == updated {
        return String::new();
    }
    TextDiff::from_lines(original, updated)
        .unified_diff()
        .context_radius(CONTEXT_RADIUS)
        .header(&format!("a/{doc_id}"), &format!("b/{doc_id}"))
        .to_string()
}
