//! Batch splitting on the `GO` separator
//!
//! A script is cut on every standalone `GO` word. Segments that are empty or
//! whitespace-only are dropped; the rest keep their file order and are trimmed.

use std::sync::LazyLock;

use regex::Regex;

/// Whole-word, upper-case `GO`. `GOTO`, `FOOGO` and `go` do not match.
static GO_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bGO\b").unwrap());

/// One executable batch of a script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch<'a> {
    /// Position among the script's non-empty batches, 0-based
    pub index: usize,
    /// Trimmed batch text
    pub sql: &'a str,
    /// Line of the first non-whitespace character, 1-based
    pub start_line: usize,
}

/// Split script text into batches
pub fn split_batches(script: &str) -> Vec<Batch<'_>> {
    let mut batches = Vec::new();
    let mut lines = LineCursor::default();
    let mut segment_start = 0;

    for separator in GO_SEPARATOR.find_iter(script) {
        push_segment(script, segment_start, separator.start(), &mut lines, &mut batches);
        segment_start = separator.end();
    }
    push_segment(script, segment_start, script.len(), &mut lines, &mut batches);

    batches
}

/// Number of batches a script splits into
pub fn count_batches(script: &str) -> usize {
    split_batches(script).len()
}

fn push_segment<'a>(
    script: &'a str,
    start: usize,
    end: usize,
    lines: &mut LineCursor,
    batches: &mut Vec<Batch<'a>>,
) {
    let segment = &script[start..end];
    let sql = segment.trim();
    if sql.is_empty() {
        return;
    }

    let offset = start + (segment.len() - segment.trim_start().len());
    batches.push(Batch {
        index: batches.len(),
        sql,
        start_line: lines.line_at(script, offset),
    });
}

/// Counts newlines incrementally; offsets must be requested in ascending order.
struct LineCursor {
    offset: usize,
    line: usize,
}

impl Default for LineCursor {
    fn default() -> Self {
        Self { offset: 0, line: 1 }
    }
}

impl LineCursor {
    fn line_at(&mut self, text: &str, offset: usize) -> usize {
        self.line += text[self.offset..offset].matches('\n').count();
        self.offset = offset;
        self.line
    }
}
