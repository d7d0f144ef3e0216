//! Bounded file reads

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Limits for content sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLimits {
    pub max_bytes: usize,
    pub max_lines: usize,
}

/// Reads at most `limit` bytes, lossily decoded
///
/// Returns `None` for binary content (a NUL byte in the read prefix).
pub fn read_prefix(path: &Path, limit: u64) -> io::Result<Option<String>> {
    let mut buffer = Vec::new();
    File::open(path)?.take(limit).read_to_end(&mut buffer)?;

    if buffer.contains(&0) {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buffer).into_owned()))
}

/// Leading part of `text` within both limits, cut on a char boundary
pub fn bounded(text: &str, limits: SampleLimits) -> &str {
    let mut end = text.len().min(limits.max_bytes);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let text = &text[..end];

    match text.match_indices('\n').nth(limits.max_lines.saturating_sub(1)) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

const SNIPPET_CHARS: usize = 80;

/// The trimmed line around a match, shortened for evidence output
pub fn snippet(text: &str, start: usize, end: usize) -> String {
    let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
    let line_end = text[end..].find('\n').map_or(text.len(), |i| end + i);
    text[line_start..line_end]
        .trim()
        .chars()
        .take(SNIPPET_CHARS)
        .collect()
}
