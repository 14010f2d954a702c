//! Cleanup of artifact bodies extracted from free-form completions.
//!
//! Models wrap artifacts in code fences and append commentary after them.
//! Sanitizing strips the fences and, for structured formats, cuts trailing
//! prose. An empty return value means the block produced no content.

use serde::de::IgnoredAny;

use super::router::ContentFormat;

const FENCE: &str = "```";

/// Sanitize one artifact body for the given output format.
pub fn sanitize(span: &str, format: ContentFormat) -> String {
    let unfenced = match format {
        ContentFormat::Markdown => strip_fences(span),
        ContentFormat::Json | ContentFormat::Yaml | ContentFormat::Literal => {
            strip_embedded_fences(span)
        }
    };
    let cleaned = match format {
        ContentFormat::Json => truncate_json(&unfenced),
        ContentFormat::Yaml => truncate_yaml(&unfenced),
        ContentFormat::Markdown | ContentFormat::Literal => unfenced.as_str(),
    };
    cleaned.trim().to_string()
}

/// Remove a code fence on the first line and its last closing partner.
///
/// Only the two fence lines go; text before and after them is kept. Interior
/// fences are preserved, and an opening fence with no closing line
/// (truncated output) is dropped alone.
pub fn strip_fences(text: &str) -> String {
    remove_fence_pair(text, true)
}

/// Like [`strip_fences`], but the opening fence may follow preamble lines.
///
/// Structured formats never carry fences of their own, so the first fence
/// line anywhere in the body opens the pair.
pub fn strip_embedded_fences(text: &str) -> String {
    remove_fence_pair(text, false)
}

fn remove_fence_pair(text: &str, first_line_only: bool) -> String {
    let text = text.trim();
    let lines: Vec<&str> = text.lines().collect();
    let candidates = if first_line_only {
        lines.len().min(1)
    } else {
        lines.len()
    };
    let Some(open) = lines[..candidates]
        .iter()
        .position(|line| is_opening_fence(line))
    else {
        return text.to_string();
    };
    let close = (open + 1..lines.len())
        .rev()
        .find(|&i| lines[i].trim() == FENCE);

    let kept: Vec<&str> = lines
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != open && Some(i) != close)
        .map(|(_, line)| *line)
        .collect();
    kept.join("\n").trim().to_string()
}

fn is_opening_fence(line: &str) -> bool {
    let line = line.trim();
    match line.strip_prefix(FENCE) {
        Some(tag) => tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.')),
        None => false,
    }
}

/// Keep only the first complete JSON value when the text opens like JSON.
fn truncate_json(text: &str) -> &str {
    if !(text.starts_with('{') || text.starts_with('[')) {
        return text;
    }
    let mut values = serde_json::Deserializer::from_str(text).into_iter::<IgnoredAny>();
    match values.next() {
        Some(Ok(_)) => &text[..values.byte_offset()],
        _ => text,
    }
}

/// Cut at the first line that looks like a markdown heading.
///
/// A YAML comment written as `# text` is indistinguishable from a heading
/// here and is cut as well.
fn truncate_yaml(text: &str) -> &str {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("# ") || trimmed.starts_with("## ") {
            return &text[..offset];
        }
        offset += line.len();
    }
    text
}
