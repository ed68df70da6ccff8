//! Best-effort recovery of one JSON value from free-form backend output.
//!
//! Stages, in order:
//! 1. [`unwrap_text_wrapper`]: strip a `{"text": "..."}` adapter envelope
//! 2. [`extract_fenced`]: take the body of a Markdown code fence
//! 3. [`extract_balanced`]: take a `{...}` or `[...]` span out of prose
//!
//! Each stage is a pure function returning `None` when it does not apply.

use serde_json::Value;

fn parses(candidate: &str) -> bool {
    serde_json::from_str::<Value>(candidate).is_ok()
}

/// If `text` is an object whose only key is `text` with a string value,
/// return that string, trimmed.
pub fn unwrap_text_wrapper(text: &str) -> Option<String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) if map.len() == 1 => match map.get("text") {
            Some(Value::String(inner)) => Some(inner.trim().to_string()),
            _ => None,
        },
        _ => None,
    }
}

/// Body of the first ```` ```json ```` fence, or of a bare ```` ``` ```` fence
/// that opens directly onto `{`, when that body parses as JSON.
pub fn extract_fenced(text: &str) -> Option<&str> {
    const FENCE: &str = "```";

    let body_start = if let Some(idx) = text.find("```json") {
        idx + "```json".len()
    } else {
        let idx = text.find("```{")?;
        idx + FENCE.len()
    };

    let rest = &text[body_start..];
    let end = rest.find(FENCE)?;
    let body = rest[..end].trim();
    if parses(body) {
        Some(body)
    } else {
        None
    }
}

/// Span from the first `open` through a matching `close` that parses.
///
/// Tries the longest candidate (through the last `close`) first, then walks
/// forward over each `close` position and returns the first span that parses.
fn scan_delimited(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let last = text.rfind(close)?;
    if last < start {
        return None;
    }

    let full = &text[start..=last];
    if parses(full) {
        return Some(full);
    }

    text[start..]
        .match_indices(close)
        .map(|(offset, _)| &text[start..=start + offset])
        .find(|candidate| parses(candidate))
}

/// Object or array embedded in surrounding text.
///
/// Whichever opening delimiter appears first is tried first; the other kind
/// is the fallback.
pub fn extract_balanced(text: &str) -> Option<&str> {
    let object_at = text.find('{');
    let array_at = text.find('[');

    let object_first = match (object_at, array_at) {
        (None, None) => return None,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (Some(o), Some(a)) => o < a,
    };

    if object_first {
        scan_delimited(text, '{', '}').or_else(|| scan_delimited(text, '[', ']'))
    } else {
        scan_delimited(text, '[', ']').or_else(|| scan_delimited(text, '{', '}'))
    }
}

/// One pass of the pipeline.
fn extract_once(text: &str) -> String {
    let working = unwrap_text_wrapper(text).unwrap_or_else(|| text.to_string());

    if let Some(body) = extract_fenced(&working) {
        return body.to_string();
    }
    if let Some(span) = extract_balanced(&working) {
        return span.to_string();
    }
    working
}

/// Recover a single JSON value from `text`, or return the (unwrapped) text
/// unchanged when nothing parseable is found.
///
/// Passes repeat until the output is stable, so the result is a fixed point:
/// `extract_json(&extract_json(x)) == extract_json(x)`. Every pass that
/// changes the text makes it strictly shorter, which bounds the loop.
pub fn extract_json(text: &str) -> String {
    let mut current = extract_once(text);
    loop {
        let next = extract_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}
