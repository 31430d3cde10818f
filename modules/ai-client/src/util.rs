/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Strip markdown code blocks from a response.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Parse a JSON object out of a model's text reply.
///
/// Tries the fence-stripped body first, then the outermost `{...}` span.
pub fn parse_json_object(response: &str) -> Option<serde_json::Value> {
    let body = strip_code_blocks(response);
    if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str(body) {
        return Some(value);
    }

    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&response[start..=end]) {
        Ok(value @ serde_json::Value::Object(_)) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_to_char_boundary() {
        let text = "Hello 世界";
        let truncated = truncate_to_char_boundary(text, 8);
        assert!(truncated.len() <= 8);
        assert!(text.starts_with(truncated));
    }

    #[test]
    fn test_truncate_within_bounds() {
        let text = "Hello";
        assert_eq!(truncate_to_char_boundary(text, 100), "Hello");
    }

    #[test]
    fn test_strip_code_blocks() {
        assert_eq!(strip_code_blocks("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("{}"), "{}");
    }

    #[test]
    fn parse_json_from_prose() {
        let reply = "Here is the analysis:\n{\"summary\": \"up\", \"n\": 2}\nHope this helps.";
        assert_eq!(
            parse_json_object(reply),
            Some(serde_json::json!({"summary": "up", "n": 2}))
        );
    }

    #[test]
    fn parse_json_rejects_non_objects() {
        assert_eq!(parse_json_object("[1, 2]"), None);
        assert_eq!(parse_json_object("no json here"), None);
        assert_eq!(parse_json_object("} backwards {"), None);
    }
}
