//! Token estimation and prompt section truncation.
//!
//! Uses a 4 chars/token heuristic. Tier budgeting is done on the estimate of
//! each turn's full content; truncation only applies to how a single oversized
//! turn is rendered into the prompt.

/// Approximate characters per token (conservative heuristic).
const CHARS_PER_TOKEN: usize = 4;

/// Estimate the number of tokens in a string using the chars/token heuristic.
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() + CHARS_PER_TOKEN - 1) / CHARS_PER_TOKEN
}

/// Truncate text to a token budget, cutting at the last newline before the
/// limit when there is one and never inside a UTF-8 sequence.
pub fn truncate_to_token_budget(text: &str, token_budget: usize) -> String {
    let max_chars = token_budget * CHARS_PER_TOKEN;

    if text.len() <= max_chars {
        return text.to_string();
    }

    let mut limit = max_chars;
    while !text.is_char_boundary(limit) {
        limit -= 1;
    }
    let truncate_at = text[..limit].rfind('\n').unwrap_or(limit);
    let truncated = &text[..truncate_at];

    format!(
        "{}\n[... truncated: ~{} of ~{} tokens shown ...]",
        truncated,
        estimate_tokens(truncated),
        estimate_tokens(text),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn test_truncate_to_token_budget() {
        let text = "word ".repeat(1000);
        let result = truncate_to_token_budget(&text, 100);
        assert!(result.len() < text.len());
        assert!(result.contains("[... truncated"));
    }

    #[test]
    fn test_truncate_to_token_budget_no_truncation() {
        let text = "short text";
        assert_eq!(truncate_to_token_budget(text, 100), text);
    }

    #[test]
    fn test_truncate_prefers_newline_boundary() {
        let text = "first line\nsecond line that runs long";
        let result = truncate_to_token_budget(text, 4);
        assert!(result.starts_with("first line\n[... truncated"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(50);
        let result = truncate_to_token_budget(&text, 3);
        assert!(result.contains("[... truncated"));
    }
}
