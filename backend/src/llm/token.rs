//! Token estimation, prompt-size validation, and truncation (C5, spec §4.7).

const TRUNCATION_MARKER: &str = "\n\n...[TRUNCATED]...\n\n";
const TRUNCATION_BUFFER: usize = 200;

/// `ceil(len(text) / chars_per_token)`, falling back to a conservative ratio
/// if the configured ratio is non-positive.
pub fn estimate_tokens(text: &str, chars_per_token: f64) -> u64 {
    let ratio = if chars_per_token > 0.0 { chars_per_token } else { 4.0 };
    let len = text.chars().count() as f64;
    (len / ratio).ceil() as u64
}

/// `true` when the prompt fits both the token budget and the character cap.
pub fn validate_prompt(text: &str, max_tokens: u32, max_chars: usize, chars_per_token: f64) -> bool {
    let tokens = estimate_tokens(text, chars_per_token);
    tokens <= max_tokens as u64 && text.chars().count() <= max_chars
}

/// Head-truncates `text` to `max_chars - buffer`, appending a visible marker
/// (spec §8 boundary: "the marker string appears in the last 200 chars").
pub fn truncate_prompt_if_needed(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let budget = max_chars.saturating_sub(TRUNCATION_BUFFER).saturating_sub(TRUNCATION_MARKER.chars().count());
    let head: String = text.chars().take(budget).collect();
    format!("{head}{TRUNCATION_MARKER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimates_tokens_with_ceiling_division() {
        assert_eq!(estimate_tokens("abcd", 4.0), 1);
        assert_eq!(estimate_tokens("abcde", 4.0), 2);
    }

    #[test]
    fn truncation_marker_lands_near_the_end() {
        let text = "a".repeat(100_000);
        let truncated = truncate_prompt_if_needed(&text, 80_000);
        assert!(truncated.len() <= 80_000);
        let tail: String = truncated.chars().rev().take(200).collect::<Vec<_>>().into_iter().rev().collect();
        assert!(tail.contains("TRUNCATED"));
    }

    #[test]
    fn leaves_short_prompts_untouched() {
        let text = "short prompt";
        assert_eq!(truncate_prompt_if_needed(text, 80_000), text);
    }
}
