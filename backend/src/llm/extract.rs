//! Extracts a JSON object from free-form LLM content (C5, spec §4.7 step 6).
//!
//! Tried in order: a fenced ` ```json ` block, a fenced generic code block,
//! a brace-balanced substring, and finally the whole content. First success
//! wins.

use serde_json::Value;

pub fn extract_json(content: &str) -> Option<Value> {
    try_fenced_block(content, "```json")
        .or_else(|| try_fenced_block(content, "```"))
        .or_else(|| try_brace_balanced(content))
        .or_else(|| serde_json::from_str(content.trim()).ok())
}

fn try_fenced_block(content: &str, fence_open: &str) -> Option<Value> {
    let start = content.find(fence_open)? + fence_open.len();
    let rest = &content[start..];
    let end = rest.find("```")?;
    let candidate = rest[..end].trim();
    serde_json::from_str(candidate).ok()
}

fn try_brace_balanced(content: &str) -> Option<Value> {
    let bytes: Vec<char> = content.chars().collect();
    let start = bytes.iter().position(|&c| c == '{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (offset, &c) in bytes[start..].iter().enumerate() {
        if escape {
            escape = false;
            continue;
        }
        match c {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate: String = bytes[start..=start + offset].iter().collect();
                    return serde_json::from_str(&candidate).ok();
                }
            },
            _ => {},
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_json_fenced_block() {
        let content = "here you go:\n```json\n{\"a\": 1}\n```\nthanks";
        let v = extract_json(content).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn extracts_from_generic_fenced_block() {
        let content = "```\n{\"a\": 2}\n```";
        let v = extract_json(content).unwrap();
        assert_eq!(v["a"], 2);
    }

    #[test]
    fn extracts_brace_balanced_substring_from_prose() {
        let content = "Sure, the result is {\"a\": {\"b\": 3}} and that's final.";
        let v = extract_json(content).unwrap();
        assert_eq!(v["a"]["b"], 3);
    }

    #[test]
    fn falls_back_to_whole_content() {
        let content = "{\"a\": 4}";
        let v = extract_json(content).unwrap();
        assert_eq!(v["a"], 4);
    }

    #[test]
    fn returns_none_for_unparseable_content() {
        assert!(extract_json("no json here at all").is_none());
    }
}
