//! Tolerant recovery of near-valid JSON from model output.
//!
//! Models wrap JSON in Markdown fences, emit smart quotes, leave bare line
//! breaks inside string literals, or truncate trailing content when they run
//! out of tokens. The normalization steps here are idempotent on clean input.

use crate::{Result, RewriteError};
use serde_json::Value;

/// Strip Markdown code-fence wrappers and right-trim every line.
pub fn strip_code_fences(s: &str) -> String {
    let mut s = s.trim();
    if s.starts_with("```") {
        s = s.trim_start_matches("```");
        s = s.strip_prefix("json").unwrap_or(s);
        s = s.trim_start();
        s = s.trim_end();
        if let Some(stripped) = s.strip_suffix("```") {
            s = stripped.trim_end();
        }
    }

    s.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Normalize smart quotation marks to plain ASCII quotes.
///
/// CJK corner quotes are legal inside JSON string values and stay untouched.
pub fn normalize_quotes(s: &str) -> String {
    s.replace('\u{201c}', "\"")
        .replace('\u{201d}', "\"")
        .replace('\u{2018}', "'")
        .replace('\u{2019}', "'")
}

/// Escape bare newline/carriage-return characters inside JSON string literals.
///
/// Tracks string and backslash-escape state; characters outside string
/// literals pass through unchanged.
pub fn escape_newlines_in_strings(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_str = false;
    let mut esc = false;

    for ch in s.chars() {
        if in_str {
            if esc {
                out.push(ch);
                esc = false;
            } else if ch == '\\' {
                out.push(ch);
                esc = true;
            } else if ch == '"' {
                out.push(ch);
                in_str = false;
            } else if ch == '\n' || ch == '\r' {
                out.push_str("\\n");
            } else {
                out.push(ch);
            }
        } else {
            if ch == '"' {
                in_str = true;
                esc = false;
            }
            out.push(ch);
        }
    }

    out
}

/// Trim the text to the last balanced top-level `{...}` or `[...]` span.
pub fn trim_to_complete_json(s: &str) -> &str {
    let mut depth_obj = 0i32;
    let mut depth_arr = 0i32;
    let mut last_complete = None;
    let mut in_str = false;
    let mut esc = false;

    for (i, ch) in s.char_indices() {
        if in_str {
            if esc {
                esc = false;
            } else if ch == '\\' {
                esc = true;
            } else if ch == '"' {
                in_str = false;
            }
        } else {
            match ch {
                '"' => in_str = true,
                '{' => depth_obj += 1,
                '}' => {
                    depth_obj -= 1;
                    if depth_obj == 0 && depth_arr == 0 {
                        last_complete = Some(i + 1);
                    }
                }
                '[' => depth_arr += 1,
                ']' => {
                    depth_arr -= 1;
                    if depth_arr == 0 && depth_obj == 0 {
                        last_complete = Some(i + 1);
                    }
                }
                _ => {}
            }
        }
    }

    match last_complete {
        Some(end) => &s[..end],
        None => s,
    }
}

/// Parse model output as JSON, repairing the common defects first.
///
/// Attempts, in order: strict parse of the normalized text; parse of the text
/// trimmed to the last balanced span; parse truncated at the last `}`. All
/// three failing is a parse error.
pub fn robust_parse(raw: &str) -> Result<Value> {
    let s = strip_code_fences(raw);
    let s = normalize_quotes(&s);
    let s = escape_newlines_in_strings(&s);

    match serde_json::from_str(&s) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            let trimmed = trim_to_complete_json(&s);
            if let Ok(value) = serde_json::from_str(trimmed) {
                return Ok(value);
            }

            if let Some(pos) = s.rfind('}') {
                if let Ok(value) = serde_json::from_str(&s[..pos + 1]) {
                    return Ok(value);
                }
            }

            Err(RewriteError::Parse(format!(
                "invalid JSON after recovery attempts: {}",
                first_err
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitize(s: &str) -> String {
        escape_newlines_in_strings(&normalize_quotes(&strip_code_fences(s)))
    }

    #[test]
    fn test_strip_code_fences() {
        let input = "```json\n{\"caption\": \"x\"}\n```";
        assert_eq!(strip_code_fences(input), "{\"caption\": \"x\"}");
    }

    #[test]
    fn test_strip_code_fences_without_language_tag() {
        let input = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(input), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_trims_trailing_spaces_per_line() {
        let input = "{\n  \"a\": 1,   \n  \"b\": 2\t\n}";
        assert_eq!(strip_code_fences(input), "{\n  \"a\": 1,\n  \"b\": 2\n}");
    }

    #[test]
    fn test_normalize_quotes_keeps_cjk_quotes() {
        let input = "{\u{201c}caption\u{201d}: \u{201c}看「这个」视频\u{201d}}";
        assert_eq!(normalize_quotes(input), "{\"caption\": \"看「这个」视频\"}");
    }

    #[test]
    fn test_escape_newlines_only_inside_strings() {
        let input = "{\n  \"caption\": \"line one\nline two\"\n}";
        let out = escape_newlines_in_strings(input);
        assert_eq!(out, "{\n  \"caption\": \"line one\\nline two\"\n}");
        assert!(serde_json::from_str::<Value>(&out).is_ok());
    }

    #[test]
    fn test_escape_respects_existing_escapes() {
        let input = r#"{"caption": "already \"quoted\" text"}"#;
        assert_eq!(escape_newlines_in_strings(input), input);
    }

    #[test]
    fn test_trim_to_complete_json() {
        let input = "{\"caption\": \"x\"} and then some trailing garbage";
        assert_eq!(trim_to_complete_json(input), "{\"caption\": \"x\"}");
    }

    #[test]
    fn test_trim_ignores_brackets_inside_strings() {
        let input = "{\"caption\": \"braces } inside ] strings\"}";
        assert_eq!(trim_to_complete_json(input), input);
    }

    #[test]
    fn test_robust_parse_fenced_response() {
        let value = robust_parse("```json\n{\"caption\": \"x\"}\n```").unwrap();
        assert_eq!(value["caption"], "x");
    }

    #[test]
    fn test_robust_parse_recovers_truncated_response() {
        let raw = "{\"variants\": [{\"caption\": \"one\"}, {\"caption\": \"two\"}]} trailing";
        let value = robust_parse(raw).unwrap();
        assert_eq!(value["variants"][1]["caption"], "two");
    }

    #[test]
    fn test_robust_parse_rejects_garbage() {
        assert!(matches!(
            robust_parse("not json at all"),
            Err(crate::RewriteError::Parse(_))
        ));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let clean = "{\"tts\": \"hello\", \"caption\": \"world 「引用」\"}";
        let once = sanitize(clean);
        assert_eq!(once, clean);
        assert_eq!(sanitize(&once), once);
    }
}
