// SPDX-License-Identifier: MIT

//! Best-effort syntax repair for truncated or sloppy model JSON

/// Repair `text` so it has a chance to parse as JSON
///
/// Extracts the outermost JSON value, drops trailing commas, then closes an
/// unterminated string and any unbalanced brackets.
pub fn repair(text: &str) -> String {
    let extracted = extract_outermost(text);
    let without_commas = remove_trailing_commas(extracted);
    close_unbalanced(&without_commas)
}

/// Slice from the first `{`/`[` to where its nesting returns to zero,
/// or to the end of the text if it never does
fn extract_outermost(text: &str) -> &str {
    let Some(start) = text.find(|c| c == '{' || c == '[') else {
        return text.trim();
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &text[start..start + offset + 1];
                }
            }
            _ => {}
        }
    }
    text[start..].trim_end()
}

/// Drop commas directly followed by a closing bracket or the end of input
fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            continue;
        }
        if c == '"' {
            in_string = true;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, None | Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Close an open string, then every bracket still open, innermost first
fn close_unbalanced(text: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut out = text.to_string();
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
    } else if out.ends_with(':') {
        out.push_str("null");
    }

    while let Some(close) = stack.pop() {
        out.push(close);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn parse(text: &str) -> Value {
        serde_json::from_str(&repair(text)).unwrap()
    }

    #[test]
    fn test_trailing_commas() {
        assert_eq!(parse(r#"{"a": [1, 2,], "b": 3,}"#), json!({"a": [1, 2], "b": 3}));
    }

    #[test]
    fn test_comma_inside_string_is_kept() {
        assert_eq!(parse(r#"{"a": "x,}", }"#), json!({"a": "x,}"}));
    }

    #[test]
    fn test_truncated_object_is_closed() {
        assert_eq!(
            parse(r#"{"chiefComplaint": "pain", "anamnesis": [{"category": "onset"#),
            json!({"chiefComplaint": "pain", "anamnesis": [{"category": "onset"}]})
        );
    }

    #[test]
    fn test_dangling_key_becomes_null() {
        assert_eq!(parse(r#"{"a": 1, "b":"#), json!({"a": 1, "b": null}));
    }

    #[test]
    fn test_surrounding_prose_is_dropped() {
        assert_eq!(
            parse("Sure! Here is the case:\n{\"a\": {\"b\": 1}}\nHope this helps."),
            json!({"a": {"b": 1}})
        );
    }

    #[test]
    fn test_brackets_inside_strings_do_not_count() {
        assert_eq!(parse(r#"{"a": "[{"}"#), json!({"a": "[{"}));
    }

    #[test]
    fn test_unterminated_escape_is_dropped() {
        assert_eq!(parse(r#"{"a": "line\"#), json!({"a": "line"}));
    }

    #[test]
    fn test_valid_json_is_unchanged() {
        let text = r#"{"inconsistencies": []}"#;
        assert_eq!(repair(text), text);
    }
}
