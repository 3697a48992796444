//! Conversion of Python-style literals into JSON text.
//!
//! Handles single-quoted strings, `True`/`False`/`None`, tuples and
//! trailing commas. Anything else is copied through for `serde_json` to
//! accept or reject.

/// Rewrite `text` as JSON, or `None` if a string literal is unterminated.
pub(super) fn to_json(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push('"');
                let mut closed = false;
                while let Some(s) = chars.next() {
                    match s {
                        '\\' => {
                            let escaped = chars.next()?;
                            match escaped {
                                '\'' => out.push('\''),
                                other => {
                                    out.push('\\');
                                    out.push(other);
                                }
                            }
                        }
                        '"' if c == '\'' => out.push_str("\\\""),
                        s if s == c => {
                            closed = true;
                            break;
                        }
                        s => out.push(s),
                    }
                }
                if !closed {
                    return None;
                }
                out.push('"');
            }
            '(' => out.push('['),
            ')' => {
                strip_trailing_comma(&mut out);
                out.push(']');
            }
            ']' | '}' => {
                strip_trailing_comma(&mut out);
                out.push(c);
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        word.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
            }
            c => out.push(c),
        }
    }

    Some(out)
}

fn strip_trailing_comma(out: &mut String) {
    let trimmed = out.trim_end().len();
    if out[..trimmed].ends_with(',') {
        out.truncate(trimmed - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quotes_and_keywords() {
        assert_eq!(
            to_json("{'a': True, 'b': [None, False]}").unwrap(),
            r#"{"a": true, "b": [null, false]}"#
        );
    }

    #[test]
    fn test_tuples_and_trailing_commas() {
        assert_eq!(to_json("(3,)").unwrap(), "[3]");
        assert_eq!(to_json("{'shape': (1, 2), }").unwrap(), r#"{"shape": [1, 2]}"#);
    }

    #[test]
    fn test_embedded_quotes() {
        assert_eq!(to_json(r#"'say "hi"'"#).unwrap(), r#""say \"hi\"""#);
        assert_eq!(to_json(r"'it\'s'").unwrap(), r#""it's""#);
    }

    #[test]
    fn test_keywords_inside_strings_are_kept() {
        assert_eq!(to_json("'True'").unwrap(), r#""True""#);
    }

    #[test]
    fn test_unterminated_string() {
        assert!(to_json("{'a: 1}").is_none());
    }
}
