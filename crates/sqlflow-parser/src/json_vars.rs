//! Pre-processes `PARAMS`/`OPTIONS` JSON objects so `${var}` tokens used
//! outside of a quoted string (e.g. `{"limit": ${max_rows}}`) parse as valid
//! JSON. The token is rewritten in place as a quoted string; the embedded
//! `${...}` reference itself is left untouched so the variable resolver
//! still substitutes it in a later pass.

/// Wrap bare `${...}` occurrences outside of string literals in quotes.
pub fn quote_bare_variables(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut i = 0;
    let mut in_string: Option<char> = None;

    while i < chars.len() {
        let c = chars[i];
        match in_string {
            Some(q) => {
                out.push(c);
                if c == '\\' && i + 1 < chars.len() {
                    out.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                if c == q {
                    in_string = None;
                }
                i += 1;
            }
            None => {
                if c == '"' || c == '\'' {
                    in_string = Some(c);
                    out.push('"');
                    i += 1;
                } else if c == '$' && chars.get(i + 1) == Some(&'{') {
                    let start = i;
                    let mut j = i + 2;
                    while j < chars.len() && chars[j] != '}' {
                        j += 1;
                    }
                    if j < chars.len() {
                        j += 1; // include closing brace
                    }
                    let token: String = chars[start..j].iter().collect();
                    out.push('"');
                    out.push_str(&token);
                    out.push('"');
                    i = j;
                } else {
                    out.push(c);
                    i += 1;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_bare_variable_value() {
        let out = quote_bare_variables(r#"{"limit": ${max_rows}}"#);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["limit"], "${max_rows}");
    }

    #[test]
    fn leaves_quoted_variable_untouched() {
        let out = quote_bare_variables(r#"{"path": "${base}/x.csv"}"#);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["path"], "${base}/x.csv");
    }

    #[test]
    fn normalizes_single_quoted_strings() {
        let out = quote_bare_variables(r#"{'has_header': true}"#);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["has_header"], true);
    }
}
