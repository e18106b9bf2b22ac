//! Extracts table-shaped identifiers referenced in a SQL body, ignoring
//! string literals and `--` line comments, for dependency inference.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

fn ident_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap())
}

/// Matches a `FROM` clause's target list, which may be comma-separated
/// (`FROM a, b`) to express a cross join without the `JOIN` keyword.
fn from_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bFROM\s+([A-Za-z_][A-Za-z0-9_]*(?:\s*,\s*[A-Za-z_][A-Za-z0-9_]*)*)").unwrap()
    })
}

/// `JOIN` never takes a comma-separated target list, unlike `FROM`.
fn join_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bJOIN\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap())
}

/// Strips `--` comments and the contents of string literals, replacing them
/// with spaces so subsequent identifier matching can't see inside them
/// while byte offsets remain stable.
fn strip_literals_and_comments(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '-' && chars.get(i + 1) == Some(&'-') {
            while i < chars.len() && chars[i] != '\n' {
                out.push(' ');
                i += 1;
            }
            continue;
        }
        if c == '\'' || c == '"' {
            let quote = c;
            out.push(' ');
            i += 1;
            while i < chars.len() && chars[i] != quote {
                out.push(' ');
                i += 1;
            }
            if i < chars.len() {
                out.push(' ');
                i += 1;
            }
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

/// All bare identifiers referenced in `sql`, case-preserved, deduplicated.
/// String-literal and comment contents never contribute identifiers.
pub fn referenced_identifiers(sql: &str) -> HashSet<String> {
    let cleaned = strip_literals_and_comments(sql);
    ident_regex()
        .find_iter(&cleaned)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Table names appearing directly as a `FROM`/`JOIN` target, ignoring
/// string literals, comments, and subquery parentheses. This is the
/// narrower relation used for dependency inference and table-existence
/// validation — broader identifier scanning would mistake column names and
/// function calls for table references. A comma-separated `FROM` list
/// (`FROM a, b`) contributes every member, not just the first.
pub fn from_join_targets(sql: &str) -> HashSet<String> {
    let cleaned = strip_literals_and_comments(sql);
    let mut targets: HashSet<String> = from_regex()
        .captures_iter(&cleaned)
        .flat_map(|c| {
            c[1].split(',')
                .map(|s| s.trim().to_string())
                .collect::<Vec<_>>()
        })
        .collect();
    targets.extend(join_regex().captures_iter(&cleaned).map(|c| c[1].to_string()));
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_join_targets_ignores_columns_and_functions() {
        let targets = from_join_targets("SELECT UPPER(name) FROM raw_customers JOIN regions ON raw_customers.region_id = regions.id");
        assert_eq!(
            targets,
            ["raw_customers", "regions"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn from_join_targets_collects_comma_separated_from_list() {
        let targets = from_join_targets("SELECT * FROM a, b WHERE a.id = b.id");
        assert_eq!(
            targets,
            ["a", "b"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn from_join_targets_skips_subqueries() {
        let targets = from_join_targets("SELECT * FROM (SELECT 1) AS t");
        assert!(targets.is_empty());
    }

    #[test]
    fn ignores_identifiers_inside_string_literals() {
        let ids = referenced_identifiers("SELECT * FROM raw WHERE region = 'clean'");
        assert!(ids.contains("raw"));
        assert!(!ids.contains("clean"));
    }

    #[test]
    fn ignores_identifiers_after_line_comment() {
        let ids = referenced_identifiers("SELECT * FROM raw -- references clean too\n");
        assert!(ids.contains("raw"));
        assert!(!ids.contains("references"));
        assert!(!ids.contains("clean"));
    }
}
