//! Translates `(mode, target_table, SELECT body)` into the SQL statements
//! that realize it against the analytic engine (C4).
//!
//! DataFusion has no multi-statement transactions, so "within a single
//! transaction" from the mode table is approximated as "run this statement
//! sequence against one [`SessionContext`] and stop at the first error" —
//! the executor that calls [`statements_for`] is responsible for treating a
//! mid-sequence failure as a failed step rather than attempting a rollback.

use sqlflow_core::ast::TransformMode;

/// One SQL statement to run, in order, to realize a transform's mode.
pub type Statements = Vec<String>;

pub struct MaterializeRequest<'a> {
    pub table_name: &'a str,
    pub select_sql: &'a str,
    pub mode: Option<TransformMode>,
    pub merge_keys: &'a [String],
    pub time_column: Option<&'a str>,
    pub lookback: Option<&'a str>,
    pub table_exists: bool,
}

/// Builds the statement sequence for a `transform` step per the mode table.
pub fn statements_for(req: &MaterializeRequest) -> Statements {
    match req.mode {
        None | Some(TransformMode::Replace) => {
            vec![format!(
                "CREATE OR REPLACE TABLE {} AS {}",
                req.table_name, req.select_sql
            )]
        }
        Some(TransformMode::Append) => {
            if req.table_exists {
                vec![format!("INSERT INTO {} {}", req.table_name, req.select_sql)]
            } else {
                vec![format!(
                    "CREATE TABLE {} AS {}",
                    req.table_name, req.select_sql
                )]
            }
        }
        Some(TransformMode::Merge) => merge_statements(req),
        Some(TransformMode::Incremental) => incremental_statements(req),
    }
}

fn merge_statements(req: &MaterializeRequest) -> Statements {
    if !req.table_exists {
        return vec![format!(
            "CREATE TABLE {} AS {}",
            req.table_name, req.select_sql
        )];
    }

    let key_match = req
        .merge_keys
        .iter()
        .map(|k| format!("{}.{k} = s.{k}", req.table_name))
        .collect::<Vec<_>>()
        .join(" AND ");

    vec![
        format!(
            "DELETE FROM {table} WHERE EXISTS (SELECT 1 FROM ({select}) s WHERE {key_match})",
            table = req.table_name,
            select = req.select_sql,
        ),
        format!("INSERT INTO {} {}", req.table_name, req.select_sql),
    ]
}

fn incremental_statements(req: &MaterializeRequest) -> Statements {
    let time_column = req
        .time_column
        .expect("planner rejects INCREMENTAL without a BY column before execution");

    if !req.table_exists {
        return vec![format!(
            "CREATE TABLE {} AS {}",
            req.table_name, req.select_sql
        )];
    }

    let watermark = format!("(SELECT max({time_column}) FROM {})", req.table_name);
    let cutoff = match req.lookback.and_then(parse_lookback) {
        Some((amount, unit)) => format!("{watermark} - INTERVAL '{amount}' {unit}"),
        None => watermark,
    };

    vec![
        format!(
            "DELETE FROM {table} WHERE {time_column} >= {cutoff}",
            table = req.table_name,
        ),
        format!(
            "INSERT INTO {} {} WHERE {time_column} >= {cutoff}",
            req.table_name, wrap_as_subquery(req.select_sql, time_column)
        ),
    ]
}

/// `"7 DAY"` -> `(7, "DAY")`. Anything that doesn't parse as `<number> <unit>`
/// is dropped, so the window degrades to "since the last watermark."
fn parse_lookback(raw: &str) -> Option<(String, String)> {
    let mut parts = raw.splitn(2, ' ');
    let amount = parts.next()?.trim();
    let unit = parts.next()?.trim();
    amount.parse::<i64>().ok()?;
    Some((amount.to_string(), unit.to_uppercase()))
}

/// `SELECT ...` scoped for the incremental window needs the original body
/// available as a subquery so the generated `WHERE` can reference
/// `time_column` without assuming it's unqualified in the original select list.
fn wrap_as_subquery(select_sql: &str, _time_column: &str) -> String {
    format!("SELECT * FROM ({select_sql})")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(table_exists: bool) -> MaterializeRequest<'static> {
        MaterializeRequest {
            table_name: "t",
            select_sql: "SELECT * FROM raw",
            mode: None,
            merge_keys: &[],
            time_column: None,
            lookback: None,
            table_exists,
        }
    }

    #[test]
    fn default_mode_is_create_or_replace() {
        let stmts = statements_for(&base(true));
        assert_eq!(stmts, vec!["CREATE OR REPLACE TABLE t AS SELECT * FROM raw"]);
    }

    #[test]
    fn append_creates_when_absent_inserts_when_present() {
        let mut req = base(false);
        req.mode = Some(TransformMode::Append);
        assert_eq!(statements_for(&req), vec!["CREATE TABLE t AS SELECT * FROM raw"]);

        req.table_exists = true;
        assert_eq!(statements_for(&req), vec!["INSERT INTO t SELECT * FROM raw"]);
    }

    #[test]
    fn merge_emits_delete_then_insert_with_key_match() {
        let mut req = base(true);
        req.mode = Some(TransformMode::Merge);
        let keys = vec!["id".to_string()];
        req.merge_keys = &keys;
        let stmts = statements_for(&req);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with("DELETE FROM t"));
        assert!(stmts[0].contains("t.id = s.id"));
        assert!(stmts[1].starts_with("INSERT INTO t"));
    }

    #[test]
    fn incremental_without_existing_table_behaves_like_replace() {
        let mut req = base(false);
        req.mode = Some(TransformMode::Incremental);
        req.time_column = Some("event_time");
        assert_eq!(statements_for(&req), vec!["CREATE TABLE t AS SELECT * FROM raw"]);
    }

    #[test]
    fn incremental_scopes_delete_and_insert_to_lookback_window() {
        let mut req = base(true);
        req.mode = Some(TransformMode::Incremental);
        req.time_column = Some("event_time");
        req.lookback = Some("7 DAY");
        let stmts = statements_for(&req);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("max(event_time)"));
        assert!(stmts[0].contains("INTERVAL '7' DAY"));
        assert!(stmts[1].starts_with("INSERT INTO t"));
    }
}
