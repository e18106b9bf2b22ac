//! End-to-end planner scenarios: DSL text in, validated `Plan` out.

use std::collections::HashMap;

use serde_json::json;
use sqlflow_core::errors::handler::ErrorStrategy;
use sqlflow_core::op::OperationKind;
use sqlflow_planner::Planner;

fn plan(text: &str, cli: HashMap<String, serde_json::Value>, profile: HashMap<String, serde_json::Value>) -> sqlflow_core::op::Plan {
    let pipeline = sqlflow_parser::parse(text).expect("pipeline should parse");
    Planner::new(cli, profile, ErrorStrategy::WarnContinue)
        .plan("test_pipeline", &pipeline)
        .expect("pipeline should plan")
}

#[test]
fn s1_simple_load_transform_export() {
    let text = r#"
        SOURCE customers TYPE CSV PARAMS {"path":"data/customers.csv","has_header":true};
        LOAD raw_customers FROM customers;
        CREATE TABLE clean AS SELECT id, UPPER(name) AS name FROM raw_customers;
        EXPORT SELECT * FROM clean TO "out/clean.csv" TYPE CSV OPTIONS {"header":true};
    "#;
    let p = plan(text, HashMap::new(), HashMap::new());
    let ids: Vec<&str> = p.operations.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["source_customers", "load_raw_customers", "transform_clean", "export_3"]
    );
    assert_eq!(p.operations[1].depends_on, vec!["source_customers"]);
    assert_eq!(p.operations[2].depends_on, vec!["load_raw_customers"]);
    assert_eq!(p.operations[3].depends_on, vec!["transform_clean"]);
}

#[test]
fn s2_create_or_replace_rewires_dependents() {
    let text = r#"
        SOURCE src TYPE CSV PARAMS {"path":"t.csv"};
        LOAD t FROM src;
        CREATE TABLE s AS SELECT count(*) AS c FROM t;
        CREATE OR REPLACE TABLE s AS SELECT count(*) AS c, 'v2' AS v FROM t;
        CREATE TABLE dep AS SELECT v FROM s;
    "#;
    let p = plan(text, HashMap::new(), HashMap::new());

    let first_s = p
        .operations
        .iter()
        .find(|o| o.id == "transform_s")
        .unwrap();
    let second_s = p
        .operations
        .iter()
        .find(|o| o.id == "transform_s_2")
        .unwrap();
    assert!(!first_s.is_replace());
    assert!(second_s.is_replace());

    let dep = p.operations.iter().find(|o| o.id == "transform_dep").unwrap();
    assert_eq!(dep.depends_on, vec!["transform_s_2"]);
}

#[test]
fn s3_cli_wins_over_profile_and_set() {
    let text = r#"
        SET env = 'set_env';
        CREATE TABLE r AS SELECT '${env}' AS e;
    "#;
    let mut cli = HashMap::new();
    cli.insert("env".to_string(), json!("cli_env"));
    let mut profile = HashMap::new();
    profile.insert("env".to_string(), json!("profile_env"));

    let p = plan(text, cli, profile);
    match &p.operations[0].kind {
        OperationKind::Transform { sql_query, .. } => {
            assert!(sql_query.contains("${env}"), "planner defers substitution to execution");
        }
        _ => panic!("expected a transform operation"),
    }
}

#[test]
fn s4_conditional_branch_includes_load() {
    let text = r#"
        SOURCE cs TYPE CSV PARAMS {"path":"c.csv"};
        SOURCE ss TYPE CSV PARAMS {"path":"s.csv"};
        IF ${env} == 'production' THEN
          LOAD customers FROM cs;
        ELSE
          LOAD customers_raw FROM cs;
          LOAD sales_raw FROM ss;
          CREATE TABLE sales AS SELECT * FROM sales_raw LIMIT 10;
        END IF;
    "#;
    let mut cli = HashMap::new();
    cli.insert("env".to_string(), json!("dev"));

    let p = plan(text, cli, HashMap::new());
    let ids: Vec<&str> = p.operations.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["source_cs", "source_ss", "load_customers_raw", "load_sales_raw", "transform_sales"]
    );
    let sales = p.operations.iter().find(|o| o.id == "transform_sales").unwrap();
    assert!(sales.depends_on.contains(&"load_sales_raw".to_string()));
}

#[test]
fn s5_upsert_mode_carries_keys() {
    let text = r#"
        SOURCE src TYPE CSV PARAMS {"path":"users.csv"};
        LOAD users FROM src MODE UPSERT KEY (id, email);
    "#;
    let p = plan(text, HashMap::new(), HashMap::new());
    let load = p.operations.iter().find(|o| o.id == "load_users").unwrap();
    match &load.kind {
        OperationKind::Load { mode, upsert_keys, .. } => {
            assert_eq!(*mode, sqlflow_core::ast::LoadMode::Upsert);
            assert_eq!(upsert_keys, &vec!["id".to_string(), "email".to_string()]);
        }
        _ => panic!("expected a load operation"),
    }
}

#[test]
fn missing_variable_without_default_fails_planning() {
    let text = "CREATE TABLE r AS SELECT '${missing}' AS e;";
    let pipeline = sqlflow_parser::parse(text).unwrap();
    let result = Planner::new(HashMap::new(), HashMap::new(), ErrorStrategy::WarnContinue)
        .plan("p", &pipeline);
    assert!(result.is_err());
}

#[test]
fn missing_table_reference_fails_planning() {
    let text = "CREATE TABLE r AS SELECT * FROM never_declared;";
    let pipeline = sqlflow_parser::parse(text).unwrap();
    let result = Planner::new(HashMap::new(), HashMap::new(), ErrorStrategy::WarnContinue)
        .plan("p", &pipeline);
    assert!(result.is_err());
}
