//! Runs a full pipeline: parse DSL, plan, execute against a real CSV file
//! on disk and a real CSV output file, through the coordinator.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use sqlflow_core::errors::handler::ErrorStrategy;
use sqlflow_core::vars::VariableResolver;
use sqlflow_exec::{Coordinator, ExecutionContext, Strategy};
use sqlflow_planner::Planner;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn runs_load_transform_export_against_real_files() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("customers.csv");
    let mut f = std::fs::File::create(&input_path).unwrap();
    writeln!(f, "id,name").unwrap();
    writeln!(f, "1,ada").unwrap();
    writeln!(f, "2,grace").unwrap();
    drop(f);

    let output_path = dir.path().join("out").join("clean.csv");

    let text = format!(
        r#"
            SOURCE customers TYPE CSV PARAMS {{"path":"{input}"}};
            LOAD raw_customers FROM customers;
            CREATE TABLE clean AS SELECT id, UPPER(name) AS name FROM raw_customers;
            EXPORT SELECT * FROM clean TO "{output}" TYPE CSV OPTIONS {{"header":true}};
        "#,
        input = input_path.display().to_string().replace('\\', "/"),
        output = output_path.display().to_string().replace('\\', "/"),
    );

    let pipeline = sqlflow_parser::parse(&text).expect("pipeline should parse");
    let plan = Planner::new(HashMap::new(), HashMap::new(), ErrorStrategy::WarnContinue)
        .plan("end_to_end", &pipeline)
        .expect("pipeline should plan");

    let ctx = ExecutionContext::new(
        Arc::new(datafusion::execution::context::SessionContext::new()),
        Arc::new(VariableResolver::new(HashMap::new(), HashMap::new())),
        ErrorStrategy::WarnContinue,
    );

    let coordinator = Coordinator::new(Strategy::Auto, "run-e2e");
    let result = coordinator
        .run(&plan, ctx, CancellationToken::new())
        .await
        .expect("run should complete");

    assert!(result.success, "run failed: {:?}", result.first_error);
    assert!(output_path.exists(), "export should have written output");

    let written = read_all_csv_text(&output_path);
    assert!(written.contains("ADA") || written.contains("GRACE"));
}

/// DataFusion's `write_csv` may produce either a single file at the given
/// path or a directory of part files, depending on the output plan — read
/// whichever shape actually landed.
fn read_all_csv_text(path: &std::path::Path) -> String {
    if path.is_dir() {
        let mut combined = String::new();
        for entry in std::fs::read_dir(path).unwrap() {
            let entry = entry.unwrap();
            combined.push_str(&std::fs::read_to_string(entry.path()).unwrap());
        }
        combined
    } else {
        std::fs::read_to_string(path).unwrap()
    }
}
