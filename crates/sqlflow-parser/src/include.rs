//! Expands `INCLUDE "path" AS alias;` statements in place before planning.
//! Recurses into conditional branches. Cycles in the include graph (by
//! resolved file path) are rejected.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sqlflow_core::ast::{Pipeline, Step};

use crate::errors::ParseError;
use crate::parser::Parser;

#[derive(Debug, thiserror::Error)]
pub enum IncludeError {
    #[error("circular include detected: {0}")]
    Cycle(String),
    #[error("failed to read included file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Expand every `INCLUDE` in `pipeline`, resolving relative paths against
/// `base_dir`. `base_dir` is the directory containing the pipeline file
/// currently being expanded.
pub fn expand_includes(pipeline: Pipeline, base_dir: &Path) -> Result<Pipeline, IncludeError> {
    let mut stack = HashSet::new();
    let steps = expand_steps(pipeline.steps, base_dir, &mut stack)?;
    Ok(Pipeline { steps })
}

fn expand_steps(
    steps: Vec<Step>,
    base_dir: &Path,
    stack: &mut HashSet<PathBuf>,
) -> Result<Vec<Step>, IncludeError> {
    let mut out = Vec::with_capacity(steps.len());
    for step in steps {
        match step {
            Step::Include(inc) => {
                let resolved = base_dir.join(&inc.file_path);
                let canonical = resolved.canonicalize().unwrap_or(resolved.clone());
                if !stack.insert(canonical.clone()) {
                    return Err(IncludeError::Cycle(inc.file_path.clone()));
                }
                let text = std::fs::read_to_string(&resolved).map_err(|e| IncludeError::Io {
                    path: inc.file_path.clone(),
                    source: e,
                })?;
                let included = Parser::parse(&text)?;
                let included_base = resolved.parent().unwrap_or(base_dir).to_path_buf();
                let expanded = expand_steps(included.steps, &included_base, stack)?;
                stack.remove(&canonical);
                out.extend(expanded);
            }
            Step::ConditionalBlock(mut cb) => {
                for branch in &mut cb.branches {
                    branch.steps = expand_steps(std::mem::take(&mut branch.steps), base_dir, stack)?;
                }
                if let Some(else_steps) = cb.else_branch.take() {
                    cb.else_branch = Some(expand_steps(else_steps, base_dir, stack)?);
                }
                out.push(Step::ConditionalBlock(cb));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn expands_include_in_place() {
        let dir = std::env::temp_dir().join(format!(
            "sqlflow_include_test_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let included_path = dir.join("common.sf");
        let mut f = std::fs::File::create(&included_path).unwrap();
        writeln!(f, "SET shared = 'x';").unwrap();

        let pipeline = Parser::parse(r#"INCLUDE "common.sf" AS common;"#).unwrap();
        let expanded = expand_includes(pipeline, &dir).unwrap();
        assert_eq!(expanded.steps.len(), 1);
        assert!(matches!(expanded.steps[0], Step::Set(_)));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn detects_self_include_cycle() {
        let dir = std::env::temp_dir().join(format!("sqlflow_cycle_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("a.sf");
        std::fs::write(&path, r#"INCLUDE "a.sf" AS a;"#).unwrap();

        let pipeline = Parser::parse(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let result = expand_includes(pipeline, &dir);
        assert!(matches!(result, Err(IncludeError::Cycle(_))));

        std::fs::remove_dir_all(&dir).ok();
    }
}
