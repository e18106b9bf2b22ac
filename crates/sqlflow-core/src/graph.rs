//! Dependency graph operations over a compiled [`Plan`] (component C3).
//! Grounded in
//! `sqlflow/core/executors/v2/concurrent_execution.py::DependencyGraph`.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::errors::DependencyError;
use crate::op::Operation;

/// Adjacency-list view over a set of operations, built once and queried
/// repeatedly by the execution coordinator.
#[derive(Debug)]
pub struct DependencyGraph<'a> {
    operations: HashMap<&'a str, &'a Operation>,
    /// op id -> ids it depends on
    depends_on: HashMap<&'a str, Vec<&'a str>>,
    /// op id -> ids that depend on it
    dependents: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> DependencyGraph<'a> {
    /// Build a graph from a slice of operations. Fails with
    /// [`DependencyError`] if an operation depends on an id that doesn't
    /// exist, or if the dependency edges contain a cycle.
    pub fn build(operations: &'a [Operation]) -> Result<Self, DependencyError> {
        let mut ops = HashMap::new();
        for op in operations {
            ops.insert(op.id.as_str(), op);
        }

        let mut missing = Vec::new();
        let mut depends_on: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for op in operations {
            dependents.entry(op.id.as_str()).or_default();
            let mut deps = Vec::new();
            for dep in &op.depends_on {
                match ops.get(dep.as_str()) {
                    Some(_) => {
                        deps.push(dep.as_str());
                        dependents.entry(dep.as_str()).or_default().push(op.id.as_str());
                    }
                    None => missing.push(format!("{} -> {}", op.id, dep)),
                }
            }
            depends_on.insert(op.id.as_str(), deps);
        }

        if !missing.is_empty() {
            return Err(DependencyError {
                cycles: Vec::new(),
                missing_dependencies: missing,
                conflicting_dependencies: HashMap::new(),
            });
        }

        let graph = Self {
            operations: ops,
            depends_on,
            dependents,
        };

        if let Some(cycles) = graph.find_cycles() {
            return Err(DependencyError {
                cycles,
                missing_dependencies: Vec::new(),
                conflicting_dependencies: HashMap::new(),
            });
        }

        Ok(graph)
    }

    pub fn operation(&self, id: &str) -> Option<&Operation> {
        self.operations.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// All operation ids currently executable: their dependencies are all
    /// present in `completed`.
    pub fn executable_steps(&self, completed: &HashSet<String>) -> Vec<&'a str> {
        let mut ready: Vec<&str> = self
            .depends_on
            .iter()
            .filter(|(id, deps)| {
                !completed.contains(**id) && deps.iter().all(|d| completed.contains(*d))
            })
            .map(|(id, _)| *id)
            .collect();
        ready.sort_unstable();
        ready
    }

    /// Group all operations into topologically-ordered levels (waves): every
    /// operation in level N depends only on operations in levels < N, and
    /// every operation in a level is independently runnable in parallel.
    pub fn topological_levels(&self) -> Vec<Vec<&'a str>> {
        let mut completed: HashSet<String> = HashSet::new();
        let mut levels = Vec::new();
        while completed.len() < self.operations.len() {
            let ready = self.executable_steps(&completed);
            if ready.is_empty() {
                break;
            }
            for id in &ready {
                completed.insert(id.to_string());
            }
            levels.push(ready);
        }
        levels
    }

    /// Ids that directly depend on `id`.
    pub fn reverse_dependencies(&self, id: &str) -> &[&'a str] {
        self.dependents
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The longest chain of dependencies ending at any terminal operation,
    /// by step count. Used for scheduling diagnostics and the
    /// `speed_optimized` coordinator strategy.
    pub fn critical_path(&self) -> Vec<&'a str> {
        let mut memo: HashMap<&str, Vec<&'a str>> = HashMap::new();
        let order = self.topological_order_flat();

        for id in &order {
            let deps = self.depends_on.get(id).cloned().unwrap_or_default();
            let best = deps
                .iter()
                .map(|d| memo.get(d).cloned().unwrap_or_default())
                .max_by_key(|path| path.len());
            let mut path = best.unwrap_or_default();
            path.push(id);
            memo.insert(id, path);
        }

        memo.into_values()
            .max_by_key(|p| p.len())
            .unwrap_or_default()
    }

    fn topological_order_flat(&self) -> Vec<&'a str> {
        self.topological_levels().into_iter().flatten().collect()
    }

    /// Kahn's algorithm with leftover-node detection: any ids not reachable
    /// via repeated executable-step extraction are part of a cycle.
    fn find_cycles(&self) -> Option<Vec<Vec<String>>> {
        let levels = self.topological_levels();
        let resolved: HashSet<&str> = levels.iter().flatten().copied().collect();
        let remaining: Vec<&str> = self
            .operations
            .keys()
            .copied()
            .filter(|id| !resolved.contains(id))
            .collect();
        if remaining.is_empty() {
            return None;
        }

        let mut cycles = Vec::new();
        let mut seen_in_cycle: HashSet<&str> = HashSet::new();
        for &start in &remaining {
            if seen_in_cycle.contains(start) {
                continue;
            }
            if let Some(cycle) = self.trace_cycle(start, &remaining) {
                for id in &cycle {
                    seen_in_cycle.insert(id);
                }
                cycles.push(cycle.into_iter().map(String::from).collect());
            }
        }
        if cycles.is_empty() {
            cycles.push(remaining.iter().map(|s| s.to_string()).collect());
        }
        Some(cycles)
    }

    fn trace_cycle(&self, start: &'a str, remaining: &[&'a str]) -> Option<Vec<&'a str>> {
        let remaining_set: HashSet<&str> = remaining.iter().copied().collect();
        let mut path = vec![start];
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut current = start;
        loop {
            let deps = self.depends_on.get(current).cloned().unwrap_or_default();
            let next = deps.into_iter().find(|d| remaining_set.contains(d))?;
            if let Some(pos) = path.iter().position(|&id| id == next) {
                return Some(path[pos..].to_vec());
            }
            path.push(next);
            visited.insert(next);
            current = next;
        }
    }

    /// Breadth-first traversal from a set of seed ids, following dependent
    /// edges forward. Used to compute the set of steps invalidated by a
    /// re-run of an upstream step.
    pub fn downstream_of(&self, seeds: &[&str]) -> HashSet<&'a str> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = seeds.iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            for &dep in self.reverse_dependencies(id) {
                if visited.insert(dep) {
                    queue.push_back(dep);
                }
            }
        }
        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::OperationKind;

    fn op(id: &str, deps: &[&str]) -> Operation {
        Operation {
            id: id.to_string(),
            kind: OperationKind::Transform {
                table_name: id.to_string(),
                sql_query: "SELECT 1".into(),
                mode: None,
                is_replace: false,
                merge_keys: vec![],
                time_column: None,
                lookback: None,
            },
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            line_number: None,
        }
    }

    #[test]
    fn levels_group_independent_steps() {
        let ops = vec![op("a", &[]), op("b", &[]), op("c", &["a", "b"])];
        let g = DependencyGraph::build(&ops).unwrap();
        let levels = g.topological_levels();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[1], vec!["c"]);
    }

    #[test]
    fn detects_cycle() {
        let ops = vec![op("a", &["b"]), op("b", &["a"])];
        let err = DependencyGraph::build(&ops).unwrap_err();
        assert_eq!(err.cycles.len(), 1);
    }

    #[test]
    fn detects_missing_dependency() {
        let ops = vec![op("a", &["ghost"])];
        let err = DependencyGraph::build(&ops).unwrap_err();
        assert_eq!(err.missing_dependencies.len(), 1);
    }

    #[test]
    fn critical_path_follows_longest_chain() {
        let ops = vec![op("a", &[]), op("b", &["a"]), op("c", &["b"]), op("d", &["a"])];
        let g = DependencyGraph::build(&ops).unwrap();
        let path = g.critical_path();
        assert_eq!(path, vec!["a", "b", "c"]);
    }

    #[test]
    fn reverse_dependencies_reports_dependents() {
        let ops = vec![op("a", &[]), op("b", &["a"]), op("c", &["a"])];
        let g = DependencyGraph::build(&ops).unwrap();
        let mut rev: Vec<&str> = g.reverse_dependencies("a").to_vec();
        rev.sort_unstable();
        assert_eq!(rev, vec!["b", "c"]);
    }
}
