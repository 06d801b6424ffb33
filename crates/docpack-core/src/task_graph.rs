//! Task dependency graph and execution ordering.
//!
//! An edge `A → B` means "B depends on A": A must finish before B may run.
//! Ordering uses Kahn's algorithm; among ready tasks the one declared first
//! in `tasks.json` goes first, so the order is fully deterministic.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use thiserror::Error;

use crate::bundle::TaskSpec;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskGraphError {
    #[error("duplicate task id: {id}")]
    DuplicateTask { id: String },

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("cyclic task dependency among: {}", members.join(", "))]
    CyclicDependency { members: Vec<String> },
}

pub type TaskGraphResult<T> = std::result::Result<T, TaskGraphError>;

/// Validated dependency graph over declared tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskGraph {
    ids: Vec<String>,
    /// `index → indices it depends on`
    upstream: Vec<BTreeSet<usize>>,
    /// `index → indices depending on it`
    downstream: Vec<BTreeSet<usize>>,
    order: Vec<usize>,
}

impl TaskGraph {
    pub fn build(tasks: &[TaskSpec]) -> TaskGraphResult<Self> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            if index.insert(task.id.as_str(), i).is_some() {
                return Err(TaskGraphError::DuplicateTask {
                    id: task.id.clone(),
                });
            }
        }

        let mut upstream = vec![BTreeSet::new(); tasks.len()];
        let mut downstream = vec![BTreeSet::new(); tasks.len()];
        for (i, task) in tasks.iter().enumerate() {
            for dep in &task.depends_on {
                let &d = index
                    .get(dep.as_str())
                    .ok_or_else(|| TaskGraphError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    })?;
                upstream[i].insert(d);
                downstream[d].insert(i);
            }
        }

        let mut graph = Self {
            ids: tasks.iter().map(|t| t.id.clone()).collect(),
            upstream,
            downstream,
            order: Vec::new(),
        };
        graph.order = graph.kahn()?;
        Ok(graph)
    }

    fn kahn(&self) -> TaskGraphResult<Vec<usize>> {
        let mut in_degree: Vec<usize> = self.upstream.iter().map(BTreeSet::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &deg)| deg == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut sorted = Vec::with_capacity(self.ids.len());
        while let Some(Reverse(i)) = ready.pop() {
            sorted.push(i);
            for &next in &self.downstream[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if sorted.len() < self.ids.len() {
            let remaining: BTreeSet<usize> = in_degree
                .iter()
                .enumerate()
                .filter(|(_, &deg)| deg > 0)
                .map(|(i, _)| i)
                .collect();
            return Err(TaskGraphError::CyclicDependency {
                members: self.cycle_in(&remaining),
            });
        }
        Ok(sorted)
    }

    /// Every unsorted node has at least one unsorted dependency, so walking
    /// upstream inside `remaining` must revisit a node. The revisited segment
    /// is a cycle.
    fn cycle_in(&self, remaining: &BTreeSet<usize>) -> Vec<String> {
        let Some(&start) = remaining.iter().next() else {
            return Vec::new();
        };
        let mut path: Vec<usize> = Vec::new();
        let mut position: HashMap<usize, usize> = HashMap::new();
        let mut current = start;
        loop {
            if let Some(&at) = position.get(&current) {
                let mut members: Vec<usize> = path[at..].to_vec();
                members.sort_unstable();
                return members.into_iter().map(|i| self.ids[i].clone()).collect();
            }
            position.insert(current, path.len());
            path.push(current);
            match self.upstream[current].iter().find(|&&d| remaining.contains(&d)) {
                Some(&next) => current = next,
                None => {
                    // Unreachable for a well-formed remainder; report what we have.
                    return remaining.iter().map(|&i| self.ids[i].clone()).collect();
                }
            }
        }
    }

    /// Task ids in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.ids[i].as_str()).collect()
    }

    /// Declaration indices in execution order.
    pub fn order_indices(&self) -> &[usize] {
        &self.order
    }

    /// Direct dependencies of the task declared at `index`, in declaration order.
    pub fn dependencies(&self, index: usize) -> Vec<&str> {
        self.upstream
            .get(index)
            .map(|deps| deps.iter().map(|&d| self.ids[d].as_str()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::OutputSpec;

    fn task(id: &str, deps: &[&str]) -> TaskSpec {
        TaskSpec {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            tools_allowed: BTreeSet::new(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            output: OutputSpec {
                kind: "markdown".to_string(),
                path: format!("{id}.md"),
            },
        }
    }

    #[test]
    fn test_independent_tasks_keep_declaration_order() {
        let graph = TaskGraph::build(&[task("c", &[]), task("a", &[]), task("b", &[])]).unwrap();
        assert_eq!(graph.order(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_dependencies_come_first() {
        let tasks = [
            task("docs", &["api", "overview"]),
            task("overview", &[]),
            task("api", &["overview"]),
        ];
        let graph = TaskGraph::build(&tasks).unwrap();
        assert_eq!(graph.order(), vec!["overview", "api", "docs"]);
        assert_eq!(graph.dependencies(0), vec!["overview", "api"]);
    }

    #[test]
    fn test_ready_ties_break_by_declaration() {
        // After "root", both "z" and "y" are ready; "z" was declared first.
        let tasks = [task("root", &[]), task("z", &["root"]), task("y", &["root"])];
        let graph = TaskGraph::build(&tasks).unwrap();
        assert_eq!(graph.order(), vec!["root", "z", "y"]);
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let tasks = [
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
        ];
        let first = TaskGraph::build(&tasks).unwrap();
        for _ in 0..10 {
            assert_eq!(TaskGraph::build(&tasks).unwrap().order(), first.order());
        }
    }

    #[test]
    fn test_cycle_reports_members_only() {
        let tasks = [
            task("setup", &[]),
            task("a", &["c", "setup"]),
            task("b", &["a"]),
            task("c", &["b"]),
            task("downstream", &["c"]),
        ];
        let err = TaskGraph::build(&tasks).unwrap_err();
        assert_eq!(
            err,
            TaskGraphError::CyclicDependency {
                members: vec!["a".to_string(), "b".to_string(), "c".to_string()]
            }
        );
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = TaskGraph::build(&[task("a", &["a"])]).unwrap_err();
        assert_eq!(
            err,
            TaskGraphError::CyclicDependency {
                members: vec!["a".to_string()]
            }
        );
    }

    #[test]
    fn test_unknown_dependency_and_duplicates() {
        let err = TaskGraph::build(&[task("a", &["ghost"])]).unwrap_err();
        assert!(matches!(err, TaskGraphError::UnknownDependency { .. }));

        let err = TaskGraph::build(&[task("a", &[]), task("a", &[])]).unwrap_err();
        assert_eq!(
            err,
            TaskGraphError::DuplicateTask {
                id: "a".to_string()
            }
        );
    }
}
