use std::collections::{HashMap, HashSet};

use crate::error::GraphError;
use crate::executor::types::{TaskLike, TaskStatus};

/// Task dependency graph (DAG) for one flow.
///
/// Nodes live in an id-keyed map plus an insertion-order index, so the graph
/// never holds references between tasks. The graph only grows.
#[derive(Debug, Clone)]
pub struct TaskGraph<T: TaskLike> {
    /// Task nodes: task_id -> Task
    nodes: HashMap<String, T>,

    /// Reverse edges: task_id -> tasks that depend on it
    reverse_edges: HashMap<String, Vec<String>>,

    /// Discovery order
    insertion_order: Vec<String>,

    /// Set once `validate` succeeds; cleared by anything that could break validity.
    validated: bool,
}

impl<T: TaskLike> Default for TaskGraph<T> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            reverse_edges: HashMap::new(),
            insertion_order: Vec::new(),
            validated: true,
        }
    }
}

impl<T: TaskLike> TaskGraph<T> {
    /// Construct a task graph from a task list. Only duplicate ids are rejected
    /// here; call [`TaskGraph::validate`] before scheduling.
    pub fn from_tasks(tasks: Vec<T>) -> Result<Self, GraphError> {
        let mut graph = Self {
            validated: false,
            ..Self::default()
        };

        for task in tasks {
            if graph.nodes.contains_key(task.id()) {
                return Err(GraphError::DuplicateTaskId(task.id().to_string()));
            }
            graph.insert(task);
        }

        Ok(graph)
    }

    fn insert(&mut self, task: T) {
        let task_id = task.id().to_string();
        for dep in task.dependencies() {
            self.reverse_edges
                .entry(dep.clone())
                .or_default()
                .push(task_id.clone());
        }
        self.insertion_order.push(task_id.clone());
        self.nodes.insert(task_id, task);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.nodes.contains_key(task_id)
    }

    pub fn get(&self, task_id: &str) -> Option<&T> {
        self.nodes.get(task_id)
    }

    /// Mutable access for status updates. Callers must not touch dependencies.
    pub fn get_mut(&mut self, task_id: &str) -> Option<&mut T> {
        self.nodes.get_mut(task_id)
    }

    pub fn ids(&self) -> &[String] {
        &self.insertion_order
    }

    /// Tasks in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.insertion_order
            .iter()
            .filter_map(|id| self.nodes.get(id))
    }

    /// Tasks that list `task_id` as a dependency.
    pub fn dependents(&self, task_id: &str) -> &[String] {
        self.reverse_edges
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn status_snapshot(&self) -> HashMap<String, TaskStatus> {
        self.nodes
            .iter()
            .map(|(id, task)| (id.clone(), task.status()))
            .collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.nodes.values().all(|t| t.status().is_terminal())
    }

    pub fn ids_with_status(&self, status: TaskStatus) -> Vec<String> {
        self.iter()
            .filter(|t| t.status() == status)
            .map(|t| t.id().to_string())
            .collect()
    }

    /// Ready frontier against an explicit status snapshot: Pending tasks whose
    /// every dependency is Completed, in insertion order. Ids missing from the
    /// snapshot count as not completed.
    pub fn ready_from(&self, statuses: &HashMap<String, TaskStatus>) -> Vec<String> {
        self.ready_by(|id| statuses.get(id).copied())
    }

    /// Ready frontier against the statuses held by the nodes themselves.
    pub fn ready(&self) -> Vec<String> {
        self.ready_by(|id| self.nodes.get(id).map(|t| t.status()))
    }

    fn ready_by<F>(&self, status_of: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<TaskStatus>,
    {
        self.iter()
            .filter(|task| status_of(task.id()) == Some(TaskStatus::Pending))
            .filter(|task| {
                task.dependencies()
                    .iter()
                    .all(|dep| status_of(dep) == Some(TaskStatus::Completed))
            })
            .map(|task| task.id().to_string())
            .collect()
    }

    /// Validate dependency relationships. A no-op when nothing changed since the
    /// last successful run.
    pub fn validate(&mut self) -> Result<(), GraphError> {
        if self.validated {
            return Ok(());
        }
        self.check()?;
        self.validated = true;
        Ok(())
    }

    /// Full walk over every edge, ignoring the cached result.
    pub fn check(&self) -> Result<(), GraphError> {
        for task in self.iter() {
            for dep in task.dependencies() {
                if !self.nodes.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        task_id: task.id().to_string(),
                        missing_dep: dep.clone(),
                    });
                }
            }
        }

        let scope: Vec<&str> = self.insertion_order.iter().map(String::as_str).collect();
        if let Some(cycle) = self.detect_cycle(&scope, |id| self.nodes.get(id)) {
            return Err(GraphError::DependencyCycle(cycle));
        }

        Ok(())
    }

    /// Merge a batch of newly discovered tasks.
    ///
    /// Dependencies may point at existing tasks or at other tasks in the batch.
    /// Existing tasks never depend on new ones, so a cycle must pass through the
    /// batch and only the batch is searched. A rejected batch leaves the graph
    /// untouched. Returns the new ids in insertion order.
    pub fn append(&mut self, batch: Vec<T>) -> Result<Vec<String>, GraphError> {
        let mut batch_nodes: HashMap<&str, &T> = HashMap::with_capacity(batch.len());
        for task in &batch {
            if self.nodes.contains_key(task.id()) || batch_nodes.contains_key(task.id()) {
                return Err(GraphError::DuplicateTaskId(task.id().to_string()));
            }
            batch_nodes.insert(task.id(), task);
        }

        for task in &batch {
            for dep in task.dependencies() {
                if !self.nodes.contains_key(dep) && !batch_nodes.contains_key(dep.as_str()) {
                    return Err(GraphError::UnknownDependency {
                        task_id: task.id().to_string(),
                        missing_dep: dep.clone(),
                    });
                }
            }
        }

        let scope: Vec<&str> = batch.iter().map(|t| t.id()).collect();
        if let Some(cycle) = self.detect_cycle(&scope, |id| batch_nodes.get(id).copied()) {
            return Err(GraphError::DependencyCycle(cycle));
        }

        let ids: Vec<String> = scope.iter().map(|id| id.to_string()).collect();
        for task in batch {
            self.insert(task);
        }
        Ok(ids)
    }

    /// Topological sort using Kahn's algorithm.
    ///
    /// Returns execution stages where tasks in the same stage have no ordering
    /// constraint between them. Stage members keep insertion order.
    pub fn topological_stages(&self) -> Result<Vec<Vec<String>>, GraphError> {
        self.check()?;

        let position: HashMap<&str, usize> = self
            .insertion_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .values()
            .map(|t| (t.id(), t.dependencies().len()))
            .collect();

        let mut current: Vec<&str> = self
            .insertion_order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();

        let mut stages = Vec::new();
        while !current.is_empty() {
            let mut next = Vec::new();
            for id in &current {
                for dependent in self.dependents(id) {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(dependent.as_str());
                        }
                    }
                }
            }
            next.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));
            stages.push(current.iter().map(|id| id.to_string()).collect());
            current = next;
        }

        Ok(stages)
    }

    /// DFS with a recursion-stack marker over the tasks in `scope`. `lookup`
    /// resolves nodes that belong to the searched region; edges leaving the
    /// region are not followed.
    fn detect_cycle<'a, F>(&self, scope: &[&'a str], lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<&'a T>,
        T: 'a,
    {
        let mut visited: HashSet<&'a str> = HashSet::new();
        let mut stack: Vec<&'a str> = Vec::new();

        for &task_id in scope {
            if !visited.contains(task_id) {
                if let Some(cycle) = dfs_cycle(task_id, &lookup, &mut visited, &mut stack) {
                    return Some(cycle);
                }
            }
        }

        None
    }
}

fn dfs_cycle<'a, T, F>(
    node: &'a str,
    lookup: &F,
    visited: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
) -> Option<String>
where
    T: TaskLike + 'a,
    F: Fn(&str) -> Option<&'a T>,
{
    visited.insert(node);
    stack.push(node);

    if let Some(task) = lookup(node) {
        for dep in task.dependencies() {
            // dependency still on the current path
            if let Some(pos) = stack.iter().position(|x| *x == dep.as_str()) {
                let mut path: Vec<&str> = stack[pos..].to_vec();
                path.push(dep);
                return Some(path.join(" -> "));
            }

            if let Some(next) = lookup(dep) {
                if !visited.contains(next.id()) {
                    if let Some(cycle) = dfs_cycle(next.id(), lookup, visited, stack) {
                        return Some(cycle);
                    }
                }
            }
        }
    }

    stack.pop();
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::types::{Task, TaskSpec};
    use pretty_assertions::assert_eq;

    fn task(id: &str, deps: &[&str]) -> Task {
        Task::from_spec(
            "flow",
            TaskSpec::new(id, "default")
                .with_id(id)
                .depends_on(deps.iter().copied()),
            None,
        )
    }

    fn set(graph: &mut TaskGraph<Task>, id: &str, status: TaskStatus) {
        graph.get_mut(id).unwrap().status = status;
    }

    #[test]
    fn test_ready_requires_completed_dependencies() {
        let mut graph =
            TaskGraph::from_tasks(vec![task("a", &[]), task("b", &[]), task("c", &["a", "b"])])
                .unwrap();
        graph.validate().unwrap();
        assert_eq!(graph.ready(), vec!["a", "b"]);

        set(&mut graph, "a", TaskStatus::Completed);
        set(&mut graph, "b", TaskStatus::InProgress);
        assert_eq!(graph.ready(), Vec::<String>::new());

        set(&mut graph, "b", TaskStatus::Failed);
        assert_eq!(graph.ready(), Vec::<String>::new());

        set(&mut graph, "b", TaskStatus::Completed);
        assert_eq!(graph.ready(), vec!["c"]);
    }

    #[test]
    fn test_ready_from_explicit_snapshot() {
        let graph = TaskGraph::from_tasks(vec![task("a", &[]), task("b", &["a"])]).unwrap();
        let mut statuses = graph.status_snapshot();
        statuses.insert("a".into(), TaskStatus::Completed);

        assert_eq!(graph.ready_from(&statuses), vec!["b"]);
        // the graph's own statuses are untouched
        assert_eq!(graph.ready(), vec!["a"]);
    }

    #[test]
    fn test_ready_never_returns_task_with_unfinished_dependency() {
        let graph = TaskGraph::from_tasks(vec![
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["b"]),
            task("d", &["a", "c"]),
        ])
        .unwrap();
        let all = [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Skipped,
        ];

        for sa in all {
            for sb in all {
                for sc in all {
                    let statuses: HashMap<String, TaskStatus> = [
                        ("a".to_string(), sa),
                        ("b".to_string(), sb),
                        ("c".to_string(), sc),
                        ("d".to_string(), TaskStatus::Pending),
                    ]
                    .into_iter()
                    .collect();
                    for id in graph.ready_from(&statuses) {
                        let deps = graph.get(&id).unwrap().dependencies();
                        assert!(deps.iter().all(|d| statuses[d] == TaskStatus::Completed));
                        assert_eq!(statuses[&id], TaskStatus::Pending);
                    }
                }
            }
        }
    }

    #[test]
    fn test_validate_detects_cycle() {
        let mut graph =
            TaskGraph::from_tasks(vec![task("a", &["c"]), task("b", &["a"]), task("c", &["b"])])
                .unwrap();
        let err = graph.validate().unwrap_err();
        assert_eq!(err, GraphError::DependencyCycle("a -> c -> b -> a".to_string()));
    }

    #[test]
    fn test_validate_detects_self_dependency() {
        let mut graph = TaskGraph::from_tasks(vec![task("a", &["a"])]).unwrap();
        assert!(matches!(
            graph.validate(),
            Err(GraphError::DependencyCycle(_))
        ));
    }

    #[test]
    fn test_validate_unknown_dependency() {
        let mut graph = TaskGraph::from_tasks(vec![task("a", &["ghost"])]).unwrap();
        assert_eq!(
            graph.validate().unwrap_err(),
            GraphError::UnknownDependency {
                task_id: "a".into(),
                missing_dep: "ghost".into()
            }
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = TaskGraph::from_tasks(vec![task("a", &[]), task("a", &[])]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateTaskId("a".into()));
    }

    #[test]
    fn test_append_batch_with_internal_dependencies() {
        let mut graph = TaskGraph::from_tasks(vec![task("a", &[])]).unwrap();
        graph.validate().unwrap();

        let ids = graph
            .append(vec![task("b", &["a", "c"]), task("c", &["a"])])
            .unwrap();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.ids(), &["a", "b", "c"]);
        assert_eq!(graph.dependents("a"), &["b", "c"]);
        graph.validate().unwrap();
        graph.check().unwrap();
    }

    #[test]
    fn test_append_rejects_cycle_inside_batch_atomically() {
        let mut graph = TaskGraph::from_tasks(vec![task("a", &[])]).unwrap();
        graph.validate().unwrap();

        let err = graph
            .append(vec![task("x", &["a", "y"]), task("y", &["x"])])
            .unwrap_err();
        assert!(matches!(err, GraphError::DependencyCycle(_)));
        assert_eq!(graph.len(), 1);
        assert!(graph.dependents("a").is_empty());
    }

    #[test]
    fn test_append_rejects_unknown_and_duplicate() {
        let mut graph = TaskGraph::from_tasks(vec![task("a", &[])]).unwrap();

        assert!(matches!(
            graph.append(vec![task("b", &["nope"])]),
            Err(GraphError::UnknownDependency { .. })
        ));
        assert_eq!(
            graph.append(vec![task("a", &[])]).unwrap_err(),
            GraphError::DuplicateTaskId("a".into())
        );
        assert_eq!(
            graph
                .append(vec![task("n", &[]), task("n", &[])])
                .unwrap_err(),
            GraphError::DuplicateTaskId("n".into())
        );
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_topological_stages_keep_insertion_order() {
        let graph = TaskGraph::from_tasks(vec![
            task("setup", &[]),
            task("lint", &["setup"]),
            task("build", &["setup"]),
            task("ship", &["build", "lint"]),
            task("docs", &[]),
        ])
        .unwrap();

        let stages = graph.topological_stages().unwrap();
        assert_eq!(
            stages,
            vec![
                vec!["setup".to_string(), "docs".to_string()],
                vec!["lint".to_string(), "build".to_string()],
                vec!["ship".to_string()],
            ]
        );
    }
}
