//! Task dependency graph.
//!
//! Nodes are declared in a list; edges come from each node's upstream names.
//! Scheduling uses Kahn's algorithm with ties broken by declaration order, so
//! a list that is already a valid order runs unchanged.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::errors::{AgentError, Result};
use crate::tasks::StructuredTask;

/// Heading of the block that carries upstream outputs with no placeholder
pub const UPSTREAM_BLOCK_HEADER: &str = "Outputs from upstream tasks:";

/// One pipeline step and the steps it waits for
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub name: String,
    pub task: StructuredTask,
    pub upstream: Vec<String>,
    /// Envelope key whose value is handed downstream instead of the raw text
    pub output_key: Option<String>,
}

impl TaskNode {
    pub fn new(task: StructuredTask, upstream: &[&str]) -> Self {
        let mut seen = HashSet::new();
        let upstream = upstream
            .iter()
            .filter(|name| seen.insert(**name))
            .map(|name| name.to_string())
            .collect();
        Self {
            name: task.name.clone(),
            task,
            upstream,
            output_key: None,
        }
    }

    pub fn with_output_key(mut self, key: &str) -> Self {
        self.output_key = Some(key.to_string());
        self
    }

    /// Task with upstream outputs threaded into its instructions.
    ///
    /// `{{name}}` placeholders are replaced in place; outputs of upstreams
    /// without a placeholder are appended under [`UPSTREAM_BLOCK_HEADER`].
    pub fn bind_upstream(&self, outputs: &HashMap<String, String>) -> StructuredTask {
        let mut task = self.task.clone();
        let mut unplaced = Vec::new();

        for name in &self.upstream {
            let Some(output) = outputs.get(name) else {
                continue;
            };
            let placeholder = format!("{{{{{}}}}}", name);
            if task.instructions.contains(&placeholder) {
                task.instructions = task.instructions.replace(&placeholder, output);
            } else {
                unplaced.push(format!("{}: {}", name, output));
            }
        }

        if !unplaced.is_empty() {
            let block = format!("{}\n{}", UPSTREAM_BLOCK_HEADER, unplaced.join("\n"));
            if task.instructions.trim().is_empty() {
                task.instructions = block;
            } else {
                task.instructions = format!("{}\n\n{}", task.instructions.trim_end(), block);
            }
        }

        task
    }
}

/// Declared set of pipeline nodes
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a declared node list
    pub fn from_nodes(nodes: Vec<TaskNode>) -> Result<Self> {
        let mut graph = Self::new();
        for node in nodes {
            graph.push(node)?;
        }
        Ok(graph)
    }

    /// Declare a task with the names of the tasks it depends on
    pub fn add(&mut self, task: StructuredTask, upstream: &[&str]) -> Result<&mut Self> {
        self.push(TaskNode::new(task, upstream))?;
        Ok(self)
    }

    /// Declare a prepared node
    pub fn add_node(&mut self, node: TaskNode) -> Result<&mut Self> {
        self.push(node)?;
        Ok(self)
    }

    fn push(&mut self, node: TaskNode) -> Result<()> {
        if self.nodes.iter().any(|n| n.name == node.name) {
            return Err(AgentError::DuplicateTask(node.name));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    fn index(&self) -> HashMap<&str, usize> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.as_str(), i))
            .collect()
    }

    fn check_dependencies(&self, index: &HashMap<&str, usize>) -> Result<()> {
        for node in &self.nodes {
            for dep in &node.upstream {
                if !index.contains_key(dep.as_str()) {
                    return Err(AgentError::UnknownDependency {
                        task: node.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Execution order as node references
    pub fn topological_order(&self) -> Result<Vec<&TaskNode>> {
        if self.nodes.is_empty() {
            return Err(AgentError::EmptyPipeline);
        }

        let index = self.index();
        self.check_dependencies(&index)?;

        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.upstream.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.upstream {
                if let Some(&d) = index.get(dep.as_str()) {
                    dependents[d].push(i);
                }
            }
        }

        // Lowest declaration index first
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(next) = ready.pop_first() {
            order.push(&self.nodes[next]);
            for &child in &dependents[next] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    ready.insert(child);
                }
            }
        }

        if order.len() < self.nodes.len() {
            let stuck: Vec<String> = self
                .nodes
                .iter()
                .zip(&in_degree)
                .filter(|(_, degree)| **degree > 0)
                .map(|(n, _)| n.name.clone())
                .collect();
            return Err(AgentError::DependencyCycle(stuck));
        }

        Ok(order)
    }

    /// Execution order as task names
    pub fn order_names(&self) -> Result<Vec<String>> {
        Ok(self
            .topological_order()?
            .into_iter()
            .map(|n| n.name.clone())
            .collect())
    }

    /// Reject a declaration list that places a task before one of its upstreams
    pub fn validate_declared_order(&self) -> Result<()> {
        let index = self.index();
        self.check_dependencies(&index)?;

        for (position, node) in self.nodes.iter().enumerate() {
            for dep in &node.upstream {
                if index.get(dep.as_str()).is_some_and(|&d| d >= position) {
                    return Err(AgentError::DependencyOrder {
                        task: node.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str) -> StructuredTask {
        StructuredTask::new(name, format!("run {}", name))
    }

    #[test]
    fn test_declared_order_kept_when_valid() {
        let mut graph = TaskGraph::new();
        graph.add(task("RouteIssue"), &[]).unwrap();
        graph.add(task("AnalyzeSentiment"), &[]).unwrap();
        graph
            .add(task("CheckEscalation"), &["RouteIssue", "AnalyzeSentiment"])
            .unwrap();
        graph
            .add(
                task("GenerateResponse"),
                &["RouteIssue", "AnalyzeSentiment", "CheckEscalation"],
            )
            .unwrap();

        assert!(graph.validate_declared_order().is_ok());
        assert_eq!(
            graph.order_names().unwrap(),
            vec!["RouteIssue", "AnalyzeSentiment", "CheckEscalation", "GenerateResponse"]
        );
    }

    #[test]
    fn test_reversed_declaration_is_reordered() {
        let mut graph = TaskGraph::new();
        graph.add(task("B"), &["A"]).unwrap();
        graph.add(task("A"), &[]).unwrap();

        assert!(matches!(
            graph.validate_declared_order(),
            Err(AgentError::DependencyOrder { ref task, ref dependency }) if task == "B" && dependency == "A"
        ));
        assert_eq!(graph.order_names().unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn test_unknown_dependency() {
        let mut graph = TaskGraph::new();
        graph.add(task("B"), &["Missing"]).unwrap();
        let err = graph.topological_order().unwrap_err();
        assert!(matches!(err, AgentError::UnknownDependency { .. }));
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = TaskGraph::new();
        graph.add(task("Root"), &[]).unwrap();
        graph.add(task("A"), &["B"]).unwrap();
        graph.add(task("B"), &["A"]).unwrap();

        match graph.topological_order() {
            Err(AgentError::DependencyCycle(names)) => assert_eq!(names, vec!["A", "B"]),
            other => panic!("expected cycle, got {:?}", other.map(|o| o.len())),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let mut graph = TaskGraph::new();
        graph.add(task("A"), &["A"]).unwrap();
        assert!(matches!(
            graph.topological_order(),
            Err(AgentError::DependencyCycle(_))
        ));
    }

    #[test]
    fn test_duplicate_and_empty() {
        let mut graph = TaskGraph::new();
        assert!(matches!(graph.topological_order(), Err(AgentError::EmptyPipeline)));
        graph.add(task("A"), &[]).unwrap();
        assert!(matches!(
            graph.add(task("A"), &[]),
            Err(AgentError::DuplicateTask(_))
        ));
    }

    #[test]
    fn test_repeated_upstream_counted_once() {
        let mut graph = TaskGraph::new();
        graph.add(task("A"), &[]).unwrap();
        graph.add(task("B"), &["A", "A"]).unwrap();
        assert_eq!(graph.get("B").unwrap().upstream, vec!["A"]);
        assert_eq!(graph.order_names().unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn test_bind_upstream_placeholder_and_block() {
        let node = TaskNode::new(
            StructuredTask::new("CheckEscalation", "Issue type: {{RouteIssue}}"),
            &["RouteIssue", "AnalyzeSentiment"],
        );
        let mut outputs = HashMap::new();
        outputs.insert("RouteIssue".to_string(), "billing".to_string());
        outputs.insert("AnalyzeSentiment".to_string(), "Negative".to_string());

        let bound = node.bind_upstream(&outputs);
        assert_eq!(
            bound.instructions,
            "Issue type: billing\n\nOutputs from upstream tasks:\nAnalyzeSentiment: Negative"
        );
        // The declared node is untouched
        assert!(node.task.instructions.contains("{{RouteIssue}}"));
    }
}
