use std::collections::{HashMap, HashSet};

use crate::error::GraphError;
use crate::task::{TaskBody, TaskDef};

/// Graph coloring used by the cycle-detection DFS.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Holds task definitions and the derived `before` adjacency. Mutable only
/// during registration; frozen once `Scheduler::start()` begins.
#[derive(Debug, Default)]
pub struct Graph {
    order: Vec<String>,
    nodes: HashMap<String, TaskDef>,
    before: HashMap<String, HashSet<String>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Predecessors need not already be registered — that
    /// closure is checked once at `start()`, not here.
    pub fn add_node(
        &mut self,
        name: &str,
        body: TaskBody,
        after: Vec<String>,
        tags: Vec<String>,
    ) -> Result<(), GraphError> {
        if name.is_empty() {
            return Err(GraphError::EmptyName);
        }
        if self.nodes.contains_key(name) {
            return Err(GraphError::DuplicateName(name.to_string()));
        }

        let mut deduped = Vec::with_capacity(after.len());
        for dep in after {
            if !deduped.contains(&dep) {
                deduped.push(dep);
            }
        }

        for dep in &deduped {
            self.before.entry(dep.clone()).or_default().insert(name.to_string());
        }
        self.before.entry(name.to_string()).or_default();

        self.order.push(name.to_string());
        self.nodes.insert(
            name.to_string(),
            TaskDef { name: name.to_string(), body, after: deduped, tags },
        );
        Ok(())
    }

    /// Task names in registration order.
    pub fn nodes(&self) -> &[String] {
        &self.order
    }

    pub fn task(&self, name: &str) -> Option<&TaskDef> {
        self.nodes.get(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Predecessor list per task, in registration order — for introspection
    /// and `--graph` dumps, not used by the dispatch loop itself.
    pub fn dependency_counts(&self) -> Vec<(String, Vec<String>)> {
        self.order
            .iter()
            .map(|n| (n.clone(), self.nodes[n].after.clone()))
            .collect()
    }

    /// Tasks with no predecessors: the initial ready set.
    pub fn initial_ready(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|n| self.nodes[*n].after.is_empty())
            .cloned()
            .collect()
    }

    /// Tasks that declare `name` as a predecessor.
    pub fn downstream(&self, name: &str) -> &HashSet<String> {
        static EMPTY: once_empty::Empty = once_empty::Empty;
        self.before.get(name).unwrap_or(EMPTY.get())
    }

    /// Validate closure (every `after` reference is a registered node) and
    /// acyclicity (standard DFS with gray/black coloring), reporting one
    /// representative cycle on failure.
    pub fn validate(&self) -> Result<(), GraphError> {
        for name in &self.order {
            for dep in &self.nodes[name].after {
                if !self.nodes.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        task: name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut color: HashMap<&str, Color> =
            self.order.iter().map(|n| (n.as_str(), Color::White)).collect();
        let mut path: Vec<&str> = Vec::new();

        for start in &self.order {
            if color[start.as_str()] == Color::White {
                if let Some(cycle) = self.dfs_visit(start, &mut color, &mut path) {
                    return Err(GraphError::CycleDetected(cycle.join(" -> ")));
                }
            }
        }
        Ok(())
    }

    fn dfs_visit<'a>(
        &'a self,
        node: &'a str,
        color: &mut HashMap<&'a str, Color>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        color.insert(node, Color::Gray);
        path.push(node);

        for dep in &self.nodes[node].after {
            let dep = dep.as_str();
            match color.get(dep).copied() {
                Some(Color::Gray) => {
                    let start = path.iter().position(|n| *n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(dep.to_string());
                    return Some(cycle);
                }
                Some(Color::White) => {
                    if let Some(cycle) = self.dfs_visit(dep, color, path) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }

        path.pop();
        color.insert(node, Color::Black);
        None
    }
}

/// A static, empty `HashSet` to hand back from `downstream` for leaf tasks
/// without allocating on every lookup.
mod once_empty {
    use std::collections::HashSet;
    use std::sync::OnceLock;

    pub struct Empty;
    impl Empty {
        pub fn get(&self) -> &'static HashSet<String> {
            static CELL: OnceLock<HashSet<String>> = OnceLock::new();
            CELL.get_or_init(HashSet::new)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn noop() -> TaskBody {
        TaskBody::Plain(Arc::new(|| Ok(serde_json::Value::Null)))
    }

    #[test]
    fn rejects_empty_name() {
        let mut g = Graph::new();
        assert_eq!(g.add_node("", noop(), vec![], vec![]), Err(GraphError::EmptyName));
    }

    #[test]
    fn rejects_duplicate_name() {
        let mut g = Graph::new();
        g.add_node("a", noop(), vec![], vec![]).unwrap();
        assert_eq!(
            g.add_node("a", noop(), vec![], vec![]),
            Err(GraphError::DuplicateName("a".to_string()))
        );
    }

    #[test]
    fn predecessors_may_be_registered_later() {
        let mut g = Graph::new();
        g.add_node("b", noop(), vec!["a".to_string()], vec![]).unwrap();
        g.add_node("a", noop(), vec![], vec![]).unwrap();
        assert!(g.validate().is_ok());
    }

    #[test]
    fn detects_unknown_dependency() {
        let mut g = Graph::new();
        g.add_node("b", noop(), vec!["a".to_string()], vec![]).unwrap();
        assert_eq!(
            g.validate(),
            Err(GraphError::UnknownDependency { task: "b".to_string(), dependency: "a".to_string() })
        );
    }

    #[test]
    fn detects_cycle() {
        let mut g = Graph::new();
        g.add_node("p", noop(), vec!["q".to_string()], vec![]).unwrap();
        g.add_node("q", noop(), vec!["p".to_string()], vec![]).unwrap();
        assert!(matches!(g.validate(), Err(GraphError::CycleDetected(_))));
    }

    #[test]
    fn dedups_after_list_preserving_order() {
        let mut g = Graph::new();
        g.add_node("a", noop(), vec![], vec![]).unwrap();
        g.add_node(
            "b",
            noop(),
            vec!["a".to_string(), "a".to_string()],
            vec![],
        )
        .unwrap();
        assert_eq!(g.task("b").unwrap().after, vec!["a".to_string()]);
    }

    #[test]
    fn initial_ready_is_roots_only() {
        let mut g = Graph::new();
        g.add_node("a", noop(), vec![], vec![]).unwrap();
        g.add_node("b", noop(), vec!["a".to_string()], vec![]).unwrap();
        assert_eq!(g.initial_ready(), vec!["a".to_string()]);
    }

    #[test]
    fn downstream_reports_reverse_edges() {
        let mut g = Graph::new();
        g.add_node("a", noop(), vec![], vec![]).unwrap();
        g.add_node("b", noop(), vec!["a".to_string()], vec![]).unwrap();
        g.add_node("c", noop(), vec!["a".to_string()], vec![]).unwrap();
        let mut down: Vec<&String> = g.downstream("a").iter().collect();
        down.sort();
        assert_eq!(down, vec!["b", "c"]);
    }

    #[test]
    fn empty_graph_has_no_ready_nodes() {
        let g = Graph::new();
        assert!(g.is_empty());
        assert!(g.initial_ready().is_empty());
        assert!(g.validate().is_ok());
    }
}
