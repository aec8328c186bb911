//! Cycle removal by topological reachability.
//!
//! Kahn's algorithm is run over the resolved link set; every node that is ever dequeued is
//! *valid*. Nodes on a cycle never reach in-degree zero, and neither does anything downstream of
//! one, so whole cyclic components are dropped rather than minimally broken. Looped navigation is
//! treated as noise next to the dominant flow.

use crate::model::FlowGraph;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A link whose endpoints resolved to node indices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLink {
    /// Position of the link in [`FlowGraph::links`].
    pub link: usize,
    pub source: usize,
    pub target: usize,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleBreak {
    /// Surviving links in original relative order.
    pub links: Vec<ResolvedLink>,
    /// Dequeue order of the valid nodes (a topological order).
    pub order: Vec<usize>,
    /// `valid[i]` is true iff node `i` was dequeued.
    pub valid: Vec<bool>,
    /// Links dropped because an endpoint name is not in the node set.
    pub dangling: usize,
    /// Resolved links dropped because an endpoint is not valid.
    pub removed: usize,
}

impl CycleBreak {
    pub fn is_valid(&self, node: usize) -> bool {
        self.valid.get(node).copied().unwrap_or(false)
    }

    pub fn valid_count(&self) -> usize {
        self.order.len()
    }
}

pub fn break_cycles(graph: &FlowGraph) -> CycleBreak {
    let node_count = graph.nodes.len();
    let by_name = graph.name_index();

    let mut resolved: Vec<ResolvedLink> = Vec::with_capacity(graph.links.len());
    let mut dangling = 0usize;
    for (i, l) in graph.links.iter().enumerate() {
        let (Some(&source), Some(&target)) = (
            by_name.get(l.source.as_str()),
            by_name.get(l.target.as_str()),
        ) else {
            tracing::debug!(
                index = i,
                source = l.source.as_str(),
                target = l.target.as_str(),
                "dropping link with unknown endpoint"
            );
            dangling += 1;
            continue;
        };
        resolved.push(ResolvedLink {
            link: i,
            source,
            target,
            value: l.value,
        });
    }

    let order = kahn(node_count, resolved.iter().map(|l| (l.source, l.target)));
    let mut valid = vec![false; node_count];
    for &n in &order {
        valid[n] = true;
    }

    let before = resolved.len();
    resolved.retain(|l| valid[l.source] && valid[l.target]);
    let removed = before - resolved.len();
    if removed > 0 {
        tracing::debug!(
            removed,
            invalid_nodes = node_count - order.len(),
            "removed links on or behind cycles"
        );
    }

    CycleBreak {
        links: resolved,
        order,
        valid,
        dangling,
        removed,
    }
}

/// Returns a topological order of `0..node_count`, or `None` when `edges` contain a cycle.
pub fn topological_order(
    node_count: usize,
    edges: impl IntoIterator<Item = (usize, usize)>,
) -> Option<Vec<usize>> {
    let order = kahn(node_count, edges);
    (order.len() == node_count).then_some(order)
}

/// Kahn's algorithm. The initial queue holds all zero in-degree nodes by ascending index; nodes
/// released by the same dequeue are appended by ascending index.
fn kahn(node_count: usize, edges: impl IntoIterator<Item = (usize, usize)>) -> Vec<usize> {
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    let mut in_degree = vec![0usize; node_count];
    for (s, t) in edges {
        if s >= node_count || t >= node_count {
            continue;
        }
        successors[s].push(t);
        in_degree[t] += 1;
    }

    let mut queue: VecDeque<usize> = (0..node_count).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(node_count);
    let mut released: Vec<usize> = Vec::new();
    while let Some(n) = queue.pop_front() {
        order.push(n);
        for &t in &successors[n] {
            in_degree[t] -= 1;
            if in_degree[t] == 0 {
                released.push(t);
            }
        }
        released.sort_unstable();
        queue.extend(released.drain(..));
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlowLink, FlowNode};

    fn graph(nodes: &[&str], links: &[(&str, &str, f64)]) -> FlowGraph {
        FlowGraph {
            nodes: nodes
                .iter()
                .enumerate()
                .map(|(index, name)| FlowNode {
                    name: name.to_string(),
                    index,
                    synthetic: false,
                })
                .collect(),
            links: links
                .iter()
                .map(|(s, t, v)| FlowLink {
                    source: s.to_string(),
                    target: t.to_string(),
                    value: *v,
                    synthetic: false,
                })
                .collect(),
        }
    }

    #[test]
    fn acyclic_graph_is_left_alone() {
        let g = graph(
            &["A", "B", "C", "D"],
            &[("A", "B", 1.0), ("A", "C", 2.0), ("B", "D", 3.0), ("C", "D", 4.0)],
        );
        let out = break_cycles(&g);
        let kept: Vec<usize> = out.links.iter().map(|l| l.link).collect();
        assert_eq!(kept, vec![0, 1, 2, 3]);
        assert_eq!(out.removed, 0);
        assert_eq!(out.order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn three_cycle_removes_every_link() {
        let g = graph(
            &["A", "B", "C"],
            &[("A", "B", 5.0), ("B", "C", 3.0), ("C", "A", 1.0)],
        );
        let out = break_cycles(&g);
        assert!(out.links.is_empty());
        assert_eq!(out.removed, 3);
        assert!(out.order.is_empty());
    }

    #[test]
    fn nodes_downstream_of_a_cycle_are_dropped_too() {
        let g = graph(
            &["S", "A", "B", "T", "X"],
            &[
                ("S", "A", 1.0),
                ("A", "B", 1.0),
                ("B", "A", 1.0),
                ("B", "T", 1.0),
                ("S", "X", 1.0),
            ],
        );
        let out = break_cycles(&g);
        let kept: Vec<usize> = out.links.iter().map(|l| l.link).collect();
        assert_eq!(kept, vec![4]);
        assert!(out.is_valid(0));
        assert!(!out.is_valid(1));
        assert!(!out.is_valid(3));
        assert!(out.is_valid(4));
    }

    #[test]
    fn self_loop_invalidates_its_node() {
        let g = graph(&["A", "B"], &[("A", "A", 1.0), ("B", "A", 1.0)]);
        let out = break_cycles(&g);
        assert!(out.links.is_empty());
        assert_eq!(out.order, vec![1]);
    }

    #[test]
    fn dangling_links_are_counted_not_fatal() {
        let g = graph(&["A", "B"], &[("A", "B", 1.0), ("A", "Z", 2.0), ("Q", "B", 3.0)]);
        let out = break_cycles(&g);
        assert_eq!(out.links.len(), 1);
        assert_eq!(out.dangling, 2);
        assert_eq!(out.removed, 0);
    }

    #[test]
    fn simultaneously_released_nodes_follow_index_order() {
        // D and B are both released when A is dequeued; B has the lower index.
        let g = graph(
            &["A", "B", "C", "D"],
            &[("A", "D", 1.0), ("A", "B", 1.0)],
        );
        let out = break_cycles(&g);
        assert_eq!(out.order, vec![0, 2, 1, 3]);
    }

    #[test]
    fn topological_order_detects_cycles() {
        assert_eq!(topological_order(2, [(0, 1)]), Some(vec![0, 1]));
        assert_eq!(topological_order(2, [(0, 1), (1, 0)]), None);
        assert_eq!(topological_order(0, []), Some(vec![]));
    }
}
