//! Compilation order for a release's dependency graph
//!
//! Kahn's algorithm over the package graph. When several packages are ready
//! at the same time they are emitted in manifest order, so the result is
//! deterministic for a given release.

use crate::error::{RelprovError, RelprovResult};
use crate::release::package::{Package, PackageId};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::VecDeque;

/// Order packages so every package follows all of its dependencies.
///
/// Fails with [`RelprovError::DependencyCycle`] naming the first package
/// (in manifest order) that could not be placed.
pub(crate) fn topological_order(graph: &DiGraph<Package, ()>) -> RelprovResult<Vec<PackageId>> {
    let mut in_degree = vec![0usize; graph.node_count()];
    for edge in graph.edge_references() {
        in_degree[edge.target().index()] += 1;
    }

    // node_indices() yields manifest order
    let mut queue: VecDeque<NodeIndex> = graph
        .node_indices()
        .filter(|idx| in_degree[idx.index()] == 0)
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(idx) = queue.pop_front() {
        order.push(PackageId::from(idx));

        let mut dependents: Vec<NodeIndex> =
            graph.neighbors_directed(idx, Direction::Outgoing).collect();
        dependents.sort();
        for dependent in dependents {
            let deg = &mut in_degree[dependent.index()];
            *deg -= 1;
            if *deg == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() != graph.node_count() {
        let stuck = graph
            .node_indices()
            .find(|idx| in_degree[idx.index()] > 0)
            .map(|idx| graph[idx].name.clone())
            .unwrap_or_else(|| "unknown".to_string());
        return Err(RelprovError::DependencyCycle(stuck));
    }

    Ok(order)
}
