//! Ordering edges and dependency resolution
//!
//! Edges are either declared explicitly by the caller or synthesized from
//! [`AutoRequire`] rules. Rules are plain configuration handed to the
//! resolver; nothing here knows about specific resource types.
//!
//! Ordering is deterministic: whenever several resources are ready, the
//! one with the smallest identity goes first.

use crate::error::{ResolveError, SchemaError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Reference to a declared resource, displayed as `type[identity]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub type_name: String,
    pub identity: String,
}

impl ResourceRef {
    pub fn new(type_name: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            identity: identity.into(),
        }
    }
}

impl Ord for ResourceRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity
            .cmp(&other.identity)
            .then_with(|| self.type_name.cmp(&other.type_name))
    }
}

impl PartialOrd for ResourceRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.type_name, self.identity)
    }
}

impl FromStr for ResourceRef {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SchemaError::InvalidReference(s.to_string());
        let (type_name, rest) = s.split_once('[').ok_or_else(invalid)?;
        let identity = rest.strip_suffix(']').ok_or_else(invalid)?;
        if type_name.is_empty() || identity.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(type_name, identity))
    }
}

/// `after` must not be applied until `before` reaches its target state
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderingEdge {
    pub before: ResourceRef,
    pub after: ResourceRef,
}

impl OrderingEdge {
    pub fn new(before: ResourceRef, after: ResourceRef) -> Self {
        Self { before, after }
    }
}

/// Convention: every resource of `dependent_type` requires `requires`
///
/// The edge is only synthesized when the required resource is declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoRequire {
    pub dependent_type: String,
    pub requires: ResourceRef,
}

impl AutoRequire {
    pub fn new(dependent_type: impl Into<String>, requires: ResourceRef) -> Self {
        Self {
            dependent_type: dependent_type.into(),
            requires,
        }
    }
}

/// Synthesize edges from auto-require rules over a set of resources
pub fn auto_edges(resources: &[ResourceRef], rules: &[AutoRequire]) -> Vec<OrderingEdge> {
    let declared: BTreeSet<&ResourceRef> = resources.iter().collect();
    let mut edges = BTreeSet::new();
    for rule in rules {
        if !declared.contains(&rule.requires) {
            continue;
        }
        for resource in resources {
            if resource.type_name == rule.dependent_type && *resource != rule.requires {
                edges.insert(OrderingEdge::new(rule.requires.clone(), resource.clone()));
            }
        }
    }
    edges.into_iter().collect()
}

/// Resources that transitively come after any of `roots`
///
/// Roots are only included when a cycle leads back to them.
pub fn dependents<'a>(
    edges: &[OrderingEdge],
    roots: impl IntoIterator<Item = &'a ResourceRef>,
) -> BTreeSet<ResourceRef> {
    let mut found = BTreeSet::new();
    let mut stack: Vec<&ResourceRef> = roots.into_iter().collect();
    while let Some(current) = stack.pop() {
        for edge in edges.iter().filter(|e| e.before == *current) {
            if found.insert(edge.after.clone()) {
                stack.push(&edge.after);
            }
        }
    }
    found
}

/// Resolve a global order for `resources`
///
/// Returns every resource exactly once, each after all of its `before`
/// resources. Fails on cycles and on edges naming undeclared resources.
pub fn resolve(
    resources: &[ResourceRef],
    edges: &[OrderingEdge],
) -> Result<Vec<ResourceRef>, ResolveError> {
    Graph::build(resources, edges)?.order()
}

/// A set of resources that share no edges with any other component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Members, sorted
    pub members: Vec<ResourceRef>,
    /// Resolved order, or the cycle that blocks this component
    pub order: Result<Vec<ResourceRef>, ResolveError>,
}

impl Component {
    pub fn is_blocked(&self) -> bool {
        self.order.is_err()
    }
}

/// Resolve each weakly connected component independently
///
/// A cycle only blocks the component that contains it. Components are
/// returned ordered by their smallest member.
pub fn resolve_components(
    resources: &[ResourceRef],
    edges: &[OrderingEdge],
) -> Result<Vec<Component>, ResolveError> {
    let graph = Graph::build(resources, edges)?;
    let mut seen = BTreeSet::new();
    let mut components = Vec::new();

    for start in &graph.nodes {
        if seen.contains(start) {
            continue;
        }
        let mut members = BTreeSet::new();
        let mut stack = vec![start.clone()];
        while let Some(node) = stack.pop() {
            if !members.insert(node.clone()) {
                continue;
            }
            let neighbours = graph.requires[&node].iter().chain(&graph.dependents[&node]);
            stack.extend(neighbours.filter(|n| !members.contains(*n)).cloned());
        }
        seen.extend(members.iter().cloned());

        let members: Vec<ResourceRef> = members.into_iter().collect();
        let sub_edges: Vec<OrderingEdge> = edges
            .iter()
            .filter(|e| members.binary_search(&e.after).is_ok())
            .cloned()
            .collect();
        let order = Graph::build(&members, &sub_edges).and_then(|g| g.order());
        components.push(Component { members, order });
    }

    Ok(components)
}

struct Graph {
    nodes: BTreeSet<ResourceRef>,
    /// node -> resources that must come before it
    requires: BTreeMap<ResourceRef, BTreeSet<ResourceRef>>,
    /// node -> resources that must come after it
    dependents: BTreeMap<ResourceRef, BTreeSet<ResourceRef>>,
}

impl Graph {
    fn build(resources: &[ResourceRef], edges: &[OrderingEdge]) -> Result<Self, ResolveError> {
        let mut graph = Self {
            nodes: BTreeSet::new(),
            requires: BTreeMap::new(),
            dependents: BTreeMap::new(),
        };
        for resource in resources {
            graph.nodes.insert(resource.clone());
            graph.requires.entry(resource.clone()).or_default();
            graph.dependents.entry(resource.clone()).or_default();
        }
        for edge in edges {
            for end in [&edge.before, &edge.after] {
                if !graph.nodes.contains(end) {
                    return Err(ResolveError::UnknownResource {
                        reference: end.clone(),
                    });
                }
            }
            if let Some(reqs) = graph.requires.get_mut(&edge.after) {
                reqs.insert(edge.before.clone());
            }
            if let Some(deps) = graph.dependents.get_mut(&edge.before) {
                deps.insert(edge.after.clone());
            }
        }
        Ok(graph)
    }

    /// Kahn's algorithm with an ordered ready set
    fn order(&self) -> Result<Vec<ResourceRef>, ResolveError> {
        let mut pending: BTreeMap<&ResourceRef, usize> = self
            .requires
            .iter()
            .map(|(node, reqs)| (node, reqs.len()))
            .collect();
        let mut ready: BTreeSet<&ResourceRef> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_first() {
            order.push(node.clone());
            for dependent in &self.dependents[node] {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() == self.nodes.len() {
            return Ok(order);
        }

        let resolved: BTreeSet<&ResourceRef> = order.iter().collect();
        let cycle = self.find_cycle(&resolved).unwrap_or_default();
        Err(ResolveError::DependencyCycle { cycle })
    }

    /// Depth-first search for one cycle among unresolved nodes
    ///
    /// The path follows edge direction and starts at its smallest member.
    fn find_cycle(&self, resolved: &BTreeSet<&ResourceRef>) -> Option<Vec<ResourceRef>> {
        let mut visited = BTreeSet::new();
        for start in self.nodes.iter().filter(|n| !resolved.contains(n)) {
            let mut path: Vec<&ResourceRef> = Vec::new();
            if let Some(cycle) = self.walk(start, &mut path, &mut visited, resolved) {
                return Some(cycle);
            }
        }
        None
    }

    fn walk<'a>(
        &'a self,
        node: &'a ResourceRef,
        path: &mut Vec<&'a ResourceRef>,
        visited: &mut BTreeSet<&'a ResourceRef>,
        resolved: &BTreeSet<&ResourceRef>,
    ) -> Option<Vec<ResourceRef>> {
        if let Some(pos) = path.iter().position(|n| *n == node) {
            let mut cycle: Vec<ResourceRef> = path[pos..].iter().map(|n| (*n).clone()).collect();
            if let Some(min) = cycle.iter().enumerate().min_by(|a, b| a.1.cmp(b.1)).map(|(i, _)| i) {
                cycle.rotate_left(min);
            }
            return Some(cycle);
        }
        if !visited.insert(node) {
            return None;
        }
        path.push(node);
        for next in &self.dependents[node] {
            if resolved.contains(next) {
                continue;
            }
            if let Some(cycle) = self.walk(next, path, visited, resolved) {
                return Some(cycle);
            }
        }
        path.pop();
        None
    }
}
