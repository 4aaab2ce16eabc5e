//! Convergence planner - diffs resources and places them in order

use crate::context::StateReader;
use crate::diff::{ChangeOperation, ResourceDiff, diff};
use crate::error::{PlanError, ResolveError};
use crate::graph::{
    AutoRequire, OrderingEdge, ResourceRef, auto_edges, dependents, resolve_components,
};
use crate::resource::ResourceDescriptor;
use std::collections::{BTreeMap, BTreeSet};

/// A resource with the operations that converge it
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub descriptor: ResourceDescriptor,
    /// Empty when the resource is already converged
    pub operations: Vec<ChangeOperation>,
}

impl PlannedChange {
    pub fn reference(&self) -> ResourceRef {
        self.descriptor.reference()
    }

    pub fn is_converged(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Resources connected by ordering edges, in resolved order
#[derive(Debug, Clone, Default)]
pub struct PlannedComponent {
    pub steps: Vec<PlannedChange>,
    /// Edges between members of this component
    pub edges: Vec<OrderingEdge>,
}

impl PlannedComponent {
    /// Resources that transitively depend on `resource`
    pub fn dependents_of(&self, resource: &ResourceRef) -> BTreeSet<ResourceRef> {
        dependents(&self.edges, [resource])
    }

    fn operation_count(&self) -> usize {
        self.steps.iter().map(|s| s.operations.len()).sum()
    }
}

/// Resources that cannot converge because of an ordering cycle
#[derive(Debug, Clone)]
pub struct BlockedComponent {
    pub members: Vec<ResourceRef>,
    pub error: ResolveError,
}

/// Everything needed to converge a set of declarations
///
/// Components are independent of each other and may be applied
/// concurrently; steps inside a component must be applied in order.
#[derive(Debug, Clone, Default)]
pub struct ConvergencePlan {
    pub components: Vec<PlannedComponent>,
    pub blocked: Vec<BlockedComponent>,
}

impl ConvergencePlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff and order `descriptors`
    ///
    /// Explicit `edges` are combined with edges synthesized from `rules`.
    /// Snapshots are read only for resources in unblocked components, in
    /// resolved order. State read failures abort planning.
    pub fn build<R>(
        descriptors: Vec<ResourceDescriptor>,
        edges: &[OrderingEdge],
        rules: &[AutoRequire],
        reader: &R,
    ) -> Result<Self, PlanError>
    where
        R: StateReader + ?Sized,
    {
        let refs: Vec<ResourceRef> = descriptors.iter().map(ResourceDescriptor::reference).collect();
        let all_edges = ordering_edges(&refs, edges, rules)?;
        let mut by_ref: BTreeMap<ResourceRef, ResourceDescriptor> = descriptors
            .into_iter()
            .map(|d| (d.reference(), d))
            .collect();

        let mut plan = Self::new();
        for component in resolve_components(&refs, &all_edges)? {
            let order = match component.order {
                Ok(order) => order,
                Err(error) => {
                    plan.blocked.push(BlockedComponent {
                        members: component.members,
                        error,
                    });
                    continue;
                }
            };

            let mut planned = PlannedComponent {
                steps: Vec::with_capacity(order.len()),
                edges: all_edges
                    .iter()
                    .filter(|e| component.members.binary_search(&e.after).is_ok())
                    .cloned()
                    .collect(),
            };
            for reference in order {
                let Some(descriptor) = by_ref.remove(&reference) else {
                    continue;
                };
                let current = reader.read(descriptor.type_name(), descriptor.identity())?;
                let operations = diff(&descriptor, &current);
                planned.steps.push(PlannedChange {
                    descriptor,
                    operations,
                });
            }
            plan.components.push(planned);
        }

        Ok(plan)
    }

    /// Every planned resource in resolved order, component by component
    pub fn order(&self) -> Vec<ResourceRef> {
        self.steps().map(PlannedChange::reference).collect()
    }

    /// All steps, component by component
    pub fn steps(&self) -> impl Iterator<Item = &PlannedChange> {
        self.components.iter().flat_map(|c| c.steps.iter())
    }

    /// Non-empty diffs in plan order
    pub fn diffs(&self) -> Vec<ResourceDiff> {
        self.steps()
            .filter(|s| !s.is_converged())
            .map(|s| ResourceDiff {
                resource: s.reference(),
                operations: s.operations.clone(),
            })
            .collect()
    }

    /// Total number of change operations
    pub fn total_operations(&self) -> usize {
        self.components.iter().map(PlannedComponent::operation_count).sum()
    }

    /// Check if there is nothing to apply
    pub fn is_empty(&self) -> bool {
        self.total_operations() == 0
    }

    /// Check if any resources are blocked by cycles
    pub fn has_blocked(&self) -> bool {
        !self.blocked.is_empty()
    }

    /// Filter plan to only include resources matching a target pattern
    ///
    /// Target format: "type" or "type.identity"
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        match target {
            None => self,
            Some(_) => self.filter(|r| matches_target(r, target)),
        }
    }

    /// Filter plan to only include resources matching a predicate
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&ResourceRef) -> bool,
    {
        let components = self
            .components
            .into_iter()
            .map(|c| PlannedComponent {
                steps: c
                    .steps
                    .into_iter()
                    .filter(|s| predicate(&s.reference()))
                    .collect(),
                edges: c.edges,
            })
            .filter(|c| !c.steps.is_empty())
            .collect();
        let blocked = self
            .blocked
            .into_iter()
            .filter(|b| b.members.iter().any(&predicate))
            .collect();
        Self { components, blocked }
    }
}

/// Every ordering edge between `resources`, sorted and without repeats
///
/// Explicit `edges` are merged with edges synthesized from `rules`. Fails
/// if a resource is declared twice.
pub fn ordering_edges(
    resources: &[ResourceRef],
    edges: &[OrderingEdge],
    rules: &[AutoRequire],
) -> Result<Vec<OrderingEdge>, PlanError> {
    let mut seen = BTreeSet::new();
    for reference in resources {
        if !seen.insert(reference) {
            return Err(PlanError::DuplicateResource(reference.clone()));
        }
    }

    let mut all_edges = edges.to_vec();
    all_edges.extend(auto_edges(resources, rules));
    all_edges.sort();
    all_edges.dedup();
    Ok(all_edges)
}

/// Check if a resource matches a target pattern ("type" or "type.identity")
pub fn matches_target(resource: &ResourceRef, target: Option<&str>) -> bool {
    let Some(target) = target else {
        return true;
    };
    let (resource_type, name) = parse_target(target);
    matches_filter(resource, resource_type.as_deref(), name.as_deref())
}

/// Parse a target string like "type.identity" into (type, identity)
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        None => (Some(target.to_string()), None),
        Some((resource_type, name)) if !resource_type.is_empty() => {
            (Some(resource_type.to_string()), Some(name.to_string()))
        }
        Some(_) => (None, Some(target.trim_start_matches('.').to_string())),
    }
}

/// Check if a resource matches the filter criteria
fn matches_filter(resource: &ResourceRef, resource_type: Option<&str>, name: Option<&str>) -> bool {
    if let Some(rt) = resource_type
        && resource.type_name != rt
    {
        return false;
    }

    if let Some(n) = name
        && !resource.identity.contains(n)
    {
        return false;
    }

    true
}
