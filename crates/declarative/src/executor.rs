//! Execution engine - applies a convergence plan with component parallelism

use crate::context::{Applier, ConfirmCallback, ProgressCallback};
use crate::diff::ChangeOperation;
use crate::graph::ResourceRef;
use crate::planner::{ConvergencePlan, PlannedComponent};
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary, OperationReport};
use anyhow::Result;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Everything an execution produced
#[derive(Debug, Clone, Default)]
pub struct ExecuteOutcome {
    /// One report per planned operation, in plan order
    pub reports: Vec<OperationReport>,
    pub summary: ExecuteSummary,
}

impl ExecuteOutcome {
    fn from_reports(reports: Vec<OperationReport>) -> Self {
        let summary = ExecuteSummary::from_reports(&reports);
        Self { reports, summary }
    }
}

/// Execute a plan with the given options and callbacks
///
/// # Type Parameters
/// * `A` - Applier that performs the remote changes
/// * `P` - Progress callback type
/// * `C` - Confirm callback type
///
/// # Arguments
/// * `plan` - The convergence plan to run
/// * `applier` - Receives each operation in resolved order
/// * `opts` - Execution options (dry_run, jobs)
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback
///
/// Independent components run on up to `opts.jobs` threads. Inside a
/// component operations run one at a time, and a failure skips the rest
/// of that resource and everything that depends on it.
pub fn execute<A, P, C>(
    plan: &ConvergencePlan,
    applier: &A,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteOutcome>
where
    A: Applier + ?Sized,
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let total_operations = plan.total_operations();
    if total_operations == 0 {
        return Ok(ExecuteOutcome::default());
    }

    if opts.dry_run {
        return Ok(ExecuteOutcome::from_reports(skip_all(plan, "dry run")));
    }

    if !confirm.confirm("Apply changes?")? {
        return Ok(ExecuteOutcome::from_reports(skip_all(plan, "declined")));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;

    progress.on_batch_start(total_operations);

    // Progress is not thread-safe, so results are reported after the run
    let reports: Vec<OperationReport> = pool.install(|| {
        plan.components
            .par_iter()
            .map(|component| apply_component(component, applier))
            .flatten()
            .collect()
    });

    for report in &reports {
        progress.on_operation_complete(&report.resource, &report.operation, &report.result);
    }
    progress.on_batch_complete();

    Ok(ExecuteOutcome::from_reports(reports))
}

/// Apply one component sequentially in resolved order
fn apply_component<A>(component: &PlannedComponent, applier: &A) -> Vec<OperationReport>
where
    A: Applier + ?Sized,
{
    // resource -> the failed resource it depends on
    let mut blocked: BTreeMap<ResourceRef, ResourceRef> = BTreeMap::new();
    let mut reports = Vec::new();

    for step in &component.steps {
        let reference = step.reference();

        if let Some(cause) = blocked.get(&reference) {
            let reason = format!("dependency {cause} failed");
            reports.extend(skip_operations(&reference, &step.operations, &reason));
            continue;
        }

        for (index, operation) in step.operations.iter().enumerate() {
            let result = match applier.apply(&step.descriptor, operation) {
                Ok(()) => ApplyResult::applied(operation),
                Err(e) => ApplyResult::Failed {
                    error: format!("{e:#}"),
                },
            };
            let failed = !result.is_success();
            reports.push(OperationReport {
                resource: reference.clone(),
                operation: operation.clone(),
                result,
            });

            if failed {
                let remaining = &step.operations[index + 1..];
                reports.extend(skip_operations(
                    &reference,
                    remaining,
                    "earlier operation failed",
                ));
                for dependent in component.dependents_of(&reference) {
                    blocked.entry(dependent).or_insert_with(|| reference.clone());
                }
                break;
            }
        }
    }

    reports
}

fn skip_operations<'a>(
    resource: &'a ResourceRef,
    operations: &'a [ChangeOperation],
    reason: &'a str,
) -> impl Iterator<Item = OperationReport> + 'a {
    operations.iter().map(move |operation| OperationReport {
        resource: resource.clone(),
        operation: operation.clone(),
        result: ApplyResult::Skipped {
            reason: reason.to_string(),
        },
    })
}

fn skip_all(plan: &ConvergencePlan, reason: &str) -> Vec<OperationReport> {
    plan.steps()
        .flat_map(|step| {
            let reference = step.reference();
            step.operations
                .iter()
                .map(|operation| OperationReport {
                    resource: reference.clone(),
                    operation: operation.clone(),
                    result: ApplyResult::Skipped {
                        reason: reason.to_string(),
                    },
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple<A>(
    plan: &ConvergencePlan,
    applier: &A,
    opts: &ExecuteOptions,
) -> Result<ExecuteOutcome>
where
    A: Applier + ?Sized,
{
    use crate::context::{AutoConfirm, NoProgress};

    execute(plan, applier, opts, &mut NoProgress, &mut AutoConfirm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoDecline, NoProgress};
    use crate::graph::OrderingEdge;
    use crate::registry::SchemaRegistry;
    use crate::resource::{Ensure, ResourceDescriptor};
    use crate::types::RemoteSnapshot;
    use crate::value::Value;
    use std::sync::Mutex;

    /// Records applied operations and fails for one identity
    #[derive(Default)]
    struct RecordingApplier {
        fail_on: Option<String>,
        applied: Mutex<Vec<String>>,
    }

    impl Applier for RecordingApplier {
        fn apply(&self, descriptor: &ResourceDescriptor, operation: &ChangeOperation) -> Result<()> {
            if self.fail_on.as_deref() == Some(descriptor.identity()) {
                anyhow::bail!("remote rejected {}", descriptor.reference());
            }
            self.applied
                .lock()
                .unwrap()
                .push(format!("{} {operation}", descriptor.reference()));
            Ok(())
        }
    }

    fn datasource(registry: &SchemaRegistry, name: &str) -> ResourceDescriptor {
        let raw = BTreeMap::from([
            ("url".to_string(), Value::from(format!("http://{name}:8086"))),
            ("type".to_string(), Value::from("influxdb")),
        ]);
        registry
            .build("datasource", name, Ensure::Present, &raw)
            .unwrap()
    }

    fn plan(edges: &[OrderingEdge]) -> ConvergencePlan {
        let registry = SchemaRegistry::builtin();
        let descriptors = vec![
            datasource(&registry, "a"),
            datasource(&registry, "b"),
            datasource(&registry, "c"),
        ];
        let state: BTreeMap<ResourceRef, RemoteSnapshot> = BTreeMap::new();
        ConvergencePlan::build(descriptors, edges, &[], &state).unwrap()
    }

    fn ds(name: &str) -> ResourceRef {
        ResourceRef::new("datasource", name)
    }

    #[test]
    fn test_execute_empty_plan() {
        let outcome =
            execute_simple(&ConvergencePlan::new(), &RecordingApplier::default(), &ExecuteOptions::default())
                .unwrap();
        assert_eq!(outcome.summary.total(), 0);
    }

    #[test]
    fn test_execute_with_changes() {
        let applier = RecordingApplier::default();
        let outcome = execute_simple(&plan(&[]), &applier, &ExecuteOptions::default()).unwrap();

        assert_eq!(outcome.summary.created, 3);
        assert!(outcome.summary.is_success());
        assert_eq!(applier.applied.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_dry_run_applies_nothing() {
        let applier = RecordingApplier::default();
        let opts = ExecuteOptions {
            dry_run: true,
            ..Default::default()
        };
        let outcome = execute_simple(&plan(&[]), &applier, &opts).unwrap();

        assert_eq!(outcome.summary.skipped, 3);
        assert!(applier.applied.lock().unwrap().is_empty());
    }

    #[test]
    fn test_declined_applies_nothing() {
        let applier = RecordingApplier::default();
        let outcome = execute(
            &plan(&[]),
            &applier,
            &ExecuteOptions::default(),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();

        assert_eq!(outcome.summary.skipped, 3);
        assert!(applier.applied.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failure_skips_dependents() {
        let applier = RecordingApplier {
            fail_on: Some("a".to_string()),
            ..Default::default()
        };
        let edges = [OrderingEdge::new(ds("a"), ds("b"))];
        let outcome = execute_simple(&plan(&edges), &applier, &ExecuteOptions::default()).unwrap();

        assert_eq!(outcome.summary.failed, 1);
        assert_eq!(outcome.summary.skipped, 1);
        assert_eq!(outcome.summary.created, 1);

        let skipped = outcome
            .reports
            .iter()
            .find(|r| r.resource == ds("b"))
            .unwrap();
        assert_eq!(
            skipped.result,
            ApplyResult::Skipped {
                reason: "dependency datasource[a] failed".to_string()
            }
        );
        assert_eq!(
            *applier.applied.lock().unwrap(),
            ["datasource[c] create".to_string()]
        );
    }

    #[test]
    fn test_component_runs_in_resolved_order() {
        let applier = RecordingApplier::default();
        let edges = [
            OrderingEdge::new(ds("c"), ds("b")),
            OrderingEdge::new(ds("b"), ds("a")),
        ];
        let opts = ExecuteOptions { dry_run: false, jobs: 1 };
        execute_simple(&plan(&edges), &applier, &opts).unwrap();

        assert_eq!(
            *applier.applied.lock().unwrap(),
            [
                "datasource[c] create".to_string(),
                "datasource[b] create".to_string(),
                "datasource[a] create".to_string(),
            ]
        );
    }
}
