//! Execution engine - applies a plan level by level with bounded parallelism

use crate::context::{AutoConfirm, ConfirmCallback, Inputs, Provider};
use crate::error::{ApiError, ErrorCategory};
use crate::event::{EventSink, NullSink, OperationEvent};
use crate::observed::ObservedState;
use crate::planner::{Operation, Plan};
use crate::resource::RemoteRecord;
use crate::retry::{Attempted, LogCallback, RetryCallback, RetryConfig, with_retry};
use crate::types::{ExecuteOptions, ExecuteSummary, OperationKind, OperationStatus, ResourceKey};
use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Final state of one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub key: ResourceKey,
    pub kind: OperationKind,
    pub status: OperationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Remote calls made (0 if never attempted)
    pub attempts: u32,
    /// Kind of error behind a failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
}

/// Result of a run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    outcomes: Vec<OperationOutcome>,
    resolved: BTreeMap<ResourceKey, RemoteRecord>,
    cancelled: bool,
}

impl RunReport {
    /// Outcomes aligned with [`Plan::operations`]
    pub fn outcomes(&self) -> &[OperationOutcome] {
        &self.outcomes
    }

    /// Remote records known after the run (observed plus newly written)
    pub fn resolved(&self) -> &BTreeMap<ResourceKey, RemoteRecord> {
        &self.resolved
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn status_of(&self, key: &ResourceKey) -> Option<OperationStatus> {
        self.outcomes
            .iter()
            .find(|o| &o.key == key)
            .map(|o| o.status)
    }

    pub fn summary(&self) -> ExecuteSummary {
        let mut summary = ExecuteSummary::default();
        for outcome in &self.outcomes {
            summary.add_outcome(outcome.kind, outcome.status);
        }
        summary
    }

    /// No operation failed
    pub fn is_success(&self) -> bool {
        self.summary().is_success()
    }

    /// Failed operations, in plan order
    pub fn failures(&self) -> impl Iterator<Item = &OperationOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OperationStatus::Failed)
    }
}

/// Bookkeeping for a run in progress
struct RunState<'a> {
    plan: &'a Plan,
    events: &'a dyn EventSink,
    report: RunReport,
}

impl<'a> RunState<'a> {
    fn new(plan: &'a Plan, observed: &ObservedState, events: &'a dyn EventSink) -> Self {
        let outcomes = plan
            .operations()
            .iter()
            .map(|op| OperationOutcome {
                key: op.key.clone(),
                kind: op.kind,
                status: OperationStatus::Pending,
                detail: None,
                attempts: 0,
                category: None,
            })
            .collect();
        Self {
            plan,
            events,
            report: RunReport {
                outcomes,
                resolved: observed.records(),
                cancelled: false,
            },
        }
    }

    fn status(&self, i: usize) -> OperationStatus {
        self.report.outcomes[i].status
    }

    fn transition(&mut self, i: usize, status: OperationStatus, detail: Option<String>) {
        let outcome = &mut self.report.outcomes[i];
        if !outcome.status.can_transition_to(status) {
            log::debug!(
                "ignoring {} -> {status} for {}",
                outcome.status,
                outcome.key
            );
            return;
        }
        outcome.status = status;
        outcome.detail.clone_from(&detail);

        let mut event = OperationEvent::new(&outcome.key, outcome.kind, status);
        event.detail = detail;
        self.events.emit(&event);
    }

    fn emit_pending(&self) {
        for op in self.plan.operations() {
            self.events
                .emit(&OperationEvent::new(&op.key, op.kind, OperationStatus::Pending));
        }
    }

    fn skip_remaining(&mut self, reason: &str) {
        for i in 0..self.report.outcomes.len() {
            if self.status(i) == OperationStatus::Pending {
                self.transition(i, OperationStatus::Skipped, Some(reason.to_string()));
            }
        }
    }

    /// First prerequisite that did not succeed
    fn blocker(&self, op: &Operation) -> Option<usize> {
        op.after
            .iter()
            .copied()
            .find(|&d| self.status(d) != OperationStatus::Succeeded)
    }

    fn inputs_for(&self, op: &Operation) -> Inputs {
        op.inputs
            .iter()
            .filter_map(|k| {
                self.report
                    .resolved
                    .get(k)
                    .map(|r| (k.clone(), r.clone()))
            })
            .collect()
    }

    fn record(&mut self, i: usize, attempted: Attempted<Option<RemoteRecord>>) {
        let plan = self.plan;
        let op = &plan.operations()[i];
        self.report.outcomes[i].attempts = attempted.attempts;
        match attempted.result {
            Ok(Some(record)) => {
                let detail = format!("id {}", record.id);
                self.report.resolved.insert(op.key.clone(), record);
                self.transition(i, OperationStatus::Succeeded, Some(detail));
            }
            Ok(None) => {
                self.report.resolved.remove(&op.key);
                self.transition(i, OperationStatus::Succeeded, None);
            }
            Err(e) if op.kind == OperationKind::Delete && e.is_not_found() => {
                self.report.resolved.remove(&op.key);
                self.transition(
                    i,
                    OperationStatus::Succeeded,
                    Some("already absent".to_string()),
                );
            }
            Err(e) => {
                log::warn!("{} {} failed: {e}", op.kind, op.key);
                self.report.outcomes[i].category = Some(e.category());
                self.transition(i, OperationStatus::Failed, Some(e.to_string()));
            }
        }
    }
}

/// Execute a plan with the given options and callbacks
///
/// # Arguments
/// * `plan` - The plan to run
/// * `observed` - Snapshot the plan was computed from (seeds input records)
/// * `provider` - Remote API for every resource type in the plan
/// * `opts` - Execution options (dry_run, jobs, retry, cancel)
/// * `events` - Receives one event per status transition
/// * `confirm` - Asked once before the first level (not in dry runs)
///
/// # Returns
/// Per-operation outcomes; operation failures are reported there, not as
/// an `Err`.
pub fn execute<C: ConfirmCallback>(
    plan: &Plan,
    observed: &ObservedState,
    provider: &dyn Provider,
    opts: &ExecuteOptions,
    events: &dyn EventSink,
    confirm: &mut C,
) -> Result<RunReport> {
    let mut run = RunState::new(plan, observed, events);
    if plan.is_empty() {
        return Ok(run.report);
    }

    run.emit_pending();

    if opts.dry_run {
        run.skip_remaining("dry run");
        return Ok(run.report);
    }

    if !confirm.confirm("Apply changes?")? {
        run.skip_remaining("declined");
        return Ok(run.report);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;

    // Workers record their own outcome, so each terminal event is emitted
    // as soon as that operation finishes
    let run = Mutex::new(run);
    for (depth, level) in plan.levels().iter().enumerate() {
        let runnable = {
            let mut run = lock(&run);
            if opts.cancel.is_cancelled() {
                log::warn!("run cancelled before level {depth}");
                run.report.cancelled = true;
                run.skip_remaining("cancelled");
                break;
            }

            let mut runnable = Vec::with_capacity(level.len());
            for &i in level {
                let op = &plan.operations()[i];
                if let Some(b) = run.blocker(op) {
                    let blocker = &plan.operations()[b];
                    let detail = format!("{} {}", blocker.key, run.status(b));
                    run.transition(i, OperationStatus::Skipped, Some(detail));
                } else {
                    runnable.push(i);
                }
            }
            runnable
        };
        log::debug!("level {depth}: running {} operations", runnable.len());

        pool.install(|| {
            runnable.into_par_iter().for_each(|i| {
                let op = &plan.operations()[i];
                let inputs = {
                    let mut run = lock(&run);
                    run.transition(i, OperationStatus::Running, None);
                    run.inputs_for(op)
                };
                let attempted = apply_operation(op, provider, &inputs, &opts.retry);
                lock(&run).record(i, attempted);
            });
        });
    }

    let run = run.into_inner().unwrap_or_else(PoisonError::into_inner);
    Ok(run.report)
}

fn lock<'m, 'a>(run: &'m Mutex<RunState<'a>>) -> MutexGuard<'m, RunState<'a>> {
    run.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run one operation against the provider, retrying transient failures
fn apply_operation(
    op: &Operation,
    provider: &dyn Provider,
    inputs: &Inputs,
    retry: &RetryConfig,
) -> Attempted<Option<RemoteRecord>> {
    log::info!("{} {}", op.kind, op.key);
    let callback: Option<&dyn RetryCallback> = Some(&LogCallback);

    match (op.kind, &op.spec, &op.prior) {
        (OperationKind::Create, Some(spec), _) => {
            with_retry(retry, callback, || provider.create(spec, inputs).map(Some))
        }
        (OperationKind::Update, Some(spec), Some(prior)) => with_retry(retry, callback, || {
            provider.update(spec, &prior.record, inputs).map(Some)
        }),
        (OperationKind::Delete, _, Some(prior)) => with_retry(retry, callback, || {
            provider
                .delete(op.resource_type(), &prior.record)
                .map(|()| None)
        }),
        _ => Attempted {
            result: Err(ApiError::permanent(format!(
                "malformed {} operation for {}",
                op.kind, op.key
            ))),
            attempts: 0,
        },
    }
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need events or confirmation.
pub fn execute_simple(
    plan: &Plan,
    observed: &ObservedState,
    provider: &dyn Provider,
    opts: &ExecuteOptions,
) -> Result<RunReport> {
    execute(plan, observed, provider, opts, &NullSink, &mut AutoConfirm)
}
