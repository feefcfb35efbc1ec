//! Depth-first playbook traversal.
//!
//! Execution starts at the playbook's first trigger step and walks
//! successor edges sequentially, fully finishing one sibling subtree
//! before starting the next. A per-run visited set stops cycles: a step
//! is entered at most once per run.
//!
//! [`PlaybookRunner::run`] is infallible by contract. Broken graphs,
//! failing actions, and bad expressions all land in the returned
//! [`ExecutionResult`], never in a panic or an `Err`.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::context::{Correlation, ExecutionContext, ExecutionStatus, LogLevel};
use crate::dispatch::{ActionCollaborator, Route, StepDispatcher};
use crate::playbook::{Playbook, Step};
use crate::result::ExecutionResult;

pub struct PlaybookRunner {
    dispatcher: StepDispatcher,
}

impl PlaybookRunner {
    pub fn new(collaborator: Arc<dyn ActionCollaborator>) -> Self {
        PlaybookRunner {
            dispatcher: StepDispatcher::new(collaborator),
        }
    }

    /// Execute a playbook to completion.
    ///
    /// The run completes when at least one path from the trigger ends at
    /// a step that completed and had nowhere further to go; otherwise it
    /// fails. A playbook with no trigger step fails immediately with
    /// zero step results.
    #[instrument(skip_all, fields(playbook = %playbook.name))]
    pub async fn run(
        &self,
        playbook: &Playbook,
        initial_variables: HashMap<String, Value>,
        correlation: Correlation,
    ) -> ExecutionResult {
        let mut ctx = ExecutionContext::new(playbook, initial_variables, correlation);

        let Some(entry) = playbook.entry_step() else {
            warn!(playbook = %playbook.name, "playbook has no trigger step");
            ctx.log(
                LogLevel::Error,
                "playbook has no trigger step, nothing to execute",
                None,
                None,
            );
            ctx.complete(
                ExecutionStatus::Failed,
                Some("playbook has no trigger step".to_string()),
            );
            return ExecutionResult::from(ctx);
        };

        let mut visited = HashSet::new();
        let reached_end = self.walk(playbook, entry, &mut ctx, &mut visited).await;

        if reached_end {
            ctx.complete(ExecutionStatus::Completed, None);
        } else {
            let error = ctx
                .step_results()
                .iter()
                .rev()
                .find_map(|r| r.error.clone())
                .unwrap_or_else(|| "no execution path reached completion".to_string());
            ctx.complete(ExecutionStatus::Failed, Some(error));
        }
        ExecutionResult::from(ctx)
    }

    /// Execute `step` and its subtree; true if some path below it ended
    /// at a completed step with no resolvable successors.
    fn walk<'a>(
        &'a self,
        playbook: &'a Playbook,
        step: &'a Step,
        ctx: &'a mut ExecutionContext,
        visited: &'a mut HashSet<String>,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            if !visited.insert(step.id.clone()) {
                // Also hit when a DAG re-converges, so don't call it a cycle.
                warn!(step = %step.id, "step already executed this run, not re-entering");
                ctx.log(
                    LogLevel::Warn,
                    format!("step '{}' already executed this run, not re-entering", step.id),
                    Some(&step.id),
                    None,
                );
                return false;
            }

            let outcome = self.dispatcher.dispatch(step, ctx).await;
            let failed = outcome.result.is_failed();
            let route = outcome.route;
            ctx.record_step_result(outcome.result);

            if failed {
                return false;
            }

            match route {
                Route::Halt => true,
                Route::Branch(target) => match playbook.step(&target) {
                    Some(next) => self.walk(playbook, next, ctx, visited).await,
                    None => {
                        debug!(step = %step.id, target = %target, "skipping unresolvable branch target");
                        true
                    }
                },
                Route::Successors => {
                    let mut followed_any = false;
                    let mut reached_end = false;
                    for successor_id in &step.next_steps {
                        let Some(next) = playbook.step(successor_id) else {
                            debug!(step = %step.id, successor = %successor_id, "skipping unresolvable successor");
                            continue;
                        };
                        followed_any = true;
                        if self.walk(playbook, next, ctx, visited).await {
                            reached_end = true;
                        }
                    }
                    // No (resolvable) successors: this step is a natural
                    // end of the playbook.
                    if followed_any {
                        reached_end
                    } else {
                        true
                    }
                }
            }
        })
    }
}
