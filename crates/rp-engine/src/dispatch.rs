//! Step dispatch.
//!
//! The dispatcher turns one step into one [`StepResult`] plus a routing
//! decision for the traversal. Side-effecting steps (action, integration,
//! notification) go through the [`ActionCollaborator`] seam; the engine
//! itself never talks to external systems.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::context::{ExecutionContext, LogLevel, StepResult};
use crate::expr;
use crate::playbook::{Step, StepConfig, StepKind};

/// Error an action collaborator can return. The dispatcher converts any
/// of these into a failed step result, never into a failed call.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("action execution failed: {0}")]
    ExecutionFailed(String),
}

/// What a collaborator reports back for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default)]
    pub output: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn success(output: HashMap<String, Value>) -> Self {
        ActionOutcome {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ActionOutcome {
            success: false,
            output: HashMap::new(),
            error: Some(error.into()),
        }
    }
}

/// The seam between the engine and whatever performs real work.
#[async_trait]
pub trait ActionCollaborator: Send + Sync {
    async fn invoke(
        &self,
        kind: StepKind,
        config: &StepConfig,
        variables: &HashMap<String, Value>,
    ) -> Result<ActionOutcome, ActionError>;
}

/// Where traversal goes after a completed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Follow the step's `next_steps` in order.
    Successors,
    /// A condition chose an explicit branch target.
    Branch(String),
    /// Nothing further on this branch; it ends here.
    Halt,
}

/// A dispatched step: the recorded result and the routing decision.
#[derive(Debug)]
pub struct StepOutcome {
    pub result: StepResult,
    pub route: Route,
}

impl StepOutcome {
    fn completed(result: StepResult, route: Route) -> Self {
        StepOutcome { result, route }
    }

    fn failed(result: StepResult) -> Self {
        StepOutcome {
            result,
            route: Route::Halt,
        }
    }
}

/// Dispatches steps by kind, logging before and after each invocation.
pub struct StepDispatcher {
    collaborator: Arc<dyn ActionCollaborator>,
}

impl StepDispatcher {
    pub fn new(collaborator: Arc<dyn ActionCollaborator>) -> Self {
        StepDispatcher { collaborator }
    }

    pub async fn dispatch(&self, step: &Step, ctx: &mut ExecutionContext) -> StepOutcome {
        let started_at = Utc::now();
        ctx.log(
            LogLevel::Info,
            format!("executing step: {} ({})", step.name, step.kind),
            Some(&step.id),
            None,
        );

        let outcome = match step.kind {
            StepKind::Trigger => {
                let mut output = HashMap::new();
                output.insert("triggered".to_string(), Value::Bool(true));
                StepOutcome::completed(
                    StepResult::completed(&step.id, started_at, Some(output)),
                    Route::Successors,
                )
            }
            StepKind::Action | StepKind::Integration | StepKind::Notification => {
                self.dispatch_action(step, started_at, ctx).await
            }
            StepKind::Condition => self.dispatch_condition(step, started_at, ctx),
            StepKind::Input | StepKind::Output => {
                // Data-plumbing markers from the designer; nothing to do
                // at runtime.
                StepOutcome::completed(
                    StepResult::completed(&step.id, started_at, None),
                    Route::Successors,
                )
            }
            StepKind::Unknown => StepOutcome::failed(StepResult::failed(
                &step.id,
                started_at,
                format!("unknown step type for step '{}'", step.id),
            )),
        };

        match &outcome.result.error {
            None => ctx.log(
                LogLevel::Info,
                format!("step completed: {}", step.name),
                Some(&step.id),
                None,
            ),
            Some(error) => ctx.log(
                LogLevel::Error,
                format!("step failed: {} ({error})", step.name),
                Some(&step.id),
                None,
            ),
        }
        outcome
    }

    async fn dispatch_action(
        &self,
        step: &Step,
        started_at: chrono::DateTime<Utc>,
        ctx: &mut ExecutionContext,
    ) -> StepOutcome {
        let invoked = self
            .collaborator
            .invoke(step.kind, &step.config, &ctx.variables)
            .await;
        match invoked {
            Ok(outcome) if outcome.success => {
                // Step output is the configuration overlaid with whatever
                // the collaborator declared. The whole output also becomes
                // run variables so later conditions can reference it.
                let mut output = step.config.parameters.clone();
                output.extend(outcome.output);
                for (key, value) in &output {
                    ctx.set_variable(key.clone(), value.clone());
                }
                StepOutcome::completed(
                    StepResult::completed(&step.id, started_at, Some(output)),
                    Route::Successors,
                )
            }
            Ok(outcome) => {
                let error = outcome
                    .error
                    .unwrap_or_else(|| "action reported failure".to_string());
                StepOutcome::failed(StepResult::failed(&step.id, started_at, error))
            }
            Err(err) => {
                StepOutcome::failed(StepResult::failed(&step.id, started_at, err.to_string()))
            }
        }
    }

    fn dispatch_condition(
        &self,
        step: &Step,
        started_at: chrono::DateTime<Utc>,
        ctx: &mut ExecutionContext,
    ) -> StepOutcome {
        let Some(expression) = step.config.condition.clone() else {
            return StepOutcome::failed(StepResult::failed(
                &step.id,
                started_at,
                "condition step has no condition expression",
            ));
        };

        let value = expr::evaluate_or_false(&expression, ctx, &step.id);

        let mut output = HashMap::new();
        output.insert("condition".to_string(), Value::String(expression));
        output.insert("result".to_string(), Value::Bool(value));

        let has_explicit_paths =
            step.config.true_path.is_some() || step.config.false_path.is_some();
        let route = if has_explicit_paths {
            let chosen = if value {
                step.config.true_path.clone()
            } else {
                step.config.false_path.clone()
            };
            match chosen {
                Some(target) => Route::Branch(target),
                // The designer asked for nothing on this side.
                None => Route::Halt,
            }
        } else {
            Route::Successors
        };

        StepOutcome::completed(
            StepResult::completed(&step.id, started_at, Some(output)),
            route,
        )
    }
}
