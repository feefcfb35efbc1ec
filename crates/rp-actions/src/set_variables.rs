//! Built-in action that writes its parameters into the run's variables.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use rp_engine::{ActionError, ActionOutcome};

use crate::registry::Action;

/// Echoes every parameter as output. The engine merges action output
/// into the run variables, so this is the playbook author's way of
/// binding values for later conditions.
pub struct SetVariablesAction;

#[async_trait]
impl Action for SetVariablesAction {
    fn name(&self) -> &str {
        "set_variables"
    }

    fn description(&self) -> &str {
        "Sets each parameter as a run variable"
    }

    async fn execute(
        &self,
        parameters: &HashMap<String, Value>,
        _variables: &HashMap<String, Value>,
    ) -> Result<ActionOutcome, ActionError> {
        Ok(ActionOutcome::success(parameters.clone()))
    }
}
