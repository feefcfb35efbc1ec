//! Built-in action that emits an operator-visible log line.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use rp_engine::{ActionError, ActionOutcome};

use crate::registry::{Action, ParameterDef, ParameterType};

/// Logs its `message` parameter. Handy as a visible no-op while wiring
/// up a playbook, and for leaving breadcrumbs in notification branches.
pub struct LogMessageAction;

#[async_trait]
impl Action for LogMessageAction {
    fn name(&self) -> &str {
        "log_message"
    }

    fn description(&self) -> &str {
        "Logs a message from the playbook"
    }

    fn parameters(&self) -> Vec<ParameterDef> {
        vec![ParameterDef::required(
            "message",
            "Message to log",
            ParameterType::String,
        )]
    }

    async fn execute(
        &self,
        parameters: &HashMap<String, Value>,
        _variables: &HashMap<String, Value>,
    ) -> Result<ActionOutcome, ActionError> {
        let message = parameters
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        info!(target: "playbook", "{message}");

        let mut output = HashMap::new();
        output.insert("message".to_string(), Value::String(message.to_string()));
        Ok(ActionOutcome::success(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn reports_the_logged_message() {
        let mut params = HashMap::new();
        params.insert("message".to_string(), json!("host isolated"));

        let outcome = LogMessageAction
            .execute(&params, &HashMap::new())
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.output["message"], json!("host isolated"));
    }

    #[tokio::test]
    async fn missing_message_fails_validation() {
        let err = LogMessageAction.validate(&HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("message"));
    }
}
