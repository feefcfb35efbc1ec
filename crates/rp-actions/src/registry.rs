//! Action trait and registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use rp_engine::{ActionCollaborator, ActionError, ActionOutcome, StepConfig, StepKind};

/// Declared type of an action parameter, used for upfront validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Object,
    Any,
}

impl ParameterType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParameterType::String => value.is_string(),
            ParameterType::Number => value.is_number(),
            ParameterType::Boolean => value.is_boolean(),
            ParameterType::Object => value.is_object(),
            ParameterType::Any => true,
        }
    }
}

/// One declared parameter of an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub description: String,
    pub param_type: ParameterType,
    pub required: bool,
}

impl ParameterDef {
    pub fn required(
        name: impl Into<String>,
        description: impl Into<String>,
        param_type: ParameterType,
    ) -> Self {
        ParameterDef {
            name: name.into(),
            description: description.into(),
            param_type,
            required: true,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        description: impl Into<String>,
        param_type: ParameterType,
    ) -> Self {
        ParameterDef {
            name: name.into(),
            description: description.into(),
            param_type,
            required: false,
        }
    }
}

/// A named unit of work invokable from a playbook step.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ParameterDef> {
        Vec::new()
    }

    /// Check the supplied parameters against the declaration.
    fn validate(&self, parameters: &HashMap<String, Value>) -> Result<(), ActionError> {
        for def in self.parameters() {
            match parameters.get(&def.name) {
                Some(value) => {
                    if !def.param_type.accepts(value) {
                        return Err(ActionError::InvalidParameters(format!(
                            "parameter '{}' has the wrong type",
                            def.name
                        )));
                    }
                }
                None if def.required => {
                    return Err(ActionError::InvalidParameters(format!(
                        "missing required parameter '{}'",
                        def.name
                    )));
                }
                None => {}
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        parameters: &HashMap<String, Value>,
        variables: &HashMap<String, Value>,
    ) -> Result<ActionOutcome, ActionError>;
}

/// Actions keyed by name.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        ActionRegistry::default()
    }

    pub fn register(&mut self, action: impl Action + 'static) {
        let action = Arc::new(action);
        debug!(action = action.name(), "registering action");
        self.actions.insert(action.name().to_string(), action);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    /// Registered action names, sorted for stable listings.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }

    #[instrument(skip(self, parameters, variables))]
    pub async fn execute(
        &self,
        name: &str,
        parameters: &HashMap<String, Value>,
        variables: &HashMap<String, Value>,
    ) -> Result<ActionOutcome, ActionError> {
        let action = self
            .get(name)
            .ok_or_else(|| ActionError::UnknownAction(name.to_string()))?;
        action.validate(parameters)?;
        action.execute(parameters, variables).await
    }
}

#[async_trait]
impl ActionCollaborator for ActionRegistry {
    async fn invoke(
        &self,
        kind: StepKind,
        config: &StepConfig,
        variables: &HashMap<String, Value>,
    ) -> Result<ActionOutcome, ActionError> {
        let name = config.action.as_deref().ok_or_else(|| {
            ActionError::InvalidParameters(format!(
                "{kind} step configuration has no action name"
            ))
        })?;
        self.execute(name, &config.parameters, variables).await
    }
}
