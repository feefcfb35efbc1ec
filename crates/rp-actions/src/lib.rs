//! Actions executable from Rampart playbooks.
//!
//! An [`Action`] is a named unit of work with declared parameters. The
//! [`ActionRegistry`] holds them by name and doubles as the engine's
//! [`rp_engine::ActionCollaborator`], so a registry plus a playbook is a
//! complete runnable setup.

pub mod log_message;
pub mod registry;
pub mod set_variables;

pub use log_message::LogMessageAction;
pub use registry::{Action, ActionRegistry, ParameterDef, ParameterType};
pub use set_variables::SetVariablesAction;

/// Registry preloaded with the built-in actions.
pub fn builtin_registry() -> registry::ActionRegistry {
    let mut registry = registry::ActionRegistry::new();
    registry.register(SetVariablesAction);
    registry.register(LogMessageAction);
    registry
}
