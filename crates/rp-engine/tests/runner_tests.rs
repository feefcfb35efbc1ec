//! End-to-end traversal scenarios against a scripted collaborator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use rp_engine::{
    ActionCollaborator, ActionError, ActionOutcome, Correlation, ExecutionStatus, LogLevel,
    Playbook, PlaybookRunner, PlaybookStatus, Step, StepConfig, StepKind, StepStatus,
};

/// Echoes step parameters back as output and records which actions ran,
/// optionally refusing a named action.
struct ScriptedCollaborator {
    invocations: Mutex<Vec<(StepKind, Option<String>)>>,
    refuse: Option<String>,
}

impl ScriptedCollaborator {
    fn new() -> Self {
        ScriptedCollaborator {
            invocations: Mutex::new(Vec::new()),
            refuse: None,
        }
    }

    fn refusing(action: &str) -> Self {
        ScriptedCollaborator {
            invocations: Mutex::new(Vec::new()),
            refuse: Some(action.to_string()),
        }
    }

    fn invoked_actions(&self) -> Vec<Option<String>> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|(_, name)| name.clone())
            .collect()
    }
}

#[async_trait]
impl ActionCollaborator for ScriptedCollaborator {
    async fn invoke(
        &self,
        kind: StepKind,
        config: &StepConfig,
        _variables: &HashMap<String, Value>,
    ) -> Result<ActionOutcome, ActionError> {
        self.invocations
            .lock()
            .unwrap()
            .push((kind, config.action.clone()));
        if let (Some(refused), Some(name)) = (&self.refuse, &config.action) {
            if refused == name {
                return Err(ActionError::ExecutionFailed(format!(
                    "action '{name}' refused by policy"
                )));
            }
        }
        Ok(ActionOutcome::success(config.parameters.clone()))
    }
}

fn runner(collaborator: Arc<ScriptedCollaborator>) -> PlaybookRunner {
    PlaybookRunner::new(collaborator)
}

fn action_step(id: &str, name: &str) -> Step {
    Step::new(id, name, StepKind::Action).with_config(StepConfig::action(id))
}

fn step_ids(result: &rp_engine::ExecutionResult) -> Vec<&str> {
    result
        .step_results
        .iter()
        .map(|r| r.step_id.as_str())
        .collect()
}

#[tokio::test]
async fn linear_chain_executes_in_order() {
    let playbook = Playbook::new("containment")
        .with_status(PlaybookStatus::Active)
        .with_step(Step::new("t1", "On alert", StepKind::Trigger).with_next("a1"))
        .with_step(action_step("a1", "Enrich").with_next("a2"))
        .with_step(action_step("a2", "Notify"));

    let collab = Arc::new(ScriptedCollaborator::new());
    let result = runner(collab.clone())
        .run(&playbook, HashMap::new(), Correlation::default())
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(step_ids(&result), vec!["t1", "a1", "a2"]);
    assert!(result
        .step_results
        .iter()
        .all(|r| r.status == StepStatus::Completed));
    assert_eq!(
        collab.invoked_actions(),
        vec![Some("a1".to_string()), Some("a2".to_string())]
    );
}

#[tokio::test]
async fn action_output_feeds_later_condition() {
    // T1 -> A1 (sets x = 1) -> C1 ("x == 1") with explicit branches.
    let playbook = Playbook::new("branching")
        .with_step(Step::new("t1", "On alert", StepKind::Trigger).with_next("a1"))
        .with_step(
            Step::new("a1", "Set x", StepKind::Action)
                .with_config(StepConfig::action("set_variables").with_parameter("x", 1))
                .with_next("c1"),
        )
        .with_step(
            Step::new("c1", "x is one?", StepKind::Condition)
                .with_config(StepConfig::condition("x == 1").with_paths("n1", "n2")),
        )
        .with_step(action_step("n1", "True branch"))
        .with_step(action_step("n2", "False branch"));

    let result = runner(Arc::new(ScriptedCollaborator::new()))
        .run(&playbook, HashMap::new(), Correlation::default())
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(step_ids(&result), vec!["t1", "a1", "c1", "n1"]);
    assert!(result.step_result("n2").is_none());
    assert_eq!(result.variables["x"], json!(1));
    assert_eq!(result.variables["a1_result"]["x"], json!(1));
    assert_eq!(result.variables["c1_result"]["result"], json!(true));
}

#[tokio::test]
async fn false_condition_takes_false_path() {
    let playbook = Playbook::new("branching")
        .with_step(Step::new("t1", "On alert", StepKind::Trigger).with_next("c1"))
        .with_step(
            Step::new("c1", "Gate", StepKind::Condition)
                .with_config(StepConfig::condition("severity >= 7").with_paths("n1", "n2")),
        )
        .with_step(action_step("n1", "Escalate"))
        .with_step(action_step("n2", "Close"));

    let mut vars = HashMap::new();
    vars.insert("severity".to_string(), json!(3));
    let result = runner(Arc::new(ScriptedCollaborator::new()))
        .run(&playbook, vars, Correlation::default())
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(step_ids(&result), vec!["t1", "c1", "n2"]);
    assert!(result.step_result("n1").is_none());
}

#[tokio::test]
async fn one_sided_condition_ends_branch_on_the_absent_side() {
    // Only a true path is configured; a false outcome has nowhere to go
    // and ends the run normally.
    let playbook = Playbook::new("one-sided")
        .with_step(Step::new("t1", "On alert", StepKind::Trigger).with_next("c1"))
        .with_step(
            Step::new("c1", "Gate", StepKind::Condition)
                .with_config(StepConfig::condition("severity >= 7").with_true_path("n1")),
        )
        .with_step(action_step("n1", "Escalate"));

    let mut vars = HashMap::new();
    vars.insert("severity".to_string(), json!(3));
    let result = runner(Arc::new(ScriptedCollaborator::new()))
        .run(&playbook, vars, Correlation::default())
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(step_ids(&result), vec!["t1", "c1"]);
    assert!(result.step_result("n1").is_none());
}

#[tokio::test]
async fn dangling_branch_target_ends_branch_normally() {
    let playbook = Playbook::new("dangling-branch")
        .with_step(Step::new("t1", "On alert", StepKind::Trigger).with_next("c1"))
        .with_step(
            Step::new("c1", "Gate", StepKind::Condition)
                .with_config(StepConfig::condition("true").with_paths("ghost", "n2")),
        )
        .with_step(action_step("n2", "Close"));

    let result = runner(Arc::new(ScriptedCollaborator::new()))
        .run(&playbook, HashMap::new(), Correlation::default())
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(step_ids(&result), vec!["t1", "c1"]);
    assert!(result.step_result("ghost").is_none());
    assert!(result.step_result("n2").is_none());
}

#[tokio::test]
async fn unparsable_condition_fails_closed() {
    let playbook = Playbook::new("bad-expression")
        .with_step(Step::new("t1", "On alert", StepKind::Trigger).with_next("c1"))
        .with_step(
            Step::new("c1", "Broken gate", StepKind::Condition)
                .with_config(StepConfig::condition("severity >==< 7").with_paths("n1", "n2")),
        )
        .with_step(action_step("n1", "Escalate"))
        .with_step(action_step("n2", "Close"));

    let result = runner(Arc::new(ScriptedCollaborator::new()))
        .run(&playbook, HashMap::new(), Correlation::default())
        .await;

    // The run still terminates normally on the false path.
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(step_ids(&result), vec!["t1", "c1", "n2"]);
    assert!(result
        .log
        .iter()
        .any(|e| e.level == LogLevel::Warn && e.message.contains("condition evaluation failed")));
}

#[tokio::test]
async fn no_trigger_step_fails_with_zero_results() {
    let playbook = Playbook::new("headless").with_step(action_step("a1", "Orphan"));

    let result = runner(Arc::new(ScriptedCollaborator::new()))
        .run(&playbook, HashMap::new(), Correlation::default())
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.step_results.is_empty());
    assert!(result.error.as_ref().unwrap().contains("no trigger step"));
}

#[tokio::test]
async fn dangling_successors_are_skipped() {
    let playbook = Playbook::new("dangling")
        .with_step(
            Step::new("t1", "On alert", StepKind::Trigger)
                .with_next("ghost")
                .with_next("a1"),
        )
        .with_step(action_step("a1", "Real work"));

    let result = runner(Arc::new(ScriptedCollaborator::new()))
        .run(&playbook, HashMap::new(), Correlation::default())
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(step_ids(&result), vec!["t1", "a1"]);
}

#[tokio::test]
async fn failing_action_on_sole_path_fails_the_run() {
    let playbook = Playbook::new("containment")
        .with_step(Step::new("t1", "On alert", StepKind::Trigger).with_next("a1"))
        .with_step(action_step("a1", "Quarantine").with_next("a2"))
        .with_step(action_step("a2", "Notify"));

    let result = runner(Arc::new(ScriptedCollaborator::refusing("a1")))
        .run(&playbook, HashMap::new(), Correlation::default())
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(step_ids(&result), vec!["t1", "a1"]);
    assert!(result.step_result("a1").unwrap().status == StepStatus::Failed);
    assert!(result.error.as_ref().unwrap().contains("refused by policy"));
}

#[tokio::test]
async fn failing_branch_with_surviving_sibling_still_completes() {
    let playbook = Playbook::new("fan-out")
        .with_step(
            Step::new("t1", "On alert", StepKind::Trigger)
                .with_next("a1")
                .with_next("a2"),
        )
        .with_step(action_step("a1", "Quarantine"))
        .with_step(action_step("a2", "Notify"));

    let result = runner(Arc::new(ScriptedCollaborator::refusing("a1")))
        .run(&playbook, HashMap::new(), Correlation::default())
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(step_ids(&result), vec!["t1", "a1", "a2"]);
    assert!(result.step_result("a1").unwrap().status == StepStatus::Failed);
}

#[tokio::test]
async fn condition_without_expression_fails_its_path() {
    let playbook = Playbook::new("misconfigured")
        .with_step(Step::new("t1", "On alert", StepKind::Trigger).with_next("c1"))
        .with_step(Step::new("c1", "Empty gate", StepKind::Condition).with_next("a1"))
        .with_step(action_step("a1", "Never runs"));

    let result = runner(Arc::new(ScriptedCollaborator::new()))
        .run(&playbook, HashMap::new(), Correlation::default())
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(step_ids(&result), vec!["t1", "c1"]);
    assert!(result
        .step_result("c1")
        .unwrap()
        .error
        .as_ref()
        .unwrap()
        .contains("no condition expression"));
}

#[tokio::test]
async fn unknown_step_type_fails_the_step() {
    let playbook = Playbook::new("foreign")
        .with_step(Step::new("t1", "On alert", StepKind::Trigger).with_next("s1"))
        .with_step(Step::new("s1", "Imported oddity", StepKind::Unknown));

    let result = runner(Arc::new(ScriptedCollaborator::new()))
        .run(&playbook, HashMap::new(), Correlation::default())
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result
        .step_result("s1")
        .unwrap()
        .error
        .as_ref()
        .unwrap()
        .contains("unknown step type"));
}

#[tokio::test]
async fn cycle_is_refused_and_run_terminates() {
    let playbook = Playbook::new("loop")
        .with_step(Step::new("t1", "On alert", StepKind::Trigger).with_next("a1"))
        .with_step(action_step("a1", "Loop back").with_next("t1"));

    let result = runner(Arc::new(ScriptedCollaborator::new()))
        .run(&playbook, HashMap::new(), Correlation::default())
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    // Each step ran exactly once.
    assert_eq!(step_ids(&result), vec!["t1", "a1"]);
    assert!(result
        .log
        .iter()
        .any(|e| e.message.contains("already executed this run")));
}

#[tokio::test]
async fn diamond_join_runs_shared_step_once() {
    let playbook = Playbook::new("diamond")
        .with_step(
            Step::new("t1", "On alert", StepKind::Trigger)
                .with_next("a1")
                .with_next("a2"),
        )
        .with_step(action_step("a1", "Left").with_next("join"))
        .with_step(action_step("a2", "Right").with_next("join"))
        .with_step(action_step("join", "Report"));

    let result = runner(Arc::new(ScriptedCollaborator::new()))
        .run(&playbook, HashMap::new(), Correlation::default())
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(step_ids(&result), vec!["t1", "a1", "join", "a2"]);
    assert!(result
        .log
        .iter()
        .all(|e| !e.message.contains("cycle")));
}

#[tokio::test]
async fn cycle_with_exit_branch_completes() {
    let playbook = Playbook::new("loop-with-exit")
        .with_step(Step::new("t1", "On alert", StepKind::Trigger).with_next("a1"))
        .with_step(action_step("a1", "Work").with_next("a1").with_next("a2"))
        .with_step(action_step("a2", "Finish"));

    let result = runner(Arc::new(ScriptedCollaborator::new()))
        .run(&playbook, HashMap::new(), Correlation::default())
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(step_ids(&result), vec!["t1", "a1", "a2"]);
}

#[tokio::test]
async fn runs_are_isolated() {
    let playbook = Playbook::new("stateless")
        .with_step(Step::new("t1", "On alert", StepKind::Trigger).with_next("a1"))
        .with_step(
            Step::new("a1", "Mark", StepKind::Action)
                .with_config(StepConfig::action("set_variables").with_parameter("touched", true)),
        );

    let engine = runner(Arc::new(ScriptedCollaborator::new()));
    let first = engine
        .run(&playbook, HashMap::new(), Correlation::default())
        .await;
    let second = engine
        .run(&playbook, HashMap::new(), Correlation::for_alert("alert-7"))
        .await;

    assert_ne!(first.execution_id, second.execution_id);
    assert_eq!(first.variables["touched"], json!(true));
    assert_eq!(second.variables["touched"], json!(true));
    assert_eq!(second.correlation.alert_id.as_deref(), Some("alert-7"));
    assert!(first.correlation.alert_id.is_none());
    assert_eq!(first.step_results.len(), 2);
    assert_eq!(second.step_results.len(), 2);
}

#[tokio::test]
async fn passthrough_and_notification_steps() {
    let playbook = Playbook::new("mixed")
        .with_step(Step::new("t1", "On alert", StepKind::Trigger).with_next("i1"))
        .with_step(Step::new("i1", "Input marker", StepKind::Input).with_next("n1"))
        .with_step(
            Step::new("n1", "Page on-call", StepKind::Notification)
                .with_config(StepConfig::action("notify").with_parameter("channel", "soc"))
                .with_next("o1"),
        )
        .with_step(Step::new("o1", "Output marker", StepKind::Output));

    let collab = Arc::new(ScriptedCollaborator::new());
    let result = runner(collab.clone())
        .run(&playbook, HashMap::new(), Correlation::default())
        .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(step_ids(&result), vec!["t1", "i1", "n1", "o1"]);
    // Only the notification reached the collaborator.
    assert_eq!(collab.invoked_actions(), vec![Some("notify".to_string())]);
}

#[tokio::test]
async fn result_round_trips_through_json() {
    let playbook = Playbook::new("audit")
        .with_step(Step::new("t1", "On alert", StepKind::Trigger).with_next("a1"))
        .with_step(action_step("a1", "Enrich"));

    let result = runner(Arc::new(ScriptedCollaborator::new()))
        .run(&playbook, HashMap::new(), Correlation::for_case("case-42"))
        .await;

    let json = serde_json::to_string_pretty(&result).unwrap();
    let back: rp_engine::ExecutionResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back.execution_id, result.execution_id);
    assert_eq!(back.status, ExecutionStatus::Completed);
    assert_eq!(back.step_results.len(), 2);
    assert_eq!(back.correlation.case_id.as_deref(), Some("case-42"));
}
