//! The session-tracker hook: task, delegation, and session lifecycle events.

use super::{HookInput, HookOutput};
use crate::config::AppConfig;
use crate::review::Agent;
use crate::session::{SessionHandle, SessionState};

const HOOK_NAME: &str = "session-tracker";

/// A session-tracker event decoded from the hook payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerAction {
    StartTask { task: String },
    Delegate { agent: Agent, task: String },
    SetAgent { agent: Agent },
    CompleteTask,
    AgentFailure { agent: Agent },
    EndSession,
    Status,
    /// Missing or unrecognised action: only the hook execution is logged.
    Record { action: Option<String> },
}

impl TrackerAction {
    /// Decode `action` and its arguments. Missing or invalid arguments are
    /// reported as an error message.
    pub fn from_input(input: &HookInput) -> Result<Self, String> {
        let Some(action) = input.action.as_deref().map(str::trim) else {
            return Ok(TrackerAction::Record { action: None });
        };

        let agent = || -> Result<Agent, String> {
            input
                .agent
                .as_deref()
                .ok_or_else(|| format!("action `{action}` requires an `agent`"))?
                .parse::<Agent>()
        };
        let task = || input.task.clone().filter(|t| !t.trim().is_empty());

        match action {
            "start_task" => Ok(TrackerAction::StartTask {
                task: task().ok_or("action `start_task` requires a `task`")?,
            }),
            "delegate" => Ok(TrackerAction::Delegate {
                agent: agent()?,
                task: task().unwrap_or_default(),
            }),
            "set_agent" => Ok(TrackerAction::SetAgent { agent: agent()? }),
            "complete_task" => Ok(TrackerAction::CompleteTask),
            "agent_failure" => Ok(TrackerAction::AgentFailure { agent: agent()? }),
            "end_session" => Ok(TrackerAction::EndSession),
            "status" => Ok(TrackerAction::Status),
            other => Ok(TrackerAction::Record {
                action: Some(other.to_string()),
            }),
        }
    }

    fn label(&self) -> String {
        match self {
            TrackerAction::StartTask { task } => format!("start_task {task}"),
            TrackerAction::Delegate { agent, task } => format!("delegate {agent} {task}"),
            TrackerAction::SetAgent { agent } => format!("set_agent {agent}"),
            TrackerAction::CompleteTask => "complete_task".to_string(),
            TrackerAction::AgentFailure { agent } => format!("agent_failure {agent}"),
            TrackerAction::EndSession => "end_session".to_string(),
            TrackerAction::Status => "status".to_string(),
            TrackerAction::Record { action } => action.clone().unwrap_or_default(),
        }
    }

    /// Apply the state change for this action. `EndSession` and `Status` are
    /// handled by the caller.
    pub fn apply(&self, state: &mut SessionState) {
        match self {
            TrackerAction::StartTask { task } => state.current_task = Some(task.clone()),
            TrackerAction::Delegate { agent, task } => {
                let task = if task.is_empty() {
                    state.current_task.clone().unwrap_or_default()
                } else {
                    task.clone()
                };
                agent.record_delegation(state, &task);
            }
            TrackerAction::SetAgent { agent } => state.last_agent = agent.to_string(),
            TrackerAction::CompleteTask => {
                state.total_tasks_completed += 1;
                state.current_task = None;
            }
            TrackerAction::AgentFailure { agent } => agent.record_failure(state),
            TrackerAction::EndSession | TrackerAction::Status | TrackerAction::Record { .. } => {}
        }
    }
}

pub async fn run(
    input: &HookInput,
    config: &AppConfig,
    session: SessionHandle,
) -> anyhow::Result<HookOutput> {
    let hook_name = input
        .hook_name
        .clone()
        .unwrap_or_else(|| HOOK_NAME.to_string());

    let action = match TrackerAction::from_input(input) {
        Ok(action) => action,
        Err(message) => {
            let detail = format!("rejected: {message}");
            session
                .update(move |state| state.record_hook(&hook_name, detail))
                .await?;
            return Ok(HookOutput::warn(message));
        }
    };
    tracing::debug!(action = ?action, "session tracker event");

    match action {
        TrackerAction::EndSession => {
            let ended = session.end_session(config.archive_dir.clone()).await?;
            tracing::info!(
                session_id = %ended.session_id,
                total_tasks_completed = ended.total_tasks_completed,
                "session ended"
            );
            session
                .update(move |state| state.record_hook(&hook_name, "end_session"))
                .await?;
            Ok(HookOutput::proceed())
        }
        TrackerAction::Status => {
            let state = session
                .update(move |state| {
                    state.record_hook(&hook_name, "status");
                    state.clone()
                })
                .await?;
            Ok(HookOutput::with_body(serde_json::to_string_pretty(&state)?))
        }
        action => {
            session
                .update(move |state| {
                    action.apply(state);
                    state.record_hook(&hook_name, action.label());
                })
                .await?;
            Ok(HookOutput::proceed())
        }
    }
}
