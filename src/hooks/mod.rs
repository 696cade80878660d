//! Hook entry points called by an orchestrating agent.
//!
//! A hook reads one JSON object from stdin and answers on stdout:
//! exit 0 with `{"continue":true}` to proceed, exit 2 with
//! `{"continue":false,"stopReason":...}` to block, exit 1 for a warning
//! that does not stop the caller. Diagnostics only ever go to stderr.

pub mod review_gate;
pub mod session_tracker;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

use crate::cli::HookKind;
use crate::config::AppConfig;
use crate::review::GateDecision;
use crate::session::SessionHandle;

/// Exit code for a blocking rejection.
pub const EXIT_BLOCK: u8 = 2;
/// Exit code for a non-blocking warning.
pub const EXIT_WARN: u8 = 1;

/// The tool call that triggered the hook, if any.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ToolInput {
    pub file_path: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Free-form hook payload. Every field is optional; unknown fields are kept
/// in `extra` and otherwise ignored.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct HookInput {
    pub hook_name: Option<String>,
    pub action: Option<String>,
    pub agent: Option<String>,
    pub task: Option<String>,
    pub tool_input: Option<ToolInput>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl HookInput {
    /// Parse stdin contents. Empty or malformed input yields an empty payload.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str(raw) {
            Ok(input) => input,
            Err(e) => {
                tracing::warn!(error = %e, "hook input is not a JSON object, ignoring it");
                Self::default()
            }
        }
    }

    /// The edited file, ignoring blank paths.
    pub fn file_path(&self) -> Option<&str> {
        self.tool_input
            .as_ref()
            .and_then(|t| t.file_path.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// The JSON body written to stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookResponse {
    #[serde(rename = "continue")]
    pub proceed: bool,
    #[serde(rename = "stopReason", skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// Everything a hook invocation emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutput {
    pub exit_code: u8,
    /// Written to stdout as-is.
    pub stdout: String,
    /// Written to stderr, if present.
    pub diagnostic: Option<String>,
}

impl HookOutput {
    pub fn proceed() -> Self {
        Self::respond(0, true, None, None)
    }

    pub fn block(reason: String) -> Self {
        Self::respond(EXIT_BLOCK, false, Some(reason.clone()), Some(reason))
    }

    pub fn warn(message: String) -> Self {
        Self::respond(EXIT_WARN, true, None, Some(message))
    }

    /// Print `body` on stdout and exit 0.
    pub fn with_body(stdout: String) -> Self {
        Self {
            exit_code: 0,
            stdout,
            diagnostic: None,
        }
    }

    fn respond(
        exit_code: u8,
        proceed: bool,
        stop_reason: Option<String>,
        diagnostic: Option<String>,
    ) -> Self {
        let response = HookResponse {
            proceed,
            stop_reason,
        };
        let stdout = serde_json::to_string(&response)
            .unwrap_or_else(|_| format!("{{\"continue\":{proceed}}}"));
        Self {
            exit_code,
            stdout,
            diagnostic,
        }
    }
}

impl From<GateDecision> for HookOutput {
    fn from(decision: GateDecision) -> Self {
        match decision {
            GateDecision::Continue => HookOutput::proceed(),
            GateDecision::Block { reason } => HookOutput::block(reason),
            GateDecision::Warn { message } => HookOutput::warn(message),
        }
    }
}

/// Read the payload from stdin and run the requested hook.
///
/// Internal failures never block the caller: they come back as warnings.
pub async fn run(kind: HookKind, config: &AppConfig, session: SessionHandle) -> HookOutput {
    let mut raw = String::new();
    if let Err(e) = tokio::io::stdin().read_to_string(&mut raw).await {
        tracing::warn!(error = %e, "failed to read hook input");
    }
    dispatch(kind, &HookInput::parse(&raw), config, session).await
}

/// Run a hook against an already-parsed payload.
pub async fn dispatch(
    kind: HookKind,
    input: &HookInput,
    config: &AppConfig,
    session: SessionHandle,
) -> HookOutput {
    let result = match kind {
        HookKind::ReviewGate => review_gate::run(input, config, session).await,
        HookKind::SessionTracker => session_tracker::run(input, config, session).await,
    };

    result.unwrap_or_else(|e| {
        tracing::warn!(hook = ?kind, error = %e, "hook failed");
        HookOutput::warn(format!("{e:#}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_fields_and_keeps_extras() {
        let input = HookInput::parse(
            r#"{"tool_name":"Edit","tool_input":{"file_path":"src/a.rs","old_string":"x"},"agent":"glm"}"#,
        );
        assert_eq!(input.file_path(), Some("src/a.rs"));
        assert_eq!(input.agent.as_deref(), Some("glm"));
        assert!(input.extra.contains_key("tool_name"));
    }

    #[test]
    fn empty_or_malformed_input_is_empty_payload() {
        assert!(HookInput::parse("").file_path().is_none());
        assert!(HookInput::parse("not json").action.is_none());
        assert!(HookInput::parse(r#"{"tool_input":{"file_path":"  "}}"#)
            .file_path()
            .is_none());
    }

    #[test]
    fn responses_follow_the_exit_code_contract() {
        let ok = HookOutput::proceed();
        assert_eq!(ok.exit_code, 0);
        assert_eq!(ok.stdout, r#"{"continue":true}"#);
        assert!(ok.diagnostic.is_none());

        let blocked = HookOutput::from(GateDecision::Block {
            reason: "glm rejected".into(),
        });
        assert_eq!(blocked.exit_code, EXIT_BLOCK);
        let body: serde_json::Value = serde_json::from_str(&blocked.stdout).unwrap();
        assert_eq!(body["continue"], false);
        assert_eq!(body["stopReason"], "glm rejected");

        let warned = HookOutput::from(GateDecision::Warn {
            message: "reviewer missing".into(),
        });
        assert_eq!(warned.exit_code, EXIT_WARN);
        assert_eq!(warned.stdout, r#"{"continue":true}"#);
        assert_eq!(warned.diagnostic.as_deref(), Some("reviewer missing"));
    }
}
