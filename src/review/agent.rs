use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::session::state::{Delegation, SessionState};

/// The agents taking part in the review rotation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    Claude,
    Glm,
    Codex,
}

impl Agent {
    pub fn as_str(self) -> &'static str {
        match self {
            Agent::Claude => "claude",
            Agent::Glm => "glm",
            Agent::Codex => "codex",
        }
    }

    /// The agent that reviews work authored by `self`.
    pub fn next_reviewer(self) -> Agent {
        match self {
            Agent::Claude => Agent::Glm,
            Agent::Glm => Agent::Codex,
            Agent::Codex => Agent::Claude,
        }
    }

    /// Bump this agent's failure counter. Claude has none.
    pub fn record_failure(self, state: &mut SessionState) {
        match self {
            Agent::Glm => state.glm_failures += 1,
            Agent::Codex => state.codex_failures += 1,
            Agent::Claude => {}
        }
    }

    /// Record `task` as delegated to this agent and make it the last agent.
    pub fn record_delegation(self, state: &mut SessionState, task: &str) {
        let entry = Delegation {
            task: task.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        match self {
            Agent::Glm => state.delegated_to_glm.push(entry),
            Agent::Codex => state.delegated_to_codex.push(entry),
            Agent::Claude => {}
        }
        state.last_agent = self.as_str().to_string();
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Agent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(Agent::Claude),
            "glm" => Ok(Agent::Glm),
            "codex" => Ok(Agent::Codex),
            other => Err(format!("unknown agent '{other}'")),
        }
    }
}

/// Pick the reviewer for work by `author`. Unknown authors go to GLM.
pub fn reviewer_for(author: &str) -> Agent {
    author
        .parse::<Agent>()
        .map(Agent::next_reviewer)
        .unwrap_or(Agent::Glm)
}
