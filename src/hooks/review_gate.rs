use anyhow::Context;

use super::{HookInput, HookOutput};
use crate::config::AppConfig;
use crate::review::{ApprovalMatcher, CommandReviewer, ReviewQueue};
use crate::session::SessionHandle;

/// Review the edited file named in `tool_input.file_path`.
///
/// Without a file path there is nothing to review and the caller proceeds.
pub async fn run(
    input: &HookInput,
    config: &AppConfig,
    session: SessionHandle,
) -> anyhow::Result<HookOutput> {
    let hook_name = input
        .hook_name
        .clone()
        .unwrap_or_else(|| "review-gate".to_string());

    let Some(file_path) = input.file_path() else {
        tracing::debug!("no file_path in hook input, nothing to review");
        let hook = hook_name.clone();
        session
            .update(move |state| state.record_hook(&hook, "no file_path"))
            .await?;
        return Ok(HookOutput::proceed());
    };

    let matcher = ApprovalMatcher::new(&config.approval_patterns)
        .context("Invalid review.approval_patterns")?;
    let queue = ReviewQueue::new(session, CommandReviewer::from_config(config), matcher);

    let decision = queue.on_edit(&hook_name, file_path).await?;
    Ok(decision.into())
}
