use baton::cli::HookKind;
use baton::config::AppConfig;
use baton::config::merge::default_approval_patterns;
use baton::hooks::{EXIT_BLOCK, EXIT_WARN, HookInput, dispatch};
use baton::review::queue::assign;
use baton::session::{ReviewStatus, SessionHandle, StateStore};
use std::path::Path;
use tempfile::TempDir;

// ─── Helpers ──────────────────────────────────────────────────────────

fn setup_workspace() -> TempDir {
    tempfile::tempdir().expect("failed to create temp dir")
}

/// A reviewer command running `script` under `sh`; the prompt arrives as `$1`.
fn reviewer(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into(), "reviewer".into()]
}

fn test_config(workspace: &Path, glm: Vec<String>, codex: Vec<String>) -> AppConfig {
    AppConfig {
        workspace: workspace.to_path_buf(),
        worker: workspace.join("worker.sh"),
        output_root: workspace.join(".baton/batches"),
        poll_interval_secs: 1,
        deadline_secs: 30,
        review_timeout_secs: 5,
        approval_patterns: default_approval_patterns(),
        glm_command: glm,
        codex_command: codex,
        state_path: workspace.join(".baton/session_state.json"),
        archive_dir: workspace.join(".baton/logs"),
        hook_log_limit: 100,
        review_retention_secs: 3600,
    }
}

fn session(config: &AppConfig) -> SessionHandle {
    SessionHandle::spawn(StateStore::from_config(config))
}

fn edit(file: &str) -> HookInput {
    HookInput::parse(&format!(
        r#"{{"hook_name":"post-edit","tool_name":"Edit","tool_input":{{"file_path":"{file}"}}}}"#
    ))
}

fn tracker(json: &str) -> HookInput {
    HookInput::parse(json)
}

// ============================================================
// Review gate
// ============================================================

#[tokio::test]
async fn test_approval_continues_and_completes_review() {
    let ws = setup_workspace();
    let config = test_config(ws.path(), reviewer("echo 'Looks good. APPROVED'"), vec![]);
    let handle = session(&config);

    let out = dispatch(HookKind::ReviewGate, &edit("src/auth.py"), &config, handle.clone()).await;

    assert_eq!(out.exit_code, 0);
    assert_eq!(out.stdout, r#"{"continue":true}"#);

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.pending_reviews.len(), 1);
    let review = &state.pending_reviews[0];
    assert_eq!(review.reviewer, "glm");
    assert_eq!(review.author, "claude");
    assert_eq!(review.status, ReviewStatus::Completed);
    let result = review.result.as_ref().unwrap();
    assert!(result.approved);
    assert!(result.review.contains("Looks good"));
}

#[tokio::test]
async fn test_rejection_blocks_with_review_text() {
    let ws = setup_workspace();
    let config = test_config(ws.path(), reviewer("echo 'Missing input validation'"), vec![]);
    let handle = session(&config);

    let out = dispatch(HookKind::ReviewGate, &edit("src/auth.py"), &config, handle.clone()).await;

    assert_eq!(out.exit_code, EXIT_BLOCK);
    let body: serde_json::Value = serde_json::from_str(&out.stdout).unwrap();
    assert_eq!(body["continue"], false);
    assert!(
        body["stopReason"]
            .as_str()
            .unwrap()
            .contains("Missing input validation")
    );

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.pending_reviews[0].status, ReviewStatus::Failed);
    assert_eq!(state.glm_failures, 0, "a rejection is not an invocation failure");
}

#[tokio::test]
async fn test_missing_reviewer_warns_without_blocking() {
    let ws = setup_workspace();
    let config = test_config(ws.path(), vec!["baton-no-such-glm".into()], vec![]);
    let handle = session(&config);

    let out = dispatch(HookKind::ReviewGate, &edit("a.py"), &config, handle.clone()).await;

    assert_eq!(out.exit_code, EXIT_WARN);
    assert_eq!(out.stdout, r#"{"continue":true}"#);
    assert!(out.diagnostic.unwrap().contains("baton-no-such-glm"));

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.glm_failures, 1);
    let result = state.pending_reviews[0].result.as_ref().unwrap();
    assert!(!result.success);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn test_reviewer_timeout_warns() {
    let ws = setup_workspace();
    let mut config = test_config(ws.path(), reviewer("sleep 10"), vec![]);
    config.review_timeout_secs = 1;
    let handle = session(&config);

    let out = dispatch(HookKind::ReviewGate, &edit("a.py"), &config, handle.clone()).await;

    assert_eq!(out.exit_code, EXIT_WARN);
    assert!(out.diagnostic.unwrap().contains("timed out"));
    assert_eq!(handle.snapshot().await.unwrap().glm_failures, 1);
}

#[tokio::test]
async fn test_no_file_path_continues() {
    let ws = setup_workspace();
    let config = test_config(ws.path(), reviewer("exit 1"), vec![]);
    let handle = session(&config);

    let out = dispatch(HookKind::ReviewGate, &HookInput::parse("{}"), &config, handle.clone()).await;

    assert_eq!(out.exit_code, 0);
    let state = handle.snapshot().await.unwrap();
    assert!(state.pending_reviews.is_empty());
    assert_eq!(state.hooks_executed.len(), 1);
}

#[tokio::test]
async fn test_edits_are_logged_under_the_input_hook_name() {
    let ws = setup_workspace();
    let config = test_config(ws.path(), reviewer("echo APPROVED"), vec![]);
    let handle = session(&config);

    dispatch(HookKind::ReviewGate, &edit("a.py"), &config, handle.clone()).await;
    dispatch(HookKind::ReviewGate, &HookInput::parse("{}"), &config, handle.clone()).await;

    let state = handle.snapshot().await.unwrap();
    let names: Vec<&str> = state
        .hooks_executed
        .iter()
        .map(|h| h.hook_name.as_str())
        .collect();
    assert_eq!(names, vec!["post-edit", "post-edit", "review-gate"]);
}

#[tokio::test]
async fn test_pending_duplicate_does_not_invoke_reviewer() {
    let ws = setup_workspace();
    let marker = ws.path().join("invoked");
    let config = test_config(
        ws.path(),
        reviewer(&format!("touch {}; echo APPROVED", marker.display())),
        vec![],
    );
    let handle = session(&config);
    handle
        .update(|state| {
            assign(state, "a.py");
        })
        .await
        .unwrap();

    let out = dispatch(HookKind::ReviewGate, &edit("a.py"), &config, handle.clone()).await;

    assert_eq!(out.exit_code, 0);
    assert!(!marker.exists(), "reviewer must not run for a duplicate");
    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.pending_reviews.len(), 1);
    assert!(state.pending_reviews[0].is_pending());
}

#[tokio::test]
async fn test_reviewer_follows_last_agent_rotation() {
    let ws = setup_workspace();
    let config = test_config(ws.path(), reviewer("exit 9"), reviewer("echo LGTM"));
    let handle = session(&config);

    let out = dispatch(
        HookKind::SessionTracker,
        &tracker(r#"{"action":"set_agent","agent":"glm"}"#),
        &config,
        handle.clone(),
    )
    .await;
    assert_eq!(out.exit_code, 0);

    let out = dispatch(HookKind::ReviewGate, &edit("a.py"), &config, handle.clone()).await;
    assert_eq!(out.exit_code, 0);

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.pending_reviews[0].reviewer, "codex");
    assert_eq!(state.pending_reviews[0].author, "glm");
}

#[tokio::test]
async fn test_claude_reviews_locally() {
    let ws = setup_workspace();
    let config = test_config(ws.path(), vec![], vec![]);
    let handle = session(&config);
    handle
        .update(|state| state.last_agent = "codex".into())
        .await
        .unwrap();

    let out = dispatch(HookKind::ReviewGate, &edit("a.py"), &config, handle.clone()).await;

    assert_eq!(out.exit_code, 0);
    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.pending_reviews[0].reviewer, "claude");
    assert_eq!(state.pending_reviews[0].status, ReviewStatus::Completed);
}

// ============================================================
// Session tracker
// ============================================================

#[tokio::test]
async fn test_tracker_task_lifecycle() {
    let ws = setup_workspace();
    let config = test_config(ws.path(), vec![], vec![]);
    let handle = session(&config);

    for json in [
        r#"{"action":"start_task","task":"split parser"}"#,
        r#"{"action":"delegate","agent":"codex","task":"write parser tests"}"#,
        r#"{"action":"agent_failure","agent":"codex"}"#,
        r#"{"action":"complete_task"}"#,
    ] {
        let out = dispatch(HookKind::SessionTracker, &tracker(json), &config, handle.clone()).await;
        assert_eq!(out.exit_code, 0, "action {json} failed");
    }

    let state = handle.snapshot().await.unwrap();
    assert_eq!(state.delegated_to_codex.len(), 1);
    assert_eq!(state.delegated_to_codex[0].task, "write parser tests");
    assert_eq!(state.last_agent, "codex");
    assert_eq!(state.codex_failures, 1);
    assert_eq!(state.total_tasks_completed, 1);
    assert!(state.current_task.is_none());
    assert_eq!(state.hooks_executed.len(), 4);
}

#[tokio::test]
async fn test_tracker_status_prints_state() {
    let ws = setup_workspace();
    let config = test_config(ws.path(), vec![], vec![]);
    let handle = session(&config);

    let out = dispatch(
        HookKind::SessionTracker,
        &tracker(r#"{"action":"status"}"#),
        &config,
        handle,
    )
    .await;

    assert_eq!(out.exit_code, 0);
    let body: serde_json::Value = serde_json::from_str(&out.stdout).unwrap();
    assert_eq!(body["last_agent"], "claude");
    assert_eq!(body["hooks_executed"][0]["detail"], "status");
}

#[tokio::test]
async fn test_tracker_rejects_bad_arguments_with_warning() {
    let ws = setup_workspace();
    let config = test_config(ws.path(), vec![], vec![]);
    let handle = session(&config);

    let out = dispatch(
        HookKind::SessionTracker,
        &tracker(r#"{"action":"delegate","agent":"bard"}"#),
        &config,
        handle.clone(),
    )
    .await;

    assert_eq!(out.exit_code, EXIT_WARN);
    assert!(out.diagnostic.unwrap().contains("bard"));
    let state = handle.snapshot().await.unwrap();
    assert!(state.delegated_to_glm.is_empty());
    assert_eq!(state.hooks_executed.len(), 1);
}

#[tokio::test]
async fn test_end_session_archives_and_preserves_stats() {
    let ws = setup_workspace();
    let config = test_config(ws.path(), vec!["baton-no-such-glm".into()], vec![]);
    let handle = session(&config);

    dispatch(HookKind::ReviewGate, &edit("a.py"), &config, handle.clone()).await;
    handle
        .update(|state| {
            state.total_tasks_completed = 4;
            assign(state, "b.py");
        })
        .await
        .unwrap();
    let before = handle.snapshot().await.unwrap();

    let out = dispatch(
        HookKind::SessionTracker,
        &tracker(r#"{"action":"end_session"}"#),
        &config,
        handle.clone(),
    )
    .await;
    assert_eq!(out.exit_code, 0);

    let after = handle.snapshot().await.unwrap();
    assert_ne!(after.session_id, before.session_id);
    assert_eq!(after.total_tasks_completed, 4);
    assert_eq!(after.glm_failures, 1);
    // Only the still-pending review survives.
    assert_eq!(after.pending_reviews.len(), 1);
    assert_eq!(after.pending_reviews[0].file_path, "b.py");
    assert_eq!(after.hooks_executed.len(), 1);

    let archive = std::fs::read_to_string(config.archive_dir.join("sessions.jsonl")).unwrap();
    let entry: serde_json::Value = serde_json::from_str(archive.lines().last().unwrap()).unwrap();
    assert_eq!(entry["event_type"], "session_summary");
    assert_eq!(entry["session_id"], before.session_id.as_str());
    assert_eq!(entry["reviews_failed"], 1);
}

// ============================================================
// Persistence
// ============================================================

#[tokio::test]
async fn test_concurrent_hook_processes_do_not_lose_updates() {
    let ws = setup_workspace();
    let config = test_config(ws.path(), vec![], vec![]);

    // One actor per simulated hook process, all sharing the state file.
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let config = config.clone();
        tasks.push(tokio::spawn(async move {
            let handle = session(&config);
            dispatch(
                HookKind::SessionTracker,
                &tracker(r#"{"action":"complete_task"}"#),
                &config,
                handle,
            )
            .await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().exit_code, 0);
    }

    let state = StateStore::from_config(&config).load();
    assert_eq!(state.total_tasks_completed, 8);
    assert_eq!(state.hooks_executed.len(), 8);
}

#[tokio::test]
async fn test_each_save_keeps_a_backup() {
    let ws = setup_workspace();
    let config = test_config(ws.path(), vec![], vec![]);
    let handle = session(&config);

    for json in [
        r#"{"action":"start_task","task":"one"}"#,
        r#"{"action":"start_task","task":"two"}"#,
    ] {
        dispatch(HookKind::SessionTracker, &tracker(json), &config, handle.clone()).await;
    }

    let store = StateStore::from_config(&config);
    let backup: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.backup_path()).unwrap()).unwrap();
    assert_eq!(backup["current_task"], "one");
    assert_eq!(store.load().current_task.as_deref(), Some("two"));
}
