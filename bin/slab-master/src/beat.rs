//! `Q_DEFAULT` consumer + periodic GPU-release scheduler for the Master side.
//!
//! `Q_DEFAULT` carries four task names split across the two processes
//! (`slab_types::config::task_name`): this consumer claims `save-chat` and
//! `update-summary` (`task_name::is_master_default_task`) and re-pushes
//! anything else so the Worker's own `Q_DEFAULT` consumer eventually claims
//! it, mirroring `bin/slab-worker/src/main.rs`'s `consume_default_queue`.

use crate::db::ChatStore;
use crate::state::AppState;
use slab_types::config::{task_name, Q_DEFAULT, RELEASE_SWEEP_INTERVAL};
use slab_types::{ChatTurn, Role};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Drain `Q_DEFAULT`, handling `save-chat` / `update-summary` and re-pushing
/// everything else for the Worker.
pub async fn consume_default_queue(worker_id: usize, state: Arc<AppState>) {
    loop {
        match state.broker.receive(Q_DEFAULT, Duration::from_secs(1)).await {
            Ok(Some(envelope)) if envelope.name == task_name::SAVE_CHAT => {
                if let Err(e) = handle_save_chat(&state, envelope.payload).await {
                    warn!(worker_id, error = %e, "save-chat task failed");
                }
            }
            Ok(Some(envelope)) if envelope.name == task_name::UPDATE_SUMMARY => {
                if let Err(e) = handle_update_summary(&state, envelope.payload).await {
                    warn!(worker_id, error = %e, "update-summary task failed");
                }
            }
            Ok(Some(envelope)) => {
                if let Err(e) = state.broker.resubmit(envelope).await {
                    warn!(worker_id, error = %e, "failed to re-push foreign Q_DEFAULT task");
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(worker_id, error = %e, "failed to receive from Q_DEFAULT; backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Persists a completed chat turn and refreshes the session cache window
/// (spec §4.6 step 5, §4.7 "Append"). Payload: `{session_id, user_msg,
/// ai_msg, chunks}` (`slab_orchestrator::run_turn`'s `SAVE_CHAT` submission).
async fn handle_save_chat(state: &AppState, payload: serde_json::Value) -> anyhow::Result<()> {
    let session_id = payload["session_id"].as_str().ok_or_else(|| anyhow::anyhow!("save-chat: missing session_id"))?;
    let user_msg = payload["user_msg"].as_str().ok_or_else(|| anyhow::anyhow!("save-chat: missing user_msg"))?;
    let ai_msg = payload["ai_msg"].as_str().ok_or_else(|| anyhow::anyhow!("save-chat: missing ai_msg"))?;

    state.store.ensure_session(session_id).await?;
    state.store.append_message(session_id, Role::User, user_msg).await?;
    state.store.append_message(session_id, Role::Assistant, ai_msg).await?;

    state
        .session_cache
        .append(
            session_id,
            ChatTurn { role: Role::User, content: user_msg.to_string() },
            ChatTurn { role: Role::Assistant, content: ai_msg.to_string() },
        )
        .await?;
    Ok(())
}

/// Re-summarizes a session's evicted turns and applies the result to both
/// the durable summary and the cache (spec §4.7 "Re-summary task").
///
/// Two distinct payload shapes reach this handler:
/// - automatic eviction (`slab_session::SessionCache::append`):
///   `{session_id, current_summary, oldest_two: [ChatTurn; 2]}`
/// - manual trigger (`routes::sessions::update_summary`):
///   `{session_id, oldest_message_ids: [i64]}`, requiring a DB lookup for
///   the actual message content.
async fn handle_update_summary(state: &AppState, payload: serde_json::Value) -> anyhow::Result<()> {
    let session_id =
        payload["session_id"].as_str().ok_or_else(|| anyhow::anyhow!("update-summary: missing session_id"))?;

    let (current_summary, turns): (Option<String>, Vec<ChatTurn>) = if payload.get("oldest_two").is_some() {
        let oldest_two: Vec<ChatTurn> = serde_json::from_value(payload["oldest_two"].clone())?;
        let current_summary = payload["current_summary"].as_str().map(str::to_string);
        (current_summary, oldest_two)
    } else {
        let ids: Vec<i64> = serde_json::from_value(payload["oldest_message_ids"].clone())?;
        let messages = state.store.messages_by_ids(&ids).await?;
        let current_summary = state.store.get_summary(session_id).await?;
        let turns = messages.into_iter().map(|m| ChatTurn { role: m.role, content: m.content }).collect();
        (current_summary, turns)
    };

    let transcript = turns
        .iter()
        .map(|t| match t.role {
            Role::User => format!("user: {}", t.content),
            Role::Assistant => format!("assistant: {}", t.content),
        })
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = match &current_summary {
        Some(existing) => {
            format!("Existing summary:\n{existing}\n\nFold in these older turns, keep it concise:\n{transcript}")
        }
        None => format!("Summarize these chat turns concisely:\n{transcript}"),
    };

    let new_summary = state
        .llm
        .complete(Some("You produce short, factual session summaries for a chat assistant."), &prompt)
        .await?;

    state.session_cache.apply_new_summary(session_id, new_summary.clone()).await?;
    state.store.set_summary(session_id, &new_summary).await?;
    Ok(())
}

/// Submits `release-gpu-if-idle` to `Q_DEFAULT` every `RELEASE_SWEEP_INTERVAL`
/// for the Worker's `Q_DEFAULT` consumer to act on (spec §4.3).
pub async fn release_sweep_scheduler(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(RELEASE_SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = state.broker.submit(task_name::RELEASE_GPU_IF_IDLE, serde_json::json!({})).await {
            warn!(error = %e, "failed to submit release-gpu-if-idle sweep");
        }
    }
}
