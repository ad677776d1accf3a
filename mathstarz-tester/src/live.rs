//! Read-only checks against a running backend.
//!
//! Nothing is pushed: the check pulls the user's record and puzzles, loads
//! each NPC's current question and reconciles the pull into a throwaway
//! in-memory session.
use anyhow::{Context, Result, ensure};
use mathstarz_client::{ClientConfig, HttpBackend, RemoteBackend};
use mathstarz_game::{MemoryProgressStorage, ReconcileStatus, UserId};
use std::time::Instant;

use crate::logic::ScenarioResult;
use crate::scenario::ScenarioCtx;

pub const LIVE_SCENARIO_NAME: &str = "Live Backend Sync";

pub async fn run_live_check(
    ctx: &ScenarioCtx,
    config: &ClientConfig,
    user_id: UserId,
) -> ScenarioResult {
    let start = Instant::now();
    let outcome = live_check(ctx, config, user_id).await;
    let elapsed = start.elapsed();
    let failures = match outcome {
        Ok(()) => Vec::new(),
        Err(err) => {
            log::error!("Live check against {} failed: {err:#}", config.base_url());
            vec![format!("{err:#}")]
        }
    };
    ScenarioResult {
        scenario_name: LIVE_SCENARIO_NAME.to_string(),
        seed: u64::from(user_id.0),
        passed: failures.is_empty(),
        iterations_run: 1,
        successful_iterations: usize::from(failures.is_empty()),
        failures,
        average_duration: elapsed,
    }
}

async fn live_check(ctx: &ScenarioCtx, config: &ClientConfig, user_id: UserId) -> Result<()> {
    let backend = HttpBackend::new(config).context("building HTTP client")?;
    let user = backend
        .fetch_user(user_id)
        .await
        .with_context(|| format!("fetching user {user_id}"))?;
    ensure!(
        user.user_id().ok() == Some(user_id),
        "backend returned user '{}' for id {user_id}",
        user.id
    );

    let remote = backend
        .pull_all_puzzles(user_id)
        .await
        .context("pulling puzzle progress")?;
    log::info!("Pulled {} puzzle records for user {user_id}", remote.len());

    let storage = MemoryProgressStorage::default();
    let mut session = ctx.session_for(user, &storage)?;
    let ReconcileStatus::Applied { report, moved } = session.reconcile(remote) else {
        anyhow::bail!("idle session deferred the pull");
    };
    log::info!(
        "Reconciled: {} changed, {} pointers moved",
        report.changed.len(),
        moved.len()
    );

    for definition in session.gate().definitions() {
        let Some(question_id) = session.gate().current_question(definition.npc_id) else {
            continue;
        };
        let npc = definition.npc_id;
        let question = backend
            .fetch_question(question_id)
            .await
            .with_context(|| format!("loading question {question_id} for NPC {npc}"))?;
        log::debug!("NPC {npc} asks: {}", question.question_text);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_backend_fails_the_check() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let config = ClientConfig {
            backend_url: format!("http://{addr}"),
            request_timeout_secs: 2,
            ..ClientConfig::default()
        };
        let result = run_live_check(&ScenarioCtx::bundled(), &config, UserId(7)).await;
        assert!(!result.passed);
        assert_eq!(result.successful_iterations, 0);
        assert!(result.failures[0].contains("fetching user 7"));
    }
}
