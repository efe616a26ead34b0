use anyhow::{anyhow, Result};
use slackrelay_backend::{BackendApi, HttpBackend};
use slackrelay_core::config::AppConfig;
use slackrelay_slack::SlackClient;
use tracing::info;

/// Verify the bot token via `auth.test` and check it belongs to the
/// configured bot user.
pub async fn verify_slack(config: &AppConfig) -> Result<String> {
    let client = SlackClient::from_config(&config.slack)?;
    let user_id = client
        .auth_test()
        .await
        .map_err(|e| anyhow!("❌ Slack token verification failed: {}", e))?;

    if user_id != config.slack.bot_user_id {
        return Err(anyhow!(
            "❌ Slack token belongs to {} but slack.bot_user_id is {}",
            user_id,
            config.slack.bot_user_id
        ));
    }
    info!("Slack bot verified: {}", user_id);
    Ok(format!("✅ Slack bot token verified ({})", user_id))
}

/// Read the backend state once.
pub async fn verify_backend(config: &AppConfig) -> Result<String> {
    let backend = HttpBackend::from_config(&config.backend)?;
    let state = backend
        .query_state()
        .await
        .map_err(|e| anyhow!("❌ Backend at {} is not usable: {}", config.backend.base_url, e))?;

    Ok(format!(
        "✅ Backend reachable at {} ({} history entries, queue length {})",
        config.backend.base_url,
        state.history.len(),
        state.queue_length
    ))
}
