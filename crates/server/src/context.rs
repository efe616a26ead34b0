use crate::bridge::{BridgeRequest, PollingBridge, SessionOutcome};
use crate::classify::EventClassifier;
use crate::dedup::DeliveryDeduplicator;
use crate::sessions::SessionRegistry;
use anyhow::Context as _;
use slackrelay_backend::{BackendApi, HttpBackend};
use slackrelay_core::config::AppConfig;
use slackrelay_core::metrics::MetricsStore;
use slackrelay_core::types::InboundEvent;
use slackrelay_slack::{RelayClient, SlackClient};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// What became of one accepted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// Not addressed to the bot (self-authored, non-message, or a channel
    /// message without a mention).
    Ignored,
    /// Same delivery already in flight; dropped without any relay call.
    Duplicate,
    Finished(SessionOutcome),
}

/// Everything one running bridge needs, owned by the caller that starts the
/// server and passed down explicitly. [`RelayContext::shutdown`] tears it
/// down.
#[derive(Clone)]
pub struct RelayContext {
    classifier: Arc<EventClassifier>,
    dedup: DeliveryDeduplicator,
    bridge: PollingBridge,
    sessions: SessionRegistry,
    metrics: Arc<MetricsStore>,
}

impl RelayContext {
    pub fn new(classifier: EventClassifier, bridge: PollingBridge) -> Self {
        Self {
            classifier: Arc::new(classifier),
            dedup: DeliveryDeduplicator::new(),
            bridge,
            sessions: SessionRegistry::new(),
            metrics: MetricsStore::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let classifier = EventClassifier::new(&config.slack.bot_user_id)
            .context("invalid bot user id")?;
        let relay: Arc<dyn RelayClient> = Arc::new(
            SlackClient::from_config(&config.slack).context("invalid Slack client config")?,
        );
        let backend: Arc<dyn BackendApi> =
            Arc::new(HttpBackend::from_config(&config.backend).context("invalid backend config")?);
        let bridge = PollingBridge::new(relay, backend, config.polling);
        Ok(Self::new(classifier, bridge))
    }

    pub fn dedup(&self) -> &DeliveryDeduplicator {
        &self.dedup
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn metrics(&self) -> &Arc<MetricsStore> {
        &self.metrics
    }

    /// Run [`Self::process_event`] in the background. Returns the session id
    /// of the spawned task.
    pub fn dispatch(&self, event: InboundEvent) -> Uuid {
        let ctx = self.clone();
        let channel_id = event.channel_id.clone();
        self.sessions.spawn(&channel_id, move |session_id| async move {
            ctx.process_event(session_id, event).await;
        })
    }

    /// classify -> dedup gate -> extract -> bridge. The dedup entry is held
    /// for the whole session and released on every exit path.
    pub async fn process_event(&self, session_id: Uuid, event: InboundEvent) -> Processed {
        let Some(routed) = self.classifier.route(&event) else {
            debug!(channel = %event.channel_id, ts = %event.event_ts, "Event not addressed to bot");
            self.metrics.inc_ignored();
            return Processed::Ignored;
        };

        let Some(_guard) = self.dedup.try_acquire(event.delivery_key()) else {
            info!(channel = %event.channel_id, ts = %event.event_ts, "Duplicate delivery dropped");
            self.metrics.inc_duplicate();
            return Processed::Duplicate;
        };
        self.metrics.inc_accepted();

        let request = BridgeRequest {
            session_id,
            channel_id: routed.channel_id,
            user_id: routed.user_id,
            text: routed.text,
            thread_ts: routed.thread_ts,
        };
        let outcome = self.bridge.run(request).await;

        match &outcome {
            SessionOutcome::Relayed { .. } => self.metrics.inc_relayed(),
            SessionOutcome::TimedOut { .. } => self.metrics.inc_timed_out(),
            SessionOutcome::AckFailed(_)
            | SessionOutcome::SubmitFailed(_)
            | SessionOutcome::Failed { .. } => self.metrics.inc_failed(),
            SessionOutcome::EmptyRequest => {}
        }
        info!(
            target: "audit",
            %session_id,
            channel = %event.channel_id,
            user = %event.author_id,
            outcome = outcome.label(),
            state = %outcome.final_state(),
            polls = outcome.polls(),
            "relay session finished"
        );

        Processed::Finished(outcome)
    }

    /// Cancel running sessions and forget in-flight deliveries. Called at
    /// process exit; the context may be reused afterwards.
    pub fn shutdown(&self) {
        let aborted = self.sessions.abort_all();
        self.dedup.clear();
        info!(aborted, "Relay context shut down");
    }
}
