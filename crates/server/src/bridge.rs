//! Forward a request to the backend, then poll its state and relay the answer.
//!
//! One call to [`PollingBridge::run`] is one session:
//! `Submitting -> Acknowledged -> Polling -> {Relayed | TimedOut | Failed}`.
//! The poll timer lives on the session's own stack, so every way out of the
//! loop (terminal state, error, task abort) cancels it.

use slackrelay_backend::{BackendApi, BackendError};
use slackrelay_core::config::PollingConfig;
use slackrelay_core::types::{BackendState, RelayHandle, RelayMessage};
use slackrelay_slack::{RelayClient, RelayError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const EMPTY_REQUEST_NOTICE: &str = "Please provide a message along with the mention.";
pub const PROCESSING_NOTICE: &str = ":hourglass_flowing_sand: Processing your request...";
pub const QUEUED_NOTICE: &str = ":inbox_tray: Request queued. Waiting for a response...";
pub const COMPLETION_NOTICE: &str = ":white_check_mark: Task completed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Submitting,
    Acknowledged,
    Polling,
    Relayed,
    TimedOut,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Submitting => "submitting",
            SessionState::Acknowledged => "acknowledged",
            SessionState::Polling => "polling",
            SessionState::Relayed => "relayed",
            SessionState::TimedOut => "timed_out",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Nothing to forward; the user was asked (privately) for a message.
    EmptyRequest,
    /// The "processing" message could not be posted, so there is nothing to
    /// update and the request was never forwarded.
    AckFailed(RelayError),
    /// The backend refused the submission. Polling never started.
    SubmitFailed(BackendError),
    /// Backend went idle. `content_relayed` is false when the generic
    /// completion notice was shown instead of an answer.
    Relayed { polls: u32, content_relayed: bool },
    TimedOut { polls: u32 },
    /// A state query failed, either for the baseline (`polls == 0`, nothing
    /// was submitted) or mid-session.
    Failed { polls: u32, error: BackendError },
}

impl SessionOutcome {
    pub fn final_state(&self) -> SessionState {
        match self {
            SessionOutcome::EmptyRequest | SessionOutcome::AckFailed(_) => SessionState::Submitting,
            SessionOutcome::SubmitFailed(_) => SessionState::Acknowledged,
            SessionOutcome::Relayed { .. } => SessionState::Relayed,
            SessionOutcome::TimedOut { .. } => SessionState::TimedOut,
            SessionOutcome::Failed { .. } => SessionState::Failed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionOutcome::EmptyRequest => "empty_request",
            SessionOutcome::AckFailed(_) => "ack_failed",
            SessionOutcome::SubmitFailed(_) => "submit_failed",
            SessionOutcome::Relayed { content_relayed: true, .. } => "relayed",
            SessionOutcome::Relayed { content_relayed: false, .. } => "completed",
            SessionOutcome::TimedOut { .. } => "timed_out",
            SessionOutcome::Failed { .. } => "failed",
        }
    }

    pub fn polls(&self) -> u32 {
        match self {
            SessionOutcome::Relayed { polls, .. }
            | SessionOutcome::TimedOut { polls }
            | SessionOutcome::Failed { polls, .. } => *polls,
            _ => 0,
        }
    }
}

/// What to forward and where to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeRequest {
    pub session_id: Uuid,
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub thread_ts: Option<String>,
}

/// Mutable state of one polling session.
#[derive(Debug)]
struct PollSession {
    id: Uuid,
    channel_id: String,
    handle: RelayHandle,
    poll_count: u32,
    /// History length when the request was forwarded; older entries are
    /// never relayed.
    baseline_history_length: usize,
    last_relayed_history_length: usize,
    content_relayed: bool,
}

impl PollSession {
    /// Newest assistant answer past the baseline, for the terminal re-check.
    fn unrelayed_answer<'a>(&self, state: &'a BackendState) -> Option<&'a str> {
        state
            .history
            .iter()
            .skip(self.baseline_history_length)
            .rev()
            .find_map(|entry| entry.assistant_content())
    }
}

pub fn format_error(context: &str, error: &dyn fmt::Display) -> String {
    format!(":x: {}: {}", context, error)
}

pub fn timeout_notice(budget: Duration) -> String {
    let secs = budget.as_secs();
    let span = if secs >= 60 && secs % 60 == 0 {
        let minutes = secs / 60;
        format!("{} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        format!("{} seconds", secs)
    };
    format!(
        ":warning: No response after {}. The task may still be processing; check back later.",
        span
    )
}

#[derive(Clone)]
pub struct PollingBridge {
    relay: Arc<dyn RelayClient>,
    backend: Arc<dyn BackendApi>,
    polling: PollingConfig,
}

impl PollingBridge {
    pub fn new(
        relay: Arc<dyn RelayClient>,
        backend: Arc<dyn BackendApi>,
        polling: PollingConfig,
    ) -> Self {
        Self {
            relay,
            backend,
            polling,
        }
    }

    pub fn polling(&self) -> PollingConfig {
        self.polling
    }

    /// Drive one session to a terminal outcome. Never panics on remote
    /// failures; every failure is shown to the user and returned.
    pub async fn run(&self, request: BridgeRequest) -> SessionOutcome {
        let session_id = request.session_id;

        // Submitting
        if request.text.trim().is_empty() {
            if let Err(e) = self
                .relay
                .post_ephemeral(&request.channel_id, &request.user_id, EMPTY_REQUEST_NOTICE)
                .await
            {
                warn!(%session_id, error = %e, "Failed to send empty-request notice");
            }
            return SessionOutcome::EmptyRequest;
        }

        let ack = RelayMessage::new(&request.channel_id, PROCESSING_NOTICE)
            .in_thread(request.thread_ts.as_deref());
        let handle = match self.relay.post(&ack).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(
                    %session_id,
                    channel = %request.channel_id,
                    error = %e,
                    "Failed to post processing notice"
                );
                return SessionOutcome::AckFailed(e);
            }
        };
        debug!(
            %session_id,
            state = %SessionState::Acknowledged,
            ts = %handle.message_ts,
            "Acknowledged"
        );

        // Acknowledged
        // Without a baseline, earlier answers would be relayed as this one's.
        let baseline_history_length = match self.backend.query_state().await {
            Ok(state) => state.history.len(),
            Err(e) => {
                error!(%session_id, error = %e, "Could not read backend history baseline");
                self.show(&handle, &format_error("Could not reach the backend", &e))
                    .await;
                return SessionOutcome::Failed { polls: 0, error: e };
            }
        };

        if let Err(e) = self.backend.submit(&request.text).await {
            error!(%session_id, error = %e, "Backend rejected submission");
            self.show(&handle, &format_error("Failed to submit your request", &e))
                .await;
            return SessionOutcome::SubmitFailed(e);
        }
        self.show(&handle, QUEUED_NOTICE).await;

        let mut session = PollSession {
            id: session_id,
            channel_id: request.channel_id,
            handle,
            poll_count: 0,
            baseline_history_length,
            last_relayed_history_length: baseline_history_length,
            content_relayed: false,
        };
        self.poll(&mut session).await
    }

    async fn poll(&self, session: &mut PollSession) -> SessionOutcome {
        let period = self.polling.interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(session_id = %session.id, state = %SessionState::Polling, "Polling backend");

        loop {
            ticker.tick().await;
            session.poll_count += 1;

            let state = match self.backend.query_state().await {
                Ok(state) => state,
                Err(e) => {
                    warn!(
                        session_id = %session.id,
                        polls = session.poll_count,
                        error = %e,
                        "Backend state query failed"
                    );
                    self.show(&session.handle, &format_error("Lost track of your request", &e))
                        .await;
                    return SessionOutcome::Failed {
                        polls: session.poll_count,
                        error: e,
                    };
                }
            };

            self.relay_growth(session, &state).await;

            if state.is_idle() {
                if !session.content_relayed {
                    // The answer may have landed on this very tick behind a
                    // non-assistant entry.
                    match session.unrelayed_answer(&state) {
                        Some(answer) => {
                            session.content_relayed = self.show(&session.handle, answer).await;
                        }
                        None => {
                            self.show(&session.handle, COMPLETION_NOTICE).await;
                        }
                    }
                }
                info!(
                    session_id = %session.id,
                    channel = %session.channel_id,
                    polls = session.poll_count,
                    "Backend finished"
                );
                return SessionOutcome::Relayed {
                    polls: session.poll_count,
                    content_relayed: session.content_relayed,
                };
            }

            if session.poll_count >= self.polling.max_polls {
                warn!(
                    session_id = %session.id,
                    polls = session.poll_count,
                    "Poll budget exhausted"
                );
                self.show(&session.handle, &timeout_notice(self.polling.budget()))
                    .await;
                return SessionOutcome::TimedOut {
                    polls: session.poll_count,
                };
            }
        }
    }

    /// Relay the newest assistant entry once per growth of the history.
    async fn relay_growth(&self, session: &mut PollSession, state: &BackendState) {
        let length = state.history.len();
        if length <= session.last_relayed_history_length {
            return;
        }
        let Some(content) = state.history.last().and_then(|entry| entry.assistant_content()) else {
            return;
        };

        session.last_relayed_history_length = length;
        if self.show(&session.handle, content).await {
            session.content_relayed = true;
            debug!(session_id = %session.id, history = length, "Relayed assistant output");
        }
    }

    /// Update the session message; failures are logged, never raised.
    async fn show(&self, handle: &RelayHandle, text: &str) -> bool {
        match self.relay.update(handle, text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    channel = %handle.channel_id,
                    ts = %handle.message_ts,
                    error = %e,
                    "Failed to update relayed message"
                );
                false
            }
        }
    }
}
