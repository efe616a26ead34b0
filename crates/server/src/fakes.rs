//! In-memory stand-ins for the chat platform and the backend.

use async_trait::async_trait;
use slackrelay_backend::{BackendApi, BackendError};
use slackrelay_core::types::{BackendState, HistoryEntry, RelayHandle, RelayMessage, Role};
use slackrelay_slack::{RelayClient, RelayError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayCall {
    Post {
        channel: String,
        text: String,
        thread_ts: Option<String>,
    },
    Update {
        ts: String,
        text: String,
    },
    Ephemeral {
        channel: String,
        user: String,
        text: String,
    },
}

#[derive(Default)]
pub struct FakeRelay {
    calls: Mutex<Vec<RelayCall>>,
    fail_post: bool,
    fail_update: bool,
}

impl FakeRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_post() -> Self {
        Self {
            fail_post: true,
            ..Self::default()
        }
    }

    pub fn failing_updates() -> Self {
        Self {
            fail_update: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RelayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn posts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RelayCall::Post { .. }))
            .count()
    }

    pub fn updates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RelayCall::Update { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RelayClient for FakeRelay {
    async fn post(&self, message: &RelayMessage) -> Result<RelayHandle, RelayError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(RelayCall::Post {
            channel: message.channel_id.clone(),
            text: message.text.clone(),
            thread_ts: message.thread_ts.clone(),
        });
        if self.fail_post {
            return Err(RelayError::Platform("channel_not_found".to_string()));
        }
        let posted = calls
            .iter()
            .filter(|c| matches!(c, RelayCall::Post { .. }))
            .count();
        Ok(RelayHandle {
            channel_id: message.channel_id.clone(),
            message_ts: format!("1.{:06}", posted),
        })
    }

    async fn update(&self, handle: &RelayHandle, text: &str) -> Result<(), RelayError> {
        self.calls.lock().unwrap().push(RelayCall::Update {
            ts: handle.message_ts.clone(),
            text: text.to_string(),
        });
        if self.fail_update {
            return Err(RelayError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<(), RelayError> {
        self.calls.lock().unwrap().push(RelayCall::Ephemeral {
            channel: channel_id.to_string(),
            user: user_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

/// Replays scripted state snapshots; the last one repeats forever.
pub struct ScriptedBackend {
    states: Mutex<VecDeque<Result<BackendState, BackendError>>>,
    submit_error: Option<BackendError>,
    panic_on_submit: bool,
    submitted: Mutex<Vec<String>>,
    queries: AtomicUsize,
}

impl ScriptedBackend {
    pub fn with_states(states: Vec<Result<BackendState, BackendError>>) -> Self {
        Self {
            states: Mutex::new(states.into()),
            submit_error: None,
            panic_on_submit: false,
            submitted: Mutex::new(Vec::new()),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn rejecting_submit(error: BackendError) -> Self {
        Self {
            submit_error: Some(error),
            ..Self::with_states(vec![Ok(BackendState::default())])
        }
    }

    pub fn panicking_submit() -> Self {
        Self {
            panic_on_submit: true,
            ..Self::with_states(vec![Ok(BackendState::default())])
        }
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendApi for ScriptedBackend {
    async fn submit(&self, text: &str) -> Result<(), BackendError> {
        if self.panic_on_submit {
            panic!("backend client bug");
        }
        self.submitted.lock().unwrap().push(text.to_string());
        match &self.submit_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn query_state(&self) -> Result<BackendState, BackendError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut states = self.states.lock().unwrap();
        if states.len() > 1 {
            return states.pop_front().unwrap_or_else(|| Ok(BackendState::default()));
        }
        states
            .front()
            .cloned()
            .unwrap_or_else(|| Ok(BackendState::default()))
    }
}

pub fn state(history: &[(Role, &str)], is_processing: bool, queue_length: u32) -> BackendState {
    BackendState {
        history: history
            .iter()
            .map(|(role, content)| HistoryEntry::new(role.clone(), content))
            .collect(),
        is_processing,
        queue_length,
    }
}
