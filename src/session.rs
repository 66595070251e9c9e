//! The per-conversation session manager: turn orchestration, stream
//! dispatch, history restore, daily briefing, and the outward cache signal.
//!
//! All previously-global mutable state (session id, in-flight guard, the
//! once-only restore and briefing guards) lives on `AssistantSession`, so
//! independent instances never cross-contaminate.

use std::sync::Arc;

use anyhow::Result;
use futures_util::StreamExt;
use tokio::time::sleep;

use crate::api::{ByteStream, ChatBackend};
use crate::briefing::{self, BriefingDelivery, BRIEFING_SETTLE, BRIEFING_TRIGGER};
use crate::chat::{ChatMessage, ChatState};
use crate::config::AssistantConfig;
use crate::protocol::{FrameDecoder, StreamEvent};
use crate::store::AssistantStore;

/// Outward notifications to the embedding dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantSignal {
    /// At least one tool in the finished turn mutated server-side data; the
    /// item list and item count caches should refresh.
    ItemCachesStale,
}

const SEND_FAILURE_NOTICE: &str =
    "Sorry, I couldn't reach the assistant right now. Please check your connection and try again.";

/// Per-turn bookkeeping accumulated while draining one stream.
#[derive(Default)]
struct TurnTracker {
    mutated: bool,
}

pub struct AssistantSession {
    backend: Arc<dyn ChatBackend>,
    store: AssistantStore,
    state: ChatState,
    config: AssistantConfig,
    signals: flume::Sender<AssistantSignal>,
    in_flight: bool,
    loading_history: bool,
    history_restored: bool,
    briefing_attempted: bool,
}

impl AssistantSession {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        store: AssistantStore,
        config: AssistantConfig,
        signals: flume::Sender<AssistantSignal>,
    ) -> Self {
        Self {
            backend,
            store,
            state: ChatState::default(),
            config,
            signals,
            in_flight: false,
            loading_history: true,
            history_restored: false,
            briefing_attempted: false,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.state.messages()
    }

    pub fn is_loading_history(&self) -> bool {
        self.loading_history
    }

    pub fn is_turn_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn store(&self) -> &AssistantStore {
        &self.store
    }

    /// Run one user turn end to end. A no-op when the content trims to
    /// nothing or a turn is already in flight. Hidden turns append no user
    /// bubble and report pre-stream failures to the caller instead of
    /// surfacing them in the conversation.
    pub async fn send_message(&mut self, content: &str, hidden: bool) -> Result<()> {
        let trimmed = content.trim().to_string();
        if trimmed.is_empty() {
            return Ok(());
        }
        if self.in_flight {
            tracing::debug!("Ignoring send while a turn is in flight");
            return Ok(());
        }

        self.in_flight = true;
        let result = self.run_turn(&trimmed, hidden).await;
        self.in_flight = false;
        result
    }

    async fn run_turn(&mut self, content: &str, hidden: bool) -> Result<()> {
        if !hidden {
            self.state.push_user(content);
        }

        let session_id = match self.store.session_id() {
            Ok(id) => id,
            Err(error) => {
                tracing::warn!("Failed to read persisted session id: {error:#}");
                None
            }
        };

        let stream = match self.backend.send_turn(content, session_id.as_deref()).await {
            Ok(stream) => stream,
            Err(error) if hidden => {
                return Err(error.context("hidden turn failed before the stream opened"));
            }
            Err(error) => {
                tracing::warn!("Failed to open chat stream: {error:#}");
                self.state.push_assistant_notice(SEND_FAILURE_NOTICE);
                return Ok(());
            }
        };

        self.state.begin_assistant_turn();
        let mut turn = TurnTracker::default();
        let outcome = self.drain_stream(stream, &mut turn).await;

        // The reader is gone by now (drain_stream consumed the stream); the
        // open message is forced closed whether or not `done` ever arrived.
        self.state.close_open_message();
        if let Err(error) = outcome {
            tracing::warn!("Chat stream ended early: {error:#}");
        }

        if turn.mutated {
            if let Err(error) = self.signals.send(AssistantSignal::ItemCachesStale) {
                tracing::debug!("No listener for cache signal: {}", error);
            }
        }
        Ok(())
    }

    async fn drain_stream(&mut self, mut stream: ByteStream, turn: &mut TurnTracker) -> Result<()> {
        let mut decoder = FrameDecoder::default();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for event in decoder.feed(&chunk) {
                self.dispatch(event, turn);
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, event: StreamEvent, turn: &mut TurnTracker) {
        match event {
            StreamEvent::SessionId { session_id } => {
                if let Err(error) = self.store.set_session_id(&session_id) {
                    tracing::warn!("Failed to persist session id: {error:#}");
                }
            }
            StreamEvent::TextDelta { text } => self.state.append_delta(&text),
            StreamEvent::ToolStart { tool, message } => self.state.start_tool(&tool, &message),
            StreamEvent::ToolResult {
                tool,
                success,
                mutated,
            } => {
                if !self.state.resolve_tool(&tool, success) {
                    tracing::debug!("tool_result for '{}' matched no running entry", tool);
                }
                if mutated {
                    turn.mutated = true;
                }
            }
            StreamEvent::Error { message } => {
                tracing::warn!("Assistant reported an error: {}", message);
                self.state.apply_error(&message);
            }
            StreamEvent::Done => self.state.close_open_message(),
        }
    }

    /// Rebuild the visible message list from a prior session. Runs once per
    /// session instance; every fallback step swallows its own failure and
    /// the method always settles with `loading_history` false.
    pub async fn restore_history(&mut self) {
        if self.history_restored {
            return;
        }
        self.history_restored = true;
        self.loading_history = true;

        let persisted = match self.store.session_id() {
            Ok(id) => id,
            Err(error) => {
                tracing::warn!("Failed to read persisted session id: {error:#}");
                None
            }
        };

        if let Some(session_id) = persisted {
            if self.adopt_session_history(&session_id).await {
                self.loading_history = false;
                return;
            }
        }

        match self.backend.list_sessions(1).await {
            Ok(sessions) => {
                if let Some(recent) = sessions.into_iter().next() {
                    if recent.message_count > 0 && self.adopt_session_history(&recent.id).await {
                        self.loading_history = false;
                        return;
                    }
                }
            }
            Err(error) => {
                tracing::debug!("Session list unavailable: {error:#}");
            }
        }

        if let Err(error) = self.store.clear_session_id() {
            tracing::warn!("Failed to clear stale session id: {error:#}");
        }
        self.loading_history = false;
    }

    async fn adopt_session_history(&mut self, session_id: &str) -> bool {
        let fetched = match self
            .backend
            .session_messages(session_id, self.config.history_limit)
            .await
        {
            Ok(messages) => messages,
            Err(error) => {
                tracing::debug!("History fetch for session {} failed: {error:#}", session_id);
                return false;
            }
        };

        let restored: Vec<ChatMessage> = fetched
            .iter()
            .filter_map(ChatMessage::from_session_message)
            .collect();
        if restored.is_empty() {
            return false;
        }

        tracing::info!(
            "Restored {} message(s) from session {}",
            restored.len(),
            session_id
        );
        self.state.replace_all(restored);
        if let Err(error) = self.store.set_session_id(session_id) {
            tracing::warn!("Failed to persist restored session id: {error:#}");
        }
        true
    }

    /// Fire the hidden daily briefing turn if none went out today. Runs once
    /// per session instance, and only after history restore has settled.
    pub async fn maybe_send_briefing(&mut self) {
        if self.briefing_attempted || self.loading_history {
            return;
        }
        self.briefing_attempted = true;

        sleep(BRIEFING_SETTLE).await;

        let today = briefing::today_key();
        let marker = match self.store.briefing_marker() {
            Ok(marker) => marker,
            Err(error) => {
                tracing::warn!("Failed to read briefing marker: {error:#}");
                return;
            }
        };
        if !briefing::briefing_due(marker.as_deref(), &today) {
            return;
        }

        match self.config.briefing_delivery {
            BriefingDelivery::AtMostOnce => {
                // Consume the day's attempt up front; a failed send does not
                // retry until tomorrow.
                if let Err(error) = self.store.set_briefing_marker(&today) {
                    tracing::warn!("Failed to persist briefing marker: {error:#}");
                }
                if let Err(error) = self.send_message(BRIEFING_TRIGGER, true).await {
                    tracing::warn!("Daily briefing send failed: {error:#}");
                }
            }
            BriefingDelivery::AtLeastOnce => match self.send_message(BRIEFING_TRIGGER, true).await
            {
                Ok(()) => {
                    if let Err(error) = self.store.set_briefing_marker(&today) {
                        tracing::warn!("Failed to persist briefing marker: {error:#}");
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        "Daily briefing send failed; will retry on next start: {error:#}"
                    );
                }
            },
        }
    }

    /// Drop the visible conversation and the persisted session id. No
    /// network call; the server-side session stays retrievable by its id.
    pub fn clear_chat(&mut self) {
        self.state.clear();
        if let Err(error) = self.store.clear_session_id() {
            tracing::warn!("Failed to clear session id: {error:#}");
        }
    }

    #[cfg(test)]
    fn set_in_flight(&mut self, in_flight: bool) {
        self.in_flight = in_flight;
    }
}
