use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{ChatMessage, Sender};

pub const GREETING: &str =
    "Hello! I'm Jenga, your AI business assistant. How can I help you build today?";

pub const APOLOGY: &str = "Sorry, I'm having trouble connecting right now.";

/// Cosmetic status lines cycled while a response is in flight.
pub const WORKING_MESSAGES: &[&str] = &["Thinking...", "Generating response...", "Preparing your advice..."];
pub const WORKING_MESSAGE_INTERVAL: Duration = Duration::from_millis(2500);

/// One ongoing conversation, explicitly constructed per client session and
/// seeded with the assistant's greeting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: Uuid,
    pub messages: Vec<ChatMessage>,
    pub streaming: bool,
    pub working_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: vec![ChatMessage {
                sender: Sender::Ai,
                text: GREETING.to_string(),
            }],
            streaming: false,
            working_message: None,
            created_at: Utc::now(),
        }
    }

    /// Records the outgoing user message and marks the stream open. Returns
    /// `None` for input that trims to empty: nothing is recorded and no
    /// request may be issued.
    pub fn begin_send(&mut self, text: &str) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }
        self.messages.push(ChatMessage {
            sender: Sender::User,
            text: text.to_string(),
        });
        self.streaming = true;
        Some(text.to_string())
    }

    /// Appends the fixed apology as the assistant's turn after a transport
    /// failure.
    pub fn record_failure(&mut self) {
        self.messages.push(ChatMessage {
            sender: Sender::Ai,
            text: APOLOGY.to_string(),
        });
    }

    pub fn finish_stream(&mut self) {
        self.streaming = false;
        self.working_message = None;
    }
}

/// Accumulates streamed increments into at most one assistant message: the
/// first non-empty increment appends the message, later ones extend that
/// same message in place. A stream with zero increments adds nothing.
///
/// The accumulator is owned solely by the active streaming operation.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    opened: bool,
}

impl StreamAccumulator {
    pub fn push(&mut self, session: &mut ChatSession, increment: &str) {
        if increment.is_empty() {
            return;
        }
        if !self.opened {
            session.messages.push(ChatMessage {
                sender: Sender::Ai,
                text: increment.to_string(),
            });
            self.opened = true;
        } else if let Some(last) = session.messages.last_mut() {
            last.text.push_str(increment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::testing::MockBackend;
    use crate::gemini::MediaBackend;
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    #[test]
    fn session_opens_with_the_greeting() {
        let session = ChatSession::new();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].sender, Sender::Ai);
        assert_eq!(session.messages[0].text, GREETING);
    }

    #[tokio::test]
    async fn blank_input_records_nothing_and_issues_no_request() {
        let backend = MockBackend::default();
        let mut session = ChatSession::new();

        for blank in ["", "   ", "\n\t "] {
            assert!(session.begin_send(blank).is_none());
        }
        assert_eq!(session.messages.len(), 1);
        assert!(!session.streaming);
        assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn increments_accumulate_into_a_single_assistant_message() {
        let backend = MockBackend {
            chat_increments: vec![
                Ok("Hel".to_string()),
                Ok(String::new()),
                Ok("lo".to_string()),
                Ok(" there".to_string()),
            ],
            ..Default::default()
        };
        let mut session = ChatSession::new();
        let text = session.begin_send("hi Jenga").unwrap();

        let mut stream = backend.stream_chat(&text).await.unwrap();
        let mut accumulator = StreamAccumulator::default();
        while let Some(item) = stream.next().await {
            match item {
                Ok(increment) => accumulator.push(&mut session, &increment),
                Err(_) => session.record_failure(),
            }
        }
        session.finish_stream();

        // greeting + user + one assistant message
        assert_eq!(session.messages.len(), 3);
        assert_eq!(session.messages[1].text, "hi Jenga");
        assert_eq!(session.messages[2].text, "Hello there");
        assert!(!session.streaming);
    }

    #[tokio::test]
    async fn a_stream_with_zero_increments_adds_no_assistant_message() {
        let backend = MockBackend::default();
        let mut session = ChatSession::new();
        let text = session.begin_send("hi").unwrap();

        let mut stream = backend.stream_chat(&text).await.unwrap();
        let mut accumulator = StreamAccumulator::default();
        while let Some(item) = stream.next().await {
            if let Ok(increment) = item {
                accumulator.push(&mut session, &increment);
            }
        }
        session.finish_stream();

        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages.last().unwrap().sender, Sender::User);
    }

    #[tokio::test]
    async fn transport_failure_appends_the_apology() {
        let backend = MockBackend {
            fail_chat_open: true,
            ..Default::default()
        };
        let mut session = ChatSession::new();
        let text = session.begin_send("hi").unwrap();

        if backend.stream_chat(&text).await.is_err() {
            session.record_failure();
        }
        session.finish_stream();

        assert_eq!(session.messages.last().unwrap().text, APOLOGY);
        assert_eq!(session.messages.last().unwrap().sender, Sender::Ai);
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_the_partial_message_and_apologizes() {
        let backend = MockBackend {
            chat_increments: vec![Ok("Here's a thought".to_string()), Err("reset by peer".to_string())],
            ..Default::default()
        };
        let mut session = ChatSession::new();
        let text = session.begin_send("hi").unwrap();

        let mut stream = backend.stream_chat(&text).await.unwrap();
        let mut accumulator = StreamAccumulator::default();
        while let Some(item) = stream.next().await {
            match item {
                Ok(increment) => accumulator.push(&mut session, &increment),
                Err(_) => {
                    session.record_failure();
                    break;
                }
            }
        }
        session.finish_stream();

        assert_eq!(session.messages.len(), 4);
        assert_eq!(session.messages[2].text, "Here's a thought");
        assert_eq!(session.messages[3].text, APOLOGY);
    }
}
