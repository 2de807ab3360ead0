//! Scripted provider for tests

use super::provider::ChatProvider;
use super::streaming::{create_default_stream_channel, StreamEvent, StreamReceiver, StreamSender};
use super::types::AiError;
use crate::models::ChatMessage;
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_prompt: String,
    pub prior_turns: Vec<ChatMessage>,
    pub current_message: String,
}

/// Replays a fixed list of events for every request and records what it was
/// asked.
pub struct ScriptedProvider {
    events: Vec<StreamEvent>,
    failure: Option<AiError>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedProvider {
    pub fn new(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Emits each fragment followed by `Done`.
    pub fn replying(fragments: &[&str]) -> Self {
        let mut events: Vec<StreamEvent> = fragments
            .iter()
            .map(|f| StreamEvent::ContentDelta {
                content: f.to_string(),
            })
            .collect();
        events.push(StreamEvent::Done {
            finish_reason: Some("STOP".to_string()),
        });
        Self::new(events)
    }

    pub fn failing(error: AiError) -> Self {
        Self {
            events: Vec::new(),
            failure: Some(error),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_reply(
        &self,
        system_prompt: &str,
        prior_turns: &[ChatMessage],
        current_message: &str,
    ) -> Result<StreamReceiver, AiError> {
        self.calls.lock().unwrap().push(RecordedCall {
            system_prompt: system_prompt.to_string(),
            prior_turns: prior_turns.to_vec(),
            current_message: current_message.to_string(),
        });

        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let (tx, rx) = create_default_stream_channel();
        let events = self.events.clone();
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

/// Sends its fragments and then keeps the channel open, like a model that is
/// still generating. `sender()` hands out the live sender so a test can feed
/// more events or watch for the receiver going away.
pub struct OpenStreamProvider {
    fragments: Vec<String>,
    sender: Mutex<Option<StreamSender>>,
}

impl OpenStreamProvider {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            sender: Mutex::new(None),
        }
    }

    pub fn sender(&self) -> Option<StreamSender> {
        self.sender.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for OpenStreamProvider {
    fn name(&self) -> &str {
        "open"
    }

    async fn stream_reply(
        &self,
        _system_prompt: &str,
        _prior_turns: &[ChatMessage],
        _current_message: &str,
    ) -> Result<StreamReceiver, AiError> {
        let (tx, rx) = create_default_stream_channel();
        for fragment in &self.fragments {
            tx.try_send(StreamEvent::ContentDelta {
                content: fragment.clone(),
            })
            .map_err(|e| AiError::new(e.to_string()))?;
        }
        *self.sender.lock().unwrap() = Some(tx);
        Ok(rx)
    }
}
