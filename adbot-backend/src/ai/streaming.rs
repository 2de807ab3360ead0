//! Streaming response types and utilities
//!
//! A provider pushes `StreamEvent`s into a bounded channel as the reply
//! arrives; the relay drains the receiving end into the HTTP response body.

use tokio::sync::mpsc;

/// Events emitted during a streaming reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One fragment of reply text, exactly as the provider produced it
    ContentDelta { content: String },
    /// Provider signalled completion
    Done {
        /// Finish reason reported by the provider (e.g. "STOP", "MAX_TOKENS")
        finish_reason: Option<String>,
    },
    /// The provider failed after the stream was opened
    Error { message: String },
}

pub type StreamSender = mpsc::Sender<StreamEvent>;

pub type StreamReceiver = mpsc::Receiver<StreamEvent>;

/// Create a new stream channel with specified buffer size
pub fn create_stream_channel(buffer_size: usize) -> (StreamSender, StreamReceiver) {
    mpsc::channel(buffer_size)
}

/// Create a stream channel with default buffer size (32)
pub fn create_default_stream_channel() -> (StreamSender, StreamReceiver) {
    create_stream_channel(32)
}

/// Running tally of a reply, kept for the completion log line.
#[derive(Debug, Clone, Default)]
pub struct StreamAccumulator {
    pub content: String,
    pub fragments: usize,
    pub finish_reason: Option<String>,
    pub error: Option<String>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_event(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::ContentDelta { content } => {
                self.content.push_str(content);
                self.fragments += 1;
            }
            StreamEvent::Done { finish_reason } => {
                self.finish_reason = finish_reason.clone();
            }
            StreamEvent::Error { message } => {
                self.error = Some(message.clone());
            }
        }
    }
}
