pub mod chat_message;
pub mod record;

pub use chat_message::{ChatMessage, ChatRequest, MessageRole};
pub use record::{Record, SaveRecordRequest};
