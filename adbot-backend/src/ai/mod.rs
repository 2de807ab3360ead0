pub mod gemini;
pub mod provider;
pub mod relay;
pub mod streaming;
pub mod types;

pub use gemini::GeminiClient;
pub use provider::ChatProvider;
pub use relay::{relay, split_history};

#[cfg(test)]
pub mod mock;
