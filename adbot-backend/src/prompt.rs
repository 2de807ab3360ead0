//! System prompt construction for the chat relay

use crate::models::Record;
use std::io;
use std::path::Path;

/// Placeholder replaced by the serialized record list.
pub const KNOWLEDGE_PLACEHOLDER: &str = "{knowledge_base}";

/// Default advertising-assistant prompt with a three-tier answer priority.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a smart and flexible advertising chatbot assistant. Your job is to answer customer questions following a clear order of priority.

**HOW TO ANSWER:**

1. **Check the promotional content first (highest priority)**
   Always look for the answer in the **EXCLUSIVE PROMOTIONAL CONTENT** below before anything else.
   **EXCLUSIVE PROMOTIONAL CONTENT:**
{knowledge_base}

2. **Use general knowledge and the conversation so far**
   If the question is unrelated to the promotional content, answer from general knowledge and the chat history.

3. **Hand off to a consultant (only when you cannot answer)**
   Only say "Thank you for your question, I will pass this on to our consultants so they can help you better." when neither step above gives you an answer.

**FORMATTING RULES:**
- **Use Markdown** so answers are easy to read.
- Use an asterisk (*) or a dash (-) for list items.
- Use double asterisks (**) to **bold** headings or important details."#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Wraps an operator-supplied template. It must contain the placeholder
    /// or the records would never reach the model.
    pub fn new(text: impl Into<String>) -> io::Result<Self> {
        let text = text.into();
        if !text.contains(KNOWLEDGE_PLACEHOLDER) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("prompt template is missing the {} placeholder", KNOWLEDGE_PLACEHOLDER),
            ));
        }
        Ok(Self { text })
    }

    pub fn from_file(path: &Path) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::new(text)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Renders the system prompt for one chat request.
pub fn build_system_prompt(template: &PromptTemplate, records: &[Record]) -> String {
    template
        .as_str()
        .replace(KNOWLEDGE_PLACEHOLDER, &serialize_records(records))
}

/// Pretty JSON, identical to what the store writes to disk.
fn serialize_records(records: &[Record]) -> String {
    serde_json::to_string_pretty(records).unwrap_or_else(|e| {
        log::error!("Failed to serialize records for prompt: {}", e);
        "[]".to_string()
    })
}
