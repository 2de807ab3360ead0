//! Stateless chat relay.
//!
//! The browser sends its whole history on every turn. The relay splits off the
//! newest user turn, conditions the provider with the current records, and
//! hands back the reply fragments exactly as they arrive.

use super::provider::ChatProvider;
use super::streaming::{StreamAccumulator, StreamEvent, StreamReceiver};
use super::types::AiError;
use crate::models::{ChatMessage, MessageRole, Record};
use crate::prompt::{build_system_prompt, PromptTemplate};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};

/// Reply text fragments in arrival order.
pub type FragmentStream = BoxStream<'static, String>;

/// Splits a history into the prior turns and the text of the current user
/// turn.
pub fn split_history(history: &[ChatMessage]) -> Result<(&[ChatMessage], &str), AiError> {
    let (current, prior) = history
        .split_last()
        .ok_or_else(|| AiError::invalid_history("Chat history is required."))?;

    if current.role != MessageRole::User {
        return Err(AiError::invalid_history(
            "The last message in the history must come from the user.",
        ));
    }

    let text = current
        .first_text()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AiError::invalid_history("The last user message has no text."))?;

    Ok((prior, text))
}

/// Opens a provider stream for `history` and returns its text fragments.
///
/// Errors are only returned for failures before the first fragment. A
/// provider error mid-stream ends the fragment stream the same way a normal
/// completion does; it is logged here and nowhere else.
pub async fn relay(
    provider: &dyn ChatProvider,
    template: &PromptTemplate,
    records: &[Record],
    history: &[ChatMessage],
) -> Result<FragmentStream, AiError> {
    let (prior, current) = split_history(history)?;
    let system_prompt = build_system_prompt(template, records);

    let rx = provider.stream_reply(&system_prompt, prior, current).await?;
    Ok(fragments(rx, provider.name().to_string()).boxed())
}

struct RelayState {
    rx: StreamReceiver,
    acc: StreamAccumulator,
    provider: String,
}

fn fragments(
    rx: StreamReceiver,
    provider: String,
) -> impl Stream<Item = String> + Send + 'static {
    let state = RelayState {
        rx,
        acc: StreamAccumulator::new(),
        provider,
    };

    stream::unfold(state, |mut state| async move {
        let Some(event) = state.rx.recv().await else {
            log::warn!(
                "{} stream closed without completion after {} fragments",
                state.provider,
                state.acc.fragments
            );
            return None;
        };

        state.acc.process_event(&event);
        match event {
            StreamEvent::ContentDelta { content } => Some((content, state)),
            StreamEvent::Done { .. } => {
                log::info!(
                    "Relayed {} fragments ({} bytes) from {}, finish reason {:?}",
                    state.acc.fragments,
                    state.acc.content.len(),
                    state.provider,
                    state.acc.finish_reason
                );
                None
            }
            StreamEvent::Error { .. } => {
                log::error!(
                    "{} stream failed after {} fragments: {}",
                    state.provider,
                    state.acc.fragments,
                    state.acc.error.as_deref().unwrap_or_default()
                );
                None
            }
        }
    })
}
