use actix_web::{web, HttpResponse, Responder};
use futures_util::StreamExt;
use std::convert::Infallible;

use super::ErrorResponse;
use crate::ai::{relay, split_history};
use crate::models::ChatRequest;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/chat").route(web::post().to(chat)));
}

/// Streams the model's reply as raw `text/plain`. Once the first byte is
/// out, a provider failure can only end the body early.
async fn chat(state: web::Data<AppState>, body: web::Json<ChatRequest>) -> impl Responder {
    let history = body.into_inner().history.unwrap_or_default();

    if let Err(e) = split_history(&history) {
        return HttpResponse::BadRequest().json(ErrorResponse::new(e.message));
    }

    let Some(provider) = state.provider.clone() else {
        log::error!("Chat requested but no provider is configured (set GEMINI_API_KEY)");
        return server_error();
    };

    let records = state.store.load().await;
    log::debug!(
        "Chat turn with {} history messages and {} records",
        history.len(),
        records.len()
    );

    match relay(provider.as_ref(), &state.prompt_template, &records, &history).await {
        Ok(fragments) => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .streaming(fragments.map(|f| Ok::<_, Infallible>(web::Bytes::from(f)))),
        Err(e) if e.invalid_request => {
            HttpResponse::BadRequest().json(ErrorResponse::new(e.message))
        }
        Err(e) => {
            if e.is_client_error() {
                log::error!(
                    "{} rejected the request (check key and model): {}",
                    provider.name(),
                    e
                );
            } else {
                log::error!("Streaming error from {}: {}", provider.name(), e);
            }
            server_error()
        }
    }
}

fn server_error() -> HttpResponse {
    HttpResponse::InternalServerError()
        .content_type("text/plain; charset=utf-8")
        .body("Server error.")
}
