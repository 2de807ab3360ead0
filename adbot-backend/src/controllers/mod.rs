pub mod chat;
pub mod content;
pub mod health;

use actix_web::{error::InternalError, web, HttpResponse};
use serde::Serialize;

use crate::store::StoreError;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Registers every API route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    health::config(cfg);
    content::config(cfg);
    chat::config(cfg);
}

/// Malformed or mistyped JSON bodies become `400 {error}`.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(ErrorResponse::new(format!(
            "Invalid request body: {}",
            err
        )));
        InternalError::from_response(err, response).into()
    })
}

/// Maps a store failure onto the HTTP taxonomy. Only unexpected failures are
/// logged; `server_message` is what the caller sees for them.
pub fn store_error_response(err: &StoreError, server_message: &str) -> HttpResponse {
    match err {
        StoreError::Validation(msg) => {
            HttpResponse::BadRequest().json(ErrorResponse::new(msg.clone()))
        }
        StoreError::FileNotFound => {
            HttpResponse::NotFound().json(ErrorResponse::new("Content file not found."))
        }
        StoreError::RecordNotFound { .. } => {
            HttpResponse::NotFound().json(ErrorResponse::new("No content found to delete."))
        }
        StoreError::Io(_) | StoreError::Serialization(_) => {
            log::error!("{}: {}", server_message, err);
            HttpResponse::InternalServerError().json(ErrorResponse::new(server_message))
        }
    }
}
