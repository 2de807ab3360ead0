use actix_web::{web, HttpResponse, Responder};

use super::{store_error_response, ErrorResponse, MessageResponse};
use crate::models::SaveRecordRequest;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/save").route(web::post().to(save_content)))
        .service(web::resource("/api/content").route(web::get().to(list_content)))
        .service(web::resource("/api/content/{index}").route(web::delete().to(delete_content)));
}

async fn save_content(
    state: web::Data<AppState>,
    body: web::Json<SaveRecordRequest>,
) -> impl Responder {
    match state.store.append(body.into_inner().into()).await {
        Ok(()) => HttpResponse::Ok().json(MessageResponse::new("Saved successfully!")),
        Err(e) => store_error_response(&e, "Server error while saving the file."),
    }
}

async fn list_content(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.store.load().await)
}

async fn delete_content(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let index = match parse_index(&path) {
        IndexParam::At(index) => index,
        IndexParam::OutOfRange => {
            return HttpResponse::NotFound().json(ErrorResponse::new("No content found to delete."));
        }
        IndexParam::Invalid => {
            return HttpResponse::BadRequest().json(ErrorResponse::new("Invalid index."));
        }
    };

    match state.store.delete_at(index).await {
        Ok(removed) => {
            log::info!("Deleted record #{} ({})", index, removed.title);
            HttpResponse::Ok().json(MessageResponse::new("Deleted successfully!"))
        }
        Err(e) => store_error_response(&e, "Server error while deleting content."),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum IndexParam {
    At(usize),
    /// All digits, but too large for any record position.
    OutOfRange,
    Invalid,
}

/// Non-negative decimal position. Anything else is a validation error.
fn parse_index(raw: &str) -> IndexParam {
    let raw = raw.trim();
    match raw.parse::<usize>() {
        Ok(index) => IndexParam::At(index),
        Err(_) if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) => {
            IndexParam::OutOfRange
        }
        Err(_) => IndexParam::Invalid,
    }
}
