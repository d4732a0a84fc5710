use actix_web::{http::header, web, HttpResponse};

use super::AppState;
use crate::error::ApiError;

/// Serves a stored picture. Keys are random and never reused, so responses
/// may be cached for a long time.
#[utoipa::path(
    get,
    path = "/media/{key}",
    params(("key" = String, Path, description = "Media key, e.g. ducks/<uuid>.png")),
    responses(
        (status = 200, description = "Image bytes"),
        (status = 404, description = "Unknown key")
    )
)]
pub async fn get_media(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let key = path.into_inner();
    if key.is_empty() {
        return Err(ApiError::not_found("That picture flew south"));
    }
    let (bytes, mime) = data.media_store.load(&key).await?;
    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, mime))
        .insert_header((header::CACHE_CONTROL, "public, max-age=31536000, immutable"))
        .body(bytes))
}
