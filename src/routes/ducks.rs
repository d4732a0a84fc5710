use std::collections::HashMap;
use std::str::FromStr;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::AppState;
use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::*;
use crate::repo::{Repo, RepoError};
use crate::upload::{media_key, read_image_form, ImageForm};

pub const MAX_DUCK_NAME_LEN: usize = 50;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckLikesResponse {
    pub likes: i64,
    pub has_liked: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

fn duck_not_found(e: RepoError) -> ApiError {
    match e {
        RepoError::NotFound => ApiError::not_found("That duck has waddled off"),
        other => other.into(),
    }
}

fn validate_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_DUCK_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Duck names need 1-{MAX_DUCK_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn required_enum<T>(form: &ImageForm, field: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = form.text(field).ok_or_else(|| ApiError::bad_request(format!("Missing field '{field}'")))?;
    raw.parse().map_err(|e: T::Err| ApiError::bad_request(e.to_string()))
}

fn parse_bool_field(raw: Option<&str>) -> Result<bool, ApiError> {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("false") | Some("0") | Some("off") => Ok(false),
        Some("true") | Some("1") | Some("on") => Ok(true),
        Some(other) => Err(ApiError::bad_request(format!("'{other}' is not a yes or no"))),
    }
}

/// Populates `uploadedBy` for a batch of ducks with one user lookup.
async fn duck_views(repo: &dyn Repo, ducks: Vec<Duck>) -> Result<Vec<DuckView>, ApiError> {
    let mut ids: Vec<Id> = ducks.iter().map(|d| d.uploaded_by).collect();
    ids.sort_unstable();
    ids.dedup();
    let uploaders: HashMap<Id, UserSummary> =
        repo.get_users(&ids).await?.iter().map(|u| (u.id, UserSummary::from(u))).collect();
    Ok(ducks
        .into_iter()
        .map(|d| {
            let who = uploaders.get(&d.uploaded_by).cloned().unwrap_or_else(|| UserSummary::missing(d.uploaded_by));
            DuckView::new(d, who)
        })
        .collect())
}

async fn duck_view(repo: &dyn Repo, duck: Duck) -> Result<DuckView, ApiError> {
    let who = match repo.get_user(duck.uploaded_by).await {
        Ok(u) => UserSummary::from(&u),
        Err(RepoError::NotFound) => UserSummary::missing(duck.uploaded_by),
        Err(e) => return Err(e.into()),
    };
    Ok(DuckView::new(duck, who))
}

async fn owned_duck(data: &AppState, duck_id: Id, user_id: Id) -> Result<Duck, ApiError> {
    let duck = data.repo.get_duck(duck_id).await.map_err(duck_not_found)?;
    if duck.uploaded_by != user_id {
        return Err(ApiError::forbidden("That's not your duck"));
    }
    Ok(duck)
}

#[utoipa::path(
    get,
    path = "/api/ducks",
    params(DuckListParams),
    responses(
        (status = 200, description = "One page of ducks", body = DuckPage),
        (status = 400, description = "Bad filter or sort value")
    )
)]
pub async fn list_ducks(
    data: web::Data<AppState>,
    query: web::Query<DuckListParams>,
) -> Result<HttpResponse, ApiError> {
    let params = query.into_inner();
    let (page, limit) = data.config.page_window(params.page, params.limit);
    let search = params.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let query = DuckQuery {
        filter: DuckFilter {
            breed: params.breed,
            gender: params.gender,
            mood: params.mood,
            is_rubber_duck: params.is_rubber_duck,
            uploaded_by: params.uploaded_by,
            search,
        },
        sort: params.sort.unwrap_or_default(),
        offset: Pagination::offset(page, limit),
        limit,
    };
    let (ducks, total) = data.repo.list_ducks(&query).await?;
    let ducks = duck_views(data.repo.as_ref(), ducks).await?;
    Ok(HttpResponse::Ok().json(DuckPage { ducks, pagination: Pagination::new(page, limit, total) }))
}

#[utoipa::path(
    get,
    path = "/api/ducks/{id}",
    params(("id" = Id, Path, description = "Duck id")),
    responses(
        (status = 200, description = "The duck", body = DuckView),
        (status = 404, description = "Unknown duck")
    )
)]
pub async fn get_duck(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let duck = data.repo.get_duck(path.into_inner()).await.map_err(duck_not_found)?;
    Ok(HttpResponse::Ok().json(duck_view(data.repo.as_ref(), duck).await?))
}

#[utoipa::path(
    post,
    path = "/api/ducks",
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "Fields `name`, `breed`, `gender`, `mood`, `isRubberDuck` and an `image` file"
    ),
    responses(
        (status = 201, description = "Duck uploaded", body = DuckView),
        (status = 400, description = "Missing or invalid fields"),
        (status = 401, description = "Unauthorized"),
        (status = 413, description = "Image too large"),
        (status = 415, description = "Not an image")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_duck(auth: Auth, data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    let user_id = auth.user_id()?;
    let form = read_image_form(payload, "image", data.config.max_upload_bytes).await?;

    let name = validate_name(form.text("name").unwrap_or_default())?;
    let breed: Breed = required_enum(&form, "breed")?;
    let gender: Gender = required_enum(&form, "gender")?;
    let mood: Mood = required_enum(&form, "mood")?;
    let is_rubber_duck = parse_bool_field(form.text("isRubberDuck"))?;
    let image = form.image.ok_or_else(|| ApiError::bad_request("Every duck needs a picture"))?;

    let key = media_key("ducks", &image);
    data.media_store.save(&key, &image.mime, &image.bytes).await?;
    let new = NewDuck {
        name,
        image_url: data.config.media_url(&key),
        image_key: key.clone(),
        breed,
        gender,
        mood,
        uploaded_by: user_id,
        is_rubber_duck,
    };
    let duck = match data.repo.create_duck(new).await {
        Ok(d) => d,
        Err(e) => {
            if let Err(del) = data.media_store.delete(&key).await {
                tracing::warn!(key = %key, "failed to clean up orphaned duck picture: {del}");
            }
            return Err(e.into());
        }
    };
    tracing::info!(duck_id = duck.id, user_id, "duck uploaded");
    Ok(HttpResponse::Created().json(duck_view(data.repo.as_ref(), duck).await?))
}

#[utoipa::path(
    put,
    path = "/api/ducks/{id}",
    params(("id" = Id, Path, description = "Duck id")),
    request_body = UpdateDuck,
    responses(
        (status = 200, description = "Duck updated", body = DuckView),
        (status = 403, description = "Not the uploader"),
        (status = 404, description = "Unknown duck")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_duck(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateDuck>,
) -> Result<HttpResponse, ApiError> {
    let duck = owned_duck(&data, path.into_inner(), auth.user_id()?).await?;
    let mut upd = payload.into_inner();
    upd.name = upd.name.as_deref().map(validate_name).transpose()?;
    let duck = data.repo.update_duck(duck.id, upd).await.map_err(duck_not_found)?;
    Ok(HttpResponse::Ok().json(duck_view(data.repo.as_ref(), duck).await?))
}

#[utoipa::path(
    delete,
    path = "/api/ducks/{id}",
    params(("id" = Id, Path, description = "Duck id")),
    responses(
        (status = 200, description = "Duck deleted", body = MessageResponse),
        (status = 403, description = "Not the uploader"),
        (status = 404, description = "Unknown duck")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_duck(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let duck = owned_duck(&data, path.into_inner(), auth.user_id()?).await?;
    if let Err(e) = data.media_store.delete(&duck.image_key).await {
        tracing::warn!(duck_id = duck.id, key = %duck.image_key, "failed to delete duck picture: {e}");
    }
    data.repo.delete_duck(duck.id).await.map_err(duck_not_found)?;
    tracing::info!(duck_id = duck.id, "duck deleted");
    Ok(HttpResponse::Ok().json(MessageResponse { message: format!("{} has flown away", duck.name) }))
}

#[utoipa::path(
    post,
    path = "/api/ducks/{id}/like",
    params(("id" = Id, Path, description = "Duck id")),
    responses(
        (status = 200, description = "Liked", body = LikeState),
        (status = 400, description = "Own duck or already liked"),
        (status = 404, description = "Unknown duck")
    ),
    security(("bearerAuth" = []))
)]
pub async fn like_duck(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let user_id = auth.user_id()?;
    let duck = data.repo.get_duck(path.into_inner()).await.map_err(duck_not_found)?;
    if duck.uploaded_by == user_id {
        return Err(ApiError::bad_request("No admiring your own duck"));
    }
    let duck = data.repo.like_duck(duck.id, user_id).await.map_err(|e| match e {
        RepoError::AlreadyLiked => ApiError::bad_request("You already liked this duck"),
        other => duck_not_found(other),
    })?;
    Ok(HttpResponse::Ok().json(LikeState { likes: duck.likes, liked_by: duck.liked_by }))
}

#[utoipa::path(
    post,
    path = "/api/ducks/{id}/unlike",
    params(("id" = Id, Path, description = "Duck id")),
    responses(
        (status = 200, description = "Unliked", body = LikeState),
        (status = 400, description = "Not liked yet"),
        (status = 404, description = "Unknown duck")
    ),
    security(("bearerAuth" = []))
)]
pub async fn unlike_duck(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let user_id = auth.user_id()?;
    let duck = data.repo.unlike_duck(path.into_inner(), user_id).await.map_err(|e| match e {
        RepoError::NotLiked => ApiError::bad_request("You haven't liked this duck"),
        other => duck_not_found(other),
    })?;
    Ok(HttpResponse::Ok().json(LikeState { likes: duck.likes, liked_by: duck.liked_by }))
}

#[utoipa::path(
    get,
    path = "/api/ducks/{id}/check-likes",
    params(("id" = Id, Path, description = "Duck id")),
    responses(
        (status = 200, description = "Like count and whether the caller liked it", body = CheckLikesResponse),
        (status = 404, description = "Unknown duck")
    ),
    security(("bearerAuth" = []))
)]
pub async fn check_likes(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let user_id = auth.user_id()?;
    let duck = data.repo.get_duck(path.into_inner()).await.map_err(duck_not_found)?;
    Ok(HttpResponse::Ok().json(CheckLikesResponse {
        likes: duck.likes,
        has_liked: duck.liked_by.contains(&user_id),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(validate_name("  Puddles ").unwrap(), "Puddles");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"d".repeat(MAX_DUCK_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn form_booleans() {
        assert!(!parse_bool_field(None).unwrap());
        assert!(parse_bool_field(Some("TRUE")).unwrap());
        assert!(parse_bool_field(Some("on")).unwrap());
        assert!(parse_bool_field(Some("maybe")).is_err());
    }
}
