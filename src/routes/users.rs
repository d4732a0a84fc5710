use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::AppState;
use crate::auth::{create_jwt, hash_password, verify_password, Auth};
use crate::error::ApiError;
use crate::models::*;
use crate::upload::{media_key, read_image_form};

pub const MAX_BIO_LEN: usize = 300;
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: PrivateProfile,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub bio: Option<String>,
}

fn validate_username(name: &str) -> Result<(), ApiError> {
    let len = name.chars().count();
    if !(3..=30).contains(&len) || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::bad_request(
            "Usernames need 3-30 letters, digits or underscores",
        ));
    }
    Ok(())
}

/// Accepts `local@domain.tld`; anything fancier is the mail server's problem.
fn validate_email(email: &str) -> Result<(), ApiError> {
    let ok = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
                && domain
                    .rsplit_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    };
    if ok { Ok(()) } else { Err(ApiError::bad_request("That email address looks off")) }
}

fn issue_token(state: &AppState, user: &User) -> Result<String, ApiError> {
    create_jwt(&state.config, user.id, &user.username).map_err(ApiError::internal)
}

#[utoipa::path(
    post,
    path = "/api/user/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input or username/email taken")
    )
)]
pub async fn register(
    data: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();
    validate_username(&username)?;
    validate_email(&email)?;
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Passwords need at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if data.repo.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::bad_request("That email is already part of the flock"));
    }
    if data.repo.find_user_by_username(&username).await?.is_some() {
        return Err(ApiError::bad_request("That username is already taken"));
    }

    let password_hash = hash_password(req.password, data.config.bcrypt_cost).await?;
    let user = data.repo.create_user(NewUser { username, email, password_hash }).await?;
    tracing::info!(user_id = user.id, "registered new user");
    let token = issue_token(&data, &user)?;
    Ok(HttpResponse::Created().json(AuthResponse { token, user: PrivateProfile::from(&user) }))
}

#[utoipa::path(
    post,
    path = "/api/user/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid email or password")
    )
)]
pub async fn login(data: web::Data<AppState>, payload: web::Json<LoginRequest>) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    let invalid = || ApiError::unauthorized("Invalid email or password");
    let user = data
        .repo
        .find_user_by_email(&req.email.trim().to_lowercase())
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(req.password, user.password_hash.clone()).await? {
        return Err(invalid());
    }
    let token = issue_token(&data, &user)?;
    Ok(HttpResponse::Ok().json(AuthResponse { token, user: PrivateProfile::from(&user) }))
}

#[utoipa::path(
    get,
    path = "/api/user/me",
    responses(
        (status = 200, description = "Current user", body = PrivateProfile),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearerAuth" = []))
)]
pub async fn me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(auth.user_id()?).await?;
    Ok(HttpResponse::Ok().json(PrivateProfile::from(&user)))
}

#[utoipa::path(
    post,
    path = "/api/user/refresh",
    responses(
        (status = 200, description = "Fresh token", body = TokenResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearerAuth" = []))
)]
pub async fn refresh_token(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(auth.user_id()?).await?;
    let token = issue_token(&data, &user)?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

#[utoipa::path(
    get,
    path = "/api/user/{id}",
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 200, description = "Public profile", body = PublicProfile),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn get_profile(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(path.into_inner()).await.map_err(|e| match e {
        crate::repo::RepoError::NotFound => ApiError::not_found("No duckling by that id"),
        other => other.into(),
    })?;
    let filter = DuckFilter { uploaded_by: Some(user.id), ..DuckFilter::default() };
    let duck_count = data.repo.count_ducks(&filter).await?;
    Ok(HttpResponse::Ok().json(PublicProfile {
        id: user.id,
        username: user.username,
        profile_picture: user.profile_picture,
        bio: user.bio,
        created_at: user.created_at,
        duck_count,
    }))
}

#[utoipa::path(
    put,
    path = "/api/user/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = PrivateProfile),
        (status = 400, description = "Bio too long"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_profile(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse, ApiError> {
    let bio = payload.into_inner().bio.map(|b| b.trim().to_string());
    if bio.as_ref().is_some_and(|b| b.chars().count() > MAX_BIO_LEN) {
        return Err(ApiError::bad_request(format!("Bios are limited to {MAX_BIO_LEN} characters")));
    }
    let user = data
        .repo
        .update_profile(auth.user_id()?, UpdateProfile { bio, ..UpdateProfile::default() })
        .await?;
    Ok(HttpResponse::Ok().json(PrivateProfile::from(&user)))
}

#[utoipa::path(
    post,
    path = "/api/user/profile/picture",
    request_body(content = String, content_type = "multipart/form-data", description = "Form with an `image` file"),
    responses(
        (status = 200, description = "Picture replaced", body = PrivateProfile),
        (status = 400, description = "No image in the form"),
        (status = 413, description = "Image too large"),
        (status = 415, description = "Not an image")
    ),
    security(("bearerAuth" = []))
)]
pub async fn upload_profile_picture(
    auth: Auth,
    data: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let user_id = auth.user_id()?;
    let current = data.repo.get_user(user_id).await?;
    let form = read_image_form(payload, "image", data.config.max_upload_bytes).await?;
    let image = form.image.ok_or_else(|| ApiError::bad_request("Please attach an image"))?;

    let key = media_key("avatars", &image);
    data.media_store.save(&key, &image.mime, &image.bytes).await?;
    let upd = UpdateProfile { profile_picture: Some(data.config.media_url(&key)), ..UpdateProfile::default() };
    let user = data.repo.update_profile(user_id, upd).await?;

    if let Some(old_key) = current.profile_picture.as_deref().and_then(|u| data.config.media_key_from_url(u)) {
        if let Err(e) = data.media_store.delete(old_key).await {
            tracing::warn!(user_id, key = old_key, "failed to delete old profile picture: {e}");
        }
    }
    Ok(HttpResponse::Ok().json(PrivateProfile::from(&user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(validate_username("daffy_99").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"q".repeat(31)).is_err());
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("duck@pond.io").is_ok());
        assert!(validate_email("duck@pond").is_err());
        assert!(validate_email("@pond.io").is_err());
        assert!(validate_email("du ck@pond.io").is_err());
        assert!(validate_email("duck@@pond.io").is_err());
    }
}
