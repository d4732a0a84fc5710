use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::Id;
use crate::routes::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id, as a string.
    pub sub: String,
    pub username: String,
    pub exp: usize,
}

/// Validate a JWT and return its claims.
pub fn decode_jwt(config: &AppConfig, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Issue a token for a user, valid for `token_ttl_hours`.
pub fn create_jwt(config: &AppConfig, user_id: Id, username: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = (chrono::Utc::now() + chrono::Duration::hours(config.token_ttl_hours)).timestamp() as usize;
    let claims = Claims { sub: user_id.to_string(), username: username.to_string(), exp: expiration };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

/// Extractor yielding validated `Claims` for the bearer token.
#[derive(Debug, Clone)]
pub struct Auth(pub Claims);

impl Auth {
    pub fn user_id(&self) -> Result<Id, ApiError> {
        self.0.sub.parse().map_err(|_| ApiError::unauthorized("Invalid token subject"))
    }
}

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            return ready(Err(ApiError::internal("AppState missing from app data")));
        };
        let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() else {
            return ready(Err(ApiError::unauthorized("Authorization required")));
        };
        ready(match decode_jwt(&state.config, bearer.token()) {
            Ok(claims) => Ok(Auth(claims)),
            Err(_) => Err(ApiError::unauthorized("Invalid or expired token")),
        })
    }
}

/// bcrypt on the blocking pool so the worker stays responsive.
pub async fn hash_password(password: String, cost: u32) -> Result<String, ApiError> {
    web::block(move || bcrypt::hash(password, cost))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::internal)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    web::block(move || bcrypt::verify(password, &hash))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::internal)
}
