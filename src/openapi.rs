use crate::models::{
    Breed, CommentNode, DuckPage, DuckSort, DuckView, Gender, LikeState, Mood, Pagination, PrivateProfile,
    PublicProfile, UpdateDuck, UserSummary,
};
use crate::routes::{comments, ducks, media, users};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        users::register,
        users::login,
        users::me,
        users::refresh_token,
        users::get_profile,
        users::update_profile,
        users::upload_profile_picture,
        ducks::list_ducks,
        ducks::get_duck,
        ducks::create_duck,
        ducks::update_duck,
        ducks::delete_duck,
        ducks::like_duck,
        ducks::unlike_duck,
        ducks::check_likes,
        comments::list_for_duck,
        comments::create_comment,
        comments::edit_comment,
        comments::delete_comment,
        comments::like_comment,
        comments::unlike_comment,
        media::get_media,
    ),
    components(schemas(
        Breed, Gender, Mood, DuckSort, DuckView, DuckPage, Pagination, UpdateDuck,
        UserSummary, PrivateProfile, PublicProfile, CommentNode, LikeState,
        users::RegisterRequest, users::LoginRequest, users::AuthResponse, users::TokenResponse,
        users::UpdateProfileRequest,
        ducks::CheckLikesResponse, ducks::MessageResponse,
        comments::CreateCommentRequest, comments::EditCommentRequest, comments::DeleteCommentResponse,
        crate::error::ApiErrorBody,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "users", description = "Accounts and profiles"),
        (name = "ducks", description = "Duck pictures"),
        (name = "comments", description = "Threaded comments"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}
