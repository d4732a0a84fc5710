use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::AppState;
use crate::auth::Auth;
use crate::comment_tree;
use crate::error::ApiError;
use crate::models::*;
use crate::repo::{Repo, RepoError};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub duck_id: Id,
    pub content: String,
    pub parent_comment_id: Option<Id>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EditCommentRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteCommentResponse {
    pub message: String,
    pub deleted: Vec<Id>,
}

fn comment_not_found(e: RepoError) -> ApiError {
    match e {
        RepoError::NotFound => ApiError::not_found("That comment has drifted downstream"),
        other => other.into(),
    }
}

async fn owned_comment(repo: &dyn Repo, id: Id, user_id: Id) -> Result<Comment, ApiError> {
    let comment = repo.get_comment(id).await.map_err(comment_not_found)?;
    if comment.author != user_id {
        return Err(ApiError::forbidden("You can only change your own comments"));
    }
    Ok(comment)
}

async fn author_summary(repo: &dyn Repo, id: Id) -> Result<UserSummary, ApiError> {
    match repo.get_user(id).await {
        Ok(u) => Ok(UserSummary::from(&u)),
        Err(RepoError::NotFound) => Ok(UserSummary::missing(id)),
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    get,
    path = "/api/comments/duck/{duck_id}",
    params(("duck_id" = Id, Path, description = "Duck id")),
    responses(
        (status = 200, description = "Comment tree, newest first", body = [CommentNode]),
        (status = 404, description = "Unknown duck")
    )
)]
pub async fn list_for_duck(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let duck_id = path.into_inner();
    data.repo.get_duck(duck_id).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::not_found("That duck has waddled off"),
        other => other.into(),
    })?;
    let tree = comment_tree::fetch_tree(data.repo.as_ref(), duck_id).await?;
    Ok(HttpResponse::Ok().json(tree))
}

#[utoipa::path(
    post,
    path = "/api/comments",
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment posted", body = CommentNode),
        (status = 400, description = "Invalid content or parent"),
        (status = 404, description = "Unknown duck or parent")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_comment(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = auth.user_id()?;
    let req = payload.into_inner();
    let content = comment_tree::validate_content(&req.content)?;
    let new = NewComment { duck: req.duck_id, author: user_id, content, parent_comment: req.parent_comment_id };
    let comment = comment_tree::create_comment(data.repo.as_ref(), new).await?;
    tracing::debug!(comment_id = comment.id, duck_id = comment.duck, "comment posted");
    let author = author_summary(data.repo.as_ref(), user_id).await?;
    Ok(HttpResponse::Created().json(CommentNode::leaf(comment, author)))
}

#[utoipa::path(
    put,
    path = "/api/comments/{id}",
    params(("id" = Id, Path, description = "Comment id")),
    request_body = EditCommentRequest,
    responses(
        (status = 200, description = "Comment edited", body = CommentNode),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Unknown comment")
    ),
    security(("bearerAuth" = []))
)]
pub async fn edit_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<EditCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = auth.user_id()?;
    let comment = owned_comment(data.repo.as_ref(), path.into_inner(), user_id).await?;
    let content = comment_tree::validate_content(&payload.content)?;
    let updated = data.repo.update_comment_content(comment.id, content).await.map_err(comment_not_found)?;

    let node = comment_tree::fetch_subtree(data.repo.as_ref(), updated).await?;
    Ok(HttpResponse::Ok().json(node))
}

#[utoipa::path(
    delete,
    path = "/api/comments/{id}",
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Comment and its replies deleted", body = DeleteCommentResponse),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Unknown comment")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_comment(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let comment = owned_comment(data.repo.as_ref(), path.into_inner(), auth.user_id()?).await?;
    let deleted = comment_tree::delete_comment(data.repo.as_ref(), &comment).await?;
    tracing::debug!(comment_id = comment.id, removed = deleted.len(), "comment deleted");
    Ok(HttpResponse::Ok().json(DeleteCommentResponse { message: "Comment deleted".into(), deleted }))
}

#[utoipa::path(
    post,
    path = "/api/comments/{id}/like",
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Liked", body = LikeState),
        (status = 400, description = "Already liked"),
        (status = 404, description = "Unknown comment")
    ),
    security(("bearerAuth" = []))
)]
pub async fn like_comment(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let comment = data
        .repo
        .like_comment(path.into_inner(), auth.user_id()?)
        .await
        .map_err(|e| match e {
            RepoError::AlreadyLiked => ApiError::bad_request("You already liked this comment"),
            other => comment_not_found(other),
        })?;
    Ok(HttpResponse::Ok().json(LikeState { likes: comment.likes, liked_by: comment.liked_by }))
}

#[utoipa::path(
    post,
    path = "/api/comments/{id}/unlike",
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Unliked", body = LikeState),
        (status = 400, description = "Not liked yet"),
        (status = 404, description = "Unknown comment")
    ),
    security(("bearerAuth" = []))
)]
pub async fn unlike_comment(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let comment = data
        .repo
        .unlike_comment(path.into_inner(), auth.user_id()?)
        .await
        .map_err(|e| match e {
            RepoError::NotLiked => ApiError::bad_request("You haven't liked this comment"),
            other => comment_not_found(other),
        })?;
    Ok(HttpResponse::Ok().json(LikeState { likes: comment.likes, liked_by: comment.liked_by }))
}
