use std::sync::Arc;

use async_trait::async_trait;

use crate::models::*;

#[cfg(feature = "inmem-store")]
pub mod inmem;
#[cfg(feature = "postgres-store")]
pub mod pg;

#[cfg(not(any(feature = "inmem-store", feature = "postgres-store")))]
compile_error!("enable at least one of the `inmem-store` / `postgres-store` features");

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("already liked")] AlreadyLiked,
    #[error("not liked")] NotLiked,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Fails with `Conflict` when the username (case-insensitive) or email is taken.
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    /// Unknown ids are skipped.
    async fn get_users(&self, ids: &[Id]) -> RepoResult<Vec<User>>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User>;
}

#[async_trait]
pub trait DuckRepo: Send + Sync {
    /// Returns one page of ducks plus the number of ducks matching the filter.
    async fn list_ducks(&self, query: &DuckQuery) -> RepoResult<(Vec<Duck>, u64)>;
    async fn count_ducks(&self, filter: &DuckFilter) -> RepoResult<u64>;
    async fn get_duck(&self, id: Id) -> RepoResult<Duck>;
    async fn create_duck(&self, new: NewDuck) -> RepoResult<Duck>;
    async fn update_duck(&self, id: Id, upd: UpdateDuck) -> RepoResult<Duck>;
    /// Removes the duck, its comments, and its id from every user's liked set.
    async fn delete_duck(&self, id: Id) -> RepoResult<Duck>;
    /// Adds `user_id` to the liker set and the duck to the user's liked set.
    async fn like_duck(&self, duck_id: Id, user_id: Id) -> RepoResult<Duck>;
    async fn unlike_duck(&self, duck_id: Id, user_id: Id) -> RepoResult<Duck>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn insert_comment(&self, new: NewComment) -> RepoResult<Comment>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    /// Unknown ids are skipped.
    async fn get_comments(&self, ids: &[Id]) -> RepoResult<Vec<Comment>>;
    async fn list_comments_for_duck(&self, duck_id: Id) -> RepoResult<Vec<Comment>>;
    /// Appends `reply_id` to the parent's replies unless already present.
    async fn push_reply(&self, parent_id: Id, reply_id: Id) -> RepoResult<()>;
    async fn pull_reply(&self, parent_id: Id, reply_id: Id) -> RepoResult<()>;
    async fn update_comment_content(&self, id: Id, content: String) -> RepoResult<Comment>;
    /// Returns how many of the ids existed.
    async fn delete_comments(&self, ids: &[Id]) -> RepoResult<u64>;
    async fn like_comment(&self, id: Id, user_id: Id) -> RepoResult<Comment>;
    async fn unlike_comment(&self, id: Id, user_id: Id) -> RepoResult<Comment>;
}

pub trait Repo: UserRepo + DuckRepo + CommentRepo {}

impl<T> Repo for T where T: UserRepo + DuckRepo + CommentRepo {}

/// Picks the backend for the enabled features: Postgres when compiled in and
/// `DATABASE_URL` is configured, otherwise the in-memory store.
pub async fn build_repo(config: &crate::config::AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    if let Some(repo) = connect_postgres(config).await? {
        return Ok(repo);
    }
    fallback_repo(config)
}

#[cfg(feature = "postgres-store")]
async fn connect_postgres(config: &crate::config::AppConfig) -> anyhow::Result<Option<Arc<dyn Repo>>> {
    let Some(url) = config.database_url.as_deref() else { return Ok(None) };
    let repo = pg::PgRepo::connect(url).await?;
    tracing::info!("Using Postgres repository backend");
    Ok(Some(Arc::new(repo)))
}

#[cfg(not(feature = "postgres-store"))]
async fn connect_postgres(config: &crate::config::AppConfig) -> anyhow::Result<Option<Arc<dyn Repo>>> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL is set but the postgres-store feature is not compiled in; ignoring");
    }
    Ok(None)
}

#[cfg(feature = "inmem-store")]
fn fallback_repo(config: &crate::config::AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    let repo = match &config.data_dir {
        Some(dir) => inmem::InMemRepo::with_snapshot(dir.join("state.json")),
        None => inmem::InMemRepo::new(),
    };
    tracing::info!("Using in-memory repository backend");
    Ok(Arc::new(repo))
}

#[cfg(not(feature = "inmem-store"))]
fn fallback_repo(_config: &crate::config::AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    anyhow::bail!("DATABASE_URL must be set when only the postgres-store feature is enabled")
}
