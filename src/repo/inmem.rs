use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::*;

#[derive(Default, Serialize, Deserialize)]
struct State {
    users: HashMap<Id, User>,
    ducks: HashMap<Id, Duck>,
    comments: HashMap<Id, Comment>,
    next_id: Id,
}

impl State {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local store; optionally snapshotted to a JSON file after each write.
#[derive(Clone)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
    snapshot_path: Option<Arc<PathBuf>>,
}

impl InMemRepo {
    pub fn new() -> Self {
        Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: None }
    }

    /// Loads `path` if it exists and rewrites it after every mutation.
    pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = Self::load_state_from(&path);
        Self { state: Arc::new(RwLock::new(state)), snapshot_path: Some(Arc::new(path)) }
    }

    fn load_state_from(path: &Path) -> State {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                Ok(s) => {
                    tracing::info!("Loaded snapshot '{}'", path.display());
                    s
                }
                Err(e) => {
                    tracing::warn!("Failed to parse snapshot '{}': {e}. Starting empty.", path.display());
                    State::default()
                }
            },
            Err(e) => {
                tracing::info!("No snapshot at '{}': {e}. Starting empty.", path.display());
                State::default()
            }
        }
    }

    /// Awaited under the write guard so snapshots land in mutation order.
    async fn persist(&self, state: &State) {
        let Some(path) = self.snapshot_path.as_deref() else { return };
        match serde_json::to_vec_pretty(state) {
            Ok(bytes) => {
                if let Some(dir) = path.parent() {
                    let _ = tokio::fs::create_dir_all(dir).await;
                }
                if let Err(e) = tokio::fs::write(path, bytes).await {
                    tracing::error!("Failed to write snapshot '{}': {e}", path.display());
                }
            }
            Err(e) => tracing::error!("Failed to serialise snapshot: {e}"),
        }
    }
}

impl Default for InMemRepo {
    fn default() -> Self { Self::new() }
}

fn newest_first_ducks(a: &Duck, b: &Duck) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let mut s = self.state.write().await;
        let taken = s.users.values().any(|u| {
            u.username.eq_ignore_ascii_case(&new.username) || u.email.eq_ignore_ascii_case(&new.email)
        });
        if taken {
            return Err(RepoError::Conflict);
        }
        let now = Utc::now();
        let id = s.next_id();
        let user = User {
            id,
            username: new.username,
            email: new.email.to_lowercase(),
            password_hash: new.password_hash,
            profile_picture: None,
            bio: String::new(),
            liked_ducks: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        s.users.insert(id, user.clone());
        self.persist(&s).await;
        Ok(user)
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        let s = self.state.read().await;
        s.users.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn get_users(&self, ids: &[Id]) -> RepoResult<Vec<User>> {
        let s = self.state.read().await;
        Ok(ids.iter().filter_map(|id| s.users.get(id).cloned()).collect())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let s = self.state.read().await;
        Ok(s.users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let s = self.state.read().await;
        Ok(s.users.values().find(|u| u.username.eq_ignore_ascii_case(username)).cloned())
    }

    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
        let mut s = self.state.write().await;
        let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(bio) = upd.bio { user.bio = bio; }
        if let Some(pic) = upd.profile_picture { user.profile_picture = Some(pic); }
        user.updated_at = Utc::now();
        let updated = user.clone();
        self.persist(&s).await;
        Ok(updated)
    }
}

#[async_trait]
impl DuckRepo for InMemRepo {
    async fn list_ducks(&self, query: &DuckQuery) -> RepoResult<(Vec<Duck>, u64)> {
        let s = self.state.read().await;
        let mut v: Vec<Duck> = s.ducks.values().filter(|d| query.filter.matches(d)).cloned().collect();
        match query.sort {
            DuckSort::Newest => v.sort_by(newest_first_ducks),
            DuckSort::Oldest => v.sort_by(|a, b| newest_first_ducks(b, a)),
            DuckSort::MostLiked => v.sort_by(|a, b| b.likes.cmp(&a.likes).then_with(|| newest_first_ducks(a, b))),
            DuckSort::LeastLiked => v.sort_by(|a, b| a.likes.cmp(&b.likes).then_with(|| newest_first_ducks(a, b))),
            DuckSort::Name => v.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()).then(a.id.cmp(&b.id))),
        }
        let total = v.len() as u64;
        let page = v
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn count_ducks(&self, filter: &DuckFilter) -> RepoResult<u64> {
        let s = self.state.read().await;
        Ok(s.ducks.values().filter(|d| filter.matches(d)).count() as u64)
    }

    async fn get_duck(&self, id: Id) -> RepoResult<Duck> {
        let s = self.state.read().await;
        s.ducks.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn create_duck(&self, new: NewDuck) -> RepoResult<Duck> {
        let mut s = self.state.write().await;
        if !s.users.contains_key(&new.uploaded_by) { return Err(RepoError::NotFound); }
        let now = Utc::now();
        let id = s.next_id();
        let duck = Duck {
            id,
            name: new.name,
            image_url: new.image_url,
            image_key: new.image_key,
            breed: new.breed,
            gender: new.gender,
            mood: new.mood,
            likes: 0,
            liked_by: Vec::new(),
            uploaded_by: new.uploaded_by,
            is_rubber_duck: new.is_rubber_duck,
            created_at: now,
            updated_at: now,
        };
        s.ducks.insert(id, duck.clone());
        self.persist(&s).await;
        Ok(duck)
    }

    async fn update_duck(&self, id: Id, upd: UpdateDuck) -> RepoResult<Duck> {
        let mut s = self.state.write().await;
        let duck = s.ducks.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(name) = upd.name { duck.name = name; }
        if let Some(breed) = upd.breed { duck.breed = breed; }
        if let Some(gender) = upd.gender { duck.gender = gender; }
        if let Some(mood) = upd.mood { duck.mood = mood; }
        if let Some(rubber) = upd.is_rubber_duck { duck.is_rubber_duck = rubber; }
        duck.updated_at = Utc::now();
        let updated = duck.clone();
        self.persist(&s).await;
        Ok(updated)
    }

    async fn delete_duck(&self, id: Id) -> RepoResult<Duck> {
        let mut s = self.state.write().await;
        let duck = s.ducks.remove(&id).ok_or(RepoError::NotFound)?;
        s.comments.retain(|_, c| c.duck != id);
        for user in s.users.values_mut() {
            user.liked_ducks.retain(|d| *d != id);
        }
        self.persist(&s).await;
        Ok(duck)
    }

    async fn like_duck(&self, duck_id: Id, user_id: Id) -> RepoResult<Duck> {
        let mut s = self.state.write().await;
        if !s.users.contains_key(&user_id) { return Err(RepoError::NotFound); }
        let duck = s.ducks.get_mut(&duck_id).ok_or(RepoError::NotFound)?;
        if duck.liked_by.contains(&user_id) { return Err(RepoError::AlreadyLiked); }
        duck.liked_by.push(user_id);
        duck.likes += 1;
        let updated = duck.clone();
        if let Some(user) = s.users.get_mut(&user_id) {
            if !user.liked_ducks.contains(&duck_id) { user.liked_ducks.push(duck_id); }
        }
        self.persist(&s).await;
        Ok(updated)
    }

    async fn unlike_duck(&self, duck_id: Id, user_id: Id) -> RepoResult<Duck> {
        let mut s = self.state.write().await;
        let duck = s.ducks.get_mut(&duck_id).ok_or(RepoError::NotFound)?;
        if !duck.liked_by.contains(&user_id) { return Err(RepoError::NotLiked); }
        duck.liked_by.retain(|u| *u != user_id);
        duck.likes -= 1;
        let updated = duck.clone();
        if let Some(user) = s.users.get_mut(&user_id) {
            user.liked_ducks.retain(|d| *d != duck_id);
        }
        self.persist(&s).await;
        Ok(updated)
    }
}

#[async_trait]
impl CommentRepo for InMemRepo {
    async fn insert_comment(&self, new: NewComment) -> RepoResult<Comment> {
        let mut s = self.state.write().await;
        if !s.ducks.contains_key(&new.duck) || !s.users.contains_key(&new.author) {
            return Err(RepoError::NotFound);
        }
        let now = Utc::now();
        let id = s.next_id();
        let comment = Comment {
            id,
            content: new.content,
            duck: new.duck,
            author: new.author,
            likes: 0,
            liked_by: Vec::new(),
            parent_comment: new.parent_comment,
            replies: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        s.comments.insert(id, comment.clone());
        self.persist(&s).await;
        Ok(comment)
    }

    async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
        let s = self.state.read().await;
        s.comments.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn get_comments(&self, ids: &[Id]) -> RepoResult<Vec<Comment>> {
        let s = self.state.read().await;
        Ok(ids.iter().filter_map(|id| s.comments.get(id).cloned()).collect())
    }

    async fn list_comments_for_duck(&self, duck_id: Id) -> RepoResult<Vec<Comment>> {
        let s = self.state.read().await;
        Ok(s.comments.values().filter(|c| c.duck == duck_id).cloned().collect())
    }

    async fn push_reply(&self, parent_id: Id, reply_id: Id) -> RepoResult<()> {
        let mut s = self.state.write().await;
        let parent = s.comments.get_mut(&parent_id).ok_or(RepoError::NotFound)?;
        if !parent.replies.contains(&reply_id) {
            parent.replies.push(reply_id);
        }
        self.persist(&s).await;
        Ok(())
    }

    async fn pull_reply(&self, parent_id: Id, reply_id: Id) -> RepoResult<()> {
        let mut s = self.state.write().await;
        let parent = s.comments.get_mut(&parent_id).ok_or(RepoError::NotFound)?;
        parent.replies.retain(|r| *r != reply_id);
        self.persist(&s).await;
        Ok(())
    }

    async fn update_comment_content(&self, id: Id, content: String) -> RepoResult<Comment> {
        let mut s = self.state.write().await;
        let comment = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
        comment.content = content;
        comment.updated_at = Utc::now();
        let updated = comment.clone();
        self.persist(&s).await;
        Ok(updated)
    }

    async fn delete_comments(&self, ids: &[Id]) -> RepoResult<u64> {
        let mut s = self.state.write().await;
        let removed = ids.iter().filter(|id| s.comments.remove(*id).is_some()).count() as u64;
        self.persist(&s).await;
        Ok(removed)
    }

    async fn like_comment(&self, id: Id, user_id: Id) -> RepoResult<Comment> {
        let mut s = self.state.write().await;
        let comment = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
        if comment.liked_by.contains(&user_id) { return Err(RepoError::AlreadyLiked); }
        comment.liked_by.push(user_id);
        comment.likes += 1;
        let updated = comment.clone();
        self.persist(&s).await;
        Ok(updated)
    }

    async fn unlike_comment(&self, id: Id, user_id: Id) -> RepoResult<Comment> {
        let mut s = self.state.write().await;
        let comment = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
        if !comment.liked_by.contains(&user_id) { return Err(RepoError::NotLiked); }
        comment.liked_by.retain(|u| *u != user_id);
        comment.likes -= 1;
        let updated = comment.clone();
        self.persist(&s).await;
        Ok(updated)
    }
}
