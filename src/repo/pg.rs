use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, QueryBuilder};

use super::*;

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => RepoError::Conflict,
            _ => RepoError::Internal(e.to_string()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    profile_picture: Option<String>,
    bio: String,
    liked_ducks: Vec<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            username: r.username,
            email: r.email,
            password_hash: r.password_hash,
            profile_picture: r.profile_picture,
            bio: r.bio,
            liked_ducks: r.liked_ducks,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DuckRow {
    id: i64,
    name: String,
    image_url: String,
    image_key: String,
    breed: String,
    gender: String,
    mood: String,
    likes: i64,
    liked_by: Vec<i64>,
    uploaded_by: i64,
    is_rubber_duck: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DuckRow> for Duck {
    type Error = RepoError;
    fn try_from(r: DuckRow) -> Result<Self, Self::Error> {
        let id = r.id;
        let bad = |e: ParseEnumError| RepoError::Internal(format!("duck {id}: {e}"));
        Ok(Duck {
            id,
            breed: r.breed.parse().map_err(bad)?,
            gender: r.gender.parse().map_err(bad)?,
            mood: r.mood.parse().map_err(bad)?,
            name: r.name,
            image_url: r.image_url,
            image_key: r.image_key,
            likes: r.likes,
            liked_by: r.liked_by,
            uploaded_by: r.uploaded_by,
            is_rubber_duck: r.is_rubber_duck,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    content: String,
    duck_id: i64,
    author_id: i64,
    likes: i64,
    liked_by: Vec<i64>,
    parent_comment_id: Option<i64>,
    replies: Vec<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(r: CommentRow) -> Self {
        Comment {
            id: r.id,
            content: r.content,
            duck: r.duck_id,
            author: r.author_id,
            likes: r.likes,
            liked_by: r.liked_by,
            parent_comment: r.parent_comment_id,
            replies: r.replies,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

fn ducks(rows: Vec<DuckRow>) -> RepoResult<Vec<Duck>> {
    rows.into_iter().map(Duck::try_from).collect()
}

/// Escapes `%`, `_` and `\` so user input is matched literally by ILIKE.
fn like_pattern(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('%');
    for ch in s.chars() {
        if matches!(ch, '%' | '_' | '\\') { out.push('\\'); }
        out.push(ch);
    }
    out.push('%');
    out
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, f: &DuckFilter) {
    qb.push(" WHERE TRUE");
    if let Some(b) = f.breed { qb.push(" AND breed = ").push_bind(b.as_str()); }
    if let Some(g) = f.gender { qb.push(" AND gender = ").push_bind(g.as_str()); }
    if let Some(m) = f.mood { qb.push(" AND mood = ").push_bind(m.as_str()); }
    if let Some(r) = f.is_rubber_duck { qb.push(" AND is_rubber_duck = ").push_bind(r); }
    if let Some(u) = f.uploaded_by { qb.push(" AND uploaded_by = ").push_bind(u); }
    if let Some(s) = f.search.as_deref() { qb.push(" AND name ILIKE ").push_bind(like_pattern(s)); }
}

fn order_by(sort: DuckSort) -> &'static str {
    match sort {
        DuckSort::Newest => " ORDER BY created_at DESC, id DESC",
        DuckSort::Oldest => " ORDER BY created_at ASC, id ASC",
        DuckSort::MostLiked => " ORDER BY likes DESC, created_at DESC, id DESC",
        DuckSort::LeastLiked => " ORDER BY likes ASC, created_at DESC, id DESC",
        DuckSort::Name => " ORDER BY lower(name) ASC, id ASC",
    }
}

#[derive(Clone)]
pub struct PgRepo { pool: Pool<Postgres> }

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

    /// Connects and applies the bundled migrations.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }

    async fn duck_exists(&self, id: Id) -> RepoResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM ducks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn comment_exists(&self, id: Id) -> RepoResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM comments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (username, email, password_hash) VALUES ($1, lower($2), $3) RETURNING *",
        )
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn get_users(&self, ids: &[Id]) -> RepoResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE lower(username) = lower($1)")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "UPDATE users SET bio = COALESCE($2, bio), profile_picture = COALESCE($3, profile_picture), updated_at = now()
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(upd.bio)
        .bind(upd.profile_picture)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }
}

#[async_trait]
impl DuckRepo for PgRepo {
    async fn list_ducks(&self, query: &DuckQuery) -> RepoResult<(Vec<Duck>, u64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ducks");
        push_filter(&mut count, &query.filter);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM ducks");
        push_filter(&mut qb, &query.filter);
        qb.push(order_by(query.sort));
        qb.push(" LIMIT ").push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX));
        qb.push(" OFFSET ").push_bind(i64::try_from(query.offset).unwrap_or(i64::MAX));
        let rows: Vec<DuckRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok((ducks(rows)?, total as u64))
    }

    async fn count_ducks(&self, filter: &DuckFilter) -> RepoResult<u64> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ducks");
        push_filter(&mut count, filter);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;
        Ok(total as u64)
    }

    async fn get_duck(&self, id: Id) -> RepoResult<Duck> {
        let row = sqlx::query_as::<_, DuckRow>("SELECT * FROM ducks WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn create_duck(&self, new: NewDuck) -> RepoResult<Duck> {
        let row = sqlx::query_as::<_, DuckRow>(
            "INSERT INTO ducks (name, image_url, image_key, breed, gender, mood, uploaded_by, is_rubber_duck)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(&new.name)
        .bind(&new.image_url)
        .bind(&new.image_key)
        .bind(new.breed.as_str())
        .bind(new.gender.as_str())
        .bind(new.mood.as_str())
        .bind(new.uploaded_by)
        .bind(new.is_rubber_duck)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            // uploader FK violation
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some("23503") => RepoError::NotFound,
            other => other.into(),
        })?;
        row.try_into()
    }

    async fn update_duck(&self, id: Id, upd: UpdateDuck) -> RepoResult<Duck> {
        let row = sqlx::query_as::<_, DuckRow>(
            "UPDATE ducks SET name = COALESCE($2, name), breed = COALESCE($3, breed), gender = COALESCE($4, gender),
                    mood = COALESCE($5, mood), is_rubber_duck = COALESCE($6, is_rubber_duck), updated_at = now()
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(upd.name)
        .bind(upd.breed.map(|b| b.as_str()))
        .bind(upd.gender.map(|g| g.as_str()))
        .bind(upd.mood.map(|m| m.as_str()))
        .bind(upd.is_rubber_duck)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn delete_duck(&self, id: Id) -> RepoResult<Duck> {
        let mut tx = self.pool.begin().await?;
        // comments go with the duck via ON DELETE CASCADE
        let row = sqlx::query_as::<_, DuckRow>("DELETE FROM ducks WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query("UPDATE users SET liked_ducks = array_remove(liked_ducks, $1) WHERE $1 = ANY(liked_ducks)")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn like_duck(&self, duck_id: Id, user_id: Id) -> RepoResult<Duck> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, DuckRow>(
            "UPDATE ducks SET likes = likes + 1, liked_by = array_append(liked_by, $2)
             WHERE id = $1 AND NOT ($2 = ANY(liked_by)) RETURNING *",
        )
        .bind(duck_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            drop(tx);
            return Err(if self.duck_exists(duck_id).await? { RepoError::AlreadyLiked } else { RepoError::NotFound });
        };
        let touched = sqlx::query(
            "UPDATE users SET liked_ducks = array_append(liked_ducks, $1)
             WHERE id = $2 AND NOT ($1 = ANY(liked_ducks))",
        )
        .bind(duck_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        if touched.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() { return Err(RepoError::NotFound); }
        }
        tx.commit().await?;
        row.try_into()
    }

    async fn unlike_duck(&self, duck_id: Id, user_id: Id) -> RepoResult<Duck> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, DuckRow>(
            "UPDATE ducks SET likes = likes - 1, liked_by = array_remove(liked_by, $2)
             WHERE id = $1 AND $2 = ANY(liked_by) RETURNING *",
        )
        .bind(duck_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            drop(tx);
            return Err(if self.duck_exists(duck_id).await? { RepoError::NotLiked } else { RepoError::NotFound });
        };
        sqlx::query("UPDATE users SET liked_ducks = array_remove(liked_ducks, $1) WHERE id = $2")
            .bind(duck_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        row.try_into()
    }
}

#[async_trait]
impl CommentRepo for PgRepo {
    async fn insert_comment(&self, new: NewComment) -> RepoResult<Comment> {
        let row = sqlx::query_as::<_, CommentRow>(
            "INSERT INTO comments (content, duck_id, author_id, parent_comment_id) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(&new.content)
        .bind(new.duck)
        .bind(new.author)
        .bind(new.parent_comment)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some("23503") => RepoError::NotFound,
            other => other.into(),
        })?;
        Ok(row.into())
    }

    async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
        let row = sqlx::query_as::<_, CommentRow>("SELECT * FROM comments WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn get_comments(&self, ids: &[Id]) -> RepoResult<Vec<Comment>> {
        let rows = sqlx::query_as::<_, CommentRow>("SELECT * FROM comments WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn list_comments_for_duck(&self, duck_id: Id) -> RepoResult<Vec<Comment>> {
        let rows = sqlx::query_as::<_, CommentRow>("SELECT * FROM comments WHERE duck_id = $1")
            .bind(duck_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn push_reply(&self, parent_id: Id, reply_id: Id) -> RepoResult<()> {
        let res = sqlx::query(
            "UPDATE comments SET replies = CASE WHEN $2 = ANY(replies) THEN replies ELSE array_append(replies, $2) END
             WHERE id = $1",
        )
        .bind(parent_id)
        .bind(reply_id)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }

    async fn pull_reply(&self, parent_id: Id, reply_id: Id) -> RepoResult<()> {
        let res = sqlx::query("UPDATE comments SET replies = array_remove(replies, $2) WHERE id = $1")
            .bind(parent_id)
            .bind(reply_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }

    async fn update_comment_content(&self, id: Id, content: String) -> RepoResult<Comment> {
        let row = sqlx::query_as::<_, CommentRow>(
            "UPDATE comments SET content = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn delete_comments(&self, ids: &[Id]) -> RepoResult<u64> {
        let res = sqlx::query("DELETE FROM comments WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn like_comment(&self, id: Id, user_id: Id) -> RepoResult<Comment> {
        let row = sqlx::query_as::<_, CommentRow>(
            "UPDATE comments SET likes = likes + 1, liked_by = array_append(liked_by, $2)
             WHERE id = $1 AND NOT ($2 = ANY(liked_by)) RETURNING *",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(row.into()),
            None if self.comment_exists(id).await? => Err(RepoError::AlreadyLiked),
            None => Err(RepoError::NotFound),
        }
    }

    async fn unlike_comment(&self, id: Id, user_id: Id) -> RepoResult<Comment> {
        let row = sqlx::query_as::<_, CommentRow>(
            "UPDATE comments SET likes = likes - 1, liked_by = array_remove(liked_by, $2)
             WHERE id = $1 AND $2 = ANY(liked_by) RETURNING *",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(row.into()),
            None if self.comment_exists(id).await? => Err(RepoError::NotLiked),
            None => Err(RepoError::NotFound),
        }
    }
}
