use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub type Id = i64;

/// Implements `as_str` / `FromStr` for a plain string-backed enum so the same
/// spelling is used in JSON, multipart form fields and database columns.
macro_rules! string_enum {
    ($name:ident { $($variant:ident),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self { $($name::$variant => stringify!($variant)),+ }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
                    .cloned()
                    .ok_or_else(|| ParseEnumError { kind: stringify!($name), value: s.to_string() })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("'{value}' is not a known {kind}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Breed {
    Mallard,
    Pekin,
    Muscovy,
    Runner,
    Rouen,
    Call,
    Cayuga,
    WoodDuck,
    Mandarin,
    KhakiCampbell,
    Other,
}
string_enum!(Breed { Mallard, Pekin, Muscovy, Runner, Rouen, Call, Cayuga, WoodDuck, Mandarin, KhakiCampbell, Other });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Gender {
    Male,
    Female,
    Unknown,
}
string_enum!(Gender { Male, Female, Unknown });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Mood {
    Happy,
    Grumpy,
    Sleepy,
    Curious,
    Hungry,
    Chaotic,
    Majestic,
}
string_enum!(Mood { Happy, Grumpy, Sleepy, Curious, Hungry, Chaotic, Majestic });

// ---------------- users ----------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub profile_picture: Option<String>,
    pub bio: String,
    pub liked_ducks: Vec<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProfile {
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
}

/// Author / uploader as embedded in ducks and comments.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Id,
    pub username: String,
    pub profile_picture: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        Self { id: u.id, username: u.username.clone(), profile_picture: u.profile_picture.clone() }
    }
}

impl UserSummary {
    /// Stand-in for an author whose account no longer exists.
    pub fn missing(id: Id) -> Self {
        Self { id, username: "[deleted duckling]".into(), profile_picture: None }
    }
}

/// What the owner of an account sees about themselves.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrivateProfile {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub profile_picture: Option<String>,
    pub bio: String,
    pub liked_ducks: Vec<Id>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PrivateProfile {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            email: u.email.clone(),
            profile_picture: u.profile_picture.clone(),
            bio: u.bio.clone(),
            liked_ducks: u.liked_ducks.clone(),
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: Id,
    pub username: String,
    pub profile_picture: Option<String>,
    pub bio: String,
    pub created_at: DateTime<Utc>,
    pub duck_count: u64,
}

// ---------------- ducks ----------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Duck {
    pub id: Id,
    pub name: String,
    pub image_url: String,
    pub image_key: String,
    pub breed: Breed,
    pub gender: Gender,
    pub mood: Mood,
    pub likes: i64,
    pub liked_by: Vec<Id>,
    pub uploaded_by: Id,
    pub is_rubber_duck: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDuck {
    pub name: String,
    pub image_url: String,
    pub image_key: String,
    pub breed: Breed,
    pub gender: Gender,
    pub mood: Mood,
    pub uploaded_by: Id,
    pub is_rubber_duck: bool,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDuck {
    pub name: Option<String>,
    pub breed: Option<Breed>,
    pub gender: Option<Gender>,
    pub mood: Option<Mood>,
    pub is_rubber_duck: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DuckView {
    pub id: Id,
    pub name: String,
    pub image_url: String,
    pub breed: Breed,
    pub gender: Gender,
    pub mood: Mood,
    pub likes: i64,
    pub liked_by: Vec<Id>,
    pub uploaded_by: UserSummary,
    pub is_rubber_duck: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DuckView {
    pub fn new(duck: Duck, uploader: UserSummary) -> Self {
        Self {
            id: duck.id,
            name: duck.name,
            image_url: duck.image_url,
            breed: duck.breed,
            gender: duck.gender,
            mood: duck.mood,
            likes: duck.likes,
            liked_by: duck.liked_by,
            uploaded_by: uploader,
            is_rubber_duck: duck.is_rubber_duck,
            created_at: duck.created_at,
            updated_at: duck.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum DuckSort {
    #[default]
    Newest,
    Oldest,
    MostLiked,
    LeastLiked,
    Name,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DuckFilter {
    pub breed: Option<Breed>,
    pub gender: Option<Gender>,
    pub mood: Option<Mood>,
    pub is_rubber_duck: Option<bool>,
    pub uploaded_by: Option<Id>,
    pub search: Option<String>,
}

impl DuckFilter {
    pub fn matches(&self, d: &Duck) -> bool {
        self.breed.map_or(true, |b| d.breed == b)
            && self.gender.map_or(true, |g| d.gender == g)
            && self.mood.map_or(true, |m| d.mood == m)
            && self.is_rubber_duck.map_or(true, |r| d.is_rubber_duck == r)
            && self.uploaded_by.map_or(true, |u| d.uploaded_by == u)
            && self
                .search
                .as_ref()
                .map_or(true, |s| d.name.to_lowercase().contains(&s.to_lowercase()))
    }
}

/// Repository-level listing request: filter + order + window.
#[derive(Debug, Clone, Default)]
pub struct DuckQuery {
    pub filter: DuckFilter,
    pub sort: DuckSort,
    pub offset: u64,
    pub limit: u64,
}

/// Query string accepted by `GET /api/ducks`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DuckListParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub breed: Option<Breed>,
    pub gender: Option<Gender>,
    pub mood: Option<Mood>,
    pub is_rubber_duck: Option<bool>,
    pub uploaded_by: Option<Id>,
    pub search: Option<String>,
    pub sort: Option<DuckSort>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u64,
    pub total_pages: u64,
    pub total_ducks: u64,
    pub limit: u64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl Pagination {
    /// `page` is 1-based; callers clamp `page >= 1` and `limit >= 1`.
    pub fn new(page: u64, limit: u64, total_ducks: u64) -> Self {
        let total_pages = total_ducks.div_ceil(limit);
        Self {
            current_page: page,
            total_pages,
            total_ducks,
            limit,
            has_next_page: page.saturating_mul(limit) < total_ducks,
            has_previous_page: page > 1,
        }
    }

    /// Saturates, so absurd page numbers land past the end instead of wrapping.
    pub fn offset(page: u64, limit: u64) -> u64 {
        page.saturating_sub(1).saturating_mul(limit)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DuckPage {
    pub ducks: Vec<DuckView>,
    pub pagination: Pagination,
}

// ---------------- comments ----------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Id,
    pub content: String,
    pub duck: Id,
    pub author: Id,
    pub likes: i64,
    pub liked_by: Vec<Id>,
    pub parent_comment: Option<Id>,
    pub replies: Vec<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub duck: Id,
    pub author: Id,
    pub content: String,
    pub parent_comment: Option<Id>,
}

/// Comment with its author and its replies resolved.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommentNode {
    pub id: Id,
    pub content: String,
    pub duck: Id,
    pub author: UserSummary,
    pub likes: i64,
    pub liked_by: Vec<Id>,
    pub parent_comment: Option<Id>,
    pub replies: Vec<CommentNode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommentNode {
    pub fn leaf(c: Comment, author: UserSummary) -> Self {
        Self {
            id: c.id,
            content: c.content,
            duck: c.duck,
            author,
            likes: c.likes,
            liked_by: c.liked_by,
            parent_comment: c.parent_comment,
            replies: Vec::new(),
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Response body for like / unlike on either ducks or comments.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LikeState {
    pub likes: i64,
    pub liked_by: Vec<Id>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("mallard".parse::<Breed>().unwrap(), Breed::Mallard);
        assert_eq!(" WoodDuck ".parse::<Breed>().unwrap(), Breed::WoodDuck);
        assert_eq!("FEMALE".parse::<Gender>().unwrap(), Gender::Female);
        let err = "furious".parse::<Mood>().unwrap_err();
        assert_eq!(err.kind, "Mood");
        assert_eq!(Mood::Chaotic.to_string(), "Chaotic");
    }

    #[test]
    fn pagination_flags_follow_totals() {
        let p = Pagination::new(1, 10, 25);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next_page);
        assert!(!p.has_previous_page);

        let p = Pagination::new(3, 10, 25);
        assert!(!p.has_next_page);
        assert!(p.has_previous_page);

        let p = Pagination::new(2, 10, 20);
        assert_eq!(p.total_pages, 2);
        assert!(!p.has_next_page);

        let p = Pagination::new(1, 10, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next_page);
        assert!(!p.has_previous_page);

        assert_eq!(Pagination::offset(3, 12), 24);
    }

    #[test]
    fn huge_page_numbers_saturate() {
        assert_eq!(Pagination::offset(u64::MAX, 50), u64::MAX);
        let p = Pagination::new(u64::MAX, 50, 5);
        assert!(!p.has_next_page);
        assert!(p.has_previous_page);
    }

    #[test]
    fn filter_search_is_case_insensitive() {
        let now = Utc::now();
        let duck = Duck {
            id: 1,
            name: "Sir Quacksalot".into(),
            image_url: "/media/x.png".into(),
            image_key: "x.png".into(),
            breed: Breed::Pekin,
            gender: Gender::Male,
            mood: Mood::Majestic,
            likes: 0,
            liked_by: vec![],
            uploaded_by: 7,
            is_rubber_duck: false,
            created_at: now,
            updated_at: now,
        };
        let f = DuckFilter { search: Some("QUACK".into()), ..Default::default() };
        assert!(f.matches(&duck));
        let f = DuckFilter { breed: Some(Breed::Mallard), ..Default::default() };
        assert!(!f.matches(&duck));
        let f = DuckFilter { uploaded_by: Some(7), is_rubber_duck: Some(false), ..Default::default() };
        assert!(f.matches(&duck));
    }
}
