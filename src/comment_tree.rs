//! Two-level comment threads stored as parent pointers plus reply-id lists.
//!
//! The repository only offers primitive reads and writes; everything that
//! has to keep `replies` and `parent_comment` consistent lives here.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::error::ApiError;
use crate::models::{Comment, CommentNode, Id, NewComment, UserSummary};
use crate::repo::{Repo, RepoError};

pub const MAX_COMMENT_LEN: usize = 500;

fn newest_first(a: &Comment, b: &Comment) -> Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

/// Trims and checks comment text.
pub fn validate_content(raw: &str) -> Result<String, ApiError> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(ApiError::bad_request("A comment needs at least one quack"));
    }
    if content.chars().count() > MAX_COMMENT_LEN {
        return Err(ApiError::bad_request(format!(
            "Comments are limited to {MAX_COMMENT_LEN} characters"
        )));
    }
    Ok(content.to_string())
}

/// Resolves author summaries for a batch of comments.
pub async fn authors_for(repo: &dyn Repo, comments: &[Comment]) -> Result<HashMap<Id, UserSummary>, ApiError> {
    let mut ids: Vec<Id> = comments.iter().map(|c| c.author).collect();
    ids.sort_unstable();
    ids.dedup();
    let users = repo.get_users(&ids).await?;
    Ok(users.iter().map(|u| (u.id, UserSummary::from(u))).collect())
}

fn author_of(authors: &HashMap<Id, UserSummary>, id: Id) -> UserSummary {
    authors.get(&id).cloned().unwrap_or_else(|| UserSummary::missing(id))
}

/// Builds the populated tree from a flat set of comments.
///
/// Roots are the comments without a parent; children are found by following
/// each comment's `replies` list. Ids that do not resolve are skipped and no
/// comment is expanded twice, so corrupt reply lists cannot loop.
pub fn assemble(comments: Vec<Comment>, authors: &HashMap<Id, UserSummary>) -> Vec<CommentNode> {
    let mut roots: Vec<&Comment> = comments.iter().filter(|c| c.parent_comment.is_none()).collect();
    roots.sort_by(|a, b| newest_first(a, b));
    let by_id: HashMap<Id, &Comment> = comments.iter().map(|c| (c.id, c)).collect();
    let mut seen = HashSet::new();
    roots
        .into_iter()
        .filter_map(|c| populate(c, &by_id, authors, &mut seen))
        .collect()
}

fn populate(
    comment: &Comment,
    by_id: &HashMap<Id, &Comment>,
    authors: &HashMap<Id, UserSummary>,
    seen: &mut HashSet<Id>,
) -> Option<CommentNode> {
    if !seen.insert(comment.id) {
        return None;
    }
    let mut children: Vec<&Comment> = comment
        .replies
        .iter()
        .filter_map(|id| by_id.get(id).copied())
        .collect();
    children.sort_by(|a, b| newest_first(a, b));
    let replies = children
        .into_iter()
        .filter_map(|child| populate(child, by_id, authors, seen))
        .collect();
    let mut node = CommentNode::leaf(comment.clone(), author_of(authors, comment.author));
    node.replies = replies;
    Some(node)
}

/// Newest-first tree of every comment on a duck.
pub async fn fetch_tree(repo: &dyn Repo, duck_id: Id) -> Result<Vec<CommentNode>, ApiError> {
    let comments = repo.list_comments_for_duck(duck_id).await?;
    let authors = authors_for(repo, &comments).await?;
    Ok(assemble(comments, &authors))
}

/// One comment with its direct replies resolved, as the client shows it
/// after an edit.
pub async fn fetch_subtree(repo: &dyn Repo, comment: Comment) -> Result<CommentNode, ApiError> {
    let parent_comment = comment.parent_comment;
    let id = comment.id;
    let mut family = repo.get_comments(&comment.replies).await?;
    family.retain(|c| c.parent_comment == Some(id));
    family.push(Comment { parent_comment: None, ..comment });
    let authors = authors_for(repo, &family).await?;
    let mut node = assemble(family, &authors)
        .into_iter()
        .find(|n| n.id == id)
        .ok_or_else(|| ApiError::internal(format!("comment {id} vanished while assembling")))?;
    node.parent_comment = parent_comment;
    Ok(node)
}

/// Inserts a comment, and for replies links it into the parent's `replies`.
pub async fn create_comment(repo: &dyn Repo, new: NewComment) -> Result<Comment, ApiError> {
    repo.get_duck(new.duck).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::not_found("That duck has waddled off"),
        other => other.into(),
    })?;

    if let Some(parent_id) = new.parent_comment {
        let parent = repo.get_comment(parent_id).await.map_err(|e| match e {
            RepoError::NotFound => ApiError::not_found("The comment you're replying to is gone"),
            other => other.into(),
        })?;
        if parent.duck != new.duck {
            return Err(ApiError::bad_request("That comment belongs to a different duck"));
        }
        if parent.parent_comment.is_some() {
            return Err(ApiError::bad_request("Replies can't have replies of their own"));
        }
    }

    let comment = repo.insert_comment(new).await?;
    if let Some(parent_id) = comment.parent_comment {
        repo.push_reply(parent_id, comment.id).await?;
    }
    Ok(comment)
}

/// Ids of every comment reachable through `replies`, deepest first.
async fn descendants(repo: &dyn Repo, root: &Comment) -> Result<Vec<Id>, ApiError> {
    let mut out = Vec::new();
    let mut seen: HashSet<Id> = HashSet::from([root.id]);
    let mut frontier = root.replies.clone();
    while !frontier.is_empty() {
        frontier.retain(|id| seen.insert(*id));
        if frontier.is_empty() {
            break;
        }
        let level = repo.get_comments(&frontier).await?;
        out.extend(level.iter().map(|c| c.id));
        frontier = level.into_iter().flat_map(|c| c.replies).collect();
    }
    out.reverse();
    Ok(out)
}

/// Deletes a comment and all of its replies; a reply is also unlinked from
/// its parent. Returns every removed id, the comment itself last.
pub async fn delete_comment(repo: &dyn Repo, comment: &Comment) -> Result<Vec<Id>, ApiError> {
    let mut removed = descendants(repo, comment).await?;
    if !removed.is_empty() {
        repo.delete_comments(&removed).await?;
    }
    if let Some(parent_id) = comment.parent_comment {
        match repo.pull_reply(parent_id, comment.id).await {
            Ok(()) | Err(RepoError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
    }
    repo.delete_comments(&[comment.id]).await?;
    removed.push(comment.id);
    Ok(removed)
}

/// Applies `f` to the node with `id`, wherever it sits in the tree.
/// Returns `false` when no node matched.
pub fn update_comment_tree<F>(nodes: &mut [CommentNode], id: Id, f: F) -> bool
where
    F: FnOnce(&mut CommentNode),
{
    fn walk<F: FnOnce(&mut CommentNode)>(nodes: &mut [CommentNode], id: Id, f: &mut Option<F>) -> bool {
        for node in nodes.iter_mut() {
            if node.id == id {
                if let Some(f) = f.take() {
                    f(node);
                }
                return true;
            }
            if walk(&mut node.replies, id, f) {
                return true;
            }
        }
        false
    }
    walk(nodes, id, &mut Some(f))
}

/// Removes the node with `id` at any depth and returns it.
pub fn remove_comment_from_tree(nodes: &mut Vec<CommentNode>, id: Id) -> Option<CommentNode> {
    if let Some(pos) = nodes.iter().position(|n| n.id == id) {
        return Some(nodes.remove(pos));
    }
    nodes
        .iter_mut()
        .find_map(|n| remove_comment_from_tree(&mut n.replies, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn comment(id: Id, parent: Option<Id>, replies: Vec<Id>, age_secs: i64) -> Comment {
        let at = Utc::now() - Duration::seconds(age_secs);
        Comment {
            id,
            content: format!("comment {id}"),
            duck: 1,
            author: 100 + id,
            likes: 0,
            liked_by: vec![],
            parent_comment: parent,
            replies,
            created_at: at,
            updated_at: at,
        }
    }

    fn ids(nodes: &[CommentNode]) -> Vec<Id> {
        nodes.iter().map(|n| n.id).collect()
    }

    fn sample_tree() -> Vec<CommentNode> {
        let comments = vec![
            comment(1, None, vec![3, 4], 100),
            comment(2, None, vec![], 50),
            comment(3, Some(1), vec![], 40),
            comment(4, Some(1), vec![], 30),
        ];
        assemble(comments, &HashMap::new())
    }

    #[test]
    fn assemble_orders_newest_first_at_every_level() {
        let tree = sample_tree();
        assert_eq!(ids(&tree), vec![2, 1]);
        assert_eq!(ids(&tree[1].replies), vec![4, 3]);
        assert!(tree[0].replies.is_empty());
    }

    #[test]
    fn assemble_skips_dangling_and_cyclic_replies() {
        let comments = vec![
            comment(1, None, vec![2, 99], 10),
            comment(2, Some(1), vec![1], 5),
        ];
        let tree = assemble(comments, &HashMap::new());
        assert_eq!(ids(&tree), vec![1]);
        assert_eq!(ids(&tree[0].replies), vec![2]);
        assert!(tree[0].replies[0].replies.is_empty());
    }

    #[test]
    fn assemble_fills_missing_authors() {
        let tree = assemble(vec![comment(7, None, vec![], 1)], &HashMap::new());
        assert_eq!(tree[0].author, UserSummary::missing(107));
    }

    #[test]
    fn update_reaches_nested_nodes() {
        let mut tree = sample_tree();
        assert!(update_comment_tree(&mut tree, 3, |n| n.content = "edited".into()));
        assert_eq!(tree[1].replies[1].content, "edited");
        assert!(!update_comment_tree(&mut tree, 42, |n| n.content = "nope".into()));
    }

    #[test]
    fn remove_takes_nested_and_top_level_nodes() {
        let mut tree = sample_tree();
        let removed = remove_comment_from_tree(&mut tree, 4).unwrap();
        assert_eq!(removed.id, 4);
        assert_eq!(ids(&tree[1].replies), vec![3]);

        let removed = remove_comment_from_tree(&mut tree, 1).unwrap();
        assert_eq!(ids(&removed.replies), vec![3]);
        assert_eq!(ids(&tree), vec![2]);
        assert!(remove_comment_from_tree(&mut tree, 1).is_none());
    }

    #[test]
    fn content_validation() {
        assert_eq!(validate_content("  quack  ").unwrap(), "quack");
        assert!(validate_content("   ").is_err());
        assert!(validate_content(&"q".repeat(MAX_COMMENT_LEN + 1)).is_err());
        assert!(validate_content(&"q".repeat(MAX_COMMENT_LEN)).is_ok());
    }
}
