use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    authz,
    db::models::Comment,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::issues,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/:id",
        get(get_comment).put(update_comment).delete(delete_comment),
    )
}

/// Routes mounted under `/issues/:id/comments`.
pub fn issue_router() -> Router<AppState> {
    Router::new().route("/", get(list_issue_comments).post(create_comment))
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: String,
    pub issue_id: String,
    pub created_by: String,
    pub author_name: String,
    pub text: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct CommentsListResponse {
    pub comments: Vec<CommentResponse>,
}

pub(crate) async fn comments_for_issue(
    pool: &SqlitePool,
    issue_id: &str,
) -> Result<Vec<CommentResponse>> {
    let comments = sqlx::query_as::<_, (String, String, String, String, String, String)>(
        r#"
        SELECT c.id, c.issue_id, c.created_by, u.name, c.text, c.created_at
        FROM comments c
        JOIN users u ON c.created_by = u.id
        WHERE c.issue_id = ?
        ORDER BY c.created_at ASC
        "#,
    )
    .bind(issue_id)
    .fetch_all(pool)
    .await?;

    Ok(comments
        .into_iter()
        .map(
            |(id, issue_id, created_by, author_name, text, created_at)| CommentResponse {
                id,
                issue_id,
                created_by,
                author_name,
                text,
                created_at,
            },
        )
        .collect())
}

/// Load a comment and check the requester can see its project. A comment in
/// an invisible project is reported as not found.
async fn load_visible_comment(
    pool: &SqlitePool,
    user: &AuthUser,
    comment_id: &str,
) -> Result<Comment> {
    let comment = sqlx::query_as::<_, Comment>(
        "SELECT id, issue_id, created_by, text, created_at FROM comments WHERE id = ?",
    )
    .bind(comment_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    let issue = issues::load_issue(pool, &comment.issue_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Issue not found".to_string()))?;

    authz::require_project_member(pool, user, &issue.project_id).await?;

    Ok(comment)
}

async fn list_issue_comments(
    State(state): State<AppState>,
    user: AuthUser,
    Path(issue_id): Path<String>,
) -> Result<Json<CommentsListResponse>> {
    let issue = issues::load_issue(&state.db.pool, &issue_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Issue not found".to_string()))?;

    authz::require_project_member(&state.db.pool, &user, &issue.project_id).await?;

    let comments = comments_for_issue(&state.db.pool, &issue_id).await?;

    Ok(Json(CommentsListResponse { comments }))
}

async fn create_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(issue_id): Path<String>,
    Json(body): Json<CommentRequest>,
) -> Result<Json<CommentResponse>> {
    let issue = issues::load_issue(&state.db.pool, &issue_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Issue not found".to_string()))?;

    authz::require_project_member(&state.db.pool, &user, &issue.project_id).await?;

    if body.text.trim().is_empty() {
        return Err(AppError::Validation("Comment text is required".to_string()));
    }

    let comment_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO comments (id, issue_id, created_by, text, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&comment_id)
    .bind(&issue_id)
    .bind(&user.id)
    .bind(&body.text)
    .bind(&now)
    .execute(&state.db.pool)
    .await?;

    Ok(Json(CommentResponse {
        id: comment_id,
        issue_id,
        created_by: user.id,
        author_name: user.name,
        text: body.text,
        created_at: now,
    }))
}

async fn get_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<CommentResponse>> {
    let comment = load_visible_comment(&state.db.pool, &user, &id).await?;

    let author_name = sqlx::query_scalar::<_, String>("SELECT name FROM users WHERE id = ?")
        .bind(&comment.created_by)
        .fetch_one(&state.db.pool)
        .await?;

    Ok(Json(CommentResponse {
        id: comment.id,
        issue_id: comment.issue_id,
        created_by: comment.created_by,
        author_name,
        text: comment.text,
        created_at: comment.created_at,
    }))
}

async fn update_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<CommentRequest>,
) -> Result<Json<CommentResponse>> {
    let comment = load_visible_comment(&state.db.pool, &user, &id).await?;

    if !authz::can_write_comment(&user, &comment) {
        return Err(AppError::Forbidden(
            "Only the author can edit this comment".to_string(),
        ));
    }

    if body.text.trim().is_empty() {
        return Err(AppError::Validation("Comment text is required".to_string()));
    }

    sqlx::query("UPDATE comments SET text = ? WHERE id = ?")
        .bind(&body.text)
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(CommentResponse {
        id: comment.id,
        issue_id: comment.issue_id,
        created_by: comment.created_by,
        author_name: user.name,
        text: body.text,
        created_at: comment.created_at,
    }))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    let comment = load_visible_comment(&state.db.pool, &user, &id).await?;

    // The author or a project admin may delete
    if !authz::can_write_comment(&user, &comment) {
        let issue = issues::load_issue(&state.db.pool, &comment.issue_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Issue not found".to_string()))?;
        let membership =
            authz::membership_for(&state.db.pool, &user.id, &issue.project_id).await?;
        if !authz::can_mutate_membership(membership.as_ref()) {
            return Err(AppError::Forbidden(
                "Cannot delete this comment".to_string(),
            ));
        }
    }

    sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(()))
}
