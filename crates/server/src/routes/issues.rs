use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    authz,
    db::models::{Issue, IssuePriority, IssueStatus, Label},
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::comments,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_created_issues))
        .route("/assigned", get(list_assigned_issues))
        .route(
            "/:id",
            get(get_issue).patch(update_issue).delete(delete_issue),
        )
        .nest("/:id/comments", comments::issue_router())
}

/// Routes mounted under `/projects/:id/issues`.
pub fn project_router() -> Router<AppState> {
    Router::new().route("/", get(list_project_issues).post(create_issue))
}

#[derive(Debug, Deserialize)]
pub struct CreateIssueRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub assigned_to: String,
    pub status: Option<IssueStatus>,
    pub priority: Option<IssuePriority>,
    pub due_date: Option<NaiveDate>,
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateIssueRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assigned_to: Option<String>,
    pub status: Option<IssueStatus>,
    pub priority: Option<IssuePriority>,
    pub due_date: Option<NaiveDate>,
    // None means "leave the label set alone"; Some(vec![]) clears it.
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct IssueListQuery {
    // Comma-separated lists; an issue matches if any element matches.
    pub labels: Option<String>,
    pub assigned_to: Option<String>,
    pub created_by: Option<String>,
}

/// Summary shape used in listings.
#[derive(Debug, Serialize)]
pub struct IssueResponse {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub created_by: String,
    pub assigned_to: String,
    pub status: IssueStatus,
    pub priority: IssuePriority,
    pub due_date: Option<String>,
    pub labels: Vec<Label>,
    pub created_at: String,
    pub updated_at: String,
}

/// Detail shape; the summary fields plus description and comments.
#[derive(Debug, Serialize)]
pub struct IssueDetailResponse {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: String,
    pub created_by: String,
    pub assigned_to: String,
    pub status: IssueStatus,
    pub priority: IssuePriority,
    pub due_date: Option<String>,
    pub labels: Vec<Label>,
    pub comments: Vec<comments::CommentResponse>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct IssueListResponse {
    pub issues: Vec<IssueResponse>,
}

pub(crate) async fn load_issue(pool: &SqlitePool, id: &str) -> Result<Option<Issue>> {
    let issue = sqlx::query_as::<_, Issue>(
        r#"
        SELECT id, project_id, created_by, assigned_to, title, description,
               status, priority, due_date, created_at, updated_at
        FROM issues
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(issue)
}

pub(crate) async fn labels_for_issue(pool: &SqlitePool, issue_id: &str) -> Result<Vec<Label>> {
    let labels = sqlx::query_as::<_, Label>(
        r#"
        SELECT l.id, l.name
        FROM labels l
        JOIN issue_labels il ON l.id = il.label_id
        WHERE il.issue_id = ?
        ORDER BY l.name ASC
        "#,
    )
    .bind(issue_id)
    .fetch_all(pool)
    .await?;

    Ok(labels)
}

/// Full-replace label reconciliation: the association set is cleared and
/// rebuilt from `names`. Catalog rows are created lazily; names match
/// case-sensitively with no normalization. Runs inside the caller's
/// transaction so a failed issue write leaves no half-applied label set.
async fn set_issue_labels(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    issue_id: &str,
    names: &[String],
) -> Result<()> {
    sqlx::query("DELETE FROM issue_labels WHERE issue_id = ?")
        .bind(issue_id)
        .execute(&mut **tx)
        .await?;

    let mut seen = HashSet::new();
    for name in names {
        if name.is_empty() {
            return Err(AppError::Validation("Label name is required".to_string()));
        }
        if !seen.insert(name.as_str()) {
            continue;
        }

        // Get-or-create; concurrent creators converge on one catalog row
        sqlx::query("INSERT INTO labels (id, name) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
            .bind(Uuid::new_v4().to_string())
            .bind(name)
            .execute(&mut **tx)
            .await?;

        let label_id = sqlx::query_scalar::<_, String>("SELECT id FROM labels WHERE name = ?")
            .bind(name)
            .fetch_one(&mut **tx)
            .await?;

        sqlx::query("INSERT INTO issue_labels (issue_id, label_id) VALUES (?, ?)")
            .bind(issue_id)
            .bind(&label_id)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

async fn summary_response(pool: &SqlitePool, issue: Issue) -> Result<IssueResponse> {
    let labels = labels_for_issue(pool, &issue.id).await?;
    Ok(IssueResponse {
        id: issue.id,
        project_id: issue.project_id,
        title: issue.title,
        created_by: issue.created_by,
        assigned_to: issue.assigned_to,
        status: issue.status,
        priority: issue.priority,
        due_date: issue.due_date,
        labels,
        created_at: issue.created_at,
        updated_at: issue.updated_at,
    })
}

async fn detail_response(pool: &SqlitePool, issue: Issue) -> Result<IssueDetailResponse> {
    let labels = labels_for_issue(pool, &issue.id).await?;
    let comments = comments::comments_for_issue(pool, &issue.id).await?;
    Ok(IssueDetailResponse {
        id: issue.id,
        project_id: issue.project_id,
        title: issue.title,
        description: issue.description,
        created_by: issue.created_by,
        assigned_to: issue.assigned_to,
        status: issue.status,
        priority: issue.priority,
        due_date: issue.due_date,
        labels,
        comments,
        created_at: issue.created_at,
        updated_at: issue.updated_at,
    })
}

fn csv_set(param: Option<&String>) -> Option<HashSet<String>> {
    param.map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

async fn list_project_issues(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
    Query(query): Query<IssueListQuery>,
) -> Result<Json<IssueListResponse>> {
    authz::require_project_member(&state.db.pool, &user, &project_id).await?;

    let rows = sqlx::query_as::<_, Issue>(
        r#"
        SELECT id, project_id, created_by, assigned_to, title, description,
               status, priority, due_date, created_at, updated_at
        FROM issues
        WHERE project_id = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(&project_id)
    .fetch_all(&state.db.pool)
    .await?;

    let label_filter = csv_set(query.labels.as_ref());
    let assignee_filter = csv_set(query.assigned_to.as_ref());
    let creator_filter = csv_set(query.created_by.as_ref());

    let mut issues = Vec::new();
    for issue in rows {
        if let Some(filter) = &assignee_filter {
            if !filter.contains(&issue.assigned_to) {
                continue;
            }
        }
        if let Some(filter) = &creator_filter {
            if !filter.contains(&issue.created_by) {
                continue;
            }
        }

        let response = summary_response(&state.db.pool, issue).await?;
        if let Some(filter) = &label_filter {
            if !response.labels.iter().any(|l| filter.contains(&l.name)) {
                continue;
            }
        }
        issues.push(response);
    }

    Ok(Json(IssueListResponse { issues }))
}

async fn create_issue(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<CreateIssueRequest>,
) -> Result<Json<IssueDetailResponse>> {
    authz::require_project_member(&state.db.pool, &user, &project_id).await?;

    if body.title.trim().is_empty() {
        return Err(AppError::Validation("Issue title is required".to_string()));
    }

    let assignee_exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
        .bind(&body.assigned_to)
        .fetch_one(&state.db.pool)
        .await?;
    if assignee_exists == 0 {
        return Err(AppError::NotFound("Assignee not found".to_string()));
    }

    let issue_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let status = body.status.unwrap_or_default();
    let priority = body.priority.unwrap_or_default();
    let due_date = body.due_date.map(|d| d.to_string());

    let mut tx = state.db.pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO issues (id, project_id, created_by, assigned_to, title, description,
                            status, priority, due_date, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&issue_id)
    .bind(&project_id)
    .bind(&user.id)
    .bind(&body.assigned_to)
    .bind(&body.title)
    .bind(&body.description)
    .bind(status)
    .bind(priority)
    .bind(&due_date)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    if let Some(labels) = &body.labels {
        set_issue_labels(&mut tx, &issue_id, labels).await?;
    }

    tx.commit().await?;

    let issue = Issue {
        id: issue_id,
        project_id,
        created_by: user.id,
        assigned_to: body.assigned_to,
        title: body.title,
        description: body.description,
        status,
        priority,
        due_date,
        created_at: now.clone(),
        updated_at: now,
    };

    Ok(Json(detail_response(&state.db.pool, issue).await?))
}

async fn list_created_issues(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<IssueListResponse>> {
    let rows = sqlx::query_as::<_, Issue>(
        r#"
        SELECT id, project_id, created_by, assigned_to, title, description,
               status, priority, due_date, created_at, updated_at
        FROM issues
        WHERE created_by = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;

    let mut issues = Vec::new();
    for issue in rows {
        issues.push(summary_response(&state.db.pool, issue).await?);
    }

    Ok(Json(IssueListResponse { issues }))
}

async fn list_assigned_issues(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<IssueListResponse>> {
    let rows = sqlx::query_as::<_, Issue>(
        r#"
        SELECT id, project_id, created_by, assigned_to, title, description,
               status, priority, due_date, created_at, updated_at
        FROM issues
        WHERE assigned_to = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;

    let mut issues = Vec::new();
    for issue in rows {
        issues.push(summary_response(&state.db.pool, issue).await?);
    }

    Ok(Json(IssueListResponse { issues }))
}

async fn get_issue(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<IssueDetailResponse>> {
    let issue = load_issue(&state.db.pool, &id)
        .await?
        .ok_or_else(|| AppError::NotFound("Issue not found".to_string()))?;

    // Read access follows project visibility
    authz::require_project_member(&state.db.pool, &user, &issue.project_id).await?;

    Ok(Json(detail_response(&state.db.pool, issue).await?))
}

async fn update_issue(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateIssueRequest>,
) -> Result<Json<IssueDetailResponse>> {
    let mut issue = load_issue(&state.db.pool, &id)
        .await?
        .ok_or_else(|| AppError::NotFound("Issue not found".to_string()))?;

    authz::require_project_member(&state.db.pool, &user, &issue.project_id).await?;

    if !authz::can_write_issue(&user, &issue) {
        return Err(AppError::Forbidden(
            "Only the reporter can edit this issue".to_string(),
        ));
    }

    if let Some(title) = body.title {
        if title.trim().is_empty() {
            return Err(AppError::Validation("Issue title is required".to_string()));
        }
        issue.title = title;
    }
    if let Some(description) = body.description {
        issue.description = description;
    }
    if let Some(assigned_to) = body.assigned_to {
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(&assigned_to)
            .fetch_one(&state.db.pool)
            .await?;
        if exists == 0 {
            return Err(AppError::NotFound("Assignee not found".to_string()));
        }
        issue.assigned_to = assigned_to;
    }
    if let Some(status) = body.status {
        issue.status = status;
    }
    if let Some(priority) = body.priority {
        issue.priority = priority;
    }
    if let Some(due_date) = body.due_date {
        issue.due_date = Some(due_date.to_string());
    }
    issue.updated_at = Utc::now().to_rfc3339();

    let mut tx = state.db.pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE issues
        SET title = ?, description = ?, assigned_to = ?, status = ?, priority = ?,
            due_date = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&issue.title)
    .bind(&issue.description)
    .bind(&issue.assigned_to)
    .bind(issue.status)
    .bind(issue.priority)
    .bind(&issue.due_date)
    .bind(&issue.updated_at)
    .bind(&issue.id)
    .execute(&mut *tx)
    .await?;

    if let Some(labels) = &body.labels {
        set_issue_labels(&mut tx, &issue.id, labels).await?;
    }

    tx.commit().await?;

    Ok(Json(detail_response(&state.db.pool, issue).await?))
}

async fn delete_issue(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    let issue = load_issue(&state.db.pool, &id)
        .await?
        .ok_or_else(|| AppError::NotFound("Issue not found".to_string()))?;

    authz::require_project_member(&state.db.pool, &user, &issue.project_id).await?;

    if !authz::can_write_issue(&user, &issue) {
        return Err(AppError::Forbidden(
            "Only the reporter can delete this issue".to_string(),
        ));
    }

    // Cascades to comments and label associations; catalog rows persist
    sqlx::query("DELETE FROM issues WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(()))
}
