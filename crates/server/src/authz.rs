//! Admission decisions for project, issue, and comment actions.
//!
//! The predicates here are pure functions over already-loaded membership and
//! ownership state; they never touch the database. The `require_*` helpers
//! load that state and map denials onto the error taxonomy: a project the
//! requester cannot see yields `NotFound` (its existence is not leaked),
//! while an action on a visible resource without sufficient rights yields
//! `Forbidden`.

use sqlx::SqlitePool;

use crate::{
    db::models::{Comment, Issue, Project, ProjectMembership, ROLE_ADMIN},
    error::{AppError, Result},
    middleware::auth::AuthUser,
};

/// A user can see a project iff they hold a membership in it.
pub fn can_view_project(membership: Option<&ProjectMembership>) -> bool {
    membership.is_some()
}

/// Listing members requires nothing beyond project visibility.
pub fn can_list_members(membership: Option<&ProjectMembership>) -> bool {
    can_view_project(membership)
}

/// Adding or removing members requires the admin role. A missing membership
/// is treated the same as a non-admin role: deny, not error.
pub fn can_mutate_membership(membership: Option<&ProjectMembership>) -> bool {
    membership.is_some_and(|m| m.role == ROLE_ADMIN)
}

/// Only the reporter of an issue may mutate it. Assignees and other project
/// members get read access through project visibility alone.
pub fn can_write_issue(user: &AuthUser, issue: &Issue) -> bool {
    user.id == issue.created_by
}

/// Only the author of a comment may rewrite it.
pub fn can_write_comment(user: &AuthUser, comment: &Comment) -> bool {
    user.id == comment.created_by
}

pub async fn membership_for(
    pool: &SqlitePool,
    user_id: &str,
    project_id: &str,
) -> Result<Option<ProjectMembership>> {
    let membership = sqlx::query_as::<_, ProjectMembership>(
        "SELECT id, project_id, user_id, role FROM project_memberships WHERE project_id = ? AND user_id = ?",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(membership)
}

async fn load_project(pool: &SqlitePool, project_id: &str) -> Result<Option<Project>> {
    let project = sqlx::query_as::<_, Project>(
        "SELECT id, name, description, created_by, created_at, updated_at FROM projects WHERE id = ?",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?;

    Ok(project)
}

/// Resolve the project, failing with `NotFound` both when it does not exist
/// and when the requester is not a member.
pub async fn require_project_member(
    pool: &SqlitePool,
    user: &AuthUser,
    project_id: &str,
) -> Result<Project> {
    let project = load_project(pool, project_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;

    let membership = membership_for(pool, &user.id, project_id).await?;
    if !can_view_project(membership.as_ref()) {
        return Err(AppError::NotFound("Project not found".to_string()));
    }

    Ok(project)
}

/// Resolve the project, failing with `NotFound` when it does not exist and
/// `Forbidden` when the requester is not one of its admins.
pub async fn require_project_admin(
    pool: &SqlitePool,
    user: &AuthUser,
    project_id: &str,
) -> Result<Project> {
    let project = load_project(pool, project_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;

    let membership = membership_for(pool, &user.id, project_id).await?;
    if !can_mutate_membership(membership.as_ref()) {
        return Err(AppError::Forbidden(
            "Admin role required for this project".to_string(),
        ));
    }

    Ok(project)
}
