use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    authz,
    db::models::ROLE_ADMIN,
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::auth::normalize_email,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route(
            "/:id",
            get(get_project).patch(update_project).delete(delete_project),
        )
        .route("/:id/members", get(list_members).post(add_member))
        .route(
            "/:id/members/:user_id",
            axum::routing::delete(remove_member),
        )
        .nest("/:id/issues", super::issues::project_router())
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Summary shape used in listings.
#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Detail shape; the summary fields plus the description.
#[derive(Debug, Serialize)]
pub struct ProjectDetailResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct ProjectListResponse {
    pub projects: Vec<ProjectResponse>,
}

async fn list_projects(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ProjectListResponse>> {
    // Only projects the user is a member of are visible
    let projects = sqlx::query_as::<_, (String, String, String, String, String)>(
        r#"
        SELECT p.id, p.name, p.created_by, p.created_at, p.updated_at
        FROM projects p
        JOIN project_memberships pm ON p.id = pm.project_id
        WHERE pm.user_id = ?
        ORDER BY p.updated_at DESC
        "#,
    )
    .bind(&user.id)
    .fetch_all(&state.db.pool)
    .await?;

    let projects = projects
        .into_iter()
        .map(
            |(id, name, created_by, created_at, updated_at)| ProjectResponse {
                id,
                name,
                created_by,
                created_at,
                updated_at,
            },
        )
        .collect();

    Ok(Json(ProjectListResponse { projects }))
}

async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateProjectRequest>,
) -> Result<Json<ProjectDetailResponse>> {
    if body.name.trim().is_empty() {
        return Err(AppError::Validation("Project name is required".to_string()));
    }

    let project_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    // The creator's admin membership must land together with the project;
    // a project with zero admins would be unmanageable.
    let mut tx = state.db.pool.begin().await?;

    sqlx::query(
        "INSERT INTO projects (id, name, description, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&project_id)
    .bind(&body.name)
    .bind(&body.description)
    .bind(&user.id)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO project_memberships (id, project_id, user_id, role) VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&project_id)
    .bind(&user.id)
    .bind(ROLE_ADMIN)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(ProjectDetailResponse {
        id: project_id,
        name: body.name,
        description: body.description,
        created_by: user.id,
        created_at: now.clone(),
        updated_at: now,
    }))
}

async fn get_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ProjectDetailResponse>> {
    let project = authz::require_project_member(&state.db.pool, &user, &id).await?;

    Ok(Json(ProjectDetailResponse {
        id: project.id,
        name: project.name,
        description: project.description,
        created_by: project.created_by,
        created_at: project.created_at,
        updated_at: project.updated_at,
    }))
}

async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateProjectRequest>,
) -> Result<Json<ProjectDetailResponse>> {
    let project = authz::require_project_admin(&state.db.pool, &user, &id).await?;

    let name = match body.name {
        Some(name) => {
            if name.trim().is_empty() {
                return Err(AppError::Validation("Project name is required".to_string()));
            }
            name
        }
        None => project.name,
    };
    let description = body.description.unwrap_or(project.description);
    let now = Utc::now().to_rfc3339();

    sqlx::query("UPDATE projects SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&description)
        .bind(&now)
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(ProjectDetailResponse {
        id,
        name,
        description,
        created_by: project.created_by,
        created_at: project.created_at,
        updated_at: now,
    }))
}

async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    authz::require_project_admin(&state.db.pool, &user, &id).await?;

    // Cascades to memberships, issues, and their comments
    sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    Ok(Json(()))
}

// Member types
#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub email: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct MembersListResponse {
    pub members: Vec<MemberResponse>,
}

#[derive(Debug, Deserialize)]
pub struct MemberPathParams {
    pub id: String,
    pub user_id: String,
}

async fn list_members(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<MembersListResponse>> {
    authz::require_project_member(&state.db.pool, &user, &project_id).await?;

    let members = sqlx::query_as::<_, (String, String, String, String)>(
        r#"
        SELECT u.id, u.name, u.email, pm.role
        FROM project_memberships pm
        JOIN users u ON pm.user_id = u.id
        WHERE pm.project_id = ?
        ORDER BY u.name ASC
        "#,
    )
    .bind(&project_id)
    .fetch_all(&state.db.pool)
    .await?;

    let members = members
        .into_iter()
        .map(|(user_id, user_name, user_email, role)| MemberResponse {
            user_id,
            user_name,
            user_email,
            role,
        })
        .collect();

    Ok(Json(MembersListResponse { members }))
}

async fn add_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<AddMemberRequest>,
) -> Result<Json<MemberResponse>> {
    authz::require_project_admin(&state.db.pool, &user, &project_id).await?;

    let email = normalize_email(&body.email);
    if email.is_empty() {
        return Err(AppError::Validation("Email is required".to_string()));
    }
    if body.role.trim().is_empty() {
        return Err(AppError::Validation("Role is required".to_string()));
    }

    let target_user = sqlx::query_as::<_, (String, String, String)>(
        "SELECT id, name, email FROM users WHERE email = ?",
    )
    .bind(&email)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let (target_user_id, target_user_name, target_user_email) = target_user;

    // Memberships are never updated in place; re-adding is a logic error
    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM project_memberships WHERE project_id = ? AND user_id = ?",
    )
    .bind(&project_id)
    .bind(&target_user_id)
    .fetch_one(&state.db.pool)
    .await?;

    if exists > 0 {
        return Err(AppError::Validation(
            "User is already a member of this project".to_string(),
        ));
    }

    sqlx::query(
        "INSERT INTO project_memberships (id, project_id, user_id, role) VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&project_id)
    .bind(&target_user_id)
    .bind(&body.role)
    .execute(&state.db.pool)
    .await?;

    Ok(Json(MemberResponse {
        user_id: target_user_id,
        user_name: target_user_name,
        user_email: target_user_email,
        role: body.role,
    }))
}

async fn remove_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(params): Path<MemberPathParams>,
) -> Result<Json<()>> {
    authz::require_project_admin(&state.db.pool, &user, &params.id).await?;

    let result = sqlx::query("DELETE FROM project_memberships WHERE project_id = ? AND user_id = ?")
        .bind(&params.id)
        .bind(&params.user_id)
        .execute(&state.db.pool)
        .await?;

    // Removing an absent membership is an error, never a silent no-op
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Membership not found".to_string()));
    }

    Ok(Json(()))
}
