use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    middleware::auth::AuthUser,
    routes::auth::{hash_password, normalize_email, validate_password},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/me", get(get_me).patch(update_me))
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub is_staff: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

async fn get_me(user: AuthUser) -> Result<Json<ProfileResponse>> {
    Ok(Json(ProfileResponse {
        id: user.id,
        email: user.email,
        name: user.name,
        is_staff: user.is_staff,
    }))
}

async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>> {
    let mut name = user.name.clone();
    let mut email = user.email.clone();

    if let Some(new_name) = body.name {
        if new_name.trim().is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }
        name = new_name;
    }

    if let Some(new_email) = body.email {
        let new_email = normalize_email(&new_email);
        if new_email.is_empty() || !new_email.contains('@') {
            return Err(AppError::Validation("Invalid email address".to_string()));
        }
        if new_email != user.email {
            let taken = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM users WHERE email = ? AND id != ?",
            )
            .bind(&new_email)
            .bind(&user.id)
            .fetch_one(&state.db.pool)
            .await?;

            if taken > 0 {
                return Err(AppError::Validation("Email already registered".to_string()));
            }
        }
        email = new_email;
    }

    // Every field must validate before anything is written
    let password_hash = match body.password {
        Some(password) => {
            validate_password(&password)?;
            Some(hash_password(&password)?)
        }
        None => None,
    };

    sqlx::query("UPDATE users SET name = ?, email = ? WHERE id = ?")
        .bind(&name)
        .bind(&email)
        .bind(&user.id)
        .execute(&state.db.pool)
        .await?;

    if let Some(password_hash) = password_hash {
        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(&password_hash)
            .bind(&user.id)
            .execute(&state.db.pool)
            .await?;
    }

    Ok(Json(ProfileResponse {
        id: user.id,
        email,
        name,
        is_staff: user.is_staff,
    }))
}
