use crate::auth::{hash_password, verify_password};
use crate::error::{ServerError, ServerResult};
use crate::routes::ApiResponse;
use crate::state::ServerState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use store::{NewUser, StoreError, User};
use transform::ValidationErrors;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Body of both register and login.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Credentials {
    /// Returns `(username, password)` or every violated rule.
    pub fn validate(self) -> Result<(String, String), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let username = self.username.unwrap_or_default();
        let password = self.password.unwrap_or_default();

        if username.chars().count() < MIN_USERNAME_LEN {
            errors.push("username", "Username must be at least 3 characters long");
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            errors.push("password", "Password must be at least 6 characters long");
        }
        errors.into_result((username, password))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
}

fn credentials(body: Result<Json<Credentials>, JsonRejection>) -> ServerResult<(String, String)> {
    let Json(body) = body.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    Ok(body.validate()?)
}

/// Hash a password off the async runtime.
async fn hash_blocking(password: String) -> ServerResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServerError::Internal(format!("hashing task failed: {e}")))?
}

/// `POST /api/v1/auth/register`
pub async fn register(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> ServerResult<impl IntoResponse> {
    let (username, password) = credentials(body)?;

    if state.users.find_by_username(&username).await?.is_some() {
        return Err(ServerError::Conflict("User already exists".to_string()));
    }

    let password_hash = hash_blocking(password).await?;
    let user = state
        .users
        .create(NewUser {
            username,
            password_hash,
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => ServerError::Conflict("User already exists".to_string()),
            other => ServerError::Storage(other),
        })?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("User created", user)),
    ))
}

/// `POST /api/v1/auth/login`
pub async fn login(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> ServerResult<impl IntoResponse> {
    let (username, password) = credentials(body)?;

    let user = state
        .users
        .find_by_username(&username)
        .await?
        .ok_or_else(|| ServerError::NotFound("This user does not exist".to_string()))?;

    let stored_hash = user.password_hash.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| ServerError::Internal(format!("verification task failed: {e}")))?;
    if !valid {
        return Err(ServerError::BadRequest("Invalid password".to_string()));
    }

    let token = state.tokens.issue(&user)?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(ApiResponse::ok(
        "User logged in",
        LoginResponse { user, token },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_report_every_short_field() {
        let errors = Credentials {
            username: Some("ab".into()),
            password: None,
        }
        .validate()
        .unwrap_err();
        assert_eq!(
            errors.messages_for("username"),
            vec!["Username must be at least 3 characters long"]
        );
        assert_eq!(
            errors.messages_for("password"),
            vec!["Password must be at least 6 characters long"]
        );
    }

    #[test]
    fn minimum_lengths_pass() {
        let ok = Credentials {
            username: Some("bob".into()),
            password: Some("secret".into()),
        }
        .validate()
        .unwrap();
        assert_eq!(ok, ("bob".to_string(), "secret".to_string()));
    }
}
