use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, PublicUser, RegisterRequest, RegisterResponse},
        error::AuthError,
        repo::User,
        services::{
            hash_password, validate_login, validate_register, verify_password, AuthUser, JwtKeys,
        },
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/profile", get(get_profile))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    let new_user = validate_register(payload)?;

    let hash = hash_password(&new_user.password)?;

    let user = match User::create(
        &state.db,
        &new_user.name,
        &new_user.email,
        &new_user.phone,
        &hash,
    )
    .await
    {
        Ok(u) => u,
        Err(AuthError::Conflict(field)) => {
            warn!(?field, "registration conflict");
            return Err(AuthError::Conflict(field));
        }
        Err(e) => return Err(e),
    };

    info!(user_id = %user.id, phone = %user.phone, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let (phone, password) = validate_login(payload)?;

    let user = match User::find_by_phone(&state.db, &phone).await? {
        Some(u) => u,
        None => {
            warn!(phone = %phone, "login unknown phone");
            return Err(AuthError::InvalidCredentials);
        }
    };

    if !verify_password(&password, &user.password_hash) {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign(user.id)?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(LoginResponse { access_token }))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AuthError> {
    let user = User::find_by_id(&state.db, user_id).await?.ok_or_else(|| {
        warn!(user_id = %user_id, "token subject has no account");
        AuthError::NotFound
    })?;

    Ok(Json(PublicUser {
        id: user.id,
        name: user.name,
        email: user.email,
        phone: user.phone,
    }))
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn profile_response_serialization() {
        let response = PublicUser {
            id: 7,
            name: "Ann".to_string(),
            email: "ann@x.com".to_string(),
            phone: "555".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("ann@x.com"));
        assert!(json.contains("\"id\":7"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn user_row_never_serializes_password_hash() {
        let user = User {
            id: 1,
            name: "Ann".to_string(),
            email: "ann@x.com".to_string(),
            phone: "555".to_string(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$abc$def".to_string(),
            created_at: time::OffsetDateTime::UNIX_EPOCH,
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("argon2id"));
    }
}
