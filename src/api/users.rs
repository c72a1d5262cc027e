use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use validator::Validate;

use crate::api::extractors::AuthUser;
use crate::core::auth::create_jwt;
use crate::domain::user::INITIAL_TOKENS;
use crate::infrastructure::error::{AppError, AppResult};
use crate::state::AppState;

/// Requête pour l'inscription
#[derive(Debug, Deserialize, Validate)]
pub struct UserCreateRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 4, message = "Password must contain at least 4 characters"))]
    pub pwd: String,
}

/// Requête pour la connexion
#[derive(Debug, Deserialize)]
pub struct UserLoginRequest {
    pub email: String,
    pub pwd: String,
}

/// Inscription : crée l'utilisateur avec le solde initial de tokens
#[post("/user/create")]
pub async fn user_create(
    payload: web::Json<UserCreateRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    payload.validate()?;

    let created = state
        .users()
        .create(&payload.email, &payload.pwd, INITIAL_TOKENS, false)
        .await?;

    match created {
        Some(_) => Ok(HttpResponse::Created().json(serde_json::json!({ "status": "OK" }))),
        None => Err(AppError::AlreadyExists("User".to_string())),
    }
}

/// Connexion : retourne un bearer token
#[post("/user/login")]
pub async fn user_login(
    payload: web::Json<UserLoginRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let user = state
        .users()
        .authenticate(&payload.email, &payload.pwd)
        .await?;

    let access_token = create_jwt(
        &user.email,
        &state.settings.security.jwt_secret,
        state.settings.security.jwt_exp_minutes,
    )?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "access_token": access_token,
        "token_type": "bearer"
    })))
}

/// Solde de tokens de l'utilisateur courant
#[get("/user/tokens")]
pub async fn user_tokens(user: AuthUser) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "username": user.0.email,
        "tokens": user.0.tokens
    })))
}
