//! Extracteurs d'authentification : résolvent l'en-tête `Authorization`
//! en utilisateur chargé depuis la base.

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;

use crate::core::auth::decode_jwt;
use crate::domain::user::User;
use crate::infrastructure::error::AppError;
use crate::state::AppState;

/// Utilisateur authentifié par bearer token
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

async fn resolve_user(req: HttpRequest) -> Result<User, AppError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .cloned()
        .ok_or_else(|| AppError::Internal("application state not configured".to_string()))?;

    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::Unauthorized("Missing or invalid Authorization header".to_string())
        })?;

    let token = header_value.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::Unauthorized("Missing or invalid Authorization header".to_string())
    })?;

    let email = decode_jwt(token, &state.settings.security.jwt_secret)?;

    state
        .users()
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unknown user".to_string()))
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { resolve_user(req).await.map(AuthUser) })
    }
}

/// Utilisateur authentifié disposant des droits d'administration
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl FromRequest for AdminUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let user = resolve_user(req).await?;
            if !user.is_admin {
                return Err(AppError::Forbidden("Admin privileges required".to_string()));
            }
            Ok(AdminUser(user))
        })
    }
}
