use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::infrastructure::error::{AppError, AppResult};

/// Claims portées par les tokens d'accès
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Email de l'utilisateur
    pub sub: String,
    /// Expiration (timestamp Unix)
    pub exp: i64,
}

/// Crée un token d'accès signé HS256 pour un email
pub fn create_jwt(email: &str, secret: &str, expires_minutes: i64) -> AppResult<String> {
    let claims = JwtClaims {
        sub: email.to_string(),
        exp: (Utc::now() + Duration::minutes(expires_minutes)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("JWT encoding failed: {}", e)))
}

/// Décode un token et retourne l'email (claim `sub`).
/// Token invalide ou expiré : 401.
pub fn decode_jwt(token: &str, secret: &str) -> AppResult<String> {
    let data = decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::Unauthorized("Token expired".to_string())
        }
        _ => AppError::Unauthorized("Invalid token".to_string()),
    })?;
    Ok(data.claims.sub)
}
