use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;

/// Type de résultat standard pour l'application
pub type AppResult<T> = Result<T, AppError>;

/// Erreurs principales de l'application
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Requête invalide : colonne absente, fraction hors bornes, CSV vide,
    /// valeurs manquantes, nom de modèle interdit... (400 Bad Request)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Type de modèle non enregistré (400 Bad Request)
    #[error("Model type '{0}' not recognized")]
    UnknownModelKind(String),

    /// Hyperparamètre inconnu ou de mauvais type (400 Bad Request)
    #[error("Invalid model parameter: {0}")]
    InvalidParameter(String),

    /// Ressource déjà existante : email ou nom de modèle pris (400 Bad Request)
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Erreur d'authentification (401 Unauthorized)
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Solde de tokens insuffisant (402 Payment Required)
    #[error("Insufficient tokens: required {required}, available {available}")]
    InsufficientTokens { required: i64, available: i64 },

    /// Permissions insuffisantes (403 Forbidden)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Ressource non trouvée, ou appartenant à un autre utilisateur,
    /// volontairement indiscernable (404 Not Found)
    #[error("{0} not found")]
    NotFound(String),

    /// Fichier trop volumineux (413 Payload Too Large)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Erreur de base de données (500 Internal Server Error)
    #[error("Database error: {0}")]
    Database(SqlxError),

    /// Erreur de sérialisation/désérialisation (500 Internal Server Error)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Erreur de configuration (500 Internal Server Error)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Erreur interne (entraînement, stockage, tâche bloquante...) (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convertit l'erreur en code HTTP approprié
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::UnknownModelKind(_)
            | AppError::InvalidParameter(_)
            | AppError::AlreadyExists(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::InsufficientTokens { .. } => StatusCode::PAYMENT_REQUIRED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Database(_)
            | AppError::Serialization(_)
            | AppError::Configuration(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message destiné au client. Les erreurs internes ne divulguent pas
    /// leur cause exacte.
    pub fn detail(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Serialization(_) | AppError::Configuration(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Structure de réponse d'erreur standardisée
#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    available: Option<i64>,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        let (required, available) = match self {
            AppError::InsufficientTokens {
                required,
                available,
            } => (Some(*required), Some(*available)),
            _ => (None, None),
        };

        let body = ErrorResponse {
            detail: self.detail(),
            code: self.status_code().as_u16(),
            required,
            available,
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

// Implémentations From pour les conversions automatiques

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match &error {
            SqlxError::RowNotFound => AppError::NotFound("Resource".to_string()),
            _ => AppError::Database(error),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", error))
    }
}

impl From<actix_web::error::BlockingError> for AppError {
    fn from(error: actix_web::error::BlockingError) -> Self {
        AppError::Internal(format!("Blocking task error: {}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Configuration(error.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |err| match err.message.as_ref() {
                    Some(msg) => msg.to_string(),
                    None => format!("invalid value for '{}'", field),
                })
            })
            .collect();
        AppError::Validation(messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InsufficientTokens {
                required: 5,
                available: 2
            }
            .status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            AppError::NotFound("Model".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_is_opaque() {
        let err = AppError::Database(SqlxError::PoolClosed);
        assert_eq!(err.detail(), "Internal server error");
    }

    #[test]
    fn test_insufficient_tokens_detail() {
        let err = AppError::InsufficientTokens {
            required: 5,
            available: 2,
        };
        assert!(err.detail().contains("required 5"));
        assert!(err.detail().contains("available 2"));
    }
}
