use serde::Deserialize;

use crate::infrastructure::error::AppResult;

/// Configuration complète de l'application, chargée au démarrage et
/// injectée dans l'état actix.
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub security: SecuritySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// URL sqlite, ex. `sqlite://data/trainer.db`
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Répertoire des artefacts de modèles entraînés
    pub models_dir: String,
    /// Répertoire des fichiers de métriques
    pub metrics_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecuritySettings {
    pub jwt_secret: String,
    pub jwt_exp_minutes: i64,
}

impl AppSettings {
    /// Charge la configuration depuis les fichiers `config/` puis les
    /// variables d'environnement préfixées `APP__` (ex. `APP__SERVER__PORT`).
    pub fn load() -> AppResult<Self> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let settings = config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8000_i64)?
            .set_default("server.workers", 4_i64)?
            .set_default("database.url", "sqlite://data/trainer.db")?
            .set_default("storage.models_dir", "train_models")?
            .set_default("storage.metrics_dir", "metrics")?
            .set_default("security.jwt_secret", "")?
            .set_default("security.jwt_exp_minutes", 60_i64)?
            .add_source(config::File::with_name("config/base").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let settings: AppSettings = settings.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Valide les paramètres critiques
    fn validate(&self) -> AppResult<()> {
        if self.security.jwt_secret.is_empty() {
            return Err(crate::infrastructure::error::AppError::Configuration(
                "security.jwt_secret must be set (APP__SECURITY__JWT_SECRET)".to_string(),
            ));
        }
        if self.security.jwt_secret.len() < 32 {
            tracing::warn!("JWT secret is shorter than 32 characters");
        }
        Ok(())
    }
}
