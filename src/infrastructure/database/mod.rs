pub mod models;
pub mod tokens;
pub mod users;

pub use models::ModelRepository;
pub use tokens::TokenLedger;
pub use users::UserRepository;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Error as SqlxError;
use tracing::info;

/// Gestion de la connexion à la base de données
#[derive(Debug, Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    /// Ouvre (et crée au besoin) la base SQLite
    pub async fn connect(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connexion à la base de données: {}", database_url);

        // Le fichier est créé à la demande, mais pas son répertoire parent
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    let _ = std::fs::create_dir_all(parent);
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Crée les tables au démarrage si elles n'existent pas
    pub async fn init_schema(&self) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ml_user (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                pwd TEXT NOT NULL,
                tokens INTEGER NOT NULL DEFAULT 0 CHECK (tokens >= 0),
                is_admin INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ml_model (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES ml_user(id) ON DELETE CASCADE,
                model_name TEXT NOT NULL,
                model_type TEXT NOT NULL,
                file_path TEXT NOT NULL,
                feature_cols TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (user_id, model_name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Tables de la base vérifiées/créées");
        Ok(())
    }
}
