use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::domain::user::User;
use crate::infrastructure::error::{AppError, AppResult};

/// Repository pour les opérations sur les utilisateurs
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Crée un nouvel utilisateur avec mot de passe hashé et solde initial.
    ///
    /// Retourne `Ok(None)` si l'email est déjà pris : cas attendu, jamais
    /// une erreur.
    pub async fn create(
        &self,
        email: &str,
        password: &str,
        initial_tokens: i64,
        is_admin: bool,
    ) -> AppResult<Option<User>> {
        let pwd_hashed = User::hash_password(password)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        let result = sqlx::query(
            "INSERT INTO ml_user (email, pwd, tokens, is_admin, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(email)
        .bind(&pwd_hashed)
        .bind(initial_tokens)
        .bind(is_admin)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(r) => r,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                warn!("User {} already exists", email);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let user = self
            .find_by_id(result.last_insert_rowid())
            .await?
            .ok_or_else(|| AppError::Internal("user vanished right after insert".to_string()))?;

        info!("Created user {} with ID {}", email, user.id);
        Ok(Some(user))
    }

    pub async fn find_by_id(&self, user_id: i64) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, pwd, tokens, is_admin, created_at FROM ml_user WHERE id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, pwd, tokens, is_admin, created_at FROM ml_user WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Valide les identifiants d'un utilisateur.
    /// Échec d'authentification et compte inconnu sont indiscernables.
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<User> {
        let user = self.find_by_email(email).await?;
        match user {
            Some(user) if user.verify_password(password) => {
                info!("User {} authenticated successfully", email);
                Ok(user)
            }
            _ => {
                warn!("Authentication failed for {}", email);
                Err(AppError::Unauthorized("Invalid credentials".to_string()))
            }
        }
    }

    /// Liste les utilisateurs, avec filtre optionnel sur le solde minimum
    pub async fn list(&self, min_tokens: Option<i64>) -> AppResult<Vec<User>> {
        let users = match min_tokens {
            Some(min) => {
                sqlx::query_as::<_, User>(
                    "SELECT id, email, pwd, tokens, is_admin, created_at FROM ml_user \
                     WHERE tokens >= ?1 ORDER BY id",
                )
                .bind(min)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, User>(
                    "SELECT id, email, pwd, tokens, is_admin, created_at FROM ml_user ORDER BY id",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(users)
    }

    /// Remplace le mot de passe d'un utilisateur. `false` si absent.
    pub async fn update_password(&self, email: &str, new_password: &str) -> AppResult<bool> {
        let pwd_hashed = User::hash_password(new_password)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        let result = sqlx::query("UPDATE ml_user SET pwd = ?1 WHERE email = ?2")
            .bind(&pwd_hashed)
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Supprime un utilisateur ; la contrainte de clé étrangère supprime
    /// ses enregistrements de modèles en cascade
    pub async fn delete_by_id(&self, user_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM ml_user WHERE id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected() > 0;
        if deleted {
            info!("Deleted user with ID {}", user_id);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::INITIAL_TOKENS;
    use crate::infrastructure::database::Database;

    async fn setup() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.db").display());
        let db = Database::connect(&url).await.unwrap();
        db.init_schema().await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn test_create_and_authenticate() {
        let (db, _dir) = setup().await;
        let repo = UserRepository::new(db.pool.clone());

        let user = repo
            .create("test@example.com", "s3cret", INITIAL_TOKENS, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.email, "test@example.com");
        assert_eq!(user.tokens, 15);
        assert!(!user.is_admin);

        let authed = repo.authenticate("test@example.com", "s3cret").await.unwrap();
        assert_eq!(authed.id, user.id);

        let bad = repo.authenticate("test@example.com", "wrong").await;
        assert!(matches!(bad.unwrap_err(), AppError::Unauthorized(_)));
        let unknown = repo.authenticate("ghost@example.com", "s3cret").await;
        assert!(matches!(unknown.unwrap_err(), AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_duplicate_email_returns_none() {
        let (db, _dir) = setup().await;
        let repo = UserRepository::new(db.pool.clone());

        repo.create("dup@example.com", "aaaa", 15, false)
            .await
            .unwrap()
            .unwrap();
        let second = repo.create("dup@example.com", "bbbb", 15, false).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_list_with_min_tokens_filter() {
        let (db, _dir) = setup().await;
        let repo = UserRepository::new(db.pool.clone());

        repo.create("poor@example.com", "aaaa", 2, false).await.unwrap();
        repo.create("rich@example.com", "aaaa", 50, false).await.unwrap();

        assert_eq!(repo.list(None).await.unwrap().len(), 2);
        let rich = repo.list(Some(10)).await.unwrap();
        assert_eq!(rich.len(), 1);
        assert_eq!(rich[0].email, "rich@example.com");
    }

    #[tokio::test]
    async fn test_update_password() {
        let (db, _dir) = setup().await;
        let repo = UserRepository::new(db.pool.clone());

        repo.create("u@example.com", "old1", 15, false).await.unwrap();
        assert!(repo.update_password("u@example.com", "new1").await.unwrap());
        assert!(repo.authenticate("u@example.com", "new1").await.is_ok());
        assert!(repo.authenticate("u@example.com", "old1").await.is_err());

        assert!(!repo.update_password("ghost@example.com", "x").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_user() {
        let (db, _dir) = setup().await;
        let repo = UserRepository::new(db.pool.clone());

        let user = repo
            .create("gone@example.com", "aaaa", 15, false)
            .await
            .unwrap()
            .unwrap();
        assert!(repo.delete_by_id(user.id).await.unwrap());
        assert!(repo.find_by_id(user.id).await.unwrap().is_none());
        assert!(!repo.delete_by_id(user.id).await.unwrap());
    }
}
