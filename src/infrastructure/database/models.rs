use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::domain::model::ModelRecord;
use crate::infrastructure::error::AppResult;

/// Repository des métadonnées de modèles. Toutes les lectures et
/// suppressions sont restreintes à l'utilisateur propriétaire.
#[derive(Debug, Clone)]
pub struct ModelRepository {
    pool: SqlitePool,
}

impl ModelRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insère l'enregistrement d'un modèle.
    ///
    /// Retourne `Ok(None)` si (user_id, model_name) existe déjà, le cas
    /// attendu "nom déjà pris", distinct d'une panne de stockage.
    pub async fn insert(
        &self,
        user_id: i64,
        model_name: &str,
        model_type: &str,
        file_path: &str,
        feature_cols_json: &str,
    ) -> AppResult<Option<i64>> {
        let result = sqlx::query(
            "INSERT INTO ml_model (user_id, model_name, model_type, file_path, feature_cols, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(user_id)
        .bind(model_name)
        .bind(model_type)
        .bind(file_path)
        .bind(feature_cols_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(r) => {
                info!("Model record created: {} (user {})", model_name, user_id);
                Ok(Some(r.last_insert_rowid()))
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                warn!("Model name {} already exists for user {}", model_name, user_id);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cherche un modèle par nom, restreint au propriétaire
    pub async fn find(&self, user_id: i64, model_name: &str) -> AppResult<Option<ModelRecord>> {
        let record = sqlx::query_as::<_, ModelRecord>(
            "SELECT id, user_id, model_name, model_type, file_path, feature_cols, created_at \
             FROM ml_model WHERE user_id = ?1 AND model_name = ?2",
        )
        .bind(user_id)
        .bind(model_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Tous les modèles d'un utilisateur, les plus récents d'abord
    pub async fn list(&self, user_id: i64) -> AppResult<Vec<ModelRecord>> {
        let records = sqlx::query_as::<_, ModelRecord>(
            "SELECT id, user_id, model_name, model_type, file_path, feature_cols, created_at \
             FROM ml_model WHERE user_id = ?1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Supprime un enregistrement. `false` si absent pour cet utilisateur.
    pub async fn delete(&self, user_id: i64, model_name: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM ml_model WHERE user_id = ?1 AND model_name = ?2")
            .bind(user_id)
            .bind(model_name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::{Database, UserRepository};

    async fn setup() -> (Database, i64, i64, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.db").display());
        let db = Database::connect(&url).await.unwrap();
        db.init_schema().await.unwrap();

        let users = UserRepository::new(db.pool.clone());
        let alice = users
            .create("alice@example.com", "aaaa", 15, false)
            .await
            .unwrap()
            .unwrap();
        let bob = users
            .create("bob@example.com", "aaaa", 15, false)
            .await
            .unwrap()
            .unwrap();
        (db, alice.id, bob.id, dir)
    }

    #[tokio::test]
    async fn test_insert_find_list_delete() {
        let (db, alice, _bob, _dir) = setup().await;
        let repo = ModelRepository::new(db.pool.clone());

        let id = repo
            .insert(alice, "m1", "linear", "/tmp/m1.model.json", r#"["a"]"#)
            .await
            .unwrap();
        assert!(id.is_some());

        let record = repo.find(alice, "m1").await.unwrap().unwrap();
        assert_eq!(record.model_type, "linear");
        assert_eq!(record.feature_cols_list(), vec!["a"]);

        assert_eq!(repo.list(alice).await.unwrap().len(), 1);

        assert!(repo.delete(alice, "m1").await.unwrap());
        assert!(repo.find(alice, "m1").await.unwrap().is_none());
        assert!(!repo.delete(alice, "m1").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_name_returns_none() {
        let (db, alice, bob, _dir) = setup().await;
        let repo = ModelRepository::new(db.pool.clone());

        repo.insert(alice, "m1", "linear", "p", "[]").await.unwrap().unwrap();
        let dup = repo.insert(alice, "m1", "knn", "p2", "[]").await.unwrap();
        assert!(dup.is_none());

        // Même nom chez un autre utilisateur : autorisé
        let other = repo.insert(bob, "m1", "knn", "p3", "[]").await.unwrap();
        assert!(other.is_some());
    }

    #[tokio::test]
    async fn test_lookup_is_owner_scoped() {
        let (db, alice, bob, _dir) = setup().await;
        let repo = ModelRepository::new(db.pool.clone());

        repo.insert(alice, "private", "linear", "p", "[]").await.unwrap();

        // Le modèle d'Alice est invisible pour Bob
        assert!(repo.find(bob, "private").await.unwrap().is_none());
        assert!(!repo.delete(bob, "private").await.unwrap());
        assert!(repo.find(alice, "private").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_user_delete_cascades() {
        let (db, alice, _bob, _dir) = setup().await;
        let models = ModelRepository::new(db.pool.clone());
        let users = UserRepository::new(db.pool.clone());

        models.insert(alice, "m1", "linear", "p", "[]").await.unwrap();
        models.insert(alice, "m2", "knn", "p2", "[]").await.unwrap();

        users.delete_by_id(alice).await.unwrap();
        assert!(models.list(alice).await.unwrap().is_empty());
    }
}
