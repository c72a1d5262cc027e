//! Solde de tokens par utilisateur.
//!
//! Le débit est une unique mise à jour conditionnelle : la vérification
//! du solde et la soustraction forment une seule instruction SQL. Deux
//! débits concurrents sur le même compte ne peuvent donc jamais le faire
//! passer en négatif, là où un lire-comparer-écrire en plusieurs requêtes le
//! pourrait.

use sqlx::SqlitePool;
use tracing::info;

use crate::infrastructure::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct TokenLedger {
    pool: SqlitePool,
}

impl TokenLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Vérifie et débite `amount` tokens en une opération atomique.
    ///
    /// Retourne le solde après débit. Échoue avec `InsufficientTokens`
    /// (solde inchangé) si le compte ne couvre pas le montant, ou
    /// `NotFound` si le compte n'existe pas.
    pub async fn check_and_debit(&self, user_id: i64, amount: i64) -> AppResult<i64> {
        let result = sqlx::query(
            "UPDATE ml_user SET tokens = tokens - ?1 WHERE id = ?2 AND tokens >= ?1",
        )
        .bind(amount)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.balance(user_id).await? {
                Some(available) => Err(AppError::InsufficientTokens {
                    required: amount,
                    available,
                }),
                None => Err(AppError::NotFound("User".to_string())),
            };
        }

        let balance = self.balance(user_id).await?.ok_or_else(|| {
            AppError::Internal("account deleted while debiting".to_string())
        })?;
        info!(user_id, amount, balance, "tokens debited");
        Ok(balance)
    }

    /// Re-crédite un débit précédent après un échec en aval.
    ///
    /// L'appelant traite un échec de remboursement comme un événement à
    /// journaliser, pas à propager : l'erreur d'origine prime.
    pub async fn refund(&self, user_id: i64, amount: i64) -> AppResult<()> {
        let result = sqlx::query("UPDATE ml_user SET tokens = tokens + ?1 WHERE id = ?2")
            .bind(amount)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User".to_string()));
        }
        info!(user_id, amount, "tokens refunded");
        Ok(())
    }

    /// Crédite un compte par email (action admin). `false` si absent.
    pub async fn grant_by_email(&self, email: &str, amount: i64) -> AppResult<bool> {
        let result = sqlx::query("UPDATE ml_user SET tokens = tokens + ?1 WHERE email = ?2")
            .bind(amount)
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Solde courant, None si le compte n'existe pas
    pub async fn balance(&self, user_id: i64) -> AppResult<Option<i64>> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT tokens FROM ml_user WHERE id = ?1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(balance)
    }
}
