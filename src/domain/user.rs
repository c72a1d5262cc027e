use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Solde initial accordé à la création d'un compte
pub const INITIAL_TOKENS: i64 = 15;

/// Représente un utilisateur du système
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    /// Identifiant unique de l'utilisateur
    pub id: i64,
    /// Email de l'utilisateur (unique)
    pub email: String,
    /// Hash Argon2 du mot de passe (jamais exposé dans les APIs)
    #[serde(skip_serializing)]
    pub pwd: String,
    /// Solde de tokens (invariant : jamais négatif)
    pub tokens: i64,
    /// Droits d'administration
    pub is_admin: bool,
    /// Date de création du compte
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Hash un mot de passe avec Argon2
    pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
        let argon2 = Argon2::default();
        let salt = SaltString::generate(&mut OsRng);
        Ok(argon2.hash_password(password.as_bytes(), &salt)?.to_string())
    }

    /// Vérifie si un mot de passe correspond au hash stocké
    pub fn verify_password(&self, password: &str) -> bool {
        match PasswordHash::new(&self.pwd) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}
