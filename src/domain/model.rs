use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::ml::metrics::RegressionMetrics;

/// Enregistrement relationnel d'un modèle entraîné. L'artefact lui-même
/// vit sur disque au chemin `file_path`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ModelRecord {
    pub id: i64,
    pub user_id: i64,
    /// Nom du modèle, unique par utilisateur
    pub model_name: String,
    pub model_type: String,
    pub file_path: String,
    /// Liste JSON des colonnes d'entraînement (ordre exact)
    pub feature_cols: String,
    pub created_at: DateTime<Utc>,
}

impl ModelRecord {
    /// Désérialise la liste des colonnes d'entraînement
    pub fn feature_cols_list(&self) -> Vec<String> {
        serde_json::from_str(&self.feature_cols).unwrap_or_default()
    }
}

/// Requête d'entraînement, déjà extraite du multipart mais pas encore
/// validée. Transiente, jamais persistée.
#[derive(Debug, Clone)]
pub struct TrainingSpec {
    pub model_type: String,
    pub feature_cols: Vec<String>,
    pub label_col: String,
    pub train_percentage: f64,
    pub optional_params: serde_json::Map<String, serde_json::Value>,
    /// Nom choisi par l'appelant ; généré automatiquement sinon
    pub model_filename: Option<String>,
}

/// Résultat d'un entraînement réussi
#[derive(Debug, Clone, Serialize)]
pub struct TrainOutcome {
    pub model_name: String,
    pub metrics: RegressionMetrics,
    pub tokens_deducted: i64,
    pub file_path: String,
}

/// Résultat d'une prédiction réussie
#[derive(Debug, Clone, Serialize)]
pub struct PredictionOutcome {
    pub prediction: f64,
    pub tokens_deducted: i64,
}
