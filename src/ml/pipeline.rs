use serde::{Deserialize, Serialize};

use crate::infrastructure::error::AppResult;
use crate::ml::encoder;
use crate::ml::estimator::FittedEstimator;

/// Pipeline ajusté : l'état de l'encodeur (ordre exact des colonnes
/// d'entraînement) et l'estimateur. C'est l'objet sérialisé dans
/// l'artefact sur disque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedPipeline {
    pub model_type: String,
    pub trained_columns: Vec<String>,
    pub estimator: FittedEstimator,
}

impl FittedPipeline {
    /// Aligne une ligne d'entrée sur les colonnes d'entraînement puis
    /// prédit. Une modalité jamais vue est remplie à zéro, jamais une
    /// erreur.
    pub fn predict(
        &self,
        features: &serde_json::Map<String, serde_json::Value>,
    ) -> AppResult<f64> {
        let row = encoder::transform(features, &self.trained_columns);
        Ok(self.estimator.predict_row(&row))
    }
}
