use serde::{Deserialize, Serialize};

/// Métriques d'évaluation calculées sur l'échantillon de test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub r2_score: f64,
    pub mean_squared_error: f64,
    pub mean_absolute_error: f64,
}

/// Évalue les prédictions contre les valeurs observées.
///
/// Les deux tranches doivent avoir la même longueur non nulle.
pub fn evaluate(y_true: &[f64], y_pred: &[f64]) -> RegressionMetrics {
    debug_assert_eq!(y_true.len(), y_pred.len());
    let n = y_true.len() as f64;

    let mean = y_true.iter().sum::<f64>() / n;
    let ss_tot: f64 = y_true.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(y, p)| (y - p).powi(2))
        .sum();

    // Cible constante : R² vaut 1 pour une prédiction parfaite, 0 sinon
    let r2_score = if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    };

    let mean_squared_error = ss_res / n;
    let mean_absolute_error = y_true
        .iter()
        .zip(y_pred)
        .map(|(y, p)| (y - p).abs())
        .sum::<f64>()
        / n;

    RegressionMetrics {
        r2_score,
        mean_squared_error,
        mean_absolute_error,
    }
}
