//! Estimateurs supervisés : régression linéaire, régression logistique
//! et k plus proches voisins. La forêt aléatoire vit dans [`crate::ml::tree`].
//!
//! Contrat commun : `fit(X, y)` produit un [`FittedEstimator`]
//! sérialisable, `predict_row` évalue une ligne encodée. Tout est exprimé
//! sur des `Vec<f64>` denses, la dimension venant de l'encodeur.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::infrastructure::error::{AppError, AppResult};
use crate::ml::registry::Hyperparams;
use crate::ml::tree::ForestModel;

/// Graine fixe : le découpage train/test est déterministe
pub const SPLIT_SEED: u64 = 42;

/// Pipeline ajusté, un variant par famille du registre
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FittedEstimator {
    Linear(LinearModel),
    Logistic(LogisticModel),
    Knn(KnnModel),
    RandomForest(ForestModel),
}

impl FittedEstimator {
    /// Prédit la cible pour une ligne déjà alignée sur les colonnes
    /// d'entraînement
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        match self {
            FittedEstimator::Linear(m) => m.predict_row(row),
            FittedEstimator::Logistic(m) => m.predict_row(row),
            FittedEstimator::Knn(m) => m.predict_row(row),
            FittedEstimator::RandomForest(m) => m.predict_row(row),
        }
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_row(r)).collect()
    }
}

/// Ajuste l'estimateur demandé sur la matrice encodée
pub fn fit(params: &Hyperparams, x: &[Vec<f64>], y: &[f64]) -> AppResult<FittedEstimator> {
    if x.is_empty() || x.len() != y.len() {
        return Err(AppError::Internal(
            "training matrix and target length mismatch".to_string(),
        ));
    }

    match params {
        Hyperparams::Linear { fit_intercept } => {
            Ok(FittedEstimator::Linear(LinearModel::fit(x, y, *fit_intercept)?))
        }
        Hyperparams::Logistic { c, max_iter, .. } => Ok(FittedEstimator::Logistic(
            LogisticModel::fit(x, y, *c, *max_iter)?,
        )),
        Hyperparams::Knn {
            n_neighbors,
            weights,
        } => Ok(FittedEstimator::Knn(KnnModel::fit(
            x,
            y,
            *n_neighbors,
            weights,
        )?)),
        Hyperparams::RandomForest {
            n_estimators,
            max_depth,
            min_samples_split,
            min_samples_leaf,
        } => Ok(FittedEstimator::RandomForest(ForestModel::fit(
            x,
            y,
            *n_estimators as usize,
            *max_depth as usize,
            *min_samples_split,
            *min_samples_leaf,
        )?)),
    }
}

/// Découpe (X, y) en échantillons d'entraînement et de test.
///
/// Mélange déterministe (graine fixe), taille d'entraînement arrondie
/// vers le bas comme le fait le pipeline d'origine.
#[allow(clippy::type_complexity)]
pub fn train_test_split(
    x: &[Vec<f64>],
    y: &[f64],
    train_fraction: f64,
    seed: u64,
) -> (Vec<Vec<f64>>, Vec<Vec<f64>>, Vec<f64>, Vec<f64>) {
    let n = x.len();
    let n_train = ((n as f64) * train_fraction).floor() as usize;

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let (train_idx, test_idx) = indices.split_at(n_train);
    let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<f64>) {
        (
            idx.iter().map(|&i| x[i].clone()).collect(),
            idx.iter().map(|&i| y[i]).collect(),
        )
    };
    let (x_train, y_train) = pick(train_idx);
    let (x_test, y_test) = pick(test_idx);
    (x_train, x_test, y_train, y_test)
}

// ---------------------------------------------------------------------------
// Régression linéaire (moindres carrés, équations normales)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    pub fn fit(x: &[Vec<f64>], y: &[f64], fit_intercept: bool) -> AppResult<Self> {
        let d = x[0].len();
        let offset = if fit_intercept { 1 } else { 0 };
        let width = d + offset;

        // X^T X et X^T y sur la matrice augmentée d'une colonne de 1
        let mut xtx = vec![vec![0.0; width]; width];
        let mut xty = vec![0.0; width];
        for (row, &target) in x.iter().zip(y) {
            let augmented = |j: usize| -> f64 {
                if fit_intercept {
                    if j == 0 {
                        1.0
                    } else {
                        row[j - 1]
                    }
                } else {
                    row[j]
                }
            };
            for i in 0..width {
                let xi = augmented(i);
                xty[i] += xi * target;
                for j in 0..width {
                    xtx[i][j] += xi * augmented(j);
                }
            }
        }

        let beta = solve_linear_system(xtx, xty).ok_or_else(|| {
            AppError::Internal("singular design matrix, cannot fit linear model".to_string())
        })?;

        if fit_intercept {
            Ok(Self {
                intercept: beta[0],
                coefficients: beta[1..].to_vec(),
            })
        } else {
            Ok(Self {
                intercept: 0.0,
                coefficients: beta,
            })
        }
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(c, v)| c * v)
                .sum::<f64>()
    }
}

/// Résout `a * x = b` par élimination de Gauss avec pivot partiel.
/// Retourne None si la matrice est singulière.
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        // Pivot partiel
        let pivot_row = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot_row][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    // Remontée
    let mut x = vec![0.0; n];
    for col in (0..n).rev() {
        let mut acc = b[col];
        for k in (col + 1)..n {
            acc -= a[col][k] * x[k];
        }
        x[col] = acc / a[col][col];
    }
    Some(x)
}

// ---------------------------------------------------------------------------
// Régression logistique (descente de gradient, un-contre-tous)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    classes: Vec<i64>,
    /// Un vecteur de poids par classe, biais en tête
    weights: Vec<Vec<f64>>,
    /// Standardisation apprise à l'entraînement
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl LogisticModel {
    pub fn fit(x: &[Vec<f64>], y: &[f64], c: f64, max_iter: u64) -> AppResult<Self> {
        let labels = integer_labels(y)?;
        let mut classes: Vec<i64> = labels.clone();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() < 2 {
            return Err(AppError::Internal(
                "logistic regression needs at least two classes in the label column".to_string(),
            ));
        }

        let (scaled, means, stds) = standardize(x);
        let n = scaled.len() as f64;
        let d = scaled[0].len();
        let l2 = 1.0 / c;
        let learning_rate = 0.1;

        let mut weights = Vec::with_capacity(classes.len());
        for class in &classes {
            let targets: Vec<f64> = labels
                .iter()
                .map(|l| if l == class { 1.0 } else { 0.0 })
                .collect();

            let mut w = vec![0.0; d + 1];
            for _ in 0..max_iter {
                let mut grad = vec![0.0; d + 1];
                for (row, target) in scaled.iter().zip(&targets) {
                    let p = sigmoid(w[0] + dot(&w[1..], row));
                    let delta = p - target;
                    grad[0] += delta;
                    for (g, v) in grad[1..].iter_mut().zip(row) {
                        *g += delta * v;
                    }
                }
                // Pénalité L2, biais exclu
                for (g, wi) in grad[1..].iter_mut().zip(&w[1..]) {
                    *g += l2 * wi;
                }
                for (wi, g) in w.iter_mut().zip(&grad) {
                    *wi -= learning_rate * g / n;
                }
            }
            weights.push(w);
        }

        Ok(Self {
            classes,
            weights,
            means,
            stds,
        })
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let scaled: Vec<f64> = row
            .iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(v, (m, s))| (v - m) / s)
            .collect();

        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (i, w) in self.weights.iter().enumerate() {
            let score = w[0] + dot(&w[1..], &scaled);
            if score > best_score {
                best_score = score;
                best = i;
            }
        }
        self.classes[best] as f64
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// La colonne cible d'une classification doit contenir des entiers
fn integer_labels(y: &[f64]) -> AppResult<Vec<i64>> {
    y.iter()
        .map(|v| {
            if (v - v.round()).abs() < 1e-9 {
                Ok(v.round() as i64)
            } else {
                Err(AppError::Internal(format!(
                    "logistic regression requires integer class labels, got {}",
                    v
                )))
            }
        })
        .collect()
}

/// Centre-réduit chaque colonne ; un écart type nul devient 1
fn standardize(x: &[Vec<f64>]) -> (Vec<Vec<f64>>, Vec<f64>, Vec<f64>) {
    let n = x.len() as f64;
    let d = x[0].len();
    let mut means = vec![0.0; d];
    for row in x {
        for (m, v) in means.iter_mut().zip(row) {
            *m += v;
        }
    }
    for m in &mut means {
        *m /= n;
    }

    let mut stds = vec![0.0; d];
    for row in x {
        for ((s, m), v) in stds.iter_mut().zip(&means).zip(row) {
            *s += (v - m).powi(2);
        }
    }
    for s in &mut stds {
        *s = (*s / n).sqrt();
        if *s < 1e-12 {
            *s = 1.0;
        }
    }

    let scaled = x
        .iter()
        .map(|row| {
            row.iter()
                .zip(means.iter().zip(&stds))
                .map(|(v, (m, s))| (v - m) / s)
                .collect()
        })
        .collect();
    (scaled, means, stds)
}

// ---------------------------------------------------------------------------
// k plus proches voisins
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnModel {
    k: usize,
    distance_weighted: bool,
    x: Vec<Vec<f64>>,
    y: Vec<f64>,
}

impl KnnModel {
    pub fn fit(x: &[Vec<f64>], y: &[f64], k: usize, weights: &str) -> AppResult<Self> {
        if k > x.len() {
            return Err(AppError::Internal(format!(
                "n_neighbors = {} but the training set only has {} samples",
                k,
                x.len()
            )));
        }
        Ok(Self {
            k,
            distance_weighted: weights == "distance",
            x: x.to_vec(),
            y: y.to_vec(),
        })
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut dists: Vec<(f64, f64)> = self
            .x
            .iter()
            .zip(&self.y)
            .map(|(train_row, &target)| (euclidean(train_row, row), target))
            .collect();
        dists.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let neighbors = &dists[..self.k];

        if self.distance_weighted {
            // Une distance nulle court-circuite la pondération
            let exact: Vec<f64> = neighbors
                .iter()
                .filter(|(d, _)| *d < 1e-12)
                .map(|(_, t)| *t)
                .collect();
            if !exact.is_empty() {
                return exact.iter().sum::<f64>() / exact.len() as f64;
            }
            let weight_sum: f64 = neighbors.iter().map(|(d, _)| 1.0 / d).sum();
            neighbors.iter().map(|(d, t)| t / d).sum::<f64>() / weight_sum
        } else {
            neighbors.iter().map(|(_, t)| t).sum::<f64>() / self.k as f64
        }
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = 2*x0 + 3*x1 + 5, sans bruit
    fn linear_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![i as f64, (i * i % 7) as f64])
            .collect();
        let y = x.iter().map(|r| 2.0 * r[0] + 3.0 * r[1] + 5.0).collect();
        (x, y)
    }

    #[test]
    fn test_linear_recovers_exact_coefficients() {
        let (x, y) = linear_data();
        let model = LinearModel::fit(&x, &y, true).unwrap();
        assert!((model.intercept - 5.0).abs() < 1e-8);
        assert!((model.coefficients[0] - 2.0).abs() < 1e-8);
        assert!((model.coefficients[1] - 3.0).abs() < 1e-8);
        assert!((model.predict_row(&[4.0, 2.0]) - 19.0).abs() < 1e-8);
    }

    #[test]
    fn test_linear_without_intercept() {
        let x: Vec<Vec<f64>> = (1..10).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| 4.0 * r[0]).collect();
        let model = LinearModel::fit(&x, &y, false).unwrap();
        assert_eq!(model.intercept, 0.0);
        assert!((model.coefficients[0] - 4.0).abs() < 1e-8);
    }

    #[test]
    fn test_linear_singular_matrix_fails() {
        // Deux colonnes identiques : X^T X singulière
        let x: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64, i as f64]).collect();
        let y = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        assert!(LinearModel::fit(&x, &y, false).is_err());
    }

    #[test]
    fn test_logistic_separable_classes() {
        // Deux nuages bien séparés sur la première dimension
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..10 {
            x.push(vec![i as f64 * 0.1, 1.0]);
            y.push(0.0);
            x.push(vec![10.0 + i as f64 * 0.1, 1.0]);
            y.push(1.0);
        }
        let model = LogisticModel::fit(&x, &y, 1.0, 200).unwrap();
        assert_eq!(model.predict_row(&[0.2, 1.0]), 0.0);
        assert_eq!(model.predict_row(&[10.5, 1.0]), 1.0);
    }

    #[test]
    fn test_logistic_rejects_continuous_labels() {
        let x = vec![vec![0.0], vec![1.0]];
        let y = vec![0.25, 0.75];
        assert!(LogisticModel::fit(&x, &y, 1.0, 10).is_err());
    }

    #[test]
    fn test_logistic_single_class_fails() {
        let x = vec![vec![0.0], vec![1.0]];
        let y = vec![1.0, 1.0];
        assert!(LogisticModel::fit(&x, &y, 1.0, 10).is_err());
    }

    #[test]
    fn test_knn_uniform_and_distance() {
        let x = vec![vec![0.0], vec![1.0], vec![2.0], vec![10.0]];
        let y = vec![0.0, 1.0, 2.0, 10.0];

        let uniform = KnnModel::fit(&x, &y, 2, "uniform").unwrap();
        assert!((uniform.predict_row(&[0.4]) - 0.5).abs() < 1e-9);

        let weighted = KnnModel::fit(&x, &y, 2, "distance").unwrap();
        // Correspondance exacte : la pondération est court-circuitée
        assert_eq!(weighted.predict_row(&[1.0]), 1.0);
        // Plus proche de 0 que de 1 : prédiction tirée vers 0
        assert!(weighted.predict_row(&[0.1]) < 0.5);
    }

    #[test]
    fn test_knn_k_larger_than_train_fails() {
        let x = vec![vec![0.0], vec![1.0]];
        let y = vec![0.0, 1.0];
        assert!(KnnModel::fit(&x, &y, 5, "uniform").is_err());
    }

    #[test]
    fn test_split_is_deterministic_and_sized() {
        let (x, y) = linear_data();
        let (x_train, x_test, y_train, y_test) = train_test_split(&x, &y, 0.8, SPLIT_SEED);
        assert_eq!(x_train.len(), 16);
        assert_eq!(x_test.len(), 4);
        assert_eq!(y_train.len(), 16);
        assert_eq!(y_test.len(), 4);

        let (x_train2, ..) = train_test_split(&x, &y, 0.8, SPLIT_SEED);
        assert_eq!(x_train, x_train2);
    }

    #[test]
    fn test_fit_dispatch() {
        let (x, y) = linear_data();
        let est = fit(&Hyperparams::Linear { fit_intercept: true }, &x, &y).unwrap();
        assert!(matches!(est, FittedEstimator::Linear(_)));
        let preds = est.predict(&x);
        assert_eq!(preds.len(), x.len());
    }

    #[test]
    fn test_estimator_serde_roundtrip() {
        let (x, y) = linear_data();
        let est = fit(&Hyperparams::Linear { fit_intercept: true }, &x, &y).unwrap();
        let json = serde_json::to_string(&est).unwrap();
        let back: FittedEstimator = serde_json::from_str(&json).unwrap();
        assert!((back.predict_row(&x[3]) - y[3]).abs() < 1e-8);
    }
}
