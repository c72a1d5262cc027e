//! Forêt aléatoire de régression : arbres CART à réduction de variance,
//! agrégés par bagging sur échantillons bootstrap. Graine fixe, le
//! même entraînement produit la même forêt.

use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::infrastructure::error::{AppError, AppResult};

const FOREST_SEED: u64 = 42;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: &[f64]) -> f64 {
        match self {
            Node::Leaf { value } => *value,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }
}

/// Contraintes d'arrêt d'un arbre
#[derive(Debug, Clone, Copy)]
struct TreeLimits {
    /// 0 = illimitée
    max_depth: usize,
    min_samples_split: usize,
    min_samples_leaf: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestModel {
    trees: Vec<Node>,
}

impl ForestModel {
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        n_trees: usize,
        max_depth: usize,
        min_samples_split: usize,
        min_samples_leaf: usize,
    ) -> AppResult<Self> {
        if x.is_empty() {
            return Err(AppError::Internal(
                "cannot grow a forest on an empty training set".to_string(),
            ));
        }

        let limits = TreeLimits {
            max_depth,
            min_samples_split,
            min_samples_leaf,
        };

        let n = x.len();
        let mut trees = Vec::with_capacity(n_trees);
        for t in 0..n_trees {
            let mut rng = rand::rngs::StdRng::seed_from_u64(FOREST_SEED + t as u64);
            let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            trees.push(build_node(x, y, &indices, 0, limits));
        }

        Ok(Self { trees })
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        sum / self.trees.len() as f64
    }
}

fn mean(y: &[f64], indices: &[usize]) -> f64 {
    indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
}

fn build_node(x: &[Vec<f64>], y: &[f64], indices: &[usize], depth: usize, limits: TreeLimits) -> Node {
    let leaf = || Node::Leaf {
        value: mean(y, indices),
    };

    if indices.len() < limits.min_samples_split {
        return leaf();
    }
    if limits.max_depth > 0 && depth >= limits.max_depth {
        return leaf();
    }
    // Nœud pur
    let first = y[indices[0]];
    if indices.iter().all(|&i| (y[i] - first).abs() < 1e-12) {
        return leaf();
    }

    match best_split(x, y, indices, limits.min_samples_leaf) {
        Some((feature, threshold)) => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .copied()
                .partition(|&i| x[i][feature] <= threshold);
            Node::Split {
                feature,
                threshold,
                left: Box::new(build_node(x, y, &left_idx, depth + 1, limits)),
                right: Box::new(build_node(x, y, &right_idx, depth + 1, limits)),
            }
        }
        None => leaf(),
    }
}

/// Cherche la coupure (feature, seuil) minimisant la somme des carrés
/// intra-nœuds. None si aucune coupure ne respecte `min_samples_leaf`.
fn best_split(
    x: &[Vec<f64>],
    y: &[f64],
    indices: &[usize],
    min_samples_leaf: usize,
) -> Option<(usize, f64)> {
    let n = indices.len();
    let d = x[indices[0]].len();
    let mut best: Option<(usize, f64)> = None;
    let mut best_cost = f64::INFINITY;

    for feature in 0..d {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_by(|&a, &b| {
            x[a][feature]
                .partial_cmp(&x[b][feature])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Sommes cumulées pour un coût de coupure en O(1)
        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        let total_sum: f64 = sorted.iter().map(|&i| y[i]).sum();
        let total_sq: f64 = sorted.iter().map(|&i| y[i] * y[i]).sum();

        for pos in 1..n {
            let prev = sorted[pos - 1];
            left_sum += y[prev];
            left_sq += y[prev] * y[prev];

            // Coupure impossible entre deux valeurs égales
            if x[prev][feature] == x[sorted[pos]][feature] {
                continue;
            }
            if pos < min_samples_leaf || n - pos < min_samples_leaf {
                continue;
            }

            let n_left = pos as f64;
            let n_right = (n - pos) as f64;
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let cost = (left_sq - left_sum * left_sum / n_left)
                + (right_sq - right_sum * right_sum / n_right);

            if cost < best_cost {
                best_cost = cost;
                let threshold = (x[prev][feature] + x[sorted[pos]][feature]) / 2.0;
                best = Some((feature, threshold));
            }
        }
    }

    best
}
