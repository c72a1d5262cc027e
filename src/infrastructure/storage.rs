//! Persistance sur disque des pipelines ajustés et de leurs métriques.
//!
//! Un artefact par modèle (`{models_dir}/{nom}.model.json`) plus un
//! fichier de métriques (`{metrics_dir}/{nom}_metrics.json`). Les noms
//! sont validés contre une liste blanche de caractères avant tout accès
//! au système de fichiers.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::infrastructure::error::{AppError, AppResult};
use crate::ml::metrics::RegressionMetrics;
use crate::ml::pipeline::FittedPipeline;

/// Service de stockage des artefacts de modèles
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    models_dir: PathBuf,
    metrics_dir: PathBuf,
}

impl ArtifactStore {
    /// Crée le store et les répertoires s'ils n'existent pas
    pub fn new(models_dir: impl Into<PathBuf>, metrics_dir: impl Into<PathBuf>) -> AppResult<Self> {
        let models_dir = models_dir.into();
        let metrics_dir = metrics_dir.into();
        fs::create_dir_all(&models_dir)?;
        fs::create_dir_all(&metrics_dir)?;
        Ok(Self {
            models_dir,
            metrics_dir,
        })
    }

    /// Sérialise le pipeline et ses métriques, retourne le chemin de
    /// l'artefact
    pub fn save(
        &self,
        name: &str,
        pipeline: &FittedPipeline,
        metrics: &RegressionMetrics,
    ) -> AppResult<PathBuf> {
        let model_path = self.artifact_path(name)?;
        let metrics_path = self.metrics_path(name)?;

        let payload = serde_json::to_string(pipeline)?;
        fs::write(&model_path, payload)?;
        fs::write(&metrics_path, serde_json::to_string_pretty(metrics)?)?;

        info!("Model saved: {}", model_path.display());
        Ok(model_path)
    }

    /// Recharge un pipeline. `NotFound` si l'artefact a disparu alors
    /// que l'enregistrement existe : incohérence côté serveur, loguée
    /// par l'appelant.
    pub fn load(&self, name: &str) -> AppResult<FittedPipeline> {
        let model_path = self.artifact_path(name)?;
        if !model_path.exists() {
            return Err(AppError::NotFound("Model".to_string()));
        }
        let payload = fs::read_to_string(&model_path)?;
        let pipeline = serde_json::from_str(&payload)?;
        Ok(pipeline)
    }

    /// Supprime artefact et métriques, au mieux. `true` si l'artefact
    /// existait.
    pub fn delete(&self, name: &str) -> AppResult<bool> {
        let model_path = self.artifact_path(name)?;
        let metrics_path = self.metrics_path(name)?;

        let existed = model_path.exists();
        if existed {
            if let Err(e) = fs::remove_file(&model_path) {
                warn!("Failed to remove artifact {}: {}", model_path.display(), e);
            }
        }
        if metrics_path.exists() {
            if let Err(e) = fs::remove_file(&metrics_path) {
                warn!("Failed to remove metrics {}: {}", metrics_path.display(), e);
            }
        }
        Ok(existed)
    }

    pub fn exists(&self, name: &str) -> bool {
        match self.artifact_path(name) {
            Ok(path) => path.exists(),
            Err(_) => false,
        }
    }

    fn artifact_path(&self, name: &str) -> AppResult<PathBuf> {
        validate_name(name)?;
        Ok(self.models_dir.join(format!("{}.model.json", name)))
    }

    fn metrics_path(&self, name: &str) -> AppResult<PathBuf> {
        validate_name(name)?;
        Ok(self.metrics_dir.join(format!("{}_metrics.json", name)))
    }
}

/// Nettoie un nom fourni par l'appelant : seuls les caractères de la
/// liste blanche sont conservés. Vide après nettoyage = refusé.
pub fn sanitize_name(raw: &str) -> AppResult<String> {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();
    while cleaned.contains("..") {
        cleaned = cleaned.replace("..", ".");
    }
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return Err(AppError::Validation(format!(
            "Invalid model name: '{}'",
            raw
        )));
    }
    Ok(cleaned)
}

/// Refuse tout nom pouvant s'échapper du répertoire de stockage
fn validate_name(name: &str) -> AppResult<()> {
    let ok = !name.is_empty()
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok && Path::new(name).file_name().map(|f| f == name).unwrap_or(false) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Invalid model name: '{}'",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::estimator::{FittedEstimator, LinearModel};

    fn store() -> (ArtifactStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("models"), dir.path().join("metrics")).unwrap();
        (store, dir)
    }

    fn sample_pipeline() -> (FittedPipeline, RegressionMetrics) {
        let x = vec![vec![1.0], vec![2.0], vec![3.0]];
        let y = vec![2.0, 4.0, 6.0];
        let pipeline = FittedPipeline {
            model_type: "linear".to_string(),
            trained_columns: vec!["a".to_string()],
            estimator: FittedEstimator::Linear(LinearModel::fit(&x, &y, true).unwrap()),
        };
        let metrics = RegressionMetrics {
            r2_score: 1.0,
            mean_squared_error: 0.0,
            mean_absolute_error: 0.0,
        };
        (pipeline, metrics)
    }

    #[test]
    fn test_save_load_delete_roundtrip() {
        let (store, _dir) = store();
        let (pipeline, metrics) = sample_pipeline();

        let path = store.save("1_linear_test", &pipeline, &metrics).unwrap();
        assert!(path.exists());
        assert!(store.exists("1_linear_test"));

        let loaded = store.load("1_linear_test").unwrap();
        assert_eq!(loaded.trained_columns, vec!["a"]);

        assert!(store.delete("1_linear_test").unwrap());
        assert!(!store.exists("1_linear_test"));
        assert!(!path.exists());
        // Idempotent
        assert!(!store.delete("1_linear_test").unwrap());
    }

    #[test]
    fn test_metrics_sidecar_written_and_removed() {
        let (store, dir) = store();
        let (pipeline, metrics) = sample_pipeline();

        store.save("m", &pipeline, &metrics).unwrap();
        let metrics_file = dir.path().join("metrics").join("m_metrics.json");
        assert!(metrics_file.exists());
        let content = std::fs::read_to_string(&metrics_file).unwrap();
        assert!(content.contains("r2_score"));

        store.delete("m").unwrap();
        assert!(!metrics_file.exists());
    }

    #[test]
    fn test_load_missing_artifact() {
        let (store, _dir) = store();
        assert!(matches!(
            store.load("ghost").unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[test]
    fn test_path_traversal_rejected() {
        let (store, _dir) = store();
        for bad in ["../evil", "a/b", "a\\b", "..", "", "x/../../etc"] {
            assert!(store.load(bad).is_err(), "name {:?} should be rejected", bad);
            assert!(!store.exists(bad));
        }
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("my model!.v2").unwrap(), "mymodel.v2");
        assert_eq!(sanitize_name("a/b").unwrap(), "ab");
        assert_eq!(sanitize_name("x/../../etc").unwrap(), "x.etc");
        assert!(sanitize_name("  /  ").is_err());
        assert!(sanitize_name("...").is_err());
    }
}
