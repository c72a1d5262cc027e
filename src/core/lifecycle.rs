//! Orchestration du cycle de vie des modèles : entraînement, prédiction,
//! suppression.
//!
//! Un entraînement coordonne trois effets (fichier d'artefact, ligne de
//! métadonnées, débit de tokens) sans transaction distribuée. La règle :
//! toute validation se résout avant le débit ; après le débit, chaque
//! sortie en erreur déclenche exactement une compensation (suppression
//! des fichiers écrits puis remboursement) avant de propager l'erreur
//! d'origine.

use actix_web::web;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::domain::model::{ModelRecord, PredictionOutcome, TrainOutcome, TrainingSpec};
use crate::domain::user::User;
use crate::infrastructure::database::{ModelRepository, TokenLedger};
use crate::infrastructure::error::{AppError, AppResult};
use crate::infrastructure::storage::{sanitize_name, ArtifactStore};
use crate::ml::estimator::SPLIT_SEED;
use crate::ml::pipeline::FittedPipeline;
use crate::ml::registry::{Hyperparams, ModelKind};
use crate::ml::table::DataTable;
use crate::ml::{encoder, estimator, metrics};

/// Coût d'un entraînement, fixé par la politique du service
pub const TRAIN_COST: i64 = 1;
/// Coût d'une prédiction
pub const PREDICT_COST: i64 = 5;

#[derive(Debug, Clone)]
pub struct ModelLifecycleService {
    ledger: TokenLedger,
    models: ModelRepository,
    store: ArtifactStore,
}

impl ModelLifecycleService {
    pub fn new(ledger: TokenLedger, models: ModelRepository, store: ArtifactStore) -> Self {
        Self {
            ledger,
            models,
            store,
        }
    }

    /// Entraîne un modèle pour `user` et persiste artefact + métadonnées.
    ///
    /// Le débit de tokens est le point de non-retour : tout échec
    /// ultérieur supprime les fichiers écrits et rembourse avant de
    /// remonter l'erreur.
    pub async fn train(
        &self,
        user: &User,
        table: DataTable,
        spec: TrainingSpec,
    ) -> AppResult<TrainOutcome> {
        // Validation complète avant de toucher au solde
        validate_training_request(&table, &spec)?;
        let kind = ModelKind::from_name(&spec.model_type)?;
        let params = kind.parse_params(&spec.optional_params)?;

        // Le préfixe user_id rend le nom globalement unique et encode la
        // propriété dans le nom lui-même
        let model_name = match &spec.model_filename {
            Some(raw) => format!("{}_{}", user.id, sanitize_name(raw)?),
            None => format!(
                "{}_{}_{}",
                user.id,
                kind.as_str(),
                Utc::now().format("%Y%m%d%H%M%S%6f")
            ),
        };

        self.ledger.check_and_debit(user.id, TRAIN_COST).await?;
        info!(user_id = user.id, model_name = %model_name, "training started");

        match self
            .fit_and_persist(user, table, &spec, kind, params, &model_name)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.compensate_train(user.id, &model_name).await;
                Err(err)
            }
        }
    }

    /// Étapes postérieures au débit : encodage, ajustement, évaluation,
    /// écriture de l'artefact, insertion des métadonnées
    async fn fit_and_persist(
        &self,
        user: &User,
        table: DataTable,
        spec: &TrainingSpec,
        kind: ModelKind,
        params: Hyperparams,
        model_name: &str,
    ) -> AppResult<TrainOutcome> {
        let store = self.store.clone();
        let feature_cols = spec.feature_cols.clone();
        let label_col = spec.label_col.clone();
        let train_percentage = spec.train_percentage;
        let name = model_name.to_string();

        // L'ajustement est borné CPU, parfois long : il part sur le pool
        // bloquant pour ne pas geler les autres requêtes
        let (train_metrics, file_path) = web::block(move || -> AppResult<_> {
            let (matrix, trained_columns) = encoder::fit_transform(&table, &feature_cols)?;
            let y = label_values(&table, &label_col)?;

            let (x_train, x_test, y_train, y_test) =
                estimator::train_test_split(&matrix, &y, train_percentage, SPLIT_SEED);
            let fitted = estimator::fit(&params, &x_train, &y_train)?;
            let y_pred = fitted.predict(&x_test);
            let train_metrics = metrics::evaluate(&y_test, &y_pred);

            let pipeline = FittedPipeline {
                model_type: kind.as_str().to_string(),
                trained_columns,
                estimator: fitted,
            };
            let path = store.save(&name, &pipeline, &train_metrics)?;
            Ok((train_metrics, path))
        })
        .await??;

        // L'écriture a pu échouer silencieusement : on revérifie le disque
        if !self.store.exists(model_name) {
            return Err(AppError::Internal(format!(
                "artifact missing right after save: {}",
                model_name
            )));
        }

        let feature_cols_json = serde_json::to_string(&spec.feature_cols)?;
        let inserted = self
            .models
            .insert(
                user.id,
                model_name,
                kind.as_str(),
                &file_path.to_string_lossy(),
                &feature_cols_json,
            )
            .await?;

        // Nom déjà pris : l'entraînement a réussi mais l'artefact ne doit
        // pas devenir orphelin : traité comme un échec compensé
        if inserted.is_none() {
            return Err(AppError::AlreadyExists(format!(
                "Model name '{}'",
                model_name
            )));
        }

        info!(user_id = user.id, model_name = %model_name, "training completed");
        Ok(TrainOutcome {
            model_name: model_name.to_string(),
            metrics: train_metrics,
            tokens_deducted: TRAIN_COST,
            file_path: file_path.to_string_lossy().into_owned(),
        })
    }

    /// Compensation d'un entraînement échoué après débit : suppression
    /// des fichiers écrits puis remboursement. Ne propage jamais : un
    /// échec de remboursement est journalisé, l'erreur d'origine prime.
    async fn compensate_train(&self, user_id: i64, model_name: &str) {
        warn!(user_id, model_name, "training failed, compensating");
        if let Err(e) = self.store.delete(model_name) {
            warn!(model_name, "artifact cleanup failed: {}", e);
        }
        if let Err(e) = self.ledger.refund(user_id, TRAIN_COST).await {
            error!(user_id, "token refund failed after training error: {}", e);
        }
    }

    /// Prédit avec un modèle stocké, en débitant le coût de prédiction.
    ///
    /// Un modèle appartenant à un autre utilisateur est indiscernable
    /// d'un modèle inexistant.
    pub async fn predict(
        &self,
        user: &User,
        raw_name: &str,
        features: serde_json::Map<String, serde_json::Value>,
    ) -> AppResult<PredictionOutcome> {
        let model_name = sanitize_name(raw_name)?;
        let record = self
            .models
            .find(user.id, &model_name)
            .await?
            .ok_or_else(|| AppError::NotFound("Model".to_string()))?;

        self.ledger.check_and_debit(user.id, PREDICT_COST).await?;

        match self.run_prediction(&record, features).await {
            Ok(prediction) => Ok(PredictionOutcome {
                prediction,
                tokens_deducted: PREDICT_COST,
            }),
            Err(err) => {
                if let Err(refund_err) = self.ledger.refund(user.id, PREDICT_COST).await {
                    error!(
                        user_id = user.id,
                        "token refund failed after prediction error: {}", refund_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn run_prediction(
        &self,
        record: &ModelRecord,
        features: serde_json::Map<String, serde_json::Value>,
    ) -> AppResult<f64> {
        let store = self.store.clone();
        let name = record.model_name.clone();
        let user_id = record.user_id;

        web::block(move || -> AppResult<f64> {
            let pipeline = match store.load(&name) {
                Err(AppError::NotFound(_)) => {
                    // L'enregistrement existe mais le fichier a disparu :
                    // incohérence côté serveur, le client voit un 404
                    warn!(
                        user_id,
                        model_name = %name,
                        "metadata record exists but artifact file is missing"
                    );
                    return Err(AppError::NotFound("Model".to_string()));
                }
                other => other?,
            };
            pipeline.predict(&features)
        })
        .await?
    }

    /// Supprime un modèle : fichiers d'abord (au mieux), enregistrement
    /// ensuite. `NotFound` si le nom n'existe pas pour cet utilisateur.
    pub async fn delete(&self, user: &User, raw_name: &str) -> AppResult<()> {
        let model_name = sanitize_name(raw_name)?;
        self.models
            .find(user.id, &model_name)
            .await?
            .ok_or_else(|| AppError::NotFound("Model".to_string()))?;

        if let Err(e) = self.store.delete(&model_name) {
            warn!(model_name = %model_name, "artifact removal failed: {}", e);
        }

        let deleted = self.models.delete(user.id, &model_name).await?;
        if !deleted {
            return Err(AppError::NotFound("Model".to_string()));
        }
        info!(user_id = user.id, model_name = %model_name, "model deleted");
        Ok(())
    }

    /// Noms des modèles de l'utilisateur dont l'artefact existe encore
    /// sur disque ; un enregistrement orphelin n'est jamais servi
    pub async fn list_model_names(&self, user: &User) -> AppResult<Vec<String>> {
        let records = self.models.list(user.id).await?;
        Ok(records
            .into_iter()
            .filter(|r| self.store.exists(&r.model_name))
            .map(|r| r.model_name)
            .collect())
    }

    /// Métadonnées d'un modèle, avec revérification de l'artefact
    pub async fn describe(&self, user: &User, raw_name: &str) -> AppResult<ModelRecord> {
        let model_name = sanitize_name(raw_name)?;
        let record = self
            .models
            .find(user.id, &model_name)
            .await?
            .ok_or_else(|| AppError::NotFound("Model".to_string()))?;

        if !self.store.exists(&record.model_name) {
            warn!(
                user_id = user.id,
                model_name = %record.model_name,
                "metadata record exists but artifact file is missing"
            );
            return Err(AppError::NotFound("Model".to_string()));
        }
        Ok(record)
    }

    /// Supprime du disque les artefacts de tous les modèles d'un
    /// utilisateur, au mieux. Utilisé avant une suppression de compte.
    pub async fn purge_user_artifacts(&self, user_id: i64) -> AppResult<()> {
        for record in self.models.list(user_id).await? {
            if let Err(e) = self.store.delete(&record.model_name) {
                warn!(model_name = %record.model_name, "artifact removal failed: {}", e);
            }
        }
        Ok(())
    }
}

/// Validation structurelle et sémantique de la requête, entièrement
/// résolue avant le moindre mouvement de tokens
fn validate_training_request(table: &DataTable, spec: &TrainingSpec) -> AppResult<()> {
    if !(spec.train_percentage > 0.0 && spec.train_percentage < 1.0) {
        return Err(AppError::Validation(
            "train_percentage must be strictly between 0 and 1".to_string(),
        ));
    }
    if spec.feature_cols.is_empty() {
        return Err(AppError::Validation(
            "feature_cols must not be empty".to_string(),
        ));
    }

    let mut missing: Vec<&str> = Vec::new();
    for col in spec.feature_cols.iter().chain(std::iter::once(&spec.label_col)) {
        if !table.has_column(col) {
            missing.push(col.as_str());
        }
    }
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "Columns not found in CSV: {:?}",
            missing
        )));
    }

    for col in spec.feature_cols.iter().chain(std::iter::once(&spec.label_col)) {
        if table.column_has_missing(col) {
            return Err(AppError::Validation(format!(
                "Column '{}' contains missing values",
                col
            )));
        }
    }

    if !table.is_numeric_column(&spec.label_col) {
        return Err(AppError::Validation(format!(
            "Label column '{}' must be numeric",
            spec.label_col
        )));
    }

    let n_train = ((table.n_rows() as f64) * spec.train_percentage).floor() as usize;
    if n_train == 0 || n_train == table.n_rows() {
        return Err(AppError::Validation(format!(
            "Cannot split {} rows with train_percentage {}",
            table.n_rows(),
            spec.train_percentage
        )));
    }

    Ok(())
}

/// Colonne cible convertie en flottants
fn label_values(table: &DataTable, label_col: &str) -> AppResult<Vec<f64>> {
    let values = table
        .column(label_col)
        .ok_or_else(|| AppError::Validation(format!("Column not found in CSV: {}", label_col)))?;
    Ok(values
        .iter()
        .map(|v| v.parse::<f64>().unwrap_or(0.0))
        .collect())
}
