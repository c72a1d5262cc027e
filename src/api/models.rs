//! Routes d'entraînement et de prédiction.
//!
//! `/create` reçoit le CSV en multipart avec les champs texte de la
//! requête ; tout le reste est du JSON.

use actix_multipart::form::{bytes::Bytes, text::Text, MultipartForm};
use actix_web::{delete, get, post, web, HttpResponse};
use serde::Deserialize;

use crate::api::extractors::AuthUser;
use crate::domain::model::TrainingSpec;
use crate::infrastructure::error::{AppError, AppResult};
use crate::ml::registry::registry_schema;
use crate::ml::table::{DataTable, MAX_CSV_BYTES};
use crate::state::AppState;

/// Formulaire multipart d'entraînement
#[derive(MultipartForm)]
pub struct TrainForm {
    pub csv_file: Option<Bytes>,
    pub model_type: Text<String>,
    pub feature_cols: Text<String>,
    pub label_col: Text<String>,
    pub train_percentage: Option<Text<f64>>,
    pub optional_params: Option<Text<String>>,
    pub model_filename: Option<Text<String>>,
}

/// Corps d'une requête de prédiction
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub features: Option<serde_json::Value>,
}

/// Schéma des familles de modèles supportées et de leurs hyperparamètres
#[get("/models")]
pub async fn get_models() -> HttpResponse {
    HttpResponse::Ok().json(registry_schema())
}

/// Entraîne un nouveau modèle pour l'utilisateur courant
#[post("/create")]
pub async fn create_model(
    user: AuthUser,
    MultipartForm(form): MultipartForm<TrainForm>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let csv = form
        .csv_file
        .ok_or_else(|| AppError::Validation("CSV file missing".to_string()))?;
    if csv.data.len() > MAX_CSV_BYTES {
        return Err(AppError::PayloadTooLarge(format!(
            "CSV file too large. Maximum size is {}MB",
            MAX_CSV_BYTES / (1024 * 1024)
        )));
    }
    let table = DataTable::from_csv_bytes(&csv.data)?;

    let spec = TrainingSpec {
        model_type: form.model_type.into_inner(),
        feature_cols: parse_feature_cols(&form.feature_cols)?,
        label_col: form.label_col.into_inner(),
        train_percentage: form.train_percentage.map(|t| t.into_inner()).unwrap_or(0.8),
        optional_params: parse_optional_params(form.optional_params.as_ref().map(|t| t.0.as_str()))?,
        model_filename: form.model_filename.map(|t| t.into_inner()),
    };

    let outcome = state.lifecycle().train(&user.0, table, spec).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "model_name": outcome.model_name,
        "metrics": outcome.metrics,
        "tokens_deducted": outcome.tokens_deducted,
        "file_path": outcome.file_path
    })))
}

/// Liste les modèles valides de l'utilisateur courant
#[get("/trained")]
pub async fn get_trained(user: AuthUser, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let names = state.lifecycle().list_model_names(&user.0).await?;
    Ok(HttpResponse::Ok().json(names))
}

/// Métadonnées d'un modèle de l'utilisateur courant
#[get("/trained/{model_name}")]
pub async fn get_trained_model(
    user: AuthUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let record = state.lifecycle().describe(&user.0, &path).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "model_name": record.model_name,
        "model_type": record.model_type,
        "feature_cols": record.feature_cols_list(),
        "created_at": record.created_at
    })))
}

/// Prédiction avec un modèle stocké
#[post("/predict/{model_name}")]
pub async fn predict_model(
    user: AuthUser,
    path: web::Path<String>,
    payload: web::Json<PredictRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let features = match payload.into_inner().features {
        Some(serde_json::Value::Object(map)) if !map.is_empty() => map,
        _ => {
            return Err(AppError::Validation(
                "Missing 'features' in request body".to_string(),
            ))
        }
    };

    let outcome = state.lifecycle().predict(&user.0, &path, features).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "prediction": outcome.prediction,
        "tokens_deducted": outcome.tokens_deducted
    })))
}

/// Supprime un modèle (artefact puis métadonnées)
#[delete("/delete/{model_name}")]
pub async fn delete_model(
    user: AuthUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    state.lifecycle().delete(&user.0, &path).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": format!("Model '{}' deleted", path.as_str())
    })))
}

/// `feature_cols` est un tableau JSON, avec repli sur le format
/// `a,b,c` pour les clients qui envoient une liste brute
fn parse_feature_cols(raw: &str) -> AppResult<Vec<String>> {
    if let Ok(cols) = serde_json::from_str::<Vec<String>>(raw) {
        return Ok(cols);
    }
    if !raw.trim_start().starts_with('[') {
        let cols: Vec<String> = raw
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if !cols.is_empty() {
            return Ok(cols);
        }
    }
    Err(AppError::Validation(
        "Invalid JSON in parameter 'feature_cols'. Expected JSON format (e.g., [\"age\",\"salary\"])"
            .to_string(),
    ))
}

/// `optional_params` est un objet JSON, `{}` par défaut
fn parse_optional_params(
    raw: Option<&str>,
) -> AppResult<serde_json::Map<String, serde_json::Value>> {
    let raw = match raw {
        Some(r) if !r.trim().is_empty() => r,
        _ => return Ok(serde_json::Map::new()),
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        _ => Err(AppError::Validation(
            "Invalid JSON in parameter 'optional_params'".to_string(),
        )),
    }
}
