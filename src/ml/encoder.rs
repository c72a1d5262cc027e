//! Encodage des colonnes brutes en matrice numérique.
//!
//! Trois familles de colonnes : numériques (copiées telles quelles),
//! dates (convertie en timestamp Unix, 0 si illisible) et catégorielles
//! (one-hot, première modalité supprimée). L'ordre exact des colonnes
//! produites à l'entraînement est conservé et réappliqué à la prédiction
//! par réindexation avec remplissage à zéro.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::infrastructure::error::{AppError, AppResult};
use crate::ml::table::{is_date_column, DataTable};

/// Encode les colonnes d'entraînement et retourne la matrice ligne par
/// ligne ainsi que l'ordre exact des colonnes produites.
pub fn fit_transform(
    table: &DataTable,
    feature_cols: &[String],
) -> AppResult<(Vec<Vec<f64>>, Vec<String>)> {
    let n_rows = table.n_rows();
    let mut columns: Vec<(String, Vec<f64>)> = Vec::new();

    for col in feature_cols {
        let values = table
            .column(col)
            .ok_or_else(|| AppError::Validation(format!("Column not found in CSV: {}", col)))?;

        if is_date_column(col) {
            let encoded = values.iter().map(|v| parse_date_value(v)).collect();
            columns.push((col.clone(), encoded));
        } else if table.is_numeric_column(col) {
            let encoded = values
                .iter()
                .map(|v| v.parse::<f64>().unwrap_or(0.0))
                .collect();
            columns.push((col.clone(), encoded));
        } else {
            // One-hot : modalités triées, la première est supprimée pour
            // éviter le piège des variables muettes
            let levels: BTreeSet<&str> = values.iter().copied().collect();
            for level in levels.iter().skip(1) {
                let encoded = values
                    .iter()
                    .map(|v| if v == level { 1.0 } else { 0.0 })
                    .collect();
                columns.push((format!("{}_{}", col, level), encoded));
            }
        }
    }

    if columns.is_empty() {
        return Err(AppError::Validation(
            "No valid feature columns found after encoding".to_string(),
        ));
    }

    let trained_columns: Vec<String> = columns.iter().map(|(name, _)| name.clone()).collect();
    let mut rows = vec![Vec::with_capacity(columns.len()); n_rows];
    for (_, col_values) in &columns {
        for (row, value) in rows.iter_mut().zip(col_values) {
            row.push(*value);
        }
    }

    Ok((rows, trained_columns))
}

/// Encode une ligne unique de prédiction puis la réindexe sur l'ordre
/// des colonnes d'entraînement. Les colonnes absentes de l'entrée (par
/// exemple une modalité non présente dans cette requête) valent 0 ; les
/// colonnes inconnues de l'entraînement sont ignorées.
pub fn transform(
    features: &serde_json::Map<String, serde_json::Value>,
    trained_columns: &[String],
) -> Vec<f64> {
    let mut expanded: HashMap<String, f64> = HashMap::new();

    for (name, value) in features {
        if is_date_column(name) {
            let ts = match value {
                serde_json::Value::String(s) => parse_date_value(s),
                serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
                _ => 0.0,
            };
            expanded.insert(name.clone(), ts);
            continue;
        }

        match value {
            serde_json::Value::Number(n) => {
                expanded.insert(name.clone(), n.as_f64().unwrap_or(0.0));
            }
            serde_json::Value::Bool(b) => {
                expanded.insert(name.clone(), if *b { 1.0 } else { 0.0 });
            }
            serde_json::Value::String(s) => {
                // Valeur catégorielle : active la colonne muette associée
                expanded.insert(format!("{}_{}", name, s), 1.0);
            }
            _ => {}
        }
    }

    trained_columns
        .iter()
        .map(|c| expanded.get(c).copied().unwrap_or(0.0))
        .collect()
}

/// Convertit une cellule date en timestamp Unix (secondes). Une valeur
/// illisible vaut 0, jamais une erreur.
pub fn parse_date_value(raw: &str) -> f64 {
    if raw.is_empty() {
        return 0.0;
    }
    // Déjà un timestamp numérique
    if let Ok(ts) = raw.parse::<f64>() {
        return ts;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.timestamp() as f64;
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return dt.and_utc().timestamp() as f64;
        }
    }
    for fmt in ["%Y-%m-%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return d
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp() as f64)
                .unwrap_or(0.0);
        }
    }
    0.0
}
