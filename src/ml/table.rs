use crate::infrastructure::error::{AppError, AppResult};

/// Taille maximale d'un CSV uploadé (50 Mo)
pub const MAX_CSV_BYTES: usize = 50 * 1024 * 1024;

/// Table tabulaire typée dynamiquement, issue d'un upload CSV.
///
/// Toutes les cellules sont conservées en texte ; le typage (numérique,
/// date, catégoriel) est inféré colonne par colonne à l'encodage.
#[derive(Debug, Clone)]
pub struct DataTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl DataTable {
    /// Parse un CSV complet depuis les octets uploadés.
    pub fn from_csv_bytes(bytes: &[u8]) -> AppResult<Self> {
        if bytes.is_empty() {
            return Err(AppError::Validation("CSV file is empty".to_string()));
        }
        if bytes.len() > MAX_CSV_BYTES {
            return Err(AppError::PayloadTooLarge(format!(
                "CSV file too large. Maximum size is {}MB",
                MAX_CSV_BYTES / (1024 * 1024)
            )));
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| AppError::Validation(format!("Failed to read CSV header: {}", e)))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| AppError::Validation(format!("Malformed CSV: {}", e)))?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        if rows.is_empty() {
            return Err(AppError::Validation("CSV file has no data".to_string()));
        }

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    /// Valeurs brutes d'une colonne, dans l'ordre des lignes
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.headers.iter().position(|h| h == name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// Une colonne contient une valeur manquante si une cellule est vide
    pub fn column_has_missing(&self, name: &str) -> bool {
        self.column(name)
            .map(|values| values.iter().any(|v| v.is_empty()))
            .unwrap_or(true)
    }

    /// Une colonne est numérique si toutes ses cellules non vides
    /// se parsent en flottant
    pub fn is_numeric_column(&self, name: &str) -> bool {
        match self.column(name) {
            Some(values) => {
                let mut any = false;
                for v in values {
                    if v.is_empty() {
                        continue;
                    }
                    if v.parse::<f64>().is_err() {
                        return false;
                    }
                    any = true;
                }
                any
            }
            None => false,
        }
    }
}

/// Convention héritée du pipeline d'origine : une colonne est une date
/// si son nom contient `date`
pub fn is_date_column(name: &str) -> bool {
    name.to_lowercase().contains("date")
}
