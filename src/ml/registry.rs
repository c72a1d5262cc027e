//! Registre fermé des familles de modèles supportées.
//!
//! Chaque famille déclare le schéma de ses hyperparamètres ; toute clé
//! inconnue ou valeur inconvertible est rejetée avant le moindre débit
//! de tokens.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::infrastructure::error::{AppError, AppResult};

/// Famille de modèle entraînable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    Linear,
    Logistic,
    Knn,
    RandomForest,
}

/// Type déclaré d'un hyperparamètre
#[derive(Debug, Clone, Copy)]
pub enum ParamType {
    Int,
    Float,
    Bool,
    Str,
    Enum(&'static [&'static str]),
}

/// Valeur par défaut d'un hyperparamètre, exprimable en constante
#[derive(Debug, Clone, Copy)]
pub enum DefaultValue {
    Bool(bool),
    Int(u64),
    Float(f64),
    Str(&'static str),
}

impl DefaultValue {
    fn to_json(self) -> Value {
        match self {
            DefaultValue::Bool(b) => Value::Bool(b),
            DefaultValue::Int(i) => Value::from(i),
            DefaultValue::Float(f) => Value::from(f),
            DefaultValue::Str(s) => Value::String(s.to_string()),
        }
    }
}

/// Déclaration d'un hyperparamètre : nom, type et défaut
pub struct ParamSpec {
    pub name: &'static str,
    pub ptype: ParamType,
    pub default: DefaultValue,
}

/// Hyperparamètres validés et typés, un variant par famille
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Hyperparams {
    Linear {
        fit_intercept: bool,
    },
    Logistic {
        c: f64,
        max_iter: u64,
        solver: String,
    },
    Knn {
        n_neighbors: usize,
        weights: String,
    },
    RandomForest {
        n_estimators: u16,
        /// 0 = profondeur illimitée
        max_depth: u16,
        min_samples_split: usize,
        min_samples_leaf: usize,
    },
}

pub const SOLVERS: &[&str] = &["lbfgs"];
pub const KNN_WEIGHTS: &[&str] = &["uniform", "distance"];

const LINEAR_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "fit_intercept",
    ptype: ParamType::Bool,
    default: DefaultValue::Bool(true),
}];

const LOGISTIC_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "C",
        ptype: ParamType::Float,
        default: DefaultValue::Float(1.0),
    },
    ParamSpec {
        name: "max_iter",
        ptype: ParamType::Int,
        default: DefaultValue::Int(100),
    },
    ParamSpec {
        name: "solver",
        ptype: ParamType::Enum(SOLVERS),
        default: DefaultValue::Str("lbfgs"),
    },
];

const KNN_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "n_neighbors",
        ptype: ParamType::Int,
        default: DefaultValue::Int(5),
    },
    ParamSpec {
        name: "weights",
        ptype: ParamType::Enum(KNN_WEIGHTS),
        default: DefaultValue::Str("uniform"),
    },
];

const FOREST_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "n_estimators",
        ptype: ParamType::Int,
        default: DefaultValue::Int(100),
    },
    ParamSpec {
        name: "max_depth",
        ptype: ParamType::Int,
        default: DefaultValue::Int(0),
    },
    ParamSpec {
        name: "min_samples_split",
        ptype: ParamType::Int,
        default: DefaultValue::Int(2),
    },
    ParamSpec {
        name: "min_samples_leaf",
        ptype: ParamType::Int,
        default: DefaultValue::Int(1),
    },
];

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Linear,
        ModelKind::Logistic,
        ModelKind::Knn,
        ModelKind::RandomForest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Linear => "linear",
            ModelKind::Logistic => "logistic",
            ModelKind::Knn => "knn",
            ModelKind::RandomForest => "random_forest",
        }
    }

    /// Résout un nom de famille, sinon `UnknownModelKind`
    pub fn from_name(name: &str) -> AppResult<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == name)
            .ok_or_else(|| AppError::UnknownModelKind(name.to_string()))
    }

    pub fn param_specs(&self) -> &'static [ParamSpec] {
        match self {
            ModelKind::Linear => LINEAR_PARAMS,
            ModelKind::Logistic => LOGISTIC_PARAMS,
            ModelKind::Knn => KNN_PARAMS,
            ModelKind::RandomForest => FOREST_PARAMS,
        }
    }

    /// Valide et convertit les hyperparamètres fournis par l'appelant.
    ///
    /// Les clés absentes prennent leur valeur par défaut ; toute clé
    /// inconnue est une erreur, jamais ignorée silencieusement.
    pub fn parse_params(&self, raw: &serde_json::Map<String, Value>) -> AppResult<Hyperparams> {
        let specs = self.param_specs();

        let invalid: Vec<&String> = raw
            .keys()
            .filter(|k| !specs.iter().any(|s| s.name == k.as_str()))
            .collect();
        if !invalid.is_empty() {
            return Err(AppError::InvalidParameter(format!(
                "Invalid optional parameter(s): {:?}",
                invalid
            )));
        }

        let mut resolved = serde_json::Map::new();
        for spec in specs {
            let value = match raw.get(spec.name) {
                Some(v) => coerce(v, spec)?,
                None => spec.default.to_json(),
            };
            resolved.insert(spec.name.to_string(), value);
        }

        let params = match self {
            ModelKind::Linear => Hyperparams::Linear {
                fit_intercept: resolved["fit_intercept"].as_bool().unwrap_or(true),
            },
            ModelKind::Logistic => Hyperparams::Logistic {
                c: resolved["C"].as_f64().unwrap_or(1.0),
                max_iter: resolved["max_iter"].as_u64().unwrap_or(100),
                solver: resolved["solver"].as_str().unwrap_or("lbfgs").to_string(),
            },
            ModelKind::Knn => Hyperparams::Knn {
                n_neighbors: resolved["n_neighbors"].as_u64().unwrap_or(5) as usize,
                weights: resolved["weights"].as_str().unwrap_or("uniform").to_string(),
            },
            ModelKind::RandomForest => Hyperparams::RandomForest {
                n_estimators: resolved["n_estimators"].as_u64().unwrap_or(100) as u16,
                max_depth: resolved["max_depth"].as_u64().unwrap_or(0) as u16,
                min_samples_split: resolved["min_samples_split"].as_u64().unwrap_or(2) as usize,
                min_samples_leaf: resolved["min_samples_leaf"].as_u64().unwrap_or(1) as usize,
            },
        };

        check_ranges(&params)?;
        Ok(params)
    }
}

/// Schéma complet du registre, servi par `GET /models`.
/// `serde_json::Map` est un BTreeMap : les familles sortent triées.
pub fn registry_schema() -> Value {
    let mut kinds = serde_json::Map::new();
    for kind in ModelKind::ALL {
        let mut params = serde_json::Map::new();
        for spec in kind.param_specs() {
            let mut decl = serde_json::Map::new();
            let type_name = match spec.ptype {
                ParamType::Int => "int",
                ParamType::Float => "float",
                ParamType::Bool => "bool",
                ParamType::Str => "str",
                ParamType::Enum(_) => "enum",
            };
            decl.insert("type".to_string(), Value::String(type_name.to_string()));
            decl.insert("default".to_string(), spec.default.to_json());
            if let ParamType::Enum(options) = spec.ptype {
                decl.insert(
                    "options".to_string(),
                    Value::Array(
                        options
                            .iter()
                            .map(|o| Value::String(o.to_string()))
                            .collect(),
                    ),
                );
            }
            params.insert(spec.name.to_string(), Value::Object(decl));
        }
        let mut entry = serde_json::Map::new();
        entry.insert("params".to_string(), Value::Object(params));
        kinds.insert(kind.as_str().to_string(), Value::Object(entry));
    }
    Value::Object(kinds)
}

/// Conversion tolérante vers le type déclaré : les clients envoient
/// souvent des nombres ou des booléens sous forme de chaînes
fn coerce(value: &Value, spec: &ParamSpec) -> AppResult<Value> {
    let fail = || {
        AppError::InvalidParameter(format!(
            "Invalid type for parameter '{}': expected {}",
            spec.name,
            match spec.ptype {
                ParamType::Int => "int",
                ParamType::Float => "float",
                ParamType::Bool => "bool",
                ParamType::Str => "str",
                ParamType::Enum(_) => "enum",
            }
        ))
    };

    match spec.ptype {
        ParamType::Bool => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err(fail()),
            },
            Value::Number(n) => Ok(Value::Bool(n.as_f64().unwrap_or(0.0) != 0.0)),
            _ => Err(fail()),
        },
        ParamType::Int => match value {
            Value::Number(n) => n
                .as_u64()
                .map(|v| serde_json::json!(v))
                .ok_or_else(fail),
            Value::String(s) => s
                .parse::<u64>()
                .map(|v| serde_json::json!(v))
                .map_err(|_| fail()),
            _ => Err(fail()),
        },
        ParamType::Float => match value {
            Value::Number(n) => n
                .as_f64()
                .map(|v| serde_json::json!(v))
                .ok_or_else(fail),
            Value::String(s) => s
                .parse::<f64>()
                .map(|v| serde_json::json!(v))
                .map_err(|_| fail()),
            _ => Err(fail()),
        },
        ParamType::Str => match value {
            Value::String(s) => Ok(Value::String(s.clone())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(fail()),
        },
        ParamType::Enum(options) => {
            let s = match value {
                Value::String(s) => s.clone(),
                _ => return Err(fail()),
            };
            if options.contains(&s.as_str()) {
                Ok(Value::String(s))
            } else {
                Err(AppError::InvalidParameter(format!(
                    "Invalid value '{}' for parameter '{}': expected one of {:?}",
                    s, spec.name, options
                )))
            }
        }
    }
}

/// Bornes minimales, vérifiées avant tout débit
fn check_ranges(params: &Hyperparams) -> AppResult<()> {
    let err = |msg: &str| Err(AppError::InvalidParameter(msg.to_string()));
    match params {
        Hyperparams::Linear { .. } => Ok(()),
        Hyperparams::Logistic { c, max_iter, .. } => {
            if *c <= 0.0 {
                return err("'C' must be strictly positive");
            }
            if *max_iter == 0 {
                return err("'max_iter' must be at least 1");
            }
            Ok(())
        }
        Hyperparams::Knn { n_neighbors, .. } => {
            if *n_neighbors == 0 {
                return err("'n_neighbors' must be at least 1");
            }
            Ok(())
        }
        Hyperparams::RandomForest {
            n_estimators,
            min_samples_split,
            min_samples_leaf,
            ..
        } => {
            if *n_estimators == 0 {
                return err("'n_estimators' must be at least 1");
            }
            if *min_samples_split < 2 {
                return err("'min_samples_split' must be at least 2");
            }
            if *min_samples_leaf == 0 {
                return err("'min_samples_leaf' must be at least 1");
            }
            Ok(())
        }
    }
}
