//! Tests d'intégration du cycle de vie : débits, compensations,
//! cloisonnement par utilisateur. Base SQLite et répertoires d'artefacts
//! temporaires, rien d'externe.

use tempfile::TempDir;

use trainer_platform::core::lifecycle::{ModelLifecycleService, PREDICT_COST, TRAIN_COST};
use trainer_platform::domain::model::TrainingSpec;
use trainer_platform::domain::user::User;
use trainer_platform::infrastructure::database::{
    Database, ModelRepository, TokenLedger, UserRepository,
};
use trainer_platform::infrastructure::error::AppError;
use trainer_platform::infrastructure::storage::ArtifactStore;
use trainer_platform::ml::table::DataTable;

struct TestEnv {
    db: Database,
    store: ArtifactStore,
    service: ModelLifecycleService,
    _dir: TempDir,
}

async fn setup() -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("test.db").display());
    let db = Database::connect(&url).await.unwrap();
    db.init_schema().await.unwrap();

    let store =
        ArtifactStore::new(dir.path().join("train_models"), dir.path().join("metrics")).unwrap();
    let service = ModelLifecycleService::new(
        TokenLedger::new(db.pool.clone()),
        ModelRepository::new(db.pool.clone()),
        store.clone(),
    );

    TestEnv {
        db,
        store,
        service,
        _dir: dir,
    }
}

async fn create_user(env: &TestEnv, email: &str, tokens: i64) -> User {
    UserRepository::new(env.db.pool.clone())
        .create(email, "s3cret", tokens, false)
        .await
        .unwrap()
        .unwrap()
}

async fn balance(env: &TestEnv, user: &User) -> i64 {
    TokenLedger::new(env.db.pool.clone())
        .balance(user.id)
        .await
        .unwrap()
        .unwrap()
}

/// CSV sans bruit : bonus = 2*age + salaire/100 + 7
fn sample_csv() -> Vec<u8> {
    let mut csv = String::from("age,salary,bonus\n");
    for i in 0..20 {
        let age = 20 + i;
        let salary = 40000 + 500 * i;
        let bonus = 2 * age + salary / 100 + 7;
        csv.push_str(&format!("{},{},{}\n", age, salary, bonus));
    }
    csv.into_bytes()
}

fn sample_table() -> DataTable {
    DataTable::from_csv_bytes(&sample_csv()).unwrap()
}

fn linear_spec() -> TrainingSpec {
    TrainingSpec {
        model_type: "linear".to_string(),
        feature_cols: vec!["age".to_string(), "salary".to_string()],
        label_col: "bonus".to_string(),
        train_percentage: 0.8,
        optional_params: serde_json::Map::new(),
        model_filename: None,
    }
}

fn features(age: i64, salary: i64) -> serde_json::Map<String, serde_json::Value> {
    serde_json::json!({ "age": age, "salary": salary })
        .as_object()
        .unwrap()
        .clone()
}

#[tokio::test]
async fn train_success_debits_once_and_persists_both_stores() {
    let env = setup().await;
    let user = create_user(&env, "a@example.com", 15).await;

    let outcome = env
        .service
        .train(&user, sample_table(), linear_spec())
        .await
        .unwrap();

    assert_eq!(outcome.tokens_deducted, TRAIN_COST);
    assert_eq!(balance(&env, &user).await, 15 - TRAIN_COST);
    assert!(outcome.model_name.starts_with(&format!("{}_linear_", user.id)));
    assert!(outcome.metrics.r2_score.is_finite());
    assert!(outcome.metrics.mean_squared_error >= 0.0);

    // Exactement un enregistrement et un artefact
    let records = ModelRepository::new(env.db.pool.clone())
        .list(user.id)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert!(env.store.exists(&outcome.model_name));
}

#[tokio::test]
async fn train_validation_failure_never_debits() {
    let env = setup().await;
    let user = create_user(&env, "a@example.com", 15).await;

    let mut spec = linear_spec();
    spec.train_percentage = 1.0;
    let err = env.service.train(&user, sample_table(), spec).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(balance(&env, &user).await, 15);

    let mut spec = linear_spec();
    spec.model_type = "svm".to_string();
    let err = env.service.train(&user, sample_table(), spec).await.unwrap_err();
    assert!(matches!(err, AppError::UnknownModelKind(_)));
    assert_eq!(balance(&env, &user).await, 15);

    let mut spec = linear_spec();
    spec.optional_params = serde_json::json!({"bogus": 1})
        .as_object()
        .unwrap()
        .clone();
    let err = env.service.train(&user, sample_table(), spec).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidParameter(_)));
    assert_eq!(balance(&env, &user).await, 15);
}

#[tokio::test]
async fn train_insufficient_tokens_rejected() {
    let env = setup().await;
    let user = create_user(&env, "broke@example.com", 0).await;

    let err = env
        .service
        .train(&user, sample_table(), linear_spec())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientTokens { .. }));
    assert_eq!(balance(&env, &user).await, 0);
}

#[tokio::test]
async fn train_failure_after_debit_refunds_and_cleans_up() {
    let env = setup().await;
    let user = create_user(&env, "a@example.com", 15).await;

    // Occupe le nom à l'avance : l'insertion des métadonnées échouera
    // après l'ajustement et l'écriture de l'artefact
    let taken = format!("{}_mymodel", user.id);
    ModelRepository::new(env.db.pool.clone())
        .insert(user.id, &taken, "linear", "elsewhere", "[]")
        .await
        .unwrap()
        .unwrap();

    let mut spec = linear_spec();
    spec.model_filename = Some("mymodel".to_string());
    let err = env.service.train(&user, sample_table(), spec).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists(_)));

    // Remboursement exact et aucun artefact orphelin
    assert_eq!(balance(&env, &user).await, 15);
    assert!(!env.store.exists(&taken));
}

#[tokio::test]
async fn train_then_predict_roundtrip() {
    let env = setup().await;
    let user = create_user(&env, "a@example.com", 15).await;

    let outcome = env
        .service
        .train(&user, sample_table(), linear_spec())
        .await
        .unwrap();
    assert_eq!(balance(&env, &user).await, 14);

    // Ligne du jeu d'entraînement : age=25, salary=42500, bonus=482
    let prediction = env
        .service
        .predict(&user, &outcome.model_name, features(25, 42500))
        .await
        .unwrap();
    assert_eq!(prediction.tokens_deducted, PREDICT_COST);
    assert_eq!(balance(&env, &user).await, 9);
    assert!(
        (prediction.prediction - 482.0).abs() < 1.0,
        "prediction {} too far from 482",
        prediction.prediction
    );
}

#[tokio::test]
async fn predict_with_unseen_category_zero_fills() {
    let env = setup().await;
    let user = create_user(&env, "a@example.com", 15).await;

    let csv = b"age,city,bonus\n\
                30,Chicago,100\n31,Houston,110\n32,Chicago,120\n33,Houston,130\n\
                34,Chicago,140\n35,Houston,150\n36,Chicago,160\n37,Houston,170\n";
    let table = DataTable::from_csv_bytes(csv).unwrap();
    let spec = TrainingSpec {
        feature_cols: vec!["age".to_string(), "city".to_string()],
        ..linear_spec()
    };
    let outcome = env.service.train(&user, table, spec).await.unwrap();

    let f = serde_json::json!({ "age": 33, "city": "Denver" })
        .as_object()
        .unwrap()
        .clone();
    let prediction = env.service.predict(&user, &outcome.model_name, f).await.unwrap();
    assert!(prediction.prediction.is_finite());
}

#[tokio::test]
async fn cross_user_model_is_invisible() {
    let env = setup().await;
    let alice = create_user(&env, "alice@example.com", 15).await;
    let bob = create_user(&env, "bob@example.com", 15).await;

    let outcome = env
        .service
        .train(&alice, sample_table(), linear_spec())
        .await
        .unwrap();

    // Prédiction, métadonnées, suppression : 404 pour Bob, solde intact
    let err = env
        .service
        .predict(&bob, &outcome.model_name, features(25, 42500))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(balance(&env, &bob).await, 15);

    assert!(matches!(
        env.service.describe(&bob, &outcome.model_name).await.unwrap_err(),
        AppError::NotFound(_)
    ));
    assert!(matches!(
        env.service.delete(&bob, &outcome.model_name).await.unwrap_err(),
        AppError::NotFound(_)
    ));

    // Le modèle d'Alice est toujours là
    assert!(env.service.describe(&alice, &outcome.model_name).await.is_ok());
}

#[tokio::test]
async fn delete_removes_record_and_artifact() {
    let env = setup().await;
    let user = create_user(&env, "a@example.com", 15).await;

    let outcome = env
        .service
        .train(&user, sample_table(), linear_spec())
        .await
        .unwrap();
    assert!(env.store.exists(&outcome.model_name));

    env.service.delete(&user, &outcome.model_name).await.unwrap();
    assert!(!env.store.exists(&outcome.model_name));
    assert!(ModelRepository::new(env.db.pool.clone())
        .find(user.id, &outcome.model_name)
        .await
        .unwrap()
        .is_none());

    // Prédire après suppression : 404, pas de débit
    let before = balance(&env, &user).await;
    let err = env
        .service
        .predict(&user, &outcome.model_name, features(25, 42500))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(balance(&env, &user).await, before);
}

#[tokio::test]
async fn predict_with_missing_artifact_refunds() {
    let env = setup().await;
    let user = create_user(&env, "a@example.com", 15).await;

    let outcome = env
        .service
        .train(&user, sample_table(), linear_spec())
        .await
        .unwrap();

    // Simule la disparition du fichier alors que l'enregistrement reste
    env.store.delete(&outcome.model_name).unwrap();

    let before = balance(&env, &user).await;
    let err = env
        .service
        .predict(&user, &outcome.model_name, features(25, 42500))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    // Le débit de la prédiction a été remboursé
    assert_eq!(balance(&env, &user).await, before);

    // Et l'enregistrement orphelin n'apparaît plus dans la liste
    let names = env.service.list_model_names(&user).await.unwrap();
    assert!(!names.contains(&outcome.model_name));
}

#[tokio::test]
async fn caller_supplied_name_is_sanitized_and_prefixed() {
    let env = setup().await;
    let user = create_user(&env, "a@example.com", 15).await;

    let mut spec = linear_spec();
    spec.model_filename = Some("my model/../v2!".to_string());
    let outcome = env.service.train(&user, sample_table(), spec).await.unwrap();

    assert_eq!(outcome.model_name, format!("{}_mymodel.v2", user.id));
    assert!(env.store.exists(&outcome.model_name));
}

#[tokio::test]
async fn all_four_model_kinds_train_and_predict() {
    let env = setup().await;
    let user = create_user(&env, "a@example.com", 100).await;

    // Étiquette binaire entière pour accepter aussi la logistique
    let mut csv = String::from("x1,x2,label\n");
    for i in 0..30 {
        let x1 = i as f64;
        let x2 = (i % 5) as f64;
        let label = if x1 > 15.0 { 1 } else { 0 };
        csv.push_str(&format!("{},{},{}\n", x1, x2, label));
    }
    let table = DataTable::from_csv_bytes(csv.as_bytes()).unwrap();

    for model_type in ["linear", "logistic", "knn", "random_forest"] {
        let spec = TrainingSpec {
            model_type: model_type.to_string(),
            feature_cols: vec!["x1".to_string(), "x2".to_string()],
            label_col: "label".to_string(),
            train_percentage: 0.8,
            optional_params: serde_json::Map::new(),
            model_filename: Some(format!("all_{}", model_type)),
        };
        let outcome = env
            .service
            .train(&user, table.clone(), spec)
            .await
            .unwrap_or_else(|e| panic!("{} training failed: {}", model_type, e));

        let f = serde_json::json!({ "x1": 20.0, "x2": 1.0 })
            .as_object()
            .unwrap()
            .clone();
        let prediction = env
            .service
            .predict(&user, &outcome.model_name, f)
            .await
            .unwrap_or_else(|e| panic!("{} prediction failed: {}", model_type, e));
        assert!(prediction.prediction.is_finite());
    }
}
