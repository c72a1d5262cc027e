use actix_cors::Cors;
use actix_multipart::form::MultipartFormConfig;
use actix_web::{middleware, web, App, HttpServer};
use std::env;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trainer_platform::config::AppSettings;
use trainer_platform::infrastructure::database::Database;
use trainer_platform::infrastructure::storage::ArtifactStore;
use trainer_platform::{api, AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    setup_tracing();
    info!("🚀 Démarrage de Trainer Platform");

    let settings = AppSettings::load().expect("❌ Impossible de charger la configuration");
    info!("✅ Configuration chargée");

    let db = Database::connect(&settings.database.url)
        .await
        .expect("❌ Impossible d'ouvrir la base de données");
    if let Err(e) = db.init_schema().await {
        // Le serveur démarre quand même : les requêtes échoueront avec
        // de meilleurs messages qu'un crash au boot
        tracing::error!("Failed to initialize database schema: {}", e);
    }

    let store = ArtifactStore::new(&settings.storage.models_dir, &settings.storage.metrics_dir)
        .expect("❌ Impossible d'initialiser le stockage des artefacts");

    let state = web::Data::new(AppState::new(db, store, settings.clone()));

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .app_data(
                // Marge au-dessus de la limite CSV : le handler répond
                // 413 avec un message précis plutôt qu'une erreur multipart
                MultipartFormConfig::default()
                    .total_limit(64 * 1024 * 1024)
                    .memory_limit(64 * 1024 * 1024),
            )
            .configure(api::config)
            .default_service(
                web::route().to(|| async { "Trainer Platform API est en cours d'exécution!" }),
            )
    })
    .bind(format!(
        "{}:{}",
        settings.server.host, settings.server.port
    ))?
    .workers(settings.server.workers)
    .shutdown_timeout(10);

    info!(
        "🔗 API disponible sur http://{}:{}",
        settings.server.host, settings.server.port
    );

    server.run().await
}

/// Configure le tracing pour le logging structuré
fn setup_tracing() {
    let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".into());

    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info,sqlx=warn")
        }))
        .with(if log_format == "json" {
            Box::new(tracing_subscriber::fmt::layer().json().flatten_event(true))
                as Box<dyn tracing_subscriber::Layer<_> + Send + Sync>
        } else {
            Box::new(tracing_subscriber::fmt::layer().compact())
                as Box<dyn tracing_subscriber::Layer<_> + Send + Sync>
        });

    subscriber.init();
}
