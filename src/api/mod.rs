pub mod admin;
pub mod extractors;
pub mod models;
pub mod users;

use actix_web::web;

/// Configure toutes les routes de l'API
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg
        // Utilisateurs
        .service(users::user_create)
        .service(users::user_login)
        .service(users::user_tokens)
        // Modèles
        .service(models::get_models)
        .service(models::create_model)
        .service(models::get_trained)
        .service(models::get_trained_model)
        .service(models::predict_model)
        .service(models::delete_model)
        // Administration
        .service(admin::list_users)
        .service(admin::add_tokens)
        .service(admin::reset_password)
        .service(admin::delete_user)
        // Santé
        .service(web::resource("/health").route(web::get().to(health_check)));
}

/// Endpoint de santé pour monitoring
async fn health_check() -> actix_web::HttpResponse {
    actix_web::HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
