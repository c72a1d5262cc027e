//! Routes d'administration : gestion des utilisateurs et des soldes.
//! Un admin ne peut pas cibler son propre compte ici.

use actix_web::{delete, get, post, web, HttpResponse};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::api::extractors::AdminUser;
use crate::infrastructure::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    /// Ne retourne que les utilisateurs ayant au moins ce solde
    pub min_tokens: Option<i64>,
}

/// Requête d'ajout de tokens. Le numéro de carte est simulé et n'est
/// jamais journalisé en clair.
#[derive(Debug, Deserialize, Validate)]
pub struct AddTokensRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 4, message = "Invalid credit card number"))]
    pub credit_card: String,
    #[validate(range(min = 1, message = "Amount must be at least 1"))]
    pub amount: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 4, message = "Password must contain at least 4 characters"))]
    pub new_password: String,
}

/// Liste des utilisateurs, avec filtre optionnel sur le solde
#[get("/admin/users")]
pub async fn list_users(
    admin: AdminUser,
    query: web::Query<ListUsersQuery>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    info!(
        admin = %admin.0.email,
        min_tokens = ?query.min_tokens,
        "admin requested user list"
    );
    let users = state.users().list(query.min_tokens).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "count": users.len(),
        "users": users
    })))
}

/// Crédite le compte d'un utilisateur
#[post("/admin/users/{user_id}/tokens")]
pub async fn add_tokens(
    admin: AdminUser,
    path: web::Path<i64>,
    payload: web::Json<AddTokensRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    payload.validate()?;
    let user_id = path.into_inner();
    let target = verify_email_matches(&state, user_id, &payload.email).await?;
    forbid_self_target(&admin, target)?;

    let masked = masked_card(&payload.credit_card);
    info!(
        admin = %admin.0.email,
        email = %payload.email,
        amount = payload.amount,
        card = %masked,
        "admin adding tokens"
    );

    let granted = state
        .ledger()
        .grant_by_email(&payload.email, payload.amount)
        .await?;
    if !granted {
        return Err(AppError::Internal("Failed to add tokens".to_string()));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": format!("Added {} tokens to {}", payload.amount, payload.email),
        "email": payload.email,
        "amount": payload.amount
    })))
}

/// Réinitialise le mot de passe d'un utilisateur
#[post("/admin/users/{user_id}/reset_password")]
pub async fn reset_password(
    admin: AdminUser,
    path: web::Path<i64>,
    payload: web::Json<ResetPasswordRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    payload.validate()?;
    let user_id = path.into_inner();
    let target = verify_email_matches(&state, user_id, &payload.email).await?;
    forbid_self_target(&admin, target)?;

    let updated = state
        .users()
        .update_password(&payload.email, &payload.new_password)
        .await?;
    if !updated {
        return Err(AppError::Internal("Failed to update password".to_string()));
    }

    info!(admin = %admin.0.email, email = %payload.email, "admin reset password");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": format!("Password reset successfully for {}", payload.email)
    })))
}

/// Supprime un utilisateur et tous ses modèles (fichiers compris)
#[delete("/admin/users/{user_id}")]
pub async fn delete_user(
    admin: AdminUser,
    path: web::Path<i64>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let user_id = path.into_inner();
    forbid_self_target(&admin, user_id)?;

    // Les artefacts d'abord ; la suppression de la ligne utilisateur
    // cascade ensuite sur les enregistrements de modèles
    state.lifecycle().purge_user_artifacts(user_id).await?;

    let deleted = state.users().delete_by_id(user_id).await?;
    if !deleted {
        return Err(AppError::NotFound(format!("User with ID {}", user_id)));
    }

    info!(admin = %admin.0.email, user_id, "admin deleted user");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "success",
        "message": format!("User with ID {} and all associated models deleted", user_id)
    })))
}

/// Vérifie que l'email correspond bien à l'identifiant ciblé et
/// retourne l'identifiant vérifié
async fn verify_email_matches(
    state: &web::Data<AppState>,
    user_id: i64,
    email: &str,
) -> AppResult<i64> {
    let user = state
        .users()
        .find_by_email(email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with email {}", email)))?;

    if user.id != user_id {
        return Err(AppError::Validation(format!(
            "Email {} does not match user ID {}",
            email, user_id
        )));
    }
    Ok(user.id)
}

/// Un admin ne modifie pas son propre compte via ces routes
fn forbid_self_target(admin: &AdminUser, target_id: i64) -> AppResult<()> {
    if admin.0.id == target_id {
        return Err(AppError::Forbidden(
            "You cannot modify your own account".to_string(),
        ));
    }
    Ok(())
}

fn masked_card(card: &str) -> String {
    if card.len() > 4 {
        format!("{}****", &card[..4])
    } else {
        "****".to_string()
    }
}
