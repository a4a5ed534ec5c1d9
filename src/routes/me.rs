use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::RequireAuth;
use crate::domain::PlatformRole;

#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub platform_role: PlatformRole,
    pub company_id: Option<Uuid>,
    pub issuer: String,
}

/// Get current authenticated user info, as the lifecycle layer sees them
pub async fn get_me(auth: RequireAuth) -> Json<MeResponse> {
    let actor = auth.actor();
    Json(MeResponse {
        user_id: actor.user_id,
        email: auth.email.clone(),
        platform_role: actor.role,
        company_id: actor.company_id,
        issuer: auth.issuer.clone(),
    })
}
