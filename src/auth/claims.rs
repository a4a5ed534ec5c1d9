use serde::Deserialize;
use uuid::Uuid;

/// Access token claims the marketplace relies on.
///
/// Anything else Supabase puts in the token is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub nbf: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub app_metadata: Option<AppMetadata>,
}

/// Server-controlled metadata; users cannot edit it themselves
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppMetadata {
    /// client | company | admin
    #[serde(default)]
    pub platform_role: Option<String>,

    /// Company the user acts for, present on company accounts
    #[serde(default)]
    pub company_id: Option<Uuid>,
}
