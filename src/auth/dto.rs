use serde::{Deserialize, Serialize};

fn default_role() -> String {
    "user".into()
}

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub name: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Request body for a profile update; absent fields are left as they are.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl UpdateProfileRequest {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.name.is_none() && self.role.is_none()
    }
}

/// Response returned after register or login.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
}
