use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT payload identifying an authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub user_id: Uuid,    // user ID
    pub username: String, // username at issuance
    pub role: String,     // role at issuance
    pub iss: String,      // issuer
    pub iat: i64,         // issued at (unix timestamp)
    pub exp: i64,         // expires at (unix timestamp)
}
