use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use super::claims::Claims;
use crate::{
    error::{AuthError, AuthResult},
    state::AppState,
};

/// Issuer tag stamped into and required from every token.
pub const ISSUER: &str = "account-service";

/// How long an issued token stays valid.
pub const TOKEN_TTL: Duration = Duration::hours(1);

/// Signing and verification keys derived from the shared secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.credentials.keys().clone()
    }
}

impl JwtKeys {
    pub fn new(secret: &[u8]) -> AuthResult<Self> {
        if secret.is_empty() {
            return Err(AuthError::Signing("signing secret is empty".into()));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: TOKEN_TTL,
        })
    }

    /// Issue a token for the given identity, valid for one hour from now.
    pub fn issue(&self, user_id: Uuid, username: &str, role: &str) -> AuthResult<String> {
        self.issue_at(user_id, username, role, OffsetDateTime::now_utc())
    }

    fn issue_at(
        &self,
        user_id: Uuid,
        username: &str,
        role: &str,
        now: OffsetDateTime,
    ) -> AuthResult<String> {
        let exp = now + self.ttl;
        let claims = Claims {
            user_id,
            username: username.to_string(),
            role: role.to_string(),
            iss: ISSUER.to_string(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    /// Verify signature, issuer and expiry, returning the embedded claims.
    pub fn validate(&self, token: &str) -> AuthResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => {
                    warn!(error = %e, "jwt rejected");
                    AuthError::TokenInvalid
                }
            }
        })?;

        // the decoder accepts exp == now; a token is dead from its expiry instant on
        if OffsetDateTime::now_utc().unix_timestamp() >= data.claims.exp {
            return Err(AuthError::TokenExpired);
        }

        debug!(user_id = %data.claims.user_id, "jwt verified");
        Ok(data.claims)
    }
}
