use std::sync::Arc;

use lazy_static::lazy_static;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        claims::Claims,
        dto::{LoginRequest, RegisterRequest, UpdateProfileRequest},
        jwt::JwtKeys,
        password::{hash_password, verify_password},
    },
    error::{AuthError, AuthResult},
    users::{PublicUser, User, UserStore},
};

/// Upper bound on username length, in characters.
const MAX_USERNAME_CHARS: usize = 255;

/// Well-formed Argon2id PHC string used if the startup dummy hash cannot be
/// computed. It never matches a real password.
const FALLBACK_DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$YWNjb3VudC1zZXJ2aWNlLQ$AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8";

lazy_static! {
    // verified against when no account matches, so unknown usernames cost the same
    static ref DUMMY_HASH: String = hash_password("account-service-dummy").unwrap_or_else(|e| {
        error!(error = %e, "dummy hash failed; using fallback");
        FALLBACK_DUMMY_HASH.to_string()
    });
}

fn require(field: &str, value: &str) -> AuthResult<()> {
    if value.trim().is_empty() {
        return Err(AuthError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn check_username(username: &str) -> AuthResult<()> {
    require("username", username)?;
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(AuthError::Validation(format!(
            "username must be at most {MAX_USERNAME_CHARS} characters"
        )));
    }
    Ok(())
}

/// Registration, login and profile maintenance on top of a [`UserStore`].
pub struct CredentialService {
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
}

impl CredentialService {
    pub fn new(store: Arc<dyn UserStore>, keys: JwtKeys) -> Self {
        Self { store, keys }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    /// Create an account and return a token for it.
    #[instrument(skip(self, req), fields(username = %req.username))]
    pub async fn register(&self, req: RegisterRequest) -> AuthResult<String> {
        let username = req.username.trim().to_string();
        check_username(&username)?;
        require("name", &req.name)?;
        require("role", &req.role)?;
        if req.password.is_empty() {
            return Err(AuthError::Validation("password is required".into()));
        }

        let hash = hash_password(&req.password)?;
        let user = User::new(
            username,
            req.name.trim().to_string(),
            hash,
            req.role.trim().to_string(),
        );

        self.store.create(&user).await.map_err(|e| {
            match &e {
                AuthError::Conflict(field) => warn!(field = %field, "registration conflict"),
                other => error!(error = %other, "create user failed"),
            }
            e
        })?;

        let token = self.keys.issue(user.id, &user.username, &user.role)?;
        info!(user_id = %user.id, "user registered");
        Ok(token)
    }

    /// Authenticate a username/password pair.
    ///
    /// Unknown usernames, deleted accounts and wrong passwords all fail with
    /// the same [`AuthError::Unauthorized`].
    #[instrument(skip(self, req), fields(username = %req.username))]
    pub async fn login(&self, req: LoginRequest) -> AuthResult<String> {
        require("username", &req.username)?;
        if req.password.is_empty() {
            return Err(AuthError::Validation("password is required".into()));
        }

        let user = match self.store.resolve_by_username(req.username.trim()).await {
            Ok(u) if !u.is_deleted() => Some(u),
            Ok(u) => {
                warn!(user_id = %u.id, "login for deleted account");
                None
            }
            Err(AuthError::NotFound) => {
                warn!("login unknown username");
                None
            }
            Err(e) => {
                error!(error = %e, "resolve_by_username failed");
                None
            }
        };

        let Some(user) = user else {
            let _ = verify_password(&req.password, &DUMMY_HASH);
            return Err(AuthError::Unauthorized);
        };

        if !verify_password(&req.password, &user.password_hash) {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::Unauthorized);
        }

        let token = self.keys.issue(user.id, &user.username, &user.role)?;
        info!(user_id = %user.id, "user logged in");
        Ok(token)
    }

    pub fn validate_token(&self, token: &str) -> AuthResult<Claims> {
        self.keys.validate(token)
    }

    /// Public view of a live account.
    pub async fn profile(&self, id: Uuid) -> AuthResult<PublicUser> {
        let user = self.live_user(id).await?;
        Ok(user.to_public())
    }

    /// Apply the fields present in `req` and stamp the update markers.
    #[instrument(skip(self, req))]
    pub async fn update_profile(
        &self,
        id: Uuid,
        req: UpdateProfileRequest,
        acting_user_id: Uuid,
    ) -> AuthResult<PublicUser> {
        if req.is_empty() {
            return Err(AuthError::Validation("nothing to update".into()));
        }

        let mut user = self.live_user(id).await?;

        if let Some(username) = req.username {
            let username = username.trim().to_string();
            check_username(&username)?;
            user.username = username;
        }
        if let Some(name) = req.name {
            require("name", &name)?;
            user.name = name.trim().to_string();
        }
        if let Some(role) = req.role {
            require("role", &role)?;
            user.role = role.trim().to_string();
        }
        user.touch(acting_user_id, OffsetDateTime::now_utc());

        self.store.update(&user).await?;
        info!(user_id = %user.id, updated_by = %acting_user_id, "profile updated");
        Ok(user.to_public())
    }

    /// Soft-delete an account. Issued tokens stay valid until they expire.
    #[instrument(skip(self))]
    pub async fn delete_account(&self, id: Uuid, acting_user_id: Uuid) -> AuthResult<PublicUser> {
        let mut user = self.live_user(id).await?;
        user.mark_deleted(acting_user_id, OffsetDateTime::now_utc());
        self.store.update(&user).await?;
        info!(user_id = %user.id, deleted_by = %acting_user_id, "account deleted");
        Ok(user.to_public())
    }

    async fn live_user(&self, id: Uuid) -> AuthResult<User> {
        let user = self.store.resolve_by_id(id).await?;
        if user.is_deleted() {
            return Err(AuthError::NotFound);
        }
        Ok(user)
    }
}
