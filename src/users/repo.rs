use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::repo_types::User;
use crate::error::{AuthError, AuthResult};

/// Primary key constraint name on `users.id`.
const USERS_PKEY: &str = "users_pkey";

const SELECT_USER: &str = r#"
    SELECT id, username, name, password_hash, role,
           created_at, created_by, updated_at, updated_by, deleted_at, deleted_by
      FROM users
"#;

/// Persistence of user records.
///
/// Lookups return soft-deleted rows too; whether a deleted record counts as
/// absent is the caller's decision.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new record. `Conflict("id")` or `Conflict("username")` when
    /// either key is already held by any row, deleted or not.
    async fn create(&self, user: &User) -> AuthResult<()>;

    async fn resolve_by_username(&self, username: &str) -> AuthResult<User>;

    async fn resolve_by_id(&self, id: Uuid) -> AuthResult<User>;

    /// Overwrite the mutable fields of an existing record: username, name,
    /// role, update and deletion markers. Username uniqueness is enforced the
    /// same way as on create. A soft-deleted record is final and reports
    /// `NotFound`.
    async fn update(&self, user: &User) -> AuthResult<()>;
}

/// Postgres-backed store. Every multi-statement operation runs in one transaction.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Unique violations raised by the insert/update itself mean a concurrent
/// writer won the race after our existence check.
fn conflict_or_store(e: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return match db_err.constraint() {
                Some(USERS_PKEY) => AuthError::Conflict("id"),
                _ => AuthError::Conflict("username"),
            };
        }
    }
    AuthError::Store(e)
}

#[async_trait]
impl UserStore for PgUserStore {
    #[instrument(skip(self, user), fields(user_id = %user.id, username = %user.username))]
    async fn create(&self, user: &User) -> AuthResult<()> {
        let mut tx = self.db.begin().await?;

        let id_taken =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(user.id)
                .fetch_one(&mut *tx)
                .await?;
        if id_taken {
            warn!("user id already exists");
            return Err(AuthError::Conflict("id"));
        }

        let username_taken =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(&user.username)
                .fetch_one(&mut *tx)
                .await?;
        if username_taken {
            warn!("username already exists");
            return Err(AuthError::Conflict("username"));
        }

        sqlx::query(
            r#"
            INSERT INTO users (id, username, name, password_hash, role,
                               created_at, created_by, updated_at, updated_by,
                               deleted_at, deleted_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(user.created_at)
        .bind(user.created_by)
        .bind(user.updated_at)
        .bind(user.updated_by)
        .bind(user.deleted_at)
        .bind(user.deleted_by)
        .execute(&mut *tx)
        .await
        .map_err(conflict_or_store)?;

        tx.commit().await?;
        Ok(())
    }

    async fn resolve_by_username(&self, username: &str) -> AuthResult<User> {
        let sql = format!("{SELECT_USER} WHERE username = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AuthError::NotFound)
    }

    async fn resolve_by_id(&self, id: Uuid) -> AuthResult<User> {
        let sql = format!("{SELECT_USER} WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AuthError::NotFound)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn update(&self, user: &User) -> AuthResult<()> {
        let mut tx = self.db.begin().await?;

        let current = sqlx::query_as::<_, (String, bool)>(
            "SELECT username, deleted_at IS NOT NULL FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(user.id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((current_username, already_deleted)) = current else {
            return Err(AuthError::NotFound);
        };
        if already_deleted {
            warn!("update of deleted user");
            return Err(AuthError::NotFound);
        }

        if current_username != user.username {
            let taken = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 AND id <> $2)",
            )
            .bind(&user.username)
            .bind(user.id)
            .fetch_one(&mut *tx)
            .await?;
            if taken {
                warn!(username = %user.username, "username already exists");
                return Err(AuthError::Conflict("username"));
            }
        }

        let done = sqlx::query(
            r#"
            UPDATE users
               SET username = $2,
                   name = $3,
                   role = $4,
                   updated_at = $5,
                   updated_by = $6,
                   deleted_at = $7,
                   deleted_by = $8
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.role)
        .bind(user.updated_at)
        .bind(user.updated_by)
        .bind(user.deleted_at)
        .bind(user.deleted_by)
        .execute(&mut *tx)
        .await
        .map_err(conflict_or_store)?;

        if done.rows_affected() == 0 {
            return Err(AuthError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }
}
