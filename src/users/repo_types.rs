use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub password_hash: String, // Argon2 PHC string, never exposed
    pub role: String,
    pub created_at: OffsetDateTime,
    pub created_by: Uuid,
    pub updated_at: Option<OffsetDateTime>,
    pub updated_by: Option<Uuid>,
    pub deleted_at: Option<OffsetDateTime>,
    pub deleted_by: Option<Uuid>,
}

impl User {
    /// A fresh, self-created record with no update or delete markers.
    pub fn new(username: String, name: String, password_hash: String, role: String) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            username,
            name,
            password_hash,
            role,
            created_at: OffsetDateTime::now_utc(),
            created_by: id,
            updated_at: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some() && self.deleted_by.is_some()
    }

    pub fn touch(&mut self, actor: Uuid, at: OffsetDateTime) {
        self.updated_at = Some(at);
        self.updated_by = Some(actor);
    }

    /// Sets both deletion markers together.
    pub fn mark_deleted(&mut self, actor: Uuid, at: OffsetDateTime) {
        self.deleted_at = Some(at);
        self.deleted_by = Some(actor);
    }

    pub fn to_public(&self) -> PublicUser {
        PublicUser::from(self)
    }
}

/// Outward projection of a user; carries no credential material.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub name: String,
    pub role: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub created_by: Uuid,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    pub updated_by: Option<Uuid>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub deleted_at: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<Uuid>,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            name: u.name.clone(),
            role: u.role.clone(),
            created_at: u.created_at,
            created_by: u.created_by,
            updated_at: u.updated_at,
            updated_by: u.updated_by,
            deleted_at: u.deleted_at,
            deleted_by: u.deleted_by,
        }
    }
}
