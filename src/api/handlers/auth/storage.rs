//! Store contracts and their Postgres implementation.
//!
//! The engine only sees the [`IdentityStore`] and [`RefreshStore`] traits, so
//! tests can swap in an in-memory backing without touching any flow logic.
//! All cross-request ordering relies on the database: the unique `email` and
//! `token_hash` keys serialize competing inserts, and [`RefreshStore::mark_replaced`]
//! is a conditional update on `replaced_at IS NULL` that serializes competing
//! rotations of the same parent.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::utils::is_unique_violation;

/// Role attached to every new registration. Absence is a deployment error.
pub const DEFAULT_ROLE_CODE: &str = "user";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key")]
    Duplicate,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Closed set of credential kinds. Only passwords exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Password,
}

impl CredentialKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
        }
    }
}

/// A user with roles and the active password credential eagerly loaded.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub roles: Vec<String>,
    pub password_hash: Option<String>,
}

/// Input for the registration transaction. Email must already be normalized.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// Durable ledger entry for one refresh token.
///
/// `replaced_by` is a plain id reference to the child record, never an owning
/// link; traversal goes back through the store. Children are created strictly
/// after their parent, so the chain cannot cycle.
#[derive(Debug, Clone)]
pub struct RefreshRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: Vec<u8>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub replaced_at: Option<DateTime<Utc>>,
    pub replaced_by: Option<Uuid>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Create a user, their password credential, and the default role
    /// assignment in one transaction. A duplicate email maps to
    /// [`StoreError::Duplicate`]; a missing default role is a backend error.
    async fn create_user(&self, new: NewUser) -> StoreResult<UserAccount>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserAccount>>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<UserAccount>>;

    async fn mark_email_verified(&self, id: Uuid) -> StoreResult<()>;

    /// Replace the value of the user's active password credential.
    async fn replace_password_hash(&self, user_id: Uuid, hash: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait RefreshStore: Send + Sync {
    /// Persist a new record; a `token_hash` or id collision is `Duplicate`.
    async fn create(&self, record: &RefreshRecord) -> StoreResult<()>;

    async fn get_by_id(&self, rid: Uuid) -> StoreResult<Option<RefreshRecord>>;

    /// Claim the parent for rotation: set `replaced_at`/`replaced_by` iff
    /// `replaced_at` is still null. Returns whether this caller won the
    /// claim. This is the linearization point for concurrent rotations.
    ///
    /// `replaced_at` is the child's `created_at`, which keeps the lineage
    /// invariant (`child.created_at >= parent.replaced_at`) exact.
    async fn mark_replaced(
        &self,
        rid: Uuid,
        replaced_by: Uuid,
        replaced_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn revoke_by_id(&self, rid: Uuid) -> StoreResult<()>;

    /// Stamp `revoked_at` on every live record of the user. Returns how many
    /// records were revoked.
    async fn revoke_all_for_user(&self, user_id: Uuid) -> StoreResult<u64>;

    /// Physical removal; used to compensate a failed rotation.
    async fn delete_by_id(&self, rid: Uuid) -> StoreResult<()>;

    /// Remove every record whose `expires_at` has passed.
    async fn delete_expired(&self) -> StoreResult<u64>;
}

fn db_err(err: sqlx::Error, action: &'static str) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Duplicate
    } else {
        StoreError::Backend(anyhow::Error::new(err).context(action))
    }
}

/// Postgres-backed implementation of both durable stores.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_roles(&self, user_id: Uuid) -> StoreResult<Vec<String>> {
        let query = r"
            SELECT roles.code
            FROM roles
            JOIN user_roles ON user_roles.role_id = roles.id
            WHERE user_roles.user_id = $1
            ORDER BY roles.code
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_err(err, "failed to load user roles"))?;
        Ok(rows.iter().map(|row| row.get("code")).collect())
    }

    async fn fetch_account(
        &self,
        clause: &'static str,
        query: &'static str,
        bind: AccountKey,
    ) -> StoreResult<Option<UserAccount>> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let mut prepared = sqlx::query(query);
        prepared = match &bind {
            AccountKey::Email(email) => prepared.bind(email.as_str()),
            AccountKey::Id(id) => prepared.bind(id),
        };
        let row = prepared
            .bind(CredentialKind::Password.as_str())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_err(err, clause))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: Uuid = row.get("id");
        let roles = self.load_roles(id).await?;
        Ok(Some(UserAccount {
            id,
            name: row.get("name"),
            email: row.get("email"),
            email_verified: row.get("email_verified"),
            roles,
            password_hash: row.get("password_hash"),
        }))
    }
}

enum AccountKey {
    Email(String),
    Id(Uuid),
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn create_user(&self, new: NewUser) -> StoreResult<UserAccount> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| db_err(err, "failed to begin registration transaction"))?;

        let query = "SELECT id FROM roles WHERE code = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let role_row = sqlx::query(query)
            .bind(DEFAULT_ROLE_CODE)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await
            .map_err(|err| db_err(err, "failed to look up default role"))?;
        let Some(role_row) = role_row else {
            let _ = tx.rollback().await;
            return Err(StoreError::Backend(anyhow!(
                "default role '{DEFAULT_ROLE_CODE}' is not seeded"
            )));
        };
        let role_id: Uuid = role_row.get("id");

        let user_id = Uuid::new_v4();
        let query = r"
            INSERT INTO users (id, name, email)
            VALUES ($1, $2, $3)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let inserted = sqlx::query(query)
            .bind(user_id)
            .bind(&new.name)
            .bind(&new.email)
            .execute(&mut *tx)
            .instrument(span)
            .await;
        if let Err(err) = inserted {
            let _ = tx.rollback().await;
            return Err(db_err(err, "failed to insert user"));
        }

        let query = r"
            INSERT INTO credentials (id, user_id, kind, value)
            VALUES ($1, $2, $3, $4)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let inserted = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(CredentialKind::Password.as_str())
            .bind(&new.password_hash)
            .execute(&mut *tx)
            .instrument(span)
            .await;
        if let Err(err) = inserted {
            let _ = tx.rollback().await;
            return Err(db_err(err, "failed to insert password credential"));
        }

        let query = "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let inserted = sqlx::query(query)
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *tx)
            .instrument(span)
            .await;
        if let Err(err) = inserted {
            let _ = tx.rollback().await;
            return Err(db_err(err, "failed to attach default role"));
        }

        tx.commit()
            .await
            .map_err(|err| db_err(err, "failed to commit registration transaction"))?;

        Ok(UserAccount {
            id: user_id,
            name: new.name,
            email: new.email,
            email_verified: false,
            roles: vec![DEFAULT_ROLE_CODE.to_string()],
            password_hash: Some(new.password_hash),
        })
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserAccount>> {
        let query = r"
            SELECT users.id, users.name, users.email, users.email_verified,
                   credentials.value AS password_hash
            FROM users
            LEFT JOIN credentials
                   ON credentials.user_id = users.id
                  AND credentials.kind = $2
                  AND credentials.active
            WHERE users.email = $1
        ";
        self.fetch_account(
            "failed to look up user by email",
            query,
            AccountKey::Email(email.to_string()),
        )
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<UserAccount>> {
        let query = r"
            SELECT users.id, users.name, users.email, users.email_verified,
                   credentials.value AS password_hash
            FROM users
            LEFT JOIN credentials
                   ON credentials.user_id = users.id
                  AND credentials.kind = $2
                  AND credentials.active
            WHERE users.id = $1
        ";
        self.fetch_account("failed to look up user by id", query, AccountKey::Id(id))
            .await
    }

    async fn mark_email_verified(&self, id: Uuid) -> StoreResult<()> {
        let query = r"
            UPDATE users
            SET email_verified = TRUE,
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_err(err, "failed to mark email verified"))?;
        Ok(())
    }

    async fn replace_password_hash(&self, user_id: Uuid, hash: &str) -> StoreResult<()> {
        let query = r"
            UPDATE credentials
            SET value = $2,
                updated_at = NOW()
            WHERE user_id = $1
              AND kind = $3
              AND active
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(hash)
            .bind(CredentialKind::Password.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_err(err, "failed to replace password credential"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(anyhow!(
                "no active password credential for user {user_id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshStore for PgStore {
    async fn create(&self, record: &RefreshRecord) -> StoreResult<()> {
        let query = r"
            INSERT INTO refresh_tokens
                (id, user_id, token_hash, client_ip, user_agent,
                 expires_at, replaced_at, replaced_by, revoked_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(record.id)
            .bind(record.user_id)
            .bind(&record.token_hash)
            .bind(&record.client_ip)
            .bind(&record.user_agent)
            .bind(record.expires_at)
            .bind(record.replaced_at)
            .bind(record.replaced_by)
            .bind(record.revoked_at)
            .bind(record.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_err(err, "failed to insert refresh record"))?;
        Ok(())
    }

    async fn get_by_id(&self, rid: Uuid) -> StoreResult<Option<RefreshRecord>> {
        let query = r"
            SELECT id, user_id, token_hash, client_ip, user_agent,
                   expires_at, replaced_at, replaced_by, revoked_at, created_at
            FROM refresh_tokens
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(rid)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_err(err, "failed to load refresh record"))?;

        Ok(row.map(|row| RefreshRecord {
            id: row.get("id"),
            user_id: row.get("user_id"),
            token_hash: row.get("token_hash"),
            client_ip: row.get("client_ip"),
            user_agent: row.get("user_agent"),
            expires_at: row.get("expires_at"),
            replaced_at: row.get("replaced_at"),
            replaced_by: row.get("replaced_by"),
            revoked_at: row.get("revoked_at"),
            created_at: row.get("created_at"),
        }))
    }

    async fn mark_replaced(
        &self,
        rid: Uuid,
        replaced_by: Uuid,
        replaced_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        // The WHERE guard is load-bearing: without it two rotations of the
        // same parent could both believe they won.
        let query = r"
            UPDATE refresh_tokens
            SET replaced_at = $3,
                replaced_by = $2
            WHERE id = $1
              AND replaced_at IS NULL
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(rid)
            .bind(replaced_by)
            .bind(replaced_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_err(err, "failed to mark refresh record replaced"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_by_id(&self, rid: Uuid) -> StoreResult<()> {
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = NOW()
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(rid)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_err(err, "failed to revoke refresh record"))?;
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = NOW()
            WHERE user_id = $1
              AND revoked_at IS NULL
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_err(err, "failed to revoke user refresh records"))?;
        Ok(result.rows_affected())
    }

    async fn delete_by_id(&self, rid: Uuid) -> StoreResult<()> {
        let query = "DELETE FROM refresh_tokens WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(rid)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_err(err, "failed to delete refresh record"))?;
        Ok(())
    }

    async fn delete_expired(&self) -> StoreResult<u64> {
        let query = "DELETE FROM refresh_tokens WHERE expires_at < NOW()";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| db_err(err, "failed to delete expired refresh records"))?;
        Ok(result.rows_affected())
    }
}

/// Ensure the default roles exist; existing rows are left untouched.
pub(crate) async fn seed_roles(pool: &PgPool) -> anyhow::Result<()> {
    const ROLES: &[(&str, &str, &str, bool)] = &[
        ("Administrator", "admin", "Full system access", true),
        (
            "Moderator",
            "moderator",
            "Can manage content but not system settings",
            false,
        ),
        ("User", "user", "Standard registered user", true),
    ];

    let query = r"
        INSERT INTO roles (id, name, code, description, is_system)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (code) DO NOTHING
    ";
    for (name, code, description, is_system) in ROLES {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(code)
            .bind(description)
            .bind(is_system)
            .execute(pool)
            .instrument(span)
            .await
            .map_err(|err| anyhow!("failed to seed role '{code}': {err}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_kind_wire_value() {
        assert_eq!(CredentialKind::Password.as_str(), "password");
    }

    #[test]
    fn refresh_record_holds_values() {
        let now = Utc::now();
        let record = RefreshRecord {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            token_hash: vec![1, 2, 3],
            client_ip: Some("1.2.3.4".to_string()),
            user_agent: None,
            expires_at: now,
            replaced_at: None,
            replaced_by: None,
            revoked_at: None,
            created_at: now,
        };
        assert_eq!(record.token_hash, vec![1, 2, 3]);
        assert!(record.replaced_at.is_none());
        assert!(record.revoked_at.is_none());
    }

    #[test]
    fn store_error_display() {
        assert_eq!(StoreError::Duplicate.to_string(), "duplicate key");
    }
}
