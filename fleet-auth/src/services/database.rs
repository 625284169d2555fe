//! PostgreSQL-backed [`AuthStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::models::{
    AuthMethod, Domain, DomainId, DomainRole, DomainUser, GlobalRole, NewDomain, NewUser, Session,
    User, UserId,
};

use super::scope::DomainScope;
use super::store::{AuthStore, StoreError};

const USER_COLUMNS: &str =
    "id, username, password_hash, email, role, auth_method, created_at, updated_at";
const DOMAIN_COLUMNS: &str = "id, name, active, settings, created_at";

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: Option<String>,
    email: String,
    role: String,
    auth_method: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            email: row.email,
            role: row.role.parse::<GlobalRole>().map_err(|e| anyhow::anyhow!(e))?,
            auth_method: row
                .auth_method
                .parse::<AuthMethod>()
                .map_err(|e| anyhow::anyhow!(e))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct SessionRow {
    token: String,
    user_id: i64,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            token: row.token,
            user_id: row.user_id,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct DomainRow {
    id: i64,
    name: String,
    active: bool,
    settings: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<DomainRow> for Domain {
    fn from(row: DomainRow) -> Self {
        Domain {
            id: row.id,
            name: row.name,
            active: row.active,
            settings: row.settings,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct DomainUserRow {
    id: i64,
    user_id: i64,
    domain_id: i64,
    role: String,
}

impl TryFrom<DomainUserRow> for DomainUser {
    type Error = StoreError;

    fn try_from(row: DomainUserRow) -> Result<Self, Self::Error> {
        Ok(DomainUser {
            id: row.id,
            user_id: row.user_id,
            domain_id: row.domain_id,
            role: row.role.parse::<DomainRole>().map_err(|e| anyhow::anyhow!(e))?,
        })
    }
}

#[async_trait]
impl AuthStore for Database {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn count_users(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (username, password_hash, email, role, auth_method) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.auth_method.as_str())
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        row.map(User::try_from).transpose()
    }

    async fn update_user(&self, user: &User) -> Result<User, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET username = $2, password_hash = $3, email = $4, role = $5, \
             auth_method = $6, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.auth_method.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| StoreError::MissingReference(format!("user {}", user.id)))?
            .try_into()
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sessions (token, user_id, expires_at, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&session.token)
        .bind(session.user_id)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session(&self, token: &str) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT token, user_id, expires_at, created_at FROM sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn delete_session(&self, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_domain(&self, domain: NewDomain) -> Result<Domain, StoreError> {
        let row: DomainRow = sqlx::query_as(&format!(
            "INSERT INTO domains (name, active, settings) VALUES ($1, $2, $3) RETURNING {DOMAIN_COLUMNS}"
        ))
        .bind(&domain.name)
        .bind(domain.active)
        .bind(&domain.settings)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn find_domain(&self, id: DomainId) -> Result<Option<Domain>, StoreError> {
        let row: Option<DomainRow> =
            sqlx::query_as(&format!("SELECT {DOMAIN_COLUMNS} FROM domains WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Domain::from))
    }

    async fn list_domains(&self, scope: &DomainScope) -> Result<Vec<Domain>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {DOMAIN_COLUMNS} FROM domains WHERE "));
        scope.push_predicate(&mut qb, "id");
        qb.push(" ORDER BY id");

        let rows: Vec<DomainRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Domain::from).collect())
    }

    async fn update_domain_settings(
        &self,
        id: DomainId,
        settings: serde_json::Value,
    ) -> Result<Option<Domain>, StoreError> {
        let row: Option<DomainRow> = sqlx::query_as(&format!(
            "UPDATE domains SET settings = $2 WHERE id = $1 RETURNING {DOMAIN_COLUMNS}"
        ))
        .bind(id)
        .bind(&settings)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Domain::from))
    }

    async fn list_domain_users(&self, user_id: UserId) -> Result<Vec<DomainUser>, StoreError> {
        let rows: Vec<DomainUserRow> = sqlx::query_as(
            "SELECT id, user_id, domain_id, role FROM domain_users WHERE user_id = $1 ORDER BY domain_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(DomainUser::try_from).collect()
    }

    async fn upsert_domain_user(
        &self,
        user_id: UserId,
        domain_id: DomainId,
        role: DomainRole,
    ) -> Result<DomainUser, StoreError> {
        let row: DomainUserRow = sqlx::query_as(
            "INSERT INTO domain_users (user_id, domain_id, role) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, domain_id) DO UPDATE SET role = EXCLUDED.role \
             RETURNING id, user_id, domain_id, role",
        )
        .bind(user_id)
        .bind(domain_id)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn delete_domain_user(&self, user_id: UserId, domain_id: DomainId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM domain_users WHERE user_id = $1 AND domain_id = $2")
            .bind(user_id)
            .bind(domain_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
