use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::models::{Principal, Role};
use crate::{error::StorageError, storage::PrincipalDirectory};

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: Option<String>,
    role: String,
}

impl From<UserRow> for Principal {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            email: r.email.filter(|e| !e.trim().is_empty()),
            role: Role::parse_lossy(&r.role),
        }
    }
}

/// Reads principals from the `users` table maintained by the account service.
#[derive(Clone)]
pub struct PgPrincipals {
    pool: PgPool,
}

impl PgPrincipals {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrincipalDirectory for PgPrincipals {
    async fn find(&self, id: Uuid) -> Result<Option<Principal>, StorageError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, email, role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn first_admin(&self) -> Result<Option<Principal>, StorageError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, role FROM users \
             WHERE lower(trim(role)) = 'admin' \
             ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn insert_user(pool: &PgPool, email: Option<&str>, role: &str) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, email, role) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(email)
            .bind(role)
            .execute(pool)
            .await
            .unwrap();
        id
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn find_maps_role_and_blank_email(pool: PgPool) {
        let id = insert_user(&pool, Some("  "), "admin").await;
        let dir = PgPrincipals::new(pool);

        let p = dir.find(id).await.unwrap().unwrap();
        assert_eq!(p.role, Role::Admin);
        assert_eq!(p.email, None);
        assert!(dir.find(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn first_admin_ignores_plain_users(pool: PgPool) {
        insert_user(&pool, Some("user@example.com"), "user").await;
        let admin = insert_user(&pool, Some("admin@example.com"), "admin").await;
        let dir = PgPrincipals::new(pool);

        assert_eq!(dir.first_admin().await.unwrap().unwrap().id, admin);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn first_admin_matches_role_case_insensitively(pool: PgPool) {
        let admin = insert_user(&pool, Some("root@example.com"), " Admin ").await;
        let dir = PgPrincipals::new(pool);

        let found = dir.first_admin().await.unwrap().unwrap();
        assert_eq!(found.id, admin);
        assert_eq!(found.role, Role::Admin);
        assert_eq!(dir.find(admin).await.unwrap().unwrap().role, Role::Admin);
    }
}
