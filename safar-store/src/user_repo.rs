use async_trait::async_trait;
use chrono::{DateTime, Utc};
use safar_core::repository::UserRepository;
use safar_core::user::User;
use safar_core::CoreResult;
use safar_shared::Masked;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::storage_error;

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    telephone: Option<String>,
    nationality: Option<String>,
    residency: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: Masked::new(row.email),
            name: row.name,
            telephone: row.telephone.map(Masked::new),
            nationality: row.nationality,
            residency: row.residency,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn upsert_user(&self, user: &User) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, telephone, nationality, residency, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET email = EXCLUDED.email,
                name = EXCLUDED.name,
                telephone = EXCLUDED.telephone,
                nationality = EXCLUDED.nationality,
                residency = EXCLUDED.residency
            "#,
        )
        .bind(user.id)
        .bind(user.email.expose())
        .bind(&user.name)
        .bind(user.telephone.as_ref().map(|t| t.expose().as_str()))
        .bind(user.nationality.as_deref())
        .bind(user.residency.as_deref())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> CoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, name, telephone, nationality, residency, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.map(User::from))
    }
}
