use sqlx::types::Json;
use sqlx::PgPool;

use crate::error::Result;
use crate::models::{Session, SessionPreferences};

#[derive(Clone)]
pub struct SessionStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    preferences: Option<Json<SessionPreferences>>,
}

impl SessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT session_id, preferences FROM sessions WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Session {
            session_id: r.session_id,
            preferences: r.preferences.map(|p| p.0),
        }))
    }

    /// Create the session if it does not exist yet; preferences are kept
    /// as-is on conflict (session CRUD proper lives outside this crate).
    pub async fn ensure(
        &self,
        session_id: &str,
        preferences: Option<&SessionPreferences>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (session_id, preferences) VALUES ($1, $2) \
             ON CONFLICT (session_id) DO NOTHING",
        )
        .bind(session_id)
        .bind(preferences.map(Json))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
