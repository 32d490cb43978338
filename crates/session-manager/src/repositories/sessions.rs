//! Session repository for database operations.
//!
//! Sessions and their participants are read inside a single transaction
//! so a participant inserted earlier in the same request is visible to a
//! subsequent find. The transaction is rolled back on any error path.

use crate::errors::SmError;
use crate::models::{Participant, Session, SessionStatus};
use crate::observability::metrics;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;

const FIND_SESSION_QUERY: &str = r#"
    SELECT
        id,
        status,
        relay_server,
        created_at,
        updated_at
    FROM session
    WHERE
        id = $1
"#;

const FIND_PARTICIPANTS_QUERY: &str = r#"
    SELECT
        id,
        user_id,
        session_id,
        created_at,
        updated_at
    FROM participant
    WHERE
        session_id = $1
"#;

const INSERT_SESSION_QUERY: &str = r#"
    INSERT INTO session(
        id,
        status,
        relay_server,
        created_at,
        updated_at
    )
    VALUES
        ($1, $2, $3, $4, $5)
"#;

const INSERT_PARTICIPANT_QUERY: &str = r#"
    INSERT INTO participant(
        id,
        user_id,
        session_id,
        created_at,
        updated_at
    )
    VALUES
        ($1, $2, $3, $4, $5)
"#;

/// Session repository for database operations.
pub struct SessionRepository;

impl SessionRepository {
    /// Find a session by id with its participant list attached.
    ///
    /// # Errors
    ///
    /// - `SmError::NotFound` - No session with that id
    /// - `SmError::Database` - Database operation failed
    #[instrument(skip_all, name = "sm.repo.find_session", fields(session_id = %id))]
    pub async fn find(pool: &PgPool, id: &str) -> Result<Session, SmError> {
        let start = Instant::now();

        let result = Self::find_in_tx(pool, id).await;

        let duration = start.elapsed();
        match &result {
            Ok(_) => metrics::record_db_query("find_session", "success", duration),
            Err(SmError::NotFound(_)) => {
                metrics::record_db_query("find_session", "not_found", duration)
            }
            Err(_) => metrics::record_db_query("find_session", "error", duration),
        }

        result
    }

    async fn find_in_tx(pool: &PgPool, id: &str) -> Result<Session, SmError> {
        // Dropping the transaction rolls it back on every error path.
        let mut tx = pool.begin().await?;

        let row = sqlx::query(FIND_SESSION_QUERY)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| SmError::NotFound(format!("no session with id {}", id)))?;

        let mut session = map_row_to_session(row)?;

        let participant_rows = sqlx::query(FIND_PARTICIPANTS_QUERY)
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

        session.participants = participant_rows
            .into_iter()
            .map(map_row_to_participant)
            .collect();

        tx.commit().await?;

        Ok(session)
    }

    /// Insert a newly created session. Timestamps are stamped at insert.
    ///
    /// # Errors
    ///
    /// - `SmError::Conflict` - A session with that id already exists
    /// - `SmError::Database` - Database operation failed
    #[instrument(skip_all, name = "sm.repo.save_session", fields(session_id = %session.id))]
    pub async fn save(pool: &PgPool, session: &Session) -> Result<(), SmError> {
        let start = Instant::now();
        let now = Utc::now();

        let result = sqlx::query(INSERT_SESSION_QUERY)
            .bind(&session.id)
            .bind(session.status.as_str())
            .bind(&session.relay_server)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await;

        let duration = start.elapsed();
        match result {
            Ok(_) => {
                metrics::record_db_query("save_session", "success", duration);
                Ok(())
            }
            Err(e) => {
                metrics::record_db_query("save_session", "error", duration);
                Err(e.into())
            }
        }
    }

    /// Insert a participant row. Timestamps are stamped at insert.
    ///
    /// # Errors
    ///
    /// - `SmError::PreconditionRequired` - The referenced session does not exist
    /// - `SmError::Database` - Database operation failed
    #[instrument(
        skip_all,
        name = "sm.repo.save_participant",
        fields(session_id = %participant.session_id)
    )]
    pub async fn save_participant(
        pool: &PgPool,
        participant: &Participant,
    ) -> Result<(), SmError> {
        let start = Instant::now();
        let now = Utc::now();

        let result = sqlx::query(INSERT_PARTICIPANT_QUERY)
            .bind(&participant.id)
            .bind(&participant.user_id)
            .bind(&participant.session_id)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await;

        let duration = start.elapsed();
        match result {
            Ok(_) => {
                metrics::record_db_query("save_participant", "success", duration);
                Ok(())
            }
            Err(e) => {
                metrics::record_db_query("save_participant", "error", duration);
                Err(e.into())
            }
        }
    }
}

fn map_row_to_session(row: PgRow) -> Result<Session, SmError> {
    let status_str: String = row.get("status");
    let status = SessionStatus::parse(&status_str)
        .ok_or_else(|| SmError::Internal(format!("unknown session status '{}'", status_str)))?;

    Ok(Session {
        id: row.get("id"),
        status,
        relay_server: row.get("relay_server"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        participants: Vec::new(),
    })
}

fn map_row_to_participant(row: PgRow) -> Participant {
    Participant {
        id: row.get("id"),
        user_id: row.get("user_id"),
        session_id: row.get("session_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
