//! Event directory collaborator.
//!
//! The action bridge talks to events only through the `EventDirectory` trait,
//! so dispatch tests can substitute a recording fake. The shipped
//! implementation is SQLite-backed.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::Database;

const SEARCH_LIMIT: i64 = 10;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event not found")]
    NotFound,
    #[error("Already registered for this event")]
    AlreadyRegistered,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub event_type: String,
    pub location: String,
    pub start_time: String,
    pub end_time: String,
    pub max_participants: Option<i64>,
    pub is_published: bool,
    pub created_at: String,
}

/// Fields accepted when creating an event through the action bridge.
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub event_type: String,
    pub location: String,
    pub start_time: String,
    pub end_time: String,
    pub max_participants: Option<i64>,
    pub created_by: String,
}

#[async_trait]
pub trait EventDirectory: Send + Sync {
    async fn create_event(&self, event: NewEvent) -> Result<Event, EventError>;

    /// Published events matching the optional text and type filters, capped
    /// at 10 rows.
    async fn search_events(
        &self,
        query: Option<&str>,
        event_type: Option<&str>,
    ) -> Result<Vec<Event>, EventError>;

    async fn register_for_event(&self, event_id: i64, user_id: &str) -> Result<Event, EventError>;
}

#[derive(Clone)]
pub struct EventRepository {
    db: Database,
}

impl EventRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EventDirectory for EventRepository {
    async fn create_event(&self, event: NewEvent) -> Result<Event, EventError> {
        let row = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (title, description, event_type, location,
                                start_time, end_time, max_participants, created_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, title, description, event_type, location,
                      start_time, end_time, max_participants, is_published, created_at
            "#,
        )
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.event_type)
        .bind(&event.location)
        .bind(&event.start_time)
        .bind(&event.end_time)
        .bind(event.max_participants)
        .bind(&event.created_by)
        .fetch_one(self.db.pool())
        .await
        .context("failed to insert event")?;
        Ok(row)
    }

    async fn search_events(
        &self,
        query: Option<&str>,
        event_type: Option<&str>,
    ) -> Result<Vec<Event>, EventError> {
        let pattern = query.map(|q| format!("%{q}%"));
        let rows = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, title, description, event_type, location,
                   start_time, end_time, max_participants, is_published, created_at
            FROM events
            WHERE is_published = 1
              AND (?1 IS NULL OR title LIKE ?1 OR description LIKE ?1)
              AND (?2 IS NULL OR event_type = ?2)
            ORDER BY start_time
            LIMIT ?3
            "#,
        )
        .bind(pattern)
        .bind(event_type)
        .bind(SEARCH_LIMIT)
        .fetch_all(self.db.pool())
        .await
        .context("failed to search events")?;
        Ok(rows)
    }

    async fn register_for_event(&self, event_id: i64, user_id: &str) -> Result<Event, EventError> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, title, description, event_type, location,
                   start_time, end_time, max_participants, is_published, created_at
            FROM events WHERE id = ?
            "#,
        )
        .bind(event_id)
        .fetch_optional(self.db.pool())
        .await
        .context("failed to fetch event")?
        .ok_or(EventError::NotFound)?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO event_registrations (event_id, user_id) VALUES (?, ?)",
        )
        .bind(event_id)
        .bind(user_id)
        .execute(self.db.pool())
        .await
        .context("failed to register for event")?;

        if result.rows_affected() == 0 {
            return Err(EventError::AlreadyRegistered);
        }
        Ok(event)
    }
}
