//! SQLite persistence for groups, memberships and messages.

use anyhow::{Context, Result};

use crate::db::Database;

use super::models::{ChatGroup, ChatMessage, GroupKind, GroupSummary};

#[derive(Clone)]
pub struct ChatRepository {
    db: Database,
}

impl ChatRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn insert_group(
        &self,
        name: &str,
        description: &str,
        kind: GroupKind,
        is_public: bool,
        created_by: &str,
    ) -> Result<ChatGroup> {
        let group = sqlx::query_as::<_, ChatGroup>(
            r#"
            INSERT INTO chat_groups (name, description, group_type, is_public, created_by)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, name, description, group_type, is_public, created_by, created_at
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(kind)
        .bind(is_public)
        .bind(created_by)
        .fetch_one(self.db.pool())
        .await
        .context("failed to insert group")?;
        Ok(group)
    }

    /// Delete a group. Memberships and messages go with it through the
    /// schema's cascade.
    pub async fn delete_group(&self, group_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chat_groups WHERE id = ?")
            .bind(group_id)
            .execute(self.db.pool())
            .await
            .context("failed to delete group")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_group(&self, group_id: i64) -> Result<Option<ChatGroup>> {
        let group = sqlx::query_as::<_, ChatGroup>(
            r#"
            SELECT id, name, description, group_type, is_public, created_by, created_at
            FROM chat_groups WHERE id = ?
            "#,
        )
        .bind(group_id)
        .fetch_optional(self.db.pool())
        .await
        .context("failed to fetch group")?;
        Ok(group)
    }

    pub async fn add_member(&self, group_id: i64, user_id: &str, is_admin: bool) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO chat_group_members (group_id, user_id, is_admin)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(is_admin)
        .execute(self.db.pool())
        .await
        .context("failed to add member")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_member(&self, group_id: i64, user_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM chat_group_members WHERE group_id = ? AND user_id = ?",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(self.db.pool())
        .await
        .context("failed to remove member")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_member(&self, group_id: i64, user_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chat_group_members WHERE group_id = ? AND user_id = ?",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await
        .context("failed to check membership")?;
        Ok(count > 0)
    }

    pub async fn is_group_admin(&self, group_id: i64, user_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chat_group_members WHERE group_id = ? AND user_id = ? AND is_admin = 1",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await
        .context("failed to check group admin")?;
        Ok(count > 0)
    }

    pub async fn list_groups_for_user(&self, user_id: &str) -> Result<Vec<GroupSummary>> {
        let groups = sqlx::query_as::<_, GroupSummary>(
            r#"
            SELECT g.id, g.name, g.description, g.group_type, g.is_public,
                   g.created_by, g.created_at,
                   (SELECT COUNT(*) FROM chat_group_members c
                     WHERE c.group_id = g.id) AS member_count
            FROM chat_groups g
            JOIN chat_group_members m ON m.group_id = g.id
            WHERE m.user_id = ?
            ORDER BY g.id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await
        .context("failed to list groups")?;
        Ok(groups)
    }

    pub async fn search_public_groups(&self, query: &str) -> Result<Vec<GroupSummary>> {
        let pattern = format!("%{query}%");
        let groups = sqlx::query_as::<_, GroupSummary>(
            r#"
            SELECT g.id, g.name, g.description, g.group_type, g.is_public,
                   g.created_by, g.created_at,
                   (SELECT COUNT(*) FROM chat_group_members c
                     WHERE c.group_id = g.id) AS member_count
            FROM chat_groups g
            WHERE g.is_public = 1 AND (g.name LIKE ? OR g.description LIKE ?)
            ORDER BY g.id
            "#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(self.db.pool())
        .await
        .context("failed to search groups")?;
        Ok(groups)
    }

    pub async fn insert_message(
        &self,
        group_id: i64,
        sender_id: &str,
        content: &str,
        kind: &str,
    ) -> Result<ChatMessage> {
        let message = sqlx::query_as::<_, ChatMessage>(
            r#"
            INSERT INTO chat_messages (group_id, sender_id, content, kind)
            VALUES (?, ?, ?, ?)
            RETURNING id, group_id, sender_id, content, kind, created_at
            "#,
        )
        .bind(group_id)
        .bind(sender_id)
        .bind(content)
        .bind(kind)
        .fetch_one(self.db.pool())
        .await
        .context("failed to insert message")?;
        Ok(message)
    }

    /// Message history, oldest first. The autoincrement id is the order.
    pub async fn list_messages(&self, group_id: i64, limit: i64) -> Result<Vec<ChatMessage>> {
        let messages = sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT id, group_id, sender_id, content, kind, created_at
            FROM chat_messages WHERE group_id = ?
            ORDER BY id ASC
            LIMIT ?
            "#,
        )
        .bind(group_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await
        .context("failed to list messages")?;
        Ok(messages)
    }
}
