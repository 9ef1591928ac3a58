use anyhow::{Context, Result};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use super::{now_rfc3339, Store};

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub conversation_type: String,
    pub group_id: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// (conversation id, created_at) pair returned by candidate queries.
/// Creation time is what the locator tie-breaks on.
pub type ConversationRef = (String, String);

impl Store {
    pub async fn insert_conversation(
        &self,
        title: &str,
        conversation_type: &str,
        group_id: Option<&str>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = now_rfc3339();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO conversations
             (id, title, conversation_type, group_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?5)",
            rusqlite::params![&id, title, conversation_type, group_id, &now],
        )
        .context("Failed to create conversation")?;
        Ok(id)
    }

    #[allow(dead_code)]
    pub async fn conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let conn = self.conn.lock().await;
        let conversation = conn
            .query_row(
                "SELECT id, title, conversation_type, group_id, status, created_at, updated_at
                 FROM conversations WHERE id = ?1",
                rusqlite::params![id],
                |row| {
                    Ok(Conversation {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        conversation_type: row.get(2)?,
                        group_id: row.get(3)?,
                        status: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                },
            )
            .optional()
            .context("Failed to load conversation")?;
        Ok(conversation)
    }

    /// Refresh the recency marker after a message lands in the thread.
    pub async fn touch_conversation(&self, id: &str, updated_at: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
            rusqlite::params![id, updated_at],
        )
        .context("Failed to update conversation timestamp")?;
        Ok(())
    }

    /// Active group conversations whose roster contains the member.
    /// One join instead of a per-conversation membership round trip.
    pub async fn group_conversations_for_member(
        &self,
        member_id: &str,
    ) -> Result<Vec<ConversationRef>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.created_at
             FROM conversations c
             JOIN group_members gm ON gm.group_id = c.group_id
             WHERE c.status = 'active' AND gm.member_id = ?1",
        )?;

        let refs = stmt
            .query_map(rusqlite::params![member_id], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to search group conversations")?;

        Ok(refs)
    }

    /// Active conversations following the broadcast title convention in
    /// which the member already has a recorded message.
    pub async fn broadcast_conversations_with_member(
        &self,
        title_prefix: &str,
        member_id: &str,
    ) -> Result<Vec<ConversationRef>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.created_at
             FROM conversations c
             WHERE c.status = 'active'
               AND c.title LIKE ?1 || '%'
               AND EXISTS (
                   SELECT 1 FROM messages m
                   WHERE m.conversation_id = c.id AND m.member_id = ?2
               )",
        )?;

        let refs = stmt
            .query_map(rusqlite::params![title_prefix, member_id], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to search broadcast conversations")?;

        Ok(refs)
    }
}
